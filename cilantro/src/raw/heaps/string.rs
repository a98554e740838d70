use std::fmt::{Debug, Formatter};
use std::io::Cursor;
use std::sync::Arc;

use owning_ref::ArcRef;

use crate::diagnostics::{Warning, WarningSink};
use crate::error::Error;
use crate::raw::heaps::{SizeDebugWrapper, StringIndex};
use crate::utilities::{compressed_u32_width, read_compressed_u32};

/// The `#Strings` heap: NUL-terminated UTF-8, addressed by byte offset.
pub struct StringHeap {
	data: ArcRef<[u8]>,
	rva: u32,
	sink: Arc<dyn WarningSink>,
}

/// One `#Strings` entry; `raw` excludes the terminating NUL.
#[derive(Clone)]
pub struct StringItem {
	raw: ArcRef<[u8]>,
	rva: u32,
}

impl StringItem {
	pub fn raw(&self) -> &[u8] {
		&self.raw
	}

	pub fn value(&self) -> &str {
		std::str::from_utf8(&self.raw).unwrap_or("")
	}

	pub fn rva(&self) -> u32 {
		self.rva
	}
}

impl Debug for StringItem {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "StringItem({:?} @ {:#X})", self.value(), self.rva)
	}
}

impl StringHeap {
	pub(crate) fn new(data: ArcRef<[u8]>, rva: u32, sink: Arc<dyn WarningSink>) -> Self {
		Self { data, rva, sink }
	}

	pub fn get(&self, index: StringIndex) -> Option<StringItem> {
		let offset = index.0;
		if offset == 0 {
			return Some(StringItem {
				raw: self.data.clone().map(|bytes| &bytes[0..0]),
				rva: self.rva,
			});
		}
		if offset >= self.data.len() {
			self.sink.warn(Warning::new(
				Error::HeapIndexOutOfRange { heap: "#Strings", index: offset },
				format!("#Strings[{offset:#X}]"),
			));
			return None;
		}
		let tail = &self.data[offset..];
		let end = match tail.iter().position(|b| *b == 0) {
			Some(end) => end,
			None => {
				self.sink.warn(Warning::new(
					Error::TruncatedStructure("#Strings item"),
					format!("#Strings[{offset:#X}]"),
				));
				tail.len()
			},
		};
		if std::str::from_utf8(&tail[..end]).is_err() {
			self.sink.warn(Warning::new(
				Error::DecodingError("#Strings item"),
				format!("#Strings[{offset:#X}]"),
			));
			return None;
		}
		Some(StringItem {
			raw: self.data.clone().map(|bytes| &bytes[offset..offset + end]),
			rva: self.rva.wrapping_add(offset as u32),
		})
	}

	pub(crate) fn contains(&self, index: StringIndex) -> bool {
		index.0 == 0 || index.0 < self.data.len()
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}
}

impl Debug for StringHeap {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let mut dbg = f.debug_struct("StringHeap");
		dbg.field("data", &SizeDebugWrapper(self.data.len()));
		dbg.finish()
	}
}

/// The `#US` heap: CompressedInt-framed UTF-16LE with a trailing flag byte,
/// addressed by byte offset.
pub struct UserStringHeap {
	data: ArcRef<[u8]>,
	rva: u32,
	sink: Arc<dyn WarningSink>,
}

#[derive(Clone)]
pub struct UserStringItem {
	raw: ArcRef<[u8]>,
	value: String,
	/// The terminal byte; 1 when the string needs more than 8-bit handling.
	flag: Option<u8>,
	rva: u32,
}

impl UserStringItem {
	pub fn raw(&self) -> &[u8] {
		&self.raw
	}

	pub fn value(&self) -> &str {
		&self.value
	}

	pub fn flag(&self) -> Option<u8> {
		self.flag
	}

	pub fn rva(&self) -> u32 {
		self.rva
	}
}

impl Debug for UserStringItem {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "UserStringItem({:?} @ {:#X})", self.value, self.rva)
	}
}

impl UserStringHeap {
	pub(crate) fn new(data: ArcRef<[u8]>, rva: u32, sink: Arc<dyn WarningSink>) -> Self {
		Self { data, rva, sink }
	}

	pub fn get(&self, offset: usize) -> Option<UserStringItem> {
		match self.frame(offset) {
			Ok(item) => item,
			Err(error) => {
				self.sink.warn(Warning::new(error, format!("#US[{offset:#X}]")));
				None
			},
		}
	}

	fn frame(&self, offset: usize) -> Result<Option<UserStringItem>, Error> {
		let first = *self
			.data
			.get(offset)
			.ok_or(Error::HeapIndexOutOfRange { heap: "#US", index: offset })?;
		let width = compressed_u32_width(first).ok_or(Error::InvalidCompressedInt)?;
		let mut cursor = Cursor::new(&self.data[offset..]);
		let length = read_compressed_u32(&mut cursor).map_err(|_| Error::InvalidCompressedInt)? as usize;
		let start = offset + width;
		let end = start.checked_add(length).ok_or(Error::InvalidCompressedInt)?;
		if end > self.data.len() {
			return Err(Error::TruncatedStructure("#US item"));
		}
		let payload = &self.data[start..end];
		let (utf16, flag) = match length % 2 {
			1 => (&payload[..length - 1], Some(payload[length - 1])),
			_ => (payload, None),
		};
		let units: Vec<u16> = utf16
			.chunks_exact(2)
			.map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
			.collect();
		let value = String::from_utf16(&units).map_err(|_| Error::DecodingError("#US item"))?;
		Ok(Some(UserStringItem {
			raw: self.data.clone().map(|bytes| &bytes[start..end]),
			value,
			flag,
			rva: self.rva.wrapping_add(offset as u32),
		}))
	}

	/// Walks the heap frame by frame, skipping undecodable entries.
	pub fn iter(&self) -> impl Iterator<Item = (usize, UserStringItem)> + '_ {
		let mut offset = 0usize;
		std::iter::from_fn(move || {
			while offset < self.data.len() {
				let at = offset;
				let first = self.data[at];
				let width = compressed_u32_width(first)?;
				let mut cursor = Cursor::new(&self.data[at..]);
				let length = read_compressed_u32(&mut cursor).ok()? as usize;
				offset = (at + width).checked_add(length)?;
				if offset > self.data.len() {
					return None;
				}
				if let Ok(Some(item)) = self.frame(at) {
					return Some((at, item));
				}
			}
			None
		})
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}
}

impl Debug for UserStringHeap {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let mut dbg = f.debug_struct("UserStringHeap");
		dbg.field("data", &SizeDebugWrapper(self.data.len()));
		dbg.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use owning_ref::ArcRef;

	use super::*;
	use crate::diagnostics::NullSink;

	fn heap(bytes: &[u8]) -> UserStringHeap {
		UserStringHeap::new(ArcRef::new(Arc::from(bytes)), 0x2000, Arc::new(NullSink))
	}

	#[test]
	fn user_strings_expose_the_trailing_flag_byte() {
		// "hi" in UTF-16LE plus flag byte 0x00, framed by its length (5).
		let heap = heap(&[0x00, 0x05, b'h', 0, b'i', 0, 0x00]);
		let item = heap.get(1).unwrap();
		assert_eq!(item.value(), "hi");
		assert_eq!(item.flag(), Some(0));
		assert_eq!(item.rva(), 0x2001);
		assert_eq!(item.raw().len(), 5);
	}

	#[test]
	fn overlong_user_strings_are_absent() {
		let heap = heap(&[0x7F, b'h', 0]);
		assert!(heap.get(0).is_none());
	}

	#[test]
	fn iteration_walks_every_frame() {
		let heap = heap(&[0x00, 0x03, b'a', 0, 0x01, 0x03, b'b', 0, 0x00]);
		let items: Vec<_> = heap.iter().collect();
		assert_eq!(items.len(), 3);
		assert_eq!(items[1].0, 1);
		assert_eq!(items[1].1.value(), "a");
		assert_eq!(items[2].1.value(), "b");
	}

	#[test]
	fn strings_heap_serves_the_empty_string_at_zero() {
		let heap = StringHeap::new(
			ArcRef::new(Arc::from(b"\0name\0".as_slice())),
			0x1000,
			Arc::new(NullSink),
		);
		assert_eq!(heap.get(StringIndex(0)).unwrap().value(), "");
		assert_eq!(heap.get(StringIndex(1)).unwrap().value(), "name");
		assert_eq!(heap.get(StringIndex(1)).unwrap().rva(), 0x1001);
		assert!(heap.get(StringIndex(100)).is_none());
	}
}

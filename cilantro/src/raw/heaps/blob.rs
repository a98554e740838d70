use std::fmt::{Debug, Formatter};
use std::io::Cursor;
use std::sync::Arc;

use owning_ref::ArcRef;

use crate::diagnostics::{Warning, WarningSink};
use crate::error::Error;
use crate::raw::heaps::{BlobIndex, SizeDebugWrapper};
use crate::utilities::{compressed_u32_width, read_compressed_u32};

/// The `#Blob` heap: CompressedInt-framed byte runs addressed by offset.
pub struct BlobHeap {
	data: ArcRef<[u8]>,
	rva: u32,
	sink: Arc<dyn WarningSink>,
}

/// One blob; `raw` is the payload without its length prefix, `rva` points at
/// the prefix.
#[derive(Clone)]
pub struct BlobItem {
	raw: ArcRef<[u8]>,
	rva: u32,
}

impl BlobItem {
	pub fn raw(&self) -> &[u8] {
		&self.raw
	}

	pub fn value(&self) -> &[u8] {
		&self.raw
	}

	pub fn rva(&self) -> u32 {
		self.rva
	}
}

impl Debug for BlobItem {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "BlobItem({:?} @ {:#X})", SizeDebugWrapper(self.raw.len()), self.rva)
	}
}

impl BlobHeap {
	pub(crate) fn new(data: ArcRef<[u8]>, rva: u32, sink: Arc<dyn WarningSink>) -> Self {
		Self { data, rva, sink }
	}

	pub fn get(&self, index: BlobIndex) -> Option<BlobItem> {
		match self.frame(index.0) {
			Ok(range) => Some(BlobItem {
				raw: self.data.clone().map(|bytes| &bytes[range]),
				rva: self.rva.wrapping_add(index.0 as u32),
			}),
			Err(error) => {
				self.sink.warn(Warning::new(error, format!("#Blob[{:#X}]", index.0)));
				None
			},
		}
	}

	pub(crate) fn contains(&self, index: BlobIndex) -> bool {
		self.frame(index.0).is_ok()
	}

	fn frame(&self, offset: usize) -> Result<std::ops::Range<usize>, Error> {
		let first = *self
			.data
			.get(offset)
			.ok_or(Error::HeapIndexOutOfRange { heap: "#Blob", index: offset })?;
		let width = compressed_u32_width(first).ok_or(Error::InvalidCompressedInt)?;
		let mut cursor = Cursor::new(&self.data[offset..]);
		let length = read_compressed_u32(&mut cursor).map_err(|_| Error::InvalidCompressedInt)? as usize;
		let start = offset + width;
		let end = start.checked_add(length).ok_or(Error::InvalidCompressedInt)?;
		if end > self.data.len() {
			return Err(Error::TruncatedStructure("#Blob item"));
		}
		Ok(start..end)
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}
}

impl Debug for BlobHeap {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let mut dbg = f.debug_struct("BlobHeap");
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

	fn heap(bytes: &[u8]) -> BlobHeap {
		BlobHeap::new(ArcRef::new(Arc::from(bytes)), 0x4000, Arc::new(NullSink))
	}

	#[test]
	fn blobs_are_framed_by_compressed_lengths() {
		let heap = heap(&[0x00, 0x03, 1, 2, 3]);
		let item = heap.get(BlobIndex(1)).unwrap();
		assert_eq!(item.value(), [1, 2, 3]);
		assert_eq!(item.rva(), 0x4001);
		assert!(heap.get(BlobIndex(0)).unwrap().value().is_empty());
	}

	#[test]
	fn overrunning_declared_lengths_are_absent() {
		let heap = heap(&[0x00, 0x7F, 1, 2, 3]);
		assert!(heap.get(BlobIndex(1)).is_none());
		assert!(heap.get(BlobIndex(0x40)).is_none());
	}

	#[test]
	fn invalid_length_prefixes_are_absent() {
		let heap = heap(&[0xFF, 0, 0, 0, 0]);
		assert!(heap.get(BlobIndex(0)).is_none());
	}
}

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use owning_ref::ArcRef;
use uuid::Uuid;

use crate::diagnostics::{Warning, WarningSink};
use crate::error::Error;
use crate::raw::heaps::{GuidIndex, SizeDebugWrapper};

const GUID_SIZE: usize = 16;

/// The `#GUID` heap: fixed 16-byte records addressed by 1-based index.
pub struct GuidHeap {
	data: ArcRef<[u8]>,
	rva: u32,
	sink: Arc<dyn WarningSink>,
}

#[derive(Clone)]
pub struct GuidItem {
	raw: ArcRef<[u8]>,
	value: Uuid,
	rva: u32,
}

impl GuidItem {
	pub fn raw(&self) -> &[u8] {
		&self.raw
	}

	pub fn value(&self) -> Uuid {
		self.value
	}

	pub fn rva(&self) -> u32 {
		self.rva
	}
}

impl Debug for GuidItem {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "GuidItem({} @ {:#X})", self.value, self.rva)
	}
}

#[allow(clippy::len_without_is_empty)]
impl GuidHeap {
	pub(crate) fn new(data: ArcRef<[u8]>, rva: u32, sink: Arc<dyn WarningSink>) -> Self {
		Self { data, rva, sink }
	}

	pub fn len(&self) -> usize {
		self.data.len() / GUID_SIZE
	}

	/// 1-based lookup; index 0 is the well-known "absent" value.
	pub fn get(&self, index: GuidIndex) -> Option<GuidItem> {
		match index.0 {
			0 => None,
			_ if index.0 > self.len() => {
				self.sink.warn(Warning::new(
					Error::HeapIndexOutOfRange { heap: "#GUID", index: index.0 },
					format!("#GUID[{}]", index.0),
				));
				None
			},
			_ => {
				let offset = (index.0 - 1) * GUID_SIZE;
				let bytes = &self.data[offset..offset + GUID_SIZE];
				Some(GuidItem {
					raw: self.data.clone().map(|data| &data[offset..offset + GUID_SIZE]),
					value: Uuid::from_slice_le(bytes).ok()?,
					rva: self.rva.wrapping_add(offset as u32),
				})
			},
		}
	}

	pub(crate) fn contains(&self, index: GuidIndex) -> bool {
		index.0 <= self.len()
	}

	/// 0-based ordered view over the records.
	pub fn iter(&self) -> impl Iterator<Item = GuidItem> + '_ {
		(1..=self.len()).filter_map(|i| self.get(GuidIndex(i)))
	}
}

impl Debug for GuidHeap {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let mut dbg = f.debug_struct("GuidHeap");
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

	fn heap(bytes: &[u8]) -> GuidHeap {
		GuidHeap::new(ArcRef::new(Arc::from(bytes)), 0x3000, Arc::new(NullSink))
	}

	#[test]
	fn lookup_is_one_based_and_zero_is_absent() {
		let mut bytes = vec![0u8; 32];
		bytes[16] = 0xAA;
		let heap = heap(&bytes);
		assert_eq!(heap.len(), 2);
		assert!(heap.get(GuidIndex(0)).is_none());
		assert!(heap.get(GuidIndex(3)).is_none());
		let second = heap.get(GuidIndex(2)).unwrap();
		assert_eq!(second.rva(), 0x3010);
		assert_eq!(second.raw()[0], 0xAA);
	}

	#[test]
	fn the_sequence_view_covers_every_record() {
		let heap = heap(&[0u8; 48]);
		assert_eq!(heap.iter().count(), heap.len());
		assert_eq!(heap.len(), 3);
	}

	#[test]
	fn trailing_partial_records_are_ignored() {
		let heap = heap(&[0u8; 20]);
		assert_eq!(heap.len(), 1);
		assert!(heap.get(GuidIndex(2)).is_none());
	}
}

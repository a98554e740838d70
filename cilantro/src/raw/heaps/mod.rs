use std::fmt::{Debug, Formatter};
use std::io::{Cursor, Read};

pub use crate::raw::heaps::blob::{BlobHeap, BlobItem};
pub use crate::raw::heaps::guid::{GuidHeap, GuidItem};
pub use crate::raw::heaps::string::{StringHeap, StringItem, UserStringHeap, UserStringItem};

use crate::raw::indices::sizes::IndexSizes;
use crate::utilities::FromByteStream;

pub mod blob;
pub mod guid;
pub mod string;

/// Byte offset into `#Strings`.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StringIndex(pub usize);

impl FromByteStream for StringIndex {
	type Deps = IndexSizes;
	fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
		let mut bytes = 0usize.to_ne_bytes();
		stream.read_exact(&mut bytes[..sizes.string])?;
		Ok(Self(usize::from_le_bytes(bytes)))
	}
}

/// Byte offset into `#Blob`.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BlobIndex(pub usize);

impl FromByteStream for BlobIndex {
	type Deps = IndexSizes;
	fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
		let mut bytes = 0usize.to_ne_bytes();
		stream.read_exact(&mut bytes[..sizes.blob])?;
		Ok(Self(usize::from_le_bytes(bytes)))
	}
}

/// 1-based record index into `#GUID`; 0 means "absent".
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GuidIndex(pub usize);

impl FromByteStream for GuidIndex {
	type Deps = IndexSizes;
	fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
		let mut bytes = 0usize.to_ne_bytes();
		stream.read_exact(&mut bytes[..sizes.guid])?;
		Ok(Self(usize::from_le_bytes(bytes)))
	}
}

pub(crate) struct SizeDebugWrapper(pub usize);

impl Debug for SizeDebugWrapper {
	#[inline]
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str("[u8; ")?;
		Debug::fmt(&self.0, f)?;
		f.write_str("]")
	}
}

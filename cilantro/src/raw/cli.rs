use std::fmt::{Debug, Formatter};
use std::io::Cursor;
use std::sync::Arc;

use bitflags::bitflags;
use fxhash::FxHashMap;
use owning_ref::ArcRef;

use crate::diagnostics::{Warning, WarningSink};
use crate::error::Error;
use crate::pe::DirectoryEntry;
use crate::raw::heaps::{BlobHeap, GuidHeap, SizeDebugWrapper, StringHeap, UserStringHeap};
use crate::raw::indices::metadata_token::MetadataToken;
use crate::utilities::{impl_from_byte_stream, read_padded_name, round_to_multiple_of, FromByteStream};

const METADATA_SIGNATURE: u32 = 0x424A5342;

bitflags! {
	/// II.25.3.3.1
	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct RuntimeFlags: u32 {
		const IL_ONLY = 0x1;
		const REQUIRE_32_BIT = 0x2;
		const IL_LIBRARY = 0x4;
		const STRONG_NAME_SIGNED = 0x8;
		const NATIVE_ENTRY_POINT = 0x10;
		const TRACK_DEBUG_DATA = 0x10000;
		const PREFER_32_BIT = 0x20000;
	}
}

impl_from_byte_stream!(RuntimeFlags, u32);

/// II.25.3.3: the fixed 72-byte CLI header the CLR data directory points at.
#[derive(Debug, Copy, Clone)]
pub struct CliHeader {
	pub size_in_bytes: u32,
	pub major_runtime_version: u16,
	pub minor_runtime_version: u16,
	pub metadata: DirectoryEntry,
	pub flags: RuntimeFlags,
	pub entry_point_token: u32,
	pub resources: DirectoryEntry,
	pub strong_name_signature: DirectoryEntry,
	pub code_manager_table: DirectoryEntry,
	pub v_table_fixups: DirectoryEntry,
	pub export_address_table_jumps: DirectoryEntry,
	pub managed_native_header: DirectoryEntry,
}

impl CliHeader {
	pub(crate) fn read(stream: &mut Cursor<&[u8]>) -> Result<Self, Error> {
		let truncated = |_| Error::TruncatedStructure("CLI header");
		Ok(Self {
			size_in_bytes: u32::read(stream, &()).map_err(truncated)?,
			major_runtime_version: u16::read(stream, &()).map_err(truncated)?,
			minor_runtime_version: u16::read(stream, &()).map_err(truncated)?,
			metadata: DirectoryEntry::read(stream, &()).map_err(truncated)?,
			flags: RuntimeFlags::read(stream, &()).map_err(truncated)?,
			entry_point_token: u32::read(stream, &()).map_err(truncated)?,
			resources: DirectoryEntry::read(stream, &()).map_err(truncated)?,
			strong_name_signature: DirectoryEntry::read(stream, &()).map_err(truncated)?,
			code_manager_table: DirectoryEntry::read(stream, &()).map_err(truncated)?,
			v_table_fixups: DirectoryEntry::read(stream, &()).map_err(truncated)?,
			export_address_table_jumps: DirectoryEntry::read(stream, &()).map_err(truncated)?,
			managed_native_header: DirectoryEntry::read(stream, &()).map_err(truncated)?,
		})
	}

	/// The entry-point token, when one is present and well-formed.
	pub fn entry_point(&self) -> Option<MetadataToken> {
		match self.entry_point_token {
			0 => None,
			raw => MetadataToken::try_from(raw).ok(),
		}
	}
}

/// One stream directory entry, retained even when unrecognized or
/// unreadable.
pub struct StreamHeader {
	name: Box<str>,
	offset: u32,
	size: u32,
	rva: u32,
	data: Option<ArcRef<[u8]>>,
}

impl StreamHeader {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn offset(&self) -> u32 {
		self.offset
	}

	pub fn size(&self) -> u32 {
		self.size
	}

	pub fn rva(&self) -> u32 {
		self.rva
	}

	pub fn data(&self) -> Option<&[u8]> {
		self.data.as_deref()
	}
}

impl Debug for StreamHeader {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let mut dbg = f.debug_struct("StreamHeader");
		dbg.field("name", &self.name);
		dbg.field("offset", &self.offset);
		dbg.field("size", &self.size);
		dbg.field("data", &self.data.as_ref().map(|data| SizeDebugWrapper(data.len())));
		dbg.finish()
	}
}

/// II.24.2: the metadata root plus its stream directory and heap shortcuts.
///
/// All stream headers are preserved in file order; the shortcut accessors
/// resolve each recognized name to its **last** occurrence, which is what
/// the runtime does when a name is duplicated.
pub struct MetadataRoot {
	major_version: u16,
	minor_version: u16,
	version: Arc<str>,
	flags: u16,
	streams: Vec<StreamHeader>,
	by_name: FxHashMap<Box<str>, usize>,
	tables_index: Option<usize>,
	schema_index: Option<usize>,
	strings: Option<StringHeap>,
	user_strings: Option<UserStringHeap>,
	guids: Option<GuidHeap>,
	blobs: Option<BlobHeap>,
}

impl MetadataRoot {
	#[tracing::instrument(skip_all)]
	pub(crate) fn read(data: ArcRef<[u8]>, rva: u32, sink: &Arc<dyn WarningSink>) -> Result<Self, Error> {
		let truncated = |_| Error::TruncatedStructure("metadata root");
		let mut stream = Cursor::new(&*data);

		let signature = u32::read(&mut stream, &()).map_err(truncated)?;
		if signature != METADATA_SIGNATURE {
			return Err(Error::InvalidMetadataSignature { found: signature });
		}

		let major_version = u16::read(&mut stream, &()).map_err(truncated)?;
		let minor_version = u16::read(&mut stream, &()).map_err(truncated)?;
		let _reserved = u32::read(&mut stream, &()).map_err(truncated)?;

		let length = round_to_multiple_of(u32::read(&mut stream, &()).map_err(truncated)? as usize, 4);
		let position = stream.position() as usize;
		let version_bytes = data
			.get(position..position + length)
			.ok_or(Error::TruncatedStructure("metadata root"))?;
		stream.set_position((position + length) as u64);
		let version_bytes = version_bytes.split(|b| *b == 0).next().unwrap_or(&[]);
		let version: Arc<str> = match std::str::from_utf8(version_bytes) {
			Ok(version) => Arc::from(version),
			Err(_) => {
				sink.warn(Warning::new(Error::DecodingError("metadata version string"), "metadata root"));
				Arc::from(String::from_utf8_lossy(version_bytes).as_ref())
			},
		};

		let flags = u16::read(&mut stream, &()).map_err(truncated)?;
		let stream_count = u16::read(&mut stream, &()).map_err(truncated)? as usize;

		let mut streams = Vec::with_capacity(stream_count);
		for _ in 0..stream_count {
			let truncated = |_| Error::TruncatedStructure("stream header");
			let offset = u32::read(&mut stream, &()).map_err(truncated)?;
			let size = u32::read(&mut stream, &()).map_err(truncated)?;
			let name = read_padded_name(&mut stream, 32).map_err(truncated)?;

			let range = offset as usize..offset as usize + size as usize;
			let slice = match data.get(range.clone()) {
				Some(_) => Some(data.clone().map(|bytes| &bytes[range])),
				None => {
					sink.warn(Warning::new(
						Error::TruncatedStructure("stream data"),
						format!("stream {name:?}"),
					));
					None
				},
			};
			streams.push(StreamHeader {
				name: name.into_boxed_str(),
				offset,
				size,
				rva: rva.wrapping_add(offset),
				data: slice,
			});
		}

		let mut by_name = FxHashMap::default();
		let mut tables_index = None;
		let mut schema_index = None;
		let mut strings_index = None;
		let mut user_strings_index = None;
		let mut guids_index = None;
		let mut blobs_index = None;
		for (index, header) in streams.iter().enumerate() {
			by_name.insert(header.name.clone(), index);
			match header.name() {
				"#~" | "#-" => tables_index = Some(index),
				"#Schema" => schema_index = Some(index),
				"#Strings" => strings_index = Some(index),
				"#US" => user_strings_index = Some(index),
				"#GUID" => guids_index = Some(index),
				"#Blob" => blobs_index = Some(index),
				_ => {},
			}
		}

		let heap_parts = |index: Option<usize>| {
			let header = &streams[index?];
			Some((header.data.clone()?, header.rva))
		};

		let strings = heap_parts(strings_index)
			.map(|(data, rva)| StringHeap::new(data, rva, sink.clone()));
		let user_strings = heap_parts(user_strings_index)
			.map(|(data, rva)| UserStringHeap::new(data, rva, sink.clone()));
		let blobs = heap_parts(blobs_index)
			.map(|(data, rva)| BlobHeap::new(data, rva, sink.clone()));
		let guids = heap_parts(guids_index).map(|(data, rva)| {
			if data.len() % 16 != 0 {
				sink.warn(Warning::new(Error::TruncatedStructure("#GUID heap"), "stream \"#GUID\""));
			}
			GuidHeap::new(data, rva, sink.clone())
		});

		Ok(Self {
			major_version,
			minor_version,
			version,
			flags,
			streams,
			by_name,
			tables_index,
			schema_index,
			strings,
			user_strings,
			guids,
			blobs,
		})
	}

	pub fn major_version(&self) -> u16 {
		self.major_version
	}

	pub fn minor_version(&self) -> u16 {
		self.minor_version
	}

	pub fn version(&self) -> &str {
		&self.version
	}

	pub fn flags(&self) -> u16 {
		self.flags
	}

	/// Every stream header, in file order, duplicates included.
	pub fn streams(&self) -> &[StreamHeader] {
		&self.streams
	}

	/// Last-wins lookup by stream name.
	pub fn stream_by_name(&self, name: &str) -> Option<&StreamHeader> {
		self.by_name.get(name).map(|index| &self.streams[*index])
	}

	/// The primary tables stream (`#~` / `#-`), last occurrence.
	pub(crate) fn tables_stream(&self) -> Option<&StreamHeader> {
		self.tables_index.map(|index| &self.streams[index])
	}

	/// The `#Schema` stream, parsed as an alternative tables stream.
	pub(crate) fn schema_stream(&self) -> Option<&StreamHeader> {
		self.schema_index.map(|index| &self.streams[index])
	}

	#[allow(private_bounds)]
	pub fn get_heap<T>(&self) -> Option<&T>
	where
		Self: GetHeap<T>,
	{
		<Self as GetHeap<T>>::get_heap(self)
	}

	pub fn strings(&self) -> Option<&StringHeap> {
		self.strings.as_ref()
	}

	pub fn user_strings(&self) -> Option<&UserStringHeap> {
		self.user_strings.as_ref()
	}

	pub fn guids(&self) -> Option<&GuidHeap> {
		self.guids.as_ref()
	}

	pub fn blobs(&self) -> Option<&BlobHeap> {
		self.blobs.as_ref()
	}
}

impl Debug for MetadataRoot {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let mut dbg = f.debug_struct("MetadataRoot");
		dbg.field("version", &self.version);
		dbg.field("streams", &self.streams);
		dbg.finish()
	}
}

trait GetHeap<T> {
	fn get_heap(&self) -> Option<&T>;
}

impl GetHeap<StringHeap> for MetadataRoot {
	fn get_heap(&self) -> Option<&StringHeap> {
		self.strings.as_ref()
	}
}

impl GetHeap<UserStringHeap> for MetadataRoot {
	fn get_heap(&self) -> Option<&UserStringHeap> {
		self.user_strings.as_ref()
	}
}

impl GetHeap<GuidHeap> for MetadataRoot {
	fn get_heap(&self) -> Option<&GuidHeap> {
		self.guids.as_ref()
	}
}

impl GetHeap<BlobHeap> for MetadataRoot {
	fn get_heap(&self) -> Option<&BlobHeap> {
		self.blobs.as_ref()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::diagnostics::NullSink;
	use crate::raw::heaps::StringIndex;

	fn root(streams: &[(&str, &[u8])]) -> Vec<u8> {
		let version = b"v4.0.30319\0\0";
		let mut header_len = 16 + version.len() + 4;
		for (name, _) in streams {
			header_len += 8 + round_to_multiple_of(name.len() + 1, 4);
		}

		let mut out = Vec::new();
		out.extend_from_slice(&METADATA_SIGNATURE.to_le_bytes());
		out.extend_from_slice(&1u16.to_le_bytes());
		out.extend_from_slice(&1u16.to_le_bytes());
		out.extend_from_slice(&0u32.to_le_bytes());
		out.extend_from_slice(&(version.len() as u32).to_le_bytes());
		out.extend_from_slice(version);
		out.extend_from_slice(&0u16.to_le_bytes());
		out.extend_from_slice(&(streams.len() as u16).to_le_bytes());

		let mut offset = header_len;
		for (name, data) in streams {
			out.extend_from_slice(&(offset as u32).to_le_bytes());
			out.extend_from_slice(&(data.len() as u32).to_le_bytes());
			out.extend_from_slice(name.as_bytes());
			out.push(0);
			while out.len() % 4 != 0 {
				out.push(0);
			}
			offset += data.len();
		}
		for (_, data) in streams {
			out.extend_from_slice(data);
		}
		out
	}

	fn read(bytes: Vec<u8>) -> MetadataRoot {
		let sink: Arc<dyn WarningSink> = Arc::new(NullSink);
		MetadataRoot::read(ArcRef::new(Arc::from(bytes.into_boxed_slice())), 0x2000, &sink).unwrap()
	}

	#[test]
	fn recognized_streams_become_heaps() {
		let root = read(root(&[
			("#Strings", b"\0main\0"),
			("#US", &[0]),
			("#GUID", &[0u8; 16]),
			("#Blob", &[0]),
		]));
		assert_eq!(root.version(), "v4.0.30319");
		assert_eq!(root.streams().len(), 4);
		assert_eq!(root.strings().unwrap().get(StringIndex(1)).unwrap().value(), "main");
		assert_eq!(root.guids().unwrap().len(), 1);
	}

	#[test]
	fn duplicate_stream_names_resolve_to_the_last_header() {
		let root = read(root(&[
			("#Strings", b"\0first\0"),
			("#Strings", b"\0second\0"),
		]));
		assert_eq!(root.streams().len(), 2);
		assert_eq!(root.strings().unwrap().get(StringIndex(1)).unwrap().value(), "second");
		assert_eq!(root.stream_by_name("#Strings").unwrap().offset(), root.streams()[1].offset());
	}

	#[test]
	fn unrecognized_streams_are_retained_as_opaque() {
		let root = read(root(&[("#Custom", b"abc")]));
		assert_eq!(root.streams()[0].name(), "#Custom");
		assert_eq!(root.stream_by_name("#Custom").unwrap().data(), Some(b"abc".as_slice()));
	}

	#[test]
	fn a_bad_signature_is_fatal() {
		let mut bytes = root(&[]);
		bytes[0] = 0xFF;
		let sink: Arc<dyn WarningSink> = Arc::new(NullSink);
		let result = MetadataRoot::read(ArcRef::new(Arc::from(bytes.into_boxed_slice())), 0, &sink);
		assert!(matches!(result, Err(Error::InvalidMetadataSignature { .. })));
	}
}

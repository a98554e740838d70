use std::fmt::{Debug, Formatter};
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use owning_ref::ArcRef;

use crate::diagnostics::{Warning, WarningSink};
use crate::error::Error;
use crate::pe::PeView;
use crate::raw::cli::{CliHeader, MetadataRoot};
use crate::raw::heaps::{SizeDebugWrapper, StringItem};
use crate::raw::indices::coded_index::CodedTarget;
use crate::raw::tables::*;
use crate::utilities::{read_compressed_u32, FromByteStream};

const RESOURCE_SET_MAGIC: u32 = 0xBEEF_CACE;

/// One entity per `ManifestResource` row; the variant is decided by the
/// row's `Implementation` coded index.
#[derive(Debug)]
pub enum ClrResource {
	Internal(InternalResource),
	File(FileResource),
	Assembly(AssemblyResource),
}

impl ClrResource {
	pub fn name(&self) -> Option<&StringItem> {
		match self {
			ClrResource::Internal(resource) => resource.name.as_ref(),
			ClrResource::File(resource) => resource.name.as_ref(),
			ClrResource::Assembly(resource) => resource.name.as_ref(),
		}
	}

	pub fn flags(&self) -> ManifestResourceAttributes {
		match self {
			ClrResource::Internal(resource) => resource.flags,
			ClrResource::File(resource) => resource.flags,
			ClrResource::Assembly(resource) => resource.flags,
		}
	}
}

/// A resource embedded in this image.
#[derive(Debug)]
pub struct InternalResource {
	/// 1-based `ManifestResource` row index.
	pub row: usize,
	pub name: Option<StringItem>,
	pub flags: ManifestResourceAttributes,
	/// Offset relative to the CLI resources directory, as stored.
	pub offset: u32,
	/// Where the size-prefixed payload was found.
	pub rva: Option<u32>,
	/// The declared payload size.
	pub size: Option<u32>,
	pub data: Option<ResourceData>,
}

/// A resource living in another file of the assembly.
#[derive(Debug)]
pub struct FileResource {
	pub row: usize,
	pub name: Option<StringItem>,
	pub flags: ManifestResourceAttributes,
	pub offset: u32,
	/// 1-based `File` row index.
	pub file: usize,
	pub file_name: Option<StringItem>,
}

/// A resource living in another assembly; `data` is always absent here.
#[derive(Debug)]
pub struct AssemblyResource {
	pub row: usize,
	pub name: Option<StringItem>,
	pub flags: ManifestResourceAttributes,
	pub offset: u32,
	/// 1-based `AssemblyRef` row index.
	pub assembly_ref: usize,
	pub assembly_name: Option<StringItem>,
}

pub enum ResourceData {
	/// The payload did not carry the `.resources` magic.
	Raw(ArcRef<[u8]>),
	Set(ResourceSet),
}

impl ResourceData {
	pub fn as_raw(&self) -> Option<&[u8]> {
		match self {
			ResourceData::Raw(bytes) => Some(bytes),
			ResourceData::Set(_) => None,
		}
	}

	pub fn as_set(&self) -> Option<&ResourceSet> {
		match self {
			ResourceData::Raw(_) => None,
			ResourceData::Set(set) => Some(set),
		}
	}
}

impl Debug for ResourceData {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			ResourceData::Raw(bytes) => write!(f, "Raw({:?})", SizeDebugWrapper(bytes.len())),
			ResourceData::Set(set) => Debug::fmt(set, f),
		}
	}
}

/// A parsed `.resources` payload.
#[derive(Debug)]
pub struct ResourceSet {
	pub header: ResourceSetHeader,
	/// User type names, indexed by `tag - 0x40` in format version 2.
	pub types: Vec<String>,
	pub entries: Vec<ResourceEntry>,
}

#[derive(Debug)]
pub struct ResourceSetHeader {
	pub magic: u32,
	pub reader_count: u32,
	pub reader_types_size: u32,
	pub reader_types: Vec<String>,
	pub version: u32,
	pub resource_count: u32,
	pub type_count: u32,
	/// Relative to the start of the set.
	pub data_section_offset: u32,
}

#[derive(Debug, Default)]
pub struct ResourceEntry {
	pub type_tag: Option<u32>,
	pub type_name: Option<String>,
	pub hash: u32,
	/// Relative to the name section.
	pub name_position: u32,
	/// Relative to the data section.
	pub data_offset: Option<u32>,
	pub name: Option<String>,
	pub data: Option<ResourceValue>,
}

/// `System.DateTime` kind bits, exposed as stored; the tick count is the
/// remaining 62 bits.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DateTimeKind {
	Unspecified,
	Utc,
	Local,
	LocalAmbiguousDst,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ResourceDateTime {
	pub kind: DateTimeKind,
	/// 100ns intervals since 0001-01-01, kind bits masked off.
	pub ticks: i64,
}

/// Ticks between 0001-01-01 and the Unix epoch.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

impl ResourceDateTime {
	pub(crate) fn from_raw(raw: u64) -> Self {
		let kind = match raw >> 62 {
			0 => DateTimeKind::Unspecified,
			1 => DateTimeKind::Utc,
			2 => DateTimeKind::Local,
			_ => DateTimeKind::LocalAmbiguousDst,
		};
		Self {
			kind,
			ticks: (raw & 0x3FFF_FFFF_FFFF_FFFF) as i64,
		}
	}

	pub fn to_system_time(&self) -> SystemTime {
		let delta = self.ticks - UNIX_EPOCH_TICKS;
		let duration = Duration::from_nanos(delta.unsigned_abs() * 100);
		match delta >= 0 {
			true => SystemTime::UNIX_EPOCH + duration,
			false => SystemTime::UNIX_EPOCH - duration,
		}
	}
}

#[derive(Debug)]
pub enum ResourceValue {
	Null,
	String(String),
	Boolean(bool),
	Char(char),
	Byte(u8),
	SByte(i8),
	Int16(i16),
	UInt16(u16),
	Int32(i32),
	UInt32(u32),
	Int64(i64),
	UInt64(u64),
	Single(f32),
	Double(f64),
	Decimal([u8; 16]),
	DateTime(ResourceDateTime),
	/// 100ns tick count.
	TimeSpan(i64),
	Bytes(Vec<u8>),
	Stream(Vec<u8>),
	/// Unknown or undecodable entry: the payload after the type tag.
	Raw(Vec<u8>),
}

pub(crate) fn build(
	tables: &TableStream,
	metadata: &MetadataRoot,
	pe: &PeView,
	data: &ArcRef<[u8]>,
	header: &CliHeader,
	sink: &Arc<dyn WarningSink>,
) -> Vec<ClrResource> {
	let Some(rows) = tables.table::<ManifestResourceTable>() else {
		return Vec::new();
	};
	let strings = metadata.strings();
	let files = tables.table::<FileTable>();
	let assembly_refs = tables.table::<AssemblyRefTable>();

	let mut resources = Vec::with_capacity(rows.len());
	for (i, resource) in rows.rows().iter().enumerate() {
		let row = i + 1;
		let name = strings.and_then(|heap| heap.get(resource.name));
		let context = || format!("ManifestResource[{row}]");

		let parsed = match resource.implementation.decode() {
			CodedTarget::Row(TableKind::File, file) => ClrResource::File(FileResource {
				row,
				name,
				flags: resource.flags,
				offset: resource.offset,
				file,
				file_name: files
					.and_then(|table| table.get(file))
					.and_then(|file| strings.and_then(|heap| heap.get(file.name))),
			}),
			CodedTarget::Row(TableKind::AssemblyRef, assembly_ref) => {
				ClrResource::Assembly(AssemblyResource {
					row,
					name,
					flags: resource.flags,
					offset: resource.offset,
					assembly_ref,
					assembly_name: assembly_refs
						.and_then(|table| table.get(assembly_ref))
						.and_then(|reference| strings.and_then(|heap| heap.get(reference.name))),
				})
			},
			CodedTarget::Null => {
				let (rva, size, payload) =
					locate_internal(resource, pe, data, header, sink, &context);
				let parsed_data = payload.map(|payload| classify_payload(payload, sink, &context));
				ClrResource::Internal(InternalResource {
					row,
					name,
					flags: resource.flags,
					offset: resource.offset,
					rva,
					size,
					data: parsed_data,
				})
			},
			// A tag outside File | AssemblyRef | null cannot locate data.
			_ => {
				sink.warn(Warning::new(
					Error::DecodingError("manifest resource implementation"),
					context(),
				));
				ClrResource::Internal(InternalResource {
					row,
					name,
					flags: resource.flags,
					offset: resource.offset,
					rva: None,
					size: None,
					data: None,
				})
			},
		};
		resources.push(parsed);
	}
	resources
}

/// The payload lives at `resources_directory_rva + row.Offset` behind a
/// 4-byte little-endian size prefix. The stored offset is not an RVA.
fn locate_internal(
	resource: &ManifestResource,
	pe: &PeView,
	data: &ArcRef<[u8]>,
	header: &CliHeader,
	sink: &Arc<dyn WarningSink>,
	context: &impl Fn() -> String,
) -> (Option<u32>, Option<u32>, Option<ArcRef<[u8]>>) {
	if header.resources.rva == 0 {
		sink.warn(Warning::new(Error::TruncatedStructure("resources directory"), context()));
		return (None, None, None);
	}
	let rva = header.resources.rva.wrapping_add(resource.offset);
	let Some(prefix) = pe.slice_at_rva(data, rva, 4) else {
		sink.warn(Warning::new(Error::TruncatedStructure("resource size prefix"), context()));
		return (None, None, None);
	};
	let size = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
	let payload_rva = rva.wrapping_add(4);
	let Some(payload) = pe.slice_at_rva(data, payload_rva, size as usize) else {
		sink.warn(Warning::new(Error::TruncatedStructure("resource data"), context()));
		return (Some(rva), Some(size), None);
	};
	(Some(rva), Some(size), Some(payload))
}

fn classify_payload(
	payload: ArcRef<[u8]>,
	sink: &Arc<dyn WarningSink>,
	context: &impl Fn() -> String,
) -> ResourceData {
	let magic = payload
		.get(..4)
		.map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
	if magic != Some(RESOURCE_SET_MAGIC) {
		return ResourceData::Raw(payload);
	}
	match ResourceSet::read(&payload, sink) {
		Ok(set) => ResourceData::Set(set),
		Err(error) => {
			sink.warn(Warning::new(error, context()));
			ResourceData::Raw(payload)
		},
	}
}

impl ResourceSet {
	/// Parses the BinaryFormatter `.resources` layout. A malformed header
	/// fails the set (the caller degrades to raw bytes); malformed entries
	/// degrade individually and never abort the set.
	#[tracing::instrument(skip_all)]
	pub(crate) fn read(data: &[u8], sink: &Arc<dyn WarningSink>) -> Result<Self, Error> {
		let truncated = |_| Error::InvalidResourceSet("truncated header");
		let mut stream = Cursor::new(data);

		let magic = u32::read(&mut stream, &()).map_err(truncated)?;
		if magic != RESOURCE_SET_MAGIC {
			return Err(Error::InvalidResourceSet("bad magic"));
		}
		let reader_count = u32::read(&mut stream, &()).map_err(truncated)?;
		let reader_types_size = u32::read(&mut stream, &()).map_err(truncated)?;
		let reader_types_end = (stream.position() as usize)
			.checked_add(reader_types_size as usize)
			.filter(|end| *end <= data.len())
			.ok_or(Error::InvalidResourceSet("reader types overrun"))?;

		let mut reader_types = Vec::new();
		while (stream.position() as usize) < reader_types_end {
			match read_prefixed_utf8(&mut stream) {
				Ok(name) if stream.position() as usize <= reader_types_end => reader_types.push(name),
				_ => {
					sink.warn(Warning::new(
						Error::DecodingError("resource reader types"),
						"resource set header",
					));
					break;
				},
			}
		}
		stream.set_position(reader_types_end as u64);

		let version = u32::read(&mut stream, &()).map_err(truncated)?;
		let resource_count = u32::read(&mut stream, &()).map_err(truncated)?;
		let type_count = u32::read(&mut stream, &()).map_err(truncated)?;
		if resource_count as usize > data.len() || type_count as usize > data.len() {
			return Err(Error::InvalidResourceSet("implausible counts"));
		}

		let mut types = Vec::with_capacity(type_count as usize);
		for _ in 0..type_count {
			types.push(read_prefixed_utf8(&mut stream).map_err(|_| Error::InvalidResourceSet("type table"))?);
		}

		// PAD to an 8-byte boundary relative to the set start.
		let position = stream.position();
		stream.set_position(position + (8 - position % 8) % 8);

		let mut hashes = Vec::with_capacity(resource_count as usize);
		for _ in 0..resource_count {
			hashes.push(u32::read(&mut stream, &()).map_err(truncated)?);
		}
		let mut name_positions = Vec::with_capacity(resource_count as usize);
		for _ in 0..resource_count {
			name_positions.push(u32::read(&mut stream, &()).map_err(truncated)?);
		}
		let data_section_offset = u32::read(&mut stream, &()).map_err(truncated)?;
		let name_section = stream.position() as usize;
		let data_section = data_section_offset as usize;

		let mut entries: Vec<ResourceEntry> = Vec::with_capacity(resource_count as usize);
		for i in 0..resource_count as usize {
			let mut entry = ResourceEntry {
				hash: hashes[i],
				name_position: name_positions[i],
				..ResourceEntry::default()
			};
			let context = || format!("resource set entry {i}");

			let name_at = name_section + name_positions[i] as usize;
			if name_at >= data.len() {
				sink.warn(Warning::new(Error::TruncatedStructure("resource name"), context()));
				entries.push(entry);
				continue;
			}
			let mut cursor = Cursor::new(data);
			cursor.set_position(name_at as u64);
			match read_prefixed_utf16(&mut cursor) {
				Ok(name) => entry.name = Some(name),
				Err(error) => {
					sink.warn(Warning::new(error, context()));
					entries.push(entry);
					continue;
				},
			}
			match u32::read(&mut cursor, &()) {
				Ok(offset) => entry.data_offset = Some(offset),
				Err(_) => {
					sink.warn(Warning::new(Error::TruncatedStructure("resource name"), context()));
				},
			}
			entries.push(entry);
		}

		// A data entry extends to the next entry's offset, or the set's end.
		let mut sorted_offsets: Vec<u32> = entries.iter().filter_map(|e| e.data_offset).collect();
		sorted_offsets.sort_unstable();
		for (i, entry) in entries.iter_mut().enumerate() {
			let Some(offset) = entry.data_offset else { continue };
			let context = || format!("resource set entry {i}");
			let start = data_section + offset as usize;
			if start >= data.len() || data_section >= data.len() {
				sink.warn(Warning::new(Error::TruncatedStructure("resource data"), context()));
				continue;
			}
			let end = sorted_offsets
				.iter()
				.find(|next| **next > offset)
				.map(|next| data_section + *next as usize)
				.unwrap_or(data.len())
				.clamp(start, data.len());
			let (tag, type_name, value) = decode_entry(&data[start..end], version, &types, sink, &context);
			entry.type_tag = tag;
			entry.type_name = type_name;
			entry.data = value;
		}

		Ok(Self {
			header: ResourceSetHeader {
				magic,
				reader_count,
				reader_types_size,
				reader_types,
				version,
				resource_count,
				type_count,
				data_section_offset,
			},
			types,
			entries,
		})
	}
}

/// Format-version-2 primitive type codes; tags at or above 0x40 index the
/// user type table instead.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ResourceTypeCode {
	Null = 0x00,
	String = 0x01,
	Boolean = 0x02,
	Char = 0x03,
	Byte = 0x04,
	SByte = 0x05,
	Int16 = 0x06,
	UInt16 = 0x07,
	Int32 = 0x08,
	UInt32 = 0x09,
	Int64 = 0x0A,
	UInt64 = 0x0B,
	Single = 0x0C,
	Double = 0x0D,
	Decimal = 0x0E,
	DateTime = 0x0F,
	TimeSpan = 0x10,
	ByteArray = 0x20,
	Stream = 0x21,
}

impl ResourceTypeCode {
	fn from_tag(tag: u32) -> Option<Self> {
		Some(match tag {
			0x00 => Self::Null,
			0x01 => Self::String,
			0x02 => Self::Boolean,
			0x03 => Self::Char,
			0x04 => Self::Byte,
			0x05 => Self::SByte,
			0x06 => Self::Int16,
			0x07 => Self::UInt16,
			0x08 => Self::Int32,
			0x09 => Self::UInt32,
			0x0A => Self::Int64,
			0x0B => Self::UInt64,
			0x0C => Self::Single,
			0x0D => Self::Double,
			0x0E => Self::Decimal,
			0x0F => Self::DateTime,
			0x10 => Self::TimeSpan,
			0x20 => Self::ByteArray,
			0x21 => Self::Stream,
			_ => return None,
		})
	}

	pub fn type_name(&self) -> &'static str {
		match self {
			Self::Null => "System.Null",
			Self::String => "System.String",
			Self::Boolean => "System.Boolean",
			Self::Char => "System.Char",
			Self::Byte => "System.Byte",
			Self::SByte => "System.SByte",
			Self::Int16 => "System.Int16",
			Self::UInt16 => "System.UInt16",
			Self::Int32 => "System.Int32",
			Self::UInt32 => "System.UInt32",
			Self::Int64 => "System.Int64",
			Self::UInt64 => "System.UInt64",
			Self::Single => "System.Single",
			Self::Double => "System.Double",
			Self::Decimal => "System.Decimal",
			Self::DateTime => "System.DateTime",
			Self::TimeSpan => "System.TimeSpan",
			Self::ByteArray => "System.Byte[]",
			Self::Stream => "System.IO.MemoryStream",
		}
	}
}

fn decode_entry(
	slice: &[u8],
	version: u32,
	types: &[String],
	sink: &Arc<dyn WarningSink>,
	context: &impl Fn() -> String,
) -> (Option<u32>, Option<String>, Option<ResourceValue>) {
	let mut stream = Cursor::new(slice);
	let Ok(tag) = read_compressed_u32(&mut stream) else {
		sink.warn(Warning::new(Error::InvalidCompressedInt, context()));
		return (None, None, Some(ResourceValue::Raw(slice.to_vec())));
	};

	let type_name: Option<String> = match version {
		2.. if tag < 0x40 => ResourceTypeCode::from_tag(tag).map(|code| code.type_name().to_string()),
		2.. => types.get(tag as usize - 0x40).cloned(),
		_ => types.get(tag as usize).cloned(),
	};
	let rest = slice[stream.position() as usize..].to_vec();

	let Some(type_name) = type_name else {
		sink.warn(Warning::new(Error::UnknownResourceType(format!("tag {tag}")), context()));
		return (Some(tag), None, Some(ResourceValue::Raw(rest)));
	};

	match decode_value(&type_name, &mut stream) {
		Ok(value) => (Some(tag), Some(type_name), Some(value)),
		Err(error) => {
			sink.warn(Warning::new(error, context()));
			(Some(tag), Some(type_name), Some(ResourceValue::Raw(rest)))
		},
	}
}

fn decode_value(type_name: &str, stream: &mut Cursor<&[u8]>) -> Result<ResourceValue, Error> {
	let truncated = |_| Error::TruncatedStructure("resource value");
	// Assembly-qualified names compare by their plain type part.
	let plain = type_name.split(',').next().unwrap_or(type_name).trim();
	Ok(match plain {
		"System.Null" => ResourceValue::Null,
		"System.String" => ResourceValue::String(read_prefixed_utf8(stream)?),
		"System.Boolean" => ResourceValue::Boolean(u8::read(stream, &()).map_err(truncated)? != 0),
		"System.Char" => {
			let unit = u16::read(stream, &()).map_err(truncated)?;
			ResourceValue::Char(
				char::from_u32(unit as u32).ok_or(Error::DecodingError("System.Char resource"))?,
			)
		},
		"System.Byte" => ResourceValue::Byte(u8::read(stream, &()).map_err(truncated)?),
		"System.SByte" => ResourceValue::SByte(u8::read(stream, &()).map_err(truncated)? as i8),
		"System.Int16" => ResourceValue::Int16(u16::read(stream, &()).map_err(truncated)? as i16),
		"System.UInt16" => ResourceValue::UInt16(u16::read(stream, &()).map_err(truncated)?),
		"System.Int32" => ResourceValue::Int32(u32::read(stream, &()).map_err(truncated)? as i32),
		"System.UInt32" => ResourceValue::UInt32(u32::read(stream, &()).map_err(truncated)?),
		"System.Int64" => ResourceValue::Int64(u64::read(stream, &()).map_err(truncated)? as i64),
		"System.UInt64" => ResourceValue::UInt64(u64::read(stream, &()).map_err(truncated)?),
		"System.Single" => {
			ResourceValue::Single(f32::from_bits(u32::read(stream, &()).map_err(truncated)?))
		},
		"System.Double" => {
			ResourceValue::Double(f64::from_bits(u64::read(stream, &()).map_err(truncated)?))
		},
		"System.Decimal" => ResourceValue::Decimal(<[u8; 16]>::read(stream, &()).map_err(truncated)?),
		"System.DateTime" => {
			ResourceValue::DateTime(ResourceDateTime::from_raw(u64::read(stream, &()).map_err(truncated)?))
		},
		"System.TimeSpan" => ResourceValue::TimeSpan(u64::read(stream, &()).map_err(truncated)? as i64),
		"System.Byte[]" => {
			let length = u32::read(stream, &()).map_err(truncated)? as usize;
			ResourceValue::Bytes(read_exact_vec(stream, length)?)
		},
		"System.IO.MemoryStream" => {
			let length = u32::read(stream, &()).map_err(truncated)? as usize;
			ResourceValue::Stream(read_exact_vec(stream, length)?)
		},
		_ => return Err(Error::UnknownResourceType(type_name.to_string())),
	})
}

fn read_exact_vec(stream: &mut Cursor<&[u8]>, length: usize) -> Result<Vec<u8>, Error> {
	let position = stream.position() as usize;
	let bytes = stream
		.get_ref()
		.get(position..position + length)
		.ok_or(Error::TruncatedStructure("resource value"))?;
	stream.set_position((position + length) as u64);
	Ok(bytes.to_vec())
}

fn read_prefixed_utf8(stream: &mut Cursor<&[u8]>) -> Result<String, Error> {
	let length = read_compressed_u32(stream).map_err(|_| Error::InvalidCompressedInt)? as usize;
	let bytes = read_exact_vec(stream, length)?;
	String::from_utf8(bytes).map_err(|_| Error::DecodingError("resource string"))
}

fn read_prefixed_utf16(stream: &mut Cursor<&[u8]>) -> Result<String, Error> {
	let length = read_compressed_u32(stream).map_err(|_| Error::InvalidCompressedInt)? as usize;
	let bytes = read_exact_vec(stream, length)?;
	let units: Vec<u16> = bytes
		.chunks_exact(2)
		.map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
		.collect();
	String::from_utf16(&units).map_err(|_| Error::DecodingError("resource name"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::diagnostics::{CollectSink, NullSink};
	use crate::utilities::write_compressed_u32;

	fn sink() -> Arc<dyn WarningSink> {
		Arc::new(NullSink)
	}

	fn prefixed_utf8(out: &mut Vec<u8>, value: &str) {
		write_compressed_u32(out, value.len() as u32);
		out.extend_from_slice(value.as_bytes());
	}

	fn string_set(name: &str, value: &str) -> Vec<u8> {
		let mut reader_types = Vec::new();
		prefixed_utf8(&mut reader_types, "System.Resources.ResourceReader");
		prefixed_utf8(&mut reader_types, "System.Resources.RuntimeResourceSet");

		let mut out = Vec::new();
		out.extend_from_slice(&RESOURCE_SET_MAGIC.to_le_bytes());
		out.extend_from_slice(&1u32.to_le_bytes());
		out.extend_from_slice(&(reader_types.len() as u32).to_le_bytes());
		out.extend_from_slice(&reader_types);
		out.extend_from_slice(&2u32.to_le_bytes());
		out.extend_from_slice(&1u32.to_le_bytes());
		out.extend_from_slice(&0u32.to_le_bytes());
		while out.len() % 8 != 0 {
			out.push(0xAA);
		}
		out.extend_from_slice(&0u32.to_le_bytes());

		let mut name_section = Vec::new();
		let utf16: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
		write_compressed_u32(&mut name_section, utf16.len() as u32);
		name_section.extend_from_slice(&utf16);
		name_section.extend_from_slice(&0u32.to_le_bytes());

		let data_section_offset = out.len() + 4 + 4 + name_section.len();
		out.extend_from_slice(&0u32.to_le_bytes());
		out.extend_from_slice(&(data_section_offset as u32).to_le_bytes());
		out.extend_from_slice(&name_section);

		out.push(0x01);
		prefixed_utf8(&mut out, value);
		out
	}

	#[test]
	fn a_one_string_set_decodes_end_to_end() {
		let bytes = string_set("greeting", "hello");
		let set = ResourceSet::read(&bytes, &sink()).unwrap();
		assert_eq!(set.header.version, 2);
		assert_eq!(set.header.resource_count, 1);
		assert_eq!(set.entries.len(), set.header.resource_count as usize);
		let entry = &set.entries[0];
		assert_eq!(entry.name.as_deref(), Some("greeting"));
		assert_eq!(entry.type_name.as_deref(), Some("System.String"));
		assert!(matches!(entry.data, Some(ResourceValue::String(ref s)) if s == "hello"));
	}

	#[test]
	fn date_time_entries_expose_kind_and_masked_ticks() {
		let raw = (2u64 << 62) | 630_822_816_000_000_000;
		let parsed = ResourceDateTime::from_raw(raw);
		assert_eq!(parsed.kind, DateTimeKind::Local);
		assert_eq!(parsed.ticks, 630_822_816_000_000_000);
		assert!(parsed.to_system_time() > SystemTime::UNIX_EPOCH);
	}

	#[test]
	fn unknown_entry_types_keep_raw_bytes_and_warn() {
		let collect = Arc::new(CollectSink::default());
		let sink: Arc<dyn WarningSink> = collect.clone();
		let slice = [0x42u8, 1, 2, 3];
		let (tag, type_name, value) = decode_entry(&slice, 2, &[], &sink, &|| "entry".into());
		assert_eq!(tag, Some(0x42));
		assert_eq!(type_name, None);
		assert!(matches!(value, Some(ResourceValue::Raw(ref bytes)) if bytes == &[1, 2, 3]));
		assert_eq!(collect.len(), 1);
	}

	#[test]
	fn a_bad_magic_fails_the_set() {
		let bytes = [0u8; 32];
		assert!(matches!(
			ResourceSet::read(&bytes, &sink()),
			Err(Error::InvalidResourceSet("bad magic"))
		));
	}
}

//! Byte-level fixtures: a minimal PE32 image with one section holding the
//! CLI header, a metadata root built from named streams, and optionally a
//! CLI resources directory.

pub const SECTION_RVA: u32 = 0x2000;
pub const SECTION_FILE_OFFSET: u32 = 0x200;
pub const METADATA_RVA: u32 = SECTION_RVA + 0x48;

pub fn push_u16(out: &mut Vec<u8>, value: u16) {
	out.extend_from_slice(&value.to_le_bytes());
}

pub fn push_u32(out: &mut Vec<u8>, value: u32) {
	out.extend_from_slice(&value.to_le_bytes());
}

fn push_u64(out: &mut Vec<u8>, value: u64) {
	out.extend_from_slice(&value.to_le_bytes());
}

/// CompressedInt for the small values fixtures need.
pub fn push_compressed(out: &mut Vec<u8>, value: u32) {
	assert!(value < 0x80);
	out.push(value as u8);
}

fn round_up(value: usize, multiple: usize) -> usize {
	((value + multiple - 1) / multiple) * multiple
}

/// A PE32 image whose CLR directory points at a CLI header in `.text`,
/// followed by `metadata` and optionally a resources blob.
pub fn clr_image(metadata: &[u8], resources: Option<&[u8]>) -> Vec<u8> {
	let resources_offset = round_up(0x48 + metadata.len(), 8);
	let resources_rva = SECTION_RVA + resources_offset as u32;
	let resources_len = resources.map_or(0, <[u8]>::len);

	// CLI header + metadata (+ resources) form the section payload.
	let mut section = Vec::new();
	push_u32(&mut section, 72);
	push_u16(&mut section, 2);
	push_u16(&mut section, 5);
	push_u32(&mut section, METADATA_RVA);
	push_u32(&mut section, metadata.len() as u32);
	push_u32(&mut section, 0x1); // IL_ONLY
	push_u32(&mut section, 0);
	match resources {
		Some(_) => {
			push_u32(&mut section, resources_rva);
			push_u32(&mut section, resources_len as u32);
		},
		None => {
			push_u32(&mut section, 0);
			push_u32(&mut section, 0);
		},
	}
	for _ in 0..5 {
		push_u64(&mut section, 0);
	}
	assert_eq!(section.len(), 72);
	section.extend_from_slice(metadata);
	if let Some(resources) = resources {
		section.resize(resources_offset, 0);
		section.extend_from_slice(resources);
	}

	let mut image = Vec::new();

	// DOS header: magic + e_lfanew at 0x3C.
	image.extend_from_slice(b"MZ");
	image.resize(0x3C, 0);
	push_u32(&mut image, 0x80);
	image.resize(0x80, 0);

	// PE signature + COFF header.
	image.extend_from_slice(b"PE\0\0");
	push_u16(&mut image, 0x014C);
	push_u16(&mut image, 1);
	push_u32(&mut image, 0);
	push_u32(&mut image, 0);
	push_u32(&mut image, 0);
	push_u16(&mut image, 0xE0);
	push_u16(&mut image, 0x2102);

	// PE32 optional header.
	push_u16(&mut image, 0x010B);
	image.extend_from_slice(&[8, 0]);
	push_u32(&mut image, section.len() as u32);
	push_u32(&mut image, 0);
	push_u32(&mut image, 0);
	push_u32(&mut image, 0);
	push_u32(&mut image, SECTION_RVA);
	push_u32(&mut image, 0x4000);
	push_u32(&mut image, 0x0040_0000);
	push_u32(&mut image, 0x1000);
	push_u32(&mut image, 0x200);
	push_u16(&mut image, 4);
	push_u16(&mut image, 0);
	push_u16(&mut image, 0);
	push_u16(&mut image, 0);
	push_u16(&mut image, 4);
	push_u16(&mut image, 0);
	push_u32(&mut image, 0);
	push_u32(&mut image, SECTION_RVA + 0x1000);
	push_u32(&mut image, 0x200);
	push_u32(&mut image, 0);
	push_u16(&mut image, 3);
	push_u16(&mut image, 0);
	push_u32(&mut image, 0x0010_0000);
	push_u32(&mut image, 0x1000);
	push_u32(&mut image, 0x0010_0000);
	push_u32(&mut image, 0x1000);
	push_u32(&mut image, 0);
	push_u32(&mut image, 16);
	for directory in 0..16u32 {
		match directory {
			14 => {
				push_u32(&mut image, SECTION_RVA);
				push_u32(&mut image, 72);
			},
			_ => {
				push_u32(&mut image, 0);
				push_u32(&mut image, 0);
			},
		}
	}

	// Section header.
	image.extend_from_slice(b".text\0\0\0");
	push_u32(&mut image, section.len() as u32);
	push_u32(&mut image, SECTION_RVA);
	push_u32(&mut image, section.len() as u32);
	push_u32(&mut image, SECTION_FILE_OFFSET);
	push_u32(&mut image, 0);
	push_u32(&mut image, 0);
	push_u16(&mut image, 0);
	push_u16(&mut image, 0);
	push_u32(&mut image, 0x6000_0020);

	image.resize(SECTION_FILE_OFFSET as usize, 0);
	image.extend_from_slice(&section);
	image
}

/// A metadata root holding `streams` in order, offsets computed.
pub fn metadata_root(streams: &[(&str, &[u8])]) -> Vec<u8> {
	let version = b"v4.0.30319\0\0";
	let mut header_len = 16 + version.len() + 4;
	for (name, _) in streams {
		header_len += 8 + round_up(name.len() + 1, 4);
	}

	let mut out = Vec::new();
	push_u32(&mut out, 0x424A5342);
	push_u16(&mut out, 1);
	push_u16(&mut out, 1);
	push_u32(&mut out, 0);
	push_u32(&mut out, version.len() as u32);
	out.extend_from_slice(version);
	push_u16(&mut out, 0);
	push_u16(&mut out, streams.len() as u16);

	let mut offset = header_len;
	for (name, data) in streams {
		push_u32(&mut out, offset as u32);
		push_u32(&mut out, data.len() as u32);
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

/// A `#~` stream: header, row counts in ascending table order, then rows.
pub fn tables_stream(tables: &[(u32, Vec<Vec<u8>>)]) -> Vec<u8> {
	let mut valid = 0u64;
	for (kind, _) in tables {
		valid |= 1 << kind;
	}

	let mut out = Vec::new();
	push_u32(&mut out, 0);
	out.extend_from_slice(&[2, 0, 0, 1]);
	push_u64(&mut out, valid);
	push_u64(&mut out, 0);

	let mut ordered: Vec<_> = tables.iter().collect();
	ordered.sort_by_key(|(kind, _)| *kind);
	for (_, rows) in &ordered {
		push_u32(&mut out, rows.len() as u32);
	}
	for (_, rows) in &ordered {
		for row in rows.iter() {
			out.extend_from_slice(row);
		}
	}
	out
}

pub fn module_row(name: u16) -> Vec<u8> {
	let mut row = Vec::new();
	push_u16(&mut row, 0);
	push_u16(&mut row, name);
	push_u16(&mut row, 0);
	push_u16(&mut row, 0);
	push_u16(&mut row, 0);
	row
}

pub fn type_def_row(name: u16, field_list: u16, method_list: u16) -> Vec<u8> {
	let mut row = Vec::new();
	push_u32(&mut row, 0x0010_0001);
	push_u16(&mut row, name);
	push_u16(&mut row, 0);
	push_u16(&mut row, 0);
	push_u16(&mut row, field_list);
	push_u16(&mut row, method_list);
	row
}

pub fn method_def_row(rva: u32, name: u16, param_list: u16) -> Vec<u8> {
	let mut row = Vec::new();
	push_u32(&mut row, rva);
	push_u16(&mut row, 0);
	push_u16(&mut row, 0x0006);
	push_u16(&mut row, name);
	push_u16(&mut row, 0);
	push_u16(&mut row, param_list);
	row
}

pub fn manifest_resource_row(offset: u32, name: u16, implementation: u16) -> Vec<u8> {
	let mut row = Vec::new();
	push_u32(&mut row, offset);
	push_u32(&mut row, 0x1);
	push_u16(&mut row, name);
	push_u16(&mut row, implementation);
	row
}

pub fn assembly_ref_row(name: u16) -> Vec<u8> {
	let mut row = Vec::new();
	push_u16(&mut row, 4);
	push_u16(&mut row, 8);
	push_u16(&mut row, 0);
	push_u16(&mut row, 0);
	push_u32(&mut row, 0);
	push_u16(&mut row, 0);
	push_u16(&mut row, name);
	push_u16(&mut row, 0);
	push_u16(&mut row, 0);
	row
}

fn push_prefixed_utf8(out: &mut Vec<u8>, value: &str) {
	push_compressed(out, value.len() as u32);
	out.extend_from_slice(value.as_bytes());
}

/// A format-version-2 `.resources` set with one `System.String` entry.
pub fn string_resource_set(name: &str, value: &str) -> Vec<u8> {
	let mut reader_types = Vec::new();
	push_prefixed_utf8(&mut reader_types, "System.Resources.ResourceReader");
	push_prefixed_utf8(&mut reader_types, "System.Resources.RuntimeResourceSet");

	let mut out = Vec::new();
	push_u32(&mut out, 0xBEEF_CACE);
	push_u32(&mut out, 1);
	push_u32(&mut out, reader_types.len() as u32);
	out.extend_from_slice(&reader_types);
	push_u32(&mut out, 2);
	push_u32(&mut out, 1);
	push_u32(&mut out, 0);
	while out.len() % 8 != 0 {
		out.push(0);
	}
	push_u32(&mut out, 0x1234_5678);

	let mut name_section = Vec::new();
	let utf16: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
	push_compressed(&mut name_section, utf16.len() as u32);
	name_section.extend_from_slice(&utf16);
	push_u32(&mut name_section, 0);

	let data_section_offset = out.len() + 4 + 4 + name_section.len();
	push_u32(&mut out, 0);
	push_u32(&mut out, data_section_offset as u32);
	out.extend_from_slice(&name_section);

	out.push(0x01);
	push_prefixed_utf8(&mut out, value);
	out
}

/// The size-prefixed form the CLI resources directory stores.
pub fn size_prefixed(payload: &[u8]) -> Vec<u8> {
	let mut out = Vec::new();
	push_u32(&mut out, payload.len() as u32);
	out.extend_from_slice(payload);
	out
}

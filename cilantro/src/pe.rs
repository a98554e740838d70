use std::io::Cursor;

use owning_ref::ArcRef;

use crate::error::Error;
use crate::utilities::FromByteStream;

/// An (RVA, size) pair from a PE data directory or the CLI header.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct DirectoryEntry {
	pub rva: u32,
	pub size: u32,
}

impl FromByteStream for DirectoryEntry {
	type Deps = ();
	fn read(stream: &mut Cursor<&[u8]>, _: &Self::Deps) -> std::io::Result<Self> {
		Ok(Self {
			rva: u32::read(stream, &())?,
			size: u32::read(stream, &())?,
		})
	}
}

#[derive(Debug, Copy, Clone)]
struct SectionRange {
	virtual_address: u32,
	raw_offset: u32,
	raw_size: u32,
}

/// Thin adapter over the external PE parser.
///
/// The container format is goblin's problem; this type keeps only what the
/// metadata decoder needs — an owned section map for RVA translation and the
/// CLR data directory — so no borrow of the goblin parse escapes.
#[derive(Debug, Clone)]
pub struct PeView {
	sections: Vec<SectionRange>,
	clr_directory: Option<DirectoryEntry>,
}

impl PeView {
	pub fn parse(data: &[u8]) -> Result<Self, Error> {
		let pe = goblin::pe::PE::parse(data)?;
		let clr_directory = pe
			.header
			.optional_header
			.as_ref()
			.and_then(|opt| opt.data_directories.get_clr_runtime_header())
			.map(|dir| DirectoryEntry { rva: dir.virtual_address, size: dir.size });
		let sections = pe
			.sections
			.iter()
			.map(|s| SectionRange {
				virtual_address: s.virtual_address,
				raw_offset: s.pointer_to_raw_data,
				raw_size: s.size_of_raw_data,
			})
			.collect();
		Ok(Self { sections, clr_directory })
	}

	pub fn clr_directory(&self) -> Option<DirectoryEntry> {
		self.clr_directory
	}

	/// Maps an RVA to a file offset through the section table.
	pub fn rva_to_offset(&self, rva: u32) -> Option<usize> {
		let section = self.sections.iter().find(|s| {
			rva >= s.virtual_address && rva - s.virtual_address < s.raw_size
		})?;
		Some(section.raw_offset as usize + (rva - section.virtual_address) as usize)
	}

	/// A bounded, shared slice of the image at `rva`.
	pub fn slice_at_rva(&self, data: &ArcRef<[u8]>, rva: u32, len: usize) -> Option<ArcRef<[u8]>> {
		let offset = self.rva_to_offset(rva)?;
		let end = offset.checked_add(len)?;
		(end <= data.len()).then(|| data.clone().map(|bytes| &bytes[offset..end]))
	}
}

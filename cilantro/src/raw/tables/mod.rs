use std::any::Any;
use std::fmt::Debug;
use std::io::Cursor;
use std::sync::Arc;

use cilantro_derive::FromRepr;

use crate::diagnostics::{Warning, WarningSink};
use crate::error::Error;
use crate::raw::indices::sizes::IndexSizes;
use crate::utilities::{enumerate_set_bits, FromByteStream};

pub use crate::raw::tables::rows::*;

pub mod rows;

/// Skip 4 bytes between the row-count array and the first row.
const HEAP_SIZES_EXTRA_DATA: u8 = 0x08;

/// ECMA-335 II.22 table numbering, including the portable-PDB range.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromRepr)]
pub enum TableKind {
	Module = 0x00,
	TypeRef = 0x01,
	TypeDef = 0x02,
	FieldPtr = 0x03,
	Field = 0x04,
	MethodPtr = 0x05,
	MethodDef = 0x06,
	ParamPtr = 0x07,
	Param = 0x08,
	InterfaceImpl = 0x09,
	MemberRef = 0x0a,
	Constant = 0x0b,
	CustomAttribute = 0x0c,
	FieldMarshal = 0x0d,
	DeclSecurity = 0x0e,
	ClassLayout = 0x0f,
	FieldLayout = 0x10,
	StandAloneSig = 0x11,
	EventMap = 0x12,
	EventPtr = 0x13,
	Event = 0x14,
	PropertyMap = 0x15,
	PropertyPtr = 0x16,
	Property = 0x17,
	MethodSemantics = 0x18,
	MethodImpl = 0x19,
	ModuleRef = 0x1a,
	TypeSpec = 0x1b,
	ImplMap = 0x1c,
	FieldRVA = 0x1d,
	EncLog = 0x1e,
	EncMap = 0x1f,
	Assembly = 0x20,
	AssemblyProcessor = 0x21,
	AssemblyOS = 0x22,
	AssemblyRef = 0x23,
	AssemblyRefProcessor = 0x24,
	AssemblyRefOS = 0x25,
	File = 0x26,
	ExportedType = 0x27,
	ManifestResource = 0x28,
	NestedClass = 0x29,
	GenericParam = 0x2a,
	MethodSpec = 0x2b,
	GenericParamConstraint = 0x2c,

	Document = 0x30,
	MethodDebugInformation = 0x31,
	LocalScope = 0x32,
	LocalVariable = 0x33,
	LocalConstant = 0x34,
	ImportScope = 0x35,
	StateMachineMethod = 0x36,
	CustomDebugInformation = 0x37,
}

#[allow(clippy::len_without_is_empty)]
pub trait Table: Debug + Send + Sync {
	fn len(&self) -> usize;
	fn kind(&self) -> TableKind;
	fn as_any(&self) -> &dyn Any;
}

/// Implemented by `#[derive(Table)]`; drives the generic materialization loop.
pub(crate) trait ReadTable: Sized {
	fn read(stream: &mut Cursor<&[u8]>, sizes: &IndexSizes, len: usize) -> std::io::Result<Self>;
	fn row_width(sizes: &IndexSizes) -> usize;
}

/// A parsed `#~` / `#-` / `#Schema` stream.
///
/// Row schemas are dynamic: widths are computed once from the heap-size byte
/// and the declared row counts, then reused for every row of every table.
#[derive(Debug)]
pub struct TableStream {
	major_version: u8,
	minor_version: u8,
	heap_sizes: u8,
	valid: u64,
	sorted: u64,
	row_counts: [u32; 64],
	sizes: IndexSizes,
	tables: Vec<Arc<dyn Table>>,
}

impl TableStream {
	#[tracing::instrument(skip_all)]
	pub(crate) fn read(data: &[u8], sink: &Arc<dyn WarningSink>) -> Result<Self, Error> {
		let truncated = |_| Error::TruncatedStructure("tables header");
		let mut stream = Cursor::new(data);

		let _reserved = u32::read(&mut stream, &()).map_err(truncated)?;
		let major_version = u8::read(&mut stream, &()).map_err(truncated)?;
		let minor_version = u8::read(&mut stream, &()).map_err(truncated)?;
		let heap_sizes = u8::read(&mut stream, &()).map_err(truncated)?;
		let _reserved = u8::read(&mut stream, &()).map_err(truncated)?;
		let valid = u64::read(&mut stream, &()).map_err(truncated)?;
		let sorted = u64::read(&mut stream, &()).map_err(truncated)?;

		let mut row_counts = [0u32; 64];
		for i in enumerate_set_bits(valid) {
			row_counts[i] = u32::read(&mut stream, &()).map_err(truncated)?;
		}
		if heap_sizes & HEAP_SIZES_EXTRA_DATA != 0 {
			let _extra = u32::read(&mut stream, &()).map_err(truncated)?;
		}

		let sizes = IndexSizes::new(heap_sizes, &row_counts);
		let mut tables: Vec<Arc<dyn Table>> = Vec::new();

		for i in enumerate_set_bits(valid) {
			let Some(kind) = TableKind::from_repr(i) else {
				sink.warn(Warning::new(
					Error::DecodingError("unknown table kind"),
					format!("tables stream bit {i}"),
				));
				break;
			};
			let declared = row_counts[i] as usize;
			let mut clamped = false;
			let parsed = match kind {
				TableKind::Module => Self::materialize::<ModuleTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::TypeRef => Self::materialize::<TypeRefTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::TypeDef => Self::materialize::<TypeDefTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::FieldPtr => Self::materialize::<FieldPtrTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::Field => Self::materialize::<FieldTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::MethodPtr => Self::materialize::<MethodPtrTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::MethodDef => Self::materialize::<MethodDefTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::ParamPtr => Self::materialize::<ParamPtrTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::Param => Self::materialize::<ParamTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::InterfaceImpl => Self::materialize::<InterfaceImplTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::MemberRef => Self::materialize::<MemberRefTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::Constant => Self::materialize::<ConstantTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::CustomAttribute => Self::materialize::<CustomAttributeTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::FieldMarshal => Self::materialize::<FieldMarshalTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::DeclSecurity => Self::materialize::<DeclSecurityTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::ClassLayout => Self::materialize::<ClassLayoutTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::FieldLayout => Self::materialize::<FieldLayoutTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::StandAloneSig => Self::materialize::<StandAloneSigTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::EventMap => Self::materialize::<EventMapTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::EventPtr => Self::materialize::<EventPtrTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::Event => Self::materialize::<EventTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::PropertyMap => Self::materialize::<PropertyMapTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::PropertyPtr => Self::materialize::<PropertyPtrTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::Property => Self::materialize::<PropertyTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::MethodSemantics => Self::materialize::<MethodSemanticsTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::MethodImpl => Self::materialize::<MethodImplTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::ModuleRef => Self::materialize::<ModuleRefTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::TypeSpec => Self::materialize::<TypeSpecTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::ImplMap => Self::materialize::<ImplMapTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::FieldRVA => Self::materialize::<FieldRVATable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::EncLog => Self::materialize::<EncLogTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::EncMap => Self::materialize::<EncMapTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::Assembly => Self::materialize::<AssemblyTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::AssemblyProcessor => Self::materialize::<AssemblyProcessorTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::AssemblyOS => Self::materialize::<AssemblyOSTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::AssemblyRef => Self::materialize::<AssemblyRefTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::AssemblyRefProcessor => Self::materialize::<AssemblyRefProcessorTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::AssemblyRefOS => Self::materialize::<AssemblyRefOSTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::File => Self::materialize::<FileTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::ExportedType => Self::materialize::<ExportedTypeTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::ManifestResource => Self::materialize::<ManifestResourceTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::NestedClass => Self::materialize::<NestedClassTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::GenericParam => Self::materialize::<GenericParamTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::MethodSpec => Self::materialize::<MethodSpecTable>(&mut stream, &sizes, declared, &mut clamped),
				TableKind::GenericParamConstraint => Self::materialize::<GenericParamConstraintTable>(&mut stream, &sizes, declared, &mut clamped),
				_ => {
					// Row widths of the portable-PDB tables are not part of
					// this schema set, so nothing after them is addressable.
					sink.warn(Warning::new(
						Error::DecodingError("unsupported table"),
						format!("{kind:?}"),
					));
					break;
				},
			};
			match parsed {
				Ok(table) => tables.push(table),
				Err(_) => {
					sink.warn(Warning::new(Error::TruncatedStructure("table rows"), format!("{kind:?}")));
					break;
				},
			}
			if clamped {
				sink.warn(Warning::new(Error::TruncatedStructure("table rows"), format!("{kind:?}")));
				break;
			}
		}

		Ok(Self {
			major_version,
			minor_version,
			heap_sizes,
			valid,
			sorted,
			row_counts,
			sizes,
			tables,
		})
	}

	fn materialize<T: ReadTable + Table + 'static>(
		stream: &mut Cursor<&[u8]>,
		sizes: &IndexSizes,
		declared: usize,
		clamped: &mut bool,
	) -> std::io::Result<Arc<dyn Table>> {
		let width = T::row_width(sizes);
		let remaining = stream.get_ref().len().saturating_sub(stream.position() as usize);
		let count = declared.min(remaining / width.max(1));
		*clamped = count < declared;
		Ok(Arc::new(T::read(stream, sizes, count)?))
	}

	pub fn major_version(&self) -> u8 {
		self.major_version
	}

	pub fn minor_version(&self) -> u8 {
		self.minor_version
	}

	pub fn heap_sizes(&self) -> u8 {
		self.heap_sizes
	}

	pub fn valid(&self) -> u64 {
		self.valid
	}

	pub fn sorted(&self) -> u64 {
		self.sorted
	}

	pub fn has_table(&self, kind: TableKind) -> bool {
		self.valid & (1 << kind as u64) != 0
	}

	pub fn is_sorted(&self, kind: TableKind) -> bool {
		self.sorted & (1 << kind as u64) != 0
	}

	/// The row count the stream header declared, before any truncation clamp.
	pub fn declared_row_count(&self, kind: TableKind) -> usize {
		self.row_counts[kind as usize] as usize
	}

	/// The number of rows actually materialized.
	pub fn row_count(&self, kind: TableKind) -> usize {
		self.table_dyn(kind).map_or(0, |table| table.len())
	}

	pub fn table<T: Table + 'static>(&self) -> Option<&T> {
		self.tables.iter().find_map(|table| table.as_any().downcast_ref::<T>())
	}

	pub fn table_dyn(&self, kind: TableKind) -> Option<&dyn Table> {
		self.tables
			.iter()
			.find(|table| table.kind() == kind)
			.map(|table| &**table)
	}

	/// All materialized tables in ascending table-kind order.
	pub fn tables(&self) -> impl Iterator<Item = &dyn Table> {
		self.tables.iter().map(|table| &**table)
	}

	pub fn index_sizes(&self) -> &IndexSizes {
		&self.sizes
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::diagnostics::{CollectSink, NullSink};
	use crate::raw::heaps::StringIndex;

	fn header(heap_sizes: u8, valid: u64, counts: &[u32]) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(&0u32.to_le_bytes());
		out.extend_from_slice(&[2, 0, heap_sizes, 1]);
		out.extend_from_slice(&valid.to_le_bytes());
		out.extend_from_slice(&0u64.to_le_bytes());
		for count in counts {
			out.extend_from_slice(&count.to_le_bytes());
		}
		out
	}

	fn module_row(name: u16) -> Vec<u8> {
		let mut row = Vec::new();
		row.extend_from_slice(&0u16.to_le_bytes());
		row.extend_from_slice(&name.to_le_bytes());
		row.extend_from_slice(&1u16.to_le_bytes());
		row.extend_from_slice(&0u16.to_le_bytes());
		row.extend_from_slice(&0u16.to_le_bytes());
		row
	}

	#[test]
	fn module_rows_decode_with_narrow_indices() {
		let sink: Arc<dyn WarningSink> = Arc::new(NullSink);
		let mut data = header(0, 1, &[1]);
		data.extend_from_slice(&module_row(0x2A));

		let stream = TableStream::read(&data, &sink).unwrap();
		let module = stream.table::<ModuleTable>().unwrap();
		assert_eq!(module.len(), 1);
		assert_eq!(module.get(1).unwrap().name, StringIndex(0x2A));
		assert!(module.get(0).is_none());
		assert!(module.get(2).is_none());
	}

	#[test]
	fn extra_data_bit_skips_four_bytes_before_rows() {
		let sink: Arc<dyn WarningSink> = Arc::new(NullSink);
		let mut data = header(HEAP_SIZES_EXTRA_DATA, 1, &[1]);
		data.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
		data.extend_from_slice(&module_row(7));

		let stream = TableStream::read(&data, &sink).unwrap();
		assert_eq!(stream.table::<ModuleTable>().unwrap().get(1).unwrap().name, StringIndex(7));
	}

	#[test]
	fn lying_row_counts_are_clamped_with_a_warning() {
		let collect = Arc::new(CollectSink::default());
		let sink: Arc<dyn WarningSink> = collect.clone();
		let mut data = header(0, 1, &[100]);
		data.extend_from_slice(&module_row(1));

		let stream = TableStream::read(&data, &sink).unwrap();
		assert_eq!(stream.row_count(TableKind::Module), 1);
		assert_eq!(stream.declared_row_count(TableKind::Module), 100);
		assert_eq!(collect.len(), 1);
	}

	#[test]
	fn truncated_headers_are_fatal() {
		let sink: Arc<dyn WarningSink> = Arc::new(NullSink);
		let data = header(0, 0, &[]);
		assert!(TableStream::read(&data[..12], &sink).is_err());
	}

	#[test]
	fn empty_valid_bit_yields_an_empty_table() {
		let sink: Arc<dyn WarningSink> = Arc::new(NullSink);
		let data = header(0, 1 << TableKind::TypeRef as u64, &[0]);
		let stream = TableStream::read(&data, &sink).unwrap();
		assert!(stream.has_table(TableKind::TypeRef));
		assert_eq!(stream.row_count(TableKind::TypeRef), 0);
	}
}

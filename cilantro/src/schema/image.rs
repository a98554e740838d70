use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use derivative::Derivative;
use owning_ref::ArcRef;

use crate::diagnostics::{LogSink, Warning, WarningSink};
use crate::error::Error;
use crate::pe::PeView;
use crate::raw::cli::{CliHeader, MetadataRoot, StreamHeader};
use crate::raw::heaps::{BlobHeap, GuidHeap, StringHeap, UserStringHeap};
use crate::raw::tables::{
	Event, EventTable, Field, FieldTable, MethodDef, MethodDefTable, Param, ParamTable,
	Property, PropertyTable, TableStream,
};
use crate::schema::links::TableLinks;
use crate::schema::methods::{self, Method};
use crate::schema::resources::{self, ClrResource};

const CLI_HEADER_SIZE: usize = 72;

#[derive(Debug, Copy, Clone, Default)]
pub struct ImageOptions {
	/// Parse the tables stream, links, methods and resources on first
	/// access instead of at construction.
	pub lazy_tables: bool,
}

/// A parsed CLI image.
///
/// The image owns the byte buffer (`Arc<[u8]>`); heaps, items and resources
/// borrow shared slices of it, so the whole graph is immutable after
/// construction and freely shareable across threads.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Image {
	#[derivative(Debug = "ignore")]
	data: ArcRef<[u8]>,
	pe: PeView,
	clr: Clr,
}

impl Image {
	pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
		Self::from_bytes(std::fs::read(path)?)
	}

	pub fn open_with(
		path: impl AsRef<Path>,
		options: ImageOptions,
		sink: Arc<dyn WarningSink>,
	) -> Result<Self, Error> {
		Self::from_bytes_with(std::fs::read(path)?, options, sink)
	}

	/// Eagerly parses with the default (tracing-backed) warning sink.
	pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self, Error> {
		Self::from_bytes_with(bytes, ImageOptions::default(), Arc::new(LogSink))
	}

	#[tracing::instrument(skip_all)]
	pub fn from_bytes_with(
		bytes: impl Into<Arc<[u8]>>,
		options: ImageOptions,
		sink: Arc<dyn WarningSink>,
	) -> Result<Self, Error> {
		let data = ArcRef::new(bytes.into());
		let pe = PeView::parse(&data)?;
		let directory = pe.clr_directory().ok_or(Error::NoClrDirectory)?;

		let header_slice = pe
			.slice_at_rva(&data, directory.rva, CLI_HEADER_SIZE)
			.ok_or(Error::TruncatedStructure("CLI header"))?;
		let header = CliHeader::read(&mut Cursor::new(&*header_slice))?;

		let metadata_slice = pe
			.slice_at_rva(&data, header.metadata.rva, header.metadata.size as usize)
			.ok_or(Error::TruncatedStructure("metadata root"))?;
		let metadata = MetadataRoot::read(metadata_slice, header.metadata.rva, &sink)?;

		let clr = Clr {
			data: data.clone(),
			pe: pe.clone(),
			header,
			metadata,
			sink,
			tables: OnceLock::new(),
			schema_tables: OnceLock::new(),
			links: OnceLock::new(),
			methods: OnceLock::new(),
			resources: OnceLock::new(),
		};
		let image = Self { data, pe, clr };
		if !options.lazy_tables {
			image.clr.init_eager()?;
		}
		Ok(image)
	}

	pub fn data(&self) -> &[u8] {
		&self.data
	}

	pub fn pe(&self) -> &PeView {
		&self.pe
	}

	pub fn clr(&self) -> &Clr {
		&self.clr
	}
}

/// The CLR directory view: CLI header, metadata root, streams, tables and
/// the entities derived from them.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Clr {
	#[derivative(Debug = "ignore")]
	data: ArcRef<[u8]>,
	#[derivative(Debug = "ignore")]
	pe: PeView,
	header: CliHeader,
	metadata: MetadataRoot,
	#[derivative(Debug = "ignore")]
	sink: Arc<dyn WarningSink>,
	#[derivative(Debug = "ignore")]
	tables: OnceLock<Option<Arc<TableStream>>>,
	#[derivative(Debug = "ignore")]
	schema_tables: OnceLock<Option<Arc<TableStream>>>,
	#[derivative(Debug = "ignore")]
	links: OnceLock<Option<Arc<TableLinks>>>,
	#[derivative(Debug = "ignore")]
	methods: OnceLock<Vec<Method>>,
	#[derivative(Debug = "ignore")]
	resources: OnceLock<Vec<ClrResource>>,
}

impl Clr {
	/// Forces every lazy field; structural failures are fatal here, unlike
	/// on the lazy path where construction has already returned.
	fn init_eager(&self) -> Result<(), Error> {
		let tables = self.parse_tables(self.metadata.tables_stream())?;
		let _ = self.tables.set(tables);
		let schema = match self.parse_tables(self.metadata.schema_stream()) {
			Ok(tables) => tables,
			Err(error) => {
				self.sink.warn(Warning::new(error, "stream \"#Schema\""));
				None
			},
		};
		let _ = self.schema_tables.set(schema);
		let _ = self.links();
		let _ = self.methods();
		let _ = self.resources();
		Ok(())
	}

	fn parse_tables(&self, stream: Option<&StreamHeader>) -> Result<Option<Arc<TableStream>>, Error> {
		let Some(header) = stream else {
			return Ok(None);
		};
		let Some(data) = header.data() else {
			self.sink.warn(Warning::new(
				Error::TruncatedStructure("tables stream"),
				format!("stream {:?}", header.name()),
			));
			return Ok(None);
		};
		Ok(Some(Arc::new(TableStream::read(data, &self.sink)?)))
	}

	pub fn header(&self) -> &CliHeader {
		&self.header
	}

	pub fn metadata(&self) -> &MetadataRoot {
		&self.metadata
	}

	pub fn streams(&self) -> &[StreamHeader] {
		self.metadata.streams()
	}

	/// The primary tables stream (last `#~` / `#-` header).
	pub fn tables(&self) -> Option<&TableStream> {
		self.tables
			.get_or_init(|| match self.parse_tables(self.metadata.tables_stream()) {
				Ok(tables) => tables,
				Err(error) => {
					self.sink.warn(Warning::new(error, "tables stream"));
					None
				},
			})
			.as_deref()
	}

	/// The `#Schema` stream parsed as a tables stream, when present.
	pub fn schema_tables(&self) -> Option<&TableStream> {
		self.schema_tables
			.get_or_init(|| match self.parse_tables(self.metadata.schema_stream()) {
				Ok(tables) => tables,
				Err(error) => {
					self.sink.warn(Warning::new(error, "stream \"#Schema\""));
					None
				},
			})
			.as_deref()
	}

	/// The run-list materialization for the primary tables stream.
	pub fn links(&self) -> Option<&TableLinks> {
		self.links
			.get_or_init(|| {
				let tables = self.tables()?;
				Some(Arc::new(TableLinks::build(tables, &self.metadata, &self.sink)))
			})
			.as_deref()
	}

	pub fn methods(&self) -> &[Method] {
		self.methods.get_or_init(|| {
			let (Some(tables), Some(links)) = (self.tables(), self.links()) else {
				return Vec::new();
			};
			methods::build(tables, links, &self.metadata, &self.sink)
		})
	}

	pub fn resources(&self) -> &[ClrResource] {
		self.resources.get_or_init(|| {
			let Some(tables) = self.tables() else {
				return Vec::new();
			};
			resources::build(tables, &self.metadata, &self.pe, &self.data, &self.header, &self.sink)
		})
	}

	/// The Field rows owned by the 1-based TypeDef row.
	pub fn fields_of(&self, type_def: usize) -> &[Field] {
		let (Some(tables), Some(links)) = (self.tables(), self.links()) else {
			return &[];
		};
		let Some(range) = links.field_run(type_def) else {
			return &[];
		};
		tables
			.table::<FieldTable>()
			.and_then(|table| table.rows().get(range))
			.unwrap_or(&[])
	}

	pub fn methods_of(&self, type_def: usize) -> &[MethodDef] {
		let (Some(tables), Some(links)) = (self.tables(), self.links()) else {
			return &[];
		};
		let Some(range) = links.method_run(type_def) else {
			return &[];
		};
		tables
			.table::<MethodDefTable>()
			.and_then(|table| table.rows().get(range))
			.unwrap_or(&[])
	}

	pub fn params_of(&self, method_def: usize) -> &[Param] {
		let (Some(tables), Some(links)) = (self.tables(), self.links()) else {
			return &[];
		};
		let Some(range) = links.param_run(method_def) else {
			return &[];
		};
		tables
			.table::<ParamTable>()
			.and_then(|table| table.rows().get(range))
			.unwrap_or(&[])
	}

	pub fn events_of(&self, event_map: usize) -> &[Event] {
		let (Some(tables), Some(links)) = (self.tables(), self.links()) else {
			return &[];
		};
		let Some(range) = links.event_run(event_map) else {
			return &[];
		};
		tables
			.table::<EventTable>()
			.and_then(|table| table.rows().get(range))
			.unwrap_or(&[])
	}

	pub fn properties_of(&self, property_map: usize) -> &[Property] {
		let (Some(tables), Some(links)) = (self.tables(), self.links()) else {
			return &[];
		};
		let Some(range) = links.property_run(property_map) else {
			return &[];
		};
		tables
			.table::<PropertyTable>()
			.and_then(|table| table.rows().get(range))
			.unwrap_or(&[])
	}

	pub fn strings(&self) -> Option<&StringHeap> {
		self.metadata.strings()
	}

	pub fn user_strings(&self) -> Option<&UserStringHeap> {
		self.metadata.user_strings()
	}

	pub fn guids(&self) -> Option<&GuidHeap> {
		self.metadata.guids()
	}

	pub fn blobs(&self) -> Option<&BlobHeap> {
		self.metadata.blobs()
	}
}

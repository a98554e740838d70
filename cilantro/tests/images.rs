mod common;

use std::sync::Arc;

use cilantro::raw::tables::{
	AssemblyRefTable, ManifestResourceTable, MethodDefTable, ModuleTable, Table, TableKind,
	TypeDefTable,
};
use cilantro::{ClrResource, CollectSink, Image, ImageOptions, Method, ResourceValue};

use common::*;

fn load(metadata: &[u8], resources: Option<&[u8]>) -> (Image, Arc<CollectSink>) {
	let sink = Arc::new(CollectSink::default());
	let image = Image::from_bytes_with(
		clr_image(metadata, resources),
		ImageOptions::default(),
		sink.clone(),
	)
	.unwrap();
	(image, sink)
}

#[test]
fn a_minimal_module_resolves_its_name_through_the_strings_heap() {
	let metadata = metadata_root(&[
		("#~", &tables_stream(&[(0, vec![module_row(1)])])),
		("#Strings", b"\0TestModule\0"),
	]);
	let (image, sink) = load(&metadata, None);

	let clr = image.clr();
	assert_eq!(clr.metadata().version(), "v4.0.30319");

	let tables = clr.tables().unwrap();
	let module = tables.table::<ModuleTable>().unwrap();
	assert_eq!(module.len(), 1);
	assert!(module.get(0).is_none());
	assert!(module.get(2).is_none());

	let name = clr.strings().unwrap().get(module.get(1).unwrap().name).unwrap();
	assert_eq!(name.value(), "TestModule");
	assert!(name.rva() >= METADATA_RVA);
	assert!(sink.is_empty());
}

#[test]
fn duplicate_strings_streams_resolve_through_the_last_header() {
	let metadata = metadata_root(&[
		("#~", &tables_stream(&[(0, vec![module_row(1)])])),
		("#Strings", b"\0AAAAAAAAAA\0"),
		("#Strings", b"\0TestModule\0"),
	]);
	let (image, _) = load(&metadata, None);

	let clr = image.clr();
	let headers: Vec<_> = clr
		.streams()
		.iter()
		.filter(|stream| stream.name() == "#Strings")
		.collect();
	assert_eq!(headers.len(), 2);
	assert_ne!(headers[0].offset(), headers[1].offset());

	let module = clr.tables().unwrap().table::<ModuleTable>().unwrap();
	let name = clr.strings().unwrap().get(module.get(1).unwrap().name).unwrap();
	assert_eq!(name.value(), "TestModule");
}

#[test]
fn method_list_runs_split_the_method_table_between_type_defs() {
	// Three TypeDefs whose MethodList starts are 1, 3, 3 over four methods.
	let tables = tables_stream(&[
		(2, vec![
			type_def_row(0, 0, 1),
			type_def_row(0, 0, 3),
			type_def_row(0, 0, 3),
		]),
		(6, vec![
			method_def_row(0x2000, 0, 1),
			method_def_row(0, 0, 1),
			method_def_row(0x2400, 0, 1),
			method_def_row(0, 0, 1),
		]),
	]);
	let metadata = metadata_root(&[("#~", &tables), ("#Strings", b"\0\0")]);
	let (image, sink) = load(&metadata, None);

	let clr = image.clr();
	let links = clr.links().unwrap();
	assert_eq!(links.method_run(1), Some(0..2));
	assert_eq!(links.method_run(2), Some(2..2));
	assert_eq!(links.method_run(3), Some(2..4));
	assert_eq!(links.method_run(4), None);

	let stream = clr.tables().unwrap();
	assert_eq!(stream.table::<TypeDefTable>().unwrap().len(), 3);
	assert_eq!(stream.row_count(TableKind::MethodDef), 4);

	assert_eq!(clr.methods_of(1).len(), 2);
	assert!(clr.methods_of(2).is_empty());
	assert_eq!(clr.methods_of(3)[0].rva, 0x2400);
	assert!(clr.fields_of(1).is_empty());

	let methods = clr.methods();
	assert_eq!(methods.len(), 4);
	assert!(matches!(methods[0], Method::Internal(ref m) if m.rva == 0x2000));
	assert!(matches!(methods[1], Method::External(_)));
	assert!(matches!(methods[3], Method::External(ref m) if m.pinvoke.is_none()));
	assert!(stream.table::<MethodDefTable>().unwrap().get(5).is_none());
	assert!(sink.is_empty());
}

#[test]
fn an_embedded_resource_set_decodes_its_string_entry() {
	let tables = tables_stream(&[(0x28, vec![manifest_resource_row(0, 1, 0)])]);
	let metadata = metadata_root(&[("#~", &tables), ("#Strings", b"\0app.resources\0")]);
	let payload = size_prefixed(&string_resource_set("greeting", "hello"));
	let (image, sink) = load(&metadata, Some(&payload));

	let resources = image.clr().resources();
	assert_eq!(resources.len(), 1);
	let ClrResource::Internal(resource) = &resources[0] else {
		panic!("expected an internal resource");
	};
	assert_eq!(resource.name.as_ref().unwrap().value(), "app.resources");

	let set = resource.data.as_ref().unwrap().as_set().unwrap();
	assert_eq!(set.entries.len(), set.header.resource_count as usize);
	let entry = &set.entries[0];
	assert_eq!(entry.name.as_deref(), Some("greeting"));
	assert!(matches!(entry.data, Some(ResourceValue::String(ref s)) if s == "hello"));
	assert!(sink.is_empty());
}

#[test]
fn a_payload_without_the_set_magic_stays_raw() {
	let tables = tables_stream(&[(0x28, vec![manifest_resource_row(0, 1, 0)])]);
	let metadata = metadata_root(&[("#~", &tables), ("#Strings", b"\0blob\0")]);
	let payload = size_prefixed(&[1, 2, 3, 4, 5]);
	let (image, _) = load(&metadata, Some(&payload));

	let ClrResource::Internal(resource) = &image.clr().resources()[0] else {
		panic!("expected an internal resource");
	};
	assert_eq!(resource.size, Some(5));
	assert_eq!(resource.data.as_ref().unwrap().as_raw(), Some([1, 2, 3, 4, 5].as_slice()));
}

#[test]
fn an_assembly_ref_implementation_makes_an_assembly_resource() {
	// Implementation coded index: tag 1 (AssemblyRef), row 1.
	let tables = tables_stream(&[
		(0x23, vec![assembly_ref_row(6)]),
		(0x28, vec![manifest_resource_row(0, 1, (1 << 2) | 1)]),
	]);
	let metadata = metadata_root(&[("#~", &tables), ("#Strings", b"\0satl\0External.Lib\0")]);
	let (image, sink) = load(&metadata, None);

	let clr = image.clr();
	let ClrResource::Assembly(resource) = &clr.resources()[0] else {
		panic!("expected an assembly resource");
	};
	assert_eq!(resource.assembly_ref, 1);
	assert_eq!(resource.assembly_name.as_ref().unwrap().value(), "External.Lib");

	let reference = clr.tables().unwrap().table::<AssemblyRefTable>().unwrap();
	assert_eq!(reference.get(resource.assembly_ref).unwrap().major_version, 4);
	assert!(clr.tables().unwrap().table::<ManifestResourceTable>().is_some());
	assert!(sink.is_empty());
}

#[test]
fn lazy_images_materialize_tables_on_first_access() {
	let metadata = metadata_root(&[
		("#~", &tables_stream(&[(0, vec![module_row(1)])])),
		("#Strings", b"\0Lazy\0"),
	]);
	let sink = Arc::new(CollectSink::default());
	let image = Image::from_bytes_with(
		clr_image(&metadata, None),
		ImageOptions { lazy_tables: true },
		sink.clone(),
	)
	.unwrap();

	let clr = image.clr();
	let first = clr.tables().unwrap() as *const _;
	let second = clr.tables().unwrap() as *const _;
	assert_eq!(first, second);
	assert_eq!(clr.methods().len(), 0);
	assert!(sink.is_empty());
}

#[test]
fn images_without_a_clr_directory_are_rejected() {
	let mut bytes = clr_image(&metadata_root(&[]), None);
	// Zero out data directory 14 (offset 0x98 + 96 + 14 * 8 within the image).
	let dir = 0x98 + 96 + 14 * 8;
	bytes[dir..dir + 8].fill(0);
	assert!(matches!(Image::from_bytes(bytes), Err(cilantro::Error::NoClrDirectory)));
}

use std::ops::Range;
use std::sync::Arc;

use crate::diagnostics::{Warning, WarningSink};
use crate::error::Error;
use crate::raw::cli::MetadataRoot;
use crate::raw::heaps::{BlobHeap, BlobIndex, GuidHeap, GuidIndex, StringHeap, StringIndex};
use crate::raw::indices::coded_index::{CodedIndexKind, CodedTarget};
use crate::raw::tables::*;

/// The output of the row-linking pass: every reference column validated
/// against its target (dangling references funneled to the sink) and the
/// run-list columns materialized into 0-based child ranges.
#[derive(Debug, Default)]
pub struct TableLinks {
	type_def_fields: Vec<Range<usize>>,
	type_def_methods: Vec<Range<usize>>,
	method_def_params: Vec<Range<usize>>,
	event_map_events: Vec<Range<usize>>,
	property_map_properties: Vec<Range<usize>>,
}

impl TableLinks {
	pub(crate) fn build(tables: &TableStream, metadata: &MetadataRoot, sink: &Arc<dyn WarningSink>) -> Self {
		let checker = Checker {
			tables,
			strings: metadata.strings(),
			guids: metadata.guids(),
			blobs: metadata.blobs(),
			sink,
		};
		checker.validate();

		let starts = |column: fn(&TypeDef) -> usize| -> Vec<usize> {
			tables
				.table::<TypeDefTable>()
				.map(|t| t.rows().iter().map(column).collect())
				.unwrap_or_default()
		};

		Self {
			type_def_fields: runs(
				&starts(|row| row.field_list.get()),
				TableKind::Field,
				tables.row_count(TableKind::Field),
				"TypeDef",
				"FieldList",
				sink,
			),
			type_def_methods: runs(
				&starts(|row| row.method_list.get()),
				TableKind::MethodDef,
				tables.row_count(TableKind::MethodDef),
				"TypeDef",
				"MethodList",
				sink,
			),
			method_def_params: runs(
				&tables
					.table::<MethodDefTable>()
					.map(|t| t.rows().iter().map(|row| row.param_list.get()).collect::<Vec<_>>())
					.unwrap_or_default(),
				TableKind::Param,
				tables.row_count(TableKind::Param),
				"MethodDef",
				"ParamList",
				sink,
			),
			event_map_events: runs(
				&tables
					.table::<EventMapTable>()
					.map(|t| t.rows().iter().map(|row| row.event_list.get()).collect::<Vec<_>>())
					.unwrap_or_default(),
				TableKind::Event,
				tables.row_count(TableKind::Event),
				"EventMap",
				"EventList",
				sink,
			),
			property_map_properties: runs(
				&tables
					.table::<PropertyMapTable>()
					.map(|t| t.rows().iter().map(|row| row.property_list.get()).collect::<Vec<_>>())
					.unwrap_or_default(),
				TableKind::Property,
				tables.row_count(TableKind::Property),
				"PropertyMap",
				"PropertyList",
				sink,
			),
		}
	}

	/// 0-based range of Field rows owned by the 1-based TypeDef row.
	pub fn field_run(&self, type_def: usize) -> Option<Range<usize>> {
		run_at(&self.type_def_fields, type_def)
	}

	pub fn method_run(&self, type_def: usize) -> Option<Range<usize>> {
		run_at(&self.type_def_methods, type_def)
	}

	pub fn param_run(&self, method_def: usize) -> Option<Range<usize>> {
		run_at(&self.method_def_params, method_def)
	}

	pub fn event_run(&self, event_map: usize) -> Option<Range<usize>> {
		run_at(&self.event_map_events, event_map)
	}

	pub fn property_run(&self, property_map: usize) -> Option<Range<usize>> {
		run_at(&self.property_map_properties, property_map)
	}
}

fn run_at(runs: &[Range<usize>], parent: usize) -> Option<Range<usize>> {
	match parent {
		0 => None,
		_ => runs.get(parent - 1).cloned(),
	}
}

/// Materializes one run-list column.
///
/// Parent row i owns child rows `[start_i, start_{i+1})`; the last parent
/// owns through the child table's last row. An empty run is an empty range,
/// never absent; a run of size one is a one-element range.
fn runs(
	starts: &[usize],
	child: TableKind,
	child_len: usize,
	parent: &'static str,
	column: &'static str,
	sink: &Arc<dyn WarningSink>,
) -> Vec<Range<usize>> {
	let mut out = Vec::with_capacity(starts.len());
	for (i, &start) in starts.iter().enumerate() {
		if start == 0 {
			out.push(0..0);
			continue;
		}
		if start > child_len + 1 {
			sink.warn(Warning::new(
				Error::TableIndexOutOfRange { table: child, index: start },
				format!("{parent}[{}].{column}", i + 1),
			));
			out.push(0..0);
			continue;
		}
		let next = starts.get(i + 1).copied().unwrap_or(child_len + 1);
		let end = next.clamp(start, child_len + 1);
		out.push(start - 1..end - 1);
	}
	out
}

struct Checker<'a> {
	tables: &'a TableStream,
	strings: Option<&'a StringHeap>,
	guids: Option<&'a GuidHeap>,
	blobs: Option<&'a BlobHeap>,
	sink: &'a Arc<dyn WarningSink>,
}

impl Checker<'_> {
	fn string(&self, index: StringIndex, table: TableKind, row: usize, column: &str) {
		if let Some(heap) = self.strings {
			if !heap.contains(index) {
				self.warn(Error::HeapIndexOutOfRange { heap: "#Strings", index: index.0 }, table, row, column);
			}
		}
	}

	fn guid(&self, index: GuidIndex, table: TableKind, row: usize, column: &str) {
		if let Some(heap) = self.guids {
			if !heap.contains(index) {
				self.warn(Error::HeapIndexOutOfRange { heap: "#GUID", index: index.0 }, table, row, column);
			}
		}
	}

	fn blob(&self, index: BlobIndex, table: TableKind, row: usize, column: &str) {
		if let Some(heap) = self.blobs {
			if index.0 != 0 && !heap.contains(index) {
				self.warn(Error::HeapIndexOutOfRange { heap: "#Blob", index: index.0 }, table, row, column);
			}
		}
	}

	fn simple(&self, target: TableKind, index: usize, table: TableKind, row: usize, column: &str) {
		if index != 0 && index > self.tables.row_count(target) {
			self.warn(Error::TableIndexOutOfRange { table: target, index }, table, row, column);
		}
	}

	fn coded(&self, kind: CodedIndexKind, target: CodedTarget, table: TableKind, row: usize, column: &str) {
		match target {
			CodedTarget::Null => {},
			CodedTarget::Row(child, index) => {
				if index > self.tables.row_count(child) {
					self.warn(Error::TableIndexOutOfRange { table: child, index }, table, row, column);
				}
			},
			CodedTarget::UnknownTag(tag) => {
				self.warn(Error::UnknownCodedIndexTag { kind: kind.name(), tag }, table, row, column);
			},
		}
	}

	fn warn(&self, error: Error, table: TableKind, row: usize, column: &str) {
		self.sink.warn(Warning::new(error, format!("{table:?}[{row}].{column}")));
	}

	/// One pass over every reference column of every materialized table.
	/// Run-list columns are excluded here; [`runs`] owns their bounds.
	fn validate(&self) {
		use CodedIndexKind as C;
		use TableKind as K;

		if let Some(t) = self.tables.table::<ModuleTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.string(r.name, K::Module, i + 1, "Name");
				self.guid(r.mv_id, K::Module, i + 1, "Mvid");
				self.guid(r.enc_id, K::Module, i + 1, "EncId");
				self.guid(r.enc_base_id, K::Module, i + 1, "EncBaseId");
			}
		}
		if let Some(t) = self.tables.table::<TypeRefTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.coded(C::ResolutionScope, r.resolution_scope.decode(), K::TypeRef, i + 1, "ResolutionScope");
				self.string(r.type_name, K::TypeRef, i + 1, "TypeName");
				self.string(r.type_namespace, K::TypeRef, i + 1, "TypeNamespace");
			}
		}
		if let Some(t) = self.tables.table::<TypeDefTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.string(r.type_name, K::TypeDef, i + 1, "TypeName");
				self.string(r.type_namespace, K::TypeDef, i + 1, "TypeNamespace");
				self.coded(C::TypeDefOrRef, r.extends.decode(), K::TypeDef, i + 1, "Extends");
			}
		}
		if let Some(t) = self.tables.table::<FieldPtrTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::Field, r.field.get(), K::FieldPtr, i + 1, "Field");
			}
		}
		if let Some(t) = self.tables.table::<FieldTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.string(r.name, K::Field, i + 1, "Name");
				self.blob(r.signature, K::Field, i + 1, "Signature");
			}
		}
		if let Some(t) = self.tables.table::<MethodPtrTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::MethodDef, r.method.get(), K::MethodPtr, i + 1, "Method");
			}
		}
		if let Some(t) = self.tables.table::<MethodDefTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.string(r.name, K::MethodDef, i + 1, "Name");
				self.blob(r.signature, K::MethodDef, i + 1, "Signature");
			}
		}
		if let Some(t) = self.tables.table::<ParamPtrTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::Param, r.param.get(), K::ParamPtr, i + 1, "Param");
			}
		}
		if let Some(t) = self.tables.table::<ParamTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.string(r.name, K::Param, i + 1, "Name");
			}
		}
		if let Some(t) = self.tables.table::<InterfaceImplTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::TypeDef, r.class.get(), K::InterfaceImpl, i + 1, "Class");
				self.coded(C::TypeDefOrRef, r.interface.decode(), K::InterfaceImpl, i + 1, "Interface");
			}
		}
		if let Some(t) = self.tables.table::<MemberRefTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.coded(C::MemberRefParent, r.class.decode(), K::MemberRef, i + 1, "Class");
				self.string(r.name, K::MemberRef, i + 1, "Name");
				self.blob(r.signature, K::MemberRef, i + 1, "Signature");
			}
		}
		if let Some(t) = self.tables.table::<ConstantTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.coded(C::HasConstant, r.parent.decode(), K::Constant, i + 1, "Parent");
				self.blob(r.value, K::Constant, i + 1, "Value");
			}
		}
		if let Some(t) = self.tables.table::<CustomAttributeTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.coded(C::HasCustomAttribute, r.parent.decode(), K::CustomAttribute, i + 1, "Parent");
				self.coded(C::CustomAttributeType, r.ty.decode(), K::CustomAttribute, i + 1, "Type");
				self.blob(r.value, K::CustomAttribute, i + 1, "Value");
			}
		}
		if let Some(t) = self.tables.table::<FieldMarshalTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.coded(C::HasFieldMarshal, r.parent.decode(), K::FieldMarshal, i + 1, "Parent");
				self.blob(r.native_type, K::FieldMarshal, i + 1, "NativeType");
			}
		}
		if let Some(t) = self.tables.table::<DeclSecurityTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.coded(C::HasDeclSecurity, r.parent.decode(), K::DeclSecurity, i + 1, "Parent");
				self.blob(r.permission_set, K::DeclSecurity, i + 1, "PermissionSet");
			}
		}
		if let Some(t) = self.tables.table::<ClassLayoutTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::TypeDef, r.parent.get(), K::ClassLayout, i + 1, "Parent");
			}
		}
		if let Some(t) = self.tables.table::<FieldLayoutTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::Field, r.field.get(), K::FieldLayout, i + 1, "Field");
			}
		}
		if let Some(t) = self.tables.table::<StandAloneSigTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.blob(r.signature, K::StandAloneSig, i + 1, "Signature");
			}
		}
		if let Some(t) = self.tables.table::<EventMapTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::TypeDef, r.parent.get(), K::EventMap, i + 1, "Parent");
			}
		}
		if let Some(t) = self.tables.table::<EventPtrTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::Event, r.event.get(), K::EventPtr, i + 1, "Event");
			}
		}
		if let Some(t) = self.tables.table::<EventTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.string(r.name, K::Event, i + 1, "Name");
				self.coded(C::TypeDefOrRef, r.event_type.decode(), K::Event, i + 1, "EventType");
			}
		}
		if let Some(t) = self.tables.table::<PropertyMapTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::TypeDef, r.parent.get(), K::PropertyMap, i + 1, "Parent");
			}
		}
		if let Some(t) = self.tables.table::<PropertyPtrTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::Property, r.property.get(), K::PropertyPtr, i + 1, "Property");
			}
		}
		if let Some(t) = self.tables.table::<PropertyTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.string(r.name, K::Property, i + 1, "Name");
				self.blob(r.signature, K::Property, i + 1, "Type");
			}
		}
		if let Some(t) = self.tables.table::<MethodSemanticsTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::MethodDef, r.method.get(), K::MethodSemantics, i + 1, "Method");
				self.coded(C::HasSemantics, r.association.decode(), K::MethodSemantics, i + 1, "Association");
			}
		}
		if let Some(t) = self.tables.table::<MethodImplTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::TypeDef, r.class.get(), K::MethodImpl, i + 1, "Class");
				self.coded(C::MethodDefOrRef, r.body.decode(), K::MethodImpl, i + 1, "MethodBody");
				self.coded(C::MethodDefOrRef, r.declaration.decode(), K::MethodImpl, i + 1, "MethodDeclaration");
			}
		}
		if let Some(t) = self.tables.table::<ModuleRefTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.string(r.name, K::ModuleRef, i + 1, "Name");
			}
		}
		if let Some(t) = self.tables.table::<TypeSpecTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.blob(r.signature, K::TypeSpec, i + 1, "Signature");
			}
		}
		if let Some(t) = self.tables.table::<ImplMapTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.coded(C::MemberForwarded, r.member_forwarded.decode(), K::ImplMap, i + 1, "MemberForwarded");
				self.string(r.import_name, K::ImplMap, i + 1, "ImportName");
				self.simple(K::ModuleRef, r.import_scope.get(), K::ImplMap, i + 1, "ImportScope");
			}
		}
		if let Some(t) = self.tables.table::<FieldRVATable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::Field, r.field.get(), K::FieldRVA, i + 1, "Field");
			}
		}
		if let Some(t) = self.tables.table::<AssemblyTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.blob(r.public_key, K::Assembly, i + 1, "PublicKey");
				self.string(r.name, K::Assembly, i + 1, "Name");
				self.string(r.culture, K::Assembly, i + 1, "Culture");
			}
		}
		if let Some(t) = self.tables.table::<AssemblyRefTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.blob(r.public_key_or_token, K::AssemblyRef, i + 1, "PublicKeyOrToken");
				self.string(r.name, K::AssemblyRef, i + 1, "Name");
				self.string(r.culture, K::AssemblyRef, i + 1, "Culture");
				self.blob(r.hash_value, K::AssemblyRef, i + 1, "HashValue");
			}
		}
		if let Some(t) = self.tables.table::<AssemblyRefProcessorTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::AssemblyRef, r.assembly_ref.get(), K::AssemblyRefProcessor, i + 1, "AssemblyRef");
			}
		}
		if let Some(t) = self.tables.table::<AssemblyRefOSTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::AssemblyRef, r.assembly_ref.get(), K::AssemblyRefOS, i + 1, "AssemblyRef");
			}
		}
		if let Some(t) = self.tables.table::<FileTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.string(r.name, K::File, i + 1, "Name");
				self.blob(r.hash_value, K::File, i + 1, "HashValue");
			}
		}
		if let Some(t) = self.tables.table::<ExportedTypeTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.string(r.type_name, K::ExportedType, i + 1, "TypeName");
				self.string(r.type_namespace, K::ExportedType, i + 1, "TypeNamespace");
				self.coded(C::Implementation, r.implementation.decode(), K::ExportedType, i + 1, "Implementation");
			}
		}
		if let Some(t) = self.tables.table::<ManifestResourceTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.string(r.name, K::ManifestResource, i + 1, "Name");
				self.coded(C::Implementation, r.implementation.decode(), K::ManifestResource, i + 1, "Implementation");
			}
		}
		if let Some(t) = self.tables.table::<NestedClassTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::TypeDef, r.nested_class.get(), K::NestedClass, i + 1, "NestedClass");
				self.simple(K::TypeDef, r.enclosing_class.get(), K::NestedClass, i + 1, "EnclosingClass");
			}
		}
		if let Some(t) = self.tables.table::<GenericParamTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.coded(C::TypeOrMethodDef, r.owner.decode(), K::GenericParam, i + 1, "Owner");
				self.string(r.name, K::GenericParam, i + 1, "Name");
			}
		}
		if let Some(t) = self.tables.table::<MethodSpecTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.coded(C::MethodDefOrRef, r.method.decode(), K::MethodSpec, i + 1, "Method");
				self.blob(r.instantiation, K::MethodSpec, i + 1, "Instantiation");
			}
		}
		if let Some(t) = self.tables.table::<GenericParamConstraintTable>() {
			for (i, r) in t.rows().iter().enumerate() {
				self.simple(K::GenericParam, r.owner.get(), K::GenericParamConstraint, i + 1, "Owner");
				self.coded(C::TypeDefOrRef, r.constraint.decode(), K::GenericParamConstraint, i + 1, "Constraint");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::diagnostics::NullSink;

	fn sink() -> Arc<dyn WarningSink> {
		Arc::new(NullSink)
	}

	#[test]
	fn consecutive_starts_delimit_each_parents_children() {
		let runs = runs(&[1, 3, 3], TableKind::MethodDef, 4, "TypeDef", "MethodList", &sink());
		assert_eq!(runs, [0..2, 2..2, 2..4]);
	}

	#[test]
	fn a_run_of_size_one_is_a_one_element_range() {
		let runs = runs(&[1, 2], TableKind::Field, 2, "TypeDef", "FieldList", &sink());
		assert_eq!(runs, [0..1, 1..2]);
	}

	#[test]
	fn the_last_parent_owns_through_the_childs_last_row() {
		let runs = runs(&[2], TableKind::Param, 5, "MethodDef", "ParamList", &sink());
		assert_eq!(runs, [1..5]);
	}

	#[test]
	fn trailing_empty_runs_point_one_past_the_child_table() {
		let runs = runs(&[1, 3], TableKind::Param, 2, "MethodDef", "ParamList", &sink());
		assert_eq!(runs, [0..2, 2..2]);
	}

	#[test]
	fn out_of_range_starts_collapse_to_empty_runs() {
		let collect = Arc::new(crate::diagnostics::CollectSink::default());
		let sink: Arc<dyn WarningSink> = collect.clone();
		let runs = runs(&[9, 1], TableKind::Param, 3, "MethodDef", "ParamList", &sink);
		assert_eq!(runs, [0..0, 0..3]);
		assert_eq!(collect.len(), 1);
	}

	#[test]
	fn null_starts_are_empty_without_a_warning() {
		let collect = Arc::new(crate::diagnostics::CollectSink::default());
		let sink: Arc<dyn WarningSink> = collect.clone();
		let runs = runs(&[0, 1], TableKind::Field, 1, "TypeDef", "FieldList", &sink);
		assert_eq!(runs, [0..0, 0..1]);
		assert!(collect.is_empty());
	}
}

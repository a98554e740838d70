use std::io::Cursor;
use std::sync::Arc;

use crate::diagnostics::{Warning, WarningSink};
use crate::error::Error;
use crate::raw::cli::MetadataRoot;
use crate::raw::heaps::StringItem;
use crate::raw::indices::coded_index::CodedTarget;
use crate::raw::indices::metadata_token::{MetadataToken, MethodDefToken};
use crate::raw::tables::*;
use crate::schema::links::TableLinks;
use crate::utilities::{read_compressed_u32, FromByteStream};

/// One entity per `MethodDef` row; the variant is decided by the row's RVA.
#[derive(Debug)]
pub enum Method {
	/// Has an IL (or native) body inside this image.
	Internal(InternalMethod),
	/// No body here: abstract, runtime-provided, or forwarded via PInvoke.
	External(ExternalMethod),
}

impl Method {
	pub fn row(&self) -> usize {
		match self {
			Method::Internal(method) => method.row,
			Method::External(method) => method.row,
		}
	}

	pub fn token(&self) -> MetadataToken {
		MethodDefToken(self.row()).into()
	}

	pub fn name(&self) -> Option<&StringItem> {
		match self {
			Method::Internal(method) => method.name.as_ref(),
			Method::External(method) => method.name.as_ref(),
		}
	}

	pub fn flags(&self) -> MethodAttributes {
		match self {
			Method::Internal(method) => method.flags,
			Method::External(method) => method.flags,
		}
	}
}

#[derive(Debug)]
pub struct InternalMethod {
	/// 1-based `MethodDef` row index.
	pub row: usize,
	pub rva: u32,
	pub name: Option<StringItem>,
	pub flags: MethodAttributes,
	pub impl_flags: MethodImplAttributes,
	pub signature: Option<SignatureProbe>,
	pub params: Vec<MethodParam>,
}

#[derive(Debug)]
pub struct ExternalMethod {
	/// 1-based `MethodDef` row index.
	pub row: usize,
	pub name: Option<StringItem>,
	pub flags: MethodAttributes,
	pub impl_flags: MethodImplAttributes,
	pub signature: Option<SignatureProbe>,
	pub params: Vec<MethodParam>,
	pub pinvoke: Option<PInvokeInfo>,
}

/// Where an external method's implementation is forwarded to, from the
/// matching `ImplMap` row.
#[derive(Debug)]
pub struct PInvokeInfo {
	pub flags: PInvokeAttributes,
	pub import_name: Option<StringItem>,
	pub module_name: Option<StringItem>,
}

/// The shallow preamble of a method signature blob: enough for wiring, no
/// full type decoding.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SignatureProbe {
	pub calling_convention: u8,
	pub generic_param_count: Option<u32>,
	pub param_count: u32,
	/// First element-type byte of the return type; `0x01` is `void`.
	pub return_type: Option<u8>,
}

impl SignatureProbe {
	pub fn returns_void(&self) -> bool {
		self.return_type == Some(0x01)
	}
}

#[derive(Debug)]
pub struct MethodParam {
	/// 1-based `Param` row index.
	pub row: usize,
	pub sequence: u16,
	pub flags: ParamAttributes,
	pub name: Option<StringItem>,
}

pub(crate) fn build(
	tables: &TableStream,
	links: &TableLinks,
	metadata: &MetadataRoot,
	sink: &Arc<dyn WarningSink>,
) -> Vec<Method> {
	let Some(method_defs) = tables.table::<MethodDefTable>() else {
		return Vec::new();
	};
	let strings = metadata.strings();
	let blobs = metadata.blobs();
	let params = tables.table::<ParamTable>();
	let impl_maps = tables.table::<ImplMapTable>();
	let module_refs = tables.table::<ModuleRefTable>();

	let mut methods = Vec::with_capacity(method_defs.len());
	for (i, def) in method_defs.rows().iter().enumerate() {
		let row = i + 1;
		let name = strings.and_then(|heap| heap.get(def.name));
		let signature = match def.signature.0 {
			0 => None,
			_ => blobs
				.and_then(|heap| heap.get(def.signature))
				.and_then(|blob| match probe_signature(blob.value()) {
					Some(probe) => Some(probe),
					None => {
						sink.warn(Warning::new(
							Error::DecodingError("method signature"),
							format!("MethodDef[{row}].Signature"),
						));
						None
					},
				}),
		};

		let param_range = links.param_run(row).unwrap_or(0..0);
		let method_params = params
			.and_then(|table| table.rows().get(param_range.clone()))
			.unwrap_or(&[])
			.iter()
			.enumerate()
			.map(|(offset, param)| MethodParam {
				row: param_range.start + offset + 1,
				sequence: param.sequence,
				flags: param.flags,
				name: strings.and_then(|heap| heap.get(param.name)),
			})
			.collect();

		let method = match def.rva {
			0 => Method::External(ExternalMethod {
				row,
				name,
				flags: def.flags,
				impl_flags: def.impl_flags,
				signature,
				params: method_params,
				pinvoke: find_pinvoke(row, impl_maps, module_refs, metadata),
			}),
			rva => Method::Internal(InternalMethod {
				row,
				rva,
				name,
				flags: def.flags,
				impl_flags: def.impl_flags,
				signature,
				params: method_params,
			}),
		};
		methods.push(method);
	}
	methods
}

fn find_pinvoke(
	method_row: usize,
	impl_maps: Option<&ImplMapTable>,
	module_refs: Option<&ModuleRefTable>,
	metadata: &MetadataRoot,
) -> Option<PInvokeInfo> {
	let strings = metadata.strings();
	let row = impl_maps?.rows().iter().find(|map| {
		map.member_forwarded.decode() == CodedTarget::Row(TableKind::MethodDef, method_row)
	})?;
	Some(PInvokeInfo {
		flags: row.flags,
		import_name: strings.and_then(|heap| heap.get(row.import_name)),
		module_name: module_refs
			.and_then(|table| table.get(row.import_scope.get()))
			.and_then(|module| strings.and_then(|heap| heap.get(module.name))),
	})
}

/// II.23.2.1, shallowly: calling convention, generic arity, parameter count
/// and the first element-type byte of the return type.
fn probe_signature(blob: &[u8]) -> Option<SignatureProbe> {
	const GENERIC: u8 = 0x10;
	let mut stream = Cursor::new(blob);
	let calling_convention = u8::read(&mut stream, &()).ok()?;
	let generic_param_count = match calling_convention & GENERIC {
		0 => None,
		_ => Some(read_compressed_u32(&mut stream).ok()?),
	};
	let param_count = read_compressed_u32(&mut stream).ok()?;
	let return_type = u8::read(&mut stream, &()).ok();
	Some(SignatureProbe {
		calling_convention,
		generic_param_count,
		param_count,
		return_type,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn signature_probe_reads_the_preamble() {
		// DEFAULT calling convention, 2 params, void return.
		let probe = probe_signature(&[0x00, 0x02, 0x01, 0x0E, 0x08]).unwrap();
		assert_eq!(probe.param_count, 2);
		assert!(probe.returns_void());
		assert_eq!(probe.generic_param_count, None);
	}

	#[test]
	fn generic_signatures_carry_their_arity() {
		let probe = probe_signature(&[0x10, 0x01, 0x00, 0x0E]).unwrap();
		assert_eq!(probe.generic_param_count, Some(1));
		assert_eq!(probe.param_count, 0);
		assert!(!probe.returns_void());
	}

	#[test]
	fn empty_signatures_probe_to_none() {
		assert!(probe_signature(&[]).is_none());
	}
}

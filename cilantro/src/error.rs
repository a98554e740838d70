use std::fmt::{Display, Formatter};

use crate::raw::tables::TableKind;

/// Every failure the decoder can report.
///
/// Whether a given kind is fatal or recoverable is a property of the call
/// site: structural failures that make the whole image unusable are returned
/// from constructors, everything else flows through the
/// [`WarningSink`](crate::diagnostics::WarningSink) and degrades the affected
/// field to absent.
#[derive(Debug)]
pub enum Error {
	Io(std::io::Error),
	Pe(goblin::error::Error),
	NoClrDirectory,
	InvalidMetadataSignature { found: u32 },
	TruncatedStructure(&'static str),
	InvalidCompressedInt,
	HeapIndexOutOfRange { heap: &'static str, index: usize },
	TableIndexOutOfRange { table: TableKind, index: usize },
	UnknownCodedIndexTag { kind: &'static str, tag: u32 },
	UnknownResourceType(String),
	InvalidResourceSet(&'static str),
	DecodingError(&'static str),
}

impl Display for Error {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::Io(err) => write!(f, "i/o error: {err}"),
			Error::Pe(err) => write!(f, "invalid PE image: {err}"),
			Error::NoClrDirectory => f.write_str("the image has no CLR data directory"),
			Error::InvalidMetadataSignature { found } => {
				write!(f, "invalid metadata signature {found:#010X}, expected 0x424A5342")
			},
			Error::TruncatedStructure(what) => write!(f, "truncated {what}"),
			Error::InvalidCompressedInt => f.write_str("invalid compressed integer prefix"),
			Error::HeapIndexOutOfRange { heap, index } => {
				write!(f, "index {index} is out of range for the {heap} heap")
			},
			Error::TableIndexOutOfRange { table, index } => {
				write!(f, "row {index} is out of range for the {table:?} table")
			},
			Error::UnknownCodedIndexTag { kind, tag } => {
				write!(f, "unknown tag {tag} in a {kind} coded index")
			},
			Error::UnknownResourceType(name) => write!(f, "unknown resource type {name:?}"),
			Error::InvalidResourceSet(what) => write!(f, "invalid resource set: {what}"),
			Error::DecodingError(what) => write!(f, "failed to decode {what}"),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(err) => Some(err),
			Error::Pe(err) => Some(err),
			_ => None,
		}
	}
}

impl From<std::io::Error> for Error {
	fn from(value: std::io::Error) -> Self {
		Self::Io(value)
	}
}

impl From<goblin::error::Error> for Error {
	fn from(value: goblin::error::Error) -> Self {
		Self::Pe(value)
	}
}

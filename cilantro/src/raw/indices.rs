pub mod metadata_token {
	use std::fmt::{Debug, Formatter};

	use paste::paste;

	macro_rules! define_metadata_token {
		($($id: ident = $discriminant: literal),* $(,)?) => {
			#[repr(u32)]
			#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
			pub enum MetadataTokenKind {
				$($id = $discriminant),*
			}

			/// A packed `(kind << 24) | row` reference, as found in the CLI
			/// header entry point and IL immediates.
			#[repr(transparent)]
			#[derive(Copy, Clone, Eq, PartialEq, Hash)]
			pub struct MetadataToken(u32);

			impl MetadataToken {
				pub fn kind(&self) -> MetadataTokenKind {
					let discriminant = self.0 >> 24;
					match discriminant {
						$($discriminant => MetadataTokenKind::$id,)*
						_ => unreachable!(),
					}
				}

				#[inline]
				pub fn index(&self) -> usize {
					(self.0 & 0x00FF_FFFF) as usize
				}

				#[inline]
				pub fn raw(&self) -> u32 {
					self.0
				}
			}

			impl TryFrom<u32> for MetadataToken {
				type Error = ();
				fn try_from(value: u32) -> Result<Self, Self::Error> {
					let discriminant = value >> 24;
					match discriminant {
						$($discriminant => Ok(Self(value)),)*
						_ => Err(()),
					}
				}
			}

			paste! {
				$(
					#[repr(transparent)]
					#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
					pub struct [<$id Token>](pub usize);

					impl From<[<$id Token>]> for MetadataToken {
						fn from(value: [<$id Token>]) -> Self {
							MetadataToken(((MetadataTokenKind::$id as u32) << 24) | value.0 as u32)
						}
					}

					impl TryFrom<MetadataToken> for [<$id Token>] {
						type Error = ();
						fn try_from(value: MetadataToken) -> Result<Self, Self::Error> {
							match value.kind() {
								MetadataTokenKind::$id => Ok(Self(value.index())),
								_ => Err(()),
							}
						}
					}
				)*
			}
		};
	}

	impl Debug for MetadataToken {
		fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
			write!(f, "MetadataToken::{:?}(", self.kind())?;
			self.index().fmt(f)?;
			write!(f, ")")
		}
	}

	define_metadata_token! {
		Module = 0x00,
		TypeRef = 0x01,
		TypeDef = 0x02,
		Field = 0x04,
		MethodDef = 0x06,
		Param = 0x08,
		InterfaceImpl = 0x09,
		MemberRef = 0x0a,
		CustomAttribute = 0x0c,
		DeclSecurity = 0x0e,
		StandAloneSig = 0x11,
		Event = 0x14,
		Property = 0x17,
		ModuleRef = 0x1a,
		TypeSpec = 0x1b,
		Assembly = 0x20,
		AssemblyRef = 0x23,
		File = 0x26,
		ExportedType = 0x27,
		ManifestResource = 0x28,
		GenericParam = 0x2a,
		MethodSpec = 0x2b,
		GenericParamConstraint = 0x2c,
		String = 0x70,
	}
}

pub mod coded_index {
	use std::fmt::{Debug, Formatter};
	use std::io::{Cursor, Read};

	use crate::raw::indices::sizes::{IndexSizes, SizeOf};
	use crate::raw::tables::TableKind;
	use crate::utilities::FromByteStream;

	/// The resolution of a packed coded index.
	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub enum CodedTarget {
		/// Row index 0: no reference.
		Null,
		/// A 1-based row in a concrete table.
		Row(TableKind, usize),
		/// The tag selects no candidate table.
		UnknownTag(u32),
	}

	impl CodedTarget {
		pub fn row(&self) -> Option<(TableKind, usize)> {
			match self {
				CodedTarget::Row(table, index) => Some((*table, *index)),
				_ => None,
			}
		}
	}

	macro_rules! coded_candidate {
		(_) => { None };
		($table: ident) => { Some(TableKind::$table) };
	}

	macro_rules! define_coded_index {
		($($id: ident: [$($variant: tt),*]),* $(,)?) => {
			#[repr(u32)]
			#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
			pub enum CodedIndexKind {
				$($id),*
			}

			pub(crate) const CODED_INDEX_COUNT: usize = {
				[$(CodedIndexKind::$id),*].len()
			};

			pub(crate) const CODED_INDEX_KINDS: [CodedIndexKind; CODED_INDEX_COUNT] = [
				$(CodedIndexKind::$id),*
			];

			const CANDIDATES: &[&[Option<TableKind>]] = &[$(&[$(coded_candidate!($variant)),*]),*];
			const NAMES: &[&str] = &[$(stringify!($id)),*];

			$(
				/// Stored raw; classification happens at [`decode`](Self::decode)
				/// so an invalid tag degrades one field, not its whole row.
				#[repr(transparent)]
				#[derive(Copy, Clone, Eq, PartialEq, Hash)]
				pub struct $id(u32);

				impl $id {
					#[inline]
					pub fn raw(&self) -> u32 {
						self.0
					}

					#[inline]
					pub fn decode(&self) -> CodedTarget {
						CodedIndexKind::$id.decode(self.0)
					}
				}

				impl Debug for $id {
					fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
						write!(f, "{}({:?})", stringify!($id), self.decode())
					}
				}

				impl FromByteStream for $id {
					type Deps = IndexSizes;
					fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
						let size = <IndexSizes as SizeOf<$id>>::size_of(sizes);
						let mut bytes = [0u8; 4];
						stream.read_exact(&mut bytes[..size])?;
						Ok(Self(u32::from_le_bytes(bytes)))
					}
				}

				impl SizeOf<$id> for IndexSizes {
					#[inline]
					fn size_of(&self) -> usize {
						self.coded[CodedIndexKind::$id as usize]
					}
				}
			)*
		};
	}

	define_coded_index! {
		TypeDefOrRef: [TypeDef, TypeRef, TypeSpec],
		HasConstant: [Field, Param, Property],
		HasCustomAttribute: [
			MethodDef, Field, TypeRef, TypeDef, Param, InterfaceImpl, MemberRef,
			Module, DeclSecurity, Property, Event, StandAloneSig, ModuleRef,
			TypeSpec, Assembly, AssemblyRef, File, ExportedType,
			ManifestResource, GenericParam, GenericParamConstraint, MethodSpec
		],
		HasFieldMarshal: [Field, Param],
		HasDeclSecurity: [TypeDef, MethodDef, Assembly],
		MemberRefParent: [TypeDef, TypeRef, ModuleRef, MethodDef, TypeSpec],
		HasSemantics: [Event, Property],
		MethodDefOrRef: [MethodDef, MemberRef],
		MemberForwarded: [Field, MethodDef],
		Implementation: [File, AssemblyRef, ExportedType],
		CustomAttributeType: [_, _, MethodDef, MemberRef, _],
		ResolutionScope: [Module, ModuleRef, AssemblyRef, TypeRef],
		TypeOrMethodDef: [TypeDef, MethodDef],
		HasCustomDebugInformation: [
			MethodDef, Field, TypeRef, TypeDef, Param, InterfaceImpl, MemberRef,
			Module, DeclSecurity, Property, Event, StandAloneSig, ModuleRef,
			TypeSpec, Assembly, AssemblyRef, File, ExportedType,
			ManifestResource, GenericParam, GenericParamConstraint, MethodSpec,
			Document, LocalScope, LocalVariable, LocalConstant, ImportScope
		],
	}

	impl CodedIndexKind {
		pub const fn name(&self) -> &'static str {
			NAMES[*self as usize]
		}

		/// `ceil(log2(candidate count))` — the tag width in bits.
		pub const fn tag_bits(&self) -> u32 {
			let len = CANDIDATES[*self as usize].len() as u32;
			32 - (len - 1).leading_zeros()
		}

		/// 2 bytes unless any candidate table has `2^(16 - tag_bits)` rows
		/// or more.
		pub fn size(&self, row_counts: &[u32; 64]) -> usize {
			let bits = self.tag_bits();
			let max = CANDIDATES[*self as usize]
				.iter()
				.flatten()
				.map(|table| row_counts[*table as usize])
				.max()
				.unwrap_or(0);
			match max as u64 >= 1u64 << (16 - bits) {
				true => 4,
				false => 2,
			}
		}

		pub fn decode(&self, value: u32) -> CodedTarget {
			let bits = self.tag_bits();
			let tag = value & ((1 << bits) - 1);
			let index = (value >> bits) as usize;
			match CANDIDATES[*self as usize].get(tag as usize) {
				Some(Some(table)) => match index {
					0 => CodedTarget::Null,
					_ => CodedTarget::Row(*table, index),
				},
				_ => match value {
					0 => CodedTarget::Null,
					_ => CodedTarget::UnknownTag(tag),
				},
			}
		}
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		#[test]
		fn tag_bits_match_candidate_counts() {
			assert_eq!(CodedIndexKind::TypeDefOrRef.tag_bits(), 2);
			assert_eq!(CodedIndexKind::HasFieldMarshal.tag_bits(), 1);
			assert_eq!(CodedIndexKind::HasCustomAttribute.tag_bits(), 5);
			assert_eq!(CodedIndexKind::CustomAttributeType.tag_bits(), 3);
			assert_eq!(CodedIndexKind::MemberRefParent.tag_bits(), 3);
		}

		#[test]
		fn width_goes_fat_at_the_exact_boundary() {
			let mut counts = [0u32; 64];
			counts[TableKind::TypeDef as usize] = (1 << 14) - 1;
			assert_eq!(CodedIndexKind::TypeDefOrRef.size(&counts), 2);
			counts[TableKind::TypeDef as usize] = 1 << 14;
			assert_eq!(CodedIndexKind::TypeDefOrRef.size(&counts), 4);
		}

		#[test]
		fn decode_splits_tag_and_row() {
			let target = CodedIndexKind::TypeDefOrRef.decode((3 << 2) | 1);
			assert_eq!(target, CodedTarget::Row(TableKind::TypeRef, 3));
			assert_eq!(CodedIndexKind::TypeDefOrRef.decode(0), CodedTarget::Null);
			assert_eq!(CodedIndexKind::TypeDefOrRef.decode(1), CodedTarget::Null);
		}

		#[test]
		fn unused_custom_attribute_tags_are_unknown() {
			assert_eq!(CodedIndexKind::CustomAttributeType.decode((5 << 3) | 1), CodedTarget::UnknownTag(1));
			let target = CodedIndexKind::CustomAttributeType.decode((5 << 3) | 2);
			assert_eq!(target, CodedTarget::Row(TableKind::MethodDef, 5));
		}
	}
}

pub mod table_index {
	use std::io::{Cursor, Read};

	use crate::raw::indices::sizes::{IndexSizes, SizeOf};
	use crate::raw::tables::TableKind;
	use crate::utilities::FromByteStream;

	macro_rules! define_table_index {
		($($id: ident => $table: ident),* $(,)?) => {$(
			/// A 1-based row index; 0 means "no row".
			#[repr(transparent)]
			#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
			pub struct $id(pub u32);

			impl $id {
				pub const TARGET: TableKind = TableKind::$table;

				#[inline]
				pub fn get(&self) -> usize {
					self.0 as usize
				}

				#[inline]
				pub fn is_null(&self) -> bool {
					self.0 == 0
				}
			}

			impl FromByteStream for $id {
				type Deps = IndexSizes;
				fn read(stream: &mut Cursor<&[u8]>, sizes: &Self::Deps) -> std::io::Result<Self> {
					let size = sizes.tables[TableKind::$table as usize];
					let mut bytes = [0u8; 4];
					stream.read_exact(&mut bytes[..size])?;
					Ok(Self(u32::from_le_bytes(bytes)))
				}
			}

			impl SizeOf<$id> for IndexSizes {
				#[inline]
				fn size_of(&self) -> usize {
					self.tables[TableKind::$table as usize]
				}
			}
		)*};
	}

	define_table_index! {
		TypeDefIndex => TypeDef,
		FieldIndex => Field,
		MethodDefIndex => MethodDef,
		ParamIndex => Param,
		EventIndex => Event,
		PropertyIndex => Property,
		ModuleRefIndex => ModuleRef,
		AssemblyRefIndex => AssemblyRef,
		GenericParamIndex => GenericParam,
	}
}

pub mod sizes {
	use crate::raw::heaps::{BlobIndex, GuidIndex, StringIndex};
	use crate::raw::indices::coded_index::{CODED_INDEX_COUNT, CODED_INDEX_KINDS};

	/// The physical widths of every index kind in one tables stream,
	/// computed once from the heap-size byte and the declared row counts
	/// and reused to decode every row.
	#[derive(Debug, Clone)]
	pub struct IndexSizes {
		pub string: usize,
		pub guid: usize,
		pub blob: usize,
		pub coded: [usize; CODED_INDEX_COUNT],
		pub tables: [usize; 64],
	}

	pub trait SizeOf<T> {
		fn size_of(&self) -> usize;
	}

	impl IndexSizes {
		pub fn new(heap_sizes: u8, row_counts: &[u32; 64]) -> Self {
			Self {
				string: 2 + 2 * ((heap_sizes & 0x1) != 0) as usize,
				guid: 2 + 2 * ((heap_sizes & 0x2) != 0) as usize,
				blob: 2 + 2 * ((heap_sizes & 0x4) != 0) as usize,
				coded: {
					let mut coded = [0; CODED_INDEX_COUNT];
					for (size, kind) in coded.iter_mut().zip(CODED_INDEX_KINDS) {
						*size = kind.size(row_counts);
					}
					coded
				},
				tables: {
					let mut tables = [0; 64];
					for (size, len) in tables.iter_mut().zip(row_counts) {
						*size = 2 + 2 * (*len >= (1 << 16)) as usize;
					}
					tables
				},
			}
		}
	}

	impl AsRef<()> for IndexSizes {
		#[inline]
		fn as_ref(&self) -> &() {
			&()
		}
	}

	impl AsRef<IndexSizes> for IndexSizes {
		#[inline]
		fn as_ref(&self) -> &Self {
			self
		}
	}

	impl SizeOf<u8> for IndexSizes {
		#[inline]
		fn size_of(&self) -> usize {
			1
		}
	}

	impl SizeOf<u16> for IndexSizes {
		#[inline]
		fn size_of(&self) -> usize {
			2
		}
	}

	impl SizeOf<u32> for IndexSizes {
		#[inline]
		fn size_of(&self) -> usize {
			4
		}
	}

	impl SizeOf<u64> for IndexSizes {
		#[inline]
		fn size_of(&self) -> usize {
			8
		}
	}

	impl<const S: usize> SizeOf<[u8; S]> for IndexSizes {
		#[inline]
		fn size_of(&self) -> usize {
			S
		}
	}

	impl SizeOf<StringIndex> for IndexSizes {
		#[inline]
		fn size_of(&self) -> usize {
			self.string
		}
	}

	impl SizeOf<GuidIndex> for IndexSizes {
		#[inline]
		fn size_of(&self) -> usize {
			self.guid
		}
	}

	impl SizeOf<BlobIndex> for IndexSizes {
		#[inline]
		fn size_of(&self) -> usize {
			self.blob
		}
	}

	#[cfg(test)]
	mod tests {
		use super::*;
		use crate::raw::tables::TableKind;

		#[test]
		fn heap_size_bits_select_wide_indices() {
			let counts = [0u32; 64];
			let sizes = IndexSizes::new(0b101, &counts);
			assert_eq!((sizes.string, sizes.guid, sizes.blob), (4, 2, 4));
		}

		#[test]
		fn simple_indices_go_fat_at_sixty_four_k_rows() {
			let mut counts = [0u32; 64];
			counts[TableKind::Field as usize] = 0xFFFF;
			counts[TableKind::Param as usize] = 0x10000;
			let sizes = IndexSizes::new(0, &counts);
			assert_eq!(sizes.tables[TableKind::Field as usize], 2);
			assert_eq!(sizes.tables[TableKind::Param as usize], 4);
		}
	}
}

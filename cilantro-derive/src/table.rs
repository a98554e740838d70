use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput};

pub fn derive(tokens: proc_macro::TokenStream) -> TokenStream {
	let DeriveInput {
		vis,
		ident,
		data,
		..
	} = syn::parse(tokens).unwrap();

	let data = match data {
		Data::Struct(data) => data,
		Data::Enum(_) => panic!("Enums are not supported"),
		Data::Union(_) => panic!("Unions are not supported"),
	};

	let table = format_ident!("{}Table", ident);
	let types: Vec<_> = data.fields.iter().map(|f| &f.ty).collect();
	let reads = data.fields.iter().map(|field| {
		let ident = &field.ident;
		let ty = &field.ty;
		quote! {
			#ident: <#ty as crate::utilities::FromByteStream>::read(stream, sizes.as_ref())?
		}
	});

	quote! {
		#[derive(Debug, Clone)]
		#vis struct #table {
			rows: Vec<#ident>,
		}

		impl #table {
			/// The physical size of one row under the given index widths.
			pub fn row_size(sizes: &crate::raw::indices::sizes::IndexSizes) -> usize {
				0 #(+ <crate::raw::indices::sizes::IndexSizes as crate::raw::indices::sizes::SizeOf<#types>>::size_of(sizes))*
			}

			/// Fetches a row by its 1-based metadata index; 0 means "no row".
			pub fn get(&self, index: usize) -> Option<&#ident> {
				match index {
					0 => None,
					_ => self.rows.get(index - 1),
				}
			}

			pub fn rows(&self) -> &[#ident] {
				&self.rows
			}
		}

		impl crate::raw::tables::ReadTable for #table {
			fn read(
				stream: &mut std::io::Cursor<&[u8]>,
				sizes: &crate::raw::indices::sizes::IndexSizes,
				len: usize,
			) -> std::io::Result<Self> {
				let mut rows = Vec::with_capacity(len);
				for _ in 0..len {
					rows.push(#ident { #(#reads),* });
				}
				Ok(Self { rows })
			}

			fn row_width(sizes: &crate::raw::indices::sizes::IndexSizes) -> usize {
				Self::row_size(sizes)
			}
		}

		impl crate::raw::tables::Table for #table {
			fn len(&self) -> usize {
				self.rows.len()
			}

			fn kind(&self) -> crate::raw::tables::TableKind {
				crate::raw::tables::TableKind::#ident
			}

			fn as_any(&self) -> &dyn std::any::Any {
				self
			}
		}
	}
}

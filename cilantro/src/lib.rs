//! A tolerant decoder for the CLR metadata inside .NET (CLI) executables.
//!
//! The PE container is delegated to [`goblin`]; everything past the CLR data
//! directory is decoded here: the CLI header, the metadata root and its
//! stream directory, the `#Strings` / `#US` / `#GUID` / `#Blob` heaps, the
//! `#~` / `#-` / `#Schema` tables stream with its dynamically sized rows,
//! coded indices, run-lists, and the manifest resource subsystem including
//! nested `.resources` sets.
//!
//! Structural failures that make an image unusable are returned as
//! [`Error`]; everything else (the kind of corruption real-world samples are
//! full of) is reported through a pluggable [`WarningSink`] while the
//! affected field degrades to absent.
//!
//! ```no_run
//! use cilantro::Image;
//!
//! # fn main() -> Result<(), cilantro::Error> {
//! let image = Image::open("sample.exe")?;
//! for resource in image.clr().resources() {
//!     println!("{:?}", resource.name().map(|name| name.value().to_owned()));
//! }
//! # Ok(())
//! # }
//! ```

pub mod diagnostics;
pub mod error;
pub mod pe;
pub mod raw;
pub mod schema;

mod utilities;

pub use diagnostics::{CollectSink, LogSink, NullSink, Warning, WarningSink};
pub use error::Error;
pub use schema::image::{Clr, Image, ImageOptions};
pub use schema::links::TableLinks;
pub use schema::methods::{ExternalMethod, InternalMethod, Method};
pub use schema::resources::{ClrResource, ResourceData, ResourceEntry, ResourceSet, ResourceValue};

//! A library for writing single- and multi-volume [Windows
//! cabinet](https://en.wikipedia.org/wiki/Cabinet_(file_format)) (CAB)
//! sets.
//!
//! Files are streamed into *folders* (compression units) and packed into
//! one or more cabinet volumes.  When a per-volume size budget fills up
//! mid-block, the block is split across the volume boundary and the set
//! continues in the next volume with the proper continuation linkage, so
//! every byte of the budget is used.
//!
//! # Example
//!
//! ```no_run
//! use cabpack::{CabSetBuilder, CompressionType};
//!
//! # fn main() -> cabpack::Result<()> {
//! let mut cab = CabSetBuilder::new("install#.cab")
//!     .volume_limit(1_440_000)
//!     .disk_label("Install Disk #")
//!     .create()?;
//! cab.add_folder(CompressionType::MsZip(6))?;
//! cab.add_file("readme.txt", "docs/readme.txt")?;
//! cab.add_folder(CompressionType::None)?;
//! cab.add_file("sounds\\intro.wav", "assets/intro.wav")?;
//! let stats = cab.finish()?;
//! println!("{} volume(s) written", stats.volumes);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

#[macro_use]
mod macros;

mod block;
mod builder;
mod checksum;
mod consts;
mod ctype;
mod datetime;
mod error;
mod file;
mod folder;
mod mszip;
mod pipeline;
mod source;
mod string;
mod volume;

pub use crate::builder::{CabSetBuilder, CabSetWriter};
pub use crate::ctype::{BlockCompressor, CompressionType};
pub use crate::error::{CabError, Result};
pub use crate::pipeline::ArchiveStats;
pub use crate::source::{DiskSource, FileSource, SourceFile, SourceMetadata};
pub use crate::string::{archive_name, NameStrip};

// ========================================================================= //

//! # vdrv-unpacker
//!
//! Unpacker for VDRV drive archives with HTTP URL support using Range requests.
//!
//! A VDRV archive stores a directory tree of individually zlib-compressed
//! files. Its directory metadata is a linked chain of records whose payloads
//! are scrambled by a small custom cipher. This library walks the chain,
//! decrypts each record, rebuilds the tree and writes the files back out.
//!
//! ## Features
//!
//! - Extract VDRV archives from the local filesystem
//! - Extract VDRV archives from HTTP/HTTPS URLs using Range requests
//! - Bounds-checked parsing: truncated or corrupt archives yield errors, not panics
//! - Per-file failure reporting; one bad stream does not stop its siblings
//! - Optional concurrent extraction sharing a single reader
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use vdrv_unpacker::{ExtractOptions, LocalFileReader, VdrvExtractor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reader = Arc::new(LocalFileReader::new(Path::new("DATA.VDRV"))?);
//!     let extractor = VdrvExtractor::new(reader);
//!
//!     let meta = extractor.read_metadata().await?;
//!     for root in meta.root_entries() {
//!         let report = extractor
//!             .extract_directory(&meta, root, Path::new("out"), &ExtractOptions::default())
//!             .await?;
//!         println!("{}: {} files", root.name(), report.files);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod vdrv;

pub use cli::Cli;
pub use error::{Result, VdrvError};
pub use io::{ArchiveCursor, HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
pub use vdrv::{DriveMetadata, Entry, EntryType, ExtractOptions, ExtractReport, VdrvExtractor};

//! VDRV drive archive parsing and extraction.
//!
//! ## Architecture
//!
//! - [`cipher`]: the byte cipher protecting each metadata record
//! - [`structures`]: record header, entry and layout constants
//! - [`parser`]: walks the linked record chain and decodes entries
//! - [`metadata`]: the parsed entries with parent/child lookups
//! - [`extractor`]: high-level extraction API for end users
//!
//! ## VDRV Format Overview
//!
//! A VDRV file consists of:
//! 1. An opaque 0x48-byte header
//! 2. A u32 at 0x48 pointing at the first metadata record
//! 3. Metadata records, each a 16-byte cleartext header
//!    (`type`, `length`, `reserved`, `next`) and an encrypted payload
//! 4. zlib streams holding the file contents, anywhere in the file
//!
//! Records form a singly linked list through `next`. The directory tree is
//! a separate relation: every payload names the offset of its parent record,
//! with 0 meaning top level.
//!
//! ## Limitations
//!
//! - Read only; archives cannot be written or re-encrypted
//! - The header before 0x48 is not interpreted

pub mod cipher;
mod extractor;
mod metadata;
mod parser;
mod structures;

#[cfg(test)]
pub(crate) mod fixture;

pub use extractor::{ExtractOptions, ExtractReport, VdrvExtractor, decompress};
pub use metadata::DriveMetadata;
pub use parser::{MetadataParser, parse_payload};
pub use structures::*;

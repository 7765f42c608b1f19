//! Low-level VDRV metadata parser.
//!
//! ## Parsing Strategy
//!
//! The metadata is a singly linked chain of records:
//! 1. Read the pointer to the first record at [`FIRST_RECORD_POINTER`]
//! 2. Read the cleartext record header at that pointer
//! 3. Read and decrypt the payload, then pull out the entry fields
//! 4. Follow the header's next pointer until it is 0
//!
//! The chain only fixes the scan order. Parent/child relations come from
//! the `parent_offset` stored inside each payload and are resolved later by
//! [`DriveMetadata`].

use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, VdrvError};
use crate::io::{ArchiveCursor, ReadAt};

use super::cipher;
use super::metadata::DriveMetadata;
use super::structures::*;

/// Reads the metadata chain of a VDRV archive.
pub struct MetadataParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
}

impl<R: ReadAt> MetadataParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self { reader }
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    /// Walk the whole chain and collect every entry in scan order.
    ///
    /// # Errors
    ///
    /// Any record error aborts the walk. A next pointer that leads back to
    /// an already parsed record is reported as [`VdrvError::Malformed`].
    pub async fn read_metadata(&self) -> Result<DriveMetadata> {
        let mut cursor = ArchiveCursor::new(self.reader.clone());

        cursor.seek(FIRST_RECORD_POINTER)?;
        let mut pointer = cursor.read_u32().await?;

        let mut entries = Vec::new();
        let mut visited = HashSet::new();

        while pointer != 0 {
            if !visited.insert(pointer) {
                return Err(VdrvError::Malformed(format!(
                    "metadata chain loops back to record 0x{pointer:X}"
                )));
            }

            let (entry, next) = self.read_entry(&mut cursor, pointer).await?;
            entries.push(entry);
            pointer = next;
        }

        debug!(entries = entries.len(), "metadata chain parsed");
        DriveMetadata::new(entries)
    }

    /// Parse the record at `offset`.
    ///
    /// # Returns
    ///
    /// The decoded entry and the offset of the next record in the chain
    /// (0 ends the chain).
    pub async fn read_entry(
        &self,
        cursor: &mut ArchiveCursor<R>,
        offset: u32,
    ) -> Result<(Entry, u32)> {
        let header = read_record_header(cursor, offset).await?;
        let payload_len = header.payload_len(offset as u64)?;

        let mut payload = cursor.read_bytes(payload_len as usize).await?;
        cipher::decrypt_entry(&mut payload)?;

        let entry = parse_payload(&header, offset, &payload)?;

        debug!(
            offset = format_args!("0x{offset:X}"),
            parent = format_args!("0x{:X}", entry.parent_offset),
            kind = ?entry.entry_type,
            name = %entry.name(),
            "parsed record"
        );

        Ok((entry, header.next_pointer))
    }
}

async fn read_record_header<R: ReadAt>(
    cursor: &mut ArchiveCursor<R>,
    offset: u32,
) -> Result<RecordHeader> {
    cursor.seek(offset as u64)?;

    let entry_type = cursor.read_u32().await?;
    let entry_length = cursor.read_u32().await?;
    let reserved = cursor.read_u32().await?;
    let next_pointer = cursor.read_u32().await?;

    Ok(RecordHeader {
        entry_type,
        entry_length,
        reserved,
        next_pointer,
    })
}

/// Extract the entry fields from a decrypted payload.
pub fn parse_payload(header: &RecordHeader, offset: u32, payload: &[u8]) -> Result<Entry> {
    let entry_type =
        EntryType::from_u32(header.entry_type).ok_or(VdrvError::UnknownEntryType {
            offset: offset as u64,
            code: header.entry_type,
        })?;

    let parent_offset = payload_u32(payload, PARENT_OFFSET_FIELD)?;

    let name_bytes = payload.get(FILE_NAME_FIELD..).unwrap_or_default();
    let name_end = name_bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(name_bytes.len());
    let file_name = name_bytes[..name_end].to_vec();

    let (file_size, file_start) = match entry_type {
        EntryType::File => {
            let size_at = payload
                .len()
                .checked_sub(8)
                .ok_or_else(|| VdrvError::out_of_range(0, 8, payload.len() as u64))?;
            (
                payload_u32(payload, size_at)?,
                payload_u32(payload, size_at + 4)?,
            )
        }
        EntryType::Directory => (0, 0),
    };

    Ok(Entry {
        file_name,
        entry_offset: offset,
        parent_offset,
        file_size,
        file_start,
        entry_type,
    })
}

fn payload_u32(payload: &[u8], at: usize) -> Result<u32> {
    payload
        .get(at..at + 4)
        .map(LittleEndian::read_u32)
        .ok_or_else(|| VdrvError::out_of_range(at as u64, 4, payload.len() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use crate::vdrv::fixture::ArchiveBuilder;

    fn parser(data: Vec<u8>) -> MetadataParser<MemoryReader> {
        MetadataParser::new(Arc::new(MemoryReader::new(data)))
    }

    #[test]
    fn payload_fields_for_file() {
        let header = RecordHeader {
            entry_type: EntryType::FILE_CODE,
            entry_length: 0x30,
            reserved: 0,
            next_pointer: 0,
        };
        let mut payload = vec![0u8; 0x20];
        payload[8..12].copy_from_slice(&0x1234u32.to_le_bytes());
        payload[0x10..0x15].copy_from_slice(b"a.bin");
        payload[0x18..0x1C].copy_from_slice(&77u32.to_le_bytes());
        payload[0x1C..0x20].copy_from_slice(&0x400u32.to_le_bytes());

        let entry = parse_payload(&header, 0x900, &payload).unwrap();
        assert_eq!(entry.file_name, b"a.bin");
        assert_eq!(entry.entry_offset, 0x900);
        assert_eq!(entry.parent_offset, 0x1234);
        assert_eq!(entry.file_size, 77);
        assert_eq!(entry.file_start, 0x400);
        assert_eq!(entry.entry_type, EntryType::File);
    }

    #[test]
    fn directory_sizes_are_zero() {
        let header = RecordHeader {
            entry_type: EntryType::DIRECTORY_CODE,
            entry_length: 0x28,
            reserved: 0,
            next_pointer: 0,
        };
        let mut payload = vec![0xEEu8; 0x18];
        payload[8..12].copy_from_slice(&0u32.to_le_bytes());
        payload[0x10..0x14].copy_from_slice(b"data");
        payload[0x14] = 0;

        let entry = parse_payload(&header, 0x100, &payload).unwrap();
        assert_eq!(entry.file_name, b"data");
        assert_eq!((entry.file_size, entry.file_start), (0, 0));
        assert!(entry.is_directory());
        assert!(entry.is_root());
    }

    #[test]
    fn unterminated_name_runs_to_payload_end() {
        let header = RecordHeader {
            entry_type: EntryType::DIRECTORY_CODE,
            entry_length: 0x13,
            reserved: 0,
            next_pointer: 0,
        };
        let mut payload = vec![0u8; 0x13];
        payload[0x10..].copy_from_slice(b"abc");
        let entry = parse_payload(&header, 0x50, &payload).unwrap();
        assert_eq!(entry.file_name, b"abc");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let header = RecordHeader {
            entry_type: 7,
            entry_length: 0x30,
            reserved: 0,
            next_pointer: 0,
        };
        let err = parse_payload(&header, 0x200, &[0u8; 0x20]).unwrap_err();
        assert!(matches!(
            err,
            VdrvError::UnknownEntryType {
                offset: 0x200,
                code: 7
            }
        ));
    }

    #[tokio::test]
    async fn reads_chain_in_link_order() {
        let mut builder = ArchiveBuilder::new();
        let root = builder.directory("root", 0);
        let sub = builder.directory("sub", root);
        builder.file("a.txt", root, b"alpha");
        builder.file("b.txt", sub, b"beta");
        let data = builder.finish();

        let meta = parser(data).read_metadata().await.unwrap();
        assert_eq!(meta.len(), 4);
        let names: Vec<_> = meta.entries().iter().map(|e| e.name().into_owned()).collect();
        assert_eq!(names, ["root", "sub", "a.txt", "b.txt"]);
        assert_eq!(meta.entry_at(0).unwrap().entry_offset, root);
        assert_eq!(meta.entry_at(1).unwrap().parent_offset, root);
    }

    #[tokio::test]
    async fn empty_chain() {
        let data = ArchiveBuilder::new().finish();
        let meta = parser(data).read_metadata().await.unwrap();
        assert!(meta.is_empty());
    }

    #[tokio::test]
    async fn truncated_record_is_out_of_range() {
        let mut builder = ArchiveBuilder::new();
        builder.directory("root", 0);
        let mut data = builder.finish();
        data.truncate(data.len() - 3);

        let err = parser(data).read_metadata().await.unwrap_err();
        assert!(matches!(err, VdrvError::OutOfRange { .. }));
    }

    #[tokio::test]
    async fn chain_pointer_past_end_is_out_of_range() {
        let mut data = ArchiveBuilder::new().finish();
        let len = data.len() as u32;
        data[0x48..0x4C].copy_from_slice(&(len + 0x10).to_le_bytes());

        let err = parser(data).read_metadata().await.unwrap_err();
        assert!(matches!(err, VdrvError::OutOfRange { .. }));
    }

    #[tokio::test]
    async fn looping_chain_is_malformed() {
        let mut builder = ArchiveBuilder::new();
        let first = builder.directory("root", 0);
        builder.directory("other", 0);
        builder.link_last_to(first);
        let data = builder.finish();

        let err = parser(data).read_metadata().await.unwrap_err();
        assert!(matches!(err, VdrvError::Malformed(_)));
    }

    #[tokio::test]
    async fn unknown_record_type_aborts_parse() {
        let mut builder = ArchiveBuilder::new();
        builder.directory("root", 0);
        builder.raw_record(9, 0, b"odd");
        let data = builder.finish();

        let err = parser(data).read_metadata().await.unwrap_err();
        assert!(matches!(err, VdrvError::UnknownEntryType { code: 9, .. }));
    }
}

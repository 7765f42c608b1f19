//! Synthetic archive builder for tests.

use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::io::Write;

use super::cipher;
use super::structures::*;

const DATA_START: usize = FIRST_RECORD_POINTER as usize + 4;

/// Writes a minimal archive: an opaque zeroed header, the first record
/// pointer at 0x48, then compressed blobs and encrypted records in call order.
#[derive(Clone)]
pub struct ArchiveBuilder {
    data: Vec<u8>,
    records: Vec<u32>,
    last_link: Option<u32>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; DATA_START],
            records: Vec::new(),
            last_link: None,
        }
    }

    /// Offset the next record or blob will be written at.
    pub fn next_offset(&self) -> u32 {
        self.data.len() as u32
    }

    /// Bytes a directory record named `name` occupies.
    pub fn directory_len(name: &str) -> u32 {
        RECORD_HEADER_SIZE + cipher::HEAD_SECTION_LEN as u32 + name.len() as u32 + 1
    }

    /// Append a directory record and return its offset.
    pub fn directory(&mut self, name: &str, parent: u32) -> u32 {
        self.raw_record(EntryType::DIRECTORY_CODE, parent, name.as_bytes())
    }

    /// Append a zlib-compressed blob plus a file record pointing at it.
    pub fn file(&mut self, name: &str, parent: u32, contents: &[u8]) -> u32 {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(contents).unwrap();
        let stream = encoder.finish().unwrap();
        self.file_raw(name, parent, &stream)
    }

    /// Append `stored` verbatim as the file payload, compressed or not.
    pub fn file_raw(&mut self, name: &str, parent: u32, stored: &[u8]) -> u32 {
        let start = self.data.len() as u32;
        self.data.extend_from_slice(stored);

        let mut tail = name.as_bytes().to_vec();
        tail.push(0);
        tail.extend_from_slice(&(stored.len() as u32).to_le_bytes());
        tail.extend_from_slice(&start.to_le_bytes());
        self.push_record(EntryType::FILE_CODE, parent, tail)
    }

    /// Append a directory-shaped record with an arbitrary type code.
    pub fn raw_record(&mut self, code: u32, parent: u32, name: &[u8]) -> u32 {
        let mut tail = name.to_vec();
        tail.push(0);
        self.push_record(code, parent, tail)
    }

    /// Make the last record's next pointer refer to `target`.
    pub fn link_last_to(&mut self, target: u32) {
        self.last_link = Some(target);
    }

    fn push_record(&mut self, code: u32, parent: u32, tail: Vec<u8>) -> u32 {
        let offset = self.data.len() as u32;

        let mut payload = vec![0u8; cipher::HEAD_SECTION_LEN];
        payload[PARENT_OFFSET_FIELD..PARENT_OFFSET_FIELD + 4]
            .copy_from_slice(&parent.to_le_bytes());
        payload.extend_from_slice(&tail);
        cipher::encrypt_entry(&mut payload);

        let entry_length = RECORD_HEADER_SIZE + payload.len() as u32;
        self.data.extend_from_slice(&code.to_le_bytes());
        self.data.extend_from_slice(&entry_length.to_le_bytes());
        self.data.extend_from_slice(&0u32.to_le_bytes());
        self.data.extend_from_slice(&0u32.to_le_bytes());
        self.data.extend_from_slice(&payload);

        self.records.push(offset);
        offset
    }

    /// Link the records in call order and return the archive bytes.
    pub fn finish(mut self) -> Vec<u8> {
        let first = self.records.first().copied().unwrap_or(0);
        let at = FIRST_RECORD_POINTER as usize;
        self.data[at..at + 4].copy_from_slice(&first.to_le_bytes());

        for (i, &offset) in self.records.iter().enumerate() {
            let next = match self.records.get(i + 1) {
                Some(&next) => next,
                None => self.last_link.unwrap_or(0),
            };
            let at = offset as usize + 12;
            self.data[at..at + 4].copy_from_slice(&next.to_le_bytes());
        }

        self.data
    }
}

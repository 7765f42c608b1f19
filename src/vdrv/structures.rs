use std::borrow::Cow;

use crate::error::{Result, VdrvError};

/// Absolute offset of the u32 pointing at the first metadata record.
pub const FIRST_RECORD_POINTER: u64 = 0x48;

/// Size of the cleartext record header in front of every encrypted payload.
pub const RECORD_HEADER_SIZE: u32 = 0x10;

/// Payload offset of the parent record pointer.
pub const PARENT_OFFSET_FIELD: usize = 0x08;

/// Payload offset of the NUL-terminated entry name.
pub const FILE_NAME_FIELD: usize = 0x10;

/// Metadata record types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
}

impl EntryType {
    pub const FILE_CODE: u32 = 3;
    pub const DIRECTORY_CODE: u32 = 4;

    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            Self::FILE_CODE => Some(EntryType::File),
            Self::DIRECTORY_CODE => Some(EntryType::Directory),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            EntryType::File => Self::FILE_CODE,
            EntryType::Directory => Self::DIRECTORY_CODE,
        }
    }
}

/// The 16-byte cleartext header of a metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub entry_type: u32,
    pub entry_length: u32,
    /// Back link to the previous record; not needed for the forward walk.
    pub reserved: u32,
    pub next_pointer: u32,
}

impl RecordHeader {
    /// Length of the encrypted payload following the header.
    pub fn payload_len(&self, offset: u64) -> Result<u32> {
        self.entry_length
            .checked_sub(RECORD_HEADER_SIZE)
            .ok_or_else(|| {
                VdrvError::out_of_range(
                    offset,
                    self.entry_length as u64,
                    RECORD_HEADER_SIZE as u64,
                )
            })
    }
}

/// A decrypted file or directory record.
///
/// `entry_offset` is the record's absolute position and doubles as its
/// identifier; children point at it through `parent_offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub file_name: Vec<u8>,
    pub entry_offset: u32,
    pub parent_offset: u32,
    /// Compressed payload length, 0 for directories.
    pub file_size: u32,
    /// Absolute start of the compressed payload, 0 for directories.
    pub file_start: u32,
    pub entry_type: EntryType,
}

impl Entry {
    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn is_root(&self) -> bool {
        self.parent_offset == 0
    }

    /// Name for display and output paths. Invalid UTF-8 is replaced.
    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.file_name)
    }
}

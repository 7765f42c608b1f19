use thiserror::Error;

/// Errors produced while reading, decrypting or extracting a VDRV archive.
#[derive(Debug, Error)]
pub enum VdrvError {
    /// A read, seek or slice fell outside the available bytes.
    #[error("out of range: {len} byte(s) at offset 0x{offset:X} exceeds size 0x{size:X}")]
    OutOfRange { offset: u64, len: u64, size: u64 },

    /// A metadata record carried a type code that is neither file nor directory.
    #[error("unknown entry type {code} in record at 0x{offset:X}")]
    UnknownEntryType { offset: u64, code: u32 },

    /// The zlib stream of a file entry could not be inflated.
    #[error("failed to decompress {name}: {source}")]
    Decompression {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The archive is structurally inconsistent.
    #[error("malformed archive: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The remote server answered in a way Range reads cannot work with.
    #[error("remote source: {0}")]
    Remote(String),
}

impl VdrvError {
    pub(crate) fn out_of_range(offset: u64, len: u64, size: u64) -> Self {
        VdrvError::OutOfRange { offset, len, size }
    }
}

pub type Result<T, E = VdrvError> = std::result::Result<T, E>;

use byteorder::{ByteOrder, LittleEndian};
use std::sync::Arc;

use super::ReadAt;
use crate::error::{Result, VdrvError};

/// Bounds-checked sequential reader over a [`ReadAt`] source.
///
/// Every read is checked against the source length before any bytes are
/// fetched. The position is private to the cursor, so workers that share a
/// reader each create their own cursor.
pub struct ArchiveCursor<R: ReadAt> {
    reader: Arc<R>,
    size: u64,
    pos: u64,
}

impl<R: ReadAt> ArchiveCursor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self {
            reader,
            size,
            pos: 0,
        }
    }

    /// Current absolute position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Total length of the underlying source.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.pos)
    }

    /// Move to `pos`. Positions at or past the end are rejected.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos >= self.size {
            return Err(VdrvError::out_of_range(pos, 0, self.size));
        }
        self.pos = pos;
        Ok(())
    }

    /// Read exactly `n` bytes and advance past them.
    pub async fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        if (n as u64) > self.remaining() {
            return Err(VdrvError::out_of_range(self.pos, n as u64, self.size));
        }

        let mut buf = vec![0u8; n];
        self.reader.read_exact_at(self.pos, &mut buf).await?;
        self.pos += n as u64;
        Ok(buf)
    }

    /// Read a little-endian u32 and advance by 4.
    pub async fn read_u32(&mut self) -> Result<u32> {
        let buf = self.read_bytes(4).await?;
        Ok(LittleEndian::read_u32(&buf))
    }

    /// Advance by `n` bytes without reading them.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        if n > self.remaining() {
            return Err(VdrvError::out_of_range(self.pos, n, self.size));
        }
        self.pos += n;
        Ok(())
    }
}

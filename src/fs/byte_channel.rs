//! Read-only byte channel over a blob.

use std::io::{Read, Seek, SeekFrom};

use bytes::Bytes;

/// A size-bounded, random-access, read-only channel over blob bytes.
///
/// The blob is fully materialized when the channel is opened; reads and
/// seeks never touch the object store.
#[derive(Debug)]
pub struct BlobChannel {
    bytes: Bytes,
    position: u64,
}

impl BlobChannel {
    pub(crate) fn new(bytes: Bytes) -> Self {
        BlobChannel { bytes, position: 0 }
    }

    /// Total size of the blob in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Current read position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read at an explicit position without moving the channel's own
    /// position. Returns the number of bytes copied, zero at or past the
    /// end.
    pub fn read_at(&self, position: u64, buf: &mut [u8]) -> usize {
        if position >= self.size() {
            return 0;
        }
        let start = position as usize;
        let count = buf.len().min(self.bytes.len() - start);
        buf[..count].copy_from_slice(&self.bytes[start..start + count]);
        count
    }

    /// The remaining bytes from the current position to the end.
    pub fn remaining_bytes(&self) -> Bytes {
        let start = (self.position as usize).min(self.bytes.len());
        self.bytes.slice(start..)
    }
}

impl Read for BlobChannel {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let count = self.read_at(self.position, buf);
        self.position += count as u64;
        Ok(count)
    }
}

impl Seek for BlobChannel {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.size().checked_add_signed(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
        };
        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of channel",
            )),
        }
    }
}

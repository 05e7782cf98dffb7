//! Domain configuration.

use std::fmt;
use std::time::Duration;

/// Checksum scheme applied to each block written to a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Encoding {
    /// No checksum; the stored checksum field is zero.
    None = 0,
    /// CRC32 (IEEE) over the block payload.
    Crc32 = 1,
}

impl Encoding {
    /// Converts a byte to an encoding.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::None),
            1 => Some(Self::Crc32),
            _ => None,
        }
    }

    /// Converts the encoding to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Crc32 => f.write_str("crc32"),
        }
    }
}

/// Configuration of one transaction log domain.
///
/// Every field may be swapped at runtime with `Domain::set_config`. A new
/// value only affects commits and rotations that happen afterwards; data
/// already written keeps the encoding it was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainConfig {
    /// Checksum scheme for new blocks.
    pub encoding: Encoding,

    /// Compression level recorded in new segment headers.
    pub compression_level: u8,

    /// A chunk is flushed once its byte size exceeds this limit.
    pub chunk_size_limit: usize,

    /// `commit_if_stale` flushes a chunk older than this.
    pub chunk_age_limit: Duration,

    /// The open segment is rotated once its byte size exceeds this limit.
    pub segment_size_limit: u64,

    /// Whether to sync the open segment after every written chunk.
    pub fsync_on_commit: bool,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::Crc32,
            compression_level: 9,
            chunk_size_limit: 256 * 1024,                 // 256 KiB
            chunk_age_limit: Duration::from_millis(10),
            segment_size_limit: 256 * 1024 * 1024,        // 256 MiB
            fsync_on_commit: false,
        }
    }
}

impl DomainConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block checksum scheme.
    #[must_use]
    pub const fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Sets the compression level recorded in segment headers.
    #[must_use]
    pub const fn compression_level(mut self, level: u8) -> Self {
        self.compression_level = level;
        self
    }

    /// Sets the chunk size limit in bytes.
    #[must_use]
    pub const fn chunk_size_limit(mut self, bytes: usize) -> Self {
        self.chunk_size_limit = bytes;
        self
    }

    /// Sets the chunk age limit.
    #[must_use]
    pub const fn chunk_age_limit(mut self, age: Duration) -> Self {
        self.chunk_age_limit = age;
        self
    }

    /// Sets the segment size limit in bytes.
    #[must_use]
    pub const fn segment_size_limit(mut self, bytes: u64) -> Self {
        self.segment_size_limit = bytes;
        self
    }

    /// Sets whether to sync after every written chunk.
    #[must_use]
    pub const fn fsync_on_commit(mut self, value: bool) -> Self {
        self.fsync_on_commit = value;
        self
    }
}

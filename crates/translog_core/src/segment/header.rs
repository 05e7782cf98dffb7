//! Segment file header and the context that decorates it.

use crate::config::Encoding;
use crate::error::{TransLogError, TransLogResult};
use crate::types::SerialNum;

/// Magic bytes opening every segment file.
pub const SEGMENT_MAGIC: [u8; 8] = *b"TLOGSEG1";

/// magic (8) + header_len (4)
const PREAMBLE_SIZE: usize = 12;

/// Decorates the header of every newly created segment.
///
/// The context is handed to each segment open unchanged. It has no effect
/// on how records are logged; it only annotates files for operators.
pub trait FileHeaderContext: Send + Sync {
    /// Adds tags to the header of the segment file `file_name`.
    fn add_tags(&self, header: &mut SegmentHeader, file_name: &str);
}

/// Tags each segment with the version and platform that created it.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionHeaderContext;

impl FileHeaderContext for VersionHeaderContext {
    fn add_tags(&self, header: &mut SegmentHeader, _file_name: &str) {
        header.put_tag("version-pkg", env!("CARGO_PKG_VERSION"));
        header.put_tag("version-component", env!("CARGO_PKG_NAME"));
        header.put_tag("version-arch", std::env::consts::ARCH);
        header.put_tag("version-system", std::env::consts::OS);
    }
}

/// Decoded segment header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Encoding the segment was created with.
    pub encoding: Encoding,
    /// Compression level the segment was created with.
    pub compression_level: u8,
    /// First serial the segment may hold.
    pub start: SerialNum,
    /// Free-form key/value annotations.
    pub tags: Vec<(String, String)>,
}

impl SegmentHeader {
    /// Creates a header without tags.
    #[must_use]
    pub fn new(encoding: Encoding, compression_level: u8, start: SerialNum) -> Self {
        Self {
            encoding,
            compression_level,
            start,
            tags: Vec::new(),
        }
    }

    /// Sets a tag, replacing an existing value under the same key.
    pub fn put_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.tags.push((key, value)),
        }
    }

    /// Returns the value of a tag.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Serializes the header including magic and length prefix.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(self.encoding.as_byte());
        body.push(self.compression_level);
        body.extend_from_slice(&self.start.to_le_bytes());
        body.extend_from_slice(&(self.tags.len() as u32).to_le_bytes());
        for (key, value) in &self.tags {
            for s in [key, value] {
                body.extend_from_slice(&(s.len() as u32).to_le_bytes());
                body.extend_from_slice(s.as_bytes());
            }
        }

        let mut data = Vec::with_capacity(PREAMBLE_SIZE + body.len());
        data.extend_from_slice(&SEGMENT_MAGIC);
        data.extend_from_slice(&(body.len() as u32).to_le_bytes());
        data.extend_from_slice(&body);
        data
    }

    /// Returns the header body length declared by a preamble.
    pub(crate) fn body_len(file: &str, preamble: &[u8]) -> TransLogResult<usize> {
        if preamble.len() < PREAMBLE_SIZE || preamble[..8] != SEGMENT_MAGIC {
            return Err(TransLogError::segment_corruption(file, "bad magic bytes"));
        }
        Ok(u32::from_le_bytes([preamble[8], preamble[9], preamble[10], preamble[11]]) as usize)
    }

    /// Size of the fixed preamble preceding the header body.
    pub(crate) const fn preamble_size() -> usize {
        PREAMBLE_SIZE
    }

    /// Deserializes a header body.
    pub(crate) fn decode_body(file: &str, body: &[u8]) -> TransLogResult<Self> {
        let corrupt = |what: &str| TransLogError::segment_corruption(file, format!("header: {what}"));
        let mut reader = ByteReader { buf: body, pos: 0 };

        let fixed = reader.take(14).ok_or_else(|| corrupt("unexpected end"))?;
        let encoding = Encoding::from_byte(fixed[0]).ok_or_else(|| corrupt("unknown encoding"))?;
        let compression_level = fixed[1];
        let mut start = [0u8; 8];
        start.copy_from_slice(&fixed[2..10]);
        let tag_count = u32::from_le_bytes([fixed[10], fixed[11], fixed[12], fixed[13]]);

        let mut tags = Vec::new();
        for _ in 0..tag_count {
            let key = reader.string().ok_or_else(|| corrupt("bad tag key"))?;
            let value = reader.string().ok_or_else(|| corrupt("bad tag value"))?;
            tags.push((key, value));
        }

        Ok(Self {
            encoding,
            compression_level,
            start: u64::from_le_bytes(start),
            tags,
        })
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let slice = self.buf.get(self.pos..self.pos.checked_add(n)?)?;
        self.pos += n;
        Some(slice)
    }

    fn string(&mut self) -> Option<String> {
        let len = self.take(4)?;
        let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
        String::from_utf8(self.take(len)?.to_vec()).ok()
    }
}

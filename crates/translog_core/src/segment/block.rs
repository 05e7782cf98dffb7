//! Block framing inside a segment file.

use crate::config::Encoding;
use translog_storage::{StorageBackend, StorageResult};

/// encoding (1) + payload_len (4)
pub(crate) const BLOCK_HEADER_SIZE: u64 = 5;

/// Trailing checksum.
pub(crate) const CHECKSUM_SIZE: u64 = 4;

/// Outcome of reading the block at an offset.
#[derive(Debug)]
pub(crate) enum BlockRead {
    /// A complete block whose checksum matched.
    Valid {
        /// Payload bytes.
        payload: Vec<u8>,
        /// Bytes occupied by the block including framing.
        len: u64,
    },
    /// The block runs past the end of the file.
    Torn,
    /// The block is complete but invalid.
    Corrupt(String),
}

/// Frames a payload as one block.
///
/// Returns `None` if the payload length does not fit the length field.
pub(crate) fn encode_block(encoding: Encoding, payload: &[u8]) -> Option<Vec<u8>> {
    let len = length_field(payload.len())?;
    let mut data = Vec::with_capacity(payload.len() + (BLOCK_HEADER_SIZE + CHECKSUM_SIZE) as usize);
    data.push(encoding.as_byte());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(payload);
    data.extend_from_slice(&checksum(encoding, payload).to_le_bytes());
    Some(data)
}

fn length_field(payload_len: usize) -> Option<u32> {
    u32::try_from(payload_len).ok()
}

/// Reads and validates the block at `offset`; `end` is the readable size.
pub(crate) fn read_block(
    backend: &dyn StorageBackend,
    offset: u64,
    end: u64,
) -> StorageResult<BlockRead> {
    if offset + BLOCK_HEADER_SIZE > end {
        return Ok(BlockRead::Torn);
    }
    let header = backend.read_at(offset, BLOCK_HEADER_SIZE as usize)?;
    let Some(encoding) = Encoding::from_byte(header[0]) else {
        return Ok(BlockRead::Corrupt(format!(
            "unknown encoding {} at offset {offset}",
            header[0]
        )));
    };
    let payload_len = u64::from(u32::from_le_bytes([header[1], header[2], header[3], header[4]]));
    let len = BLOCK_HEADER_SIZE + payload_len + CHECKSUM_SIZE;
    if offset + len > end {
        return Ok(BlockRead::Torn);
    }

    let body = backend.read_at(offset + BLOCK_HEADER_SIZE, (payload_len + CHECKSUM_SIZE) as usize)?;
    let (payload, stored) = body.split_at(payload_len as usize);
    let stored = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
    let actual = checksum(encoding, payload);
    if stored != actual {
        return Ok(BlockRead::Corrupt(format!(
            "checksum mismatch at offset {offset}: expected {stored:08x}, got {actual:08x}"
        )));
    }

    Ok(BlockRead::Valid {
        payload: payload.to_vec(),
        len,
    })
}

fn checksum(encoding: Encoding, payload: &[u8]) -> u32 {
    match encoding {
        Encoding::None => 0,
        Encoding::Crc32 => compute_crc32(payload),
    }
}

/// Computes CRC32 checksum for data.
pub fn compute_crc32(data: &[u8]) -> u32 {
    // IEEE polynomial, reflected
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

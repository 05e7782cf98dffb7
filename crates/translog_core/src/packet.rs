//! Log entries and the packets that batch them.
//!
//! ## Entry Encoding
//!
//! ```text
//! | serial (8) | kind (4) | data_len (4) | data (N) |
//! ```
//!
//! A packet payload is the concatenation of its encoded entries. All
//! integers are little-endian.

use crate::error::{TransLogError, TransLogResult};
use crate::types::{SerialNum, SerialNumRange};

/// Fixed bytes preceding the data of an encoded entry.
pub const ENTRY_HEADER_SIZE: usize = 16;

/// Largest payload a single segment block can frame.
pub const MAX_BLOCK_PAYLOAD: usize = u32::MAX as usize;

/// Serializes a run of entries as one packet payload.
pub(crate) fn encode_entries(entries: &[Entry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entries.iter().map(Entry::encoded_len).sum());
    for entry in entries {
        entry.encode_into(&mut buf);
    }
    buf
}

/// One logged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Serial number of the record.
    pub serial: SerialNum,
    /// Record type, opaque to the log.
    pub kind: u32,
    /// Record payload.
    pub data: Vec<u8>,
}

impl Entry {
    /// Creates a new entry.
    pub fn new(serial: SerialNum, kind: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            serial,
            kind,
            data: data.into(),
        }
    }

    /// Returns the encoded size of the entry.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_SIZE + self.data.len()
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.serial.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        // Packet::add bounds the encoded entry by MAX_BLOCK_PAYLOAD.
        buf.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.data);
    }
}

/// An ordered batch of entries.
///
/// Serials inside a packet are strictly increasing. The range of a packet
/// runs from the serial preceding its first entry to its last entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    entries: Vec<Entry>,
    range: SerialNumRange,
    size_bytes: usize,
}

impl Packet {
    /// Creates an empty packet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a packet from entries in ascending serial order.
    ///
    /// # Errors
    ///
    /// Returns an error if the serials are not strictly increasing.
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> TransLogResult<Self> {
        let mut packet = Self::new();
        for entry in entries {
            packet.add(entry)?;
        }
        Ok(packet)
    }

    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the serial is zero, does not exceed the last
    /// serial in the packet, or the encoded entry exceeds
    /// [`MAX_BLOCK_PAYLOAD`] bytes.
    pub fn add(&mut self, entry: Entry) -> TransLogResult<()> {
        if entry.serial == 0 {
            return Err(TransLogError::invalid_packet("serial 0 is reserved"));
        }
        if entry.encoded_len() > MAX_BLOCK_PAYLOAD {
            return Err(TransLogError::invalid_packet(format!(
                "entry {} payload of {} bytes is too large",
                entry.serial,
                entry.data.len()
            )));
        }
        if self.entries.is_empty() {
            self.range = SerialNumRange::new(entry.serial - 1, entry.serial);
        } else if entry.serial <= self.range.to() {
            return Err(TransLogError::invalid_packet(format!(
                "serial {} does not follow {}",
                entry.serial,
                self.range.to()
            )));
        } else {
            self.range.set_to(entry.serial);
        }
        self.size_bytes += entry.encoded_len();
        self.entries.push(entry);
        Ok(())
    }

    /// Appends every entry of `other`, preserving serial order.
    ///
    /// # Errors
    ///
    /// Returns an error if `other` starts at or before the end of `self`.
    pub fn merge(&mut self, other: Packet) -> TransLogResult<()> {
        if other.is_empty() {
            return Ok(());
        }
        if !self.is_empty() && other.range.from() < self.range.to() {
            return Err(TransLogError::invalid_packet(format!(
                "cannot merge {} after {}",
                other.range, self.range
            )));
        }
        if self.is_empty() {
            *self = other;
            return Ok(());
        }
        self.range.set_to(other.range.to());
        self.size_bytes += other.size_bytes;
        self.entries.extend(other.entries);
        Ok(())
    }

    /// Returns the range covered by the packet.
    #[must_use]
    pub fn range(&self) -> SerialNumRange {
        self.range
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the packet holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the encoded size of the packet payload.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Returns the entries in serial order.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns the serial of the first entry.
    #[must_use]
    pub fn first_serial(&self) -> Option<SerialNum> {
        self.entries.first().map(|e| e.serial)
    }

    /// Consumes the packet and returns its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    /// Serializes the packet payload.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        encode_entries(&self.entries)
    }

    /// Splits the entries into consecutive runs whose encoded size stays
    /// within `limit`. An entry larger than `limit` forms a run of its own.
    pub(crate) fn runs_within(&self, limit: usize) -> Vec<&[Entry]> {
        let mut runs = Vec::new();
        let mut start = 0;
        let mut size = 0;
        for (i, entry) in self.entries.iter().enumerate() {
            let len = entry.encoded_len();
            if i > start && size + len > limit {
                runs.push(&self.entries[start..i]);
                start = i;
                size = 0;
            }
            size += len;
        }
        if start < self.entries.len() {
            runs.push(&self.entries[start..]);
        }
        runs
    }

    /// Deserializes a packet payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is truncated or its serials are not
    /// strictly increasing.
    pub fn decode(payload: &[u8]) -> TransLogResult<Self> {
        let mut packet = Self::new();
        let mut cursor = 0usize;

        while cursor < payload.len() {
            if cursor + ENTRY_HEADER_SIZE > payload.len() {
                return Err(TransLogError::invalid_packet("truncated entry header"));
            }
            let header = &payload[cursor..cursor + ENTRY_HEADER_SIZE];
            let serial = u64::from_le_bytes(read_array(&header[0..8]));
            let kind = u32::from_le_bytes(read_array(&header[8..12]));
            let len = u32::from_le_bytes(read_array(&header[12..16])) as usize;
            cursor += ENTRY_HEADER_SIZE;

            if cursor + len > payload.len() {
                return Err(TransLogError::invalid_packet(format!(
                    "entry {serial} data extends past payload"
                )));
            }
            let data = payload[cursor..cursor + len].to_vec();
            cursor += len;

            packet.add(Entry { serial, kind, data })?;
        }

        Ok(packet)
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn packet(serials: &[SerialNum]) -> Packet {
        Packet::from_entries(serials.iter().map(|&s| Entry::new(s, 1, vec![s as u8; 3]))).unwrap()
    }

    #[test]
    fn range_starts_before_first_entry() {
        let p = packet(&[1]);
        assert_eq!(p.range(), SerialNumRange::new(0, 1));

        let p = packet(&[5, 6, 9]);
        assert_eq!(p.range(), SerialNumRange::new(4, 9));
        assert_eq!(p.len(), 3);
        assert_eq!(p.size_bytes(), 3 * (ENTRY_HEADER_SIZE + 3));
    }

    #[test]
    fn add_rejects_non_increasing_serials() {
        let mut p = packet(&[3]);
        assert!(p.add(Entry::new(3, 0, b"x".to_vec())).is_err());
        assert!(p.add(Entry::new(2, 0, b"x".to_vec())).is_err());
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn serial_zero_is_rejected() {
        let mut p = Packet::new();
        assert!(p.add(Entry::new(0, 0, Vec::new())).is_err());
    }

    #[test]
    fn merge_preserves_order() {
        let mut a = packet(&[1, 2]);
        a.merge(packet(&[3, 7])).unwrap();
        assert_eq!(a.range(), SerialNumRange::new(0, 7));
        let serials: Vec<_> = a.entries().iter().map(|e| e.serial).collect();
        assert_eq!(serials, vec![1, 2, 3, 7]);

        let mut empty = Packet::new();
        empty.merge(packet(&[4])).unwrap();
        assert_eq!(empty.range(), SerialNumRange::new(3, 4));
    }

    #[test]
    fn merge_rejects_overlap() {
        let mut a = packet(&[1, 2]);
        assert!(a.merge(packet(&[2, 3])).is_err());
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn runs_respect_size_limit() {
        let p = packet(&[1, 2, 3, 4, 5]);
        let one = p.entries()[0].encoded_len();

        let runs = p.runs_within(2 * one);
        let serials: Vec<Vec<SerialNum>> = runs
            .iter()
            .map(|run| run.iter().map(|e| e.serial).collect())
            .collect();
        assert_eq!(serials, vec![vec![1, 2], vec![3, 4], vec![5]]);

        assert_eq!(p.runs_within(MAX_BLOCK_PAYLOAD).len(), 1);
        assert_eq!(p.runs_within(1).len(), 5);
        assert!(Packet::new().runs_within(1).is_empty());
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let encoded = packet(&[1, 2]).encode();
        assert!(Packet::decode(&encoded[..encoded.len() - 1]).is_err());
        assert!(Packet::decode(&encoded[..10]).is_err());
    }

    proptest! {
        #[test]
        fn encode_decode_preserves_entries(
            gaps in prop::collection::vec(1u64..1000, 1..32),
            data in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut serial = 0;
            let mut p = Packet::new();
            for gap in gaps {
                serial += gap;
                p.add(Entry::new(serial, gap as u32, data.clone())).unwrap();
            }
            let encoded = p.encode();
            prop_assert_eq!(encoded.len(), p.size_bytes());
            prop_assert_eq!(Packet::decode(&encoded).unwrap(), p);
        }
    }
}

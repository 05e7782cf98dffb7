//! In-memory storage backend for tests and crash simulation.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Contents {
    bytes: Vec<u8>,
    synced: usize,
}

/// An in-memory storage backend.
///
/// Besides the bytes it holds, the backend remembers how many of them were
/// covered by the last `sync`, so [`InMemoryBackend::after_crash`] can model
/// a process that died before its last writes became durable.
///
/// # Example
///
/// ```rust
/// use translog_storage::{StorageBackend, InMemoryBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.append(b"durable").unwrap();
/// backend.sync().unwrap();
/// backend.append(b"lost").unwrap();
///
/// let recovered = backend.after_crash();
/// assert_eq!(recovered.size().unwrap(), 7);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    contents: Mutex<Contents>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding `bytes`, all of them considered synced.
    #[must_use]
    pub fn with_data(bytes: Vec<u8>) -> Self {
        let synced = bytes.len();
        Self {
            contents: Mutex::new(Contents { bytes, synced }),
        }
    }

    /// Returns a copy of all bytes in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.contents.lock().bytes.clone()
    }

    /// Returns how many bytes the last `sync` made durable.
    #[must_use]
    pub fn synced_len(&self) -> u64 {
        self.contents.lock().synced as u64
    }

    /// Returns a new backend holding only the synced prefix.
    #[must_use]
    pub fn after_crash(&self) -> Self {
        let contents = self.contents.lock();
        Self::with_data(contents.bytes[..contents.synced].to_vec())
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let contents = self.contents.lock();
        let size = contents.bytes.len() as u64;
        if offset.saturating_add(len as u64) > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        let start = offset as usize;
        Ok(contents.bytes[start..start + len].to_vec())
    }

    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        let mut contents = self.contents.lock();
        let offset = contents.bytes.len() as u64;
        contents.bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.contents.lock().bytes.len() as u64)
    }

    fn sync(&self) -> StorageResult<()> {
        let mut contents = self.contents.lock();
        contents.synced = contents.bytes.len();
        Ok(())
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        let mut contents = self.contents.lock();
        let size = contents.bytes.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        contents.bytes.truncate(new_size as usize);
        contents.synced = contents.synced.min(contents.bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn starts_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert_eq!(backend.synced_len(), 0);
        assert!(backend.data().is_empty());
    }

    #[test]
    fn read_must_stay_within_contents() {
        let backend = InMemoryBackend::with_data(b"block".to_vec());
        assert_eq!(backend.read_at(1, 4).unwrap(), b"lock");
        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { size: 5, .. })
        ));
        assert!(backend.read_at(u64::MAX, 1).is_err());
    }

    #[test]
    fn crash_keeps_synced_prefix() {
        let backend = InMemoryBackend::new();
        backend.append(b"header").unwrap();
        backend.sync().unwrap();
        backend.append(b"unsynced").unwrap();

        let recovered = backend.after_crash();
        assert_eq!(recovered.data(), b"header");
        assert_eq!(recovered.synced_len(), 6);
    }

    #[test]
    fn truncate_lowers_synced_mark() {
        let backend = InMemoryBackend::with_data(b"preloaded".to_vec());
        backend.truncate(3).unwrap();
        assert_eq!(backend.data(), b"pre");
        assert_eq!(backend.synced_len(), 3);
        assert!(matches!(
            backend.truncate(4),
            Err(StorageError::TruncateBeyondEnd { requested: 4, size: 3 })
        ));
    }

    proptest! {
        #[test]
        fn appended_chunks_read_back(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..16)) {
            let backend = InMemoryBackend::new();
            let offsets: Vec<_> = chunks.iter().map(|chunk| backend.append(chunk).unwrap()).collect();
            for (chunk, offset) in chunks.iter().zip(offsets) {
                prop_assert_eq!(&backend.read_at(offset, chunk.len()).unwrap(), chunk);
            }
        }
    }
}

//! File-based storage backend for segment files.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// A file-based storage backend.
///
/// Appends and truncation are serialized by a writer lock. Reads use
/// positioned I/O on a separate handle where the platform supports it, so
/// visiting sessions never wait for the writer.
///
/// # Durability
///
/// - `flush()` pushes buffered bytes to the OS
/// - `sync()` calls `File::sync_data()` without taking the writer lock, so
///   a sync in progress does not stall appends
///
/// # Example
///
/// ```no_run
/// use translog_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("docs-0000000000000001")).unwrap();
/// backend.append(b"block").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    writer: Mutex<File>,
    reader: File,
    len: AtomicU64,
    writable: bool,
}

impl FileBackend {
    /// Opens the file at `path` for appending, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        Self::with_file(path, file, true)
    }

    /// Opens an existing file without write access.
    ///
    /// Appends and truncation are refused; used by tools that must never
    /// modify a log they inspect.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be opened.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Self::with_file(path, file, false)
    }

    fn with_file(path: &Path, file: File, writable: bool) -> StorageResult<Self> {
        let len = file.metadata()?.len();
        let reader = file.try_clone()?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(file),
            reader,
            len: AtomicU64::new(len),
            writable,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(StorageError::ReadOnly {
                path: self.path.display().to_string(),
            })
        }
    }

    #[cfg(unix)]
    fn read_exact_at(&self, buffer: &mut [u8], offset: u64) -> std::io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.reader.read_exact_at(buffer, offset)
    }

    #[cfg(not(unix))]
    fn read_exact_at(&self, buffer: &mut [u8], offset: u64) -> std::io::Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        // Shares the cursor with appends, so hold the writer lock.
        let _writer = self.writer.lock();
        let mut reader = &self.reader;
        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(buffer)
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = self.len.load(Ordering::Acquire);
        if offset.saturating_add(len as u64) > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        let mut buffer = vec![0u8; len];
        if len > 0 {
            self.read_exact_at(&mut buffer, offset)?;
        }
        Ok(buffer)
    }

    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        self.check_writable()?;
        let mut writer = self.writer.lock();
        let offset = self.len.load(Ordering::Acquire);
        if !data.is_empty() {
            writer.write_all(data)?;
            self.len.store(offset + data.len() as u64, Ordering::Release);
        }
        Ok(offset)
    }

    fn flush(&self) -> StorageResult<()> {
        if self.writable {
            self.writer.lock().flush()?;
        }
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.len.load(Ordering::Acquire))
    }

    fn sync(&self) -> StorageResult<()> {
        self.reader.sync_data()?;
        Ok(())
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        self.check_writable()?;
        let writer = self.writer.lock();
        let size = self.len.load(Ordering::Acquire);
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }

        writer.set_len(new_size)?;
        writer.sync_all()?;
        self.len.store(new_size, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.is_file());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn appends_return_offsets() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("seg")).unwrap();

        assert_eq!(backend.append(b"first").unwrap(), 0);
        assert_eq!(backend.append(b"").unwrap(), 5);
        assert_eq!(backend.append(b"second").unwrap(), 5);
        assert_eq!(backend.read_at(0, 11).unwrap(), b"firstsecond");
        assert_eq!(backend.read_at(5, 6).unwrap(), b"second");
        assert!(backend.read_at(11, 0).unwrap().is_empty());
    }

    #[test]
    fn read_beyond_size_is_rejected() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("seg")).unwrap();
        backend.append(b"block").unwrap();

        assert!(matches!(
            backend.read_at(3, 5),
            Err(StorageError::ReadPastEnd { offset: 3, len: 5, size: 5 })
        ));
    }

    #[test]
    fn reopen_appends_after_existing_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg");
        {
            let backend = FileBackend::open(&path).unwrap();
            backend.append(b"header").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.append(b"block").unwrap(), 6);
        assert_eq!(backend.read_at(0, 11).unwrap(), b"headerblock");
    }

    #[test]
    fn read_only_refuses_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg");
        FileBackend::open(&path).unwrap().append(b"x").unwrap();

        let backend = FileBackend::open_read_only(&path).unwrap();
        assert!(matches!(backend.append(b"y"), Err(StorageError::ReadOnly { .. })));
        assert!(matches!(backend.truncate(0), Err(StorageError::ReadOnly { .. })));
        assert_eq!(backend.read_at(0, 1).unwrap(), b"x");
        backend.flush().unwrap();
    }

    #[test]
    fn truncate_cuts_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg");
        let backend = FileBackend::open(&path).unwrap();
        backend.append(b"completetorn").unwrap();

        backend.truncate(8).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);
        assert_eq!(backend.append(b"!").unwrap(), 8);
        assert_eq!(backend.read_at(0, 9).unwrap(), b"complete!");
        assert!(matches!(
            backend.truncate(100),
            Err(StorageError::TruncateBeyondEnd { requested: 100, size: 9 })
        ));
    }

    #[test]
    fn missing_file_cannot_be_inspected() {
        let dir = tempdir().unwrap();
        assert!(FileBackend::open_read_only(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn concurrent_reads_while_appending() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("seg")).unwrap();
        backend.append(&[7u8; 64]).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..100 {
                    backend.append(&[1u8; 16]).unwrap();
                }
            });
            for _ in 0..100 {
                assert_eq!(backend.read_at(0, 64).unwrap(), vec![7u8; 64]);
            }
        });
        assert_eq!(backend.size().unwrap(), 64 + 1600);
    }
}

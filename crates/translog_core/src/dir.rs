//! Domain directory management.
//!
//! ```text
//! <base_dir>/
//! └─ <domain>/
//!    ├─ LOCK                        # Advisory lock for the single owner
//!    ├─ <domain>-0000000000000001   # Segment files
//!    └─ <domain>-0000000000001025
//! ```
//!
//! The LOCK file ensures only one process owns a domain at a time. Read-only
//! tools never take it.

use crate::error::{TransLogError, TransLogResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";

/// The directory of one domain, held under an exclusive lock.
#[derive(Debug)]
pub struct DomainDir {
    path: PathBuf,
    _lock_file: File,
}

impl DomainDir {
    /// Creates `base_dir` and `base_dir/name` as needed and locks the latter.
    ///
    /// # Errors
    ///
    /// Returns `ConstructionFailure` if a directory cannot be created and
    /// `DomainLocked` if another owner holds the lock.
    pub fn open(base_dir: &Path, name: &str) -> TransLogResult<Self> {
        ensure_dir("base directory", base_dir)?;
        let path = base_dir.join(name);
        ensure_dir("domain directory", &path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(TransLogError::DomainLocked {
                path: path.display().to_string(),
            });
        }

        Ok(Self {
            path,
            _lock_file: lock_file,
        })
    }

    /// Returns the domain directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Makes file creations and removals in the directory durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be synced.
    pub fn sync(&self) -> TransLogResult<()> {
        sync_dir(&self.path)
    }
}

fn ensure_dir(what: &'static str, path: &Path) -> TransLogResult<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|source| TransLogError::ConstructionFailure {
        what,
        path: path.display().to_string(),
        source,
    })
}

/// Fsyncs a directory so that entry changes survive a crash.
#[cfg(unix)]
pub fn sync_dir(path: &Path) -> TransLogResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

/// Directory fsync is not available here; the filesystem journal covers
/// metadata durability.
#[cfg(not(unix))]
pub fn sync_dir(_path: &Path) -> TransLogResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directories() {
        let temp = tempdir().unwrap();
        let base = temp.path().join("tls");

        let dir = DomainDir::open(&base, "docs").unwrap();
        assert!(base.join("docs").is_dir());
        assert!(base.join("docs").join("LOCK").is_file());
        assert_eq!(dir.path(), base.join("docs"));
        dir.sync().unwrap();
    }

    #[test]
    fn lock_prevents_second_owner() {
        let temp = tempdir().unwrap();
        let _first = DomainDir::open(temp.path(), "docs").unwrap();

        let second = DomainDir::open(temp.path(), "docs");
        assert!(matches!(second, Err(TransLogError::DomainLocked { .. })));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        drop(DomainDir::open(temp.path(), "docs").unwrap());
        DomainDir::open(temp.path(), "docs").unwrap();
    }

    #[test]
    fn file_in_place_of_directory_fails_construction() {
        let temp = tempdir().unwrap();
        let base = temp.path().join("occupied");
        fs::write(&base, b"not a directory").unwrap();

        let result = DomainDir::open(&base, "docs");
        assert!(matches!(
            result,
            Err(TransLogError::ConstructionFailure { what: "base directory", .. })
        ));
    }
}

//! Test fixtures and domain helpers.
//!
//! Provides a temporary domain with its own worker pools, plus helpers for
//! building packets and common test scenarios.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use translog_core::{
    Domain, DomainConfig, Entry, Executor, Packet, SerialNum, ThreadPool, VersionHeaderContext,
};

/// Name given to fixture domains.
pub const TEST_DOMAIN: &str = "test";

/// Record type used by fixture entries.
pub const TEST_KIND: u32 = 1;

/// A test domain with automatic cleanup.
///
/// Fields drop in declaration order, so the domain releases its lock and
/// closes its segments before the directory is removed.
pub struct TestDomain {
    /// The domain instance.
    pub domain: Domain,
    commit_pool: Arc<ThreadPool>,
    session_pool: Arc<ThreadPool>,
    temp_dir: TempDir,
}

impl TestDomain {
    /// Opens a fresh domain with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DomainConfig::default())
    }

    /// Opens a fresh domain with `config`.
    pub fn with_config(config: DomainConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let commit_pool = Arc::new(ThreadPool::new("commit", 2).expect("Failed to start pool"));
        let session_pool = Arc::new(ThreadPool::new("session", 2).expect("Failed to start pool"));
        let domain = open_domain(temp_dir.path(), &commit_pool, &session_pool, config)
            .expect("Failed to open domain");
        Self {
            domain,
            commit_pool,
            session_pool,
            temp_dir,
        }
    }

    /// Closes the domain and opens it again from the same directory.
    pub fn reopen(self) -> Self {
        let config = self.domain.config();
        self.reopen_with(config)
    }

    /// Closes the domain and opens it again with `config`.
    pub fn reopen_with(self, config: DomainConfig) -> Self {
        let Self {
            domain,
            commit_pool,
            session_pool,
            temp_dir,
        } = self;
        drop(domain);
        let domain = open_domain(temp_dir.path(), &commit_pool, &session_pool, config)
            .expect("Failed to reopen domain");
        Self {
            domain,
            commit_pool,
            session_pool,
            temp_dir,
        }
    }

    /// Commits `serials` as one packet, flushes and waits until it is
    /// written.
    pub fn commit_serials(&self, serials: impl IntoIterator<Item = SerialNum>) {
        let handle = self
            .domain
            .commit(packet_of(serials))
            .expect("Failed to commit");
        self.domain.flush().expect("Failed to flush");
        handle.wait().expect("Commit failed");
    }

    /// Commits `first..=last` in packets of `batch` entries, flushes and
    /// waits until all of them are written.
    pub fn fill(&self, first: SerialNum, last: SerialNum, batch: usize) {
        let serials: Vec<_> = (first..=last).collect();
        let mut handles = Vec::new();
        for serials in serials.chunks(batch.max(1)) {
            handles.push(
                self.domain
                    .commit(packet_of(serials.iter().copied()))
                    .expect("Failed to commit"),
            );
        }
        self.domain.flush().expect("Failed to flush");
        for handle in handles {
            handle.wait().expect("Commit failed");
        }
    }

    /// Waits until every queued session task has run.
    pub fn wait_for_sessions(&self) {
        self.session_pool.sync();
    }

    /// Waits until every queued sync task has run.
    pub fn wait_for_commits(&self) {
        self.commit_pool.sync();
    }

    /// Returns the base directory holding the domain directory.
    pub fn base_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns the domain directory.
    pub fn domain_dir(&self) -> PathBuf {
        self.temp_dir.path().join(TEST_DOMAIN)
    }

    /// Returns the path of the segment starting at `start`.
    pub fn segment_path(&self, start: SerialNum) -> PathBuf {
        self.domain_dir()
            .join(translog_core::segment_file_name(TEST_DOMAIN, start))
    }
}

impl Default for TestDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDomain {
    type Target = Domain;

    fn deref(&self) -> &Self::Target {
        &self.domain
    }
}

fn open_domain(
    base: &Path,
    commit_pool: &Arc<ThreadPool>,
    session_pool: &Arc<ThreadPool>,
    config: DomainConfig,
) -> translog_core::TransLogResult<Domain> {
    Domain::open(
        TEST_DOMAIN,
        base,
        Arc::clone(commit_pool) as Arc<dyn Executor>,
        Arc::clone(session_pool) as Arc<dyn Executor>,
        config,
        Arc::new(VersionHeaderContext),
    )
}

/// Builds the payload stored for `serial`.
pub fn payload_for(serial: SerialNum) -> Vec<u8> {
    format!("entry {serial}").into_bytes()
}

/// Builds one entry with the fixture payload.
pub fn entry_for(serial: SerialNum) -> Entry {
    Entry::new(serial, TEST_KIND, payload_for(serial))
}

/// Builds a packet holding `serials`, which must ascend.
pub fn packet_of(serials: impl IntoIterator<Item = SerialNum>) -> Packet {
    Packet::from_entries(serials.into_iter().map(entry_for)).expect("Serials must ascend")
}

/// Runs a test with a temporary domain.
///
/// # Example
///
/// ```rust,ignore
/// use translog_testkit::with_temp_domain;
///
/// #[test]
/// fn my_test() {
///     with_temp_domain(|domain| {
///         domain.commit_serials([1, 2, 3]);
///         assert_eq!(domain.end(), 3);
///     });
/// }
/// ```
pub fn with_temp_domain<F, R>(f: F) -> R
where
    F: FnOnce(&TestDomain) -> R,
{
    let domain = TestDomain::new();
    f(&domain)
}

/// Runs a test with a temporary domain opened with `config`.
pub fn with_configured_domain<F, R>(config: DomainConfig, f: F) -> R
where
    F: FnOnce(&TestDomain) -> R,
{
    let domain = TestDomain::with_config(config);
    f(&domain)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Opens a domain holding serials `1..=entry_count`.
    pub fn populated_domain(entry_count: u64) -> TestDomain {
        let domain = TestDomain::new();
        if entry_count > 0 {
            domain.fill(1, entry_count, 10);
        }
        domain
    }

    /// Opens a domain whose log spans several segments.
    ///
    /// Every packet holds `batch` entries and the segment limit is small
    /// enough that each packet lands in a segment of its own.
    pub fn rotated_domain(packets: u64, batch: u64) -> TestDomain {
        let config = DomainConfig::default()
            .chunk_size_limit(0)
            .segment_size_limit(1);
        let domain = TestDomain::with_config(config);
        for p in 0..packets {
            let first = p * batch + 1;
            domain.commit_serials(first..first + batch);
        }
        domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_domain_is_empty() {
        with_temp_domain(|domain| {
            assert_eq!(domain.begin(), 0);
            assert_eq!(domain.end(), 0);
            assert!(domain.domain_dir().is_dir());
            assert!(domain.segment_path(1).is_file());
        });
    }

    #[test]
    fn fill_commits_every_serial() {
        let domain = scenarios::populated_domain(25);
        assert_eq!(domain.end(), 25);
        assert_eq!(domain.size(), 25);
    }

    #[test]
    fn reopen_keeps_the_log() {
        let domain = scenarios::populated_domain(5);
        domain.trigger_sync_now().unwrap();
        domain.wait_for_sync();

        let domain = domain.reopen();
        assert_eq!(domain.end(), 5);
        assert_eq!(domain.synced(), 5);
    }

    #[test]
    fn rotated_domain_has_one_segment_per_packet() {
        let domain = scenarios::rotated_domain(3, 2);
        assert_eq!(domain.domain_info().segments.len(), 3);
        assert!(domain.segment_path(5).is_file());
    }

    #[test]
    fn packet_of_builds_ascending_packet() {
        let packet = packet_of([4, 7]);
        assert_eq!(packet.len(), 2);
        assert_eq!(packet.entries()[1].data, payload_for(7));
    }
}

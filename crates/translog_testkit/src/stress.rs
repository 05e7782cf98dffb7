//! Stress tests for translog domains.
//!
//! These helpers drive a domain under heavy commit load and concurrent
//! visits.

use crate::destination::RecordingDestination;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use translog_core::{CommitHandle, Domain, Entry, Packet, SerialNum};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of packets to commit.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Size of each entry payload in bytes.
    pub entry_size: usize,
    /// Entries per packet.
    pub batch_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            entry_size: 256,
            batch_size: 4,
        }
    }
}

fn batch(first: SerialNum, config: &StressConfig) -> Packet {
    let data = vec![0xABu8; config.entry_size];
    let entries =
        (0..config.batch_size as u64).map(|i| Entry::new(first + i, 1, data.clone()));
    Packet::from_entries(entries).unwrap_or_default()
}

fn settle(
    domain: &Domain,
    handles: Vec<CommitHandle>,
    successful: &AtomicUsize,
    failed: &AtomicUsize,
) {
    if domain.flush().is_err() {
        failed.fetch_add(handles.len(), Ordering::Relaxed);
        return;
    }
    for handle in handles {
        match handle.wait() {
            Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
            Err(_) => failed.fetch_add(1, Ordering::Relaxed),
        };
    }
}

/// Run a sequential commit stress test starting after the domain's end.
pub fn stress_sequential_commits(domain: &Domain, config: &StressConfig) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let mut next = domain.end() + 1;
    let mut handles = Vec::with_capacity(config.operations);

    let start = Instant::now();
    for _ in 0..config.operations {
        match domain.commit(batch(next, config)) {
            Ok(handle) => handles.push(handle),
            Err(_) => {
                failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        next += config.batch_size as u64;
    }
    settle(domain, handles, &successful, &failed);

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run a concurrent commit stress test.
///
/// Threads draw serials from a shared counter and commit while holding it,
/// so packets reach the domain in serial order.
pub fn stress_concurrent_commits(domain: &Domain, config: &StressConfig) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let next = Mutex::new(domain.end() + 1);
    let ops_per_thread = config.operations / config.threads.max(1);

    let start = Instant::now();
    thread::scope(|scope| {
        for _ in 0..config.threads {
            scope.spawn(|| {
                let mut handles = Vec::with_capacity(ops_per_thread);
                for _ in 0..ops_per_thread {
                    let mut serial = next.lock();
                    match domain.commit(batch(*serial, config)) {
                        Ok(handle) => handles.push(handle),
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    *serial += config.batch_size as u64;
                }
                settle(domain, handles, &successful, &failed);
            });
        }
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run bounded visits over the whole log from several threads.
///
/// A visit counts as successful when it finishes and delivered every
/// serial the domain held when it started.
pub fn stress_concurrent_visits(domain: &Domain, config: &StressConfig) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let expected = domain.size() as usize;
    let visits_per_thread = config.operations / config.threads.max(1);

    let start = Instant::now();
    thread::scope(|scope| {
        for _ in 0..config.threads {
            scope.spawn(|| {
                for _ in 0..visits_per_thread {
                    let recorder = RecordingDestination::new();
                    let id = domain.visit(domain.begin(), domain.end(), recorder.boxed());
                    let delivered = domain.start_session(id)
                        && recorder.wait_done(Duration::from_secs(10))
                        && recorder.serials().len() == expected;
                    domain.close_session(id);
                    if delivered {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{scenarios, TestDomain};
    use translog_core::DomainConfig;

    #[test]
    fn test_sequential_commits() {
        let domain = TestDomain::new();
        let config = StressConfig {
            operations: 500,
            entry_size: 64,
            ..Default::default()
        };

        let result = stress_sequential_commits(&domain, &config);
        result.print_summary("Sequential Commits");
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 500);
        assert_eq!(domain.size(), 2_000);
        assert_eq!(domain.end(), 2_000);
    }

    #[test]
    fn test_concurrent_commits() {
        let domain = TestDomain::new();
        let config = StressConfig {
            operations: 400,
            threads: 4,
            entry_size: 32,
            batch_size: 2,
        };

        let result = stress_concurrent_commits(&domain, &config);
        result.print_summary("Concurrent Commits");
        assert_eq!(result.failed_ops, 0);
        assert_eq!(domain.end(), 800);
        assert_eq!(domain.size(), 800);
    }

    #[test]
    fn test_concurrent_commits_across_rotations() {
        let config = DomainConfig::default()
            .chunk_size_limit(512)
            .segment_size_limit(8 * 1024);
        let domain = TestDomain::with_config(config);
        let stress = StressConfig {
            operations: 200,
            threads: 2,
            entry_size: 100,
            batch_size: 2,
        };

        let result = stress_concurrent_commits(&domain, &stress);
        assert_eq!(result.failed_ops, 0);
        assert!(domain.domain_info().segments.len() > 1);
        assert_eq!(domain.size(), 400);
    }

    #[test]
    fn test_concurrent_visits() {
        let domain = scenarios::populated_domain(200);
        let config = StressConfig {
            operations: 8,
            threads: 2,
            ..Default::default()
        };

        let result = stress_concurrent_visits(&domain, &config);
        result.print_summary("Concurrent Visits");
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 8);
    }
}

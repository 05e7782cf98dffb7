//! # Translog Core
//!
//! Transaction log engine for a document store.
//!
//! This crate provides:
//! - Serial numbers, entries and packets
//! - Append-only segment files with per-block checksums
//! - Batched asynchronous commit through a single writer per domain
//! - Segment rotation under size pressure and pruning with `erase`
//! - Visiting sessions that replay a serial range to a destination
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use translog_core::{Domain, DomainConfig, Entry, Executor, Packet, ThreadPool, VersionHeaderContext};
//!
//! let commit_pool: Arc<dyn Executor> = Arc::new(ThreadPool::new("commit", 2)?);
//! let session_pool: Arc<dyn Executor> = Arc::new(ThreadPool::new("session", 2)?);
//! let domain = Domain::open("docs", base_dir, commit_pool, session_pool,
//!     DomainConfig::default(), Arc::new(VersionHeaderContext))?;
//!
//! let packet = Packet::from_entries([Entry::new(1, 0, b"put doc:1".to_vec())])?;
//! let handle = domain.commit(packet)?;
//! domain.flush()?;
//! handle.wait()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod chunk;
mod config;
mod dir;
mod domain;
mod error;
mod executor;
mod packet;
pub mod segment;
mod session;
mod types;

pub use chunk::{Chunk, DoneCallback};
pub use config::{DomainConfig, Encoding};
pub use dir::{sync_dir, DomainDir};
pub use domain::{CommitHandle, Domain, DomainInfo, SegmentInfo};
pub use error::{TransLogError, TransLogResult};
pub use executor::{Executor, RejectedTask, Task, ThreadPool};
pub use packet::{Entry, Packet, ENTRY_HEADER_SIZE, MAX_BLOCK_PAYLOAD};
pub use segment::{
    compute_crc32, parse_segment_file_name, scan_dir, segment_file_name, FileHeaderContext,
    Segment, SegmentHeader, SegmentMode, VersionHeaderContext,
};
pub use session::{Destination, Session, SessionId, SessionState};
pub use types::{SerialNum, SerialNumRange};

/// Version of the crate, recorded in segment headers.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

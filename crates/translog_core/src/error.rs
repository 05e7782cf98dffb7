//! Error types for translog core.

use crate::types::SerialNum;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type TransLogResult<T> = Result<T, TransLogError>;

/// Errors that can occur in translog core operations.
#[derive(Debug, Error)]
pub enum TransLogError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] translog_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The domain directory could not be prepared.
    #[error("failed creating {what} {path}: {source}")]
    ConstructionFailure {
        /// Which directory failed.
        what: &'static str,
        /// The directory path.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// A commit did not advance the log.
    #[error("incoming serial number ({from}) must be bigger than the last one ({last})")]
    ProtocolViolation {
        /// Exclusive lower bound of the rejected packet.
        from: SerialNum,
        /// Last serial accepted by the domain.
        last: SerialNum,
    },

    /// A packet was malformed.
    #[error("invalid packet: {message}")]
    InvalidPacket {
        /// Description of the problem.
        message: String,
    },

    /// Segment is corrupted or invalid.
    #[error("segment corruption in {file}: {message}")]
    SegmentCorruption {
        /// Segment file name.
        file: String,
        /// Description of the corruption.
        message: String,
    },

    /// Attempted to append to a closed segment.
    #[error("segment {file} is closed")]
    SegmentClosed {
        /// Segment file name.
        file: String,
    },

    /// Another process holds the domain directory.
    #[error("domain locked: another process has exclusive access to {path}")]
    DomainLocked {
        /// The domain directory.
        path: String,
    },

    /// The domain hit an unrecoverable write or sync failure.
    #[error("domain {domain} is unusable after a failed write: {message}")]
    DomainFailed {
        /// Domain name.
        domain: String,
        /// First failure observed.
        message: String,
    },

    /// An executor refused a task because it is shutting down.
    #[error("executor {executor} rejected task")]
    Rejected {
        /// Executor name.
        executor: String,
    },

    /// A file name does not follow the segment naming scheme.
    #[error("invalid segment file name: {name}")]
    InvalidFileName {
        /// The rejected name.
        name: String,
    },

    /// The completion of a commit was dropped before it resolved.
    #[error("commit was abandoned before it became durable")]
    CommitAbandoned,
}

impl TransLogError {
    /// Creates an invalid packet error.
    pub fn invalid_packet(message: impl Into<String>) -> Self {
        Self::InvalidPacket {
            message: message.into(),
        }
    }

    /// Creates a segment corruption error.
    pub fn segment_corruption(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Creates a domain failure error.
    pub fn domain_failed(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DomainFailed {
            domain: domain.into(),
            message: message.into(),
        }
    }
}

//! # translog storage
//!
//! Storage backend trait and implementations for the translog engine.
//!
//! Backends are **opaque byte stores** - they do not interpret the data
//! they store. Segment framing, checksums and serial numbers all live in
//! `translog_core`.
//!
//! ## Design Principles
//!
//! - Backends are simple byte stores (read, append, flush, sync, truncate)
//! - All operations take `&self`; backends synchronize internally so a
//!   segment can be appended by the writer while it is synced from a
//!   bookkeeping thread and read by visiting sessions
//! - Must be `Send + Sync`
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral logs
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use translog_storage::{StorageBackend, InMemoryBackend};
//!
//! let backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;

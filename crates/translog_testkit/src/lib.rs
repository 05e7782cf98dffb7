//! # Translog Testkit
//!
//! Test utilities for translog domains.
//!
//! This crate provides:
//! - Temporary domain fixtures with their own worker pools
//! - A recording destination for visit tests
//! - Property-based test generators using proptest
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use translog_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_domain() {
//!     with_temp_domain(|domain| {
//!         domain.commit_serials([1, 2, 3]);
//!         assert_eq!(domain.end(), 3);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod destination;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::destination::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use destination::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;

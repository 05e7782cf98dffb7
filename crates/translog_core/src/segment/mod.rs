//! On-disk segments of a domain.
//!
//! A segment is one append-only file holding a contiguous range of
//! serial numbers. Only the tail segment of a domain is open for appends;
//! every other segment is closed and immutable.
//!
//! ## Naming
//!
//! ```text
//! {domain}-{start serial, 16 digit zero padded decimal}
//! ```
//!
//! ## Segment File Format
//!
//! ```text
//! | magic "TLOGSEG1" (8) | header_len (4) | header (N) | block* |
//! block = | encoding (1) | payload_len (4) | payload (N) | checksum (4) |
//! ```
//!
//! The payload of a block is one encoded [`crate::Packet`].

mod block;
mod header;
mod store;

pub use block::compute_crc32;
pub use header::{FileHeaderContext, SegmentHeader, VersionHeaderContext};
pub use store::{Segment, SegmentMode};

use crate::error::{TransLogError, TransLogResult};
use crate::types::SerialNum;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Builds the file name of the segment of `domain` starting at `start`.
#[must_use]
pub fn segment_file_name(domain: &str, start: SerialNum) -> String {
    format!("{domain}-{start:016}")
}

/// Parses the start serial out of a segment file name.
///
/// The name is re-derived from the parsed number and must match exactly,
/// so `name-12`, `name-+000000000000012` and names of other domains are
/// all rejected.
///
/// # Errors
///
/// Returns `InvalidFileName` if `name` is not a segment of `domain`.
pub fn parse_segment_file_name(domain: &str, name: &str) -> TransLogResult<SerialNum> {
    let invalid = || TransLogError::InvalidFileName {
        name: name.to_string(),
    };

    let digits = name
        .strip_prefix(domain)
        .and_then(|rest| rest.strip_prefix('-'))
        .ok_or_else(invalid)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let start: SerialNum = digits.parse().map_err(|_| invalid())?;
    if segment_file_name(domain, start) != name {
        return Err(invalid());
    }
    Ok(start)
}

/// Lists the start serials of all segments of `domain` in `dir`, ascending.
///
/// Entries that are not segment files of this domain are skipped.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn scan_dir(dir: &Path, domain: &str) -> TransLogResult<Vec<SerialNum>> {
    let mut starts = Vec::new();

    for dir_entry in fs::read_dir(dir)? {
        let dir_entry = dir_entry?;
        let file_name = dir_entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        match parse_segment_file_name(domain, name) {
            Ok(start) => starts.push(start),
            Err(_) => debug!(file = name, "ignoring non-segment file"),
        }
    }

    starts.sort_unstable();
    Ok(starts)
}

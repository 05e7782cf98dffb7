//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod verify;

use std::path::{Path, PathBuf};
use translog_core::{
    scan_dir, Encoding, Segment, SegmentHeader, SegmentMode, SerialNum, TransLogResult,
};

/// Returns the directory of `domain` under `base`, if it exists.
pub fn domain_dir(base: &Path, domain: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let dir = base.join(domain);
    if !dir.is_dir() {
        return Err(format!("No domain {domain} found at {}", base.display()).into());
    }
    Ok(dir)
}

/// Opens one segment read-only.
pub fn open_segment(dir: &Path, domain: &str, start: SerialNum) -> TransLogResult<Segment> {
    Segment::open(
        domain,
        dir,
        start,
        Encoding::Crc32,
        0,
        &NoTags,
        SegmentMode::Inspect,
    )
}

/// Lists the segment starts of a domain in serial order.
pub fn segment_starts(dir: &Path, domain: &str) -> TransLogResult<Vec<SerialNum>> {
    scan_dir(dir, domain)
}

/// Header context for read-only opens, which never create a header.
struct NoTags;

impl translog_core::FileHeaderContext for NoTags {
    fn add_tags(&self, _header: &mut SegmentHeader, _file_name: &str) {}
}

/// Formats a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

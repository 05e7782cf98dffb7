//! Inspect command implementation.

use super::{domain_dir, format_size, open_segment, segment_starts};
use serde::Serialize;
use std::path::Path;

/// Domain inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Domain name.
    pub domain: String,
    /// Domain directory.
    pub path: String,
    /// Exclusive lower bound of the retained serials.
    pub begin: u64,
    /// Last serial held.
    pub end: u64,
    /// Number of entries.
    pub entry_count: u64,
    /// Total size of the segment files in bytes.
    pub total_size: u64,
    /// Per segment details.
    pub segments: Vec<SegmentStats>,
}

/// Statistics for a single segment.
#[derive(Debug, Serialize)]
pub struct SegmentStats {
    /// File name.
    pub file_name: String,
    /// Exclusive lower bound of the segment range.
    pub from: u64,
    /// Last serial held.
    pub to: u64,
    /// Number of entries.
    pub entry_count: u64,
    /// File size in bytes.
    pub byte_size: u64,
    /// Block checksum scheme.
    pub encoding: String,
}

/// Runs the inspect command.
pub fn run(base: &Path, domain: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(base, domain)?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }
    Ok(())
}

/// Collects the statistics of a domain.
pub fn inspect(base: &Path, domain: &str) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let dir = domain_dir(base, domain)?;
    let mut segments = Vec::new();
    for start in segment_starts(&dir, domain)? {
        let segment = open_segment(&dir, domain, start)?;
        let range = segment.range();
        segments.push(SegmentStats {
            file_name: segment.file_name().to_string(),
            from: range.from(),
            to: range.to(),
            entry_count: segment.size(),
            byte_size: segment.byte_size(),
            encoding: segment.encoding().to_string(),
        });
    }

    Ok(InspectResult {
        domain: domain.to_string(),
        path: dir.display().to_string(),
        begin: segments.first().map_or(0, |s| s.from),
        end: segments.last().map_or(0, |s| s.to),
        entry_count: segments.iter().map(|s| s.entry_count).sum(),
        total_size: segments.iter().map(|s| s.byte_size).sum(),
        segments,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Translog Domain Inspection");
    println!("==========================");
    println!();
    println!("Domain: {}", result.domain);
    println!("Path:   {}", result.path);
    println!();
    println!("Serials:");
    println!("  Range:   ({}, {}]", result.begin, result.end);
    println!("  Entries: {}", result.entry_count);
    println!("  Size:    {} bytes", format_size(result.total_size));
    println!();
    println!("Segments:");
    for segment in &result.segments {
        println!(
            "  {}  ({}, {}]  {} entries, {} bytes, {}",
            segment.file_name,
            segment.from,
            segment.to,
            segment.entry_count,
            format_size(segment.byte_size),
            segment.encoding
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::write_domain;

    #[test]
    fn inspect_reports_every_segment() {
        let temp = tempfile::tempdir().unwrap();
        write_domain(temp.path(), &[&[&[1, 2], &[3]], &[&[5, 6, 7]]]);

        let result = inspect(temp.path(), "docs").unwrap();
        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.begin, 0);
        assert_eq!(result.end, 7);
        assert_eq!(result.entry_count, 6);
        assert_eq!(result.segments[1].file_name, "docs-0000000000000005");
        assert_eq!((result.segments[1].from, result.segments[1].to), (4, 7));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["segments"][0]["entry_count"], 3);
    }
}

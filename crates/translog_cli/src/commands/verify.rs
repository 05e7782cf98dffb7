//! Verify command implementation.

use super::{domain_dir, open_segment, segment_starts};
use std::path::Path;
use translog_core::SerialNum;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of segments checked.
    pub segments_checked: usize,
    /// Number of entries in valid segments.
    pub entries: u64,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(base: &Path, domain: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying domain {domain} at {}", base.display());
    println!();

    let result = verify(base, domain)?;
    println!("Segments checked: {}", result.segments_checked);
    println!("Entries:          {}", result.entries);
    for error in &result.errors {
        println!("  - {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Domain verification passed");
        Ok(())
    } else {
        println!("✗ Domain verification failed");
        Err("Verification failed".into())
    }
}

/// Reads every block of every segment and checks that the segments are
/// ordered and do not overlap.
pub fn verify(base: &Path, domain: &str) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let dir = domain_dir(base, domain)?;
    let mut result = VerifyResult::default();
    let mut previous_end: Option<SerialNum> = None;

    for start in segment_starts(&dir, domain)? {
        result.segments_checked += 1;
        let segment = match open_segment(&dir, domain, start) {
            Ok(segment) => segment,
            Err(e) => {
                result.errors.push(e.to_string());
                continue;
            }
        };

        let range = segment.range();
        if let Some(end) = previous_end {
            if range.from() < end {
                result.errors.push(format!(
                    "{} starts at {} before the previous segment ends at {end}",
                    segment.file_name(),
                    range.from() + 1
                ));
            }
        }
        previous_end = Some(range.to());

        let mut count = 0u64;
        match segment.visit(range, |packet| {
            count += packet.len() as u64;
            true
        }) {
            Ok(_) if count == segment.size() => result.entries += count,
            Ok(_) => result.errors.push(format!(
                "{} holds {count} readable entries, expected {}",
                segment.file_name(),
                segment.size()
            )),
            Err(e) => result.errors.push(e.to_string()),
        }
    }

    Ok(result)
}

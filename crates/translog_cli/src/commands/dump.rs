//! Dump command implementation.

use super::{domain_dir, open_segment, segment_starts};
use serde::Serialize;
use std::path::Path;
use translog_core::SerialNumRange;

/// Longest data preview printed per record.
const PREVIEW_LEN: usize = 48;

/// One record for output.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Serial number.
    pub serial: u64,
    /// Record type.
    pub kind: u32,
    /// Payload size in bytes.
    pub size: usize,
    /// Start of the payload, lossily decoded as UTF-8.
    pub preview: String,
    /// Segment holding the record.
    pub segment: String,
}

/// Runs the dump command.
pub fn run(
    base: &Path,
    domain: &str,
    from: u64,
    to: u64,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = read_records(base, domain, SerialNumRange::new(from, to), limit)?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
        }
    }
    Ok(())
}

/// Reads the records of `range`, at most `limit` of them.
pub fn read_records(
    base: &Path,
    domain: &str,
    range: SerialNumRange,
    limit: Option<usize>,
) -> Result<Vec<RecordInfo>, Box<dyn std::error::Error>> {
    let dir = domain_dir(base, domain)?;
    let limit = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();

    for start in segment_starts(&dir, domain)? {
        if records.len() >= limit || start > range.to() {
            break;
        }
        let segment = open_segment(&dir, domain, start)?;
        segment.visit(range, |packet| {
            for entry in packet.entries() {
                if records.len() >= limit {
                    return false;
                }
                let shown = &entry.data[..entry.data.len().min(PREVIEW_LEN)];
                records.push(RecordInfo {
                    serial: entry.serial,
                    kind: entry.kind,
                    size: entry.data.len(),
                    preview: String::from_utf8_lossy(shown).into_owned(),
                    segment: segment.file_name().to_string(),
                });
            }
            true
        })?;
    }

    Ok(records)
}

fn print_text_output(records: &[RecordInfo]) {
    println!("Records ({} total):", records.len());
    println!();
    for record in records {
        println!(
            "  {:>12}  kind={:<6} {:>8} bytes  {:?}",
            record.serial, record.kind, record.size, record.preview
        );
    }
}

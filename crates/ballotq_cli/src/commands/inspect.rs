//! Inspect command implementation.

use ballotq_core::{LogSummary, RecordStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Queue inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Queue directory.
    pub path: String,
    /// Log size in bytes.
    pub log_size: u64,
    /// Frames in the log.
    pub frames: u64,
    /// Put frames.
    pub puts: u64,
    /// Delete frames.
    pub deletes: u64,
    /// Records a replay would produce.
    pub live_records: u64,
    /// Bytes held by the latest frame of each live record.
    pub live_bytes: u64,
    /// Bytes compaction would reclaim.
    pub reclaimable_bytes: u64,
    /// Incomplete trailing bytes.
    pub torn_tail_bytes: u64,
    /// Live records per status.
    pub by_status: BTreeMap<String, u64>,
}

impl InspectResult {
    fn new(path: &Path, summary: &LogSummary) -> Self {
        let by_status = RecordStatus::ALL
            .iter()
            .map(|status| {
                let count = summary.by_status.get(status).copied().unwrap_or(0);
                (status.as_str().to_string(), count)
            })
            .collect();
        Self {
            path: path.display().to_string(),
            log_size: summary.log_bytes,
            frames: summary.frames,
            puts: summary.puts,
            deletes: summary.deletes,
            live_records: summary.live_records,
            live_bytes: summary.live_bytes,
            reclaimable_bytes: summary.reclaimable_bytes(),
            torn_tail_bytes: summary.torn_tail_bytes,
            by_status,
        }
    }
}

/// Runs the inspect command.
///
/// Reads the log without replaying it into a store, so a torn tail is
/// reported rather than truncated.
pub fn run(dir: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let backend = super::log_copy(dir)?;
    let summary = LogSummary::scan(&backend)?;
    let result = InspectResult::new(dir, &summary);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("BallotQ Queue Inspection");
    println!("========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Log:");
    println!("  Size:          {}", format_size(result.log_size));
    println!("  Live:          {}", format_size(result.live_bytes));
    println!("  Reclaimable:   {}", format_size(result.reclaimable_bytes));
    if result.torn_tail_bytes > 0 {
        println!("  Torn tail:     {} bytes", result.torn_tail_bytes);
    }
    println!();
    println!("Frames:");
    println!("  Total:   {}", result.frames);
    println!("  Puts:    {}", result.puts);
    println!("  Deletes: {}", result.deletes);
    println!();
    println!("Records: {}", result.live_records);
    for (status, count) in &result.by_status {
        println!("  {:<8} {}", format!("{status}:"), count);
    }
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 bytes");
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn result_lists_every_status() {
        let summary = LogSummary {
            live_records: 2,
            by_status: [(RecordStatus::Failed, 2)].into_iter().collect(),
            ..LogSummary::default()
        };
        let result = InspectResult::new(Path::new("q"), &summary);
        assert_eq!(result.by_status.len(), 3);
        assert_eq!(result.by_status["failed"], 2);
        assert_eq!(result.by_status["queued"], 0);
    }
}

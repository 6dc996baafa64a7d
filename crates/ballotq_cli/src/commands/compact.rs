//! Compact command implementation.

use ballotq_core::LogSummary;
use std::path::Path;

/// Runs the compact command.
pub fn run(dir: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    if dry_run {
        let summary = LogSummary::scan(&super::log_copy(dir)?)?;
        println!("Dry run - no changes made");
        println!("  Log size:    {} bytes", summary.log_bytes);
        println!("  Live:        {} bytes", summary.live_bytes);
        println!("  Reclaimable: {} bytes", summary.reclaimable_bytes());
        return Ok(());
    }

    super::existing_log(dir)?;
    let store = super::open_store(dir)?;
    let stats = store.compact()?;
    println!("Compacted {} record(s)", stats.records);
    println!("  Before: {} bytes", stats.bytes_before);
    println!("  After:  {} bytes", stats.bytes_after);
    println!(
        "  Reclaimed: {} bytes",
        stats.bytes_before.saturating_sub(stats.bytes_after)
    );
    Ok(())
}

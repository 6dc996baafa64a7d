//! List command implementation.

use ballotq_core::{Record, RecordStatus, RecordStore, StoreConfig};
use std::path::Path;

/// Runs the list command.
pub fn run(
    dir: &Path,
    status: Option<RecordStatus>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = RecordStore::with_backend(Box::new(super::log_copy(dir)?), StoreConfig::default())?;
    let records = match status {
        Some(status) => store.list_by_status(status)?,
        None => store.get_all()?,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(records.as_slice())?);
        }
        _ => print_text_output(records.as_slice()),
    }
    Ok(())
}

fn print_text_output(records: &[Record]) {
    if records.is_empty() {
        println!("No records");
        return;
    }
    println!(
        "{:<36}  {:<36}  {:<8}  {:>7}",
        "ID", "IDEMPOTENCY KEY", "STATUS", "RETRIES"
    );
    for record in records {
        println!(
            "{:<36}  {:<36}  {:<8}  {:>7}",
            record.id().to_string(),
            record.idempotency_key().to_string(),
            record.status().as_str(),
            record.retry_count()
        );
    }
    println!();
    println!("{} record(s)", records.len());
}

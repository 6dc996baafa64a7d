//! Verify command implementation.

use ballotq_core::log::{LogOp, LogReader};
use ballotq_core::HmacSigner;
use ballotq_storage::StorageBackend;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Frames read.
    pub frames_checked: usize,
    /// Put frames whose tag was checked.
    pub tags_checked: usize,
    /// Put frames whose tag did not verify.
    pub bad_tags: usize,
    /// Incomplete trailing bytes.
    pub torn_tail_bytes: u64,
    /// Errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.bad_tags == 0 && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(dir: &Path, signing_key: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying queue at {:?}", dir);
    println!();

    let backend = super::log_copy(dir)?;
    let verifier = signing_key.map(super::signer).transpose()?;
    if verifier.is_none() {
        println!("No signing key given, skipping tag checks");
    }

    let result = verify_log(&backend, verifier.as_ref())?;
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Queue verification passed");
        Ok(())
    } else {
        println!("✗ Queue verification failed");
        Err("Verification failed".into())
    }
}

fn verify_log(
    backend: &dyn StorageBackend,
    verifier: Option<&HmacSigner>,
) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();
    let mut reader = LogReader::new(backend)?;

    for entry in reader.by_ref() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                result.errors.push(e.to_string());
                break;
            }
        };
        result.frames_checked += 1;

        if let (LogOp::Put(record), Some(verifier)) = (&entry.op, verifier) {
            result.tags_checked += 1;
            if !verifier.verify(&record.signing_message(), record.integrity_tag()) {
                result.bad_tags += 1;
                result.errors.push(format!(
                    "record {} at offset {}: integrity tag does not verify",
                    record.id(),
                    entry.offset
                ));
            }
        }
    }

    if result.errors.is_empty() {
        result.torn_tail_bytes = reader.size() - reader.valid_end();
    }
    Ok(result)
}

fn print_result(result: &VerifyResult) {
    println!("  Frames checked: {}", result.frames_checked);
    println!("  Tags checked:   {}", result.tags_checked);
    if result.torn_tail_bytes > 0 {
        println!(
            "  Torn tail:      {} bytes (dropped on next open)",
            result.torn_tail_bytes
        );
    }
    for error in &result.errors {
        println!("  Error: {}", error);
    }
}

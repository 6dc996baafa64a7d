//! CLI command implementations.

pub mod cast;
pub mod compact;
pub mod deliver;
pub mod inspect;
pub mod list;
pub mod verify;

use ballotq_core::{HmacSigner, RecordStore, StoreConfig, LOG_FILE_NAME};
use ballotq_storage::InMemoryBackend;
use std::path::{Path, PathBuf};

/// Returns the record log path inside `dir`, failing if there is no log.
pub fn existing_log(dir: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let log_path = dir.join(LOG_FILE_NAME);
    if !log_path.exists() {
        return Err(format!("No queue found at {:?}", dir).into());
    }
    Ok(log_path)
}

/// Copies the record log in `dir` into memory.
///
/// Takes no lock, so it works while another process owns the queue.
pub fn log_copy(dir: &Path) -> Result<InMemoryBackend, Box<dyn std::error::Error>> {
    let log_path = existing_log(dir)?;
    Ok(InMemoryBackend::with_data(std::fs::read(log_path)?))
}

/// Opens the queue in `dir` for reading and writing.
///
/// Fails while another process has the queue open.
pub fn open_store(dir: &Path) -> Result<RecordStore, Box<dyn std::error::Error>> {
    Ok(RecordStore::open(dir, StoreConfig::default())?)
}

/// Builds the signer for `key`.
pub fn signer(key: &str) -> Result<HmacSigner, Box<dyn std::error::Error>> {
    if key.is_empty() {
        return Err("Signing key must not be empty".into());
    }
    Ok(HmacSigner::new(key.as_bytes())?)
}

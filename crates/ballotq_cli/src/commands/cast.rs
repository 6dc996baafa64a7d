//! Cast command implementation.

use ballotq_core::Record;
use ballotq_delivery::{DeliveryConfig, DeliveryEngine, OfflineTransport};
use std::path::Path;
use std::sync::Arc;

/// Runs the cast command.
pub fn run(dir: &Path, signing_key: &str, count: usize) -> Result<(), Box<dyn std::error::Error>> {
    let (records, pending) = cast(dir, signing_key, count)?;
    for record in &records {
        println!("{} {}", record.id(), record.idempotency_key());
    }
    eprintln!("{} record(s) queued, {} pending in total", records.len(), pending);
    Ok(())
}

/// Queues `count` new records and returns them with the number now pending.
fn cast(
    dir: &Path,
    signing_key: &str,
    count: usize,
) -> Result<(Vec<Record>, usize), Box<dyn std::error::Error>> {
    let store = super::open_store(dir)?;
    let signer = super::signer(signing_key)?;
    let engine = DeliveryEngine::new(
        Arc::new(store),
        OfflineTransport,
        Arc::new(signer),
        DeliveryConfig::default(),
    );
    engine.set_online(false);

    let records = (0..count)
        .map(|_| engine.cast())
        .collect::<Result<Vec<_>, _>>()?;
    let pending = engine.store().counts()?.total();
    Ok((records, pending))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotq_core::{HmacSigner, RecordStatus, RecordStore, StoreConfig};
    use tempfile::tempdir;

    #[test]
    fn cast_queues_signed_records() {
        let dir = tempdir().unwrap();
        let (records, pending) = cast(dir.path(), "cli-secret", 3).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(pending, 3);

        let (_, pending) = cast(dir.path(), "cli-secret", 2).unwrap();
        assert_eq!(pending, 5);

        let store = RecordStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.counts().unwrap().get(RecordStatus::Queued), 5);
        let verifier = HmacSigner::new(b"cli-secret").unwrap();
        for record in &records {
            let stored = store.get(record.id()).unwrap().unwrap();
            assert_eq!(stored.retry_count(), 0);
            assert!(verifier.verify(&stored.signing_message(), stored.integrity_tag()));
        }
    }

    #[test]
    fn cast_into_a_locked_queue_fails() {
        let dir = tempdir().unwrap();
        let _held = RecordStore::open(dir.path(), StoreConfig::default()).unwrap();

        let err = cast(dir.path(), "cli-secret", 1).unwrap_err();
        assert!(err.to_string().contains("locked"));
    }

    #[test]
    fn empty_key_is_refused() {
        let dir = tempdir().unwrap();
        assert!(cast(dir.path(), "", 1).is_err());
    }
}

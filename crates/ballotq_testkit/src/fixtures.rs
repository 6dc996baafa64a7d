//! Test fixtures and queue helpers.

use ballotq_core::{HmacSigner, RecordStore, StoreConfig, LOG_FILE_NAME};
use ballotq_delivery::{BackoffConfig, DeliveryConfig, DeliveryEngine, Transport};
use ballotq_storage::InMemoryBackend;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Secret shared by [`test_signer`] and test acceptors.
pub const TEST_SECRET: &[u8] = b"ballotq-test-secret";

/// Returns a signer keyed with [`TEST_SECRET`].
pub fn test_signer() -> Arc<HmacSigner> {
    Arc::new(HmacSigner::new(TEST_SECRET).expect("HMAC accepts keys of any size"))
}

/// Delivery config with a 1 s base delay, no jitter and a 5 s attempt timeout.
///
/// Without jitter the `k`-th retry is due exactly `2^k` seconds after the
/// failure, which keeps simulated-time tests exact.
pub fn fast_config() -> DeliveryConfig {
    DeliveryConfig::new()
        .with_backoff(BackoffConfig::new(Duration::from_secs(1)).with_jitter(false))
        .with_attempt_timeout(Duration::from_secs(5))
}

/// Builds an engine over `store` using [`fast_config`] and [`test_signer`].
pub fn fast_engine<T: Transport>(store: Arc<RecordStore>, transport: T) -> DeliveryEngine<T> {
    DeliveryEngine::new(store, transport, test_signer(), fast_config())
}

enum Location {
    Memory(InMemoryBackend),
    Disk(TempDir),
}

/// A record store for tests, on disk in a temp dir or in memory.
///
/// Both kinds survive [`restart`](TestQueue::restart): the in-memory one
/// keeps its bytes in a shared buffer.
pub struct TestQueue {
    store: Arc<RecordStore>,
    location: Location,
}

impl TestQueue {
    /// Creates an in-memory queue.
    pub fn memory() -> Self {
        let backend = InMemoryBackend::new();
        let store = RecordStore::with_backend(Box::new(backend.clone()), StoreConfig::default())
            .expect("Failed to open in-memory record store");
        Self {
            store: Arc::new(store),
            location: Location::Memory(backend),
        }
    }

    /// Creates an on-disk queue in a fresh temp dir.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RecordStore::open(temp_dir.path(), StoreConfig::default())
            .expect("Failed to open record store");
        Self {
            store: Arc::new(store),
            location: Location::Disk(temp_dir),
        }
    }

    /// Returns a handle to the store.
    pub fn store(&self) -> Arc<RecordStore> {
        Arc::clone(&self.store)
    }

    /// Returns the store directory if on disk.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::Disk(dir) => Some(dir.path()),
            Location::Memory(_) => None,
        }
    }

    /// Returns the raw log bytes.
    pub fn log_bytes(&self) -> Vec<u8> {
        match &self.location {
            Location::Memory(backend) => backend.data(),
            Location::Disk(dir) => std::fs::read(dir.path().join(LOG_FILE_NAME))
                .expect("Failed to read log file"),
        }
    }

    /// Simulates a process restart: drops this handle's store and replays
    /// the log into a fresh one.
    ///
    /// # Panics
    ///
    /// Panics if other handles to the store are still alive.
    pub fn restart(self) -> Self {
        assert_eq!(
            Arc::strong_count(&self.store),
            1,
            "drop engines holding the store before restarting"
        );
        drop(self.store);

        let store = match &self.location {
            Location::Memory(backend) => {
                RecordStore::with_backend(Box::new(backend.clone()), StoreConfig::default())
            }
            Location::Disk(dir) => RecordStore::open(dir.path(), StoreConfig::default()),
        }
        .expect("Failed to reopen record store");
        Self {
            store: Arc::new(store),
            location: self.location,
        }
    }
}

impl std::ops::Deref for TestQueue {
    type Target = RecordStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotq_core::{CoreError, Record, RecordStatus};

    #[test]
    fn file_queue_survives_restart() {
        let queue = TestQueue::file();
        let record = Record::create(&*test_signer());
        queue.put(record.clone()).unwrap();
        assert!(queue.path().unwrap().join(LOG_FILE_NAME).exists());

        let queue = queue.restart();
        assert_eq!(queue.get(record.id()).unwrap(), Some(record));
        assert_eq!(queue.counts().unwrap().get(RecordStatus::Queued), 1);
    }

    #[test]
    fn file_queue_keeps_its_directory_locked() {
        let queue = TestQueue::file();
        let dir = queue.path().unwrap().to_path_buf();
        let record = Record::create(&*test_signer());
        queue.put(record.clone()).unwrap();

        let err = RecordStore::open(&dir, StoreConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::QueueLocked { .. }));

        let queue = queue.restart();
        assert_eq!(queue.get(record.id()).unwrap(), Some(record));
        assert!(RecordStore::open(&dir, StoreConfig::default()).is_err());
    }

    #[test]
    fn memory_queue_survives_restart() {
        let queue = TestQueue::memory();
        let record = Record::create(&*test_signer());
        queue.put(record.clone()).unwrap();
        assert!(!queue.log_bytes().is_empty());

        let queue = queue.restart();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(record.id()).unwrap(), Some(record));
    }

    #[test]
    fn fast_config_is_exact() {
        let config = fast_config();
        assert_eq!(config.backoff.delay_for(2), Duration::from_secs(4));
    }
}

//! Durable record store.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::id::RecordId;
use crate::log::{replay, LogOp};
use crate::record::{Record, RecordStatus};
use ballotq_storage::{FileBackend, InMemoryBackend, StorageBackend, StorageError};
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// File name of the record log inside a store directory.
pub const LOG_FILE_NAME: &str = "records.log";

/// File name of the exclusive lock inside a store directory.
pub const LOCK_FILE_NAME: &str = "LOCK";

/// An immutable, ordered view of records taken at one instant.
///
/// Iterating does not touch the store, and a snapshot can be iterated any
/// number of times. Later mutations are not reflected.
#[derive(Clone, Default)]
pub struct RecordSnapshot {
    records: Arc<[Record]>,
}

impl RecordSnapshot {
    /// Returns an iterator over the records in id order.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the records as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Record] {
        &self.records
    }
}

impl fmt::Debug for RecordSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.records.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a RecordSnapshot {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Number of records in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// Records never attempted.
    pub queued: usize,
    /// Records with an attempt in flight.
    pub sending: usize,
    /// Records waiting to be retried.
    pub failed: usize,
}

impl StatusCounts {
    /// Returns the total number of records.
    #[must_use]
    pub fn total(&self) -> usize {
        self.queued + self.sending + self.failed
    }

    /// Returns the count for `status`.
    #[must_use]
    pub fn get(&self, status: RecordStatus) -> usize {
        match status {
            RecordStatus::Queued => self.queued,
            RecordStatus::Sending => self.sending,
            RecordStatus::Failed => self.failed,
        }
    }
}

/// Outcome of a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Log length before.
    pub bytes_before: u64,
    /// Log length after.
    pub bytes_after: u64,
    /// Live records rewritten.
    pub records: usize,
}

struct Entry {
    record: Record,
    frame_len: u64,
}

struct StoreInner {
    backend: Box<dyn StorageBackend>,
    records: BTreeMap<RecordId, Entry>,
    by_status: BTreeMap<RecordStatus, BTreeSet<RecordId>>,
    log_size: u64,
    live_bytes: u64,
    poisoned: Option<String>,
}

impl StoreInner {
    fn check_usable(&self) -> CoreResult<()> {
        match &self.poisoned {
            Some(reason) => Err(CoreError::poisoned(reason.clone())),
            None => Ok(()),
        }
    }

    fn index(&mut self, record: Record, frame_len: u64) {
        let id = record.id();
        self.by_status.entry(record.status()).or_default().insert(id);
        self.live_bytes += frame_len;
        if let Some(old) = self.records.insert(id, Entry { record, frame_len }) {
            self.live_bytes -= old.frame_len;
            if old.record.status() != self.records[&id].record.status() {
                self.unindex_status(old.record.status(), &id);
            }
        }
    }

    fn unindex(&mut self, id: &RecordId) {
        if let Some(old) = self.records.remove(id) {
            self.live_bytes -= old.frame_len;
            self.unindex_status(old.record.status(), id);
        }
    }

    fn unindex_status(&mut self, status: RecordStatus, id: &RecordId) {
        if let Some(ids) = self.by_status.get_mut(&status) {
            ids.remove(id);
        }
    }

    /// Appends `frame` and makes it durable, or leaves the log as it was.
    fn append_durably(&mut self, frame: &[u8], sync: bool) -> CoreResult<()> {
        let previous = self.log_size;
        let written = self.backend.append(frame).and_then(|_| {
            if sync {
                self.backend.sync()
            } else {
                Ok(())
            }
        });

        match written {
            Ok(()) => {
                self.log_size += frame.len() as u64;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "log write failed, rolling back");
                if let Err(rollback) = self.backend.truncate(previous) {
                    error!(
                        error = %rollback,
                        "rollback failed, refusing further operations"
                    );
                    self.poisoned = Some(format!(
                        "log rollback to {previous} bytes failed: {rollback}"
                    ));
                }
                Err(e.into())
            }
        }
    }

    fn snapshot<'a>(&self, ids: impl Iterator<Item = &'a RecordId>) -> RecordSnapshot {
        let records: Vec<Record> = ids
            .filter_map(|id| self.records.get(id))
            .map(|entry| entry.record.clone())
            .collect();
        RecordSnapshot {
            records: records.into(),
        }
    }

    fn compact(&mut self) -> CoreResult<CompactionStats> {
        let bytes_before = self.log_size;
        let mut data = Vec::with_capacity(self.live_bytes as usize);
        let mut lens = Vec::with_capacity(self.records.len());
        for (id, entry) in &self.records {
            let frame = LogOp::Put(entry.record.clone()).encode()?;
            lens.push((*id, frame.len() as u64));
            data.extend_from_slice(&frame);
        }

        // On failure the old log is still in place and the index still matches it.
        self.backend.replace(&data)?;

        for (id, len) in lens {
            if let Some(entry) = self.records.get_mut(&id) {
                entry.frame_len = len;
            }
        }
        self.log_size = data.len() as u64;
        self.live_bytes = self.log_size;

        Ok(CompactionStats {
            bytes_before,
            bytes_after: self.log_size,
            records: self.records.len(),
        })
    }
}

/// Durable, crash-consistent storage for queue records.
///
/// Every mutation is one frame appended to the record log and, by default,
/// fsync'd before the call returns. The current state lives in memory,
/// keyed by id with a secondary index on status, and is rebuilt from the
/// log on open.
///
/// A failed write is rolled back by truncating the log to its previous
/// length. If even that fails the store stops accepting operations, since
/// its memory and its log may disagree; reopening recovers.
///
/// # Example
///
/// ```rust
/// use ballotq_core::{HmacSigner, Record, RecordStatus, RecordStore};
///
/// let store = RecordStore::in_memory();
/// let signer = HmacSigner::new(b"secret").unwrap();
/// let record = Record::create(&signer);
///
/// store.put(record.clone()).unwrap();
/// let queued = store.list_by_status(RecordStatus::Queued).unwrap();
/// assert_eq!(queued.len(), 1);
///
/// store.delete(record.id()).unwrap();
/// assert!(store.is_empty());
/// ```
pub struct RecordStore {
    inner: RwLock<StoreInner>,
    config: StoreConfig,
    /// Released when the store is dropped.
    _lock_file: Option<File>,
}

impl RecordStore {
    /// Opens the store in directory `dir`, creating it if missing.
    ///
    /// The directory stays exclusively locked until the store is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::QueueLocked`] if another store has the directory
    /// open, or an error if the log cannot be opened or is corrupted.
    pub fn open(dir: &Path, config: StoreConfig) -> CoreResult<Self> {
        fs::create_dir_all(dir).map_err(StorageError::from)?;

        let lock_path = dir.join(LOCK_FILE_NAME);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(StorageError::from)?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::QueueLocked { path: lock_path });
        }

        let backend = FileBackend::open(&dir.join(LOG_FILE_NAME))?;
        let mut store = Self::with_backend(Box::new(backend), config)?;
        store._lock_file = Some(lock_file);
        Ok(store)
    }

    /// Creates an empty store that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        let inner = StoreInner {
            backend: Box::new(InMemoryBackend::new()),
            records: BTreeMap::new(),
            by_status: BTreeMap::new(),
            log_size: 0,
            live_bytes: 0,
            poisoned: None,
        };
        Self {
            inner: RwLock::new(inner),
            config: StoreConfig::default(),
            _lock_file: None,
        }
    }

    /// Opens a store over an arbitrary backend, replaying its log.
    ///
    /// An incomplete trailing frame is cut off.
    ///
    /// # Errors
    ///
    /// Returns an error if a complete frame is corrupted or the backend fails.
    pub fn with_backend(mut backend: Box<dyn StorageBackend>, config: StoreConfig) -> CoreResult<Self> {
        let state = replay(backend.as_ref())?;
        if state.summary.torn_tail_bytes > 0 {
            warn!(
                valid_end = state.valid_end,
                torn_bytes = state.summary.torn_tail_bytes,
                "discarding incomplete frame at end of record log"
            );
            backend.truncate(state.valid_end)?;
        }

        let mut inner = StoreInner {
            backend,
            records: BTreeMap::new(),
            by_status: BTreeMap::new(),
            log_size: state.valid_end,
            live_bytes: 0,
            poisoned: None,
        };
        for (record, frame_len) in state.records.into_values() {
            inner.index(record, frame_len);
        }

        info!(
            records = inner.records.len(),
            frames = state.summary.frames,
            log_bytes = inner.log_size,
            "opened record store"
        );

        Ok(Self {
            inner: RwLock::new(inner),
            config,
            _lock_file: None,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Inserts or fully replaces the record with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageUnavailable`] if the write could not be
    /// made durable. The record must then be treated as not persisted.
    pub fn put(&self, record: Record) -> CoreResult<()> {
        let frame = LogOp::Put(record.clone()).encode()?;
        let mut inner = self.inner.write();
        inner.check_usable()?;
        inner.append_durably(&frame, self.config.sync_on_write)?;
        debug!(record_id = %record.id(), status = %record.status(), "put record");
        inner.index(record, frame.len() as u64);
        self.maybe_compact(&mut inner);
        Ok(())
    }

    /// Removes a record. Removing an unknown id is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageUnavailable`] if the removal could not be
    /// made durable; the record is then still present.
    pub fn delete(&self, id: RecordId) -> CoreResult<()> {
        let mut inner = self.inner.write();
        inner.check_usable()?;
        if !inner.records.contains_key(&id) {
            return Ok(());
        }
        let frame = LogOp::Delete(id).encode()?;
        inner.append_durably(&frame, self.config.sync_on_write)?;
        debug!(record_id = %id, "deleted record");
        inner.unindex(&id);
        self.maybe_compact(&mut inner);
        Ok(())
    }

    /// Returns the record with `id`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unusable.
    pub fn get(&self, id: RecordId) -> CoreResult<Option<Record>> {
        let inner = self.inner.read();
        inner.check_usable()?;
        Ok(inner.records.get(&id).map(|entry| entry.record.clone()))
    }

    /// Returns all records with `status`, ordered by id ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unusable.
    pub fn list_by_status(&self, status: RecordStatus) -> CoreResult<RecordSnapshot> {
        let inner = self.inner.read();
        inner.check_usable()?;
        Ok(match inner.by_status.get(&status) {
            Some(ids) => inner.snapshot(ids.iter()),
            None => RecordSnapshot::default(),
        })
    }

    /// Returns every record, ordered by id ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unusable.
    pub fn get_all(&self) -> CoreResult<RecordSnapshot> {
        let inner = self.inner.read();
        inner.check_usable()?;
        Ok(inner.snapshot(inner.records.keys()))
    }

    /// Returns how many records are in each status.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unusable.
    pub fn counts(&self) -> CoreResult<StatusCounts> {
        let inner = self.inner.read();
        inner.check_usable()?;
        let count = |status: RecordStatus| inner.by_status.get(&status).map_or(0, BTreeSet::len);
        Ok(StatusCounts {
            queued: count(RecordStatus::Queued),
            sending: count(RecordStatus::Sending),
            failed: count(RecordStatus::Failed),
        })
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current log length in bytes.
    #[must_use]
    pub fn log_size(&self) -> u64 {
        self.inner.read().log_size
    }

    /// Returns true if a failed rollback left the store unusable.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.inner.read().poisoned.is_some()
    }

    /// Rewrites the log so it holds exactly one frame per live record.
    ///
    /// # Errors
    ///
    /// Returns an error if the new log could not be written. The old log is
    /// then still in place and the store remains usable.
    pub fn compact(&self) -> CoreResult<CompactionStats> {
        let mut inner = self.inner.write();
        inner.check_usable()?;
        let stats = inner.compact()?;
        info!(
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            records = stats.records,
            "compacted record log"
        );
        Ok(stats)
    }

    fn maybe_compact(&self, inner: &mut StoreInner) {
        let threshold = self.config.compact_threshold_bytes;
        if threshold == 0 || inner.log_size <= threshold || inner.log_size < inner.live_bytes * 2 {
            return;
        }
        match inner.compact() {
            Ok(stats) => info!(
                bytes_before = stats.bytes_before,
                bytes_after = stats.bytes_after,
                "auto-compacted record log"
            ),
            Err(e) => warn!(error = %e, "auto-compaction failed, keeping current log"),
        }
    }
}

impl fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("RecordStore")
            .field("records", &inner.records.len())
            .field("log_size", &inner.log_size)
            .field("poisoned", &inner.poisoned.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::HmacSigner;
    use ballotq_storage::StorageResult;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::tempdir;

    fn signer() -> HmacSigner {
        HmacSigner::new(b"store-tests").unwrap()
    }

    fn no_compaction() -> StoreConfig {
        StoreConfig::default().compact_threshold_bytes(0)
    }

    #[test]
    fn put_get_delete() {
        let store = RecordStore::in_memory();
        let record = Record::create(&signer());

        store.put(record.clone()).unwrap();
        assert_eq!(store.get(record.id()).unwrap(), Some(record.clone()));
        assert_eq!(store.len(), 1);

        store.delete(record.id()).unwrap();
        assert_eq!(store.get(record.id()).unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn delete_missing_is_noop() {
        let store = RecordStore::in_memory();
        let record = Record::create(&signer());
        store.delete(record.id()).unwrap();
        assert_eq!(store.log_size(), 0);

        store.put(record.clone()).unwrap();
        store.delete(record.id()).unwrap();
        let size = store.log_size();
        store.delete(record.id()).unwrap();
        assert_eq!(store.log_size(), size);
    }

    #[test]
    fn put_replaces_and_reindexes() {
        let store = RecordStore::in_memory();
        let record = Record::create(&signer());
        store.put(record.clone()).unwrap();
        store.put(record.claimed()).unwrap();

        assert!(store.list_by_status(RecordStatus::Queued).unwrap().is_empty());
        let sending = store.list_by_status(RecordStatus::Sending).unwrap();
        assert_eq!(sending.len(), 1);
        assert_eq!(sending.as_slice()[0].status(), RecordStatus::Sending);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn listing_is_ordered_by_id() {
        let store = RecordStore::in_memory();
        let signer = signer();
        let records: Vec<Record> = (0..20).map(|_| Record::create(&signer)).collect();
        for record in records.iter().rev() {
            store.put(record.clone()).unwrap();
        }

        let ids: Vec<RecordId> = store.get_all().unwrap().iter().map(Record::id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);

        let queued: Vec<RecordId> = store
            .list_by_status(RecordStatus::Queued)
            .unwrap()
            .iter()
            .map(Record::id)
            .collect();
        assert_eq!(queued, sorted);
    }

    #[test]
    fn snapshot_is_stable_and_restartable() {
        let store = RecordStore::in_memory();
        let signer = signer();
        let first = Record::create(&signer);
        store.put(first.clone()).unwrap();

        let snapshot = store.get_all().unwrap();
        store.put(Record::create(&signer)).unwrap();
        store.delete(first.id()).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.iter().count(), 1);
        assert_eq!((&snapshot).into_iter().next(), Some(&first));
    }

    #[test]
    fn counts_by_status() {
        let store = RecordStore::in_memory();
        let signer = signer();
        let a = Record::create(&signer);
        let b = Record::create(&signer);
        let c = Record::create(&signer);
        store.put(a.clone()).unwrap();
        store.put(b.claimed()).unwrap();
        store.put(c.claimed().failed()).unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts, StatusCounts { queued: 1, sending: 1, failed: 1 });
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.get(RecordStatus::Failed), 1);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let signer = signer();
        let kept = Record::create(&signer).claimed().failed();
        let removed = Record::create(&signer);

        {
            let store = RecordStore::open(dir.path(), StoreConfig::default()).unwrap();
            store.put(kept.clone()).unwrap();
            store.put(removed.clone()).unwrap();
            store.delete(removed.id()).unwrap();
        }

        let store = RecordStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(kept.id()).unwrap(), Some(kept));
        assert_eq!(store.get(removed.id()).unwrap(), None);
    }

    #[test]
    fn second_open_of_a_directory_is_refused() {
        let dir = tempdir().unwrap();
        let signer = signer();
        let cast = Record::create(&signer);

        let first = RecordStore::open(dir.path(), StoreConfig::default()).unwrap();
        first.put(cast.clone()).unwrap();
        assert!(dir.path().join(LOCK_FILE_NAME).exists());

        let err = RecordStore::open(dir.path(), StoreConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::QueueLocked { .. }));
        assert!(!err.is_storage_unavailable());
        assert_eq!(first.get(cast.id()).unwrap(), Some(cast.clone()));

        drop(first);
        let reopened = RecordStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(reopened.get(cast.id()).unwrap(), Some(cast));
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let backend = InMemoryBackend::new();
        let survivor = backend.clone();
        let record = Record::create(&signer());
        {
            let store = RecordStore::with_backend(Box::new(backend), no_compaction()).unwrap();
            store.put(record.clone()).unwrap();
        }
        let good_len = survivor.data().len();
        let mut half = LogOp::Put(Record::create(&signer())).encode().unwrap();
        half.truncate(half.len() / 2);
        let mut damaged = survivor.data();
        damaged.extend_from_slice(&half);

        let reopened = InMemoryBackend::with_data(damaged);
        let store = RecordStore::with_backend(Box::new(reopened.clone()), no_compaction()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(reopened.data().len(), good_len);
        assert_eq!(store.log_size(), good_len as u64);
    }

    #[test]
    fn corruption_fails_open() {
        let store_backend = InMemoryBackend::new();
        let survivor = store_backend.clone();
        {
            let store = RecordStore::with_backend(Box::new(store_backend), no_compaction()).unwrap();
            store.put(Record::create(&signer())).unwrap();
            store.put(Record::create(&signer())).unwrap();
        }
        let mut data = survivor.data();
        data[20] ^= 0x55;

        let result = RecordStore::with_backend(Box::new(InMemoryBackend::with_data(data)), no_compaction());
        assert!(matches!(
            result,
            Err(CoreError::ChecksumMismatch { .. } | CoreError::LogCorruption { .. })
        ));
    }

    #[test]
    fn compact_keeps_live_records_only() {
        let dir = tempdir().unwrap();
        let signer = signer();
        let store = RecordStore::open(dir.path(), no_compaction()).unwrap();
        let live = Record::create(&signer);
        store.put(live.clone()).unwrap();
        for _ in 0..10 {
            let r = Record::create(&signer);
            store.put(r.clone()).unwrap();
            store.put(r.claimed()).unwrap();
            store.delete(r.id()).unwrap();
        }

        let stats = store.compact().unwrap();
        assert!(stats.bytes_after < stats.bytes_before);
        assert_eq!(stats.records, 1);
        assert_eq!(store.log_size(), stats.bytes_after);
        drop(store);

        let store = RecordStore::open(dir.path(), no_compaction()).unwrap();
        assert_eq!(store.get_all().unwrap().as_slice(), &[live]);
        assert_eq!(store.log_size(), stats.bytes_after);
    }

    #[test]
    fn auto_compaction_bounds_log_growth() {
        let config = StoreConfig::default().compact_threshold_bytes(2048);
        let store = RecordStore::with_backend(Box::new(InMemoryBackend::new()), config).unwrap();
        let signer = signer();
        for _ in 0..100 {
            let r = Record::create(&signer);
            store.put(r.clone()).unwrap();
            store.put(r.claimed()).unwrap();
            store.delete(r.id()).unwrap();
        }
        assert!(store.log_size() <= 2048);
        assert!(store.is_empty());
    }

    /// Backend whose writes and truncations can be made to fail.
    #[derive(Clone, Default)]
    struct Flaky {
        inner: InMemoryBackend,
        fail_sync: Arc<AtomicBool>,
        fail_truncate: Arc<AtomicBool>,
    }

    impl StorageBackend for Flaky {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }
        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            self.inner.append(data)
        }
        fn sync(&mut self) -> StorageResult<()> {
            if self.fail_sync.load(Ordering::SeqCst) {
                return Err(ballotq_storage::StorageError::Unavailable("sync".into()));
            }
            self.inner.sync()
        }
        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }
        fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
            if self.fail_truncate.load(Ordering::SeqCst) {
                return Err(ballotq_storage::StorageError::Unavailable("truncate".into()));
            }
            self.inner.truncate(new_size)
        }
        fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
            self.inner.replace(data)
        }
    }

    #[test]
    fn failed_write_rolls_back() {
        let flaky = Flaky::default();
        let store = RecordStore::with_backend(Box::new(flaky.clone()), no_compaction()).unwrap();
        let kept = Record::create(&signer());
        store.put(kept.clone()).unwrap();
        let size = store.log_size();

        flaky.fail_sync.store(true, Ordering::SeqCst);
        let lost = Record::create(&signer());
        let err = store.put(lost.clone()).unwrap_err();
        assert!(err.is_storage_unavailable());
        assert_eq!(store.get(lost.id()).unwrap(), None);
        assert_eq!(flaky.inner.data().len() as u64, size);

        let err = store.delete(kept.id()).unwrap_err();
        assert!(err.is_storage_unavailable());
        assert!(store.get(kept.id()).unwrap().is_some());

        flaky.fail_sync.store(false, Ordering::SeqCst);
        store.put(lost.clone()).unwrap();
        assert_eq!(store.len(), 2);
        assert!(!store.is_poisoned());
    }

    #[test]
    fn failed_rollback_poisons_store() {
        let flaky = Flaky::default();
        let store = RecordStore::with_backend(Box::new(flaky.clone()), no_compaction()).unwrap();
        flaky.fail_sync.store(true, Ordering::SeqCst);
        flaky.fail_truncate.store(true, Ordering::SeqCst);

        assert!(store.put(Record::create(&signer())).is_err());
        assert!(store.is_poisoned());

        flaky.fail_sync.store(false, Ordering::SeqCst);
        flaky.fail_truncate.store(false, Ordering::SeqCst);
        assert!(store.put(Record::create(&signer())).unwrap_err().is_storage_unavailable());
        assert!(store.get_all().unwrap_err().is_storage_unavailable());
        assert!(store.counts().is_err());
    }
}

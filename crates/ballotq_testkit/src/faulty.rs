//! Storage fault injection.
//!
//! [`FaultyBackend`] wraps a real backend and fails writes on command. The
//! controls live in a shared [`FaultInjector`], so a test can keep flipping
//! them after the backend has been moved into a store.

use ballotq_storage::{StorageBackend, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct Faults {
    fail_writes: AtomicBool,
    fail_next_writes: AtomicUsize,
    fail_truncate: AtomicBool,
    fail_replace: AtomicBool,
    sync_delay_ms: AtomicU64,
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    crashed: AtomicBool,
    injected: AtomicUsize,
}

impl Default for Faults {
    fn default() -> Self {
        Self {
            fail_writes: AtomicBool::new(false),
            fail_next_writes: AtomicUsize::new(0),
            fail_truncate: AtomicBool::new(false),
            fail_replace: AtomicBool::new(false),
            sync_delay_ms: AtomicU64::new(0),
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            injected: AtomicUsize::new(0),
        }
    }
}

/// Handle controlling the faults of one [`FaultyBackend`].
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    faults: Arc<Faults>,
}

impl FaultInjector {
    /// Makes every append and sync fail until turned off.
    pub fn set_fail_writes(&self, fail: bool) {
        self.faults.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `count` syncs fail, then recovers by itself.
    ///
    /// Each mutation of a store syncs once, so this fails exactly `count`
    /// store writes.
    pub fn fail_next_writes(&self, count: usize) {
        self.faults.fail_next_writes.store(count, Ordering::SeqCst);
    }

    /// Makes truncation fail, so a failed write cannot be rolled back.
    pub fn set_fail_truncate(&self, fail: bool) {
        self.faults.fail_truncate.store(fail, Ordering::SeqCst);
    }

    /// Makes whole-log replacement (compaction) fail.
    pub fn set_fail_replace(&self, fail: bool) {
        self.faults.fail_replace.store(fail, Ordering::SeqCst);
    }

    /// Makes every sync block the calling thread for `delay`, like a slow disk.
    pub fn set_sync_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.faults.sync_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Crashes once `bytes` more bytes were appended, keeping a torn prefix.
    pub fn crash_after(&self, bytes: usize) {
        self.faults.bytes_written.store(0, Ordering::SeqCst);
        self.faults.crash_after_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Clears every fault.
    pub fn reset(&self) {
        let f = &self.faults;
        f.fail_writes.store(false, Ordering::SeqCst);
        f.fail_next_writes.store(0, Ordering::SeqCst);
        f.fail_truncate.store(false, Ordering::SeqCst);
        f.fail_replace.store(false, Ordering::SeqCst);
        f.sync_delay_ms.store(0, Ordering::SeqCst);
        f.crash_after_bytes.store(usize::MAX, Ordering::SeqCst);
        f.bytes_written.store(0, Ordering::SeqCst);
        f.crashed.store(false, Ordering::SeqCst);
    }

    /// Returns whether a simulated crash happened.
    pub fn has_crashed(&self) -> bool {
        self.faults.crashed.load(Ordering::SeqCst)
    }

    /// Returns how many operations were failed on purpose.
    pub fn injected_failures(&self) -> usize {
        self.faults.injected.load(Ordering::SeqCst)
    }

    fn fail(&self, what: &str) -> StorageError {
        self.faults.injected.fetch_add(1, Ordering::SeqCst);
        StorageError::Io(std::io::Error::other(format!("simulated {what} failure")))
    }

    fn take_next_write_failure(&self) -> bool {
        self.faults
            .fail_next_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// A storage backend wrapper that fails on demand.
pub struct FaultyBackend {
    inner: Box<dyn StorageBackend>,
    injector: FaultInjector,
}

impl FaultyBackend {
    /// Wraps `inner`, returning the backend and its control handle.
    pub fn new(inner: Box<dyn StorageBackend>) -> (Self, FaultInjector) {
        let injector = FaultInjector::default();
        let backend = Self {
            inner,
            injector: injector.clone(),
        };
        (backend, injector)
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let faults = &self.injector.faults;
        if faults.fail_writes.load(Ordering::SeqCst) {
            return Err(self.injector.fail("append"));
        }

        let current = faults.bytes_written.fetch_add(bytes.len(), Ordering::SeqCst);
        let threshold = faults.crash_after_bytes.load(Ordering::SeqCst);
        if current.saturating_add(bytes.len()) > threshold {
            faults.crashed.store(true, Ordering::SeqCst);
            let partial = threshold.saturating_sub(current);
            if partial > 0 {
                let _ = self.inner.append(&bytes[..partial]);
            }
            return Err(self.injector.fail("partial write"));
        }

        self.inner.append(bytes)
    }

    fn sync(&mut self) -> StorageResult<()> {
        let delay = self.injector.faults.sync_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.injector.faults.fail_writes.load(Ordering::SeqCst)
            || self.injector.take_next_write_failure()
        {
            return Err(self.injector.fail("sync"));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.injector.faults.fail_truncate.load(Ordering::SeqCst) {
            return Err(self.injector.fail("truncate"));
        }
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        if self.injector.faults.fail_replace.load(Ordering::SeqCst) {
            return Err(self.injector.fail("replace"));
        }
        self.inner.replace(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotq_storage::InMemoryBackend;

    #[test]
    fn passes_through_when_healthy() {
        let (mut backend, injector) = FaultyBackend::new(Box::new(InMemoryBackend::new()));
        backend.append(b"abc").unwrap();
        backend.sync().unwrap();
        assert_eq!(backend.read_at(0, 3).unwrap(), b"abc");
        assert_eq!(injector.injected_failures(), 0);
    }

    #[test]
    fn fail_next_writes_counts_down() {
        let (mut backend, injector) = FaultyBackend::new(Box::new(InMemoryBackend::new()));
        injector.fail_next_writes(2);
        assert!(backend.sync().is_err());
        assert!(backend.sync().is_err());
        assert!(backend.sync().is_ok());
        assert_eq!(injector.injected_failures(), 2);
    }

    #[test]
    fn crash_leaves_torn_prefix() {
        let memory = InMemoryBackend::new();
        let (mut backend, injector) = FaultyBackend::new(Box::new(memory.clone()));
        injector.crash_after(4);
        assert!(backend.append(b"abcdef").is_err());
        assert!(injector.has_crashed());
        assert_eq!(memory.data(), b"abcd");

        injector.reset();
        assert!(!injector.has_crashed());
        backend.append(b"gh").unwrap();
    }

    #[test]
    fn truncate_and_replace_faults() {
        let (mut backend, injector) = FaultyBackend::new(Box::new(InMemoryBackend::new()));
        backend.append(b"abc").unwrap();
        injector.set_fail_truncate(true);
        injector.set_fail_replace(true);
        assert!(backend.truncate(1).is_err());
        assert!(backend.replace(b"x").is_err());
        assert_eq!(backend.size().unwrap(), 3);
    }

    #[test]
    fn sync_delay_blocks_until_reset() {
        let (mut backend, injector) = FaultyBackend::new(Box::new(InMemoryBackend::new()));
        injector.set_sync_delay(Duration::from_millis(20));
        let start = std::time::Instant::now();
        backend.sync().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));

        injector.reset();
        let start = std::time::Instant::now();
        backend.sync().unwrap();
        assert!(start.elapsed() < Duration::from_millis(20));
    }
}

//! Transport abstraction for delivery attempts.

use ballotq_core::{Record, RecordId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The acceptor confirmed the record. It will be removed locally.
    Success,
    /// The attempt failed for a reason that may go away. It will be retried.
    TransientFailure,
}

impl DeliveryOutcome {
    /// Returns true for [`DeliveryOutcome::Success`].
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Carries a record to the remote acceptor.
///
/// Implementations receive the full record, including its idempotency key
/// and integrity tag, so the acceptor can deduplicate and verify. Every
/// kind of failure maps to [`DeliveryOutcome::TransientFailure`]; there is
/// no permanent rejection.
pub trait Transport: Send + Sync {
    /// Attempts to deliver `record` once.
    fn attempt(&self, record: &Record) -> impl Future<Output = DeliveryOutcome> + Send;
}

/// A scripted transport for testing.
///
/// Replays queued outcomes in order, then falls back to a default. Every
/// attempted record id is logged.
#[derive(Debug)]
pub struct MockTransport {
    script: Mutex<VecDeque<DeliveryOutcome>>,
    fallback: Mutex<DeliveryOutcome>,
    attempts: AtomicUsize,
    attempted: Mutex<Vec<RecordId>>,
}

impl MockTransport {
    /// Creates a transport that always succeeds.
    pub fn new() -> Self {
        Self::with_fallback(DeliveryOutcome::Success)
    }

    /// Creates a transport that always fails transiently.
    pub fn failing() -> Self {
        Self::with_fallback(DeliveryOutcome::TransientFailure)
    }

    /// Creates a transport answering `fallback` once its script is exhausted.
    pub fn with_fallback(fallback: DeliveryOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            attempts: AtomicUsize::new(0),
            attempted: Mutex::new(Vec::new()),
        }
    }

    /// Queues outcomes for the next attempts.
    pub fn push_outcomes(&self, outcomes: impl IntoIterator<Item = DeliveryOutcome>) {
        self.script.lock().extend(outcomes);
    }

    /// Changes the outcome used once the script is exhausted.
    pub fn set_fallback(&self, outcome: DeliveryOutcome) {
        *self.fallback.lock() = outcome;
    }

    /// Returns how many attempts were made.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Returns the ids of attempted records, in attempt order.
    pub fn attempted(&self) -> Vec<RecordId> {
        self.attempted.lock().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    async fn attempt(&self, record: &Record) -> DeliveryOutcome {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.attempted.lock().push(record.id());
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| *self.fallback.lock())
    }
}

/// Transport for an engine that only casts.
///
/// Every attempt fails transiently without leaving the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTransport;

impl Transport for OfflineTransport {
    async fn attempt(&self, _record: &Record) -> DeliveryOutcome {
        DeliveryOutcome::TransientFailure
    }
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn attempt(&self, record: &Record) -> impl Future<Output = DeliveryOutcome> + Send {
        (**self).attempt(record)
    }
}

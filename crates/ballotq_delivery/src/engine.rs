//! Delivery engine state machine.
//!
//! Per record:
//!
//! ```text
//! Queued ──claim──▶ Sending ──Success──────────▶ (removed)
//!    ▲                 │
//!    │                 └──TransientFailure──▶ Failed ──backoff elapsed, claim──▶ Sending
//!    │
//!  cast
//! ```
//!
//! A record found in `Sending` when no sweep is running lost its outcome to
//! a crash or a failed write. It is moved to `Failed`, with its retry count
//! unchanged, and is eligible at once.

use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, DeliveryResult};
use crate::transport::{DeliveryOutcome, Transport};
use ballotq_core::{CoreError, CoreResult, Record, RecordId, RecordStatus, RecordStore, Signer};
use futures_util::stream::{FuturesUnordered, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Shared online/offline flag.
///
/// While offline, sweeps still run but never call the transport.
#[derive(Debug)]
pub struct Connectivity {
    online: AtomicBool,
}

impl Connectivity {
    /// Creates a flag in the given state.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Returns true if delivery attempts are allowed.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Sets the state and returns the previous one.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst)
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records moved to `Sending` and attempted.
    pub claimed: usize,
    /// Records delivered and removed.
    pub delivered: usize,
    /// Attempts that failed; the record was rescheduled.
    pub failed: usize,
    /// Eligible-status records still inside their backoff window.
    pub deferred_backoff: usize,
    /// Eligible records left untouched because the engine was offline.
    pub deferred_offline: usize,
    /// Records whose claim could not be persisted; not attempted.
    pub claim_failures: usize,
    /// Outcomes that could not be persisted; the record stays `Sending`
    /// and is recovered by the next sweep.
    pub persist_failures: usize,
    /// Stale `Sending` records moved back to `Failed`.
    pub recovered: usize,
    /// Whether the sweep stopped claiming early because of cancellation.
    pub cancelled: bool,
}

impl SweepReport {
    /// Returns true if the sweep made no transport calls.
    pub fn is_idle(&self) -> bool {
        self.claimed == 0
    }
}

/// Cumulative engine statistics.
#[derive(Debug, Clone, Default)]
pub struct DeliveryStats {
    /// Sweeps completed.
    pub sweeps: u64,
    /// Transport attempts made.
    pub attempts: u64,
    /// Records delivered.
    pub delivered: u64,
    /// Attempts that failed.
    pub failed_attempts: u64,
    /// Attempts that hit the timeout.
    pub timeouts: u64,
    /// Claims that could not be persisted.
    pub claim_failures: u64,
    /// Stale `Sending` records recovered.
    pub recovered: u64,
    /// When the last sweep finished.
    pub last_sweep_time: Option<SystemTime>,
    /// Last store error seen by a sweep.
    pub last_error: Option<String>,
}

enum Step {
    Attempted {
        outcome: DeliveryOutcome,
        timed_out: bool,
        persisted: bool,
    },
    ClaimFailed,
    Offline,
}

/// Drives records from the store to the transport.
///
/// The engine is the only writer of record status and retry count. It
/// decides which records are eligible, claims each one durably before its
/// attempt, and applies the outcome. Backoff deadlines live in memory; a
/// restarted engine treats every `Failed` record as eligible.
pub struct DeliveryEngine<T: Transport> {
    store: Arc<RecordStore>,
    transport: T,
    signer: Arc<dyn Signer>,
    config: DeliveryConfig,
    connectivity: Arc<Connectivity>,
    next_eligible: Mutex<HashMap<RecordId, Instant>>,
    sweep_lock: tokio::sync::Mutex<()>,
    cancelled: AtomicBool,
    stats: RwLock<DeliveryStats>,
}

impl<T: Transport> DeliveryEngine<T> {
    /// Creates an engine over `store`, online.
    pub fn new(
        store: Arc<RecordStore>,
        transport: T,
        signer: Arc<dyn Signer>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            store,
            transport,
            signer,
            config,
            connectivity: Arc::new(Connectivity::default()),
            next_eligible: Mutex::new(HashMap::new()),
            sweep_lock: tokio::sync::Mutex::new(()),
            cancelled: AtomicBool::new(false),
            stats: RwLock::new(DeliveryStats::default()),
        }
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Returns the connectivity flag.
    pub fn connectivity(&self) -> &Arc<Connectivity> {
        &self.connectivity
    }

    /// Returns true if delivery attempts are allowed.
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Sets connectivity and returns the previous state.
    pub fn set_online(&self, online: bool) -> bool {
        let was = self.connectivity.set_online(online);
        if was != online {
            info!(online, "connectivity changed");
        }
        was
    }

    /// Gets the current stats.
    pub fn stats(&self) -> DeliveryStats {
        self.stats.read().clone()
    }

    /// Returns true while a sweep holds the engine.
    pub fn is_sweeping(&self) -> bool {
        self.sweep_lock.try_lock().is_err()
    }

    /// Stops sweeps from claiming further records.
    ///
    /// Attempts already claimed run to completion or timeout and their
    /// outcomes are persisted. Sweeps claim nothing until
    /// [`reset_cancel`](Self::reset_cancel) is called.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Resets the cancelled flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns when a `Failed` record may next be attempted, if it is waiting.
    pub fn next_eligible_at(&self, id: RecordId) -> Option<Instant> {
        self.next_eligible.lock().get(&id).copied()
    }

    /// Creates, signs and durably queues a new record.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Store`] if the record could not be
    /// persisted; nothing was queued.
    pub fn cast(&self) -> DeliveryResult<Record> {
        let record = Record::create(self.signer.as_ref());
        self.store.put(record.clone())?;
        info!(
            record_id = %record.id(),
            idempotency_key = %record.idempotency_key(),
            "record cast"
        );
        Ok(record)
    }

    /// Moves stale `Sending` records to `Failed`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::SweepInProgress`] if a sweep is running, or
    /// a store error if the records could not be listed.
    pub async fn recover(&self) -> DeliveryResult<usize> {
        let _guard = self
            .sweep_lock
            .try_lock()
            .map_err(|_| DeliveryError::SweepInProgress)?;
        self.recover_stale().await
    }

    async fn recover_stale(&self) -> DeliveryResult<usize> {
        let stale = self.store.list_by_status(RecordStatus::Sending)?;
        let mut recovered = 0;
        for record in &stale {
            let fixed = record.recovered();
            match self.persist(move |store| store.put(fixed)).await {
                Ok(()) => {
                    self.next_eligible.lock().remove(&record.id());
                    recovered += 1;
                    warn!(
                        record_id = %record.id(),
                        retry_count = record.retry_count(),
                        "recovered record left in sending"
                    );
                }
                Err(e) => {
                    error!(record_id = %record.id(), error = %e, "failed to recover record");
                }
            }
        }
        if recovered > 0 {
            self.stats.write().recovered += recovered as u64;
        }
        Ok(recovered)
    }

    /// Runs one delivery pass over the store.
    ///
    /// Recovers stale `Sending` records, then attempts every `Queued`
    /// record and every `Failed` record whose backoff has elapsed, in id
    /// order, up to `max_concurrent_attempts` at a time. While offline no
    /// record is touched.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::SweepInProgress`] if another sweep is
    /// running, or [`DeliveryError::Store`] if the store could not be read.
    /// A store failure on a single record is logged and counted instead.
    pub async fn sweep(&self) -> DeliveryResult<SweepReport> {
        let _guard = self
            .sweep_lock
            .try_lock()
            .map_err(|_| DeliveryError::SweepInProgress)?;

        let result = self.run_sweep().await;

        let mut stats = self.stats.write();
        stats.last_sweep_time = Some(SystemTime::now());
        match &result {
            Ok(report) => {
                stats.sweeps += 1;
                stats.attempts += report.claimed as u64;
                stats.delivered += report.delivered as u64;
                stats.failed_attempts += report.failed as u64;
                stats.claim_failures += report.claim_failures as u64;
            }
            Err(e) => stats.last_error = Some(e.to_string()),
        }
        result
    }

    async fn run_sweep(&self) -> DeliveryResult<SweepReport> {
        let mut report = SweepReport {
            recovered: self.recover_stale().await?,
            ..SweepReport::default()
        };

        let now = Instant::now();
        let mut eligible = Vec::new();
        for status in [RecordStatus::Queued, RecordStatus::Failed] {
            for record in &self.store.list_by_status(status)? {
                if self.is_due(record, now) {
                    eligible.push(record.clone());
                } else {
                    report.deferred_backoff += 1;
                }
            }
        }
        eligible.sort_by_key(Record::id);

        if eligible.is_empty() {
            debug!(deferred = report.deferred_backoff, "nothing to deliver");
            return Ok(report);
        }
        if !self.is_online() {
            report.deferred_offline = eligible.len();
            debug!(eligible = eligible.len(), "offline, deferring delivery");
            return Ok(report);
        }

        let total = eligible.len();
        let timeout = self.config.attempt_timeout;
        let max_in_flight = self.config.max_concurrent_attempts.max(1);
        let mut pending = eligible.into_iter();
        let mut in_flight = FuturesUnordered::new();

        let mut seen = 0;
        loop {
            while in_flight.len() < max_in_flight && !self.is_cancelled() {
                match pending.next() {
                    Some(record) => in_flight.push(self.deliver_one(record, timeout)),
                    None => break,
                }
            }
            let Some(step) = in_flight.next().await else {
                break;
            };
            seen += 1;
            match step {
                Step::ClaimFailed => report.claim_failures += 1,
                Step::Offline => report.deferred_offline += 1,
                Step::Attempted {
                    outcome,
                    timed_out,
                    persisted,
                } => {
                    report.claimed += 1;
                    if timed_out {
                        self.stats.write().timeouts += 1;
                    }
                    match (outcome, persisted) {
                        (_, false) => report.persist_failures += 1,
                        (DeliveryOutcome::Success, true) => report.delivered += 1,
                        (DeliveryOutcome::TransientFailure, true) => {}
                    }
                    if outcome == DeliveryOutcome::TransientFailure {
                        report.failed += 1;
                    }
                }
            }
        }

        if seen < total {
            report.cancelled = true;
            info!(skipped = total - seen, "sweep cancelled, remaining records left queued");
        }
        info!(
            claimed = report.claimed,
            delivered = report.delivered,
            failed = report.failed,
            deferred_backoff = report.deferred_backoff,
            claim_failures = report.claim_failures,
            "sweep finished"
        );
        Ok(report)
    }

    fn is_due(&self, record: &Record, now: Instant) -> bool {
        match record.status() {
            RecordStatus::Queued => true,
            RecordStatus::Failed => self
                .next_eligible
                .lock()
                .get(&record.id())
                .map_or(true, |at| *at <= now),
            RecordStatus::Sending => false,
        }
    }

    /// Runs a store mutation, which fsyncs, on the blocking pool.
    async fn persist<F>(&self, op: F) -> DeliveryResult<()>
    where
        F: FnOnce(&RecordStore) -> CoreResult<()> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| CoreError::invalid_operation(format!("store task failed: {e}")))??;
        Ok(())
    }

    /// Claims, attempts and persists the outcome of one record.
    async fn deliver_one(&self, record: Record, timeout: Duration) -> Step {
        if !self.is_online() {
            return Step::Offline;
        }

        let claimed = record.claimed();
        let to_store = claimed.clone();
        if let Err(e) = self.persist(move |store| store.put(to_store)).await {
            error!(record_id = %record.id(), error = %e, "failed to claim record, skipping");
            self.stats.write().last_error = Some(e.to_string());
            return Step::ClaimFailed;
        }
        debug!(record_id = %claimed.id(), retry_count = claimed.retry_count(), "attempting delivery");

        let (outcome, timed_out) =
            match tokio::time::timeout(timeout, self.transport.attempt(&claimed)).await {
                Ok(outcome) => (outcome, false),
                Err(_) => {
                    warn!(
                        record_id = %claimed.id(),
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "attempt timed out"
                    );
                    (DeliveryOutcome::TransientFailure, true)
                }
            };
        let persisted = self.apply_outcome(&claimed, outcome).await;
        Step::Attempted {
            outcome,
            timed_out,
            persisted,
        }
    }

    /// Returns false if the outcome could not be persisted.
    async fn apply_outcome(&self, record: &Record, outcome: DeliveryOutcome) -> bool {
        let id = record.id();
        match outcome {
            DeliveryOutcome::Success => match self.persist(move |store| store.delete(id)).await {
                Ok(()) => {
                    self.next_eligible.lock().remove(&id);
                    info!(record_id = %id, "record delivered");
                    true
                }
                Err(e) => {
                    error!(record_id = %id, error = %e, "delivered record could not be removed");
                    self.stats.write().last_error = Some(e.to_string());
                    false
                }
            },
            DeliveryOutcome::TransientFailure => {
                let failed = record.failed();
                let to_store = failed.clone();
                match self.persist(move |store| store.put(to_store)).await {
                    Ok(()) => {
                        let delay = self.config.backoff.delay_for(failed.retry_count());
                        let at = Instant::now().checked_add(delay).unwrap_or_else(far_future);
                        self.next_eligible.lock().insert(failed.id(), at);
                        warn!(
                            record_id = %failed.id(),
                            retry_count = failed.retry_count(),
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "delivery failed, retry scheduled"
                        );
                        true
                    }
                    Err(e) => {
                        error!(record_id = %id, error = %e, "failed outcome could not be persisted");
                        self.stats.write().last_error = Some(e.to_string());
                        false
                    }
                }
            }
        }
    }
}

// Roughly thirty years out; far enough to mean "not in this process".
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365 * 30)
}

impl<T: Transport> std::fmt::Debug for DeliveryEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryEngine")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("online", &self.is_online())
            .finish_non_exhaustive()
    }
}

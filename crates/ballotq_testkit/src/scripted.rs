//! Deterministic transport: each record succeeds on its Nth attempt.

use ballotq_core::{Record, RecordId};
use ballotq_delivery::{DeliveryOutcome, Transport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Transport that fails every record transiently until its Nth attempt.
#[derive(Debug)]
pub struct ScriptedTransport {
    succeed_on: u32,
    latency: Option<Duration>,
    attempts: Mutex<HashMap<RecordId, u32>>,
}

impl ScriptedTransport {
    /// Succeeds on attempt `n` of each record (1 = first attempt).
    pub fn succeed_on(n: u32) -> Self {
        Self {
            succeed_on: n.max(1),
            latency: None,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Never succeeds.
    pub fn never() -> Self {
        Self::succeed_on(u32::MAX)
    }

    /// Delays every attempt by `latency` of tokio time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns how many attempts `id` received.
    pub fn attempts_for(&self, id: RecordId) -> u32 {
        self.attempts.lock().get(&id).copied().unwrap_or(0)
    }

    /// Returns the total number of attempts.
    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().values().sum()
    }
}

impl Transport for ScriptedTransport {
    async fn attempt(&self, record: &Record) -> DeliveryOutcome {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let n = attempts.entry(record.id()).or_default();
            *n += 1;
            *n
        };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if attempt >= self.succeed_on {
            DeliveryOutcome::Success
        } else {
            DeliveryOutcome::TransientFailure
        }
    }
}

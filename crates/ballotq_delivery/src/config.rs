//! Configuration for delivery and scheduling.

use rand::Rng;
use std::time::Duration;

/// Lowest jitter factor applied to a backoff delay.
pub const JITTER_MIN: f64 = 0.5;

/// Highest jitter factor applied to a backoff delay.
pub const JITTER_MAX: f64 = 1.5;

/// Retry backoff policy.
///
/// After a record's `k`-th failed attempt it becomes eligible again after
/// `base_delay * 2^k`, scaled by a random factor in
/// [`JITTER_MIN`, `JITTER_MAX`] so that many clients reconnecting at once
/// do not retry in lockstep. There is no cap on `k` and no maximum delay
/// besides `Duration::MAX`.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay unit the exponential schedule is built on.
    pub base_delay: Duration,
    /// Whether to scale each delay by a random jitter factor.
    pub jitter: bool,
}

impl BackoffConfig {
    /// Creates a backoff policy with the given base delay and jitter on.
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            jitter: true,
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns `base_delay * 2^retry_count * factor`, saturating at `Duration::MAX`.
    pub fn delay_with_factor(&self, retry_count: u32, factor: f64) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * 2f64.powi(exponent) * factor;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Returns the delay before a record with `retry_count` failures may be retried.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = if self.jitter {
            rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX)
        } else {
            1.0
        };
        self.delay_with_factor(retry_count, factor)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

/// Configuration for the delivery engine.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Retry backoff policy.
    pub backoff: BackoffConfig,
    /// Upper bound on a single transport attempt.
    pub attempt_timeout: Duration,
    /// Attempts in flight at once within one sweep.
    pub max_concurrent_attempts: usize,
}

impl DeliveryConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Sets how many attempts may be in flight at once (at least 1).
    pub fn with_max_concurrent_attempts(mut self, max: usize) -> Self {
        self.max_concurrent_attempts = max.max(1);
        self
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            attempt_timeout: Duration::from_secs(30),
            max_concurrent_attempts: 4,
        }
    }
}

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between periodic sweeps. Must be non-zero.
    pub period: Duration,
    /// Connectivity assumed when the scheduler starts.
    pub start_online: bool,
}

impl SchedulerConfig {
    /// Creates a scheduler configuration with the given period.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            start_online: true,
        }
    }

    /// Sets the sweep period.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Sets the initial connectivity.
    pub fn with_start_online(mut self, online: bool) -> Self {
        self.start_online = online;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

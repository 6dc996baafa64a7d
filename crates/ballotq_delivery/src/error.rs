//! Error types for the delivery engine.

use thiserror::Error;

/// Result type for delivery operations.
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Errors surfaced by the delivery engine and scheduler.
///
/// A failed delivery attempt is not one of these: it is an outcome the
/// engine handles itself by scheduling a retry.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The record store failed; the operation had no partial effect.
    #[error("record store error: {0}")]
    Store(#[from] ballotq_core::CoreError),

    /// Another sweep over the same store is still running.
    #[error("a sweep is already in progress")]
    SweepInProgress,

    /// The scheduler was started twice.
    #[error("scheduler is already running")]
    AlreadyRunning,

    /// The scheduler was stopped without being started.
    #[error("scheduler is not running")]
    NotRunning,

    /// A configuration value was rejected.
    #[error("invalid config: {message}")]
    InvalidConfig {
        /// What was wrong with it.
        message: String,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A record could not be encoded for the wire.
    #[error("codec error: {0}")]
    Codec(String),
}

impl DeliveryError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if retrying the whole operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { retryable, .. } => *retryable,
            Self::Store(e) => e.is_storage_unavailable(),
            Self::SweepInProgress => true,
            _ => false,
        }
    }
}

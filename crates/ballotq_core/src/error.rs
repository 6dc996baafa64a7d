//! Error types for BallotQ core.

use ballotq_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the record store and record log.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The storage medium could not complete a durable read or write.
    ///
    /// Nothing was changed. The whole operation may be retried later.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    /// A complete log frame failed structural validation.
    #[error("record log corruption at offset {offset}: {message}")]
    LogCorruption {
        /// Offset of the offending frame.
        offset: u64,
        /// What was wrong with it.
        message: String,
    },

    /// A complete log frame failed its checksum.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the offending frame.
        offset: u64,
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum computed over the frame.
        actual: u32,
    },

    /// A record payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Another store already holds the directory lock.
    #[error("queue directory locked: {} is held by another store", path.display())]
    QueueLocked {
        /// Path of the lock file.
        path: PathBuf,
    },

    /// The operation is not allowed in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why it was rejected.
        message: String,
    },
}

impl CoreError {
    /// Creates a log corruption error.
    pub fn log_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::LogCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates the error returned by a store that refused to accept more writes.
    pub fn poisoned(reason: impl Into<String>) -> Self {
        Self::StorageUnavailable(StorageError::Unavailable(reason.into()))
    }

    /// Returns true if the medium was unavailable and the caller may retry later.
    #[must_use]
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_classify_as_unavailable() {
        let err: CoreError = StorageError::Unavailable("disk gone".into()).into();
        assert!(err.is_storage_unavailable());
        assert!(CoreError::poisoned("rollback failed").is_storage_unavailable());
        assert!(!CoreError::log_corruption(0, "bad magic").is_storage_unavailable());
        let locked = CoreError::QueueLocked {
            path: PathBuf::from("/var/ballotq/LOCK"),
        };
        assert!(!locked.is_storage_unavailable());
        assert!(locked.to_string().contains("/var/ballotq/LOCK"));
    }

    #[test]
    fn display_includes_offsets() {
        let err = CoreError::ChecksumMismatch {
            offset: 42,
            expected: 0xdead_beef,
            actual: 0,
        };
        let text = err.to_string();
        assert!(text.contains("42"));
        assert!(text.contains("deadbeef"));
    }
}

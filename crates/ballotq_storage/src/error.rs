//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a [`crate::StorageBackend`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying medium failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read reached past the end of the store.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: usize,
        /// Store size at the time of the read.
        size: u64,
    },

    /// A truncation asked for a size larger than the store.
    #[error("cannot truncate to {requested} bytes, store holds {size}")]
    TruncateBeyondEnd {
        /// Requested size.
        requested: u64,
        /// Current size.
        size: u64,
    },

    /// The backend was shut down or deliberately made unavailable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store holding one record log.
///
/// The record log owns all framing and interpretation; a backend only moves
/// bytes. Every implementation must uphold:
///
/// - `append` writes at the current end and returns that offset
/// - `read_at` returns exactly the bytes previously appended there
/// - after `sync` returns `Ok`, every appended byte survives a crash
/// - `truncate` never grows the store
/// - `replace` is all-or-nothing: after a crash the store holds either the
///   old contents or the new contents, never a mix
///
/// Backends are `Send + Sync` so a store can be shared with async tasks.
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not fully
    /// inside the store, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    ///
    /// The bytes are not guaranteed durable until [`sync`](Self::sync).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. The store may then hold a torn
    /// prefix of `data`; callers roll back with [`truncate`](Self::truncate).
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Makes all appended data and the store length durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium refuses the sync.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current length, which is where the next append lands.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Shrinks the store to `new_size` bytes and syncs the new length.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` exceeds the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the entire contents with `data` and syncs.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement could not be made durable. On
    /// error the previous contents are still in place.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}

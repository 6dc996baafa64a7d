//! # BallotQ Storage
//!
//! Byte-level storage backends underneath the BallotQ record log.
//!
//! Backends know nothing about records, frames, or statuses. They hold a
//! single growable byte sequence and offer exactly the operations the record
//! log needs to stay crash-consistent:
//!
//! - append bytes at the end
//! - read bytes back at an offset
//! - make everything appended so far durable (`sync`)
//! - cut a torn tail off (`truncate`)
//! - swap the whole contents in one step (`replace`, used by compaction)
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - tests and throwaway queues
//! - [`FileBackend`] - a single file on disk, fsync'd on `sync`
//!
//! ## Example
//!
//! ```rust
//! use ballotq_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"queued vote").unwrap();
//! backend.sync().unwrap();
//! assert_eq!(backend.read_at(offset, 11).unwrap(), b"queued vote");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;

//! # BallotQ Core
//!
//! Records and durable storage for the BallotQ delivery queue.
//!
//! This crate provides:
//! - [`Record`], its identifiers and its integrity tag
//! - the [`Signer`] seam and an HMAC-SHA256 implementation
//! - the append-only record log and its replay
//! - [`RecordStore`], the crash-consistent store the delivery engine works on
//!
//! The store never changes a record on its own. Status and retry count are
//! decided by the delivery engine, which is the store's only writer.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod id;
pub mod log;
mod record;
mod signer;
mod store;

pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use id::{IdempotencyKey, RecordId};
pub use log::LogSummary;
pub use record::{signing_message, Record, RecordStatus};
pub use signer::{HmacSigner, IntegrityTag, Signer};
pub use store::{
    CompactionStats, RecordSnapshot, RecordStore, StatusCounts, LOCK_FILE_NAME, LOG_FILE_NAME,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

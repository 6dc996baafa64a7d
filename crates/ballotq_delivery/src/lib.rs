//! # BallotQ Delivery
//!
//! Drives queued records to a remote acceptor.
//!
//! This crate provides:
//! - [`DeliveryEngine`]: the per-record state machine and retry policy
//! - [`Scheduler`]: periodic and reconnect-triggered sweeps
//! - the [`Transport`] seam, with [`MockTransport`] for tests and
//!   [`HttpTransport`] for production
//!
//! ## Delivery guarantee
//!
//! Records are delivered at least once. Each carries an idempotency key, so
//! an acceptor that deduplicates on it counts every record exactly once.
//! A record leaves the local store only after an attempt succeeded.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ballotq_core::{HmacSigner, RecordStore, StoreConfig};
//! use ballotq_delivery::{
//!     DeliveryConfig, DeliveryEngine, HttpTransport, ReqwestClient, Scheduler, SchedulerConfig,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RecordStore::open("queue".as_ref(), StoreConfig::default())?);
//! let transport = HttpTransport::new(
//!     "https://acceptor.example.com",
//!     ReqwestClient::new(Duration::from_secs(30))?,
//! );
//! let signer = Arc::new(HmacSigner::new(b"shared secret")?);
//! let engine = Arc::new(DeliveryEngine::new(store, transport, signer, DeliveryConfig::default()));
//!
//! engine.cast()?;
//!
//! let scheduler = Scheduler::new(engine, SchedulerConfig::default());
//! scheduler.start()?;
//! // ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod http;
mod scheduler;
mod transport;

pub use config::{BackoffConfig, DeliveryConfig, SchedulerConfig, JITTER_MAX, JITTER_MIN};
pub use engine::{Connectivity, DeliveryEngine, DeliveryStats, SweepReport};
pub use error::{DeliveryError, DeliveryResult};
pub use http::{
    HttpClient, HttpRequest, HttpTransport, ReqwestClient, CBOR_CONTENT_TYPE, IDEMPOTENCY_HEADER,
    VOTES_PATH,
};
pub use scheduler::Scheduler;
pub use transport::{DeliveryOutcome, MockTransport, OfflineTransport, Transport};

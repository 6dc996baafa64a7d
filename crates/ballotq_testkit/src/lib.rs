//! # BallotQ Testkit
//!
//! Test utilities for BallotQ.
//!
//! This crate provides:
//! - [`FaultyBackend`]: a storage backend that fails on demand
//! - [`DedupAcceptor`] and [`AcceptorTransport`]: an in-process remote
//!   acceptor that verifies tags and counts each idempotency key once
//! - [`ScriptedTransport`]: succeeds on the Nth attempt of each record
//! - fixtures for temp-dir stores and fast-retry engines
//!
//! ## Usage
//!
//! ```rust
//! use ballotq_testkit::prelude::*;
//! use std::sync::Arc;
//!
//! let queue = TestQueue::memory();
//! let acceptor = Arc::new(DedupAcceptor::new(TEST_SECRET));
//! let engine = fast_engine(queue.store(), AcceptorTransport::new(Arc::clone(&acceptor)));
//! engine.cast().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod acceptor;
pub mod faulty;
pub mod fixtures;
pub mod scripted;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::acceptor::*;
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::scripted::*;
}

pub use acceptor::{AcceptDecision, AcceptorTransport, DedupAcceptor};
pub use faulty::{FaultInjector, FaultyBackend};
pub use fixtures::{fast_config, fast_engine, test_signer, TestQueue, TEST_SECRET};
pub use scripted::ScriptedTransport;

//! In-process remote acceptor.
//!
//! [`DedupAcceptor`] behaves like the server side of delivery: it checks
//! each record's integrity tag and counts every idempotency key at most
//! once. [`AcceptorTransport`] connects a delivery engine to it and can
//! simulate an unreachable acceptor or responses lost on the way back.

use ballotq_core::{HmacSigner, IdempotencyKey, Record, RecordId};
use ballotq_delivery::{DeliveryOutcome, Transport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What the acceptor did with one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptDecision {
    /// First delivery of this key; counted.
    Accepted,
    /// Key already counted; acknowledged without counting again.
    Duplicate,
    /// Integrity tag did not verify; not counted.
    Rejected,
}

#[derive(Debug, Default)]
struct Ledger {
    counted: HashMap<IdempotencyKey, RecordId>,
    received: HashMap<IdempotencyKey, usize>,
    rejected: usize,
}

/// A deduplicating acceptor keyed on idempotency keys.
#[derive(Debug)]
pub struct DedupAcceptor {
    verifier: HmacSigner,
    ledger: Mutex<Ledger>,
}

impl DedupAcceptor {
    /// Creates an acceptor sharing `secret` with the signing side.
    ///
    /// # Panics
    ///
    /// Panics if the secret is rejected by the MAC.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            verifier: HmacSigner::new(secret).expect("HMAC accepts keys of any size"),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Processes one delivery.
    pub fn accept(&self, record: &Record) -> AcceptDecision {
        let mut ledger = self.ledger.lock();
        *ledger.received.entry(record.idempotency_key()).or_default() += 1;

        if !self
            .verifier
            .verify(&record.signing_message(), record.integrity_tag())
        {
            ledger.rejected += 1;
            return AcceptDecision::Rejected;
        }
        if ledger.counted.contains_key(&record.idempotency_key()) {
            return AcceptDecision::Duplicate;
        }
        ledger.counted.insert(record.idempotency_key(), record.id());
        AcceptDecision::Accepted
    }

    /// Returns how many distinct records were counted.
    pub fn accepted_count(&self) -> usize {
        self.ledger.lock().counted.len()
    }

    /// Returns how many deliveries arrived, duplicates included.
    pub fn raw_count(&self) -> usize {
        self.ledger.lock().received.values().sum()
    }

    /// Returns how many deliveries of `key` arrived.
    pub fn received(&self, key: IdempotencyKey) -> usize {
        self.ledger.lock().received.get(&key).copied().unwrap_or(0)
    }

    /// Returns true if `key` was counted.
    pub fn is_counted(&self, key: IdempotencyKey) -> bool {
        self.ledger.lock().counted.contains_key(&key)
    }

    /// Returns how many deliveries failed verification.
    pub fn rejected_count(&self) -> usize {
        self.ledger.lock().rejected
    }
}

/// Transport delivering straight into a [`DedupAcceptor`].
#[derive(Debug)]
pub struct AcceptorTransport {
    acceptor: Arc<DedupAcceptor>,
    unreachable: AtomicUsize,
    lost_acks: AtomicUsize,
    attempts: AtomicUsize,
}

impl AcceptorTransport {
    /// Creates a transport to `acceptor`.
    pub fn new(acceptor: Arc<DedupAcceptor>) -> Self {
        Self {
            acceptor,
            unreachable: AtomicUsize::new(0),
            lost_acks: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Returns the acceptor.
    pub fn acceptor(&self) -> &Arc<DedupAcceptor> {
        &self.acceptor
    }

    /// Fails the next `count` attempts before they reach the acceptor.
    pub fn fail_next(&self, count: usize) {
        self.unreachable.store(count, Ordering::SeqCst);
    }

    /// Delivers the next `count` attempts but reports them as failed.
    ///
    /// Models a response lost on the way back: the acceptor has the
    /// record, the sender does not know it.
    pub fn lose_next_acks(&self, count: usize) {
        self.lost_acks.store(count, Ordering::SeqCst);
    }

    /// Returns how many attempts were made.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl Transport for AcceptorTransport {
    async fn attempt(&self, record: &Record) -> DeliveryOutcome {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.unreachable) {
            return DeliveryOutcome::TransientFailure;
        }

        let decision = self.acceptor.accept(record);
        if take_one(&self.lost_acks) {
            return DeliveryOutcome::TransientFailure;
        }
        match decision {
            AcceptDecision::Accepted | AcceptDecision::Duplicate => DeliveryOutcome::Success,
            AcceptDecision::Rejected => DeliveryOutcome::TransientFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{test_signer, TEST_SECRET};

    #[test]
    fn counts_each_key_once() {
        let acceptor = DedupAcceptor::new(TEST_SECRET);
        let record = Record::create(&*test_signer());

        assert_eq!(acceptor.accept(&record), AcceptDecision::Accepted);
        assert_eq!(acceptor.accept(&record), AcceptDecision::Duplicate);
        assert_eq!(acceptor.accept(&record.claimed().failed()), AcceptDecision::Duplicate);

        assert_eq!(acceptor.accepted_count(), 1);
        assert_eq!(acceptor.raw_count(), 3);
        assert_eq!(acceptor.received(record.idempotency_key()), 3);
        assert!(acceptor.is_counted(record.idempotency_key()));
    }

    #[test]
    fn rejects_foreign_signatures() {
        let acceptor = DedupAcceptor::new(b"other secret");
        let record = Record::create(&*test_signer());

        assert_eq!(acceptor.accept(&record), AcceptDecision::Rejected);
        assert_eq!(acceptor.accepted_count(), 0);
        assert_eq!(acceptor.rejected_count(), 1);
    }

    #[tokio::test]
    async fn lost_ack_still_counts() {
        let acceptor = Arc::new(DedupAcceptor::new(TEST_SECRET));
        let transport = AcceptorTransport::new(Arc::clone(&acceptor));
        let record = Record::create(&*test_signer());

        transport.lose_next_acks(1);
        assert_eq!(transport.attempt(&record).await, DeliveryOutcome::TransientFailure);
        assert!(acceptor.is_counted(record.idempotency_key()));

        assert_eq!(transport.attempt(&record).await, DeliveryOutcome::Success);
        assert_eq!(acceptor.accepted_count(), 1);
        assert_eq!(acceptor.raw_count(), 2);
    }

    #[tokio::test]
    async fn unreachable_never_arrives() {
        let acceptor = Arc::new(DedupAcceptor::new(TEST_SECRET));
        let transport = AcceptorTransport::new(Arc::clone(&acceptor));
        let record = Record::create(&*test_signer());

        transport.fail_next(2);
        assert_eq!(transport.attempt(&record).await, DeliveryOutcome::TransientFailure);
        assert_eq!(transport.attempt(&record).await, DeliveryOutcome::TransientFailure);
        assert_eq!(acceptor.raw_count(), 0);
        assert_eq!(transport.attempt(&record).await, DeliveryOutcome::Success);
        assert_eq!(transport.attempts(), 3);
    }
}

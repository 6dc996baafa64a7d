//! Queue records.

use crate::id::{IdempotencyKey, RecordId};
use crate::signer::{IntegrityTag, Signer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delivery state of a record.
///
/// There is no delivered state: a record that was delivered is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Cast and never attempted. Eligible immediately.
    Queued,
    /// Claimed by a sweep; an attempt is in flight.
    Sending,
    /// Last attempt failed. Eligible again once its backoff has elapsed.
    Failed,
}

impl RecordStatus {
    /// All statuses, in index order.
    pub const ALL: [RecordStatus; 3] = [Self::Queued, Self::Sending, Self::Failed];

    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queued" => Ok(Self::Queued),
            "sending" => Ok(Self::Sending),
            "failed" => Ok(Self::Failed),
            other => Err(format!(
                "unknown status '{other}', expected queued, sending or failed"
            )),
        }
    }
}

/// One cast vote waiting for delivery.
///
/// Identity fields are fixed at creation. Status and retry count change
/// only through the transition methods, each of which returns a new value
/// for the caller to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    id: RecordId,
    idempotency_key: IdempotencyKey,
    integrity_tag: IntegrityTag,
    status: RecordStatus,
    retry_count: u32,
}

impl Record {
    /// Creates a fresh `Queued` record with new identifiers, signed by `signer`.
    #[must_use]
    pub fn create(signer: &dyn Signer) -> Self {
        let id = RecordId::generate();
        let idempotency_key = IdempotencyKey::generate();
        let integrity_tag = signer.sign(&signing_message(&id, &idempotency_key));
        Self {
            id,
            idempotency_key,
            integrity_tag,
            status: RecordStatus::Queued,
            retry_count: 0,
        }
    }

    /// Returns the primary key.
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Returns the deduplication token.
    #[must_use]
    pub fn idempotency_key(&self) -> IdempotencyKey {
        self.idempotency_key
    }

    /// Returns the integrity tag.
    #[must_use]
    pub fn integrity_tag(&self) -> &IntegrityTag {
        &self.integrity_tag
    }

    /// Returns the delivery state.
    #[must_use]
    pub fn status(&self) -> RecordStatus {
        self.status
    }

    /// Returns how many attempts have failed.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns the bytes the integrity tag was computed over.
    #[must_use]
    pub fn signing_message(&self) -> [u8; 32] {
        signing_message(&self.id, &self.idempotency_key)
    }

    /// Returns true if a sweep may pick this record up (backoff aside).
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.status, RecordStatus::Queued | RecordStatus::Failed)
    }

    /// The record as claimed for an attempt.
    #[must_use]
    pub fn claimed(&self) -> Self {
        Self {
            status: RecordStatus::Sending,
            ..self.clone()
        }
    }

    /// The record after a failed attempt.
    #[must_use]
    pub fn failed(&self) -> Self {
        Self {
            status: RecordStatus::Failed,
            retry_count: self.retry_count.saturating_add(1),
            ..self.clone()
        }
    }

    /// The record after an attempt whose outcome was never recorded.
    ///
    /// Retry count is unchanged: nothing is known about the lost attempt.
    #[must_use]
    pub fn recovered(&self) -> Self {
        Self {
            status: RecordStatus::Failed,
            ..self.clone()
        }
    }
}

/// Returns `id ‖ idempotency_key` as raw bytes.
#[must_use]
pub fn signing_message(id: &RecordId, key: &IdempotencyKey) -> [u8; 32] {
    let mut message = [0u8; 32];
    message[..16].copy_from_slice(id.as_bytes());
    message[16..].copy_from_slice(key.as_bytes());
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::HmacSigner;

    fn signer() -> HmacSigner {
        HmacSigner::new(b"record-tests").unwrap()
    }

    #[test]
    fn create_is_queued_and_signed() {
        let signer = signer();
        let record = Record::create(&signer);

        assert_eq!(record.status(), RecordStatus::Queued);
        assert_eq!(record.retry_count(), 0);
        assert!(record.is_pending());
        assert!(signer.verify(&record.signing_message(), record.integrity_tag()));
    }

    #[test]
    fn create_generates_distinct_identity() {
        let signer = signer();
        let a = Record::create(&signer);
        let b = Record::create(&signer);
        assert_ne!(a.id(), b.id());
        assert_ne!(a.idempotency_key(), b.idempotency_key());
        assert_ne!(a.integrity_tag(), b.integrity_tag());
    }

    #[test]
    fn transitions_keep_identity() {
        let record = Record::create(&signer());

        let claimed = record.claimed();
        assert_eq!(claimed.status(), RecordStatus::Sending);
        assert!(!claimed.is_pending());
        assert_eq!(claimed.retry_count(), 0);

        let failed = claimed.failed();
        assert_eq!(failed.status(), RecordStatus::Failed);
        assert_eq!(failed.retry_count(), 1);
        assert!(failed.is_pending());

        let recovered = failed.claimed().recovered();
        assert_eq!(recovered.status(), RecordStatus::Failed);
        assert_eq!(recovered.retry_count(), 1);

        for r in [&claimed, &failed, &recovered] {
            assert_eq!(r.id(), record.id());
            assert_eq!(r.idempotency_key(), record.idempotency_key());
            assert_eq!(r.integrity_tag(), record.integrity_tag());
        }
    }

    #[test]
    fn signing_message_layout() {
        let record = Record::create(&signer());
        let message = record.signing_message();
        assert_eq!(&message[..16], record.id().as_bytes());
        assert_eq!(&message[16..], record.idempotency_key().as_bytes());
    }

    #[test]
    fn status_parse_and_display() {
        for status in RecordStatus::ALL {
            assert_eq!(status.to_string().parse::<RecordStatus>(), Ok(status));
        }
        assert_eq!("FAILED".parse::<RecordStatus>(), Ok(RecordStatus::Failed));
        assert!("confirmed".parse::<RecordStatus>().is_err());
    }

    #[test]
    fn cbor_roundtrip_preserves_record() {
        let record = Record::create(&signer()).claimed().failed();
        let mut buf = Vec::new();
        ciborium::into_writer(&record, &mut buf).unwrap();
        let back: Record = ciborium::from_reader(buf.as_slice()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn json_shows_display_fields() {
        let record = Record::create(&signer());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "queued");
        assert_eq!(value["retry_count"], 0);
        assert_eq!(value["id"], record.id().to_string());
        assert_eq!(value["idempotency_key"], record.idempotency_key().to_string());
    }
}

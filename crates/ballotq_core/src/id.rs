//! Record identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_newtype {
    ($name:ident) => {
        impl $name {
            /// Creates an identifier from raw bytes.
            #[inline]
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            /// Returns the raw bytes.
            #[inline]
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Returns the identifier as a UUID.
            #[must_use]
            pub const fn to_uuid(&self) -> Uuid {
                self.0
            }

            /// Creates an identifier from a slice.
            ///
            /// Returns `None` if the slice is not exactly 16 bytes.
            #[must_use]
            pub fn from_slice(slice: &[u8]) -> Option<Self> {
                Uuid::from_slice(slice).ok().map(Self)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Primary key of a queued record.
///
/// Generated as a UUIDv7, so ascending order follows creation time to
/// millisecond precision. The store lists records in this order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

uuid_newtype!(RecordId);

/// Token the remote acceptor uses to drop repeated deliveries.
///
/// Random (UUIDv4) so that it reveals nothing about when or where the
/// record was created.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    /// Generates a fresh key.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

uuid_newtype!(IdempotencyKey);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generate_is_unique() {
        let ids: HashSet<RecordId> = (0..1000).map(|_| RecordId::generate()).collect();
        assert_eq!(ids.len(), 1000);

        let keys: HashSet<IdempotencyKey> =
            (0..1000).map(|_| IdempotencyKey::generate()).collect();
        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn record_ids_follow_creation_order() {
        let first = RecordId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = RecordId::generate();
        assert!(first < second);
    }

    #[test]
    fn from_bytes_roundtrip() {
        let bytes = [7u8; 16];
        let id = RecordId::from_bytes(bytes);
        assert_eq!(*id.as_bytes(), bytes);
        assert_eq!(RecordId::from_slice(&bytes), Some(id));
        assert_eq!(RecordId::from_slice(&bytes[..15]), None);
    }

    #[test]
    fn display_and_parse() {
        let key = IdempotencyKey::generate();
        let text = key.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(text.parse::<IdempotencyKey>().unwrap(), key);
        assert!(format!("{key:?}").starts_with("IdempotencyKey("));
        assert!("not-a-uuid".parse::<RecordId>().is_err());
    }
}

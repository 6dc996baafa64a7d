//! Integrity tags.
//!
//! Every record carries a tag over its identity so the acceptor can tell
//! that the record it receives is the one that was cast. The core never
//! interprets the tag; it only stores and transmits it.

use crate::error::{CoreError, CoreResult};
use hmac::{Hmac, Mac};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Opaque signature bytes attached to a record.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct IntegrityTag(Vec<u8>);

impl IntegrityTag {
    /// Wraps raw signature bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the tag as lowercase hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for IntegrityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntegrityTag({})", self.to_hex())
    }
}

impl fmt::Display for IntegrityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Vec<u8>> for IntegrityTag {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

// Hex in human-readable formats (JSON listings), a byte string in CBOR.
impl Serialize for IntegrityTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for IntegrityTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagVisitor;

        impl<'de> Visitor<'de> for TagVisitor {
            type Value = IntegrityTag;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte string or a hex string")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(IntegrityTag(v.to_vec()))
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Ok(IntegrityTag(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                hex::decode(v).map(IntegrityTag).map_err(E::custom)
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(b) = seq.next_element::<u8>()? {
                    bytes.push(b);
                }
                Ok(IntegrityTag(bytes))
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(TagVisitor)
        } else {
            deserializer.deserialize_bytes(TagVisitor)
        }
    }
}

/// Produces integrity tags.
///
/// Implementations may be deterministic or not.
pub trait Signer: Send + Sync {
    /// Signs `message`.
    fn sign(&self, message: &[u8]) -> IntegrityTag;
}

/// HMAC-SHA256 signer over a shared secret.
///
/// The acceptor holds the same secret and checks tags with
/// [`HmacSigner::verify`].
#[derive(Clone)]
pub struct HmacSigner {
    mac: HmacSha256,
}

impl HmacSigner {
    /// Creates a signer keyed with `secret`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is rejected by the MAC.
    pub fn new(secret: &[u8]) -> CoreResult<Self> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| CoreError::invalid_operation(format!("bad signing key: {e}")))?;
        Ok(Self { mac })
    }

    /// Checks `tag` against `message` in constant time.
    #[must_use]
    pub fn verify(&self, message: &[u8], tag: &IntegrityTag) -> bool {
        let mut mac = self.mac.clone();
        mac.update(message);
        mac.verify_slice(tag.as_bytes()).is_ok()
    }
}

impl fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HmacSigner(..)")
    }
}

impl Signer for HmacSigner {
    fn sign(&self, message: &[u8]) -> IntegrityTag {
        let mut mac = self.mac.clone();
        mac.update(message);
        IntegrityTag(mac.finalize().into_bytes().to_vec())
    }
}

//! Record log frames.
//!
//! Every mutation of the store is one frame:
//!
//! ```text
//! magic "BQLG" (4) | version u16 LE | kind u8 | payload len u32 LE | payload | crc32 LE
//! ```
//!
//! The CRC covers header and payload. A `Put` payload is the CBOR-encoded
//! record; a `Delete` payload is the 16 raw bytes of the record id.

use crate::error::{CoreError, CoreResult};
use crate::id::RecordId;
use crate::record::Record;

/// Magic bytes opening every frame.
pub const LOG_MAGIC: [u8; 4] = *b"BQLG";

/// Current frame format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + length (4).
pub const HEADER_SIZE: usize = 11;

/// Trailing checksum size.
pub const CRC_SIZE: usize = 4;

/// Kind byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Insert or replace a record.
    Put = 1,
    /// Remove a record.
    Delete = 2,
}

impl FrameKind {
    /// Converts a byte to a frame kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            _ => None,
        }
    }

    /// Converts the frame kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One logged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOp {
    /// The full new state of a record.
    Put(Record),
    /// A record was removed.
    Delete(RecordId),
}

impl LogOp {
    /// Returns the frame kind.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Put(_) => FrameKind::Put,
            Self::Delete(_) => FrameKind::Delete,
        }
    }

    /// Returns the id of the record this op touches.
    #[must_use]
    pub fn record_id(&self) -> RecordId {
        match self {
            Self::Put(record) => record.id(),
            Self::Delete(id) => *id,
        }
    }

    /// Encodes the op as a complete frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or the payload
    /// does not fit the length field.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let payload = match self {
            Self::Put(record) => {
                let mut buf = Vec::with_capacity(128);
                ciborium::into_writer(record, &mut buf)
                    .map_err(|e| CoreError::Codec(e.to_string()))?;
                buf
            }
            Self::Delete(id) => id.as_bytes().to_vec(),
        };
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::Codec(format!("payload too large: {} bytes", payload.len())))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&LOG_MAGIC);
        frame.extend_from_slice(&LOG_VERSION.to_le_bytes());
        frame.push(self.kind().as_byte());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    /// Decodes a payload of the given kind.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the payload is malformed.
    pub fn decode(kind: FrameKind, payload: &[u8]) -> CoreResult<Self> {
        match kind {
            FrameKind::Put => ciborium::from_reader(payload)
                .map(Self::Put)
                .map_err(|e| CoreError::Codec(e.to_string())),
            FrameKind::Delete => RecordId::from_slice(payload).map(Self::Delete).ok_or_else(|| {
                CoreError::Codec(format!("delete payload is {} bytes, expected 16", payload.len()))
            }),
        }
    }
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}

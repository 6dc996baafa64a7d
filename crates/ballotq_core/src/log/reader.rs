//! Frame-by-frame log reading and replay.

use crate::error::{CoreError, CoreResult};
use crate::id::RecordId;
use crate::log::frame::{
    compute_crc32, FrameKind, LogOp, CRC_SIZE, HEADER_SIZE, LOG_MAGIC, LOG_VERSION,
};
use crate::record::{Record, RecordStatus};
use ballotq_storage::StorageBackend;
use std::collections::BTreeMap;

/// A decoded frame and where it sits in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Offset of the first header byte.
    pub offset: u64,
    /// Total frame length including header and checksum.
    pub len: u64,
    /// The logged mutation.
    pub op: LogOp,
}

/// Iterator over the frames of a log.
///
/// A trailing frame that is cut short, in its header or its body, ends the
/// iteration without error: that is what a crash in the middle of an
/// append leaves behind. A complete frame with a bad magic, an unknown
/// version or kind, or a checksum mismatch yields an error.
///
/// After iteration, [`valid_end`](Self::valid_end) is the length of the
/// log up to the last good frame.
pub struct LogReader<'a> {
    backend: &'a dyn StorageBackend,
    size: u64,
    offset: u64,
    finished: bool,
}

impl<'a> LogReader<'a> {
    /// Creates a reader over the whole log.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be read.
    pub fn new(backend: &'a dyn StorageBackend) -> CoreResult<Self> {
        Ok(Self {
            size: backend.size()?,
            backend,
            offset: 0,
            finished: false,
        })
    }

    /// Returns the end of the last frame read successfully.
    #[must_use]
    pub fn valid_end(&self) -> u64 {
        self.offset
    }

    /// Returns the total log length seen when the reader was created.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    fn read_next(&mut self) -> CoreResult<Option<LogEntry>> {
        let start = self.offset;
        let remaining = self.size - start;
        if remaining < HEADER_SIZE as u64 {
            return Ok(None);
        }

        let header = self.backend.read_at(start, HEADER_SIZE)?;
        if header[0..4] != LOG_MAGIC {
            return Err(CoreError::log_corruption(start, "invalid magic"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > LOG_VERSION {
            return Err(CoreError::log_corruption(
                start,
                format!("unsupported version {version}"),
            ));
        }
        let kind = FrameKind::from_byte(header[6]).ok_or_else(|| {
            CoreError::log_corruption(start, format!("unknown frame kind {}", header[6]))
        })?;
        let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]);

        let frame_len = (HEADER_SIZE + CRC_SIZE) as u64 + u64::from(payload_len);
        if remaining < frame_len {
            return Ok(None);
        }

        let body = self
            .backend
            .read_at(start + HEADER_SIZE as u64, payload_len as usize + CRC_SIZE)?;
        let (payload, crc_bytes) = body.split_at(payload_len as usize);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

        let mut checked = header;
        checked.extend_from_slice(payload);
        let actual = compute_crc32(&checked);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch {
                offset: start,
                expected,
                actual,
            });
        }

        let op = LogOp::decode(kind, payload)?;
        self.offset = start + frame_len;
        Ok(Some(LogEntry {
            offset: start,
            len: frame_len,
            op,
        }))
    }
}

impl Iterator for LogReader<'_> {
    type Item = CoreResult<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Statistics about a log, gathered by a full replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSummary {
    /// Total log length in bytes.
    pub log_bytes: u64,
    /// Number of complete frames.
    pub frames: u64,
    /// Number of `Put` frames.
    pub puts: u64,
    /// Number of `Delete` frames.
    pub deletes: u64,
    /// Records alive after replay.
    pub live_records: u64,
    /// Bytes taken by the frames that produced the live records.
    pub live_bytes: u64,
    /// Bytes of an incomplete trailing frame.
    pub torn_tail_bytes: u64,
    /// Live records in each status.
    pub by_status: BTreeMap<RecordStatus, u64>,
}

impl LogSummary {
    /// Replays the log without modifying it and summarizes it.
    ///
    /// # Errors
    ///
    /// Returns an error on a corrupted frame or a storage failure.
    pub fn scan(backend: &dyn StorageBackend) -> CoreResult<Self> {
        Ok(replay(backend)?.summary)
    }

    /// Returns the bytes a compaction would reclaim.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.log_bytes
            .saturating_sub(self.torn_tail_bytes)
            .saturating_sub(self.live_bytes)
    }
}

/// The state a log describes.
#[derive(Debug, Default)]
pub(crate) struct Replay {
    /// Live records and the length of the frame that last wrote each.
    pub records: BTreeMap<RecordId, (Record, u64)>,
    /// End of the last complete frame.
    pub valid_end: u64,
    pub summary: LogSummary,
}

pub(crate) fn replay(backend: &dyn StorageBackend) -> CoreResult<Replay> {
    let mut reader = LogReader::new(backend)?;
    let mut state = Replay::default();

    for entry in reader.by_ref() {
        let entry = entry?;
        state.summary.frames += 1;
        match entry.op {
            LogOp::Put(record) => {
                state.summary.puts += 1;
                state.records.insert(record.id(), (record, entry.len));
            }
            LogOp::Delete(id) => {
                state.summary.deletes += 1;
                state.records.remove(&id);
            }
        }
    }

    state.valid_end = reader.valid_end();
    state.summary.log_bytes = reader.size();
    state.summary.torn_tail_bytes = reader.size() - reader.valid_end();
    state.summary.live_records = state.records.len() as u64;
    for (record, len) in state.records.values() {
        state.summary.live_bytes += len;
        *state.summary.by_status.entry(record.status()).or_default() += 1;
    }
    Ok(state)
}

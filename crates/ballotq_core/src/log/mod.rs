//! Append-only record log.
//!
//! The store persists every mutation as one checksummed frame and rebuilds
//! its state by replaying the log on open.

mod frame;
mod reader;

pub use frame::{compute_crc32, FrameKind, LogOp, CRC_SIZE, HEADER_SIZE, LOG_MAGIC, LOG_VERSION};
pub use reader::{LogEntry, LogReader, LogSummary};

pub(crate) use reader::replay;

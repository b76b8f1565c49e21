//! Write-ahead log
//!
//! - **Segment-based storage**: the log is split into segments (`wal-NNNNNN.seg`)
//! - **Self-delimiting records**: each record has a length prefix and CRC32
//! - **Durability modes**: Always, Standard, Cache
//! - **Crash recovery**: readers stop cleanly at a torn or corrupt tail
//!
//! ```text
//! wal/
//! ├── wal-000001.seg   (closed, immutable)
//! ├── wal-000002.seg   (closed, immutable)
//! └── wal-000003.seg   (active, writable)
//! ```
//!
//! Each record carries one committed [`WriteBatch`] together with the
//! sequence number of its first operation.

mod durability;
pub mod reader;
pub mod writer;

pub use durability::DurabilityMode;
pub use reader::WalIterator;
pub(crate) use reader::{list_segments, purge_segments, read_segment};
pub(crate) use writer::WalWriter;

use crate::batch::WriteBatch;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the segments, relative to the store root.
pub(crate) const WAL_DIR: &str = "wal";

pub(crate) fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("wal-{:06}.seg", id))
}

pub(crate) fn parse_segment_name(name: &str) -> Option<u64> {
    name.strip_prefix("wal-")?.strip_suffix(".seg")?.parse().ok()
}

/// Owned form of a WAL record, produced by readers.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WalRecord {
    pub(crate) sequence: u64,
    pub(crate) batch: WriteBatch,
}

impl WalRecord {
    /// Sequence number of the last op in the batch.
    pub(crate) fn last_sequence(&self) -> u64 {
        self.sequence + (self.batch.len() as u64).saturating_sub(1)
    }
}

/// Borrowed form of a WAL record, serialized by the writer.
#[derive(Serialize)]
pub(crate) struct WalRecordRef<'a> {
    pub(crate) sequence: u64,
    pub(crate) batch: &'a WriteBatch,
}

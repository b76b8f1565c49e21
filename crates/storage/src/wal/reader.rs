//! Reading WAL segments back: recovery, tailing and retention

use super::{parse_segment_name, segment_path, WalRecord};
use crate::batch::WriteBatch;
use crate::record::{decode_record, Frame, RECORD_BATCH};
use ndb_core::{Error, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

/// Records decoded from one segment.
#[derive(Debug, Default)]
pub(crate) struct SegmentContents {
    pub(crate) records: Vec<WalRecord>,
    /// The segment ends in a partial or corrupt record.
    pub(crate) torn: bool,
}

/// Segment ids present in `dir`, ascending.
pub(crate) fn list_segments(dir: &Path) -> Result<Vec<u64>> {
    let mut ids = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        if let Some(id) = entry.file_name().to_str().and_then(parse_segment_name) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Decode every complete record in a segment.
///
/// Decoding stops at the first partial or corrupt record; everything before
/// it is returned.
pub(crate) fn read_segment(path: &Path) -> Result<SegmentContents> {
    let bytes = std::fs::read(path)?;
    let mut contents = SegmentContents::default();
    let mut offset = 0;

    while offset < bytes.len() {
        match decode_record(&bytes[offset..]) {
            Frame::Record {
                tag,
                payload,
                consumed,
            } => {
                if tag != RECORD_BATCH {
                    warn!(target: "ndb::wal", path = %path.display(), offset, tag, "unknown WAL record type");
                    contents.torn = true;
                    break;
                }
                match bincode::deserialize::<WalRecord>(payload) {
                    Ok(record) => contents.records.push(record),
                    Err(e) => {
                        warn!(target: "ndb::wal", path = %path.display(), offset, error = %e, "undecodable WAL record");
                        contents.torn = true;
                        break;
                    }
                }
                offset += consumed;
            }
            Frame::Truncated => {
                contents.torn = true;
                break;
            }
            Frame::Corrupt(msg) => {
                warn!(target: "ndb::wal", path = %path.display(), offset, reason = %msg, "corrupt WAL record");
                contents.torn = true;
                break;
            }
        }
    }
    Ok(contents)
}

/// Delete checkpointed segments that fall outside the retention window.
///
/// Only segments with id below `covered_below` are candidates. A candidate is
/// removed when it is older than `ttl`, or while the total size of the log
/// exceeds `size_limit` (oldest first). Returns the number of segments removed.
pub(crate) fn purge_segments(
    dir: &Path,
    covered_below: u64,
    ttl: Duration,
    size_limit: u64,
) -> Result<usize> {
    let now = SystemTime::now();
    let mut segments = Vec::new();
    let mut total: u64 = 0;
    for id in list_segments(dir)? {
        let path = segment_path(dir, id);
        let meta = std::fs::metadata(&path)?;
        total += meta.len();
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        segments.push((id, path, meta.len(), age));
    }

    let mut removed = 0;
    for (id, path, len, age) in segments {
        if id >= covered_below {
            break;
        }
        if age >= ttl || total > size_limit {
            std::fs::remove_file(&path)?;
            total -= len;
            removed += 1;
        }
    }
    if removed > 0 {
        info!(target: "ndb::wal", removed, retained_bytes = total, "purged WAL segments");
    }
    Ok(removed)
}

/// Iterator over committed batches, oldest first.
///
/// Yields `(sequence, batch)` where `sequence` is the sequence number of the
/// first op in the batch. Segments are read lazily; a segment purged while
/// the iterator is open surfaces as an error.
pub struct WalIterator {
    dir: PathBuf,
    segments: VecDeque<u64>,
    pending: VecDeque<WalRecord>,
    since: u64,
}

impl WalIterator {
    pub(crate) fn open(dir: PathBuf, since: u64, latest: u64) -> Result<Self> {
        let segments = list_segments(&dir)?.into_iter().collect();
        let mut it = Self {
            dir,
            segments,
            pending: VecDeque::new(),
            since,
        };

        while it.pending.is_empty() && it.fill()? {}
        let available = match it.pending.front() {
            Some(first) => since >= first.sequence || first.sequence <= 1,
            None => since > latest || latest == 0,
        };
        if !available {
            return Err(Error::storage(format!(
                "sequence {} is no longer available in the write-ahead log",
                since
            )));
        }
        Ok(it)
    }

    /// Load the next segment into `pending`. Returns false when none remain.
    fn fill(&mut self) -> Result<bool> {
        let id = match self.segments.pop_front() {
            Some(id) => id,
            None => return Ok(false),
        };
        let path = segment_path(&self.dir, id);
        let contents = read_segment(&path).map_err(|e| match e {
            Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                Error::storage(format!("WAL segment {} was purged", id))
            }
            other => other,
        })?;
        self.pending.extend(contents.records);
        Ok(true)
    }
}

impl Iterator for WalIterator {
    type Item = Result<(u64, WriteBatch)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                if record.last_sequence() < self.since {
                    continue;
                }
                return Some(Ok((record.sequence, record.batch)));
            }
            match self.fill() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => {
                    self.segments.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

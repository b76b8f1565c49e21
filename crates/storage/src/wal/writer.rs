//! Appends records to the active WAL segment

use super::{segment_path, DurabilityMode, WalRecordRef};
use crate::batch::WriteBatch;
use crate::record::{encode_record, RECORD_BATCH};
use ndb_core::Result;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;

/// Writer for the active segment.
///
/// Every append is flushed to the operating system before returning; the
/// durability mode only decides when the segment is fsynced.
pub(crate) struct WalWriter {
    dir: PathBuf,
    mode: DurabilityMode,
    segment_size: u64,
    segment_id: u64,
    file: BufWriter<File>,
    segment_bytes: u64,
    writes_since_sync: usize,
    last_sync: Instant,
}

impl WalWriter {
    /// Open (creating if needed) segment `segment_id` in `dir`.
    pub(crate) fn open(
        dir: PathBuf,
        segment_id: u64,
        mode: DurabilityMode,
        segment_size: u64,
    ) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let (file, segment_bytes) = open_segment(&dir, segment_id)?;
        Ok(Self {
            dir,
            mode,
            segment_size,
            segment_id,
            file,
            segment_bytes,
            writes_since_sync: 0,
            last_sync: Instant::now(),
        })
    }

    /// Append one batch, returning the number of bytes written.
    pub(crate) fn append(&mut self, sequence: u64, batch: &WriteBatch) -> Result<u64> {
        let payload = bincode::serialize(&WalRecordRef { sequence, batch })?;
        let record = encode_record(RECORD_BATCH, &payload);
        self.file.write_all(&record)?;
        self.file.flush()?;

        let written = record.len() as u64;
        self.segment_bytes += written;
        self.writes_since_sync += 1;
        self.maybe_sync()?;

        if self.segment_bytes >= self.segment_size {
            self.rotate()?;
        }
        Ok(written)
    }

    fn maybe_sync(&mut self) -> Result<()> {
        let due = match self.mode {
            DurabilityMode::Always => true,
            DurabilityMode::Standard {
                interval_ms,
                batch_size,
            } => {
                self.writes_since_sync >= batch_size
                    || self.last_sync.elapsed() >= Duration::from_millis(interval_ms)
            }
            DurabilityMode::Cache => false,
        };
        if due {
            self.sync()?;
        }
        Ok(())
    }

    /// fsync the active segment.
    pub(crate) fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_data()?;
        self.writes_since_sync = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Close the active segment and start the next one.
    ///
    /// Returns the id of the new active segment.
    pub(crate) fn rotate(&mut self) -> Result<u64> {
        self.sync()?;
        let next = self.segment_id + 1;
        let (file, segment_bytes) = open_segment(&self.dir, next)?;
        self.file = file;
        self.segment_bytes = segment_bytes;
        self.segment_id = next;
        debug!(target: "ndb::wal", segment = next, "rotated WAL segment");
        Ok(next)
    }
}

fn open_segment(dir: &std::path::Path, id: u64) -> Result<(BufWriter<File>, u64)> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(segment_path(dir, id))?;
    let len = file.metadata()?.len();
    Ok((BufWriter::new(file), len))
}

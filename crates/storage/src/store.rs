//! The store: column families, the write path, recovery and checkpoints
//!
//! # On-disk layout
//!
//! ```text
//! <path>/
//! ├── LOCK          (exclusive advisory lock)
//! ├── MANIFEST      (column family catalog)
//! ├── CHECKPOINT    (image of every family at one sequence)
//! └── wal/
//!     └── wal-NNNNNN.seg
//! ```
//!
//! # Recovery
//!
//! 1. Load the MANIFEST (or create it)
//! 2. Load the CHECKPOINT, if any
//! 3. Replay WAL batches with a sequence above the checkpoint, skipping ops
//!    for families that are no longer in the catalog
//! 4. Start a fresh WAL segment
//!
//! # Lock order
//!
//! WAL writer, then the family catalog, then family tables in id order.

use crate::batch::{BatchOp, WriteBatch};
use crate::compaction::scheduler::{CompactionScheduler, Job};
use crate::compaction::{compact_family, CompactionStats, Victims};
use crate::cursor::Cursor;
use crate::family::{ColumnFamily, FamilyStats, Slot, Table};
use crate::manifest::{Checkpoint, FamilyImage, Manifest};
use crate::options::{ColumnFamilyDescriptor, StoreOptions};
use crate::wal::{
    list_segments, purge_segments, read_segment, segment_path, WalIterator, WalWriter, WAL_DIR,
};
use fs2::FileExt;
use ndb_core::{Error, Result};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use smallvec::{smallvec, SmallVec};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const LOCK_FILE: &str = "LOCK";

struct Families {
    manifest: Manifest,
    by_id: BTreeMap<u32, Arc<ColumnFamily>>,
}

#[derive(Default)]
pub(crate) struct WriteOutcome {
    sequence: u64,
    compact: SmallVec<[u32; 4]>,
    checkpoint: bool,
}

pub(crate) struct StoreInner {
    path: PathBuf,
    wal_dir: PathBuf,
    options: StoreOptions,
    wal: Mutex<WalWriter>,
    sequence: AtomicU64,
    families: RwLock<Families>,
    checkpoint_lock: Mutex<()>,
    wal_bytes_since_checkpoint: AtomicU64,
    running_compactions: AtomicUsize,
    _lock_file: File,
}

/// An embedded, ordered, byte-keyed store with column families.
///
/// All methods take `&self`; share a store between threads with `Arc<Store>`.
/// Dropping the store stops its background workers and writes a final
/// checkpoint.
pub struct Store {
    inner: Arc<StoreInner>,
    scheduler: CompactionScheduler,
}

impl Store {
    /// Open the store at `path`.
    ///
    /// Families named in `descriptors` that do not exist yet are created.
    /// Existing families without a descriptor open without a compaction
    /// filter.
    pub fn open(
        path: impl AsRef<Path>,
        options: StoreOptions,
        descriptors: Vec<ColumnFamilyDescriptor>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            if !options.create_if_missing {
                return Err(Error::InvalidArgument(format!(
                    "database '{}' does not exist",
                    path.display()
                )));
            }
            std::fs::create_dir_all(&path)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path.join(LOCK_FILE))?;
        lock_file.try_lock_exclusive().map_err(|e| {
            Error::storage(format!(
                "database '{}' is locked by another process: {}",
                path.display(),
                e
            ))
        })?;

        let mut manifest = match Manifest::load(&path)? {
            Some(manifest) => manifest,
            None => {
                let manifest = Manifest::default();
                manifest.store(&path)?;
                manifest
            }
        };
        let mut catalog_changed = false;
        for desc in &descriptors {
            if !manifest.contains(&desc.name) {
                manifest.add(&desc.name);
                catalog_changed = true;
            }
        }
        if catalog_changed {
            manifest.store(&path)?;
        }

        let mut by_id = BTreeMap::new();
        for (id, name) in &manifest.families {
            let factory = descriptors
                .iter()
                .find(|d| &d.name == name)
                .and_then(|d| d.filter_factory.clone());
            by_id.insert(*id, Arc::new(ColumnFamily::new(*id, name.clone(), factory)));
        }

        let mut sequence = 0;
        let mut first_live_segment = 1;
        if let Some(checkpoint) = Checkpoint::load(&path)? {
            sequence = checkpoint.sequence;
            first_live_segment = checkpoint.first_live_segment;
            for image in checkpoint.families {
                if let Some(family) = by_id.get(&image.id) {
                    let mut table = family.table.write();
                    for (key, value) in image.entries {
                        table.insert(key, Slot { value, seq: 0 });
                    }
                }
            }
        }
        let checkpoint_sequence = sequence;

        let wal_dir = path.join(WAL_DIR);
        let segments = list_segments(&wal_dir)?;
        let mut replayed = 0u64;
        for &id in &segments {
            let contents = read_segment(&segment_path(&wal_dir, id))?;
            for record in contents.records {
                if record.sequence <= checkpoint_sequence {
                    continue;
                }
                sequence = sequence.max(record.last_sequence());
                replay_batch(&by_id, record.sequence, record.batch);
                replayed += 1;
            }
            if contents.torn {
                warn!(target: "ndb::wal", segment = id, "WAL segment ends in a torn record; ignoring the tail");
            }
        }

        let next_segment = segments
            .last()
            .map_or(1, |id| id + 1)
            .max(first_live_segment);
        let writer = WalWriter::open(
            wal_dir.clone(),
            next_segment,
            options.durability,
            options.segment_size,
        )?;

        info!(
            target: "ndb::storage",
            path = %path.display(),
            families = by_id.len(),
            checkpoint_sequence,
            replayed,
            sequence,
            "opened store"
        );

        let background_threads = options.background_threads;
        let inner = Arc::new(StoreInner {
            path,
            wal_dir,
            options,
            wal: Mutex::new(writer),
            sequence: AtomicU64::new(sequence),
            families: RwLock::new(Families { manifest, by_id }),
            checkpoint_lock: Mutex::new(()),
            wal_bytes_since_checkpoint: AtomicU64::new(0),
            running_compactions: AtomicUsize::new(0),
            _lock_file: lock_file,
        });
        let scheduler = CompactionScheduler::start(background_threads, Arc::downgrade(&inner))?;

        Ok(Self { inner, scheduler })
    }

    /// Names of the column families of the store at `path`.
    ///
    /// Returns an empty list if no store exists there yet.
    pub fn list_column_families(path: impl AsRef<Path>) -> Result<Vec<String>> {
        Ok(Manifest::load(path.as_ref())?
            .map(|m| m.families.into_iter().map(|(_, name)| name).collect())
            .unwrap_or_default())
    }

    /// Directory the store lives in.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Options the store was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// Create a new column family.
    pub fn create_column_family(&self, desc: ColumnFamilyDescriptor) -> Result<Arc<ColumnFamily>> {
        let mut families = self.inner.families.write();
        if families.manifest.contains(&desc.name) {
            return Err(Error::InvalidArgument(format!(
                "column family '{}' already exists",
                desc.name
            )));
        }
        let mut manifest = families.manifest.clone();
        let id = manifest.add(&desc.name);
        manifest.store(&self.inner.path)?;
        families.manifest = manifest;

        let family = Arc::new(ColumnFamily::new(id, desc.name, desc.filter_factory));
        families.by_id.insert(id, Arc::clone(&family));
        info!(target: "ndb::storage", family = family.name(), id, "created column family");
        Ok(family)
    }

    /// Drop a column family and discard its data.
    pub fn drop_column_family(&self, family: &ColumnFamily) -> Result<()> {
        if family.id() == 0 {
            return Err(Error::InvalidArgument(
                "the default column family cannot be dropped".to_string(),
            ));
        }
        let mut families = self.inner.families.write();
        if !families.by_id.contains_key(&family.id()) {
            return Err(Error::storage(format!(
                "column family '{}' does not exist",
                family.name()
            )));
        }
        let mut manifest = families.manifest.clone();
        manifest.remove(family.id());
        manifest.store(&self.inner.path)?;
        families.manifest = manifest;

        if let Some(dropped) = families.by_id.remove(&family.id()) {
            dropped.mark_dropped();
        }
        info!(target: "ndb::storage", family = family.name(), id = family.id(), "dropped column family");
        Ok(())
    }

    /// Look up a family by name.
    pub fn column_family(&self, name: &str) -> Option<Arc<ColumnFamily>> {
        self.inner
            .families
            .read()
            .by_id
            .values()
            .find(|f| f.name() == name)
            .cloned()
    }

    /// All live families, ordered by id.
    pub fn column_families(&self) -> Vec<Arc<ColumnFamily>> {
        self.inner.families.read().by_id.values().cloned().collect()
    }

    /// Point read.
    pub fn get(&self, family: &ColumnFamily, key: &[u8]) -> Result<Option<Vec<u8>>> {
        family.ensure_live()?;
        Ok(family.table.read().get(key).map(|slot| slot.value.clone()))
    }

    /// Read several keys, possibly across families.
    ///
    /// The read locks of every involved family are held together, so the
    /// answers come from a single point in the commit order.
    pub fn multi_get(&self, reads: &[(&ColumnFamily, &[u8])]) -> Vec<Result<Option<Vec<u8>>>> {
        let mut involved: SmallVec<[&ColumnFamily; 4]> = SmallVec::new();
        for (family, _) in reads {
            if !involved.iter().any(|f| f.id() == family.id()) {
                involved.push(*family);
            }
        }
        involved.sort_by_key(|f| f.id());
        let tables: SmallVec<[(u32, RwLockReadGuard<'_, Table>); 4]> = involved
            .iter()
            .map(|f| (f.id(), f.table.read()))
            .collect();

        reads
            .iter()
            .map(|(family, key)| {
                family.ensure_live()?;
                Ok(tables
                    .iter()
                    .find(|(id, _)| *id == family.id())
                    .and_then(|(_, table)| table.get(*key))
                    .map(|slot| slot.value.clone()))
            })
            .collect()
    }

    /// Single-key put.
    pub fn put(&self, family: &ColumnFamily, key: &[u8], value: &[u8]) -> Result<u64> {
        let mut batch = WriteBatch::new();
        batch.put(family, key, value);
        self.write(batch)
    }

    /// Single-key delete.
    pub fn delete(&self, family: &ColumnFamily, key: &[u8]) -> Result<u64> {
        let mut batch = WriteBatch::new();
        batch.delete(family, key);
        self.write(batch)
    }

    /// Commit a batch atomically. Returns the sequence of its first op.
    ///
    /// The batch is logged, then applied while the write locks of every
    /// family it touches are held, so no reader can observe part of it.
    pub fn write(&self, batch: WriteBatch) -> Result<u64> {
        let outcome = self.inner.write(batch)?;
        for id in outcome.compact {
            self.scheduler.schedule(Job::Compact(id));
        }
        if outcome.checkpoint {
            if self.scheduler.has_workers() {
                self.scheduler.schedule(Job::Checkpoint);
            } else if let Err(e) = self.inner.checkpoint() {
                warn!(target: "ndb::storage", error = %e, "checkpoint failed");
            }
        }
        Ok(outcome.sequence)
    }

    /// A cursor over `family`.
    pub fn cursor(&self, family: &Arc<ColumnFamily>) -> Cursor {
        Cursor::new(Arc::clone(family))
    }

    /// Run a compaction pass over `[begin, end]` of `family` now, then
    /// checkpoint so the removals survive a restart.
    pub fn compact_range(
        &self,
        family: &ColumnFamily,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<CompactionStats> {
        family.ensure_live()?;
        let stats = self.inner.compact(family, begin, end, true)?;
        self.inner.checkpoint()?;
        Ok(stats)
    }

    /// Write a checkpoint and purge covered WAL segments.
    ///
    /// Returns the sequence the checkpoint covers.
    pub fn checkpoint(&self) -> Result<u64> {
        self.inner.checkpoint()
    }

    /// fsync the active WAL segment.
    pub fn flush_wal(&self) -> Result<()> {
        self.inner.wal.lock().sync()
    }

    /// Sequence number of the most recently committed op.
    pub fn latest_sequence(&self) -> u64 {
        self.inner.sequence.load(Ordering::Acquire)
    }

    /// Committed batches whose ops reach `sequence` or later.
    ///
    /// Fails if `sequence` has already been purged from the log.
    pub fn updates_since(&self, sequence: u64) -> Result<WalIterator> {
        WalIterator::open(
            self.inner.wal_dir.clone(),
            sequence,
            self.latest_sequence(),
        )
    }

    /// Size statistics for one family.
    pub fn family_stats(&self, family: &ColumnFamily) -> FamilyStats {
        family.stats()
    }

    /// Compaction passes currently executing.
    pub fn running_compactions(&self) -> usize {
        self.inner.running_compactions.load(Ordering::Relaxed)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.scheduler.shutdown();
        if let Err(e) = self.inner.checkpoint() {
            warn!(target: "ndb::storage", error = %e, "final checkpoint failed");
        }
    }
}

impl StoreInner {
    fn resolve(&self, batch: &WriteBatch) -> Result<SmallVec<[Arc<ColumnFamily>; 4]>> {
        let families = self.families.read();
        let mut out: SmallVec<[Arc<ColumnFamily>; 4]> = SmallVec::new();
        for op in batch.ops() {
            if out.iter().any(|f| f.id() == op.cf()) {
                continue;
            }
            match families.by_id.get(&op.cf()) {
                Some(family) => out.push(Arc::clone(family)),
                None => {
                    return Err(Error::storage(format!(
                        "column family {} does not exist",
                        op.cf()
                    )))
                }
            }
        }
        out.sort_by_key(|f| f.id());
        Ok(out)
    }

    fn write(&self, batch: WriteBatch) -> Result<WriteOutcome> {
        if batch.is_empty() {
            return Ok(WriteOutcome {
                sequence: self.sequence.load(Ordering::Acquire),
                ..WriteOutcome::default()
            });
        }

        let mut wal = self.wal.lock();
        let families = self.resolve(&batch)?;
        let first = self.sequence.load(Ordering::Acquire) + 1;
        let written = log_batch(&mut wal, first, &batch)?;

        let count = batch.len() as u64;
        let mut per_family: SmallVec<[u64; 4]> = smallvec![0; families.len()];
        {
            let mut tables: SmallVec<[RwLockWriteGuard<'_, Table>; 4]> =
                families.iter().map(|f| f.table.write()).collect();
            for (i, op) in batch.into_ops().into_iter().enumerate() {
                if let Some(pos) = families.iter().position(|f| f.id() == op.cf()) {
                    per_family[pos] += 1;
                    apply_op(&mut tables[pos], op, first + i as u64);
                }
            }
        }
        self.sequence.store(first + count - 1, Ordering::Release);
        let since_checkpoint =
            self.wal_bytes_since_checkpoint.fetch_add(written, Ordering::Relaxed) + written;
        drop(wal);

        let trigger = self.options.compaction_trigger;
        let mut outcome = WriteOutcome {
            sequence: first,
            compact: SmallVec::new(),
            checkpoint: since_checkpoint >= self.options.checkpoint_threshold,
        };
        for (family, n) in families.iter().zip(per_family) {
            let total = family.note_writes(n);
            if trigger > 0 && total >= trigger {
                outcome.compact.push(family.id());
            }
        }
        Ok(outcome)
    }

    fn compact(
        &self,
        family: &ColumnFamily,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
        manual: bool,
    ) -> Result<CompactionStats> {
        let started = Instant::now();
        self.running_compactions.fetch_add(1, Ordering::Relaxed);
        let result = compact_family(family, begin, end, manual, |family, victims| {
            self.remove_unchanged(family, victims)
        });
        self.running_compactions.fetch_sub(1, Ordering::Relaxed);
        let stats = result?;
        info!(
            target: "ndb::compaction",
            family = family.name(),
            manual,
            examined = stats.examined,
            removed = stats.removed,
            raced = stats.raced,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compaction pass finished"
        );
        Ok(stats)
    }

    /// Remove every victim whose slot still holds the sequence the filter
    /// saw, logging the removals as one WAL batch first.
    ///
    /// Returns `(removed, raced)`.
    fn remove_unchanged(&self, family: &ColumnFamily, victims: Victims) -> Result<(u64, u64)> {
        let mut wal = self.wal.lock();
        if family.is_dropped() {
            return Ok((0, 0));
        }
        let mut table = family.table.write();

        let mut batch = WriteBatch::new();
        let mut raced = 0;
        for (key, seq) in victims {
            match table.get(&key) {
                Some(slot) if slot.seq == seq => batch.delete(family, &key),
                _ => raced += 1,
            }
        }
        if batch.is_empty() {
            return Ok((0, raced));
        }

        let first = self.sequence.load(Ordering::Acquire) + 1;
        let written = log_batch(&mut wal, first, &batch)?;
        let removed = batch.len() as u64;
        for (i, op) in batch.into_ops().into_iter().enumerate() {
            apply_op(&mut table, op, first + i as u64);
        }
        self.sequence.store(first + removed - 1, Ordering::Release);
        self.wal_bytes_since_checkpoint
            .fetch_add(written, Ordering::Relaxed);
        Ok((removed, raced))
    }

    pub(crate) fn checkpoint(&self) -> Result<u64> {
        let _serial = self.checkpoint_lock.lock();
        let started = Instant::now();

        let checkpoint = {
            let mut wal = self.wal.lock();
            let families = self.families.read();
            let images = families
                .by_id
                .values()
                .map(|family| FamilyImage {
                    id: family.id(),
                    entries: family
                        .table
                        .read()
                        .iter()
                        .map(|(k, slot)| (k.clone(), slot.value.clone()))
                        .collect(),
                })
                .collect();
            let sequence = self.sequence.load(Ordering::Acquire);
            let first_live_segment = wal.rotate()?;
            self.wal_bytes_since_checkpoint.store(0, Ordering::Relaxed);
            Checkpoint {
                sequence,
                first_live_segment,
                families: images,
            }
        };
        checkpoint.store(&self.path)?;

        purge_segments(
            &self.wal_dir,
            checkpoint.first_live_segment,
            Duration::from_secs(self.options.wal_ttl_seconds),
            self.options.wal_size_limit,
        )?;
        debug!(
            target: "ndb::storage",
            sequence = checkpoint.sequence,
            segment = checkpoint.first_live_segment,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "checkpoint written"
        );
        Ok(checkpoint.sequence)
    }

    pub(crate) fn run_job(&self, job: Job) {
        match job {
            Job::Compact(id) => {
                let family = self.families.read().by_id.get(&id).cloned();
                if let Some(family) = family {
                    if let Err(e) = self.compact(&family, None, None, false) {
                        warn!(target: "ndb::compaction", family = family.name(), error = %e, "background compaction failed");
                    }
                }
            }
            Job::Checkpoint => {
                if let Err(e) = self.checkpoint() {
                    warn!(target: "ndb::storage", error = %e, "background checkpoint failed");
                }
            }
        }
    }
}

/// Append `batch` as the record starting at sequence `first`.
fn log_batch(wal: &mut WalWriter, first: u64, batch: &WriteBatch) -> Result<u64> {
    wal.append(first, batch).map_err(|e| {
        // Keep later records out of a segment that may now end in garbage.
        if let Err(rotate_err) = wal.rotate() {
            warn!(target: "ndb::wal", error = %rotate_err, "WAL rotation after failed append failed");
        }
        e
    })
}

fn apply_op(table: &mut Table, op: BatchOp, seq: u64) {
    match op {
        BatchOp::Put { key, value, .. } => {
            table.insert(key, Slot { value, seq });
        }
        BatchOp::Delete { key, .. } => {
            table.remove(key.as_slice());
        }
    }
}

fn replay_batch(families: &BTreeMap<u32, Arc<ColumnFamily>>, first: u64, batch: WriteBatch) {
    for (i, op) in batch.into_ops().into_iter().enumerate() {
        if let Some(family) = families.get(&op.cf()) {
            apply_op(&mut family.table.write(), op, first + i as u64);
        }
    }
}

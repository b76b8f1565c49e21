//! Namespaces: isolated keyspaces backed by one column family each
//!
//! Keys passed to a namespace are raw storage keys. Callers that store
//! collections build meta keys and member keys with [`crate::encode`]
//! themselves.
//!
//! Reads always decode through [`Value::decode`], so a record that is
//! present but deleted or expired is reported as [`Error::NotFound`] no
//! matter how it was written.

use crate::iterator::{Direction, RangeIterator};
use crate::stats::Stats;
use crate::value::{Configs, Value};
use ndb_core::{Error, Result};
use ndb_storage::{ColumnFamily, CompactionStats, Store, WriteBatch};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Reserved key holding the namespace defaults.
pub const CONFIGS_KEY: &[u8] = b"namespace.__configs__";

/// One keyspace partition.
pub struct Namespace {
    store: Arc<Store>,
    family: Arc<ColumnFamily>,
    configs: RwLock<Configs>,
}

impl Namespace {
    pub(crate) fn new(store: Arc<Store>, family: Arc<ColumnFamily>) -> Self {
        Self {
            store,
            family,
            configs: RwLock::new(Configs::default()),
        }
    }

    pub fn name(&self) -> &str {
        self.family.name()
    }

    pub(crate) fn family(&self) -> &ColumnFamily {
        &self.family
    }

    /// Cached namespace defaults.
    pub fn configs(&self) -> Configs {
        self.configs.read().clone()
    }

    /// Persist new defaults, then publish them.
    pub fn put_configs(&self, configs: &Configs) -> Result<()> {
        let encoded = configs.encode()?;
        let mut cached = self.configs.write();
        self.store.put(&self.family, CONFIGS_KEY, &encoded)?;
        *cached = configs.clone();
        debug!(target: "ndb::namespace", namespace = self.name(), ?configs, "stored configs");
        Ok(())
    }

    /// Reload the defaults from storage. A namespace without stored
    /// defaults keeps the empty set.
    pub fn load_configs(&self) -> Result<()> {
        let mut cached = self.configs.write();
        if let Some(bytes) = self.store.get(&self.family, CONFIGS_KEY)? {
            *cached = Configs::decode(&bytes).map_err(|e| {
                error!(target: "ndb::namespace", namespace = self.name(), error = %e, "unreadable configs");
                e
            })?;
        }
        Ok(())
    }

    pub fn put(&self, id: &[u8], value: &Value) -> Result<()> {
        self.store.put(&self.family, id, &value.encode()?)?;
        Ok(())
    }

    pub fn delete(&self, id: &[u8]) -> Result<()> {
        self.store.delete(&self.family, id)?;
        Ok(())
    }

    /// Read and decode `id`.
    pub fn get(&self, id: &[u8]) -> Result<Value> {
        let mut value = Value::default();
        self.get_into(id, &mut value)?;
        Ok(value)
    }

    /// Read and decode `id` into `value`.
    ///
    /// On [`Error::NotFound`] for a tombstoned or expired collection,
    /// `value` holds the empty root of the next generation, ready to be
    /// filled and written back. Otherwise a miss leaves `value` empty.
    pub fn get_into(&self, id: &[u8], value: &mut Value) -> Result<()> {
        *value = Value::default();
        let bytes = self.store.get(&self.family, id)?.ok_or(Error::NotFound)?;
        self.decode_into(id, &bytes, value)
    }

    /// Read several ids at once. Each answer is independent of the others
    /// and in the order of `ids`.
    pub fn multi_get<K: AsRef<[u8]>>(&self, ids: &[K]) -> Vec<Result<Value>> {
        let reads: Vec<(&ColumnFamily, &[u8])> = ids
            .iter()
            .map(|id| (self.family.as_ref(), id.as_ref()))
            .collect();
        self.store
            .multi_get(&reads)
            .into_iter()
            .zip(ids)
            .map(|(res, id)| match res? {
                Some(bytes) => self.decode(id.as_ref(), &bytes),
                None => Err(Error::NotFound),
            })
            .collect()
    }

    /// A windowed scan over `[begin, end]`. Empty bounds are open.
    ///
    /// `limit == 0` means no limit. The iterator must be positioned with
    /// [`RangeIterator::seek`] before use.
    pub fn range_get(
        &self,
        begin: &[u8],
        end: &[u8],
        offset: usize,
        limit: usize,
        reverse: bool,
    ) -> RangeIterator {
        let direction = if reverse {
            Direction::Backward
        } else {
            Direction::Forward
        };
        RangeIterator::new(
            self.store.cursor(&self.family),
            direction,
            begin,
            end,
            offset,
            limit,
        )
    }

    /// Force a compaction pass over `[begin, end]`. Empty bounds are open.
    pub fn compact_range(&self, begin: &[u8], end: &[u8]) -> Result<CompactionStats> {
        fn bound(b: &[u8]) -> Option<&[u8]> {
            (!b.is_empty()).then_some(b)
        }
        self.store
            .compact_range(&self.family, bound(begin), bound(end))
    }

    pub fn stats(&self) -> Stats {
        let family = self.store.family_stats(&self.family);
        let mut stats = Stats::new();
        stats.insert("name", self.name());
        stats.insert("num_keys", family.num_keys);
        stats.insert("data_size", family.data_size);
        stats.insert("writes_since_compaction", family.writes_since_compaction);
        stats.insert("num_running_compactions", self.store.running_compactions() as u64);
        stats
    }

    /// Start an atomic batch confined to this namespace.
    pub fn batch(self: &Arc<Self>) -> NsBatch {
        NsBatch {
            ns: Arc::clone(self),
            batch: WriteBatch::new(),
        }
    }

    pub(crate) fn decode(&self, id: &[u8], bytes: &[u8]) -> Result<Value> {
        let mut value = Value::default();
        self.decode_into(id, bytes, &mut value)?;
        Ok(value)
    }

    fn decode_into(&self, id: &[u8], bytes: &[u8], value: &mut Value) -> Result<()> {
        match value.decode(bytes) {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_corruption() {
                    error!(
                        target: "ndb::namespace",
                        namespace = self.name(),
                        id = %String::from_utf8_lossy(id),
                        error = %e,
                        "undecodable value"
                    );
                }
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.name())
            .field("configs", &*self.configs.read())
            .finish()
    }
}

/// Puts and deletes on one namespace, committed as one indivisible write.
pub struct NsBatch {
    ns: Arc<Namespace>,
    batch: WriteBatch,
}

impl NsBatch {
    pub fn put(&mut self, id: &[u8], value: &Value) -> Result<()> {
        let encoded = value.encode()?;
        self.batch.put(&self.ns.family, id, &encoded);
        Ok(())
    }

    /// Store `value` as-is, without the envelope.
    pub fn put_raw(&mut self, id: &[u8], value: &[u8]) {
        self.batch.put(&self.ns.family, id, value);
    }

    pub fn delete(&mut self, id: &[u8]) {
        self.batch.delete(&self.ns.family, id);
    }

    /// Encoded size of the operations gathered so far.
    pub fn data_size(&self) -> usize {
        self.batch.data_size()
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Write every gathered operation atomically. An empty batch is a no-op.
    pub fn commit(self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        self.ns.store.write(self.batch)?;
        Ok(())
    }
}

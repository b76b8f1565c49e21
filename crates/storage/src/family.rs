//! Column families: independently ordered keyspaces inside one store

use crate::filter::CompactionFilterFactory;
use ndb_core::{Error, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A stored value plus the sequence number of the write that produced it.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub(crate) value: Vec<u8>,
    pub(crate) seq: u64,
}

pub(crate) type Table = BTreeMap<Vec<u8>, Slot>;

/// Point-in-time size information for one column family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FamilyStats {
    /// Number of live keys
    pub num_keys: u64,
    /// Sum of key and value lengths
    pub data_size: u64,
    /// Writes applied since the last compaction pass
    pub writes_since_compaction: u64,
}

/// Handle to a column family.
///
/// Handles stay usable after the family is dropped, but every operation on
/// a dropped family fails with a storage error.
pub struct ColumnFamily {
    id: u32,
    name: String,
    pub(crate) table: RwLock<Table>,
    dropped: AtomicBool,
    writes_since_compaction: AtomicU64,
    filter_factory: Option<Arc<dyn CompactionFilterFactory>>,
}

impl ColumnFamily {
    pub(crate) fn new(
        id: u32,
        name: String,
        filter_factory: Option<Arc<dyn CompactionFilterFactory>>,
    ) -> Self {
        Self {
            id,
            name,
            table: RwLock::new(BTreeMap::new()),
            dropped: AtomicBool::new(false),
            writes_since_compaction: AtomicU64::new(0),
            filter_factory,
        }
    }

    /// Numeric id (stable for the lifetime of the family).
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Family name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the family has been dropped.
    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dropped(&self) {
        self.dropped.store(true, Ordering::Release);
        self.table.write().clear();
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.is_dropped() {
            return Err(Error::storage(format!(
                "column family '{}' has been dropped",
                self.name
            )));
        }
        Ok(())
    }

    pub(crate) fn filter_factory(&self) -> Option<&Arc<dyn CompactionFilterFactory>> {
        self.filter_factory.as_ref()
    }

    /// Record `n` applied writes, returning the running total.
    pub(crate) fn note_writes(&self, n: u64) -> u64 {
        self.writes_since_compaction.fetch_add(n, Ordering::Relaxed) + n
    }

    pub(crate) fn reset_writes(&self) {
        self.writes_since_compaction.store(0, Ordering::Relaxed);
    }

    /// Collect size statistics.
    pub fn stats(&self) -> FamilyStats {
        let table = self.table.read();
        let data_size = table
            .iter()
            .map(|(k, slot)| (k.len() + slot.value.len()) as u64)
            .sum();
        FamilyStats {
            num_keys: table.len() as u64,
            data_size,
            writes_since_compaction: self.writes_since_compaction.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for ColumnFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnFamily")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dropped", &self.is_dropped())
            .field(
                "filter_factory",
                &self.filter_factory.as_ref().map(|f| f.name().to_string()),
            )
            .finish()
    }
}

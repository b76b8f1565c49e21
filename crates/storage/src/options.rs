//! Store and column family options

use crate::filter::CompactionFilterFactory;
use crate::wal::DurabilityMode;
use std::fmt;
use std::sync::Arc;

/// Name of the column family that always exists.
pub const DEFAULT_COLUMN_FAMILY: &str = "default";

/// Options for [`Store::open`](crate::Store::open).
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Create the directory and catalog if they do not exist.
    pub create_if_missing: bool,
    /// When appended WAL records are fsynced.
    pub durability: DurabilityMode,
    /// Closed WAL segments older than this are purged once checkpointed.
    pub wal_ttl_seconds: u64,
    /// Checkpointed WAL segments are purged while the log exceeds this size.
    pub wal_size_limit: u64,
    /// A WAL segment is closed once it grows past this size.
    pub segment_size: u64,
    /// WAL bytes since the last checkpoint that trigger a new checkpoint.
    pub checkpoint_threshold: u64,
    /// Worker threads for background compaction and checkpoints (0 disables).
    pub background_threads: usize,
    /// Writes to one family that schedule a background compaction (0 disables).
    pub compaction_trigger: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            durability: DurabilityMode::default(),
            wal_ttl_seconds: 3600,
            wal_size_limit: 1 << 30,
            segment_size: 64 << 20,
            checkpoint_threshold: 64 << 20,
            background_threads: 4,
            compaction_trigger: 100_000,
        }
    }
}

/// Name plus optional compaction filter for a column family.
#[derive(Clone)]
pub struct ColumnFamilyDescriptor {
    /// Family name
    pub name: String,
    /// Filter consulted by every compaction pass over the family
    pub filter_factory: Option<Arc<dyn CompactionFilterFactory>>,
}

impl ColumnFamilyDescriptor {
    /// A descriptor without a compaction filter.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter_factory: None,
        }
    }

    /// Attach a compaction filter factory.
    pub fn with_filter_factory(mut self, factory: Arc<dyn CompactionFilterFactory>) -> Self {
        self.filter_factory = Some(factory);
        self
    }
}

impl fmt::Debug for ColumnFamilyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnFamilyDescriptor")
            .field("name", &self.name)
            .field(
                "filter_factory",
                &self.filter_factory.as_ref().map(|f| f.name().to_string()),
            )
            .finish()
    }
}

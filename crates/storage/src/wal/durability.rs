//! Durability mode for WAL writes.

/// Controls when appended WAL records are fsynced to disk.
///
/// Every mode writes the record to the operating system before `write`
/// returns, so WAL readers always observe committed batches. The modes only
/// differ in how much can be lost on power failure.
///
/// | Mode | fsync | Loss window on crash |
/// |------|-------|----------------------|
/// | Always | every batch | none |
/// | Standard | every N batches or T ms | up to N batches / T ms |
/// | Cache | never (checkpoint and close only) | everything since the last sync |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// fsync after every batch.
    Always,

    /// fsync every `batch_size` batches OR every `interval_ms` milliseconds.
    Standard {
        /// Maximum time between fsyncs in milliseconds
        interval_ms: u64,
        /// Maximum batches between fsyncs
        batch_size: usize,
    },

    /// Leave syncing to the operating system.
    Cache,
}

impl DurabilityMode {
    /// Check if this mode requires an fsync on every batch.
    pub fn requires_immediate_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Always)
    }

    /// Human-readable description of the mode.
    pub fn description(&self) -> &'static str {
        match self {
            DurabilityMode::Always => "fsync every batch (safest, slowest)",
            DurabilityMode::Standard { .. } => "periodic fsync (balanced)",
            DurabilityMode::Cache => "no fsync (fastest, may lose recent writes)",
        }
    }

    /// `Standard { interval_ms: 100, batch_size: 1000 }`.
    pub fn standard_default() -> Self {
        DurabilityMode::Standard {
            interval_ms: 100,
            batch_size: 1000,
        }
    }
}

impl Default for DurabilityMode {
    fn default() -> Self {
        Self::standard_default()
    }
}

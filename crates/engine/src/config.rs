//! Engine configuration via `ndb.toml`
//!
//! On first open a commented default `ndb.toml` is written into the database
//! directory. To change settings, edit the file and restart.

use crate::hashlock::DEFAULT_HASHLOCK_SIZE;
use ndb_core::{Error, Result};
use ndb_storage::{DurabilityMode, StoreOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed in the database directory.
pub const CONFIG_FILE_NAME: &str = "ndb.toml";

/// Engine configuration loaded from `ndb.toml`.
///
/// Every field is optional in the file and falls back to its default.
///
/// # Example
///
/// ```toml
/// durability = "standard"
/// wal_ttl_seconds = 3600
/// background_threads = 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `"standard"`, `"always"` or `"cache"`.
    pub durability: String,
    /// Checkpointed WAL segments older than this are purged.
    pub wal_ttl_seconds: u64,
    /// Checkpointed WAL segments are purged while the log is larger.
    pub wal_size_limit: u64,
    /// WAL bytes written since the last checkpoint that trigger a new one.
    pub memtable_size: u64,
    /// Entries in each namespace's compaction meta cache.
    pub compaction_cache_size: usize,
    /// Background compaction and checkpoint workers.
    pub background_threads: usize,
    /// Writes to one namespace that schedule a background compaction.
    pub compaction_trigger: u64,
    /// Slots in the hash lock table.
    pub hashlock_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            durability: "standard".to_string(),
            wal_ttl_seconds: 3600,
            wal_size_limit: 1 << 30,
            memtable_size: 64 << 20,
            compaction_cache_size: 1 << 20,
            background_threads: 4,
            compaction_trigger: 100_000,
            hashlock_size: DEFAULT_HASHLOCK_SIZE,
        }
    }
}

impl EngineConfig {
    /// Parse the durability string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"standard"`, `"always"` or
    /// `"cache"`.
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        match self.durability.as_str() {
            "standard" => Ok(DurabilityMode::standard_default()),
            "always" => Ok(DurabilityMode::Always),
            "cache" => Ok(DurabilityMode::Cache),
            other => Err(Error::InvalidArgument(format!(
                "invalid durability mode '{}' in {}, expected \"standard\", \"always\" or \"cache\"",
                other, CONFIG_FILE_NAME
            ))),
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.durability_mode()?;
        if self.hashlock_size == 0 {
            return Err(Error::InvalidArgument(
                "hashlock_size must be at least 1".to_string(),
            ));
        }
        if self.compaction_cache_size == 0 {
            return Err(Error::InvalidArgument(
                "compaction_cache_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Store options derived from this config.
    pub fn store_options(&self) -> Result<StoreOptions> {
        Ok(StoreOptions {
            durability: self.durability_mode()?,
            wal_ttl_seconds: self.wal_ttl_seconds,
            wal_size_limit: self.wal_size_limit,
            checkpoint_threshold: self.memtable_size,
            background_threads: self.background_threads,
            compaction_trigger: self.compaction_trigger,
            ..StoreOptions::default()
        })
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# ndb engine configuration
#
# Durability mode: "standard" (default), "always" or "cache"
#   "standard" = periodic fsync (~100ms), may lose the last interval on crash
#   "always"   = fsync every commit
#   "cache"    = leave syncing to the operating system
durability = "standard"

# Write-ahead log retention once a checkpoint covers it.
wal_ttl_seconds = 3600
wal_size_limit = 1073741824

# WAL bytes between checkpoints.
memtable_size = 67108864

# Collection roots remembered per namespace during compaction.
compaction_cache_size = 1048576

# Background compaction workers (0 = compact only on request).
background_threads = 4

# Writes to one namespace that schedule a compaction pass.
compaction_trigger = 100000

# Slots in the per-key lock table.
hashlock_size = 1000000
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::storage(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            Error::InvalidArgument(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::storage(format!(
                    "failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::storage(format!(
                "failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

//! Application context
//!
//! [`Context`] is built once at startup and handed by reference to every
//! component that needs another one. Construction order is fixed: config,
//! then the engine (store and namespaces), then the hash lock.

use ndb_core::{Error, Result};
use ndb_engine::{Engine, EngineConfig, HashLock, CONFIG_FILE_NAME};
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything a server process shares across connections.
pub struct Context {
    dir: PathBuf,
    engine: Engine,
    hashlock: HashLock,
}

impl Context {
    /// Open the database directory `dir`, creating it if needed.
    ///
    /// The engine options come from `ndb.toml` inside `dir`; a default file
    /// is written on first open.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::storage(format!(
                "failed to create database directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        let config_path = dir.join(CONFIG_FILE_NAME);
        EngineConfig::write_default_if_missing(&config_path)?;
        let config = EngineConfig::from_file(&config_path)?;
        Self::with_config(dir, config)
    }

    /// Open `dir` with an explicit config, ignoring any `ndb.toml`.
    pub fn with_config(dir: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let hashlock_size = config.hashlock_size;
        let engine = Engine::open(&dir, config)?;
        let hashlock = HashLock::new(hashlock_size);
        info!(
            target: "ndb::engine",
            dir = %dir.display(),
            hashlock_slots = hashlock.len(),
            "context ready"
        );
        Ok(Self {
            dir,
            engine,
            hashlock,
        })
    }

    /// Database directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Lock table serializing read-modify-write commands per key.
    pub fn hashlock(&self) -> &HashLock {
        &self.hashlock
    }

    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    /// Checkpoint and release the database.
    pub fn close(self) -> Result<()> {
        let sequence = self.engine.checkpoint()?;
        info!(target: "ndb::engine", sequence, "context closed");
        Ok(())
    }
}

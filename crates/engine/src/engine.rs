//! The engine: one store, many namespaces
//!
//! Every column family of the store is a namespace. Each family is opened
//! with a [`NamespaceFilterFactory`] so compaction collects that namespace's
//! garbage.
//!
//! Namespaces live in a shared table. The filter factories hold a weak
//! handle to it, which keeps the store from owning (through its families)
//! the namespaces that own the store.

use crate::compaction::{NamespaceFilterFactory, NamespaceMap};
use crate::config::EngineConfig;
use crate::iterator::WalTailer;
use crate::namespace::Namespace;
use crate::stats::Stats;
use crate::value::Value;
use dashmap::DashMap;
use ndb_core::{Error, Result};
use ndb_storage::{ColumnFamily, ColumnFamilyDescriptor, Store, WriteBatch, DEFAULT_COLUMN_FAMILY};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Owns the store and the namespace table.
pub struct Engine {
    store: Arc<Store>,
    namespaces: Arc<NamespaceMap>,
    config: EngineConfig,
    ddl: Mutex<()>,
}

impl Engine {
    /// Open (or create) the database at `path`.
    ///
    /// Every existing namespace is opened and its stored defaults loaded.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let path = path.as_ref();
        config.validate()?;

        let mut names = Store::list_column_families(path)?;
        if names.is_empty() {
            names.push(DEFAULT_COLUMN_FAMILY.to_string());
        }

        let namespaces: Arc<NamespaceMap> = Arc::new(DashMap::new());
        let descriptors = names
            .iter()
            .map(|name| Self::descriptor(name, &namespaces, &config))
            .collect();
        let store = Arc::new(Store::open(path, config.store_options()?, descriptors)?);

        for family in store.column_families() {
            let ns = Arc::new(Namespace::new(Arc::clone(&store), family));
            ns.load_configs()?;
            namespaces.insert(ns.name().to_string(), ns);
        }

        info!(
            target: "ndb::engine",
            path = %path.display(),
            namespaces = namespaces.len(),
            sequence = store.latest_sequence(),
            "engine opened"
        );
        Ok(Self {
            store,
            namespaces,
            config,
            ddl: Mutex::new(()),
        })
    }

    fn descriptor(
        name: &str,
        namespaces: &Arc<NamespaceMap>,
        config: &EngineConfig,
    ) -> ColumnFamilyDescriptor {
        let factory = NamespaceFilterFactory::new(
            name,
            Arc::downgrade(namespaces),
            config.compaction_cache_size,
        );
        ColumnFamilyDescriptor::new(name).with_filter_factory(Arc::new(factory))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying store, for WAL access and maintenance.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Names of every namespace, sorted.
    pub fn list_namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn namespace(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Create a namespace. Fails if it already exists.
    pub fn create_namespace(&self, name: &str) -> Result<Arc<Namespace>> {
        let _ddl = self.ddl.lock();
        if self.namespaces.contains_key(name) {
            return Err(Error::InvalidArgument(format!(
                "namespace '{}' already exists",
                name
            )));
        }
        let family = self
            .store
            .create_column_family(Self::descriptor(name, &self.namespaces, &self.config))?;
        let ns = Arc::new(Namespace::new(Arc::clone(&self.store), family));
        self.namespaces.insert(name.to_string(), Arc::clone(&ns));
        info!(target: "ndb::engine", namespace = name, "created namespace");
        Ok(ns)
    }

    /// Drop a namespace and its data. Dropping a missing namespace succeeds.
    pub fn drop_namespace(&self, name: &str) -> Result<()> {
        let _ddl = self.ddl.lock();
        let Some(ns) = self.namespace(name) else {
            return Ok(());
        };
        self.store.drop_column_family(ns.family())?;
        self.namespaces.remove(name);
        info!(target: "ndb::engine", namespace = name, "dropped namespace");
        Ok(())
    }

    /// Read ids from several namespaces at once. Each answer is independent
    /// and in the order of `reads`.
    pub fn multi_get(&self, reads: &[(&Namespace, &[u8])]) -> Vec<Result<Value>> {
        let raw: Vec<(&ColumnFamily, &[u8])> =
            reads.iter().map(|(ns, id)| (ns.family(), *id)).collect();
        self.store
            .multi_get(&raw)
            .into_iter()
            .zip(reads)
            .map(|(res, (ns, id))| match res? {
                Some(bytes) => ns.decode(id, &bytes),
                None => Err(Error::NotFound),
            })
            .collect()
    }

    /// Start an atomic batch that may span namespaces.
    pub fn batch(&self) -> Batch {
        Batch {
            store: Arc::clone(&self.store),
            batch: WriteBatch::new(),
        }
    }

    /// A tailer over the write-ahead log.
    pub fn new_wal_iterator(&self) -> WalTailer {
        WalTailer::new(Arc::clone(&self.store))
    }

    /// Write a checkpoint so recovery does not need the WAL written so far.
    pub fn checkpoint(&self) -> Result<u64> {
        self.store.checkpoint()
    }

    pub fn stats(&self) -> Stats {
        let mut stats = Stats::new();
        let (mut num_keys, mut data_size) = (0u64, 0u64);
        for family in self.store.column_families() {
            let fs = self.store.family_stats(&family);
            num_keys += fs.num_keys;
            data_size += fs.data_size;
        }
        stats.insert("dbname", self.store.path().display().to_string());
        stats.insert("sequence", self.store.latest_sequence());
        stats.insert("num_namespaces", self.namespaces.len() as u64);
        stats.insert("num_keys", num_keys);
        stats.insert("data_size", data_size);
        stats.insert(
            "num_running_compactions",
            self.store.running_compactions() as u64,
        );
        stats
    }
}

/// Puts and deletes across namespaces, committed as one indivisible write.
pub struct Batch {
    store: Arc<Store>,
    batch: WriteBatch,
}

impl Batch {
    pub fn put(&mut self, ns: &Namespace, id: &[u8], value: &Value) -> Result<()> {
        let encoded = value.encode()?;
        self.batch.put(ns.family(), id, &encoded);
        Ok(())
    }

    /// Store `value` as-is, without the envelope.
    pub fn put_raw(&mut self, ns: &Namespace, id: &[u8], value: &[u8]) {
        self.batch.put(ns.family(), id, value);
    }

    pub fn delete(&mut self, ns: &Namespace, id: &[u8]) {
        self.batch.delete(ns.family(), id);
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
        self.store.write(self.batch)?;
        Ok(())
    }
}

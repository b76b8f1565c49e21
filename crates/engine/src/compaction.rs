//! Compaction-time garbage collection
//!
//! Truncating a collection only rewrites its root record (new version or
//! `deleted` flag); the members of the old generation stay on disk. This
//! filter runs inside the store's compaction passes and removes them.
//!
//! # Decisions
//!
//! | Record | Verdict |
//! |--------|---------|
//! | reserved configs key | keep |
//! | scalar (key without NUL) | remove iff deleted or expired |
//! | member key | remove iff its parent is gone, has a newer version, or tombstoned this generation |
//! | collection root | remove iff no key of its current generation (or later) exists |
//! | anything undecodable | keep |
//!
//! A key is classified by its first NUL, and a well-formed member prefix
//! wins over a bare root. Ids that themselves contain NUL can therefore be
//! read as members of a shorter id.
//!
//! A parent lookup that fails for any reason other than "not found" keeps
//! the member. While a root exists its version only grows, so a record
//! judged garbage stays garbage and racing with foreground writes is safe.
//! Removals are logged by the store, so recovery never brings them back.
//!
//! # Meta cache
//!
//! Many members share one parent, so resolved `(deleted, version)` pairs are
//! kept in a bounded LRU. Each pass starts with an empty cache: a root may
//! be rewritten as a scalar or removed between passes, and a stale entry
//! would then judge the members of a recreated collection. A miss falls back
//! to a point read.

use crate::encode::{decode_prefix, encode_prefix};
use crate::namespace::{Namespace, CONFIGS_KEY};
use crate::value::Value;
use dashmap::DashMap;
use ndb_storage::{CompactionFilter, CompactionFilterFactory, Decision, FilterContext};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// Resolved state of a collection root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaState {
    pub deleted: bool,
    pub version: u64,
}

struct Lru {
    entries: FxHashMap<Vec<u8>, (MetaState, u64)>,
    recency: BTreeMap<u64, Vec<u8>>,
    tick: u64,
}

/// Bounded LRU of [`MetaState`] keyed by meta key.
pub struct MetaCache {
    capacity: usize,
    inner: Mutex<Lru>,
}

impl MetaCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Lru {
                entries: FxHashMap::default(),
                recency: BTreeMap::new(),
                tick: 0,
            }),
        }
    }

    pub fn get(&self, meta_key: &[u8]) -> Option<MetaState> {
        let mut lru = self.inner.lock();
        let Lru {
            entries,
            recency,
            tick,
        } = &mut *lru;
        let (state, last) = entries.get_mut(meta_key)?;
        recency.remove(last);
        *tick += 1;
        *last = *tick;
        recency.insert(*tick, meta_key.to_vec());
        Some(*state)
    }

    pub fn put(&self, meta_key: &[u8], state: MetaState) {
        let mut lru = self.inner.lock();
        lru.tick += 1;
        let tick = lru.tick;
        if let Some((_, old)) = lru.entries.insert(meta_key.to_vec(), (state, tick)) {
            lru.recency.remove(&old);
        }
        lru.recency.insert(tick, meta_key.to_vec());
        while lru.entries.len() > self.capacity {
            let Some((_, victim)) = lru.recency.pop_first() else {
                break;
            };
            lru.entries.remove(&victim);
        }
    }

    pub fn remove(&self, meta_key: &[u8]) {
        let mut lru = self.inner.lock();
        if let Some((_, tick)) = lru.entries.remove(meta_key) {
            lru.recency.remove(&tick);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lookup table the factories resolve their namespace from.
pub(crate) type NamespaceMap = DashMap<String, Arc<Namespace>>;

/// Creates [`NamespaceFilter`]s for one namespace.
///
/// The factory is registered with the column family before the namespace
/// object exists, so it holds only a weak handle to the engine's namespace
/// table and declines to filter until the namespace shows up there.
pub struct NamespaceFilterFactory {
    namespace: String,
    namespaces: Weak<NamespaceMap>,
    cache_size: usize,
}

impl NamespaceFilterFactory {
    pub(crate) fn new(namespace: &str, namespaces: Weak<NamespaceMap>, cache_size: usize) -> Self {
        Self {
            namespace: namespace.to_string(),
            namespaces,
            cache_size,
        }
    }
}

impl CompactionFilterFactory for NamespaceFilterFactory {
    fn create(&self, ctx: &FilterContext<'_>) -> Option<Box<dyn CompactionFilter>> {
        let namespaces = self.namespaces.upgrade()?;
        let ns = namespaces.get(&self.namespace).map(|e| Arc::clone(e.value()));
        match ns {
            Some(ns) => Some(Box::new(NamespaceFilter::new(ns, self.cache_size))),
            None => {
                debug!(
                    target: "ndb::compaction",
                    namespace = %self.namespace,
                    manual = ctx.manual,
                    "namespace not ready, skipping filter"
                );
                None
            }
        }
    }

    fn name(&self) -> &str {
        "ndb-namespace-filter-factory"
    }
}

/// Per-pass garbage collector for one namespace.
pub struct NamespaceFilter {
    ns: Arc<Namespace>,
    cache: MetaCache,
}

impl NamespaceFilter {
    /// A filter with an empty meta cache of `cache_size` entries.
    pub fn new(ns: Arc<Namespace>, cache_size: usize) -> Self {
        Self {
            ns,
            cache: MetaCache::new(cache_size),
        }
    }

    fn decide(&self, key: &[u8], value: &[u8]) -> Decision {
        if key == CONFIGS_KEY {
            return Decision::Keep;
        }

        let Some(pos) = key.iter().position(|&b| b == 0) else {
            return match Value::decode_raw(value) {
                Ok(v) if v.is_deleted() => Decision::Remove,
                _ => Decision::Keep,
            };
        };

        if let Some((prefix, _)) = decode_prefix(key) {
            return self.filter_member(key, prefix.meta_key, prefix.version);
        }

        if pos + 1 != key.len() {
            return Decision::Keep;
        }
        match Value::decode_raw(value) {
            Ok(v) => match v.meta() {
                Some(meta) => self.filter_meta(key, meta.version, v.is_deleted()),
                None => {
                    // Members under a scalar root are orphans
                    self.cache.remove(key);
                    if v.is_deleted() {
                        Decision::Remove
                    } else {
                        Decision::Keep
                    }
                }
            },
            Err(_) => {
                self.cache.remove(key);
                Decision::Keep
            }
        }
    }

    fn filter_meta(&self, meta_key: &[u8], version: u64, deleted: bool) -> Decision {
        let begin = encode_prefix(meta_key, version, 0, 0);
        let mut it = self.ns.range_get(&begin, &[], 0, 1, false);
        it.seek();
        if it.valid() && it.id().len() > meta_key.len() && it.id().starts_with(meta_key) {
            self.cache.put(meta_key, MetaState { deleted, version });
            return Decision::Keep;
        }
        self.cache.remove(meta_key);
        Decision::Remove
    }

    fn filter_member(&self, key: &[u8], meta_key: &[u8], version: u64) -> Decision {
        match self.parent(meta_key) {
            Ok(parent) => {
                if version < parent.version || (version == parent.version && parent.deleted) {
                    Decision::Remove
                } else {
                    Decision::Keep
                }
            }
            Err(e) if e.is_not_found() => Decision::Remove,
            Err(e) => {
                warn!(
                    target: "ndb::compaction",
                    namespace = self.ns.name(),
                    key = %String::from_utf8_lossy(key),
                    error = %e,
                    "parent lookup failed, keeping member"
                );
                Decision::Keep
            }
        }
    }

    fn parent(&self, meta_key: &[u8]) -> ndb_core::Result<MetaState> {
        if let Some(state) = self.cache.get(meta_key) {
            return Ok(state);
        }
        let value = self.ns.get(meta_key)?;
        let meta = value.meta().ok_or(ndb_core::Error::NotFound)?;
        let state = MetaState {
            deleted: value.is_deleted(),
            version: meta.version,
        };
        self.cache.put(meta_key, state);
        Ok(state)
    }
}

impl CompactionFilter for NamespaceFilter {
    fn filter(&mut self, key: &[u8], value: &[u8]) -> Decision {
        let decision = self.decide(key, value);
        trace!(
            target: "ndb::compaction",
            namespace = self.ns.name(),
            key = %String::from_utf8_lossy(key),
            ?decision,
            "filtered"
        );
        decision
    }

    fn name(&self) -> &str {
        "ndb-namespace-filter"
    }
}

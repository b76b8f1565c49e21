//! Collection storage layer for ndb
//!
//! This crate maps Redis-style collections onto the ordered store:
//! - Encode: meta keys, member-key prefixes and order-preserving integers
//! - Value: the envelope stored under every meta key (scalars and
//!   collection roots, deletion, expiry, versions)
//! - Namespace: a keyspace with point reads, windowed range scans,
//!   persisted defaults and atomic batches
//! - HashLock: striped locks for multi-step read-modify-write sequences
//! - Compaction: the filter that reclaims superseded collection members
//! - Engine: opens the store and owns the namespace table
//!
//! Truncating a collection is O(1): the root record gets a new version or
//! a tombstone, and the old members are removed later by compaction.

#![warn(clippy::all)]

pub mod compaction;
pub mod config;
pub mod encode;
pub mod engine;
pub mod hashlock;
pub mod iterator;
pub mod namespace;
pub mod stats;
pub mod value;

pub use compaction::{MetaCache, MetaState, NamespaceFilter, NamespaceFilterFactory};
pub use config::{EngineConfig, CONFIG_FILE_NAME};
pub use engine::{Batch, Engine};
pub use hashlock::{HashLock, HashLockGuard};
pub use iterator::{Direction, RangeIterator, WalTailer};
pub use namespace::{Namespace, NsBatch, CONFIGS_KEY};
pub use stats::Stats;
pub use value::{type_name, Configs, DataType, Meta, Pruning, Value};

//! ndb - collection storage for a Redis-compatible server
//!
//! ndb maps Redis collections (sets, sorted sets, lists, hashes) onto an
//! embedded ordered key-value store. Every collection is a root record plus
//! one record per member; deleting or replacing a collection only rewrites
//! its root, and compaction garbage-collects the superseded members.
//!
//! # Quick Start
//!
//! ```ignore
//! use ndb::{Context, Value};
//!
//! let ctx = Context::open("/var/lib/ndb")?;
//! let ns = ctx.engine().namespace("default").unwrap();
//! ns.put(b"counter", &Value::from_int64(1))?;
//! ctx.close()?;
//! ```
//!
//! # Architecture
//!
//! - [`ndb_storage`]: the embedded store (column families, WAL, compaction)
//! - [`ndb_engine`]: key encoding, value envelope, namespaces, hash lock
//! - [`Context`]: builds the pieces in dependency order and owns them

pub mod context;
pub mod telemetry;

pub use context::Context;
pub use ndb_core::{now_ms, Error, Result};
pub use ndb_engine::{
    encode, type_name, Batch, Configs, DataType, Direction, Engine, EngineConfig, HashLock,
    HashLockGuard, Meta, Namespace, NsBatch, Pruning, RangeIterator, Stats, Value, WalTailer,
};

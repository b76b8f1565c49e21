//! Embedded ordered key-value store for ndb
//!
//! This crate is the substrate the engine maps its collections onto:
//! - Store: column families, atomic write batches, point and multi reads
//! - Cursor: ordered bidirectional iteration that observes live state
//! - WAL: segmented write-ahead log with CRC-framed records, readable as a
//!   stream of `(sequence, batch)` pairs for replication
//! - Checkpoints: full images that bound recovery time and let covered WAL
//!   segments be purged
//! - Compaction: passes that run a pluggable per-record filter, triggered
//!   manually or by a background worker pool
//!
//! Readers always see the latest committed state; there is no snapshot
//! isolation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod compaction;
pub mod cursor;
pub mod family;
pub mod filter;
mod manifest;
pub mod options;
pub mod record;
pub mod store;
pub mod wal;

pub use batch::{BatchOp, WriteBatch};
pub use compaction::CompactionStats;
pub use cursor::Cursor;
pub use family::{ColumnFamily, FamilyStats};
pub use filter::{CompactionFilter, CompactionFilterFactory, Decision, FilterContext};
pub use options::{ColumnFamilyDescriptor, StoreOptions, DEFAULT_COLUMN_FAMILY};
pub use store::Store;
pub use wal::{DurabilityMode, WalIterator};

//! Tests for reading committed batches back out of the write-ahead log

use ndb_storage::{
    BatchOp, ColumnFamilyDescriptor, Store, StoreOptions, WriteBatch, DEFAULT_COLUMN_FAMILY,
};
use tempfile::TempDir;

fn options() -> StoreOptions {
    StoreOptions {
        background_threads: 0,
        ..StoreOptions::default()
    }
}

#[test]
fn test_updates_since_yields_batches_in_order() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path(), options(), Vec::new()).unwrap();
    let cf = store.column_family(DEFAULT_COLUMN_FAMILY).unwrap();

    store.put(&cf, b"a", b"1").unwrap();
    let mut batch = WriteBatch::new();
    batch.put(&cf, b"b", b"2");
    batch.delete(&cf, b"a");
    store.write(batch).unwrap();
    store.put(&cf, b"c", b"3").unwrap();

    let all: Vec<(u64, WriteBatch)> = store
        .updates_since(1)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    let seqs: Vec<u64> = all.iter().map(|(s, _)| *s).collect();
    assert_eq!(seqs, vec![1, 2, 4]);
    assert_eq!(all[1].1.len(), 2);
    assert!(matches!(all[1].1.ops()[1], BatchOp::Delete { .. }));

    // A sequence inside a batch still yields that batch.
    let seqs: Vec<u64> = store
        .updates_since(3)
        .unwrap()
        .map(|r| r.unwrap().0)
        .collect();
    assert_eq!(seqs, vec![2, 4]);

    // Nothing after the latest sequence.
    assert_eq!(store.updates_since(5).unwrap().count(), 0);
}

#[test]
fn test_updates_span_checkpoints_until_purged() {
    let dir = TempDir::new().unwrap();
    let opts = StoreOptions {
        wal_ttl_seconds: 3600,
        ..options()
    };
    let store = Store::open(dir.path(), opts, Vec::new()).unwrap();
    let cf = store
        .create_column_family(ColumnFamilyDescriptor::new("t"))
        .unwrap();
    store.put(&cf, b"a", b"1").unwrap();
    store.checkpoint().unwrap();
    store.put(&cf, b"b", b"2").unwrap();

    // The checkpointed segment is within its TTL, so it is still readable.
    let seqs: Vec<u64> = store
        .updates_since(1)
        .unwrap()
        .map(|r| r.unwrap().0)
        .collect();
    assert_eq!(seqs, vec![1, 2]);
}

#[test]
fn test_purged_sequence_is_an_error() {
    let dir = TempDir::new().unwrap();
    let opts = StoreOptions {
        wal_ttl_seconds: 0,
        ..options()
    };
    let store = Store::open(dir.path(), opts, Vec::new()).unwrap();
    let cf = store.column_family(DEFAULT_COLUMN_FAMILY).unwrap();
    store.put(&cf, b"a", b"1").unwrap();
    store.put(&cf, b"b", b"2").unwrap();
    store.checkpoint().unwrap();
    store.put(&cf, b"c", b"3").unwrap();

    assert!(store.updates_since(1).is_err());
    let seqs: Vec<u64> = store
        .updates_since(3)
        .unwrap()
        .map(|r| r.unwrap().0)
        .collect();
    assert_eq!(seqs, vec![3]);
}

#[test]
fn test_batch_bytes_from_the_log_reapply() {
    let dir = TempDir::new().unwrap();
    let replica_dir = TempDir::new().unwrap();
    let store = Store::open(dir.path(), options(), Vec::new()).unwrap();
    let replica = Store::open(replica_dir.path(), options(), Vec::new()).unwrap();
    let cf = store.column_family(DEFAULT_COLUMN_FAMILY).unwrap();

    store.put(&cf, b"k1", b"v1").unwrap();
    store.put(&cf, b"k2", b"v2").unwrap();
    store.delete(&cf, b"k1").unwrap();

    for update in store.updates_since(1).unwrap() {
        let (_, batch) = update.unwrap();
        let bytes = batch.to_bytes().unwrap();
        replica.write(WriteBatch::from_bytes(&bytes).unwrap()).unwrap();
    }

    let replica_cf = replica.column_family(DEFAULT_COLUMN_FAMILY).unwrap();
    assert!(replica.get(&replica_cf, b"k1").unwrap().is_none());
    assert_eq!(replica.get(&replica_cf, b"k2").unwrap().unwrap(), b"v2");
    assert_eq!(replica.latest_sequence(), store.latest_sequence());
}

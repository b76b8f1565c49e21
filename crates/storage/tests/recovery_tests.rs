//! Recovery tests: WAL replay, checkpoints and torn tails

use ndb_storage::{DurabilityMode, Store, StoreOptions, WriteBatch, DEFAULT_COLUMN_FAMILY};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

fn options() -> StoreOptions {
    StoreOptions {
        background_threads: 0,
        durability: DurabilityMode::Always,
        ..StoreOptions::default()
    }
}

fn segments(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut paths: Vec<_> = std::fs::read_dir(dir.join("wal"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().map_or(false, |e| e == "seg"))
        .collect();
    paths.sort();
    paths
}

/// Copy the store's files as they are on disk right now, as if the process
/// had died at this point. The copy has no LOCK holder.
fn crash_image(src: &Path, dst: &Path) {
    std::fs::create_dir_all(dst.join("wal")).unwrap();
    for entry in std::fs::read_dir(src).unwrap() {
        let path = entry.unwrap().path();
        if path.is_file() && path.file_name().unwrap() != "LOCK" {
            std::fs::copy(&path, dst.join(path.file_name().unwrap())).unwrap();
        }
    }
    for path in segments(src) {
        std::fs::copy(&path, dst.join("wal").join(path.file_name().unwrap())).unwrap();
    }
}

#[test]
fn test_wal_replay_after_crash() {
    let dir = TempDir::new().unwrap();
    let image = TempDir::new().unwrap();
    {
        let store = Store::open(dir.path(), options(), Vec::new()).unwrap();
        let cf = store.column_family(DEFAULT_COLUMN_FAMILY).unwrap();
        let mut batch = WriteBatch::new();
        batch.put(&cf, b"a", b"1");
        batch.put(&cf, b"b", b"2");
        store.write(batch).unwrap();
        store.put(&cf, b"c", b"3").unwrap();
        store.delete(&cf, b"a").unwrap();
        crash_image(dir.path(), image.path());
    }

    let store = Store::open(image.path(), options(), Vec::new()).unwrap();
    let cf = store.column_family(DEFAULT_COLUMN_FAMILY).unwrap();
    assert!(store.get(&cf, b"a").unwrap().is_none());
    assert_eq!(store.get(&cf, b"b").unwrap().unwrap(), b"2");
    assert_eq!(store.get(&cf, b"c").unwrap().unwrap(), b"3");
    assert_eq!(store.latest_sequence(), 4);
}

#[test]
fn test_crash_with_torn_record_keeps_prefix() {
    let dir = TempDir::new().unwrap();
    let image = TempDir::new().unwrap();
    {
        let store = Store::open(dir.path(), options(), Vec::new()).unwrap();
        let cf = store.column_family(DEFAULT_COLUMN_FAMILY).unwrap();
        store.put(&cf, b"a", b"1").unwrap();
        store.put(&cf, b"b", b"2").unwrap();
        crash_image(dir.path(), image.path());
    }
    // Cut the last record in half.
    let last = segments(image.path()).pop().unwrap();
    let len = std::fs::metadata(&last).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&last).unwrap();
    file.set_len(len - 3).unwrap();
    drop(file);

    let store = Store::open(image.path(), options(), Vec::new()).unwrap();
    let cf = store.column_family(DEFAULT_COLUMN_FAMILY).unwrap();
    assert_eq!(store.get(&cf, b"a").unwrap().unwrap(), b"1");
    assert!(store.get(&cf, b"b").unwrap().is_none());
    assert_eq!(store.latest_sequence(), 1);
}

#[test]
fn test_checkpoint_then_more_writes() {
    let dir = TempDir::new().unwrap();
    {
        let store = Store::open(dir.path(), options(), Vec::new()).unwrap();
        let cf = store.column_family(DEFAULT_COLUMN_FAMILY).unwrap();
        store.put(&cf, b"before", b"1").unwrap();
        assert_eq!(store.checkpoint().unwrap(), 1);
        store.put(&cf, b"after", b"2").unwrap();
        store.delete(&cf, b"before").unwrap();
    }

    let store = Store::open(dir.path(), options(), Vec::new()).unwrap();
    let cf = store.column_family(DEFAULT_COLUMN_FAMILY).unwrap();
    assert!(store.get(&cf, b"before").unwrap().is_none());
    assert_eq!(store.get(&cf, b"after").unwrap().unwrap(), b"2");
    assert_eq!(store.latest_sequence(), 3);
}

#[test]
fn test_torn_tail_is_ignored() {
    let dir = TempDir::new().unwrap();
    {
        let store = Store::open(dir.path(), options(), Vec::new()).unwrap();
        let cf = store.column_family(DEFAULT_COLUMN_FAMILY).unwrap();
        store.put(&cf, b"a", b"1").unwrap();
    }
    // Append garbage to the newest segment, as an interrupted append would.
    let last = segments(dir.path()).pop().unwrap();
    let mut file = std::fs::OpenOptions::new().append(true).open(&last).unwrap();
    file.write_all(&[0xff, 0x00, 0x00, 0x00, 0x01, 0x02]).unwrap();
    drop(file);

    let store = Store::open(dir.path(), options(), Vec::new()).unwrap();
    let cf = store.column_family(DEFAULT_COLUMN_FAMILY).unwrap();
    assert_eq!(store.get(&cf, b"a").unwrap().unwrap(), b"1");

    // New writes land in a fresh segment and survive the next reopen.
    store.put(&cf, b"b", b"2").unwrap();
    drop(store);
    let store = Store::open(dir.path(), options(), Vec::new()).unwrap();
    let cf = store.column_family(DEFAULT_COLUMN_FAMILY).unwrap();
    assert_eq!(store.get(&cf, b"b").unwrap().unwrap(), b"2");
}

#[test]
fn test_corrupt_checkpoint_fails_open() {
    let dir = TempDir::new().unwrap();
    {
        let _store = Store::open(dir.path(), options(), Vec::new()).unwrap();
    }
    std::fs::write(dir.path().join("CHECKPOINT"), b"not a checkpoint").unwrap();
    let result = Store::open(dir.path(), options(), Vec::new());
    assert!(matches!(result, Err(e) if e.is_corruption()));
}

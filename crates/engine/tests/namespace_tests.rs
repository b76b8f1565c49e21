//! Namespace reads, writes, range scans and batches

use ndb_core::now_ms;
use ndb_engine::{Configs, Engine, EngineConfig, Namespace, Pruning, Value};
use std::sync::Arc;
use tempfile::TempDir;

fn open(dir: &TempDir) -> Engine {
    let config = EngineConfig {
        durability: "cache".to_string(),
        background_threads: 0,
        ..EngineConfig::default()
    };
    Engine::open(dir.path(), config).unwrap()
}

fn populate(ns: &Namespace) {
    for i in 0..1000i64 {
        let id = format!("member:{:04}", i);
        ns.put(id.as_bytes(), &Value::from_int64(i)).unwrap();
    }
}

fn collect(ns: &Namespace, begin: &str, end: &str, offset: usize, limit: usize, reverse: bool) -> Vec<(String, i64)> {
    let mut it = ns.range_get(begin.as_bytes(), end.as_bytes(), offset, limit, reverse);
    it.seek();
    let mut out = Vec::new();
    while it.valid() {
        let mut value = Value::default();
        value.decode(it.value()).unwrap();
        out.push((
            String::from_utf8(it.id().to_vec()).unwrap(),
            value.int64().unwrap(),
        ));
        it.next();
    }
    it.result().unwrap();
    out
}

#[test]
fn test_range_get_forward_window() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let ns = engine.namespace("default").unwrap();
    populate(&ns);

    let got = collect(&ns, "member:", "member;", 10, 10, false);
    let want: Vec<(String, i64)> = (10..20).map(|i| (format!("member:{:04}", i), i)).collect();
    assert_eq!(got, want);
}

#[test]
fn test_range_get_backward_window() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let ns = engine.namespace("default").unwrap();
    populate(&ns);

    let got = collect(&ns, "member:", "member;", 10, 10, true);
    let want: Vec<(String, i64)> = (980..990)
        .rev()
        .map(|i| (format!("member:{:04}", i), i))
        .collect();
    assert_eq!(got, want);
}

#[test]
fn test_range_get_unbounded() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let ns = engine.namespace("default").unwrap();
    populate(&ns);

    assert_eq!(collect(&ns, "", "", 0, 0, false).len(), 1000);
    let tail = collect(&ns, "", "", 0, 3, true);
    assert_eq!(tail[0].0, "member:0999");
    assert_eq!(tail.len(), 3);

    // The end bound is inclusive in both directions
    let got = collect(&ns, "member:0005", "member:0007", 0, 0, false);
    assert_eq!(got.len(), 3);
    let got = collect(&ns, "member:0005", "member:0007", 0, 0, true);
    assert_eq!(got.first().unwrap().1, 7);
    assert_eq!(got.last().unwrap().1, 5);
}

#[test]
fn test_range_get_empty_windows() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let ns = engine.namespace("default").unwrap();
    populate(&ns);

    let cases: [(&str, &str, usize, usize, bool); 4] = [
        ("member:", "member:", 0, 0, false),
        ("member;", "member;", 0, 0, false),
        ("member:0000", "member:0000", 2, 2, false),
        ("member:0001", "member:0001", 2, 2, true),
    ];
    for (begin, end, offset, limit, reverse) in cases {
        let mut it = ns.range_get(begin.as_bytes(), end.as_bytes(), offset, limit, reverse);
        assert!(!it.valid(), "valid before seek: {} {}", begin, end);
        it.seek();
        assert!(!it.valid(), "valid after seek: {} {}", begin, end);
        it.result().unwrap();
    }
}

#[test]
fn test_backward_end_between_keys() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let ns = engine.namespace("default").unwrap();
    populate(&ns);

    // "member:0010x" sits between member:0010 and member:0011
    let got = collect(&ns, "member:0008", "member:0010x", 0, 0, true);
    let ids: Vec<i64> = got.iter().map(|(_, v)| *v).collect();
    assert_eq!(ids, vec![10, 9, 8]);

    // An end past every key starts from the last one
    let got = collect(&ns, "", "zzz", 0, 1, true);
    assert_eq!(got[0].1, 999);
}

#[test]
fn test_get_hides_deleted_and_expired() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let ns = engine.namespace("default").unwrap();

    ns.put(b"live", &Value::from_bytes(&b"v"[..])).unwrap();
    let mut expired = Value::from_int64(1);
    expired.set_expire(Some(now_ms() - 1_000));
    ns.put(b"expired", &expired).unwrap();

    assert_eq!(ns.get(b"live").unwrap().bytes(), Some(&b"v"[..]));
    assert!(ns.get(b"expired").unwrap_err().is_not_found());
    assert!(ns.get(b"never").unwrap_err().is_not_found());

    ns.delete(b"live").unwrap();
    assert!(ns.get(b"live").unwrap_err().is_not_found());
}

#[test]
fn test_get_reports_corruption() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let ns = engine.namespace("default").unwrap();

    let mut batch = ns.batch();
    batch.put_raw(b"junk", &[0xC1]);
    batch.commit().unwrap();
    assert!(ns.get(b"junk").unwrap_err().is_corruption());
}

#[test]
fn test_multi_get_is_per_item() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let ns = engine.namespace("default").unwrap();
    ns.put(b"a", &Value::from_int64(1)).unwrap();
    ns.put(b"c", &Value::from_int64(3)).unwrap();
    let mut batch = ns.batch();
    batch.put_raw(b"d", b"not msgpack \xC1");
    batch.commit().unwrap();

    let results = ns.multi_get(&["a", "b", "c", "d"]);
    assert_eq!(results.len(), 4);
    assert_eq!(results[0].as_ref().unwrap().int64(), Some(1));
    assert!(results[1].as_ref().unwrap_err().is_not_found());
    assert_eq!(results[2].as_ref().unwrap().int64(), Some(3));
    assert!(results[3].is_err());
}

#[test]
fn test_batch_commits_atomically() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let ns = engine.namespace("default").unwrap();
    ns.put(b"gone", &Value::from_int64(0)).unwrap();

    let mut batch = ns.batch();
    batch.put(b"x", &Value::from_int64(1)).unwrap();
    batch.put(b"y", &Value::from_int64(2)).unwrap();
    batch.delete(b"gone");
    assert_eq!(batch.len(), 3);
    assert!(batch.data_size() > 0);
    assert!(ns.get(b"x").is_err());

    batch.commit().unwrap();
    assert_eq!(ns.get(b"x").unwrap().int64(), Some(1));
    assert_eq!(ns.get(b"y").unwrap().int64(), Some(2));
    assert!(ns.get(b"gone").unwrap_err().is_not_found());
}

#[test]
fn test_data_size_grows() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let ns = engine.namespace("default").unwrap();

    let mut batch = ns.batch();
    let empty = batch.data_size();
    batch.put_raw(b"k", &[0u8; 100]);
    let one = batch.data_size();
    assert!(one >= empty + 101);
    batch.delete(b"k2");
    assert!(batch.data_size() > one);
}

#[test]
fn test_configs_persist() {
    let dir = TempDir::new().unwrap();
    let configs = Configs {
        expire: Some(60_000),
        maxlen: Some(10),
        pruning: Some(Pruning::Max),
    };
    {
        let engine = open(&dir);
        let ns = engine.create_namespace("limited").unwrap();
        assert_eq!(ns.configs(), Configs::default());
        ns.put_configs(&configs).unwrap();
        assert_eq!(ns.configs(), configs);
    }
    let engine = open(&dir);
    let ns = engine.namespace("limited").unwrap();
    assert_eq!(ns.configs(), configs);
}

#[test]
fn test_namespace_lifecycle() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    assert_eq!(engine.list_namespaces(), vec!["default".to_string()]);

    let users = engine.create_namespace("users").unwrap();
    assert!(engine.create_namespace("users").is_err());
    users.put(b"k", &Value::from_int64(1)).unwrap();
    assert_eq!(
        engine.list_namespaces(),
        vec!["default".to_string(), "users".to_string()]
    );

    engine.drop_namespace("users").unwrap();
    engine.drop_namespace("users").unwrap();
    assert!(engine.namespace("users").is_none());
    assert!(users.get(b"k").is_err());
    assert!(engine.drop_namespace("default").is_err());

    // Recreated namespaces start empty
    let users = engine.create_namespace("users").unwrap();
    assert!(users.get(b"k").unwrap_err().is_not_found());
}

#[test]
fn test_namespaces_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open(&dir);
        let ns = engine.create_namespace("n1").unwrap();
        ns.put(b"k", &Value::from_bytes(&b"v"[..])).unwrap();
    }
    let engine = open(&dir);
    assert!(engine.list_namespaces().contains(&"n1".to_string()));
    let ns = engine.namespace("n1").unwrap();
    assert_eq!(ns.get(b"k").unwrap().bytes(), Some(&b"v"[..]));
}

#[test]
fn test_engine_batch_and_multi_get() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let a: Arc<Namespace> = engine.create_namespace("a").unwrap();
    let b = engine.create_namespace("b").unwrap();

    let mut batch = engine.batch();
    batch.put(&a, b"k", &Value::from_int64(1)).unwrap();
    batch.put(&b, b"k", &Value::from_int64(2)).unwrap();
    batch.commit().unwrap();

    let results = engine.multi_get(&[(&*a, &b"k"[..]), (&*b, &b"k"[..]), (&*a, &b"none"[..])]);
    assert_eq!(results[0].as_ref().unwrap().int64(), Some(1));
    assert_eq!(results[1].as_ref().unwrap().int64(), Some(2));
    assert!(results[2].as_ref().unwrap_err().is_not_found());

    let mut batch = engine.batch();
    batch.delete(&a, b"k");
    batch.delete(&b, b"k");
    batch.commit().unwrap();
    assert!(a.get(b"k").is_err());
    assert!(b.get(b"k").is_err());
}

#[test]
fn test_stats() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let ns = engine.namespace("default").unwrap();
    populate(&ns);

    let stats = ns.stats();
    assert_eq!(stats.get_u64("num_keys"), Some(1000));
    assert_eq!(stats.get("name").unwrap(), "default");

    let stats = engine.stats();
    assert_eq!(stats.get_u64("sequence"), Some(1000));
    assert_eq!(stats.get_u64("num_namespaces"), Some(1));
}

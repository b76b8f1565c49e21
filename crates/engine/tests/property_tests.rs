//! Property tests for the key encodings and the value envelope

use ndb_core::now_ms;
use ndb_engine::encode::{
    decode_int64, decode_prefix, decode_uint64, decode_varint, encode_int64, encode_meta,
    encode_prefix, encode_uint64, encode_varint, remove_prefix, MAX_SUBTYPE, MAX_TYPE,
};
use ndb_engine::{DataType, Meta, Pruning, Value};
use proptest::prelude::*;

fn varint(v: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_varint(&mut buf, v);
    buf
}

fn fixed(v: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_uint64(&mut buf, v);
    buf
}

fn id_strategy() -> impl Strategy<Value = Vec<u8>> {
    // Ids never contain the terminator
    prop::collection::vec(1u8..=255, 0..16)
}

fn version_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![0u64..300, 0u64..=u64::MAX, Just(0xF7), Just(0xF8), Just(u64::MAX)]
}

fn data_type() -> impl Strategy<Value = DataType> {
    prop_oneof![
        Just(DataType::Set),
        Just(DataType::OSet),
        Just(DataType::ZSet),
        Just(DataType::List),
        Just(DataType::Hash),
    ]
}

fn meta_strategy() -> impl Strategy<Value = Meta> {
    (
        data_type(),
        version_strategy(),
        1u64..1_000_000,
        prop::option::of(0u64..1_000_000),
        prop_oneof![Just(Pruning::Min), Just(Pruning::Max)],
    )
        .prop_map(|(kind, version, length, maxlen, pruning)| Meta {
            kind,
            version,
            length,
            maxlen,
            pruning,
            deleted: false,
        })
}

proptest! {
    #[test]
    fn prefix_orders_by_version(
        id in id_strategy(),
        v1 in version_strategy(),
        v2 in version_strategy(),
        t1 in 0u8..=MAX_TYPE,
        t2 in 0u8..=MAX_TYPE,
        s1 in 0u8..=MAX_SUBTYPE,
        s2 in 0u8..=MAX_SUBTYPE,
        suffix in prop::collection::vec(any::<u8>(), 0..8),
    ) {
        prop_assume!(v1 < v2);
        let meta = encode_meta(&id);
        let mut lower = encode_prefix(&meta, v1, t1, s1);
        lower.extend_from_slice(&suffix);
        let upper = encode_prefix(&meta, v2, t2, s2);
        prop_assert!(lower < upper);
    }

    #[test]
    fn prefix_round_trip(
        id in id_strategy(),
        version in version_strategy(),
        kind in 0u8..=MAX_TYPE,
        subtype in 0u8..=MAX_SUBTYPE,
    ) {
        let meta = encode_meta(&id);
        let key = encode_prefix(&meta, version, kind, subtype);
        let (prefix, rest) = decode_prefix(&key).unwrap();
        prop_assert_eq!(prefix.meta_key, meta.as_slice());
        prop_assert_eq!(prefix.version, version);
        prop_assert_eq!(prefix.kind, kind);
        prop_assert_eq!(prefix.subtype, subtype);
        prop_assert!(rest.is_empty());
        prop_assert_eq!(remove_prefix(&key), Some(&[][..]));
    }

    #[test]
    fn truncated_prefix_never_decodes(
        id in id_strategy(),
        version in version_strategy(),
        kind in 0u8..=MAX_TYPE,
    ) {
        let key = encode_prefix(&encode_meta(&id), version, kind, 1);
        for len in 0..key.len() {
            prop_assert!(decode_prefix(&key[..len]).is_none());
        }
    }

    /// The compaction sentinel `(version, type 0, subtype 0)` sorts at or
    /// before every member of that version and after every member of an
    /// older one. Both follow from the varint ordering the same way the
    /// fixed-width encoding orders.
    #[test]
    fn varint_order_matches_fixed_width(a in version_strategy(), b in version_strategy()) {
        prop_assert_eq!(varint(a).cmp(&varint(b)), fixed(a).cmp(&fixed(b)));
        prop_assert_eq!(varint(a).cmp(&varint(b)), a.cmp(&b));
    }

    #[test]
    fn sentinel_bounds_generation(
        id in id_strategy(),
        version in 1u64..=u64::MAX,
        older in 0u64..=u64::MAX,
        kind in 1u8..=MAX_TYPE,
        subtype in 0u8..=MAX_SUBTYPE,
        suffix in prop::collection::vec(any::<u8>(), 0..8),
    ) {
        let older = older % version;
        let meta = encode_meta(&id);
        let sentinel = encode_prefix(&meta, version, 0, 0);

        let mut current = encode_prefix(&meta, version, kind, subtype);
        current.extend_from_slice(&suffix);
        prop_assert!(sentinel <= current);

        let mut stale = encode_prefix(&meta, older, kind, subtype);
        stale.extend_from_slice(&suffix);
        prop_assert!(stale < sentinel);
        prop_assert!(meta < stale);
    }

    #[test]
    fn varint_round_trip(v in any::<u64>(), tail in prop::collection::vec(any::<u8>(), 0..4)) {
        let mut buf = varint(v);
        buf.extend_from_slice(&tail);
        let mut src = buf.as_slice();
        prop_assert_eq!(decode_varint(&mut src), Some(v));
        prop_assert_eq!(src, tail.as_slice());
    }

    #[test]
    fn int64_order_preserving(a in any::<i64>(), b in any::<i64>()) {
        let (mut ea, mut eb) = (Vec::new(), Vec::new());
        encode_int64(&mut ea, a);
        encode_int64(&mut eb, b);
        prop_assert_eq!(ea.cmp(&eb), a.cmp(&b));
        prop_assert_eq!(decode_int64(&mut ea.as_slice()), Some(a));
    }

    #[test]
    fn uint64_order_preserving(a in any::<u64>(), b in any::<u64>()) {
        prop_assert_eq!(fixed(a).cmp(&fixed(b)), a.cmp(&b));
        prop_assert_eq!(decode_uint64(&mut fixed(a).as_slice()), Some(a));
    }

    #[test]
    fn live_value_round_trip(meta in meta_strategy(), ttl in prop::option::of(60_000i64..1_000_000)) {
        let mut value = Value::from_meta(meta);
        value.set_expire(ttl.map(|t| now_ms() + t));
        let mut decoded = Value::default();
        decoded.decode(&value.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, value);
    }

    #[test]
    fn deleted_value_advances_version(meta in meta_strategy()) {
        prop_assume!(meta.version < u64::MAX);
        let version = meta.version;
        let kind = meta.kind;
        let mut value = Value::from_meta(meta);
        value.set_length(0);

        let mut decoded = Value::default();
        let err = decoded.decode(&value.encode().unwrap()).unwrap_err();
        prop_assert!(err.is_not_found());
        let reopened = decoded.meta().unwrap();
        prop_assert_eq!(reopened.version, version + 1);
        prop_assert_eq!(reopened.kind, kind);
        prop_assert!(!reopened.deleted);
    }

    #[test]
    fn exceed_maxlen_ranges(length in 1u64..100_000, maxlen in 0u64..100_000, max in any::<bool>()) {
        let mut value = Value::from_meta(Meta {
            length,
            maxlen: Some(maxlen),
            pruning: if max { Pruning::Max } else { Pruning::Min },
            ..Meta::new(DataType::List)
        });
        // length >= maxlen * 1.1, without rounding
        let exceeds = length * 10 >= maxlen * 11;
        match value.exceed_maxlen() {
            None => prop_assert!(!exceeds),
            Some((start, stop)) => {
                prop_assert!(exceeds);
                if max {
                    prop_assert_eq!((start, stop), (maxlen, length - 1));
                } else {
                    prop_assert_eq!((start, stop), (0, length - maxlen - 1));
                }
                // Exactly the overflow is evicted
                prop_assert_eq!(stop - start + 1, length - maxlen);
            }
        }
        value.set_length(0);
        prop_assert!(value.meta().unwrap().deleted);
    }
}

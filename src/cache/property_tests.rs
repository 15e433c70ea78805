//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check fingerprint stability, store semantics and LRU
//! eviction against a disk-backed store.

use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::convert::Infallible;
use std::time::{Duration, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::cache::{
    decode_value, encode_value, enforce, fingerprint, open_store, Args, CacheKey, CacheStore,
    Value,
};

// == Strategies ==
/// Generates argument values of bounded depth with finite floats only
fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-1.0e12f64..1.0e12).prop_map(Value::Float),
        "[a-zA-Z0-9 _-]{0,16}".prop_map(Value::Str),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Generates keyword argument lists (name, value), possibly unsorted
fn kwargs_strategy() -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::btree_map("[a-z_]{1,8}", value_strategy(), 0..5)
        .prop_map(|m| m.into_iter().collect())
}

fn finite_f64() -> impl Strategy<Value = f64> {
    any::<f64>().prop_filter("finite", |f| f.is_finite())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    label: String,
    value: f64,
    samples: Vec<f64>,
    calibration: Option<f64>,
    tags: BTreeMap<String, i64>,
}

fn reading_strategy() -> impl Strategy<Value = Reading> {
    (
        "[a-z ]{0,12}",
        finite_f64(),
        prop::collection::vec(finite_f64(), 0..6),
        prop::option::of(finite_f64()),
        prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..4),
    )
        .prop_map(|(label, value, samples, calibration, tags)| Reading {
            label,
            value,
            samples,
            calibration,
            tags,
        })
}

fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

fn key(n: usize) -> CacheKey {
    fingerprint(&Args::new().arg(n as i64)).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Keyword order never changes the key.
    #[test]
    fn prop_fingerprint_ignores_kwarg_order(
        positional in prop::collection::vec(value_strategy(), 0..4),
        kwargs in kwargs_strategy(),
    ) {
        let forward = Args::from_parts(positional.clone(), kwargs.clone());
        let reversed = Args::from_parts(positional, kwargs.into_iter().rev());

        prop_assert_eq!(fingerprint(&forward).unwrap(), fingerprint(&reversed).unwrap());
    }

    // Distinct argument sets produce distinct keys.
    #[test]
    fn prop_fingerprint_distinguishes_args(
        a in prop::collection::vec(value_strategy(), 0..4),
        b in prop::collection::vec(value_strategy(), 0..4),
    ) {
        let args_a = Args::from_parts(a, Vec::<(String, Value)>::new());
        let args_b = Args::from_parts(b, Vec::<(String, Value)>::new());
        prop_assume!(args_a != args_b);
        prop_assert_ne!(fingerprint(&args_a).unwrap(), fingerprint(&args_b).unwrap());
    }

    // Results survive encode/decode unchanged.
    #[test]
    fn prop_result_roundtrip(value in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)) {
        let bytes = encode_value(&value).unwrap();
        let back: BTreeMap<String, i64> = decode_value(&bytes).unwrap();
        prop_assert_eq!(back, value);
    }

    // Every finite f64 comes back with the same bits; the rest refuse to encode.
    #[test]
    fn prop_f64_roundtrip_bit_exact(value in any::<f64>()) {
        match encode_value(&value) {
            Ok(bytes) => {
                prop_assert!(value.is_finite());
                let back: f64 = decode_value(&bytes).unwrap();
                prop_assert_eq!(back.to_bits(), value.to_bits());
            }
            Err(_) => prop_assert!(!value.is_finite()),
        }
    }

    // Some(x) never comes back as None, and None stays None.
    #[test]
    fn prop_option_f64_roundtrip(value in prop::option::of(any::<f64>())) {
        match (value, encode_value(&value)) {
            (Some(f), Err(_)) => prop_assert!(!f.is_finite()),
            (None, Err(e)) => prop_assert!(false, "None failed to encode: {}", e),
            (_, Ok(bytes)) => {
                let back: Option<f64> = decode_value(&bytes).unwrap();
                prop_assert_eq!(back.map(f64::to_bits), value.map(f64::to_bits));
            }
        }
    }

    // Nested structs with floats, lists and options survive unchanged.
    #[test]
    fn prop_struct_roundtrip(reading in reading_strategy()) {
        let bytes = encode_value(&reading).unwrap();
        let back: Reading = decode_value(&bytes).unwrap();
        prop_assert_eq!(back.value.to_bits(), reading.value.to_bits());
        prop_assert_eq!(
            back.samples.iter().map(|f| f.to_bits()).collect::<Vec<_>>(),
            reading.samples.iter().map(|f| f.to_bits()).collect::<Vec<_>>()
        );
        prop_assert_eq!(back, reading);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // After put(k, v), get(k) returns v, repeatedly.
    #[test]
    fn prop_put_then_get(payload in payload_strategy(), reads in 1usize..4) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());

        store.put(&key(1), &payload).unwrap();
        for _ in 0..reads {
            let got = store.get(&key(1));
            prop_assert_eq!(got.as_deref(), Some(payload.as_slice()));
        }
        prop_assert_eq!(store.len(), 1);
    }

    // Overwrite returns the latest value.
    #[test]
    fn prop_overwrite_semantics(first in payload_strategy(), second in payload_strategy()) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());

        store.put(&key(1), &first).unwrap();
        store.put(&key(1), &second).unwrap();

        prop_assert_eq!(store.get(&key(1)), Some(second));
        prop_assert_eq!(store.len(), 1);
    }

    // Any bytes that did not come from put read as a miss and are purged.
    #[test]
    fn prop_corruption_self_heals(garbage in payload_strategy()) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        store.put(&key(1), b"good").unwrap();
        std::fs::write(store.entry_path(&key(1)), &garbage).unwrap();

        prop_assert!(store.get(&key(1)).is_none());
        prop_assert!(!store.entry_path(&key(1)).exists());
    }

    // A sequence of puts followed by enforce never leaves more than capacity.
    #[test]
    fn prop_capacity_enforcement(
        ids in prop::collection::vec(0usize..40, 1..40),
        capacity in 1usize..10,
    ) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());

        for id in &ids {
            store.put(&key(*id), b"v").unwrap();
            enforce(&store, capacity);
            prop_assert!(store.len() <= capacity);
        }

        let distinct: HashSet<_> = ids.iter().collect();
        prop_assert_eq!(store.len(), distinct.len().min(capacity));
    }

    // With distinct timestamps and one entry over capacity, exactly the
    // oldest goes.
    #[test]
    fn prop_lru_evicts_smallest_access(
        stamps in prop::collection::hash_set(1u64..1_000_000, 2..12),
    ) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let stamps: Vec<u64> = stamps.into_iter().collect();

        for (i, secs) in stamps.iter().enumerate() {
            store.put(&key(i), b"v").unwrap();
            store.touch_at(&key(i), UNIX_EPOCH + Duration::from_secs(*secs)).unwrap();
        }
        let oldest = stamps
            .iter()
            .enumerate()
            .min_by_key(|(_, secs)| **secs)
            .map(|(i, _)| i)
            .unwrap();

        let report = enforce(&store, stamps.len() - 1);

        prop_assert_eq!(report.evicted, vec![key(oldest)]);
        prop_assert!(store.get(&key(oldest)).is_none());
        for i in (0..stamps.len()).filter(|i| *i != oldest) {
            prop_assert!(store.get(&key(i)).is_some());
        }
    }

    // A hit hands back exactly what the miss computed.
    #[test]
    fn prop_memoized_hit_is_bit_identical(computed in finite_f64(), reading in reading_strategy()) {
        let dir = TempDir::new().unwrap();
        let cache = open_store(dir.path(), 4).unwrap();
        let args = Args::new().arg("sample");

        let _: Result<(f64, Reading), Infallible> =
            cache.call(|_| Ok((computed, reading.clone())), &args);
        let hit: Result<(f64, Reading), Infallible> =
            cache.call(|_| Ok((0.0, reading.clone())), &args);

        let (value, back) = hit.unwrap();
        prop_assert_eq!(value.to_bits(), computed.to_bits());
        prop_assert_eq!(back, reading);
        prop_assert_eq!(cache.stats().hits, 1);
    }

    // Reading an entry protects it from the next eviction.
    #[test]
    fn prop_lru_access_tracking(count in 3usize..8, accessed in 0usize..100) {
        let dir = TempDir::new().unwrap();
        let cache = open_store(dir.path(), count).unwrap();
        let accessed = accessed % count;

        for i in 0..count {
            let _: Result<usize, Infallible> = cache.call(|_| Ok(i), &Args::new().arg(i as i64));
        }
        // hit on the accessed entry
        let hit: Result<usize, Infallible> = cache.call(|_| Ok(usize::MAX), &Args::new().arg(accessed as i64));
        prop_assert_eq!(hit, Ok(accessed));

        let _: Result<usize, Infallible> = cache.call(|_| Ok(count), &Args::new().arg(count as i64));

        prop_assert_eq!(cache.store().len(), count);
        prop_assert!(cache.store().get(&key(accessed)).is_some());
        let expected_victim = if accessed == 0 { 1 } else { 0 };
        prop_assert!(cache.store().get(&key(expected_victim)).is_none());
    }
}

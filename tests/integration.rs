//! End-to-end integration tests exercising the full engine stack:
//! memtable, flushes, leveled compaction, bloom filters, buffer pool,
//! and reopen.

use std::collections::BTreeMap;

use rand::Rng;
use tempfile::TempDir;

use stratumdb::engine::{LookupMode, Store, StoreConfig};
use stratumdb::memtable::PAIR_BYTES;

fn small_store(dir: &std::path::Path, max_pairs: usize) -> Store {
    Store::open(
        dir,
        StoreConfig {
            memtable_budget_bytes: max_pairs * PAIR_BYTES,
            ..StoreConfig::default()
        },
    )
    .unwrap()
}

#[test]
fn random_workload_matches_reference_model() {
    let tmp = TempDir::new().unwrap();
    let store = small_store(tmp.path(), 64);

    // Shadow every operation in an in-memory model, then verify the
    // store agrees on every key that was ever touched.
    let mut model: BTreeMap<i32, Option<i32>> = BTreeMap::new();
    let mut rng = rand::rng();

    for _ in 0..5_000 {
        let key = rng.random_range(0..800);
        if rng.random_range(0..10) < 8 {
            let value = rng.random_range(0..1_000_000);
            store.put(key, value).unwrap();
            model.insert(key, Some(value));
        } else {
            store.delete(key).unwrap();
            model.insert(key, None);
        }
    }

    for (&key, &expected) in &model {
        assert_eq!(store.get(key).unwrap(), expected, "key {key}");
    }

    let live: Vec<(i32, i32)> = model
        .iter()
        .filter_map(|(&k, &v)| v.map(|v| (k, v)))
        .collect();
    assert_eq!(store.scan(0, 800).unwrap(), live);
}

#[test]
fn workload_survives_close_and_reopen() {
    let tmp = TempDir::new().unwrap();
    let mut model: BTreeMap<i32, Option<i32>> = BTreeMap::new();

    {
        let store = small_store(tmp.path(), 32);
        let mut rng = rand::rng();
        for _ in 0..2_000 {
            let key = rng.random_range(0..300);
            if rng.random_range(0..10) < 7 {
                let value = key * 31;
                store.put(key, value).unwrap();
                model.insert(key, Some(value));
            } else {
                store.delete(key).unwrap();
                model.insert(key, None);
            }
        }
        store.close().unwrap();
    }

    let store = small_store(tmp.path(), 32);
    for (&key, &expected) in &model {
        assert_eq!(store.get(key).unwrap(), expected, "key {key} after reopen");
    }
}

#[test]
fn scans_agree_with_point_lookups() {
    let tmp = TempDir::new().unwrap();
    let store = small_store(tmp.path(), 16);

    for key in 0..200 {
        store.put(key, key * 3).unwrap();
    }
    for key in (0..200).step_by(5) {
        store.delete(key).unwrap();
    }

    for (k1, k2) in [(0, 199), (13, 57), (100, 100), (150, 300), (-50, 20)] {
        let scanned = store.scan(k1, k2).unwrap();

        // Every scanned pair must be confirmed by get, in sorted order.
        let mut prev = None;
        for &(key, value) in &scanned {
            assert!(k1 <= key && key <= k2);
            assert!(prev.is_none_or(|p| p < key), "scan not sorted");
            assert_eq!(store.get(key).unwrap(), Some(value));
            prev = Some(key);
        }

        // And every live key in range must have been scanned.
        let expected = (k1.max(0)..=k2.min(199))
            .filter(|k| *k >= 0 && k % 5 != 0)
            .count();
        assert_eq!(scanned.len(), expected, "range ({k1}, {k2})");
    }
}

#[test]
fn deep_compaction_keeps_everything_reachable() {
    let tmp = TempDir::new().unwrap();
    let store = small_store(tmp.path(), 8);

    // 512 sequential puts through an 8-pair memtable force dozens of
    // flushes and a multi-level cascade.
    for key in 0..512 {
        store.put(key, key ^ 0x5A5A).unwrap();
    }
    store.flush().unwrap();

    let stats = store.stats().unwrap();
    assert!(stats.run_count >= 1);
    // Newest-first levels never decrease.
    assert!(stats.run_levels.windows(2).all(|w| w[0] <= w[1]));

    for key in 0..512 {
        assert_eq!(store.get(key).unwrap(), Some(key ^ 0x5A5A), "key {key}");
    }
}

#[test]
fn overwrite_heavy_workload_keeps_latest_only() {
    let tmp = TempDir::new().unwrap();
    let store = small_store(tmp.path(), 16);

    for round in 0..50 {
        for key in 0..20 {
            store.put(key, round * 100 + key).unwrap();
        }
    }

    for key in 0..20 {
        assert_eq!(store.get(key).unwrap(), Some(49 * 100 + key));
    }
    let scanned = store.scan(0, 19).unwrap();
    assert_eq!(scanned.len(), 20);
}

#[test]
fn binary_search_mode_full_parity() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(
        tmp.path(),
        StoreConfig {
            memtable_budget_bytes: 32 * PAIR_BYTES,
            lookup_mode: LookupMode::BinarySearch,
            ..StoreConfig::default()
        },
    )
    .unwrap();

    let mut model: BTreeMap<i32, Option<i32>> = BTreeMap::new();
    for key in 0..400 {
        store.put(key, key * 7).unwrap();
        model.insert(key, Some(key * 7));
    }
    for key in (0..400).step_by(3) {
        store.delete(key).unwrap();
        model.insert(key, None);
    }
    store.flush().unwrap();

    for (&key, &expected) in &model {
        assert_eq!(store.get(key).unwrap(), expected, "key {key}");
    }
    assert_eq!(store.get(-1).unwrap(), None);
    assert_eq!(store.get(400).unwrap(), None);
}

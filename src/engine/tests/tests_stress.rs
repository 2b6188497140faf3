use std::collections::BTreeMap;

use tempfile::TempDir;

use super::helpers::open_store;

#[test]
fn test_interleaved_puts_deletes_and_overwrites() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 16);
    let mut model: BTreeMap<i32, Option<i32>> = BTreeMap::new();

    // A deterministic pseudo-random walk over a small key space forces
    // heavy overwrite and delete traffic through many flush/compaction
    // cycles.
    let mut state = 0x1234_5678u64;
    for _ in 0..3_000 {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let key = ((state >> 33) % 200) as i32;
        let action = (state >> 13) % 4;

        if action == 0 {
            store.delete(key).unwrap();
            model.insert(key, None);
        } else {
            let value = (state >> 20) as i32 & 0x7FFF_FFFF;
            let value = if value == i32::MAX { 0 } else { value };
            store.put(key, value).unwrap();
            model.insert(key, Some(value));
        }
    }

    for (&key, &expected) in &model {
        assert_eq!(store.get(key).unwrap(), expected, "key {key}");
    }

    let live: Vec<(i32, i32)> = model
        .iter()
        .filter_map(|(&k, &v)| v.map(|v| (k, v)))
        .collect();
    assert_eq!(store.scan(0, 199).unwrap(), live);
}

#[test]
fn test_sequential_fill_then_delete_everything() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 8);

    for key in 0..200 {
        store.put(key, key).unwrap();
    }
    for key in 0..200 {
        store.delete(key).unwrap();
    }
    store.flush().unwrap();

    assert!(store.scan(0, 199).unwrap().is_empty());
    for key in (0..200).step_by(17) {
        assert_eq!(store.get(key).unwrap(), None);
    }
}

#[test]
fn test_descending_insert_order() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 16);

    for key in (0..300).rev() {
        store.put(key, key * 2).unwrap();
    }

    assert_eq!(
        store.scan(0, 299).unwrap(),
        (0..300).map(|k| (k, k * 2)).collect::<Vec<_>>()
    );
}

#[test]
fn test_sparse_key_space() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 8);

    let keys: Vec<i32> = (0..100).map(|i| i * 1_000_000).collect();
    for &key in &keys {
        store.put(key, key / 2).unwrap();
    }

    for &key in &keys {
        assert_eq!(store.get(key).unwrap(), Some(key / 2));
        // Neighbors were never written.
        assert_eq!(store.get(key + 1).unwrap(), None);
    }
}

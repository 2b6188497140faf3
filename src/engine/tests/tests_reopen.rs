use tempfile::TempDir;

use super::helpers::{config_with_capacity, open_store};
use crate::engine::Store;

#[test]
fn test_single_pair_round_trip() {
    let tmp = TempDir::new().unwrap();
    {
        let store = open_store(tmp.path(), 16);
        store.put(42, 4200).unwrap();
        store.close().unwrap();
    }

    let store = open_store(tmp.path(), 16);
    assert_eq!(store.get(42).unwrap(), Some(4200));
    assert_eq!(store.stats().unwrap().run_count, 1);
}

#[test]
fn test_close_flushes_memtable() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 1024);

    for key in 0..10 {
        store.put(key, key).unwrap();
    }
    assert_eq!(store.stats().unwrap().run_count, 0);
    store.close().unwrap();

    let reopened = open_store(tmp.path(), 1024);
    assert_eq!(reopened.stats().unwrap().run_count, 1);
    for key in 0..10 {
        assert_eq!(reopened.get(key).unwrap(), Some(key));
    }
}

#[test]
fn test_reopen_preserves_level_structure() {
    let tmp = TempDir::new().unwrap();
    let levels_at_close;
    {
        let store = open_store(tmp.path(), 2);
        for key in 0..12 {
            store.put(key, key).unwrap();
        }
        levels_at_close = store.stats().unwrap().run_levels;
        store.close().unwrap();
    }

    let store = open_store(tmp.path(), 2);
    // Close flushed nothing (memtable was empty after put 12), so the
    // level structure survives verbatim.
    assert_eq!(store.stats().unwrap().run_levels, levels_at_close);
    for key in 0..12 {
        assert_eq!(store.get(key).unwrap(), Some(key), "key {key}");
    }
}

#[test]
fn test_reopen_respects_recency_across_runs() {
    let tmp = TempDir::new().unwrap();
    {
        let store = open_store(tmp.path(), 4);
        store.put(1, 1).unwrap();
        store.put(2, 2).unwrap();
        store.put(3, 3).unwrap();
        store.put(4, 4).unwrap(); // flush #1
        store.put(1, 100).unwrap(); // overwrite, flushed by close
        store.close().unwrap();
    }

    let store = open_store(tmp.path(), 4);
    // The newer run's overwrite must win after reopen.
    assert_eq!(store.get(1).unwrap(), Some(100));
    assert_eq!(store.get(2).unwrap(), Some(2));
}

#[test]
fn test_operations_after_close_fail() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 16);
    store.put(1, 1).unwrap();
    store.close().unwrap();

    assert!(store.put(2, 2).is_err());
    assert!(store.get(1).is_err());
    assert!(store.delete(1).is_err());
    assert!(store.scan(0, 10).is_err());
    assert!(store.flush().is_err());
    assert!(store.compact().is_err());
    assert!(store.close().is_err());
}

#[test]
fn test_reopen_empty_directory() {
    let tmp = TempDir::new().unwrap();
    {
        let store = open_store(tmp.path(), 16);
        store.close().unwrap();
    }

    let store = open_store(tmp.path(), 16);
    assert_eq!(store.get(1).unwrap(), None);
    assert_eq!(store.stats().unwrap().run_count, 0);
}

#[test]
fn test_reopen_with_different_memtable_budget() {
    let tmp = TempDir::new().unwrap();
    {
        let store = open_store(tmp.path(), 4);
        for key in 0..8 {
            store.put(key, key).unwrap();
        }
        store.close().unwrap();
    }

    // Runs written under the old capacity stay readable; their filters
    // carry their own parameters.
    let store = Store::open(tmp.path(), config_with_capacity(64)).unwrap();
    for key in 0..8 {
        assert_eq!(store.get(key).unwrap(), Some(key));
    }
}

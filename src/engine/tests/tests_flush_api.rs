use tempfile::TempDir;

use super::helpers::{open_store, run_files};
use crate::sstable::filter_path;

#[test]
fn test_flush_on_empty_memtable_is_noop() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 16);

    store.flush().unwrap();
    store.flush().unwrap();

    assert_eq!(run_files(tmp.path()), 0);
    assert_eq!(store.stats().unwrap().run_count, 0);
}

#[test]
fn test_flush_clears_memtable_and_creates_run() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 1024);

    for key in 0..10 {
        store.put(key, key).unwrap();
    }
    assert_eq!(store.stats().unwrap().memtable_pairs, 10);

    store.flush().unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.memtable_pairs, 0);
    assert_eq!(stats.run_count, 1);
    assert_eq!(stats.run_levels, vec![0]);
    assert_eq!(run_files(tmp.path()), 1);
}

#[test]
fn test_flush_writes_filter_sidecar() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 16);

    store.put(1, 1).unwrap();
    store.flush().unwrap();

    let run = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().is_some_and(|ext| ext == "sst"))
        .expect("flush produced no run file");
    assert!(filter_path(&run).exists(), "missing filter sidecar");
}

#[test]
fn test_flushed_data_remains_readable() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 1024);

    for key in 0..50 {
        store.put(key, key * 11).unwrap();
    }
    store.flush().unwrap();

    for key in 0..50 {
        assert_eq!(store.get(key).unwrap(), Some(key * 11));
    }
}

#[test]
fn test_repeated_flushes_produce_distinct_timestamps() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 1024);

    // Several back-to-back flushes can land within one microsecond; the
    // name scheme must still keep them distinct and ordered.
    for round in 0..5 {
        store.put(round, round).unwrap();
        store.put(round + 1000, round).unwrap();
        store.flush().unwrap();
    }

    // Compaction cascaded everything into a single run, and every
    // intermediate file name was unique (a collision would have made a
    // later flush overwrite an earlier run and lose keys).
    for round in 0..5 {
        assert_eq!(store.get(round).unwrap(), Some(round));
        assert_eq!(store.get(round + 1000).unwrap(), Some(round));
    }
}

#[test]
fn test_flush_then_tombstone_flush_round_trip() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(tmp.path(), 1024);

    store.put(1, 10).unwrap();
    store.put(2, 20).unwrap();
    store.flush().unwrap();

    store.delete(1).unwrap();
    store.flush().unwrap();

    assert_eq!(store.get(1).unwrap(), None);
    assert_eq!(store.get(2).unwrap(), Some(20));
    assert_eq!(store.scan(1, 2).unwrap(), vec![(2, 20)]);
}

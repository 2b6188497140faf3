use crate::memtable::{Memtable, TOMBSTONE};

#[test]
fn test_scan_inclusive_both_ends() {
    let mut memtable = Memtable::new(16);
    for key in 1..=5 {
        memtable.put(key, key * 10);
    }

    let pairs: Vec<_> = memtable.scan(2, 4).collect();
    assert_eq!(pairs, vec![(2, 20), (3, 30), (4, 40)]);
}

#[test]
fn test_scan_single_key_range() {
    let mut memtable = Memtable::new(16);
    memtable.put(1, 10);
    memtable.put(2, 20);
    memtable.put(3, 30);

    let pairs: Vec<_> = memtable.scan(2, 2).collect();
    assert_eq!(pairs, vec![(2, 20)]);
}

#[test]
fn test_scan_yields_tombstones() {
    let mut memtable = Memtable::new(16);
    memtable.put(1, 10);
    memtable.put(2, TOMBSTONE);
    memtable.put(3, 30);

    let pairs: Vec<_> = memtable.scan(1, 3).collect();
    assert_eq!(pairs, vec![(1, 10), (2, TOMBSTONE), (3, 30)]);
}

#[test]
fn test_scan_outside_populated_range_is_empty() {
    let mut memtable = Memtable::new(16);
    memtable.put(10, 1);
    memtable.put(20, 2);

    assert_eq!(memtable.scan(30, 40).count(), 0);
    assert_eq!(memtable.scan(-5, 5).count(), 0);
}

#[test]
fn test_scan_is_sorted_regardless_of_insert_order() {
    let mut memtable = Memtable::new(16);
    memtable.put(50, 5);
    memtable.put(10, 1);
    memtable.put(40, 4);
    memtable.put(20, 2);

    let keys: Vec<_> = memtable.scan(i32::MIN, i32::MAX).map(|(k, _)| k).collect();
    assert_eq!(keys, vec![10, 20, 40, 50]);
}

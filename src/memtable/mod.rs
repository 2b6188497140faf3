//! # Memtable Module
//!
//! ## Design Invariants
//!
//! - The memtable holds at most one entry per key; a later `put`
//!   overwrites the previous value in place.
//! - Deletes are represented via the tombstone sentinel
//!   [`TOMBSTONE`] (`i32::MAX`), not physical removal.
//! - Iteration order is always ascending by key.
//! - Capacity is bounded in *pairs*, derived from the configured byte
//!   budget (`max_pairs = budget / 8`); the memtable itself never
//!   refuses a write — the coordinator checks [`Memtable::is_full`]
//!   after each insert and flushes once the bound is reached.
//!
//! ## Flush Semantics
//!
//! - [`Memtable::iter`] yields every live entry — tombstones included —
//!   in ascending key order, which is exactly the input the run builder
//!   expects.
//! - Flush iteration does not mutate state; the coordinator calls
//!   [`Memtable::clear`] once the run is durable.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;

use tracing::trace;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Sentinel value marking a deleted key.
///
/// `i32::MAX` is reserved for this purpose and must never be stored as a
/// live value; the coordinator rejects it at the API boundary.
pub const TOMBSTONE: i32 = i32::MAX;

/// Bytes occupied by one key-value pair (two `i32`s), used to convert the
/// configured byte budget into a pair capacity.
pub const PAIR_BYTES: usize = 8;

// ------------------------------------------------------------------------------------------------
// Memtable Core
// ------------------------------------------------------------------------------------------------

/// Result of a `get` operation on the memtable.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MemtableGetResult {
    /// A live value stored for the key.
    Value(i32),

    /// The key was deleted; this answer is authoritative — no older run
    /// may overturn it.
    Tombstone,

    /// The memtable has no information about the key.
    NotFound,
}

/// The mutable, in-memory write buffer of the storage engine.
///
/// The memtable accepts writes (`put`), serves reads (`get`, `scan`), and
/// is drained to a level-0 run once full. Internally it is an ordered map
/// from key to value; the balanced-tree discipline of the standard
/// `BTreeMap` satisfies the O(log n) bound on point operations.
#[derive(Debug)]
pub struct Memtable {
    /// Ordered key → value map. Tombstones are ordinary entries whose
    /// value is [`TOMBSTONE`].
    tree: BTreeMap<i32, i32>,

    /// Maximum number of pairs before a flush is required.
    max_pairs: usize,
}

impl Memtable {
    /// Creates an empty memtable bounded by `max_pairs` entries.
    pub fn new(max_pairs: usize) -> Self {
        Self {
            tree: BTreeMap::new(),
            max_pairs,
        }
    }

    /// Inserts or overwrites the entry for `key`.
    ///
    /// Deleting a key is exactly `put(key, TOMBSTONE)`; the tombstone
    /// participates in flushes and compactions like any other pair.
    pub fn put(&mut self, key: i32, value: i32) {
        trace!(key, value, "memtable put");
        self.tree.insert(key, value);
    }

    /// Looks up `key`.
    ///
    /// A stored tombstone is reported as [`MemtableGetResult::Tombstone`],
    /// distinguishable from a genuine miss.
    pub fn get(&self, key: i32) -> MemtableGetResult {
        match self.tree.get(&key) {
            Some(&TOMBSTONE) => MemtableGetResult::Tombstone,
            Some(&value) => MemtableGetResult::Value(value),
            None => MemtableGetResult::NotFound,
        }
    }

    /// Yields all entries with `k1 <= key <= k2` in ascending key order.
    ///
    /// Tombstones **are** returned; resolving them against older runs is
    /// the coordinator's job.
    pub fn scan(&self, k1: i32, k2: i32) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.tree.range(k1..=k2).map(|(&k, &v)| (k, v))
    }

    /// Iterates every entry — tombstones included — in ascending key
    /// order. This is the flush input for the run builder.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.tree.iter().map(|(&k, &v)| (k, v))
    }

    /// Number of pairs currently buffered.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// True when no pairs are buffered.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// True once the pair capacity has been reached and a flush is due.
    pub fn is_full(&self) -> bool {
        self.tree.len() >= self.max_pairs
    }

    /// Drops all buffered pairs. Called after a successful flush.
    pub fn clear(&mut self) {
        trace!(pairs = self.tree.len(), "memtable cleared");
        self.tree.clear();
    }
}

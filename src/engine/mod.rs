//! # Storage Engine (Coordinator)
//!
//! This module implements the thin coordinator that sequences writes
//! through the LSM pipeline:
//!
//! 1. **Memtable** — an in-memory sorted map absorbing every `put` and
//!    `delete` at memory speed.
//! 2. **Runs** — immutable on-disk static B-trees produced by flushing
//!    the memtable (level 0) and by compaction (deeper levels), each with
//!    a bloom filter sidecar.
//! 3. **Buffer pool** — a shared LRU page cache every run read goes
//!    through.
//!
//! ## Data flow
//!
//! A `put` lands in the memtable; once the memtable reaches its pair
//! capacity the *next* write first flushes it to a fresh level-0 run and
//! triggers compaction. Compaction repeatedly merges the two newest runs
//! while they share a level, so the run list stays short and levels stay
//! monotone: read newest-to-oldest, levels never decrease.
//!
//! ## Newest-wins reads
//!
//! `get` probes the memtable, then every run newest-first, skipping runs
//! whose bloom filter rejects the key. The first hit — live value or
//! tombstone — is final: no older run can overturn it. `scan` merges all
//! layers with the same recency rule, deduplicating by key.
//!
//! ## Concurrency Model
//!
//! All state lives behind a single `Arc<Mutex<StoreInner>>`; every public
//! operation runs to completion under that one exclusive lock. Reads
//! mutate LRU recency in the buffer pool, so there is no read path that
//! could soundly take a shared lock. The handle is `Clone` and can be
//! shared across threads.
//!
//! ## Durability
//!
//! Run and filter files are written to temporary paths, fsynced, and
//! renamed into place; the store directory is fsynced after every flush
//! and compaction. The run list is only updated once both files of a run
//! are durable. There is no write-ahead log: pairs still in the memtable
//! at a crash are lost (`close` flushes them).

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::bloom::{BloomFilter, FilterError};
use crate::buffer_pool::{BufferPool, PoolStats};
use crate::compaction::{self, CompactionError};
use crate::memtable::{Memtable, MemtableGetResult, PAIR_BYTES, TOMBSTONE};
use crate::sstable::{Run, RunBuilder, RunGetResult, SstError, filter_path, run_file_name};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Operation invoked after `close` (or on a handle whose store was
    /// closed through a clone).
    #[error("store is not open")]
    NotOpen,

    /// `put` was called with the reserved tombstone sentinel as a value.
    #[error("value {0} is reserved as the tombstone sentinel")]
    ReservedValue(i32),

    /// Error originating from the run subsystem.
    #[error("run error: {0}")]
    Sst(#[from] SstError),

    /// Error originating from the bloom filter subsystem.
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),

    /// Error originating from the compactor.
    #[error("compaction error: {0}")]
    Compaction(#[from] CompactionError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal invariant violation (poisoned lock, unexpected state).
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Point-lookup strategy used against runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupMode {
    /// Descend the static B-tree from the root page.
    #[default]
    BTree,

    /// Binary-search the leaf pages by min/max key, ignoring internal
    /// pages. Exists for comparison runs; the answers are identical.
    BinarySearch,
}

/// Configuration for a [`Store`] instance.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Memtable byte budget; the pair capacity is `budget / 8`.
    pub memtable_budget_bytes: usize,

    /// Buffer pool capacity in 4 KiB pages.
    pub buffer_pool_pages: usize,

    /// Bloom filter bits per key; 8 gives roughly a 1 % false-positive
    /// rate.
    pub bloom_bits_per_key: usize,

    /// Point-lookup strategy.
    pub lookup_mode: LookupMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            memtable_budget_bytes: 1024 * 1024,
            buffer_pool_pages: 2560,
            bloom_bits_per_key: 8,
            lookup_mode: LookupMode::BTree,
        }
    }
}

impl StoreConfig {
    /// Memtable capacity in pairs.
    pub fn max_pairs(&self) -> usize {
        self.memtable_budget_bytes / PAIR_BYTES
    }
}

/// Snapshot of store statistics returned by [`Store::stats`].
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Pairs currently buffered in the memtable.
    pub memtable_pairs: usize,

    /// Number of on-disk runs.
    pub run_count: usize,

    /// Level of each run, newest first.
    pub run_levels: Vec<u32>,

    /// Buffer pool hit/miss counters.
    pub pool: PoolStats,
}

// ------------------------------------------------------------------------------------------------
// Store
// ------------------------------------------------------------------------------------------------

#[derive(Debug)]
struct StoreInner {
    /// Store directory holding every run and filter file.
    dir: PathBuf,

    /// In-memory write buffer.
    memtable: Memtable,

    /// On-disk runs ordered (level descending, timestamp ascending) —
    /// oldest first, newest last. Read paths iterate in reverse.
    runs: Vec<Run>,

    /// Shared page cache for all run reads.
    pool: BufferPool,

    /// Engine configuration, fixed at open.
    config: StoreConfig,

    /// Cleared by `close`; operations on a closed store are rejected.
    open: bool,

    /// Last issued run timestamp, used to keep filenames strictly
    /// monotonic even when two flushes land in the same microsecond.
    last_timestamp: u64,
}

/// The store handle.
///
/// Thread-safe: the handle can be cloned and shared; all operations
/// serialize on one internal lock.
#[derive(Debug)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Store {
    /// Opens (or creates) a store rooted at `dir`.
    ///
    /// A fresh directory is created empty. An existing directory is
    /// scanned for `*.sst` files; each is paired with its `.filter`
    /// sidecar, its root page is sanity-checked, and the resulting run
    /// list is ordered so that reads visit newer runs first. Leftover
    /// `*.tmp` files from an interrupted flush or compaction are removed.
    pub fn open(dir: impl AsRef<Path>, config: StoreConfig) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut runs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match path.extension().and_then(|e| e.to_str()) {
                Some("sst") => runs.push(Run::load(path)?),
                Some("tmp") => {
                    warn!(path = %path.display(), "removing leftover temporary file");
                    let _ = fs::remove_file(&path);
                }
                _ => {}
            }
        }
        sort_runs(&mut runs);

        let last_timestamp = runs.iter().map(Run::timestamp).max().unwrap_or(0);

        info!(
            dir = %dir.display(),
            runs = runs.len(),
            max_pairs = config.max_pairs(),
            "store opened"
        );

        let inner = StoreInner {
            memtable: Memtable::new(config.max_pairs()),
            runs,
            pool: BufferPool::new(config.buffer_pool_pages),
            config,
            open: true,
            last_timestamp,
            dir,
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    /// Gracefully shuts the store down: flushes a non-empty memtable
    /// (running compaction afterwards) and latches the handle closed.
    /// Every later operation fails with [`StoreError::NotOpen`].
    pub fn close(&self) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        Self::check_open(inner)?;

        if !inner.memtable.is_empty() {
            Self::flush_inner(inner)?;
            Self::compact_inner(inner)?;
        }
        inner.open = false;

        info!(dir = %inner.dir.display(), "store closed");
        Ok(())
    }

    /// Inserts or overwrites a key-value pair.
    ///
    /// The tombstone sentinel is not a storable value and is rejected.
    /// When this insert fills the memtable to capacity, the memtable is
    /// flushed to a new level-0 run and compaction runs before the call
    /// returns, so a single `put` can absorb the full flush + compaction
    /// chain.
    pub fn put(&self, key: i32, value: i32) -> Result<(), StoreError> {
        if value == TOMBSTONE {
            return Err(StoreError::ReservedValue(value));
        }

        let mut guard = self.lock()?;
        let inner = &mut *guard;
        Self::check_open(inner)?;

        trace!(key, value, "put");
        inner.memtable.put(key, value);
        if inner.memtable.is_full() {
            Self::flush_inner(inner)?;
            Self::compact_inner(inner)?;
        }
        Ok(())
    }

    /// Deletes a key by writing a tombstone.
    ///
    /// The tombstone flows through flushes and compactions and is only
    /// physically dropped at the terminal level.
    pub fn delete(&self, key: i32) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        Self::check_open(inner)?;

        trace!(key, "delete");
        inner.memtable.put(key, TOMBSTONE);
        if inner.memtable.is_full() {
            Self::flush_inner(inner)?;
            Self::compact_inner(inner)?;
        }
        Ok(())
    }

    /// Looks up a single key.
    ///
    /// Returns `Ok(Some(value))` for a live pair and `Ok(None)` for a
    /// key that was deleted or never written. The probe order is
    /// memtable, then runs newest-first; the first tombstone or value
    /// encountered is final. Runs whose bloom filter rejects the key are
    /// skipped without touching disk.
    pub fn get(&self, key: i32) -> Result<Option<i32>, StoreError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        Self::check_open(inner)?;

        trace!(key, "get");
        match inner.memtable.get(key) {
            MemtableGetResult::Value(value) => return Ok(Some(value)),
            MemtableGetResult::Tombstone => return Ok(None),
            MemtableGetResult::NotFound => {}
        }

        for run in inner.runs.iter().rev() {
            if !run.may_contain(key) {
                debug!(key, run = %run.path().display(), "bloom filter skip");
                continue;
            }

            let result = match inner.config.lookup_mode {
                LookupMode::BTree => run.get(key, &mut inner.pool)?,
                LookupMode::BinarySearch => run.binary_search_get(key, &mut inner.pool)?,
            };
            match result {
                RunGetResult::Value(value) => return Ok(Some(value)),
                RunGetResult::Tombstone => return Ok(None),
                RunGetResult::NotFound => {}
            }
        }

        Ok(None)
    }

    /// Collects all live pairs with `k1 <= key <= k2`, sorted by key
    /// ascending.
    ///
    /// Layers are visited newest-first and deduplicated by key, so an
    /// overwrite or tombstone in a newer layer shadows every older pair.
    /// Collection stops early once the range's maximum possible number
    /// of distinct keys has been gathered. An inverted range is empty.
    pub fn scan(&self, k1: i32, k2: i32) -> Result<Vec<(i32, i32)>, StoreError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        Self::check_open(inner)?;

        trace!(k1, k2, "scan");
        if k1 > k2 {
            return Ok(Vec::new());
        }

        // Maximum number of distinct keys the inclusive range can hold.
        let span = k2 as i64 - k1 as i64 + 1;

        // First-seen wins: the memtable and newer runs are visited first,
        // so a key already present must not be overwritten.
        let mut merged: BTreeMap<i32, i32> = BTreeMap::new();

        for (key, value) in inner.memtable.scan(k1, k2) {
            merged.entry(key).or_insert(value);
        }

        if (merged.len() as i64) < span {
            for run in inner.runs.iter().rev() {
                for (key, value) in run.scan(k1, k2, &mut inner.pool)? {
                    merged.entry(key).or_insert(value);
                }
                if merged.len() as i64 >= span {
                    break;
                }
            }
        }

        Ok(merged
            .into_iter()
            .filter(|&(_, value)| value != TOMBSTONE)
            .collect())
    }

    /// Flushes the memtable to a new level-0 run (no-op when empty) and
    /// runs compaction.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        Self::check_open(inner)?;

        if inner.memtable.is_empty() {
            return Ok(());
        }
        Self::flush_inner(inner)?;
        Self::compact_inner(inner)
    }

    /// Runs the compaction protocol until no two same-level runs remain.
    pub fn compact(&self) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        Self::check_open(inner)?;
        Self::compact_inner(inner)
    }

    /// Returns a snapshot of store statistics.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let guard = self.lock()?;
        Ok(StoreStats {
            memtable_pairs: guard.memtable.len(),
            run_count: guard.runs.len(),
            run_levels: guard.runs.iter().rev().map(Run::level).collect(),
            pool: guard.pool.stats(),
        })
    }

    // --------------------------------------------------------------------------------------------
    // Internals
    // --------------------------------------------------------------------------------------------

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Internal("store lock poisoned".into()))
    }

    fn check_open(inner: &StoreInner) -> Result<(), StoreError> {
        if inner.open { Ok(()) } else { Err(StoreError::NotOpen) }
    }

    /// Writes the memtable out as a new level-0 run with its filter,
    /// appends the descriptor, and clears the memtable. The run list is
    /// only touched after both files are durable on disk.
    fn flush_inner(inner: &mut StoreInner) -> Result<(), StoreError> {
        let timestamp = Self::next_timestamp(inner);
        let path = inner.dir.join(run_file_name(0, timestamp));

        let mut filter =
            BloomFilter::for_capacity(inner.config.max_pairs(), inner.config.bloom_bits_per_key);
        let mut builder = RunBuilder::new(path.clone())?;

        for (key, value) in inner.memtable.iter() {
            filter.insert(key);
            builder.push(key, value)?;
        }
        let summary = builder.finish()?;

        if let Err(e) = filter.write_to(filter_path(&path)) {
            // Withdraw the run so no future open sees it without its
            // sidecar.
            if let Err(rm) = fs::remove_file(&path) {
                warn!(path = %path.display(), %rm, "failed to remove run after filter write failure");
            }
            return Err(e.into());
        }
        sync_dir(&inner.dir)?;

        info!(
            path = %path.display(),
            pairs = summary.pairs,
            leaf_pages = summary.leaf_pages,
            "memtable flushed to level-0 run"
        );

        inner.runs.push(Run::new(path, 0, timestamp, filter));
        sort_runs(&mut inner.runs);
        inner.memtable.clear();
        Ok(())
    }

    /// Merges the two newest runs while they share a level.
    ///
    /// Tombstones are removed exactly when the merge output lands on a
    /// level deeper than every run that existed before that merge — at
    /// that point no older run can hold a value the tombstone still
    /// needs to suppress.
    fn compact_inner(inner: &mut StoreInner) -> Result<(), StoreError> {
        while inner.runs.len() >= 2 {
            let newer = &inner.runs[inner.runs.len() - 1];
            let older = &inner.runs[inner.runs.len() - 2];
            if newer.level() != older.level() {
                break;
            }

            let largest_level = inner.runs.iter().map(Run::level).max().unwrap_or(0);
            let remove_tombstones = older.level() + 1 > largest_level;
            let timestamp = Self::next_timestamp(inner);

            let older = &inner.runs[inner.runs.len() - 2];
            let newer = &inner.runs[inner.runs.len() - 1];
            let merged =
                compaction::merge_runs(&inner.dir, older, newer, remove_tombstones, timestamp)?;
            sync_dir(&inner.dir)?;

            // The merge succeeded and the output is durable; now (and
            // only now) swap the run list and delete the sources.
            let newer = inner.runs.pop().ok_or_else(state_error)?;
            let older = inner.runs.pop().ok_or_else(state_error)?;
            newer.remove_files();
            older.remove_files();

            if let Some(run) = merged {
                inner.runs.push(run);
                sort_runs(&mut inner.runs);
            }
        }
        Ok(())
    }

    /// Issues a strictly monotonic microsecond timestamp for run naming.
    fn next_timestamp(inner: &mut StoreInner) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        let timestamp = now.max(inner.last_timestamp + 1);
        inner.last_timestamp = timestamp;
        timestamp
    }
}

fn state_error() -> StoreError {
    StoreError::Internal("run list changed during compaction".into())
}

/// Orders the run list (level descending, timestamp ascending): oldest
/// data first, newest last. Reads iterate in reverse.
fn sort_runs(runs: &mut [Run]) {
    runs.sort_by(|a, b| {
        b.level()
            .cmp(&a.level())
            .then(a.timestamp().cmp(&b.timestamp()))
    });
}

/// Fsyncs the store directory so renames within it are durable.
fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    if let Ok(handle) = fs::File::open(dir) {
        handle.sync_all()?;
    }
    Ok(())
}

//! # Compaction Module
//!
//! Leveled, size-triggered compaction: whenever the two newest runs share
//! a level `L`, they are merged into a single run at level `L + 1`. The
//! engine re-examines the run list after every merge, so a flush can
//! cascade — two level-0 runs become a level-1 run, which may immediately
//! merge with an existing level-1 run into level 2, and so on.
//!
//! ## Merge mechanics
//!
//! Both inputs are walked through [`LeafCursor`]s — a linear pass over
//! their leaf pages, one page in memory per input. On each step the
//! smaller key is consumed; on equal keys the **newer** run's pair wins
//! and both cursors advance. Output pairs stream into a [`RunBuilder`],
//! which packs full leaves and rebuilds the internal levels at the end.
//!
//! ## Tombstones
//!
//! A tombstone must survive every merge while any older run could still
//! hold a value for its key — dropping it early would resurrect the
//! deleted pair. Only when the output level is deeper than every run that
//! existed before the merge can tombstones be physically removed; the
//! engine computes that condition and passes `remove_tombstones`.
//!
//! The merged run's bloom filter is the union of the two source filters:
//! the merged key set is contained in the union, so no false negative is
//! possible; keys discarded by tombstone removal merely become false
//! positives, which filters are allowed to produce.
//!
//! ## Failure behavior
//!
//! Any I/O error aborts the merge, removes the temporary files, and
//! leaves the source runs (and the engine's run list) untouched. Merging
//! runs of different levels is a programming error and is rejected
//! before any I/O happens.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bloom::FilterError;
use crate::memtable::TOMBSTONE;
use crate::sstable::{LeafCursor, Run, RunBuilder, SstError, filter_path, run_file_name};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by the compactor.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// Attempted to merge runs from different levels — only ever
    /// reachable through a sequencing bug in the caller.
    #[error("cannot merge runs of different levels ({left} vs {right})")]
    IncompatibleLevels {
        /// Level of the older input run.
        left: u32,
        /// Level of the newer input run.
        right: u32,
    },

    /// Run read/write failure.
    #[error("run error: {0}")]
    Sst(#[from] SstError),

    /// Bloom filter union or sidecar write failure.
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),
}

// ------------------------------------------------------------------------------------------------
// Merge
// ------------------------------------------------------------------------------------------------

/// Merges two same-level runs into one run at the next level.
///
/// `older` and `newer` must be, respectively, the older and newer of the
/// two newest runs; on equal keys the pair from `newer` is kept. When
/// `remove_tombstones` is set, tombstoned pairs are dropped before they
/// reach the output.
///
/// Returns the new run descriptor, or `None` when tombstone removal
/// eliminated every pair (the sources should then simply be retired).
/// Source files are **not** deleted here — the engine swaps its run list
/// first and then removes them, so a failure can never lose data.
pub fn merge_runs(
    dir: &Path,
    older: &Run,
    newer: &Run,
    remove_tombstones: bool,
    timestamp: u64,
) -> Result<Option<Run>, CompactionError> {
    if older.level() != newer.level() {
        return Err(CompactionError::IncompatibleLevels {
            left: older.level(),
            right: newer.level(),
        });
    }

    let output_level = older.level() + 1;
    let output_path = dir.join(run_file_name(output_level, timestamp));

    debug!(
        older = %older.path().display(),
        newer = %newer.path().display(),
        output = %output_path.display(),
        remove_tombstones,
        "merging runs"
    );

    let mut left = LeafCursor::new(older)?;
    let mut right = LeafCursor::new(newer)?;
    let mut builder = RunBuilder::new(output_path.clone())?;
    let mut dropped_tombstones = 0u64;

    let mut emit = |builder: &mut RunBuilder, key: i32, value: i32| -> Result<(), SstError> {
        if remove_tombstones && value == TOMBSTONE {
            dropped_tombstones += 1;
            return Ok(());
        }
        builder.push(key, value)
    };

    loop {
        match (left.peek(), right.peek()) {
            (Some((lk, lv)), Some((rk, rv))) => {
                if lk < rk {
                    emit(&mut builder, lk, lv)?;
                    left.advance()?;
                } else if rk < lk {
                    emit(&mut builder, rk, rv)?;
                    right.advance()?;
                } else {
                    // Equal keys: the newer run's pair wins.
                    emit(&mut builder, rk, rv)?;
                    left.advance()?;
                    right.advance()?;
                }
            }
            (Some((lk, lv)), None) => {
                emit(&mut builder, lk, lv)?;
                left.advance()?;
            }
            (None, Some((rk, rv))) => {
                emit(&mut builder, rk, rv)?;
                right.advance()?;
            }
            (None, None) => break,
        }
    }

    if builder.pair_count() == 0 {
        // Terminal-level merge of pure tombstones: nothing survives.
        builder.discard();
        info!(
            older = %older.path().display(),
            newer = %newer.path().display(),
            dropped_tombstones,
            "merge produced an empty run; sources will be retired without replacement"
        );
        return Ok(None);
    }

    let summary = builder.finish()?;

    let filter = older.filter().union(newer.filter())?;
    if let Err(e) = filter.write_to(filter_path(&output_path)) {
        // The run file already reached its final name; withdraw it so a
        // future open never sees a run without its sidecar.
        if let Err(rm) = fs::remove_file(&output_path) {
            warn!(path = %output_path.display(), %rm, "failed to remove run after filter write failure");
        }
        return Err(e.into());
    }

    info!(
        output = %output_path.display(),
        output_level,
        pairs = summary.pairs,
        leaf_pages = summary.leaf_pages,
        internal_pages = summary.internal_pages,
        dropped_tombstones,
        "compaction merge complete"
    );

    Ok(Some(Run::new(output_path, output_level, timestamp, filter)))
}

//! Run builder — streaming bottom-up construction of a static B-tree run.
//!
//! [`RunBuilder`] accepts key/value pairs in strictly ascending key order
//! (tombstones included) and writes a complete run file:
//!
//! 1. Pairs are buffered into leaves of up to [`PAGE_MAX_ENTRIES`]
//!    entries; each completed leaf is appended to a temporary leaf file
//!    and its max-key recorded.
//! 2. At [`RunBuilder::finish`], internal levels are built from the leaf
//!    max-keys — groups of up to `PAGE_MAX_ENTRIES` children per page —
//!    repeating until a single root remains. Page indices are assigned
//!    level by level, top-down, left-to-right, with the root at index 0,
//!    and each internal entry's placeholder is rewritten with its child's
//!    final index.
//! 3. Internal pages are written to a second temporary file, the leaf
//!    file is appended, the result is fsynced and renamed into place.
//!
//! A failure at any step removes the temporary files and leaves the final
//! path untouched.
//!
//! # Input Requirements
//!
//! - Keys **must** be pushed in strictly ascending order; the memtable
//!   and the compaction merge both produce exactly that.
//! - At least one pair must be pushed before `finish` — an empty run has
//!   no representable root. Callers that may end up empty (terminal-level
//!   compaction can drop every pair) check [`RunBuilder::pair_count`] and
//!   call [`RunBuilder::discard`] instead.

use std::fs::{self, File, rename};
use std::io::{self, BufWriter, Write};
use std::mem;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{PAGE_MAX_ENTRIES, Page, SstError, io_err};

// ------------------------------------------------------------------------------------------------
// BuildSummary
// ------------------------------------------------------------------------------------------------

/// Statistics reported by a completed build.
#[derive(Debug, Clone, Copy)]
pub struct BuildSummary {
    /// Pairs written, tombstones included.
    pub pairs: u64,

    /// Leaf pages emitted.
    pub leaf_pages: u32,

    /// Internal pages emitted (at least one — the root).
    pub internal_pages: u32,
}

// ------------------------------------------------------------------------------------------------
// RunBuilder
// ------------------------------------------------------------------------------------------------

/// Builds one immutable run file from an ascending stream of pairs.
pub struct RunBuilder {
    final_path: PathBuf,
    tree_tmp_path: PathBuf,
    leaf_tmp_path: PathBuf,
    leaf_writer: BufWriter<File>,
    pending: Vec<(i32, i32)>,
    leaf_max_keys: Vec<i32>,
    pairs: u64,
}

impl RunBuilder {
    /// Opens the temporary leaf file and prepares a builder targeting
    /// `final_path`.
    pub fn new(final_path: PathBuf) -> Result<Self, SstError> {
        let tree_tmp_path = final_path.with_extension("sst.build.tmp");
        let leaf_tmp_path = final_path.with_extension("sst.leaves.tmp");

        let leaf_file = File::create(&leaf_tmp_path).map_err(|e| io_err(&leaf_tmp_path, e))?;

        Ok(Self {
            final_path,
            tree_tmp_path,
            leaf_tmp_path,
            leaf_writer: BufWriter::new(leaf_file),
            pending: Vec::with_capacity(PAGE_MAX_ENTRIES),
            leaf_max_keys: Vec::new(),
            pairs: 0,
        })
    }

    /// Appends one pair. Keys must arrive in strictly ascending order.
    pub fn push(&mut self, key: i32, value: i32) -> Result<(), SstError> {
        debug_assert!(
            self.pending.last().is_none_or(|&(prev, _)| prev < key),
            "run builder keys must be strictly ascending"
        );

        self.pending.push((key, value));
        self.pairs += 1;

        if self.pending.len() == PAGE_MAX_ENTRIES {
            self.flush_leaf()?;
        }
        Ok(())
    }

    /// Pairs pushed so far.
    pub fn pair_count(&self) -> u64 {
        self.pairs
    }

    /// Writes the buffered pairs as one leaf page and records its
    /// max-key for internal-level construction.
    fn flush_leaf(&mut self) -> Result<(), SstError> {
        let entries = mem::take(&mut self.pending);
        let max_key = entries[entries.len() - 1].0;

        let page = Page::leaf(entries);
        self.leaf_writer
            .write_all(&page.encode())
            .map_err(|e| io_err(&self.leaf_tmp_path, e))?;

        self.leaf_max_keys.push(max_key);
        self.pending = Vec::with_capacity(PAGE_MAX_ENTRIES);
        Ok(())
    }

    /// Completes the run: drains the final partial leaf, builds the
    /// internal levels, concatenates internals + leaves into the final
    /// path, fsyncs, and cleans up the temporaries.
    pub fn finish(mut self) -> Result<BuildSummary, SstError> {
        let result = self.finish_inner();
        if result.is_err() {
            remove_quiet(&self.tree_tmp_path);
            remove_quiet(&self.leaf_tmp_path);
        }
        result
    }

    fn finish_inner(&mut self) -> Result<BuildSummary, SstError> {
        if !self.pending.is_empty() {
            self.flush_leaf()?;
        }
        if self.leaf_max_keys.is_empty() {
            return Err(SstError::Internal(
                "cannot build a run from zero pairs".into(),
            ));
        }

        self.leaf_writer
            .flush()
            .map_err(|e| io_err(&self.leaf_tmp_path, e))?;

        let internals = build_internal_pages(&self.leaf_max_keys);

        let mut file =
            File::create(&self.tree_tmp_path).map_err(|e| io_err(&self.tree_tmp_path, e))?;
        {
            let mut writer = BufWriter::new(&mut file);
            for page in &internals {
                writer
                    .write_all(&page.encode())
                    .map_err(|e| io_err(&self.tree_tmp_path, e))?;
            }

            let mut leaf_file =
                File::open(&self.leaf_tmp_path).map_err(|e| io_err(&self.leaf_tmp_path, e))?;
            io::copy(&mut leaf_file, &mut writer).map_err(|e| io_err(&self.tree_tmp_path, e))?;

            writer
                .flush()
                .map_err(|e| io_err(&self.tree_tmp_path, e))?;
        }
        file.sync_all().map_err(|e| io_err(&self.tree_tmp_path, e))?;
        drop(file);

        rename(&self.tree_tmp_path, &self.final_path).map_err(|e| io_err(&self.final_path, e))?;
        remove_quiet(&self.leaf_tmp_path);

        let summary = BuildSummary {
            pairs: self.pairs,
            leaf_pages: self.leaf_max_keys.len() as u32,
            internal_pages: internals.len() as u32,
        };
        debug!(
            path = %self.final_path.display(),
            pairs = summary.pairs,
            leaf_pages = summary.leaf_pages,
            internal_pages = summary.internal_pages,
            "run built"
        );
        Ok(summary)
    }

    /// Abandons the build, removing the temporary files. The final path
    /// is never touched.
    pub fn discard(self) {
        remove_quiet(&self.tree_tmp_path);
        remove_quiet(&self.leaf_tmp_path);
    }
}

fn remove_quiet(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), %e, "failed to remove temporary build file");
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Internal-level construction
// ------------------------------------------------------------------------------------------------

/// Builds the internal pages for a run whose leaves have the given
/// max-keys, returned in file order (root first, then level by level,
/// left-to-right).
///
/// Every internal page stores one `(max_key, child_index)` entry per
/// child plus a trailing rightmost pointer duplicating its last child, so
/// that keys greater than every separator descend into the last subtree
/// and miss at its leaf. A single-leaf run still gets an internal root
/// holding that leaf's one separator.
fn build_internal_pages(leaf_max_keys: &[i32]) -> Vec<Page> {
    // Group max-keys bottom-up until a single root page remains. Each
    // level is a list of pages; each page is the max-keys of its children.
    let mut levels: Vec<Vec<Vec<i32>>> = Vec::new();
    let mut current: Vec<i32> = leaf_max_keys.to_vec();
    loop {
        let pages: Vec<Vec<i32>> = current
            .chunks(PAGE_MAX_ENTRIES)
            .map(|chunk| chunk.to_vec())
            .collect();
        let is_root = pages.len() == 1;
        current = pages
            .iter()
            .map(|page| page[page.len() - 1])
            .collect();
        levels.push(pages);
        if is_root {
            break;
        }
    }
    levels.reverse(); // root level first

    // Page index of the first page in each level; the slot past the last
    // internal level is where the leaves start.
    let mut level_starts = Vec::with_capacity(levels.len() + 1);
    level_starts.push(0usize);
    for level in &levels {
        let last = *level_starts.last().unwrap_or(&0);
        level_starts.push(last + level.len());
    }

    // Children of level `li` are the pages of level `li + 1`, or the
    // leaves below the last internal level; either way they occupy
    // consecutive indices starting at `level_starts[li + 1]`.
    let mut pages_out = Vec::new();
    for (li, level) in levels.iter().enumerate() {
        let child_start = level_starts[li + 1];
        let mut consumed = 0usize;
        for page_keys in level {
            let entries: Vec<(i32, i32)> = page_keys
                .iter()
                .enumerate()
                .map(|(j, &max_key)| (max_key, (child_start + consumed + j) as i32))
                .collect();
            let rightmost = (child_start + consumed + page_keys.len() - 1) as u32;
            consumed += page_keys.len();
            pages_out.push(Page::internal(entries, rightmost));
        }
    }
    pages_out
}

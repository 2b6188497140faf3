//! # Sorted Run (SST) Module
//!
//! This module implements the **immutable**, **page-structured** sorted
//! runs the engine persists to disk. Each run is a static B-tree laid out
//! over fixed 4 KiB pages: internal pages first in BFS order with the root
//! at page index 0, then leaf pages in ascending key order. Because runs
//! are write-once, the tree is built bottom-up in a single pass — leaves
//! packed to capacity, internal levels derived from leaf max-keys — with
//! no insertion or rotation logic anywhere.
//!
//! # On-disk layout
//!
//! A run file is a sequence of 4096-byte pages:
//!
//! ```text
//! [INTERNAL PAGE 0 = root][INTERNAL PAGE 1]...[LEAF PAGE]...[LEAF PAGE]
//! ```
//!
//! Each page (little-endian):
//!
//! ```text
//! offset 0  : page_type      u32   { 0 = invalid, 1 = internal, 2 = leaf }
//! offset 4  : entry_count    i32
//! offset 8  : entries        count × (key i32, value i32)
//! then      : (internal only) rightmost_child i32
//! remaining : zero padding to 4096
//! ```
//!
//! Leaf entries are key/value pairs; internal entries are
//! `(subtree_max_key, child_page_index)` with child indices absolute
//! within the run. The trailing rightmost pointer covers keys strictly
//! greater than the last separator. Within every page keys are strictly
//! increasing.
//!
//! Run files are named `sst_LLLL_TTTTTTTTTTTTTTTT.sst` (zero-padded level,
//! zero-padded microsecond timestamp) and carry a `.filter` sidecar with
//! the run's bloom filter. The name establishes a total order by
//! (level, timestamp) that the engine relies on for recency.
//!
//! # Sub-modules
//!
//! - [`builder`] — [`RunBuilder`] for streaming bottom-up construction.
//! - [`iterator`] — [`LeafCursor`] for sequential leaf iteration during
//!   compaction merges.
//!
//! # Guarantees
//!
//! - **Immutability:** once renamed into place, a run is never modified.
//! - **Root sanity:** loading a run decodes page 0 and rejects files whose
//!   root is not a valid page.
//! - **Atomicity:** runs are written to temporary paths and renamed into
//!   place; a crash cannot leave a half-written run under the final name.

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod builder;
pub mod iterator;

#[cfg(test)]
mod tests;

pub use builder::{BuildSummary, RunBuilder};
pub use iterator::LeafCursor;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs::{self, File};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::bloom::{BloomFilter, FilterError};
use crate::buffer_pool::BufferPool;
use crate::encoding::{Decode, Encode};
use crate::memtable::TOMBSTONE;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Fixed on-disk page size in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Bytes of page header preceding the entry array (type + count).
pub const PAGE_HEADER_SIZE: usize = 8;

/// Maximum entries per page: `(PAGE_SIZE − 16) / 8`. The 16 reserves the
/// header plus the internal page's trailing child pointer.
pub const PAGE_MAX_ENTRIES: usize = (PAGE_SIZE - 16) / 8;

/// Upper bound on descent depth; a 510-way tree over every possible `i32`
/// key is 4 levels deep, so exceeding this means a corrupt child pointer
/// cycle.
pub(crate) const MAX_TREE_DEPTH: usize = 16;

/// Extension of the bloom filter sidecar, appended to the run file name.
const FILTER_EXTENSION: &str = "sst.filter";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// A structural defect found while decoding a single page.
#[derive(Debug, Error)]
pub enum PageError {
    /// The page buffer was not exactly [`PAGE_SIZE`] bytes.
    #[error("page buffer is {0} bytes, expected 4096")]
    BadLength(usize),

    /// The page type tag was not a known variant.
    #[error("unknown page type tag {0}")]
    BadType(u32),

    /// The entry count was outside `1..=PAGE_MAX_ENTRIES`.
    #[error("impossible entry count {0}")]
    BadCount(i32),

    /// Keys were not strictly increasing.
    #[error("keys out of order at entry {0}")]
    KeysOutOfOrder(usize),

    /// An internal page carried a negative child pointer.
    #[error("negative child page index {0}")]
    BadChild(i32),
}

/// Errors returned by run operations (read, write, build).
#[derive(Debug, Error)]
pub enum SstError {
    /// Underlying I/O error, annotated with the file it touched.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File involved in the failed operation.
        path: PathBuf,
        /// Underlying cause.
        source: io::Error,
    },

    /// A page failed structural validation.
    #[error("corrupt page {page_index} in {}: {reason}", .path.display())]
    CorruptPage {
        /// Run file containing the page.
        path: PathBuf,
        /// Zero-based page index within the run.
        page_index: u32,
        /// The structural defect.
        #[source]
        reason: PageError,
    },

    /// A run file name did not follow the `sst_LLLL_TIMESTAMP.sst` scheme.
    #[error("invalid run file name: {0}")]
    InvalidRunName(String),

    /// Bloom filter sidecar failure.
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Annotates an `io::Error` with the path it occurred on.
pub(crate) fn io_err(path: &Path, source: io::Error) -> SstError {
    SstError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ------------------------------------------------------------------------------------------------
// Page
// ------------------------------------------------------------------------------------------------

/// Discriminates the two live page kinds. Tag 0 is reserved for invalid
/// (zeroed) pages and is rejected on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Separator page: entries are `(subtree_max_key, child_page_index)`.
    Internal,
    /// Data page: entries are `(key, value)`.
    Leaf,
}

impl PageType {
    fn tag(self) -> u32 {
        match self {
            PageType::Internal => 1,
            PageType::Leaf => 2,
        }
    }

    fn from_tag(tag: u32) -> Result<Self, PageError> {
        match tag {
            1 => Ok(PageType::Internal),
            2 => Ok(PageType::Leaf),
            other => Err(PageError::BadType(other)),
        }
    }
}

/// One decoded 4 KiB page.
///
/// Pages are immutable once built; the buffer pool hands out cheap clones
/// of cached copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Leaf or internal.
    pub page_type: PageType,

    /// Sorted `(key, value)` entries. For internal pages the value is a
    /// child page index.
    pub entries: Vec<(i32, i32)>,

    /// Trailing child pointer of internal pages, covering keys strictly
    /// greater than the last separator. `None` for leaves.
    pub rightmost_child: Option<u32>,
}

impl Page {
    /// Builds a leaf page from sorted entries.
    pub fn leaf(entries: Vec<(i32, i32)>) -> Self {
        debug_assert!(!entries.is_empty() && entries.len() <= PAGE_MAX_ENTRIES);
        Self {
            page_type: PageType::Leaf,
            entries,
            rightmost_child: None,
        }
    }

    /// Builds an internal page from sorted separator entries and the
    /// trailing rightmost child pointer.
    pub fn internal(entries: Vec<(i32, i32)>, rightmost_child: u32) -> Self {
        debug_assert!(!entries.is_empty() && entries.len() <= PAGE_MAX_ENTRIES);
        Self {
            page_type: PageType::Internal,
            entries,
            rightmost_child: Some(rightmost_child),
        }
    }

    /// True for leaf pages.
    pub fn is_leaf(&self) -> bool {
        self.page_type == PageType::Leaf
    }

    /// Smallest key on the page.
    pub fn min_key(&self) -> i32 {
        self.entries[0].0
    }

    /// Largest key on the page.
    pub fn max_key(&self) -> i32 {
        self.entries[self.entries.len() - 1].0
    }

    /// Binary-searches a leaf page for `key`.
    pub fn lookup(&self, key: i32) -> Option<i32> {
        self.entries
            .binary_search_by_key(&key, |&(k, _)| k)
            .ok()
            .map(|idx| self.entries[idx].1)
    }

    /// Selects the child page to descend into for `key`: the first entry
    /// whose separator is `>= key`, or the rightmost child when every
    /// separator is smaller.
    pub fn find_child(&self, key: i32) -> u32 {
        match self.entries.partition_point(|&(k, _)| k < key) {
            idx if idx < self.entries.len() => self.entries[idx].1 as u32,
            _ => self.rightmost_child.unwrap_or(self.entries[0].1 as u32),
        }
    }

    /// Entries with `k1 <= key <= k2`, in ascending key order.
    pub fn scan_range(&self, k1: i32, k2: i32) -> impl Iterator<Item = (i32, i32)> + '_ {
        let start = self.entries.partition_point(|&(k, _)| k < k1);
        self.entries[start..]
            .iter()
            .take_while(move |&&(k, _)| k <= k2)
            .copied()
    }

    /// Serializes the page to its exact 4096-byte on-disk form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PAGE_SIZE);
        self.page_type.tag().encode_to(&mut buf);
        (self.entries.len() as i32).encode_to(&mut buf);
        for &(key, value) in &self.entries {
            key.encode_to(&mut buf);
            value.encode_to(&mut buf);
        }
        if let Some(child) = self.rightmost_child {
            (child as i32).encode_to(&mut buf);
        }
        buf.resize(PAGE_SIZE, 0);
        buf
    }

    /// Decodes and validates one on-disk page.
    pub fn decode(buf: &[u8]) -> Result<Self, PageError> {
        if buf.len() != PAGE_SIZE {
            return Err(PageError::BadLength(buf.len()));
        }

        // Header fields are fixed-width; decode failures cannot occur on
        // a full page buffer, so only the tag needs checking.
        let (tag, _) = u32::decode_from(buf).map_err(|_| PageError::BadLength(buf.len()))?;
        let page_type = PageType::from_tag(tag)?;
        let (count, _) =
            i32::decode_from(&buf[4..]).map_err(|_| PageError::BadLength(buf.len()))?;

        if count < 1 || count as usize > PAGE_MAX_ENTRIES {
            return Err(PageError::BadCount(count));
        }
        let count = count as usize;

        let mut entries = Vec::with_capacity(count);
        let mut off = PAGE_HEADER_SIZE;
        for idx in 0..count {
            let (key, n) =
                i32::decode_from(&buf[off..]).map_err(|_| PageError::BadCount(count as i32))?;
            off += n;
            let (value, n) =
                i32::decode_from(&buf[off..]).map_err(|_| PageError::BadCount(count as i32))?;
            off += n;

            if entries.last().is_some_and(|&(prev, _)| key <= prev) {
                return Err(PageError::KeysOutOfOrder(idx));
            }
            if page_type == PageType::Internal && value < 0 {
                return Err(PageError::BadChild(value));
            }
            entries.push((key, value));
        }

        let rightmost_child = match page_type {
            PageType::Leaf => None,
            PageType::Internal => {
                let (child, _) =
                    i32::decode_from(&buf[off..]).map_err(|_| PageError::BadCount(count as i32))?;
                if child < 0 {
                    return Err(PageError::BadChild(child));
                }
                Some(child as u32)
            }
        };

        Ok(Self {
            page_type,
            entries,
            rightmost_child,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// Direct page I/O
// ------------------------------------------------------------------------------------------------

/// Reads and validates the page at `page_index` from a run file.
///
/// Opens the file read-only for this single positional read; no long-lived
/// descriptors are kept anywhere in the engine.
pub fn read_page(path: &Path, page_index: u32) -> Result<Page, SstError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;

    let mut buf = [0u8; PAGE_SIZE];
    file.read_exact_at(&mut buf, page_index as u64 * PAGE_SIZE as u64)
        .map_err(|e| io_err(path, e))?;

    Page::decode(&buf).map_err(|reason| SstError::CorruptPage {
        path: path.to_path_buf(),
        page_index,
        reason,
    })
}

/// Number of 4 KiB pages in a run file.
pub fn page_count(path: &Path) -> Result<u32, SstError> {
    let len = fs::metadata(path).map_err(|e| io_err(path, e))?.len();
    Ok((len / PAGE_SIZE as u64) as u32)
}

// ------------------------------------------------------------------------------------------------
// Run naming
// ------------------------------------------------------------------------------------------------

/// Formats the canonical run file name for a level and timestamp.
pub fn run_file_name(level: u32, timestamp: u64) -> String {
    format!("sst_{level:04}_{timestamp:016}.sst")
}

/// Parses `sst_LLLL_TTTTTTTTTTTTTTTT.sst` into `(level, timestamp)`.
pub fn parse_run_file_name(name: &str) -> Option<(u32, u64)> {
    let stem = name.strip_prefix("sst_")?.strip_suffix(".sst")?;
    let (level, timestamp) = stem.split_once('_')?;
    if level.len() != 4 || timestamp.len() != 16 {
        return None;
    }
    Some((level.parse().ok()?, timestamp.parse().ok()?))
}

/// Path of the bloom filter sidecar for a run file.
pub fn filter_path(run_path: &Path) -> PathBuf {
    run_path.with_extension(FILTER_EXTENSION)
}

// ------------------------------------------------------------------------------------------------
// GetResult
// ------------------------------------------------------------------------------------------------

/// Result of a single key lookup in one run.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RunGetResult {
    /// A live value stored in this run.
    Value(i32),

    /// A tombstone for this key; authoritative over every older run.
    Tombstone,

    /// This run has no information about the key.
    NotFound,
}

impl RunGetResult {
    fn from_raw(raw: Option<i32>) -> Self {
        match raw {
            Some(TOMBSTONE) => RunGetResult::Tombstone,
            Some(value) => RunGetResult::Value(value),
            None => RunGetResult::NotFound,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Run — immutable on-disk sorted run
// ------------------------------------------------------------------------------------------------

/// Descriptor of one immutable run: its file, its position in the level
/// hierarchy, and its bloom filter.
///
/// The descriptor owns the filter; page bytes are fetched on demand
/// through the buffer pool.
#[derive(Debug)]
pub struct Run {
    /// Path of the run file. Shared with buffer-pool cache keys.
    path: Arc<PathBuf>,

    /// Compaction level encoded in the file name (0 = fresh flush).
    level: u32,

    /// Creation timestamp in microseconds, encoded in the file name.
    timestamp: u64,

    /// Membership filter covering every key in the run, tombstones
    /// included.
    filter: BloomFilter,
}

impl Run {
    /// Wraps a freshly written run whose metadata is already known.
    pub fn new(path: PathBuf, level: u32, timestamp: u64, filter: BloomFilter) -> Self {
        Self {
            path: Arc::new(path),
            level,
            timestamp,
            filter,
        }
    }

    /// Loads an existing run from disk: parses the level and timestamp
    /// out of the file name, reads the filter sidecar (rejecting size
    /// mismatches), and verifies that page 0 decodes as a valid root.
    pub fn load(path: PathBuf) -> Result<Self, SstError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SstError::InvalidRunName(path.display().to_string()))?;
        let (level, timestamp) = parse_run_file_name(name)
            .ok_or_else(|| SstError::InvalidRunName(name.to_string()))?;

        // Resurrecting a run with a garbage root would poison every later
        // read; fail at open time instead.
        read_page(&path, 0)?;

        let filter = BloomFilter::read_from(filter_path(&path))?;

        Ok(Self {
            path: Arc::new(path),
            level,
            timestamp,
            filter,
        })
    }

    /// Path of the run file.
    pub fn path(&self) -> &Arc<PathBuf> {
        &self.path
    }

    /// Compaction level of this run.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Creation timestamp (microseconds since the Unix epoch).
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The run's bloom filter.
    pub fn filter(&self) -> &BloomFilter {
        &self.filter
    }

    /// True when the filter admits the possibility that `key` is present.
    pub fn may_contain(&self, key: i32) -> bool {
        self.filter.may_contain(key)
    }

    /// Point lookup by tree descent from the root page.
    pub fn get(&self, key: i32, pool: &mut BufferPool) -> Result<RunGetResult, SstError> {
        let mut page_index = 0u32;

        for _ in 0..MAX_TREE_DEPTH {
            let page = self.cached_page(pool, page_index)?;
            match page.page_type {
                PageType::Leaf => return Ok(RunGetResult::from_raw(page.lookup(key))),
                PageType::Internal => page_index = page.find_child(key),
            }
        }

        Err(SstError::Internal(format!(
            "descent exceeded {MAX_TREE_DEPTH} levels in {}",
            self.path.display()
        )))
    }

    /// Point lookup without consulting internal pages: binary search over
    /// the file's pages by leaf min/max key. Internal pages sort before
    /// every leaf, so the probe moves right past them. Produces the same
    /// answer as [`Run::get`].
    pub fn binary_search_get(
        &self,
        key: i32,
        pool: &mut BufferPool,
    ) -> Result<RunGetResult, SstError> {
        let pages = page_count(&self.path)? as i64;
        let mut left = 0i64;
        let mut right = pages - 1;

        while left <= right {
            let mid = left + (right - left) / 2;
            let page = self.cached_page(pool, mid as u32)?;

            if !page.is_leaf() {
                // All internal pages precede the leaves.
                left = mid + 1;
            } else if key < page.min_key() {
                right = mid - 1;
            } else if key > page.max_key() {
                left = mid + 1;
            } else {
                return Ok(RunGetResult::from_raw(page.lookup(key)));
            }
        }

        Ok(RunGetResult::NotFound)
    }

    /// Range scan over `k1 <= key <= k2` within this run.
    ///
    /// Descends to the leaf containing `k1`, then walks the leaf chain by
    /// incrementing the page index while the current leaf can still hold
    /// keys inside the range. Tombstones are returned as ordinary pairs.
    pub fn scan(
        &self,
        k1: i32,
        k2: i32,
        pool: &mut BufferPool,
    ) -> Result<Vec<(i32, i32)>, SstError> {
        let pages = page_count(&self.path)?;
        let mut result = Vec::new();

        // Descend for the range start.
        let mut page_index = 0u32;
        let mut page = self.cached_page(pool, page_index)?;
        for _ in 0..MAX_TREE_DEPTH {
            if page.is_leaf() {
                break;
            }
            page_index = page.find_child(k1);
            page = self.cached_page(pool, page_index)?;
        }
        if !page.is_leaf() {
            return Err(SstError::Internal(format!(
                "descent exceeded {MAX_TREE_DEPTH} levels in {}",
                self.path.display()
            )));
        }

        // Walk consecutive leaves until the range is exhausted.
        loop {
            result.extend(page.scan_range(k1, k2));

            if page.max_key() >= k2 {
                break;
            }
            page_index += 1;
            if page_index >= pages {
                break;
            }
            page = self.cached_page(pool, page_index)?;
            if !page.is_leaf() {
                break;
            }
        }

        Ok(result)
    }

    /// Fetches a page through the buffer pool, loading from disk on miss.
    fn cached_page(&self, pool: &mut BufferPool, page_index: u32) -> Result<Page, SstError> {
        let path = Arc::clone(&self.path);
        pool.get_page(&self.path, page_index, move || read_page(&path, page_index))
    }

    /// Removes the run file and its filter sidecar, logging (rather than
    /// surfacing) cleanup failures: the run has already been replaced in
    /// the engine's view, so a leftover file only wastes space.
    pub fn remove_files(&self) {
        if let Err(e) = fs::remove_file(self.path.as_ref()) {
            warn!(path = %self.path.display(), %e, "failed to remove retired run file");
        }
        let fpath = filter_path(&self.path);
        if let Err(e) = fs::remove_file(&fpath) {
            warn!(path = %fpath.display(), %e, "failed to remove retired filter file");
        }
    }
}

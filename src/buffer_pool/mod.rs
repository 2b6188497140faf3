//! # Buffer Pool Module
//!
//! Page-grained read cache shared by every run in a store.
//!
//! Pages are keyed by `(run file path, page index)` and evicted in strict
//! least-recently-used order once the configured page capacity is
//! reached. A hit promotes the page to most-recently-used and returns a
//! clone of the cached copy; a miss invokes the caller-supplied loader,
//! inserts the result (evicting the LRU entry when full), and returns it.
//!
//! The pool never touches the filesystem itself — the loader callback is
//! injected per call, which keeps page I/O policy (positional 4 KiB
//! reads, per-operation file handles) in the run reader where it belongs.
//!
//! After a compaction retires a run, its cached pages become unreachable
//! and simply age out of the LRU; [`BufferPool::evict_all`] exists for
//! callers that want eager reclamation.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use lru::LruCache;
use tracing::trace;

use crate::sstable::Page;

// ------------------------------------------------------------------------------------------------
// Types
// ------------------------------------------------------------------------------------------------

/// Cache key: one page of one run file.
///
/// The run path doubles as the file identifier — run paths are stable for
/// the lifetime of the file and unique across levels and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PageKey {
    file: Arc<PathBuf>,
    page_index: u32,
}

/// Hit/miss counters, surfaced through the engine's `stats()` snapshot
/// and used by tests to observe which lookups touched disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Lookups served from the cache.
    pub hits: u64,

    /// Lookups that invoked the loader.
    pub misses: u64,
}

/// A fixed-capacity page cache with strict LRU eviction.
#[derive(Debug)]
pub struct BufferPool {
    cache: LruCache<PageKey, Page>,
    stats: PoolStats,
}

impl BufferPool {
    /// Creates a pool holding at most `capacity_pages` pages. A zero
    /// capacity is clamped to one page.
    pub fn new(capacity_pages: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity_pages.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            stats: PoolStats::default(),
        }
    }

    /// Returns the page at `(file, page_index)`, from cache when present
    /// (promoting it to most-recently-used) or via `loader` otherwise.
    ///
    /// The returned page is byte-identical to what `loader` would have
    /// produced: entries are inserted exactly as loaded and never mutated.
    pub fn get_page<E>(
        &mut self,
        file: &Arc<PathBuf>,
        page_index: u32,
        loader: impl FnOnce() -> Result<Page, E>,
    ) -> Result<Page, E> {
        let key = PageKey {
            file: Arc::clone(file),
            page_index,
        };

        if let Some(page) = self.cache.get(&key) {
            self.stats.hits += 1;
            trace!(file = %file.display(), page_index, "buffer pool hit");
            return Ok(page.clone());
        }

        let page = loader()?;
        self.stats.misses += 1;
        trace!(file = %file.display(), page_index, "buffer pool miss");

        // `push` evicts the least-recently-used entry when at capacity.
        let _evicted = self.cache.push(key, page.clone());
        Ok(page)
    }

    /// Drops every cached page. Counters are preserved.
    pub fn evict_all(&mut self) {
        self.cache.clear();
    }

    /// Number of pages currently cached.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Hit/miss counters since construction.
    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}

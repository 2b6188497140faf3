//! Leaf cursor — sequential iteration over a run's leaf pages.
//!
//! [`LeafCursor`] descends once to the run's leftmost leaf and then walks
//! the leaf chain by incrementing the page index, yielding pairs in
//! ascending key order. It reads pages directly from disk rather than
//! through the buffer pool: its one consumer is the compaction merge,
//! which touches every page of both inputs exactly once — caching that
//! traffic would only evict pages the read path still wants.

use std::path::PathBuf;
use std::sync::Arc;

use super::{MAX_TREE_DEPTH, Run, SstError, page_count, read_page};

/// Streaming cursor over one run's pairs, tombstones included.
pub struct LeafCursor {
    path: Arc<PathBuf>,
    page_count: u32,
    page_index: u32,
    entries: Vec<(i32, i32)>,
    pos: usize,
    exhausted: bool,
}

impl LeafCursor {
    /// Positions a new cursor on the first pair of `run`.
    pub fn new(run: &Run) -> Result<Self, SstError> {
        let path = Arc::clone(run.path());
        let pages = page_count(&path)?;

        // Descend along the leftmost spine to the first leaf.
        let mut page_index = 0u32;
        let mut page = read_page(&path, page_index)?;
        for _ in 0..MAX_TREE_DEPTH {
            if page.is_leaf() {
                break;
            }
            page_index = page.find_child(i32::MIN);
            page = read_page(&path, page_index)?;
        }
        if !page.is_leaf() {
            return Err(SstError::Internal(format!(
                "descent exceeded {MAX_TREE_DEPTH} levels in {}",
                path.display()
            )));
        }

        Ok(Self {
            path,
            page_count: pages,
            page_index,
            entries: page.entries,
            pos: 0,
            exhausted: false,
        })
    }

    /// The pair under the cursor, or `None` once the run is exhausted.
    pub fn peek(&self) -> Option<(i32, i32)> {
        if self.exhausted {
            None
        } else {
            self.entries.get(self.pos).copied()
        }
    }

    /// Moves past the current pair, loading the next leaf when the
    /// current one is drained.
    pub fn advance(&mut self) -> Result<(), SstError> {
        if self.exhausted {
            return Ok(());
        }

        self.pos += 1;
        if self.pos < self.entries.len() {
            return Ok(());
        }

        // Current leaf drained; leaves are consecutive on disk.
        self.page_index += 1;
        if self.page_index >= self.page_count {
            self.exhausted = true;
            return Ok(());
        }

        let page = read_page(&self.path, self.page_index)?;
        if !page.is_leaf() {
            // Leaves are the file's suffix; a non-leaf here means the end.
            self.exhausted = true;
            return Ok(());
        }

        self.entries = page.entries;
        self.pos = 0;
        Ok(())
    }

    /// Convenience: returns the current pair and advances past it.
    pub fn next_pair(&mut self) -> Result<Option<(i32, i32)>, SstError> {
        match self.peek() {
            Some(pair) => {
                self.advance()?;
                Ok(Some(pair))
            }
            None => Ok(None),
        }
    }
}

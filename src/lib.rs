//! # StratumDB
//!
//! An embedded, ordered key-value store for 32-bit integer keys and
//! values, built on a **Log-Structured Merge Tree (LSM-tree)** of
//! page-structured static B-trees. Designed to accept writes at memory
//! speed while keeping on-disk data sorted for efficient lookups and
//! range queries.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Store                            │
//! │  ┌────────────┐   flush    ┌─────────────────────────┐  │
//! │  │  Memtable   │ ────────► │  Runs (static B-trees   │  │
//! │  │  (ordered   │           │  over 4 KiB pages, one  │  │
//! │  │   map)      │           │  bloom filter each)     │  │
//! │  └────────────┘           └───────────┬─────────────┘  │
//! │                                        │ page reads     │
//! │  ┌──────────────────────────┐   ┌──────▼─────────────┐  │
//! │  │ Compaction (merge two    │   │  Buffer pool       │  │
//! │  │ same-level runs → L + 1) │   │  (LRU page cache)  │  │
//! │  └──────────────────────────┘   └────────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Coordinator — open, close, put, get, delete, scan, flush, compact |
//! | [`memtable`] | Bounded in-memory ordered write buffer |
//! | [`sstable`] | Immutable page-structured runs: format, reader, builder, leaf cursor |
//! | [`buffer_pool`] | Page cache keyed by (run, page index) with LRU eviction |
//! | [`bloom`] | Per-run membership filters |
//! | [`compaction`] | Leveled merge of same-level runs |
//! | [`encoding`] | Deterministic little-endian on-disk primitives |
//!
//! ## Key Properties
//!
//! - **Fixed-width data model** — keys and values are `i32`; one unnamed
//!   keyspace per store; `i32::MAX` is reserved as the deletion sentinel.
//! - **Write-once runs** — flushes and compactions build each run bottom-up
//!   in a single pass; no page is ever rewritten.
//! - **Newest-wins reads** — lookups probe the memtable and then runs
//!   newest-first; the first value or tombstone found is final.
//! - **Bloom-filtered lookups** — each run carries a filter sized from the
//!   memtable capacity, so cold keys skip runs without touching disk.
//! - **Leveled compaction** — two same-level runs merge into one at the
//!   next level; tombstones are dropped only once the output is deeper
//!   than every pre-merge run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stratumdb::engine::{Store, StoreConfig};
//!
//! let store = Store::open("/tmp/my_db", StoreConfig::default()).unwrap();
//!
//! // Write
//! store.put(1, 100).unwrap();
//!
//! // Read
//! assert_eq!(store.get(1).unwrap(), Some(100));
//!
//! // Delete
//! store.delete(1).unwrap();
//! assert_eq!(store.get(1).unwrap(), None);
//!
//! // Range scan (inclusive on both ends)
//! store.put(2, 200).unwrap();
//! store.put(3, 300).unwrap();
//! let pairs = store.scan(1, 3).unwrap();
//! assert_eq!(pairs, vec![(2, 200), (3, 300)]);
//!
//! // Graceful shutdown (flushes the memtable)
//! store.close().unwrap();
//! ```

pub mod bloom;
pub mod buffer_pool;
pub mod compaction;
pub mod encoding;
pub mod engine;
pub mod memtable;
pub mod sstable;

pub use engine::{LookupMode, Store, StoreConfig, StoreError, StoreStats};
pub use memtable::TOMBSTONE;

use std::path::Path;

use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

use crate::engine::{Store, StoreConfig};
use crate::memtable::PAIR_BYTES;

pub fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::TRACE)
        .try_init();
}

/// Config whose memtable holds exactly `max_pairs` pairs.
pub fn config_with_capacity(max_pairs: usize) -> StoreConfig {
    StoreConfig {
        memtable_budget_bytes: max_pairs * PAIR_BYTES,
        ..StoreConfig::default()
    }
}

/// Opens a store with a `max_pairs`-pair memtable.
pub fn open_store(dir: &Path, max_pairs: usize) -> Store {
    Store::open(dir, config_with_capacity(max_pairs)).unwrap()
}

/// Number of `.sst` run files currently in the store directory.
pub fn run_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .path()
                .extension()
                .is_some_and(|ext| ext == "sst")
        })
        .count()
}

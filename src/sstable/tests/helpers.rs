use std::path::{Path, PathBuf};

use crate::bloom::BloomFilter;
use crate::sstable::{Run, RunBuilder, filter_path, run_file_name};

/// Builds a complete run (file + filter sidecar) from sorted pairs and
/// returns its descriptor.
pub fn build_run(dir: &Path, level: u32, timestamp: u64, pairs: &[(i32, i32)]) -> Run {
    let path = run_path(dir, level, timestamp);

    let mut filter = BloomFilter::for_capacity(pairs.len().max(1), 8);
    let mut builder = RunBuilder::new(path.clone()).unwrap();
    for &(key, value) in pairs {
        filter.insert(key);
        builder.push(key, value).unwrap();
    }
    builder.finish().unwrap();
    filter.write_to(filter_path(&path)).unwrap();

    Run::new(path, level, timestamp, filter)
}

pub fn run_path(dir: &Path, level: u32, timestamp: u64) -> PathBuf {
    dir.join(run_file_name(level, timestamp))
}

/// Ascending pairs `(base + i, value_of(i))` for building multi-leaf runs.
pub fn sequential_pairs(count: usize) -> Vec<(i32, i32)> {
    (0..count as i32).map(|i| (i, i * 10)).collect()
}

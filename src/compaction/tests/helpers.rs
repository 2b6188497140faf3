use std::path::Path;

use crate::bloom::BloomFilter;
use crate::buffer_pool::BufferPool;
use crate::sstable::{Run, RunBuilder, filter_path, run_file_name};

/// Builds a complete run (file + filter sidecar) from sorted pairs.
pub fn build_run(dir: &Path, level: u32, timestamp: u64, pairs: &[(i32, i32)]) -> Run {
    let path = dir.join(run_file_name(level, timestamp));

    let mut filter = BloomFilter::for_capacity(1024, 8);
    let mut builder = RunBuilder::new(path.clone()).unwrap();
    for &(key, value) in pairs {
        filter.insert(key);
        builder.push(key, value).unwrap();
    }
    builder.finish().unwrap();
    filter.write_to(filter_path(&path)).unwrap();

    Run::new(path, level, timestamp, filter)
}

/// Reads every pair out of a run in key order.
pub fn dump_run(run: &Run) -> Vec<(i32, i32)> {
    let mut pool = BufferPool::new(64);
    run.scan(i32::MIN, i32::MAX, &mut pool).unwrap()
}

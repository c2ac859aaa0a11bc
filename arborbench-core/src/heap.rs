//! Heap instrumentation: a counting global allocator and snapshot artifacts.
//!
//! [`TrackingAllocator`] wraps the system allocator and keeps process-wide
//! counters. A consuming binary opts in with
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOC: arborbench_core::heap::TrackingAllocator = TrackingAllocator::new();
//! ```
//!
//! Without it the counters read zero and memory profiling degenerates to
//! all-zero deltas; timing behavior is unaffected.

use std::alloc::{GlobalAlloc, Layout, System};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

static LIVE_BYTES: AtomicI64 = AtomicI64::new(0);
static TOTAL_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static ALLOC_COUNT: AtomicU64 = AtomicU64::new(0);

/// Counting wrapper around the system allocator.
pub struct TrackingAllocator;

impl TrackingAllocator {
    /// The allocator value for a `#[global_allocator]` static.
    pub const fn new() -> Self {
        TrackingAllocator
    }
}

impl Default for TrackingAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: delegates every operation to `System` unchanged; the counters are
// plain atomics with no allocation of their own.
unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            LIVE_BYTES.fetch_add(layout.size() as i64, Ordering::Relaxed);
            TOTAL_ALLOCATED.fetch_add(layout.size() as u64, Ordering::Relaxed);
            ALLOC_COUNT.fetch_add(1, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        LIVE_BYTES.fetch_sub(layout.size() as i64, Ordering::Relaxed);
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            LIVE_BYTES.fetch_add(layout.size() as i64, Ordering::Relaxed);
            TOTAL_ALLOCATED.fetch_add(layout.size() as u64, Ordering::Relaxed);
            ALLOC_COUNT.fetch_add(1, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            LIVE_BYTES.fetch_add(new_size as i64 - layout.size() as i64, Ordering::Relaxed);
            if new_size > layout.size() {
                TOTAL_ALLOCATED.fetch_add((new_size - layout.size()) as u64, Ordering::Relaxed);
            }
            ALLOC_COUNT.fetch_add(1, Ordering::Relaxed);
        }
        new_ptr
    }
}

/// Bytes currently allocated and not yet freed. Zero unless the tracking
/// allocator is installed.
pub fn live_heap_bytes() -> i64 {
    LIVE_BYTES.load(Ordering::Relaxed)
}

/// Total bytes ever allocated since process start.
pub fn total_allocated_bytes() -> u64 {
    TOTAL_ALLOCATED.load(Ordering::Relaxed)
}

/// Number of allocation calls since process start.
pub fn allocation_count() -> u64 {
    ALLOC_COUNT.load(Ordering::Relaxed)
}

/// One heap-snapshot artifact, written as pretty JSON.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapSnapshot {
    /// The benchmark's fully-qualified id with spaces replaced.
    pub label: String,
    /// Iteration index; 0 is the pre-run baseline.
    pub iteration: u32,
    /// Live bytes at snapshot time.
    pub live_bytes: i64,
    /// Total bytes ever allocated at snapshot time.
    pub total_allocated_bytes: u64,
    /// Allocation calls at snapshot time.
    pub allocation_count: u64,
}

/// Write a snapshot artifact named `{label}:{iteration}.heapsnapshot.json`
/// into `dir`, creating the directory if needed. Returns the artifact path.
pub fn write_heap_snapshot(dir: &Path, label: &str, iteration: u32) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let snapshot = HeapSnapshot {
        label: label.to_string(),
        iteration,
        live_bytes: live_heap_bytes(),
        total_allocated_bytes: total_allocated_bytes(),
        allocation_count: allocation_count(),
    };
    let path = dir.join(format!("{label}:{iteration}.heapsnapshot.json"));
    let json = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_file_is_written_with_the_expected_name() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write_heap_snapshot(dir.path(), "suite.rs:group:bench", 3)
            .expect("snapshot written");
        assert!(path.ends_with("suite.rs:group:bench:3.heapsnapshot.json"));
        let contents = std::fs::read_to_string(&path).expect("readable");
        let value: serde_json::Value = serde_json::from_str(&contents).expect("valid json");
        assert_eq!(value["label"], "suite.rs:group:bench");
        assert_eq!(value["iteration"], 3);
        assert!(value.get("liveBytes").is_some());
    }

    #[test]
    fn counters_never_regress_on_allocation() {
        // Without the allocator installed all counters stay at zero; with it
        // installed an allocation can only grow the totals.
        let bytes_before = total_allocated_bytes();
        let count_before = allocation_count();
        let data = vec![0_u8; 4096];
        assert!(total_allocated_bytes() >= bytes_before);
        drop(data);
        assert!(allocation_count() >= count_before);
    }
}

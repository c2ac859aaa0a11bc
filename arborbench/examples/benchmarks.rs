//! ArborBench Example Benchmarks
//!
//! This example demonstrates ArborBench features and serves as a template
//! for creating your own benchmark suite.
//!
//! Run with:
//!   cargo run --example benchmarks                    # Run all suites
//!   cargo run --example benchmarks -- --help          # Show all options
//!   cargo run --example benchmarks -- --list          # List suites
//!   cargo run --example benchmarks -- sorting         # Run matching benchmarks
//!   cargo run --example benchmarks -- -p -i 20        # Profile memory, 20 iterations

use std::hint::black_box;
use std::time::Duration;

use arborbench::prelude::*;
use arborbench::TrackingAllocator;
use futures::FutureExt;

// Live-heap deltas are only meaningful with the tracking allocator installed.
#[global_allocator]
static ALLOC: TrackingAllocator = TrackingAllocator::new();

suite!(collections, |cx| {
    cx.bench("vector sum", |_| {
        let data: Vec<i64> = (0..1000).collect();
        black_box(data.iter().sum::<i64>());
    })?;

    cx.group("sorting", |cx| {
        // Shared setup: each benchmark gets a fresh shuffled vector.
        cx.before_each(|ctx| {
            let data: Vec<u64> = (0..10_000).rev().collect();
            ctx.insert("data", data);
        })?;

        cx.bench("stable sort", |ctx| {
            let mut data = ctx.get::<Vec<u64>>("data").cloned().unwrap_or_default();
            data.sort();
            black_box(&data);
        })?;

        cx.bench("unstable sort", |ctx| {
            let mut data = ctx.get::<Vec<u64>>("data").cloned().unwrap_or_default();
            data.sort_unstable();
            black_box(&data);
        })
    })?;

    cx.bench_with_options(
        "string building",
        BenchOverrides::none().iterations(20).profile_memory(true),
        |_| {
            let mut out = String::new();
            for i in 0..1000 {
                out.push_str(&i.to_string());
            }
            black_box(&out);
        },
    )?;

    cx.bench_todo("btree range scans")
});

suite!(async_io, |cx| {
    cx.bench_body(
        "timer wheel",
        None,
        Body::future(|_| {
            async {
                tokio::time::sleep(Duration::from_micros(50)).await;
                Ok(())
            }
            .boxed()
        }),
        BenchOverrides::none().timeout(Duration::from_secs(5)),
    )?;

    cx.bench_body(
        "callback completion",
        None,
        Body::callback(|_, done| {
            black_box((0..10_000_u64).sum::<u64>());
            done.done();
        }),
        BenchOverrides::none(),
    )
});

fn main() {
    if let Err(e) = arborbench::run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

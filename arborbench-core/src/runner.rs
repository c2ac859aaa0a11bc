//! The per-benchmark iteration loop: timing, heap deltas, snapshots.

use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::mpsc::UnboundedSender;

use crate::body::{BenchContext, Body};
use crate::error::{Fault, InvocationKind};
use crate::heap::{live_heap_bytes, write_heap_snapshot};
use crate::invoke::invoke;
use crate::options::BenchOptions;

/// What the iteration loop measured, plus the fault that stopped it early,
/// if any.
#[derive(Debug, Default)]
pub(crate) struct IterationOutcome {
    /// Wall-clock duration of each completed iteration, in milliseconds.
    pub(crate) durations_ms: Vec<f64>,
    /// Live-heap delta against the pre-run baseline per iteration, when
    /// memory profiling is on.
    pub(crate) heap_used_sizes: Option<Vec<i64>>,
    /// The fault that aborted the loop. The failed iteration's duration is
    /// not recorded and the remaining iterations do not run.
    pub(crate) fault: Option<Fault>,
}

/// Run `options.iterations` timed invocations of `body`.
///
/// The timeout applies to each invocation separately. Heap instrumentation
/// reads the live-byte counter before the first iteration and records the
/// delta after each one; snapshot artifacts are labelled with the
/// benchmark's fully-qualified id (spaces replaced by underscores) and the
/// iteration index, with index 0 written before the first iteration.
pub(crate) async fn run_iterations(
    body: &mut Body,
    ctx: &mut BenchContext,
    options: &BenchOptions,
    full_id: &str,
    late: &UnboundedSender<Fault>,
) -> IterationOutcome {
    let mut outcome = IterationOutcome::default();
    if options.profile_memory {
        outcome.heap_used_sizes = Some(Vec::with_capacity(options.iterations as usize));
    }

    let label = full_id.replace(' ', "_");
    let snapshot_dir = options
        .snapshot_output_directory
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let instrumenting = options.profile_memory || options.snapshot_heap;
    let baseline = if instrumenting { live_heap_bytes() } else { 0 };

    tracing::debug!(bench = full_id, iterations = options.iterations, "timing");

    if options.snapshot_heap {
        if let Err(e) = write_heap_snapshot(&snapshot_dir, &label, 0) {
            outcome.fault = Some(Fault::user(format!("failed to write heap snapshot: {e}")));
            return outcome;
        }
    }

    for iteration in 1..=options.iterations {
        let start = Instant::now();
        match invoke(body, ctx, InvocationKind::Bench, options.timeout, late).await {
            Ok(()) => {
                outcome
                    .durations_ms
                    .push(start.elapsed().as_secs_f64() * 1e3);
            }
            Err(fault) => {
                // A failed iteration is not a data point, and the remaining
                // iterations would measure a broken state.
                outcome.fault = Some(fault);
                return outcome;
            }
        }
        if let Some(sizes) = &mut outcome.heap_used_sizes {
            sizes.push(live_heap_bytes() - baseline);
        }
        if options.snapshot_heap {
            if let Err(e) = write_heap_snapshot(&snapshot_dir, &label, iteration) {
                outcome.fault =
                    Some(Fault::user(format!("failed to write heap snapshot: {e}")));
                return outcome;
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn options(iterations: u32) -> BenchOptions {
        BenchOptions {
            iterations,
            timeout: Duration::from_secs(1),
            ..BenchOptions::default()
        }
    }

    #[tokio::test]
    async fn records_one_duration_per_iteration() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut ctx = BenchContext::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let mut body = Body::sync(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        let outcome = run_iterations(&mut body, &mut ctx, &options(5), "suite.rs:b", &tx).await;
        assert!(outcome.fault.is_none());
        assert_eq!(outcome.durations_ms.len(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(outcome.heap_used_sizes.is_none());
    }

    #[tokio::test]
    async fn fault_aborts_remaining_iterations_without_recording() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut ctx = BenchContext::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let mut body = Body::sync(move |_| {
            if calls2.fetch_add(1, Ordering::SeqCst) == 2 {
                panic!("third iteration broke");
            }
        });
        let outcome = run_iterations(&mut body, &mut ctx, &options(10), "suite.rs:b", &tx).await;
        let fault = outcome.fault.expect("aborted");
        assert_eq!(fault.kind, FaultKind::User);
        // Two successful iterations recorded; the failed one is not.
        assert_eq!(outcome.durations_ms.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn profiling_records_one_delta_per_iteration() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut ctx = BenchContext::new();
        let mut body = Body::sync(|_| {});
        let opts = BenchOptions {
            profile_memory: true,
            ..options(3)
        };
        let outcome = run_iterations(&mut body, &mut ctx, &opts, "suite.rs:b", &tx).await;
        assert!(outcome.fault.is_none());
        assert_eq!(outcome.heap_used_sizes.map(|s| s.len()), Some(3));
    }

    #[tokio::test]
    async fn snapshots_are_written_per_iteration_plus_baseline() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let dir = tempfile::tempdir().expect("temp dir");
        let mut ctx = BenchContext::new();
        let mut body = Body::sync(|_| {});
        let opts = BenchOptions {
            snapshot_heap: true,
            snapshot_output_directory: Some(dir.path().to_path_buf()),
            ..options(2)
        };
        let outcome =
            run_iterations(&mut body, &mut ctx, &opts, "suite.rs:my bench", &tx).await;
        assert!(outcome.fault.is_none());
        for iteration in 0..=2 {
            let path = dir
                .path()
                .join(format!("suite.rs:my_bench:{iteration}.heapsnapshot.json"));
            assert!(path.exists(), "missing snapshot {iteration}");
        }
    }
}

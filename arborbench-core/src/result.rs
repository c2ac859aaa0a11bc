//! Final result documents, assembled after the scheduler finishes.

use serde::Serialize;

use crate::error::Fault;
use crate::options::BenchOptions;
use crate::state::RunState;
use crate::tree::BenchStatus;

/// One benchmark's outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchResult {
    /// Group names from the root (exclusive) down to the benchmark name.
    pub bench_path: Vec<String>,
    /// Terminal status: `done`, `skip` or `todo`.
    pub status: BenchStatus,
    /// Faults attached to the benchmark during the run.
    pub errors: Vec<Fault>,
    /// Wall-clock duration per completed iteration, in milliseconds.
    pub durations_ms: Vec<f64>,
    /// Live-heap delta per iteration, when memory profiling was on.
    pub heap_used_sizes: Option<Vec<i64>>,
    /// The effective options the benchmark ran with.
    pub bench_options: BenchOptions,
}

/// One suite run's outcome: every benchmark in declaration order plus the
/// faults that could not be attributed to any of them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// The suite name the run was constructed with.
    pub filename: String,
    /// Run-level faults: failed `afterAll` hooks, hooks in benchless groups,
    /// stray panics, late completions.
    pub unhandled_errors: Vec<Fault>,
    /// Benchmark outcomes in declaration order.
    pub bench_results: Vec<BenchResult>,
}

impl RunResult {
    /// Whether anything went wrong anywhere in the run.
    pub fn has_errors(&self) -> bool {
        !self.unhandled_errors.is_empty()
            || self.bench_results.iter().any(|b| !b.errors.is_empty())
    }
}

/// Build the result document from post-run state.
pub(crate) fn assemble(state: &RunState) -> RunResult {
    let bench_results = state
        .tree
        .benches_in_order(state.tree.root())
        .into_iter()
        .map(|id| {
            let bench = state.tree.bench(id);
            BenchResult {
                bench_path: state.tree.bench_path(id),
                // Every benchmark is visited by the scheduler; a missing
                // status only happens when assembling before a run.
                status: bench.status.unwrap_or(BenchStatus::Skip),
                errors: bench.errors.clone(),
                durations_ms: bench.durations_ms.clone(),
                heap_used_sizes: bench.heap_used_sizes.clone(),
                bench_options: bench.options.clone(),
            }
        })
        .collect();
    RunResult {
        filename: state.filename.clone(),
        unhandled_errors: state.unhandled_errors.clone(),
        bench_results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_serialize_camel_case() {
        let result = RunResult {
            filename: "suite.rs".to_string(),
            unhandled_errors: vec![],
            bench_results: vec![BenchResult {
                bench_path: vec!["group".to_string(), "bench".to_string()],
                status: BenchStatus::Done,
                errors: vec![],
                durations_ms: vec![1.5, 2.5],
                heap_used_sizes: None,
                bench_options: BenchOptions::default(),
            }],
        };
        let json = serde_json::to_value(&result).expect("serializable");
        assert!(json.get("unhandledErrors").is_some());
        let bench = &json["benchResults"][0];
        assert_eq!(bench["benchPath"][0], "group");
        assert_eq!(bench["status"], "done");
        assert_eq!(bench["durationsMs"][1], 2.5);
        assert!(bench.get("heapUsedSizes").is_some());
        assert!(bench["benchOptions"].get("memoryLeakVariance").is_some());
    }
}

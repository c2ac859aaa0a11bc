//! Human-readable terminal output.
//!
//! Renders each run as an indented group tree with status icons (✓/✗/⊘/…),
//! per-benchmark timing and heap means, leak warnings with the raw
//! per-iteration values, and a summary line per run.

use arborbench_core::leak::detect_leak;
use arborbench_core::{BenchResult, BenchStatus, RunResult};

const MIB: f64 = 1024.0 * 1024.0;

/// Format runs for human-readable terminal display.
pub fn format_human_output(runs: &[RunResult]) -> String {
    let mut output = String::new();
    for run in runs {
        format_run(&mut output, run);
    }
    output
}

fn format_run(output: &mut String, run: &RunResult) {
    output.push('\n');
    output.push_str(&format!("{}\n", run.filename));
    output.push_str(&"=".repeat(60));
    output.push('\n');

    // Results arrive in declaration order with hierarchical paths, so the
    // tree can be rendered by tracking which group lines are already open.
    let mut open: Vec<&str> = Vec::new();
    for bench in &run.bench_results {
        let (name, groups) = match bench.bench_path.split_last() {
            Some((name, groups)) => (name, groups),
            None => continue,
        };
        let mut common = 0;
        while common < open.len()
            && common < groups.len()
            && open[common] == groups[common]
        {
            common += 1;
        }
        open.truncate(common);
        for group in &groups[common..] {
            output.push_str(&format!("{}{}\n", "  ".repeat(open.len() + 1), group));
            open.push(group);
        }
        format_bench(output, bench, name, open.len() + 1);
    }

    if !run.unhandled_errors.is_empty() {
        output.push_str("\nUnhandled errors\n");
        output.push_str(&"-".repeat(60));
        output.push('\n');
        for fault in &run.unhandled_errors {
            output.push_str(&format!("  ✗ {}\n", fault));
        }
    }

    let total = run.bench_results.len();
    let failed = run
        .bench_results
        .iter()
        .filter(|b| !b.errors.is_empty())
        .count();
    let skipped = count_status(run, BenchStatus::Skip);
    let todo = count_status(run, BenchStatus::Todo);
    output.push_str(&format!(
        "\n  Total: {}  Failed: {}  Skipped: {}  Todo: {}\n",
        total, failed, skipped, todo
    ));
}

fn format_bench(output: &mut String, bench: &BenchResult, name: &str, depth: usize) {
    let indent = "  ".repeat(depth);
    let icon = match bench.status {
        BenchStatus::Skip => "⊘",
        BenchStatus::Todo => "…",
        BenchStatus::Done if bench.errors.is_empty() => "✓",
        BenchStatus::Done => "✗",
    };
    output.push_str(&format!("{}{} {}\n", indent, icon, name));

    if !bench.durations_ms.is_empty() {
        let mean = bench.durations_ms.iter().sum::<f64>() / bench.durations_ms.len() as f64;
        output.push_str(&format!(
            "{}    mean: {:.3} ms  iterations: {}\n",
            indent,
            mean,
            bench.durations_ms.len()
        ));
    }

    if let Some(sizes) = &bench.heap_used_sizes {
        if !sizes.is_empty() {
            let mean = sizes.iter().map(|&s| s as f64).sum::<f64>() / sizes.len() as f64;
            output.push_str(&format!("{}    heap mean: {:.2} MiB\n", indent, mean / MIB));
            let report = detect_leak(
                sizes,
                bench.bench_options.memory_leak_variance,
                bench.bench_options.memory_leak_minimum_value,
            );
            if report.leaking {
                output.push_str(&format!("{}    Leak Detected\n", indent));
                let rendered: Vec<String> = sizes
                    .iter()
                    .map(|&s| format!("{:.2} MiB", s as f64 / MIB))
                    .collect();
                output.push_str(&format!(
                    "{}      heap per iteration: [{}]\n",
                    indent,
                    rendered.join(", ")
                ));
            }
        }
    }

    for fault in &bench.errors {
        output.push_str(&format!("{}    error: {}\n", indent, fault));
    }
}

fn count_status(run: &RunResult, status: BenchStatus) -> usize {
    run.bench_results
        .iter()
        .filter(|b| b.status == status)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arborbench_core::{BenchOptions, Fault};

    fn bench(path: &[&str], status: BenchStatus) -> BenchResult {
        BenchResult {
            bench_path: path.iter().map(|s| s.to_string()).collect(),
            status,
            errors: vec![],
            durations_ms: vec![1.0, 2.0, 3.0],
            heap_used_sizes: None,
            bench_options: BenchOptions::default(),
        }
    }

    fn run(benches: Vec<BenchResult>) -> RunResult {
        RunResult {
            filename: "suite.rs".to_string(),
            unhandled_errors: vec![],
            bench_results: benches,
        }
    }

    #[test]
    fn groups_are_rendered_as_an_indented_tree() {
        let out = format_human_output(&[run(vec![
            bench(&["outer", "inner", "a"], BenchStatus::Done),
            bench(&["outer", "b"], BenchStatus::Done),
        ])]);
        assert!(out.contains("suite.rs"));
        assert!(out.contains("\n  outer\n"));
        assert!(out.contains("\n    inner\n"));
        assert!(out.contains("✓ a"));
        assert!(out.contains("\n    ✓ b"));
        assert!(out.contains("mean: 2.000 ms"));
    }

    #[test]
    fn statuses_get_distinct_icons_and_the_summary_counts_them() {
        let mut failed = bench(&["broken"], BenchStatus::Done);
        failed.errors.push(Fault::user("boom"));
        let out = format_human_output(&[run(vec![
            failed,
            bench(&["skipped"], BenchStatus::Skip),
            bench(&["later"], BenchStatus::Todo),
        ])]);
        assert!(out.contains("✗ broken"));
        assert!(out.contains("error: boom"));
        assert!(out.contains("⊘ skipped"));
        assert!(out.contains("… later"));
        assert!(out.contains("Total: 3  Failed: 1  Skipped: 1  Todo: 1"));
    }

    #[test]
    fn leaking_heap_series_is_flagged_with_its_values() {
        let mut leaky = bench(&["grows"], BenchStatus::Done);
        leaky.heap_used_sizes = Some(vec![
            MIB as i64,
            2 * MIB as i64,
            4 * MIB as i64,
            8 * MIB as i64,
        ]);
        let out = format_human_output(&[run(vec![leaky])]);
        assert!(out.contains("Leak Detected"));
        assert!(out.contains("heap per iteration"));
        assert!(out.contains("8.00 MiB"));
    }

    #[test]
    fn unhandled_errors_get_their_own_section() {
        let mut r = run(vec![bench(&["fine"], BenchStatus::Done)]);
        r.unhandled_errors.push(Fault::user("stray panic"));
        let out = format_human_output(&[r]);
        assert!(out.contains("Unhandled errors"));
        assert!(out.contains("stray panic"));
    }
}

#![warn(missing_docs)]
//! ArborBench CLI Library
//!
//! This module provides the CLI infrastructure for benchmark binaries.
//! Use `arborbench::run()` (or `arborbench_cli::run()`) in your main function
//! to run every suite registered with the `suite!` macro.
//!
//! # Example
//!
//! ```ignore
//! use arborbench::prelude::*;
//!
//! suite!(parsing, |cx| {
//!     cx.bench("small document", |_| {
//!         parse(SMALL_DOC);
//!     })
//! });
//!
//! fn main() {
//!     arborbench::run().unwrap();
//! }
//! ```

mod config;

pub use config::*;

use std::path::PathBuf;

use arborbench_core::{Engine, Fault, RunOptions, RunResult, SuiteDef};
use arborbench_report::{format_human_output, generate_json_report, OutputFormat};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

/// ArborBench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "arborbench")]
#[command(author, version, about = "ArborBench - benchmark harness for Rust")]
pub struct Cli {
    /// Only run benchmarks whose fully-qualified id matches this pattern
    #[arg()]
    pub filter: Option<String>,

    /// Timed iterations per benchmark
    #[arg(short, long)]
    pub iterations: Option<u32>,

    /// Timeout for a single invocation (e.g., "60s", "500ms", "2m")
    #[arg(short, long)]
    pub timeout: Option<String>,

    /// Record per-iteration live-heap deltas
    #[arg(short, long)]
    pub profile_memory: bool,

    /// Write a heap-snapshot artifact per iteration
    #[arg(short, long)]
    pub snapshot_heap: bool,

    /// Where snapshot artifacts go (current directory if unset)
    #[arg(short = 'o', long)]
    pub snapshot_output_directory: Option<PathBuf>,

    /// Heap variance ratio above which growth is suspicious (0..=1)
    #[arg(long)]
    pub leak_variance: Option<f64>,

    /// Ignore heap growth steps below this many bytes
    #[arg(long)]
    pub leak_minimum_bytes: Option<u64>,

    /// Output format: human, json
    #[arg(short, long)]
    pub format: Option<String>,

    /// List registered suites without executing
    #[arg(long)]
    pub list: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Internal: Absorb cargo bench's --bench flag
    #[arg(long, hide = true)]
    pub bench: bool,
}

/// Run the ArborBench CLI with the given arguments.
/// This is the main entry point for benchmark binaries.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the ArborBench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("arborbench=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("arborbench=info")
            .init();
    }

    // Discover arbor.toml configuration (CLI flags override)
    let config = ArborConfig::discover().unwrap_or_default();

    let suites: Vec<&'static SuiteDef> = inventory::iter::<SuiteDef>.into_iter().collect();
    if cli.list {
        list_suites(&suites);
        return Ok(());
    }
    if suites.is_empty() {
        println!("No benchmark suites registered.");
        return Ok(());
    }

    let format: OutputFormat = cli
        .format
        .as_deref()
        .unwrap_or(&config.output.format)
        .parse()
        .unwrap_or(OutputFormat::Human);
    let options = build_run_options(&cli, &config)?;

    let runs = execute_suites(&suites, &options);

    match format {
        OutputFormat::Human => print!("{}", format_human_output(&runs)),
        OutputFormat::Json => println!("{}", generate_json_report(&runs)?),
    }

    if runs.iter().any(RunResult::has_errors) {
        std::process::exit(1);
    }
    Ok(())
}

/// Execute every registered suite with the resolved options.
pub fn execute_suites(suites: &[&'static SuiteDef], options: &RunOptions) -> Vec<RunResult> {
    let pb = ProgressBar::new(suites.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut runs = Vec::with_capacity(suites.len());
    for suite in suites {
        pb.set_message(suite.name.to_string());
        runs.push(execute_suite(suite, options.clone()));
        pb.inc(1);
    }
    pb.finish_with_message("Complete");
    runs
}

fn execute_suite(suite: &SuiteDef, options: RunOptions) -> RunResult {
    let mut engine = match Engine::new(suite.name, options) {
        Ok(engine) => engine,
        Err(err) => return failed_run(suite.name, err.into()),
    };
    if let Err(err) = (suite.declare)(&mut engine) {
        return failed_run(suite.name, err.into());
    }
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            return failed_run(
                suite.name,
                Fault::user(format!("failed to build the suite runtime: {e}")),
            )
        }
    };
    runtime.block_on(engine.run())
}

fn failed_run(name: &str, fault: Fault) -> RunResult {
    RunResult {
        filename: name.to_string(),
        unhandled_errors: vec![fault],
        bench_results: Vec::new(),
    }
}

fn list_suites(suites: &[&'static SuiteDef]) {
    println!("ArborBench suites:");
    for suite in suites {
        println!("├── {} ({}:{})", suite.name, suite.file, suite.line);
    }
    println!("{} suites found.", suites.len());
}

/// Build run options by layering: arbor.toml defaults → CLI overrides.
fn build_run_options(cli: &Cli, config: &ArborConfig) -> anyhow::Result<RunOptions> {
    let mut defaults = config.bench_defaults()?;

    if let Some(iterations) = cli.iterations {
        defaults.iterations = iterations;
    }
    if let Some(timeout) = &cli.timeout {
        defaults.timeout = ArborConfig::parse_duration(timeout)?;
    }
    if cli.profile_memory {
        defaults.profile_memory = true;
    }
    if cli.snapshot_heap {
        defaults.snapshot_heap = true;
    }
    if let Some(dir) = &cli.snapshot_output_directory {
        defaults.snapshot_output_directory = Some(dir.clone());
    }
    if let Some(variance) = cli.leak_variance {
        defaults.memory_leak_variance = variance;
    }
    if let Some(bytes) = cli.leak_minimum_bytes {
        defaults.memory_leak_minimum_value = bytes;
    }

    let name_pattern = cli.filter.clone().or_else(|| config.runner.filter.clone());
    Ok(RunOptions {
        defaults,
        name_pattern,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("arborbench").chain(args.iter().copied()))
    }

    #[test]
    fn cli_overrides_win_over_config() {
        let config: ArborConfig = toml::from_str(
            r#"
            [runner]
            iterations = 100
            timeout = "60s"
            filter = "from-config"
        "#,
        )
        .unwrap();
        let cli = parse(&["from-cli", "-i", "3", "-t", "500ms", "-p"]);
        let options = build_run_options(&cli, &config).unwrap();
        assert_eq!(options.defaults.iterations, 3);
        assert_eq!(
            options.defaults.timeout,
            std::time::Duration::from_millis(500)
        );
        assert!(options.defaults.profile_memory);
        assert_eq!(options.name_pattern.as_deref(), Some("from-cli"));
    }

    #[test]
    fn config_values_apply_when_cli_is_silent() {
        let config: ArborConfig = toml::from_str(
            r#"
            [runner]
            iterations = 7
            filter = "parser"

            [memory]
            leak_minimum_bytes = 1024
        "#,
        )
        .unwrap();
        let cli = parse(&[]);
        let options = build_run_options(&cli, &config).unwrap();
        assert_eq!(options.defaults.iterations, 7);
        assert_eq!(options.defaults.memory_leak_minimum_value, 1024);
        assert_eq!(options.name_pattern.as_deref(), Some("parser"));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let cli = parse(&["-t", "fortnight"]);
        assert!(build_run_options(&cli, &ArborConfig::default()).is_err());
    }

    #[test]
    fn execute_reports_declaration_failures_as_unhandled() {
        fn broken(engine: &mut Engine) -> Result<(), arborbench_core::DeclError> {
            engine.bench("", arborbench_core::Body::sync(|_| {}), Default::default())
        }
        let suite = SuiteDef {
            name: "broken",
            file: file!(),
            line: line!(),
            declare: broken,
        };
        let result = execute_suite(&suite, RunOptions::default());
        assert_eq!(result.unhandled_errors.len(), 1);
        assert!(result.bench_results.is_empty());
    }

    #[test]
    fn execute_runs_a_declared_suite_end_to_end() {
        fn fine(engine: &mut Engine) -> Result<(), arborbench_core::DeclError> {
            engine.group("math", |engine| {
                engine.bench(
                    "sum",
                    arborbench_core::Body::sync(|_| {
                        let _ = (0..100_u64).sum::<u64>();
                    }),
                    arborbench_core::BenchOverrides::none().iterations(2),
                )
            })
        }
        let suite = SuiteDef {
            name: "arith.rs",
            file: file!(),
            line: line!(),
            declare: fine,
        };
        let result = execute_suite(&suite, RunOptions::default());
        assert!(result.unhandled_errors.is_empty());
        assert_eq!(result.bench_results.len(), 1);
        assert_eq!(result.bench_results[0].durations_ms.len(), 2);
    }
}

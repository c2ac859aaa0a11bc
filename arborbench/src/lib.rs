#![warn(missing_docs)]
//! # ArborBench
//!
//! Benchmark harness for Rust with lifecycle hooks, four body conventions
//! and memory-leak detection.
//!
//! ArborBench runs declaration-ordered suites of benchmarks:
//! - **Nested groups**: `group`/`bench` declarations with `skip`, `only` and
//!   `todo` modes, resolved with focus semantics
//! - **Lifecycle hooks**: `beforeAll`/`afterAll` per group and
//!   `beforeEach`/`afterEach` wrapping every benchmark in onion order
//! - **Four body conventions**: plain synchronous closures, callback-style
//!   completion signals, boxed futures and stepwise iterators, all under one
//!   per-invocation timeout
//! - **Memory instrumentation**: per-iteration live-heap deltas through a
//!   `TrackingAllocator`, heap-snapshot artifacts and a leak heuristic
//! - **Fault attribution**: panics, timeouts, double completions and late
//!   completions attach to the benchmark that caused them; everything else
//!   lands on the run
//!
//! ## Quick Start
//!
//! ```ignore
//! use arborbench::prelude::*;
//!
//! suite!(parsing, |cx| {
//!     cx.group("small documents", |cx| {
//!         cx.before_each(|ctx| ctx.insert("doc", SMALL_DOC.to_string()));
//!         cx.bench("parse", |ctx| {
//!             let doc = ctx.get::<String>("doc").unwrap();
//!             parse(doc);
//!         })
//!     })
//! });
//!
//! fn main() {
//!     arborbench::run().unwrap();
//! }
//! ```

use std::time::Duration;

// Re-export core types
pub use arborbench_core::{
    BenchContext, BenchOptions, BenchOverrides, BenchResult, BenchStatus, Body, DeclError, Done,
    Engine, Fault, FaultKind, HookKind, Mode, Origin, RunOptions, RunResult, Steps, SuiteDef,
};

// Re-export instrumentation and report surfaces
pub use arborbench_core::heap::{self, TrackingAllocator};
pub use arborbench_core::leak::{detect_leak, LeakReport};
pub use arborbench_report::{format_human_output, generate_json_report, OutputFormat};

/// Internal re-exports for macro use
#[doc(hidden)]
pub mod internal {
    pub use inventory;
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        suite, run_suite, BenchContext, BenchOverrides, Body, DeclError, Done, Mode, RunOptions,
        SuiteCx,
    };
}

/// Register a benchmark suite to be picked up by [`run`].
///
/// The body must be a non-capturing closure (or `fn`) taking `&mut SuiteCx`:
///
/// ```ignore
/// suite!(hashing, |cx| {
///     cx.bench("fnv", |_| { fnv(INPUT); })
/// });
/// ```
#[macro_export]
macro_rules! suite {
    ($name:ident, $body:expr) => {
        const _: () = {
            fn declare(
                engine: &mut $crate::Engine,
            ) -> ::core::result::Result<(), $crate::DeclError> {
                let f: fn(&mut $crate::SuiteCx<'_>) -> ::core::result::Result<(), $crate::DeclError> =
                    $body;
                f(&mut $crate::SuiteCx::new(engine))
            }
            $crate::internal::inventory::submit! {
                $crate::SuiteDef {
                    name: ::core::stringify!($name),
                    file: ::core::file!(),
                    line: ::core::line!(),
                    declare,
                }
            }
        };
    };
}

/// Declaration cursor handed to suite bodies.
///
/// Wraps the engine with the declaration vocabulary: groups, benchmarks and
/// hooks. All methods record the caller's source location so failures point
/// at the declaration site.
pub struct SuiteCx<'a> {
    engine: &'a mut Engine,
}

impl<'a> SuiteCx<'a> {
    /// Wrap an engine. Used by the `suite!` macro and [`run_suite`].
    #[doc(hidden)]
    pub fn new(engine: &'a mut Engine) -> Self {
        Self { engine }
    }

    /// Declare a nested group.
    #[track_caller]
    pub fn group<F>(&mut self, name: &str, f: F) -> Result<(), DeclError>
    where
        F: FnOnce(&mut SuiteCx<'_>) -> Result<(), DeclError>,
    {
        self.group_with_mode(name, None, f)
    }

    /// Declare a group that never executes.
    #[track_caller]
    pub fn group_skip<F>(&mut self, name: &str, f: F) -> Result<(), DeclError>
    where
        F: FnOnce(&mut SuiteCx<'_>) -> Result<(), DeclError>,
    {
        self.group_with_mode(name, Some(Mode::Skip), f)
    }

    /// Declare a focused group: everything outside the focus is skipped.
    #[track_caller]
    pub fn group_only<F>(&mut self, name: &str, f: F) -> Result<(), DeclError>
    where
        F: FnOnce(&mut SuiteCx<'_>) -> Result<(), DeclError>,
    {
        self.group_with_mode(name, Some(Mode::Only), f)
    }

    /// Declare a group with an explicit mode.
    #[track_caller]
    pub fn group_with_mode<F>(
        &mut self,
        name: &str,
        mode: Option<Mode>,
        f: F,
    ) -> Result<(), DeclError>
    where
        F: FnOnce(&mut SuiteCx<'_>) -> Result<(), DeclError>,
    {
        self.engine
            .group_with_mode(name, mode, |engine| f(&mut SuiteCx::new(engine)))
    }

    /// Declare a synchronous benchmark with default options.
    #[track_caller]
    pub fn bench<F>(&mut self, name: &str, body: F) -> Result<(), DeclError>
    where
        F: FnMut(&mut BenchContext) + Send + 'static,
    {
        self.engine
            .bench(name, Body::sync(body), BenchOverrides::none())
    }

    /// Declare a synchronous benchmark with option overrides.
    #[track_caller]
    pub fn bench_with_options<F>(
        &mut self,
        name: &str,
        overrides: BenchOverrides,
        body: F,
    ) -> Result<(), DeclError>
    where
        F: FnMut(&mut BenchContext) + Send + 'static,
    {
        self.engine.bench(name, Body::sync(body), overrides)
    }

    /// Declare a benchmark from any [`Body`] convention, with overrides and
    /// an explicit mode.
    #[track_caller]
    pub fn bench_body(
        &mut self,
        name: &str,
        mode: Option<Mode>,
        body: Body,
        overrides: BenchOverrides,
    ) -> Result<(), DeclError> {
        self.engine.bench_with_mode(name, mode, body, overrides)
    }

    /// Declare a benchmark that never executes.
    #[track_caller]
    pub fn bench_skip<F>(&mut self, name: &str, body: F) -> Result<(), DeclError>
    where
        F: FnMut(&mut BenchContext) + Send + 'static,
    {
        self.engine.bench_with_mode(
            name,
            Some(Mode::Skip),
            Body::sync(body),
            BenchOverrides::none(),
        )
    }

    /// Declare a focused benchmark.
    #[track_caller]
    pub fn bench_only<F>(&mut self, name: &str, body: F) -> Result<(), DeclError>
    where
        F: FnMut(&mut BenchContext) + Send + 'static,
    {
        self.engine.bench_with_mode(
            name,
            Some(Mode::Only),
            Body::sync(body),
            BenchOverrides::none(),
        )
    }

    /// Declare a placeholder benchmark: reported as `todo`, never invoked.
    #[track_caller]
    pub fn bench_todo(&mut self, name: &str) -> Result<(), DeclError> {
        self.engine.bench_todo(name)
    }

    /// Run once before any benchmark in the current group.
    #[track_caller]
    pub fn before_all<F>(&mut self, body: F) -> Result<(), DeclError>
    where
        F: FnMut(&mut BenchContext) + Send + 'static,
    {
        self.engine.hook(HookKind::BeforeAll, Body::sync(body), None)
    }

    /// Run once after every benchmark in the current group.
    #[track_caller]
    pub fn after_all<F>(&mut self, body: F) -> Result<(), DeclError>
    where
        F: FnMut(&mut BenchContext) + Send + 'static,
    {
        self.engine.hook(HookKind::AfterAll, Body::sync(body), None)
    }

    /// Run before each benchmark beneath the current group.
    #[track_caller]
    pub fn before_each<F>(&mut self, body: F) -> Result<(), DeclError>
    where
        F: FnMut(&mut BenchContext) + Send + 'static,
    {
        self.engine.hook(HookKind::BeforeEach, Body::sync(body), None)
    }

    /// Run after each benchmark beneath the current group.
    #[track_caller]
    pub fn after_each<F>(&mut self, body: F) -> Result<(), DeclError>
    where
        F: FnMut(&mut BenchContext) + Send + 'static,
    {
        self.engine.hook(HookKind::AfterEach, Body::sync(body), None)
    }

    /// Attach a hook from any [`Body`] convention with an optional timeout
    /// override.
    #[track_caller]
    pub fn hook_body(
        &mut self,
        kind: HookKind,
        body: Body,
        timeout: Option<Duration>,
    ) -> Result<(), DeclError> {
        self.engine.hook(kind, body, timeout)
    }
}

/// Declare and run one suite programmatically, without registration.
///
/// Declaration errors abort the run: the returned document carries the error
/// as an unhandled fault and no benchmark results.
pub fn run_suite<F>(name: &str, options: RunOptions, f: F) -> RunResult
where
    F: FnOnce(&mut SuiteCx<'_>) -> Result<(), DeclError>,
{
    let mut engine = match Engine::new(name, options) {
        Ok(engine) => engine,
        Err(err) => return failed_run(name, err),
    };
    if let Err(err) = f(&mut SuiteCx::new(&mut engine)) {
        return failed_run(name, err);
    }
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            return RunResult {
                filename: name.to_string(),
                unhandled_errors: vec![Fault::user(format!(
                    "failed to build the suite runtime: {e}"
                ))],
                bench_results: Vec::new(),
            }
        }
    };
    runtime.block_on(engine.run())
}

fn failed_run(name: &str, err: DeclError) -> RunResult {
    RunResult {
        filename: name.to_string(),
        unhandled_errors: vec![err.into()],
        bench_results: Vec::new(),
    }
}

/// Run every suite registered with [`suite!`] using default options.
pub fn run_registered(options: &RunOptions) -> Vec<RunResult> {
    let suites: Vec<&'static SuiteDef> = inventory::iter::<SuiteDef>.into_iter().collect();
    arborbench_cli::execute_suites(&suites, options)
}

/// Run the ArborBench CLI harness.
///
/// Call this from your benchmark binary's `main()`:
/// ```ignore
/// fn main() {
///     arborbench::run().unwrap();
/// }
/// ```
pub use arborbench_cli::run;

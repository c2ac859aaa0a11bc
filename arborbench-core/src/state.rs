//! Process-wide run state: one mutable instance per suite run.
//!
//! The state is an explicit context object passed into every dispatcher and
//! scheduler call; runs are isolated by constructing a fresh instance, never
//! by mutating a shared singleton.

use regex::{Regex, RegexBuilder};

use crate::error::{DeclError, Fault};
use crate::options::BenchOptions;
use crate::tree::{BenchId, GroupId, Mode, Tree};

/// Run-scoped configuration: benchmark defaults plus an optional name filter.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Default options for every benchmark and hook in the run.
    pub defaults: BenchOptions,
    /// Case-insensitive pattern matched against fully-qualified benchmark
    /// ids (`suite:group:…:bench`). Non-matching benchmarks are skipped.
    pub name_pattern: Option<String>,
}

/// Mutable state for one declare-then-run lifecycle.
#[derive(Debug)]
pub struct RunState {
    /// The group/benchmark tree.
    pub tree: Tree,
    /// Group currently receiving declarations.
    pub current_group: GroupId,
    /// Benchmark currently executing, if any.
    pub currently_running: Option<BenchId>,
    /// Errors not attributable to any specific benchmark.
    pub unhandled_errors: Vec<Fault>,
    /// Whether any node anywhere in the tree is marked `only`.
    pub has_focused_benches: bool,
    /// Whether execution has started (declarations are illegal afterward).
    pub has_started: bool,
    /// Compiled name filter, if configured.
    pub name_pattern: Option<Regex>,
    /// Run-level default options.
    pub options: BenchOptions,
    /// Suite name; doubles as the root group's name.
    pub filename: String,
}

impl RunState {
    /// Fresh state for one suite run.
    pub fn new(filename: impl Into<String>, options: RunOptions) -> Result<Self, DeclError> {
        options.defaults.validate()?;
        let filename = filename.into();
        let name_pattern = options
            .name_pattern
            .as_deref()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        DeclError::InvalidDeclaration(format!("invalid name pattern: {e}"))
                    })
            })
            .transpose()?;
        let tree = Tree::new(filename.clone());
        let root = tree.root();
        Ok(Self {
            tree,
            current_group: root,
            currently_running: None,
            unhandled_errors: Vec::new(),
            has_focused_benches: false,
            has_started: false,
            name_pattern,
            options: options.defaults,
            filename,
        })
    }

    /// Whether `bench` would run under the current focus and filter rules.
    /// Ancestor skipping is handled by the scheduler's traversal, matching
    /// the hook-resolution rule: a hook runs only when some benchmark
    /// beneath its group passes this check.
    pub fn bench_is_runnable(&self, id: BenchId) -> bool {
        let bench = self.tree.bench(id);
        if bench.mode == Some(Mode::Skip) {
            return false;
        }
        if self.has_focused_benches && bench.mode != Some(Mode::Only) {
            return false;
        }
        if let Some(pattern) = &self.name_pattern {
            if !pattern.is_match(&self.tree.bench_full_id(id)) {
                return false;
            }
        }
        true
    }

    /// Whether any benchmark beneath `group` is eligible to run.
    /// `beforeAll`/`afterAll` hooks are resolved only for groups where this
    /// holds, so entirely-filtered-out subtrees never execute their hooks.
    pub fn group_has_runnable_bench(&self, group: GroupId) -> bool {
        self.tree
            .benches_in_order(group)
            .into_iter()
            .any(|bench| self.bench_is_runnable(bench))
    }
}

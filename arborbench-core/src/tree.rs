//! The group/benchmark tree.
//!
//! Nodes live in an arena indexed by stable ids; the parent relation is an
//! id, not an owning pointer, so traversal can walk both directions without
//! reference cycles. Insertion order of children is preserved — it drives
//! reporting order and hook ordering.

use std::time::Duration;

use serde::Serialize;

use crate::body::Body;
use crate::error::{Fault, Origin};
use crate::options::BenchOptions;

/// Stable identifier of a group node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub(crate) usize);

/// Stable identifier of a benchmark node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BenchId(pub(crate) usize);

/// An ordered child of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeId {
    /// A nested group.
    Group(GroupId),
    /// A leaf benchmark.
    Bench(BenchId),
}

/// Focus/exclusion state of a node. "Normal" is the absence of a mode
/// (`Option<Mode>::None`), which is what mode inheritance checks against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Never execute.
    Skip,
    /// Focus: when any node is `only`, everything not `only` is skipped.
    Only,
    /// Placeholder: reported but never invoked.
    Todo,
}

/// Terminal status of a benchmark after the scheduler visits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchStatus {
    /// Filtered out or skipped.
    Skip,
    /// Visited and finished (errors may still be attached).
    Done,
    /// Declared as a placeholder.
    Todo,
}

/// Lifecycle hook kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Once before any benchmark in the group.
    BeforeAll,
    /// Once after every benchmark in the group.
    AfterAll,
    /// Before each benchmark beneath the group.
    BeforeEach,
    /// After each benchmark beneath the group.
    AfterEach,
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::BeforeAll => "beforeAll",
            Self::AfterAll => "afterAll",
            Self::BeforeEach => "beforeEach",
            Self::AfterEach => "afterEach",
        };
        f.write_str(name)
    }
}

/// A lifecycle callback bound to a group. Owned by exactly one group.
#[derive(Debug)]
pub struct Hook {
    /// Which phase the hook runs in.
    pub kind: HookKind,
    /// The callable. `None` only transiently while the scheduler holds it.
    pub(crate) body: Option<Body>,
    /// Effective timeout (run default unless overridden per hook).
    pub timeout: Duration,
    /// Declaration site, kept for meaningful failure locations.
    pub origin: Origin,
}

/// A named, nestable container for benchmarks and hooks.
#[derive(Debug)]
pub struct Group {
    /// Display name.
    pub name: String,
    /// Mode, inherited from the parent at creation when not set explicitly.
    pub mode: Option<Mode>,
    /// Parent group; `None` only for the root.
    pub parent: Option<GroupId>,
    /// Children in insertion order.
    pub children: Vec<NodeId>,
    /// Attached hooks in declaration order.
    pub hooks: Vec<Hook>,
}

/// A leaf execution unit.
#[derive(Debug)]
pub struct Benchmark {
    /// Display name.
    pub name: String,
    /// Mode; `None` means normal.
    pub mode: Option<Mode>,
    /// Owning group.
    pub parent: GroupId,
    /// The callable. `None` only transiently while the scheduler holds it.
    pub(crate) body: Option<Body>,
    /// Effective options (run defaults merged with per-benchmark overrides).
    pub options: BenchOptions,
    /// Declaration site.
    pub origin: Origin,
    /// How many times the scheduler started this benchmark.
    pub invocations: u32,
    /// Wall-clock duration per iteration, in milliseconds.
    pub durations_ms: Vec<f64>,
    /// Live-heap delta per iteration, when memory profiling is on.
    pub heap_used_sizes: Option<Vec<i64>>,
    /// Errors attached during the run.
    pub errors: Vec<Fault>,
    /// Terminal status; assigned exactly once by the scheduler.
    pub status: Option<BenchStatus>,
}

/// Arena of groups and benchmarks. One tree per run.
#[derive(Debug)]
pub struct Tree {
    groups: Vec<Group>,
    benches: Vec<Benchmark>,
}

impl Tree {
    /// New tree containing only the root group, named after the suite.
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            groups: vec![Group {
                name: root_name.into(),
                mode: None,
                parent: None,
                children: Vec::new(),
                hooks: Vec::new(),
            }],
            benches: Vec::new(),
        }
    }

    /// The root group id.
    pub fn root(&self) -> GroupId {
        GroupId(0)
    }

    /// Borrow a group.
    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.0]
    }

    pub(crate) fn group_mut(&mut self, id: GroupId) -> &mut Group {
        &mut self.groups[id.0]
    }

    /// Borrow a benchmark.
    pub fn bench(&self, id: BenchId) -> &Benchmark {
        &self.benches[id.0]
    }

    pub(crate) fn bench_mut(&mut self, id: BenchId) -> &mut Benchmark {
        &mut self.benches[id.0]
    }

    /// Create a group under `parent`. An unset mode inherits the parent's.
    pub(crate) fn add_group(
        &mut self,
        name: String,
        parent: GroupId,
        mode: Option<Mode>,
    ) -> GroupId {
        let mode = mode.or(self.group(parent).mode);
        let id = GroupId(self.groups.len());
        self.groups.push(Group {
            name,
            mode,
            parent: Some(parent),
            children: Vec::new(),
            hooks: Vec::new(),
        });
        self.group_mut(parent).children.push(NodeId::Group(id));
        id
    }

    /// Create a benchmark under `parent` with empty run-time fields.
    pub(crate) fn add_bench(
        &mut self,
        name: String,
        parent: GroupId,
        mode: Option<Mode>,
        body: Body,
        options: BenchOptions,
        origin: Origin,
    ) -> BenchId {
        let id = BenchId(self.benches.len());
        self.benches.push(Benchmark {
            name,
            mode,
            parent,
            body: Some(body),
            options,
            origin,
            invocations: 0,
            durations_ms: Vec::new(),
            heap_used_sizes: None,
            errors: Vec::new(),
            status: None,
        });
        self.group_mut(parent).children.push(NodeId::Bench(id));
        id
    }

    /// Whether any benchmark exists anywhere beneath `group`.
    pub fn has_benches(&self, group: GroupId) -> bool {
        self.group(group).children.iter().any(|child| match child {
            NodeId::Bench(_) => true,
            NodeId::Group(g) => self.has_benches(*g),
        })
    }

    /// Names from the root group (exclusive) down to the benchmark.
    pub fn bench_path(&self, id: BenchId) -> Vec<String> {
        let mut path = vec![self.bench(id).name.clone()];
        let mut cursor = Some(self.bench(id).parent);
        while let Some(group) = cursor {
            let node = self.group(group);
            if node.parent.is_some() {
                path.push(node.name.clone());
            }
            cursor = node.parent;
        }
        path.reverse();
        path
    }

    /// Fully-qualified identifier: root name and path joined with `:`.
    /// Used for name-filter matching and snapshot labels.
    pub fn bench_full_id(&self, id: BenchId) -> String {
        let mut parts = self.bench_path(id);
        parts.insert(0, self.group(self.root()).name.clone());
        parts.join(":")
    }

    /// Attach `fault` to every benchmark anywhere beneath `group`.
    /// Used when a `beforeAll` hook fails: a shared setup failure
    /// invalidates all benchmarks it was setting up.
    pub(crate) fn add_error_to_each_bench_under(&mut self, group: GroupId, fault: &Fault) {
        let children = self.group(group).children.clone();
        for child in children {
            match child {
                NodeId::Group(g) => self.add_error_to_each_bench_under(g, fault),
                NodeId::Bench(b) => self.bench_mut(b).errors.push(fault.clone()),
            }
        }
    }

    /// All benchmark ids beneath `group` in traversal (insertion) order.
    pub fn benches_in_order(&self, group: GroupId) -> Vec<BenchId> {
        let mut out = Vec::new();
        self.collect_benches(group, &mut out);
        out
    }

    fn collect_benches(&self, group: GroupId, out: &mut Vec<BenchId>) {
        for child in &self.group(group).children {
            match child {
                NodeId::Group(g) => self.collect_benches(*g, out),
                NodeId::Bench(b) => out.push(*b),
            }
        }
    }

    /// `beforeEach` hooks outermost-first and `afterEach` hooks
    /// innermost-first for a benchmark, as `(group, hook index)` pairs.
    ///
    /// Gathered by walking from the benchmark up to the root and prepending
    /// each group's `beforeEach` list, so the root's hooks run first.
    pub(crate) fn each_hooks_for_bench(
        &self,
        id: BenchId,
    ) -> (Vec<(GroupId, usize)>, Vec<(GroupId, usize)>) {
        let mut before_each: Vec<(GroupId, usize)> = Vec::new();
        let mut after_each: Vec<(GroupId, usize)> = Vec::new();
        let mut cursor = Some(self.bench(id).parent);
        while let Some(group) = cursor {
            let node = self.group(group);
            let mut block_before = Vec::new();
            for (index, hook) in node.hooks.iter().enumerate() {
                match hook.kind {
                    HookKind::BeforeEach => block_before.push((group, index)),
                    HookKind::AfterEach => after_each.push((group, index)),
                    _ => {}
                }
            }
            block_before.extend(before_each);
            before_each = block_before;
            cursor = node.parent;
        }
        (before_each, after_each)
    }

    /// `beforeAll` and `afterAll` hook indices for `group`, in declaration
    /// order. The caller is responsible for only asking when the group has
    /// at least one benchmark eligible to run.
    pub(crate) fn all_hooks_for_group(&self, group: GroupId) -> (Vec<usize>, Vec<usize>) {
        let mut before_all = Vec::new();
        let mut after_all = Vec::new();
        for (index, hook) in self.group(group).hooks.iter().enumerate() {
            match hook.kind {
                HookKind::BeforeAll => before_all.push(index),
                HookKind::AfterAll => after_all.push(index),
                _ => {}
            }
        }
        (before_all, after_all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> (Tree, GroupId, GroupId, BenchId) {
        let mut tree = Tree::new("suite.rs");
        let outer = tree.add_group("outer".to_string(), tree.root(), None);
        let inner = tree.add_group("inner".to_string(), outer, None);
        let bench = tree.add_bench(
            "measure".to_string(),
            inner,
            None,
            Body::noop(),
            BenchOptions::default(),
            Origin::capture(),
        );
        (tree, outer, inner, bench)
    }

    #[test]
    fn bench_path_excludes_root() {
        let (tree, _, _, bench) = sample_tree();
        assert_eq!(tree.bench_path(bench), vec!["outer", "inner", "measure"]);
        assert_eq!(tree.bench_full_id(bench), "suite.rs:outer:inner:measure");
    }

    #[test]
    fn mode_inherited_at_creation() {
        let mut tree = Tree::new("suite.rs");
        let skipped = tree.add_group("skipped".to_string(), tree.root(), Some(Mode::Skip));
        let child = tree.add_group("child".to_string(), skipped, None);
        assert_eq!(tree.group(child).mode, Some(Mode::Skip));
        let explicit = tree.add_group("explicit".to_string(), skipped, Some(Mode::Only));
        assert_eq!(tree.group(explicit).mode, Some(Mode::Only));
    }

    #[test]
    fn has_benches_sees_nested_leaves() {
        let (tree, outer, _, _) = sample_tree();
        assert!(tree.has_benches(outer));
        let mut empty = Tree::new("suite.rs");
        let lone = empty.add_group("lone".to_string(), empty.root(), None);
        assert!(!empty.has_benches(lone));
    }

    #[test]
    fn each_hooks_ordered_outermost_first() {
        let (mut tree, outer, inner, bench) = sample_tree();
        for (group, kind) in [
            (outer, HookKind::BeforeEach),
            (outer, HookKind::AfterEach),
            (inner, HookKind::BeforeEach),
            (inner, HookKind::AfterEach),
        ] {
            tree.group_mut(group).hooks.push(Hook {
                kind,
                body: Some(Body::noop()),
                timeout: Duration::from_secs(1),
                origin: Origin::capture(),
            });
        }
        let (before, after) = tree.each_hooks_for_bench(bench);
        assert_eq!(
            before.iter().map(|(g, _)| *g).collect::<Vec<_>>(),
            vec![outer, inner]
        );
        assert_eq!(
            after.iter().map(|(g, _)| *g).collect::<Vec<_>>(),
            vec![inner, outer]
        );
    }

    #[test]
    fn before_all_failure_reaches_every_descendant_bench() {
        let (mut tree, outer, inner, bench) = sample_tree();
        let sibling = tree.add_bench(
            "sibling".to_string(),
            inner,
            None,
            Body::noop(),
            BenchOptions::default(),
            Origin::capture(),
        );
        tree.add_error_to_each_bench_under(outer, &Fault::user("setup broke"));
        assert_eq!(tree.bench(bench).errors.len(), 1);
        assert_eq!(tree.bench(sibling).errors.len(), 1);
    }
}

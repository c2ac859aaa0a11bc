//! Event dispatcher: every tree/state mutation happens here.
//!
//! All changes to [`RunState`] are expressed as an [`Event`] and applied by
//! [`apply_event`], the single mutation point. A [`Dispatcher`] applies the
//! event first and then notifies an ordered list of [`EventListener`]s, so
//! the state machine stays auditable and extensible. Declaration-time
//! dispatch is synchronous; the scheduler dispatches execution-time events
//! between awaits on a single-threaded runtime, which preserves ordering.

use std::time::Duration;

use crate::body::Body;
use crate::error::{DeclError, Fault, Origin};
use crate::options::BenchOverrides;
use crate::state::RunState;
use crate::tree::{BenchId, BenchStatus, GroupId, Hook, HookKind, Mode, NodeId};

/// Everything that can happen to a run, declaration and execution alike.
///
/// Bodies travel inside `add_*` events as `Option<Body>` and are taken by
/// the state handler; listeners observe the event after the move.
pub enum Event {
    /// Execution is starting; declarations are illegal afterward.
    RunStart,
    /// Execution finished.
    RunFinish,
    /// A group declaration opened: push the active-group cursor.
    StartGroupDefinition {
        /// Group name.
        name: String,
        /// Explicit mode, if any.
        mode: Option<Mode>,
        /// Declaration site.
        origin: Origin,
    },
    /// A group declaration closed: propagate modes, pop the cursor.
    FinishGroupDefinition,
    /// Attach a hook to the active group.
    AddHook {
        /// Hook phase.
        kind: HookKind,
        /// The callable; taken by the state handler.
        body: Option<Body>,
        /// Per-hook timeout override.
        timeout: Option<Duration>,
        /// Declaration site.
        origin: Origin,
    },
    /// Attach a benchmark to the active group.
    AddBenchmark {
        /// Benchmark name.
        name: String,
        /// Explicit mode, if any.
        mode: Option<Mode>,
        /// The callable; taken by the state handler.
        body: Option<Body>,
        /// Per-benchmark option overrides.
        overrides: BenchOverrides,
        /// Declaration site.
        origin: Origin,
    },
    /// The scheduler entered a group.
    StartRunGroup {
        /// The group being entered.
        group: GroupId,
    },
    /// The scheduler left a group.
    FinishRunGroup {
        /// The group being left.
        group: GroupId,
    },
    /// A hook invocation is starting.
    HookStart {
        /// Owning group.
        group: GroupId,
        /// Index into the group's hook list.
        index: usize,
    },
    /// A hook invocation completed without error.
    HookSuccess {
        /// Owning group.
        group: GroupId,
        /// Hook phase.
        kind: HookKind,
        /// The benchmark the hook ran for, for `*Each` hooks.
        bench: Option<BenchId>,
    },
    /// A hook invocation failed; routing depends on the hook kind.
    HookFailure {
        /// Owning group.
        group: GroupId,
        /// Hook phase.
        kind: HookKind,
        /// The benchmark the hook ran for, for `*Each` hooks.
        bench: Option<BenchId>,
        /// What went wrong.
        fault: Fault,
    },
    /// The scheduler started visiting a benchmark.
    BenchStart {
        /// The benchmark.
        bench: BenchId,
    },
    /// The benchmark body is about to be invoked.
    BenchFnStart {
        /// The benchmark.
        bench: BenchId,
    },
    /// The benchmark body completed without error.
    BenchFnSuccess {
        /// The benchmark.
        bench: BenchId,
    },
    /// The benchmark body failed.
    BenchFnFailure {
        /// The benchmark.
        bench: BenchId,
        /// What went wrong.
        fault: Fault,
    },
    /// The benchmark was filtered out or skipped.
    BenchSkip {
        /// The benchmark.
        bench: BenchId,
    },
    /// The benchmark is a placeholder.
    BenchTodo {
        /// The benchmark.
        bench: BenchId,
    },
    /// The benchmark finished; status reflects "finished", not "passed".
    BenchDone {
        /// The benchmark.
        bench: BenchId,
    },
    /// A fault observed outside any tracked invocation.
    Error {
        /// The stray fault.
        fault: Fault,
    },
}

impl Event {
    /// Stable event name, for listeners and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStart => "run_start",
            Self::RunFinish => "run_finish",
            Self::StartGroupDefinition { .. } => "start_group_definition",
            Self::FinishGroupDefinition => "finish_group_definition",
            Self::AddHook { .. } => "add_hook",
            Self::AddBenchmark { .. } => "add_benchmark",
            Self::StartRunGroup { .. } => "start_run_group",
            Self::FinishRunGroup { .. } => "finish_run_group",
            Self::HookStart { .. } => "hook_start",
            Self::HookSuccess { .. } => "hook_success",
            Self::HookFailure { .. } => "hook_failure",
            Self::BenchStart { .. } => "bench_start",
            Self::BenchFnStart { .. } => "bench_fn_start",
            Self::BenchFnSuccess { .. } => "bench_fn_success",
            Self::BenchFnFailure { .. } => "bench_fn_failure",
            Self::BenchSkip { .. } => "bench_skip",
            Self::BenchTodo { .. } => "bench_todo",
            Self::BenchDone { .. } => "bench_done",
            Self::Error { .. } => "error",
        }
    }
}

/// Additional observer notified after the state handler mutated the state.
pub trait EventListener: Send {
    /// Observe `event` against the already-updated `state`.
    fn on_event(&mut self, event: &Event, state: &RunState);
}

/// Ordered fan-out of events: state mutation first, listeners after.
#[derive(Default)]
pub struct Dispatcher {
    listeners: Vec<Box<dyn EventListener>>,
}

impl Dispatcher {
    /// Dispatcher with no extra listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener. Listeners run in attachment order.
    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Apply `event` to `state`, then notify listeners. Returns the
    /// structural violation, if the event was an illegal declaration.
    pub fn dispatch(&mut self, mut event: Event, state: &mut RunState) -> Result<(), DeclError> {
        let outcome = apply_event(&mut event, state);
        tracing::trace!(event = event.name(), "dispatched");
        for listener in &mut self.listeners {
            listener.on_event(&event, state);
        }
        outcome
    }
}

/// The state handler: the only code that mutates [`RunState`].
fn apply_event(event: &mut Event, state: &mut RunState) -> Result<(), DeclError> {
    match event {
        Event::RunStart => {
            // The root group has no FinishGroupDefinition of its own; give it
            // the same closing pass before execution begins.
            close_group_definition(state, state.tree.root());
            state.has_started = true;
        }
        Event::RunFinish => {}
        Event::StartGroupDefinition { name, mode, .. } => {
            if let Some(running) = state.currently_running {
                let running_name = state.tree.bench(running).name.clone();
                let message = format!(
                    "cannot nest a group inside a benchmark: group \"{name}\" is nested \
                     within \"{running_name}\""
                );
                state
                    .tree
                    .bench_mut(running)
                    .errors
                    .push(Fault::declaration(message.clone()));
                return Err(DeclError::StructuralViolation(message));
            }
            if state.has_started {
                let message = format!(
                    "cannot declare group \"{name}\" after the run has started; \
                     declarations must complete before any run begins"
                );
                state.unhandled_errors.push(Fault::declaration(message.clone()));
                return Err(DeclError::StructuralViolation(message));
            }
            let group = state
                .tree
                .add_group(std::mem::take(name), state.current_group, *mode);
            state.current_group = group;
        }
        Event::FinishGroupDefinition => {
            let current = state.current_group;
            close_group_definition(state, current);
            if let Some(parent) = state.tree.group(current).parent {
                state.current_group = parent;
            }
        }
        Event::AddHook {
            kind,
            body,
            timeout,
            origin,
        } => {
            if let Some(running) = state.currently_running {
                let running_name = state.tree.bench(running).name.clone();
                let message = format!(
                    "hooks cannot be declared inside benchmarks: {kind}() is nested \
                     within \"{running_name}\""
                );
                state
                    .tree
                    .bench_mut(running)
                    .errors
                    .push(Fault::declaration(message.clone()).with_origin(*origin));
                return Err(DeclError::StructuralViolation(message));
            }
            if state.has_started {
                let message = format!(
                    "cannot add a {kind} hook after the run has started; \
                     hooks must be declared synchronously"
                );
                state
                    .unhandled_errors
                    .push(Fault::declaration(message.clone()).with_origin(*origin));
                return Err(DeclError::StructuralViolation(message));
            }
            let hook = Hook {
                kind: *kind,
                body: body.take(),
                timeout: timeout.unwrap_or(state.options.timeout),
                origin: *origin,
            };
            state.tree.group_mut(state.current_group).hooks.push(hook);
        }
        Event::AddBenchmark {
            name,
            mode,
            body,
            overrides,
            origin,
        } => {
            if let Some(running) = state.currently_running {
                let running_name = state.tree.bench(running).name.clone();
                let message = format!(
                    "benchmarks cannot be nested: \"{name}\" is declared within \
                     \"{running_name}\""
                );
                state
                    .tree
                    .bench_mut(running)
                    .errors
                    .push(Fault::declaration(message.clone()).with_origin(*origin));
                return Err(DeclError::StructuralViolation(message));
            }
            if state.has_started {
                let message = format!(
                    "cannot add benchmark \"{name}\" after the run has started; \
                     benchmarks must be declared synchronously"
                );
                state
                    .unhandled_errors
                    .push(Fault::declaration(message.clone()).with_origin(*origin));
                return Err(DeclError::StructuralViolation(message));
            }
            let options = state.options.merge(overrides);
            let parent = state.current_group;
            let body = match body.take() {
                Some(body) => body,
                None => Body::noop(),
            };
            let bench =
                state
                    .tree
                    .add_bench(std::mem::take(name), parent, *mode, body, options, *origin);
            // A focused benchmark inside a skipped group still focuses the run.
            if state.tree.group(parent).mode == Some(Mode::Skip)
                && state.tree.bench(bench).mode == Some(Mode::Only)
            {
                state.has_focused_benches = true;
            }
        }
        Event::StartRunGroup { .. } | Event::FinishRunGroup { .. } => {}
        Event::HookStart { .. } | Event::HookSuccess { .. } => {}
        Event::HookFailure {
            group,
            kind,
            bench,
            fault,
        } => match kind {
            // A shared setup failure invalidates every benchmark it was
            // setting up.
            HookKind::BeforeAll => {
                let fault = fault.clone();
                state.tree.add_error_to_each_bench_under(*group, &fault);
            }
            // Attaching afterAll errors to individual benchmarks would
            // incorrectly block execution ordering; they are run-level.
            HookKind::AfterAll => {
                state.unhandled_errors.push(fault.clone());
            }
            HookKind::BeforeEach | HookKind::AfterEach => {
                if let Some(bench) = bench {
                    state.tree.bench_mut(*bench).errors.push(fault.clone());
                } else {
                    state.unhandled_errors.push(fault.clone());
                }
            }
        },
        Event::BenchStart { bench } => {
            state.currently_running = Some(*bench);
            state.tree.bench_mut(*bench).invocations += 1;
        }
        Event::BenchFnStart { .. } | Event::BenchFnSuccess { .. } => {}
        Event::BenchFnFailure { bench, fault } => {
            let origin = state.tree.bench(*bench).origin;
            state
                .tree
                .bench_mut(*bench)
                .errors
                .push(fault.clone().with_origin(origin));
        }
        Event::BenchSkip { bench } => {
            set_status_once(state, *bench, BenchStatus::Skip);
            state.currently_running = None;
        }
        Event::BenchTodo { bench } => {
            set_status_once(state, *bench, BenchStatus::Todo);
            state.currently_running = None;
        }
        Event::BenchDone { bench } => {
            set_status_once(state, *bench, BenchStatus::Done);
            state.currently_running = None;
        }
        Event::Error { fault } => match state.currently_running {
            Some(bench) => state.tree.bench_mut(bench).errors.push(fault.clone()),
            None => state.unhandled_errors.push(fault.clone()),
        },
    }
    Ok(())
}

/// The closing pass of a group declaration: reject hooks in benchless
/// groups and resolve mode inheritance for direct benchmark children.
fn close_group_definition(state: &mut RunState, group: GroupId) {
    // Hooks are meaningless without benchmarks: convert each one attached
    // to a benchless group into an unhandled error.
    if !state.tree.has_benches(group) {
        let hooks = std::mem::take(&mut state.tree.group_mut(group).hooks);
        for hook in hooks {
            state.unhandled_errors.push(
                Fault::declaration(format!(
                    "invalid: {}() may not be used in a group containing no benchmarks",
                    hook.kind
                ))
                .with_origin(hook.origin),
            );
        }
    }

    // Pass the group's mode to benchmark children that did not set their
    // own, but not when the group is "only" and already holds a benchmark
    // explicitly marked "only" (avoids widening the focus to siblings).
    let group_mode = state.tree.group(group).mode;
    let has_explicit_only_bench = state
        .tree
        .group(group)
        .children
        .iter()
        .any(|child| match child {
            NodeId::Bench(b) => state.tree.bench(*b).mode == Some(Mode::Only),
            NodeId::Group(_) => false,
        });
    let should_pass_mode = !(group_mode == Some(Mode::Only) && has_explicit_only_bench);
    if should_pass_mode {
        let children = state.tree.group(group).children.clone();
        for child in children {
            if let NodeId::Bench(b) = child {
                if state.tree.bench(b).mode.is_none() {
                    state.tree.bench_mut(b).mode = group_mode;
                }
            }
        }
    }
    if !state.has_focused_benches && group_mode != Some(Mode::Skip) && has_explicit_only_bench {
        state.has_focused_benches = true;
    }
}

// A benchmark never transitions status twice.
fn set_status_once(state: &mut RunState, bench: BenchId, status: BenchStatus) {
    let slot = &mut state.tree.bench_mut(bench).status;
    debug_assert!(slot.is_none(), "status assigned twice");
    if slot.is_none() {
        *slot = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RunOptions;

    fn fresh_state() -> RunState {
        RunState::new("suite.rs", RunOptions::default()).expect("valid defaults")
    }

    fn dispatch(state: &mut RunState, event: Event) -> Result<(), DeclError> {
        Dispatcher::new().dispatch(event, state)
    }

    fn declare_group(state: &mut RunState, name: &str, mode: Option<Mode>) {
        dispatch(
            state,
            Event::StartGroupDefinition {
                name: name.to_string(),
                mode,
                origin: Origin::capture(),
            },
        )
        .expect("group declaration");
    }

    fn declare_bench(state: &mut RunState, name: &str, mode: Option<Mode>) {
        dispatch(
            state,
            Event::AddBenchmark {
                name: name.to_string(),
                mode,
                body: Some(Body::noop()),
                overrides: BenchOverrides::none(),
                origin: Origin::capture(),
            },
        )
        .expect("bench declaration");
    }

    #[test]
    fn group_mode_passes_to_unset_bench_children() {
        let mut state = fresh_state();
        declare_group(&mut state, "skipped", Some(Mode::Skip));
        declare_bench(&mut state, "a", None);
        declare_bench(&mut state, "b", Some(Mode::Only));
        dispatch(&mut state, Event::FinishGroupDefinition).expect("finish");

        let benches = state.tree.benches_in_order(state.tree.root());
        assert_eq!(state.tree.bench(benches[0]).mode, Some(Mode::Skip));
        assert_eq!(state.tree.bench(benches[1]).mode, Some(Mode::Only));
        // Focused bench inside a skip group still focuses the run.
        assert!(state.has_focused_benches);
    }

    #[test]
    fn only_group_with_explicit_only_child_does_not_propagate() {
        let mut state = fresh_state();
        declare_group(&mut state, "focus", Some(Mode::Only));
        declare_bench(&mut state, "explicit", Some(Mode::Only));
        declare_bench(&mut state, "implicit", None);
        dispatch(&mut state, Event::FinishGroupDefinition).expect("finish");

        let benches = state.tree.benches_in_order(state.tree.root());
        assert_eq!(state.tree.bench(benches[0]).mode, Some(Mode::Only));
        // Mode must NOT pass: the sibling stays normal, so it is skipped by
        // the focus rule instead of being escalated to "only" itself.
        assert_eq!(state.tree.bench(benches[1]).mode, None);
        assert!(state.has_focused_benches);
    }

    #[test]
    fn only_group_without_explicit_only_child_propagates() {
        let mut state = fresh_state();
        declare_group(&mut state, "focus", Some(Mode::Only));
        declare_bench(&mut state, "a", None);
        dispatch(&mut state, Event::FinishGroupDefinition).expect("finish");

        let benches = state.tree.benches_in_order(state.tree.root());
        assert_eq!(state.tree.bench(benches[0]).mode, Some(Mode::Only));
        assert!(state.has_focused_benches);
    }

    #[test]
    fn hooks_in_benchless_group_become_unhandled_errors() {
        let mut state = fresh_state();
        declare_group(&mut state, "empty", None);
        dispatch(
            &mut state,
            Event::AddHook {
                kind: HookKind::BeforeAll,
                body: Some(Body::noop()),
                timeout: None,
                origin: Origin::capture(),
            },
        )
        .expect("hook declaration");
        dispatch(&mut state, Event::FinishGroupDefinition).expect("finish");

        assert_eq!(state.unhandled_errors.len(), 1);
        assert!(state.unhandled_errors[0].message.contains("beforeAll"));
    }

    #[test]
    fn declaring_after_start_is_a_structural_violation() {
        let mut state = fresh_state();
        dispatch(&mut state, Event::RunStart).expect("run start");
        let result = dispatch(
            &mut state,
            Event::AddBenchmark {
                name: "late".to_string(),
                mode: None,
                body: Some(Body::noop()),
                overrides: BenchOverrides::none(),
                origin: Origin::capture(),
            },
        );
        assert!(matches!(result, Err(DeclError::StructuralViolation(_))));
        // The tree was not mutated.
        assert!(state.tree.benches_in_order(state.tree.root()).is_empty());
        assert_eq!(state.unhandled_errors.len(), 1);
    }

    #[test]
    fn declaring_inside_running_bench_attaches_to_that_bench() {
        let mut state = fresh_state();
        declare_bench(&mut state, "outer", None);
        let bench = state.tree.benches_in_order(state.tree.root())[0];
        dispatch(&mut state, Event::BenchStart { bench }).expect("start");
        let result = dispatch(
            &mut state,
            Event::AddBenchmark {
                name: "nested".to_string(),
                mode: None,
                body: Some(Body::noop()),
                overrides: BenchOverrides::none(),
                origin: Origin::capture(),
            },
        );
        assert!(matches!(result, Err(DeclError::StructuralViolation(_))));
        assert_eq!(state.tree.bench(bench).errors.len(), 1);
        assert_eq!(state.tree.benches_in_order(state.tree.root()).len(), 1);
    }

    #[test]
    fn stray_errors_attach_to_running_bench_else_run() {
        let mut state = fresh_state();
        declare_bench(&mut state, "b", None);
        let bench = state.tree.benches_in_order(state.tree.root())[0];

        dispatch(
            &mut state,
            Event::Error {
                fault: Fault::user("before any bench"),
            },
        )
        .expect("error event");
        assert_eq!(state.unhandled_errors.len(), 1);

        dispatch(&mut state, Event::BenchStart { bench }).expect("start");
        dispatch(
            &mut state,
            Event::Error {
                fault: Fault::user("during bench"),
            },
        )
        .expect("error event");
        assert_eq!(state.tree.bench(bench).errors.len(), 1);
    }

    #[test]
    fn status_is_assigned_exactly_once() {
        let mut state = fresh_state();
        declare_bench(&mut state, "b", None);
        let bench = state.tree.benches_in_order(state.tree.root())[0];
        dispatch(&mut state, Event::BenchStart { bench }).expect("start");
        dispatch(&mut state, Event::BenchDone { bench }).expect("done");
        assert_eq!(state.tree.bench(bench).status, Some(BenchStatus::Done));
        assert!(state.currently_running.is_none());
    }

    #[test]
    fn after_all_failure_is_run_level() {
        let mut state = fresh_state();
        declare_bench(&mut state, "b", None);
        let root = state.tree.root();
        dispatch(
            &mut state,
            Event::HookFailure {
                group: root,
                kind: HookKind::AfterAll,
                bench: None,
                fault: Fault::user("teardown broke"),
            },
        )
        .expect("hook failure");
        assert_eq!(state.unhandled_errors.len(), 1);
        let bench = state.tree.benches_in_order(state.tree.root())[0];
        assert!(state.tree.bench(bench).errors.is_empty());
    }
}

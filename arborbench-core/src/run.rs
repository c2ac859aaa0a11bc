//! The scheduler: depth-first traversal of the tree in declaration order.
//!
//! Groups are entered in insertion order; `beforeAll`/`afterAll` hooks are
//! resolved only when some benchmark beneath the group is eligible to run,
//! so fully skipped or filtered-out subtrees never execute their hooks.
//! Every effect goes through the dispatcher, keeping the traversal itself
//! free of direct state mutation.

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::body::BenchContext;
use crate::error::InvocationKind;
use crate::events::{Dispatcher, Event};
use crate::fault_guard::FaultChannel;
use crate::invoke::invoke;
use crate::runner::{run_iterations, IterationOutcome};
use crate::state::RunState;
use crate::tree::{BenchId, GroupId, Mode, NodeId};

pub(crate) struct Scheduler<'a> {
    pub(crate) state: &'a mut RunState,
    pub(crate) dispatcher: &'a mut Dispatcher,
    pub(crate) late: &'a mut FaultChannel,
}

impl Scheduler<'_> {
    /// Run the whole tree.
    pub(crate) async fn run(&mut self) {
        let root = self.state.tree.root();
        self.run_group(root, false).await;
    }

    // Boxed for recursion through nested groups.
    fn run_group(&mut self, group: GroupId, ancestor_skipped: bool) -> BoxFuture<'_, ()> {
        async move {
            let _ = self
                .dispatcher
                .dispatch(Event::StartRunGroup { group }, self.state);

            let is_skipped =
                ancestor_skipped || self.state.tree.group(group).mode == Some(Mode::Skip);
            let run_hooks = !is_skipped && self.state.group_has_runnable_bench(group);
            let (before_all, after_all) = self.state.tree.all_hooks_for_group(group);

            // One scratch context shared by the group's beforeAll/afterAll
            // pair; per-benchmark contexts are created fresh in run_bench.
            let mut group_ctx = BenchContext::new();
            if run_hooks {
                for index in before_all {
                    self.call_hook(group, index, None, &mut group_ctx).await;
                }
            }

            let children = self.state.tree.group(group).children.clone();
            for child in children {
                match child {
                    NodeId::Group(g) => self.run_group(g, is_skipped).await,
                    NodeId::Bench(b) => self.run_bench(b, is_skipped).await,
                }
            }

            if run_hooks {
                for index in after_all {
                    self.call_hook(group, index, None, &mut group_ctx).await;
                }
            }

            let _ = self
                .dispatcher
                .dispatch(Event::FinishRunGroup { group }, self.state);
        }
        .boxed()
    }

    async fn run_bench(&mut self, bench: BenchId, ancestor_skipped: bool) {
        let _ = self
            .dispatcher
            .dispatch(Event::BenchStart { bench }, self.state);

        if ancestor_skipped || !self.state.bench_is_runnable(bench) {
            let _ = self
                .dispatcher
                .dispatch(Event::BenchSkip { bench }, self.state);
            return;
        }
        if self.state.tree.bench(bench).mode == Some(Mode::Todo) {
            let _ = self
                .dispatcher
                .dispatch(Event::BenchTodo { bench }, self.state);
            return;
        }

        let mut ctx = BenchContext::new();
        let (before_each, after_each) = self.state.tree.each_hooks_for_bench(bench);

        for (group, index) in before_each {
            // A failed setup already invalidated the benchmark; running the
            // remaining beforeEach hooks would set up state nothing uses.
            if !self.state.tree.bench(bench).errors.is_empty() {
                break;
            }
            self.call_hook(group, index, Some(bench), &mut ctx).await;
        }

        self.call_bench(bench, &mut ctx).await;

        // afterEach hooks always run, so resources acquired by the hooks
        // that did run get released.
        for (group, index) in after_each {
            self.call_hook(group, index, Some(bench), &mut ctx).await;
        }

        let _ = self
            .dispatcher
            .dispatch(Event::BenchDone { bench }, self.state);
    }

    async fn call_hook(
        &mut self,
        group: GroupId,
        index: usize,
        bench: Option<BenchId>,
        ctx: &mut BenchContext,
    ) {
        let _ = self
            .dispatcher
            .dispatch(Event::HookStart { group, index }, self.state);

        let (mut body, timeout, kind, origin) = {
            let hook = &mut self.state.tree.group_mut(group).hooks[index];
            (hook.body.take(), hook.timeout, hook.kind, hook.origin)
        };
        let sender = self.late.sender();
        let result = match body.as_mut() {
            Some(body) => invoke(body, ctx, InvocationKind::Hook, timeout, &sender).await,
            None => Ok(()),
        };
        self.state.tree.group_mut(group).hooks[index].body = body;

        let event = match result {
            Ok(()) => Event::HookSuccess { group, kind, bench },
            Err(fault) => Event::HookFailure {
                group,
                kind,
                bench,
                fault: fault.with_origin(origin),
            },
        };
        let _ = self.dispatcher.dispatch(event, self.state);
        self.flush_late_faults();
    }

    async fn call_bench(&mut self, bench: BenchId, ctx: &mut BenchContext) {
        let _ = self
            .dispatcher
            .dispatch(Event::BenchFnStart { bench }, self.state);

        // Hook failures (or declaration errors) already doomed this
        // benchmark; measuring a broken state would produce garbage data.
        if !self.state.tree.bench(bench).errors.is_empty() {
            return;
        }

        let full_id = self.state.tree.bench_full_id(bench);
        let (mut body, options) = {
            let node = self.state.tree.bench_mut(bench);
            (node.body.take(), node.options.clone())
        };
        let sender = self.late.sender();
        let outcome = match body.as_mut() {
            Some(body) => run_iterations(body, ctx, &options, &full_id, &sender).await,
            None => IterationOutcome::default(),
        };
        {
            let node = self.state.tree.bench_mut(bench);
            node.body = body;
            node.durations_ms = outcome.durations_ms;
            node.heap_used_sizes = outcome.heap_used_sizes;
        }

        let event = match outcome.fault {
            Some(fault) => Event::BenchFnFailure { bench, fault },
            None => Event::BenchFnSuccess { bench },
        };
        let _ = self.dispatcher.dispatch(event, self.state);
        self.flush_late_faults();
    }

    /// Attribute faults that surfaced outside any invocation. Drained after
    /// every invocation so they land on the benchmark that was running.
    pub(crate) fn flush_late_faults(&mut self) {
        for fault in self.late.drain() {
            let _ = self.dispatcher.dispatch(Event::Error { fault }, self.state);
        }
    }
}

//! Benchmark and hook bodies: three calling conventions behind one type.
//!
//! A [`Body`] completes in exactly one of these ways:
//!
//! - **synchronous**: the closure returns (or panics);
//! - **callback-style**: the closure receives a [`Done`] signal and the
//!   invocation completes only when the signal fires;
//! - **future-returning**: the closure hands back a boxed future;
//! - **stepwise**: the closure hands back a fallible step iterator that the
//!   adapter drives with a cooperative yield between steps.
//!
//! The invocation adapter in [`crate::invoke`] normalizes all four into a
//! single guarded completion.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

use futures::future::BoxFuture;
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::Fault;

/// Per-benchmark scratch space shared between `beforeEach`/`afterEach` hooks
/// and the benchmark body. Created fresh for every benchmark.
#[derive(Default)]
pub struct BenchContext {
    values: HashMap<String, Box<dyn Any + Send>>,
}

impl BenchContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `key`, replacing any previous value.
    pub fn insert<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Borrow the value stored under `key`, if present and of type `T`.
    pub fn get<T: Any + Send>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref())
    }

    /// Mutably borrow the value stored under `key`.
    pub fn get_mut<T: Any + Send>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut())
    }

    /// Remove and return the value stored under `key`.
    pub fn remove<T: Any + Send>(&mut self, key: &str) -> Option<T> {
        self.values
            .remove(key)
            .and_then(|v| v.downcast().ok())
            .map(|v| *v)
    }
}

impl fmt::Debug for BenchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchContext")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// What a synchronous or callback-style body returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Returned {
    /// Nothing — the normal case.
    Unit,
    /// A rendered non-empty value. Benchmarks reject this
    /// (`BadReturnValue`); hooks tolerate it.
    Value(String),
}

/// A fallible step iterator, the stepwise body's resumable computation.
pub type Steps = Box<dyn Iterator<Item = Result<(), Fault>> + Send>;

type SyncFn = Box<dyn FnMut(&mut BenchContext) -> Returned + Send>;
type CallbackFn = Box<dyn FnMut(&mut BenchContext, Done) -> Returned + Send>;
type FutureFn = Box<dyn FnMut(&mut BenchContext) -> BoxFuture<'static, Result<(), Fault>> + Send>;
type StepsFn = Box<dyn FnMut(&mut BenchContext) -> Steps + Send>;

/// A user-supplied benchmark or hook body.
pub struct Body {
    pub(crate) kind: BodyKind,
}

pub(crate) enum BodyKind {
    Sync(SyncFn),
    Callback(CallbackFn),
    Future(FutureFn),
    Stepwise(StepsFn),
}

impl Body {
    /// A plain synchronous body. Completes when the closure returns.
    pub fn sync<F>(mut f: F) -> Self
    where
        F: FnMut(&mut BenchContext) + Send + 'static,
    {
        Self {
            kind: BodyKind::Sync(Box::new(move |ctx| {
                f(ctx);
                Returned::Unit
            })),
        }
    }

    /// A synchronous body whose return value is observed. Benchmarks fail
    /// with `BadReturnValue` when it produces one; hooks do not.
    pub fn returning<F, T>(mut f: F) -> Self
    where
        F: FnMut(&mut BenchContext) -> T + Send + 'static,
        T: fmt::Debug,
    {
        Self {
            kind: BodyKind::Sync(Box::new(move |ctx| {
                Returned::Value(format!("{:?}", f(ctx)))
            })),
        }
    }

    /// A callback-style body. Completes only when the [`Done`] signal fires.
    pub fn callback<F>(mut f: F) -> Self
    where
        F: FnMut(&mut BenchContext, Done) + Send + 'static,
    {
        Self {
            kind: BodyKind::Callback(Box::new(move |ctx, done| {
                f(ctx, done);
                Returned::Unit
            })),
        }
    }

    /// A callback-style body whose return value is observed. Returning a
    /// value and then firing the completion signal is a
    /// `ConflictingCompletion` failure.
    pub fn callback_returning<F, T>(mut f: F) -> Self
    where
        F: FnMut(&mut BenchContext, Done) -> T + Send + 'static,
        T: fmt::Debug,
    {
        Self {
            kind: BodyKind::Callback(Box::new(move |ctx, done| {
                Returned::Value(format!("{:?}", f(ctx, done)))
            })),
        }
    }

    /// A future-returning body. Completes with the future's resolution.
    pub fn future<F>(f: F) -> Self
    where
        F: FnMut(&mut BenchContext) -> BoxFuture<'static, Result<(), Fault>> + Send + 'static,
    {
        Self {
            kind: BodyKind::Future(Box::new(f)),
        }
    }

    /// A stepwise body. The adapter drives the returned iterator to
    /// completion, yielding between steps; a step error rejects the
    /// invocation.
    pub fn stepwise<F>(f: F) -> Self
    where
        F: FnMut(&mut BenchContext) -> Steps + Send + 'static,
    {
        Self {
            kind: BodyKind::Stepwise(Box::new(f)),
        }
    }

    /// Placeholder body for `todo` benchmarks. Never invoked.
    pub(crate) fn noop() -> Self {
        Self::sync(|_| {})
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            BodyKind::Sync(_) => "sync",
            BodyKind::Callback(_) => "callback",
            BodyKind::Future(_) => "future",
            BodyKind::Stepwise(_) => "stepwise",
        };
        f.debug_struct("Body").field("kind", &kind).finish()
    }
}

/// Completion signal handed to callback-style bodies.
///
/// The invocation completes when [`Done::done`] or [`Done::fail`] is called.
/// A second call is a `DoubleCompletion` failure; a call after the
/// invocation has already been consumed (for example after its timeout
/// fired) is routed to the run's late-fault channel.
#[derive(Clone)]
pub struct Done {
    cell: Arc<CompletionCell>,
}

impl Done {
    /// Signal successful completion.
    pub fn done(&self) {
        self.cell.settle(Ok(()));
    }

    /// Signal failed completion with a reason.
    pub fn fail(&self, reason: impl Into<String>) {
        self.cell.settle(Err(Fault::user(reason)));
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Done")
    }
}

enum CompletionState {
    Pending,
    Settled(Result<(), Fault>),
    Consumed,
}

/// Single-settlement cell behind [`Done`]. An explicit `pending → settled →
/// consumed` state machine guarded against double settlement.
pub(crate) struct CompletionCell {
    state: Mutex<CompletionState>,
    notify: Notify,
    late: UnboundedSender<Fault>,
}

impl CompletionCell {
    pub(crate) fn new(late: UnboundedSender<Fault>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CompletionState::Pending),
            notify: Notify::new(),
            late,
        })
    }

    pub(crate) fn done_handle(self: &Arc<Self>) -> Done {
        Done { cell: Arc::clone(self) }
    }

    fn settle(&self, result: Result<(), Fault>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &*state {
            CompletionState::Pending => {
                *state = CompletionState::Settled(result);
                self.notify.notify_one();
            }
            CompletionState::Settled(_) => {
                // Second settlement before the adapter observed the first:
                // the double-completion error wins.
                *state = CompletionState::Settled(Err(Fault::double_completion()));
                self.notify.notify_one();
            }
            CompletionState::Consumed => {
                // The invocation already finished (or timed out). Surface the
                // stray settlement through the late-fault channel.
                let detail = match result {
                    Ok(()) => "completion signal fired again".to_string(),
                    Err(fault) => fault.message,
                };
                let _ = self.late.send(Fault::late_completion(&detail));
            }
        }
    }

    /// Wait for settlement and consume it. Returns at most once per cell.
    pub(crate) async fn wait(&self) -> Result<(), Fault> {
        loop {
            {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                if matches!(&*state, CompletionState::Settled(_)) {
                    let settled = std::mem::replace(&mut *state, CompletionState::Consumed);
                    if let CompletionState::Settled(result) = settled {
                        return result;
                    }
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn settles_once() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let cell = CompletionCell::new(tx);
        cell.done_handle().done();
        assert!(cell.wait().await.is_ok());
    }

    #[tokio::test]
    async fn double_settlement_wins_over_first() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let cell = CompletionCell::new(tx);
        let done = cell.done_handle();
        done.done();
        done.done();
        let err = cell.wait().await.expect_err("double completion");
        assert_eq!(err.kind, FaultKind::DoubleCompletion);
    }

    #[tokio::test]
    async fn settlement_after_consumption_goes_late() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cell = CompletionCell::new(tx);
        let done = cell.done_handle();
        done.fail("first");
        let _ = cell.wait().await;
        done.fail("stray");
        let late = rx.recv().await.expect("late fault");
        assert_eq!(late.kind, FaultKind::LateCompletion);
        assert!(late.message.contains("stray"));
    }

    #[test]
    fn context_round_trips_values() {
        let mut ctx = BenchContext::new();
        ctx.insert("payload", vec![1_u64, 2, 3]);
        assert_eq!(ctx.get::<Vec<u64>>("payload").map(Vec::len), Some(3));
        ctx.get_mut::<Vec<u64>>("payload")
            .map(|v| v.push(4))
            .expect("present");
        assert_eq!(ctx.remove::<Vec<u64>>("payload").map(|v| v.len()), Some(4));
        assert!(ctx.get::<Vec<u64>>("payload").is_none());
    }
}

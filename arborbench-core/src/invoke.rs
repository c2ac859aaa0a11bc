//! The invocation adapter: one guarded completion for every body convention.
//!
//! Every hook and benchmark body goes through [`invoke`], which normalizes
//! the four calling conventions into a single `Result`:
//!
//! - panics are caught and converted to faults;
//! - callback-style and future-returning bodies race their completion
//!   against the timeout;
//! - completions that arrive after the timeout fired are forwarded to the
//!   late-fault channel instead of being lost;
//! - a benchmark body returning a non-empty value is a fault, and a
//!   callback-style body that returned a value and still fired its signal
//!   is a conflict.
//!
//! Plain synchronous bodies run on the scheduler thread and cannot be
//! preempted; their timeout is only observed by the conventions that yield.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc::UnboundedSender;

use crate::body::{BenchContext, Body, BodyKind, CompletionCell, Returned};
use crate::error::{Fault, InvocationKind};
use crate::fault_guard::{Tracked, TrackedSection};

/// Run `body` to completion under `limit`, normalizing all conventions.
pub(crate) async fn invoke(
    body: &mut Body,
    ctx: &mut BenchContext,
    kind: InvocationKind,
    limit: Duration,
    late: &UnboundedSender<Fault>,
) -> Result<(), Fault> {
    match &mut body.kind {
        BodyKind::Sync(f) => {
            let returned = {
                let _section = TrackedSection::enter();
                catch_unwind(AssertUnwindSafe(|| f(ctx)))
            }
            .map_err(Fault::from_panic)?;
            check_returned(returned, kind)
        }
        BodyKind::Callback(f) => {
            let cell = CompletionCell::new(late.clone());
            let done = cell.done_handle();
            let returned = {
                let _section = TrackedSection::enter();
                catch_unwind(AssertUnwindSafe(|| f(ctx, done)))
            }
            .map_err(Fault::from_panic)?;
            match tokio::time::timeout(limit, cell.wait()).await {
                // A returned value only becomes a conflict once the signal
                // actually fires; until then the invocation is still pending
                // and may simply time out.
                Ok(result) => match returned {
                    Returned::Value(value) => Err(Fault::conflicting_completion(&value)),
                    Returned::Unit => result,
                },
                Err(_) => {
                    watch_late_settlement(Arc::clone(&cell), late.clone());
                    Err(Fault::timeout(limit, kind))
                }
            }
        }
        BodyKind::Future(f) => {
            let fut = {
                let _section = TrackedSection::enter();
                catch_unwind(AssertUnwindSafe(|| f(ctx)))
            }
            .map_err(Fault::from_panic)?;
            // Polls are marked as tracked so an in-future panic is handled
            // by this catch_unwind, not the stray-panic hook.
            let mut guarded = Tracked::new(AssertUnwindSafe(fut).catch_unwind());
            match tokio::time::timeout(limit, &mut guarded).await {
                Ok(Ok(result)) => result,
                Ok(Err(payload)) => Err(Fault::from_panic(payload)),
                Err(_) => {
                    let late = late.clone();
                    tokio::spawn(async move {
                        let detail = match guarded.await {
                            Ok(Ok(())) => "the future resolved".to_string(),
                            Ok(Err(fault)) => fault.message,
                            Err(payload) => Fault::from_panic(payload).message,
                        };
                        let _ = late.send(Fault::late_completion(&detail));
                    });
                    Err(Fault::timeout(limit, kind))
                }
            }
        }
        BodyKind::Stepwise(f) => {
            let mut steps = {
                let _section = TrackedSection::enter();
                catch_unwind(AssertUnwindSafe(|| f(ctx)))
            }
            .map_err(Fault::from_panic)?;
            let drive = async move {
                loop {
                    let next = {
                        let _section = TrackedSection::enter();
                        catch_unwind(AssertUnwindSafe(|| steps.next()))
                    };
                    match next {
                        Err(payload) => return Err(Fault::from_panic(payload)),
                        Ok(None) => return Ok(()),
                        Ok(Some(Err(fault))) => return Err(fault),
                        // Cooperative yield between steps: this is where the
                        // timeout gets a chance to fire.
                        Ok(Some(Ok(()))) => tokio::task::yield_now().await,
                    }
                }
            };
            match tokio::time::timeout(limit, drive).await {
                Ok(result) => result,
                // The step iterator is dropped mid-loop; unlike callbacks and
                // futures there is nothing left to settle late.
                Err(_) => Err(Fault::timeout(limit, kind)),
            }
        }
    }
}

fn check_returned(returned: Returned, kind: InvocationKind) -> Result<(), Fault> {
    match (returned, kind) {
        (Returned::Unit, _) => Ok(()),
        // Hooks may return values; only benchmark bodies reject them.
        (Returned::Value(_), InvocationKind::Hook) => Ok(()),
        (Returned::Value(value), InvocationKind::Bench) => Err(Fault::bad_return_value(&value)),
    }
}

fn watch_late_settlement(cell: Arc<CompletionCell>, late: UnboundedSender<Fault>) {
    tokio::spawn(async move {
        let detail = match cell.wait().await {
            Ok(()) => "completion signal fired".to_string(),
            Err(fault) => fault.message,
        };
        let _ = late.send(Fault::late_completion(&detail));
    });
}

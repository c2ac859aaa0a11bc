//! Stray-fault capture: a run-scoped panic hook and the late-fault channel.
//!
//! Panics inside tracked invocations are caught with `catch_unwind` and never
//! reach the process panic hook; the hook installed here only fires for
//! panics raised *outside* any tracked section (detached tasks, late callback
//! work). Those are forwarded to the run's late-fault channel, drained by the
//! scheduler between invocations, and attributed to the currently running
//! benchmark or to the run as a whole.

use std::future::Future;
use std::panic::PanicHookInfo;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::Fault;

// Depth of tracked sections on this thread of execution. The engine runs on
// a single-threaded runtime, so a plain counter is accurate: any panic raised
// while the depth is non-zero is already being caught by `catch_unwind` and
// must not be double-reported by the hook.
static TRACKED_DEPTH: AtomicUsize = AtomicUsize::new(0);

// Where the active run's panic hook forwards stray faults.
static LATE_SINK: Mutex<Option<UnboundedSender<Fault>>> = Mutex::new(None);

/// RAII marker for code whose panics are caught by `catch_unwind`.
pub(crate) struct TrackedSection;

impl TrackedSection {
    pub(crate) fn enter() -> Self {
        TRACKED_DEPTH.fetch_add(1, Ordering::SeqCst);
        TrackedSection
    }
}

impl Drop for TrackedSection {
    fn drop(&mut self) {
        TRACKED_DEPTH.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Future adapter that marks every poll as a tracked section, so panics
/// surfacing through the poll are left to the caller's `catch_unwind`.
pub(crate) struct Tracked<F> {
    inner: F,
}

impl<F> Tracked<F> {
    pub(crate) fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<F: Future + Unpin> Future for Tracked<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let _section = TrackedSection::enter();
        Pin::new(&mut self.inner).poll(cx)
    }
}

/// Run-scoped installation of the stray-panic hook. The previous hook is
/// restored on drop, so nesting a run inside a larger program (or the test
/// harness) leaves the process hook as it found it.
pub(crate) struct FaultGuard {
    previous: Option<Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send>>,
}

impl FaultGuard {
    pub(crate) fn install(sink: UnboundedSender<Fault>) -> Self {
        *LATE_SINK.lock().unwrap_or_else(|e| e.into_inner()) = Some(sink);
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(|info| {
            if TRACKED_DEPTH.load(Ordering::SeqCst) > 0 {
                return;
            }
            let message = match info.payload().downcast_ref::<&str>() {
                Some(s) => (*s).to_string(),
                None => match info.payload().downcast_ref::<String>() {
                    Some(s) => s.clone(),
                    None => "non-string panic payload".to_string(),
                },
            };
            let message = match info.location() {
                Some(loc) => format!("stray panic at {}:{}: {message}", loc.file(), loc.line()),
                None => format!("stray panic: {message}"),
            };
            if let Some(sink) = &*LATE_SINK.lock().unwrap_or_else(|e| e.into_inner()) {
                let _ = sink.send(Fault::user(message));
            }
        }));
        Self {
            previous: Some(previous),
        }
    }
}

impl Drop for FaultGuard {
    fn drop(&mut self) {
        *LATE_SINK.lock().unwrap_or_else(|e| e.into_inner()) = None;
        if let Some(previous) = self.previous.take() {
            std::panic::set_hook(previous);
        }
    }
}

/// The run's late-fault channel: stray settlements, post-timeout completions
/// and untracked panics land here and are drained between invocations.
pub(crate) struct FaultChannel {
    tx: UnboundedSender<Fault>,
    rx: UnboundedReceiver<Fault>,
}

impl FaultChannel {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub(crate) fn sender(&self) -> UnboundedSender<Fault> {
        self.tx.clone()
    }

    /// Collect every fault queued so far without waiting for more.
    pub(crate) fn drain(&mut self) -> Vec<Fault> {
        let mut out = Vec::new();
        while let Ok(fault) = self.rx.try_recv() {
            out.push(fault);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_drains_in_order() {
        let mut channel = FaultChannel::new();
        let sender = channel.sender();
        sender.send(Fault::user("first")).expect("open channel");
        sender.send(Fault::user("second")).expect("open channel");
        let drained = channel.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "first");
        assert_eq!(drained[1].message, "second");
        assert!(channel.drain().is_empty());
    }

    #[test]
    fn tracked_section_nests() {
        assert_eq!(TRACKED_DEPTH.load(Ordering::SeqCst), 0);
        {
            let _outer = TrackedSection::enter();
            let _inner = TrackedSection::enter();
            assert_eq!(TRACKED_DEPTH.load(Ordering::SeqCst), 2);
        }
        assert_eq!(TRACKED_DEPTH.load(Ordering::SeqCst), 0);
    }
}

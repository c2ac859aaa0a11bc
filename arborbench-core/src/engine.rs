//! The engine: declaration API plus the run entry point.
//!
//! An [`Engine`] owns one declare-then-run lifecycle. Declarations build the
//! tree through dispatched events; [`Engine::run`] walks the tree once and
//! assembles a [`RunResult`]. Engines are single-use: a second `run` call
//! reports an error instead of re-executing.

use std::time::Duration;

use crate::body::Body;
use crate::error::{DeclError, Fault, Origin};
use crate::events::{Dispatcher, Event, EventListener};
use crate::fault_guard::{FaultChannel, FaultGuard};
use crate::options::BenchOverrides;
use crate::result::{assemble, RunResult};
use crate::run::Scheduler;
use crate::state::{RunOptions, RunState};
use crate::tree::{HookKind, Mode};

/// One benchmark suite: declarations in, results out.
pub struct Engine {
    state: RunState,
    dispatcher: Dispatcher,
    late: FaultChannel,
}

impl Engine {
    /// New engine for a suite named `filename`.
    pub fn new(filename: impl Into<String>, options: RunOptions) -> Result<Self, DeclError> {
        Ok(Self {
            state: RunState::new(filename, options)?,
            dispatcher: Dispatcher::new(),
            late: FaultChannel::new(),
        })
    }

    /// Attach an event listener; listeners observe every dispatched event.
    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.dispatcher.add_listener(listener);
    }

    /// Read-only view of the run state, mainly for listeners and tests.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Declare a group and populate it from `f`.
    #[track_caller]
    pub fn group<F>(&mut self, name: impl Into<String>, f: F) -> Result<(), DeclError>
    where
        F: FnOnce(&mut Engine) -> Result<(), DeclError>,
    {
        self.group_with_mode(name, None, f)
    }

    /// Declare a group with an explicit mode.
    #[track_caller]
    pub fn group_with_mode<F>(
        &mut self,
        name: impl Into<String>,
        mode: Option<Mode>,
        f: F,
    ) -> Result<(), DeclError>
    where
        F: FnOnce(&mut Engine) -> Result<(), DeclError>,
    {
        let origin = Origin::capture();
        let name = name.into();
        if name.is_empty() {
            return Err(DeclError::InvalidDeclaration(
                "group names may not be empty".to_string(),
            ));
        }
        self.dispatcher.dispatch(
            Event::StartGroupDefinition { name, mode, origin },
            &mut self.state,
        )?;
        let body_result = f(self);
        self.dispatcher
            .dispatch(Event::FinishGroupDefinition, &mut self.state)?;
        body_result
    }

    /// Attach a lifecycle hook to the group currently being declared.
    /// `timeout` falls back to the run-level default when unset.
    #[track_caller]
    pub fn hook(
        &mut self,
        kind: HookKind,
        body: Body,
        timeout: Option<Duration>,
    ) -> Result<(), DeclError> {
        let origin = Origin::capture();
        if let Some(timeout) = timeout {
            if timeout.is_zero() {
                return Err(DeclError::InvalidDeclaration(
                    "hook timeout must be greater than zero".to_string(),
                ));
            }
        }
        self.dispatcher.dispatch(
            Event::AddHook {
                kind,
                body: Some(body),
                timeout,
                origin,
            },
            &mut self.state,
        )
    }

    /// Declare a benchmark in the group currently being declared.
    #[track_caller]
    pub fn bench(
        &mut self,
        name: impl Into<String>,
        body: Body,
        overrides: BenchOverrides,
    ) -> Result<(), DeclError> {
        self.bench_with_mode(name, None, body, overrides)
    }

    /// Declare a benchmark with an explicit mode.
    #[track_caller]
    pub fn bench_with_mode(
        &mut self,
        name: impl Into<String>,
        mode: Option<Mode>,
        body: Body,
        overrides: BenchOverrides,
    ) -> Result<(), DeclError> {
        let origin = Origin::capture();
        let name = name.into();
        if name.is_empty() {
            return Err(DeclError::InvalidDeclaration(
                "benchmark names may not be empty".to_string(),
            ));
        }
        self.state.options.merge(&overrides).validate()?;
        self.dispatcher.dispatch(
            Event::AddBenchmark {
                name,
                mode,
                body: Some(body),
                overrides,
                origin,
            },
            &mut self.state,
        )
    }

    /// Declare a placeholder benchmark: reported as `todo`, never invoked.
    #[track_caller]
    pub fn bench_todo(&mut self, name: impl Into<String>) -> Result<(), DeclError> {
        self.bench_with_mode(name, Some(Mode::Todo), Body::noop(), BenchOverrides::none())
    }

    /// Execute the declared tree and assemble the result document.
    ///
    /// Must run inside a tokio runtime; the engine assumes a single-threaded
    /// one so that event ordering between invocations is deterministic.
    pub async fn run(&mut self) -> RunResult {
        if self.state.has_started {
            self.state.unhandled_errors.push(Fault::declaration(
                "run() called more than once on the same suite",
            ));
            return assemble(&self.state);
        }
        let _ = self.dispatcher.dispatch(Event::RunStart, &mut self.state);

        {
            let _guard = FaultGuard::install(self.late.sender());
            let mut scheduler = Scheduler {
                state: &mut self.state,
                dispatcher: &mut self.dispatcher,
                late: &mut self.late,
            };
            scheduler.run().await;
            scheduler.flush_late_faults();
        }

        let _ = self.dispatcher.dispatch(Event::RunFinish, &mut self.state);
        assemble(&self.state)
    }
}

#![warn(missing_docs)]
//! ArborBench Core - Benchmark Execution Engine
//!
//! This crate provides the event-driven engine behind ArborBench suites:
//! - a declaration API building a group/benchmark tree with focus, skip and
//!   todo modes plus lifecycle hooks
//! - one invocation adapter normalizing synchronous, callback-style,
//!   future-returning and stepwise bodies under a single timeout model
//! - an iteration loop with wall-clock timing, live-heap deltas and
//!   heap-snapshot artifacts
//! - a leak heuristic over per-iteration heap deltas
//!
//! Every mutation of the run state flows through the event dispatcher, and
//! every run produces a [`RunResult`] document.

mod body;
mod engine;
mod error;
mod events;
mod fault_guard;
mod invoke;
mod options;
mod registry;
mod result;
mod run;
mod runner;
mod state;
mod tree;

pub mod heap;
pub mod leak;

pub use body::{BenchContext, Body, Done, Steps};
pub use engine::Engine;
pub use error::{DeclError, Fault, FaultKind, InvocationKind, Origin};
pub use events::{Event, EventListener};
pub use options::{BenchOptions, BenchOverrides};
pub use registry::SuiteDef;
pub use result::{BenchResult, RunResult};
pub use state::{RunOptions, RunState};
pub use tree::{BenchId, BenchStatus, Benchmark, Group, GroupId, Hook, HookKind, Mode, NodeId, Tree};

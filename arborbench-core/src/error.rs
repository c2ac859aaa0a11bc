//! Error taxonomy for declaration-time and execution-time failures.
//!
//! Declaration errors (`DeclError`) are raised at the declaration call site
//! and are fatal to the suite run. Execution faults (`Fault`) attach to a
//! benchmark or to the run as a whole without aborting sibling benchmarks.

use std::fmt;
use std::panic::Location;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Source location captured when a hook or benchmark was declared.
///
/// When a callable fails long after its declaration, the surfaced error still
/// points at the line that declared it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Origin {
    /// Source file of the declaration.
    pub file: &'static str,
    /// Line of the declaration.
    pub line: u32,
}

impl Origin {
    /// Capture the caller's source location.
    #[track_caller]
    pub fn capture() -> Self {
        let loc = Location::caller();
        Self {
            file: loc.file(),
            line: loc.line(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Errors raised while the declaration pass is building the tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclError {
    /// A declaration argument was malformed (empty name, zero iterations,
    /// zero timeout, out-of-range leak variance).
    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),
    /// A declaration arrived at an illegal time: inside an executing
    /// benchmark, or after the run had already started.
    #[error("structural violation: {0}")]
    StructuralViolation(String),
}

/// Classifies an execution-time [`Fault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// An invocation exceeded its timeout.
    Timeout,
    /// A callback-style body signalled completion more than once.
    DoubleCompletion,
    /// A callback-style body both signalled completion and returned a value.
    ConflictingCompletion,
    /// A benchmark body returned a non-empty value instead of completing
    /// through one of the supported conventions.
    BadReturnValue,
    /// A completion arrived after the timeout had already fired.
    LateCompletion,
    /// A declaration-shaped problem surfaced during the run (hook in a
    /// benchless group, declaration after start).
    Declaration,
    /// An error or panic raised by user code.
    User,
}

/// Which kind of callable an invocation was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    /// A lifecycle hook.
    Hook,
    /// A benchmark body.
    Bench,
}

impl fmt::Display for InvocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hook => f.write_str("hook"),
            Self::Bench => f.write_str("bench"),
        }
    }
}

/// A single execution-time failure, attached to a benchmark or to the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fault {
    /// What went wrong.
    pub kind: FaultKind,
    /// Human-readable description. Never empty: opaque thrown values are
    /// wrapped with a synthesized message so every fault is inspectable.
    pub message: String,
    /// Declaration site of the failing hook/benchmark, when known.
    pub origin: Option<Origin>,
}

impl Fault {
    fn new(kind: FaultKind, message: String) -> Self {
        Self {
            kind,
            message,
            origin: None,
        }
    }

    /// A fault raised by user code. Empty messages are synthesized.
    pub fn user(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            "thrown: value with no message".to_string()
        } else {
            message
        };
        Self::new(FaultKind::User, message)
    }

    /// A fault for a thrown value that is not itself an error. The rendered
    /// value is embedded so the fault stays inspectable.
    pub fn opaque(rendered_value: &str) -> Self {
        Self::new(FaultKind::User, format!("thrown: {rendered_value}"))
    }

    /// Convert a caught panic payload into a fault.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        if let Some(s) = payload.downcast_ref::<&str>() {
            Self::user(*s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            Self::user(s.clone())
        } else {
            Self::opaque("non-string panic payload")
        }
    }

    /// The timeout fault, naming the elapsed limit and the invocation kind.
    pub fn timeout(limit: Duration, kind: InvocationKind) -> Self {
        Self::new(
            FaultKind::Timeout,
            format!("exceeded timeout of {}ms for a {kind}", limit.as_millis()),
        )
    }

    /// Completion signalled more than once by a callback-style body.
    pub fn double_completion() -> Self {
        Self::new(
            FaultKind::DoubleCompletion,
            "expected done to be called once, but it was called multiple times".to_string(),
        )
    }

    /// A callback-style body both took a completion signal and returned a value.
    pub fn conflicting_completion(rendered_value: &str) -> Self {
        Self::new(
            FaultKind::ConflictingCompletion,
            format!(
                "bodies cannot both take a completion signal and return a value; \
                 returned value: {rendered_value}"
            ),
        )
    }

    /// A benchmark body returned a non-empty value.
    pub fn bad_return_value(rendered_value: &str) -> Self {
        Self::new(
            FaultKind::BadReturnValue,
            format!(
                "benchmark bodies may only complete through a future, a completion \
                 signal, or by returning nothing; returned value: {rendered_value}"
            ),
        )
    }

    /// A completion observed after the timeout already fired.
    pub fn late_completion(detail: &str) -> Self {
        Self::new(
            FaultKind::LateCompletion,
            format!("completion arrived after the timeout had fired: {detail}"),
        )
    }

    /// A declaration-shaped problem surfaced during the run.
    pub fn declaration(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Declaration, message.into())
    }

    /// Attach the declaration site of the failing callable.
    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            Some(origin) => write!(f, "{} (declared at {origin})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for Fault {}

impl From<DeclError> for Fault {
    fn from(err: DeclError) -> Self {
        Self::declaration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_user_message_is_synthesized() {
        let fault = Fault::user("");
        assert!(!fault.message.is_empty());
        assert_eq!(fault.kind, FaultKind::User);
    }

    #[test]
    fn timeout_names_limit_and_kind() {
        let fault = Fault::timeout(Duration::from_millis(250), InvocationKind::Hook);
        assert!(fault.message.contains("250ms"));
        assert!(fault.message.contains("hook"));
    }

    #[test]
    fn panic_payloads_downcast() {
        let fault = Fault::from_panic(Box::new("boom"));
        assert_eq!(fault.message, "boom");
        let fault = Fault::from_panic(Box::new(42_u32));
        assert!(fault.message.starts_with("thrown:"));
    }
}

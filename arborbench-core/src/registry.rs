//! Compile-time suite registry.
//!
//! Suites register themselves through `inventory` (via the `suite!` macro in
//! the facade crate); the CLI harness iterates the registry and runs each
//! suite with the harness-level options.

use crate::engine::Engine;
use crate::error::DeclError;

/// A registered benchmark suite.
#[derive(Debug, Clone)]
pub struct SuiteDef {
    /// Suite name, used as the root group name and in result documents.
    pub name: &'static str,
    /// Source file the suite was declared in.
    pub file: &'static str,
    /// Source line the suite was declared at.
    pub line: u32,
    /// Populates a fresh engine with the suite's declarations.
    pub declare: fn(&mut Engine) -> Result<(), DeclError>,
}

inventory::collect!(SuiteDef);

/// Anchor to prevent LTO from stripping inventory entries
#[used]
#[doc(hidden)]
pub static REGISTRY_ANCHOR: fn() = || {
    for _ in inventory::iter::<SuiteDef> {}
};

//! Purpose: Define the stable public Rust API boundary for safelit.
//! Exports: Loader, rendering, check reports, value model, registry, cache and error types.
//! Role: Public, additive-only surface used by the CLI and library callers.
//! Invariants: Callers reach the pipeline only through `Loader`, `loads`, and `dumps`.
//! Invariants: Pipeline stage modules stay reachable for tests but are not re-exported here.

mod loader;
mod validation;

pub use crate::core::cache::{
    CacheCodec, CacheInfo, CacheLookup, CacheMismatch, CacheOptions, default_cache_path,
};
pub use crate::core::diagnostic::Diagnostic;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::eval::EvalError;
pub use crate::core::numeric::{Complex, Rational};
pub use crate::core::registry::{Binding, CallArgs, NameRegistry};
pub use crate::core::render::MAX_LINE_WIDTH;
pub use crate::core::value::{TimeZone, Value};
pub use loader::{CachePolicy, Loader, dumps, loads};
pub use validation::{CheckReport, CheckStatus};

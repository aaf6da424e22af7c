//! Purpose: Library crate for safe evaluation of literal documents, used by the `safelit` CLI and tests.
//! Exports: `api` (loader, rendering, reports), `core` (pipeline stages, cache codec, errors).
//! Role: Parses text against a fixed grammar, admits only whitelisted names, and evaluates to `Value`.
//! Invariants: Evaluation never executes caller-supplied logic beyond registered constructors.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;

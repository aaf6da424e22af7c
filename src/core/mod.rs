// Core modules: lexing, parsing, validation, evaluation, rendering and the snapshot cache.
pub mod ast;
pub(crate) mod builtins;
pub mod cache;
pub mod diagnostic;
pub mod error;
pub mod eval;
pub mod format;
pub mod lexer;
pub mod numeric;
pub mod parser;
pub mod registry;
pub mod render;
pub mod snapshot;
pub(crate) mod stack;
pub mod validate;
pub mod value;

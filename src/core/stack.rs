//! Purpose: Keep recursive tree walks clear of the thread's stack limit.
//! Exports: `ensure_sufficient_stack`.
//! Role: Wraps the recursive steps of the parser and renderer.
//! Invariants: Grows the stack by a fresh segment when less than the red zone remains.

const RED_ZONE: usize = 128 * 1024;
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

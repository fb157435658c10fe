//! Stack safety for the Kiln interpreter.
//!
//! Generated code may call back into generated code (a copy adapter invoking
//! getters that invoke other generated units, recursive guest methods). Each
//! guest call is a native Rust frame in the interpreter, so two guards are
//! provided:
//!
//! - [`ensure_sufficient_stack`] grows the native stack on demand
//!   (`stacker` on native targets, passthrough on WASM).
//! - [`DepthGuard`] bounds the number of nested guest frames so runaway
//!   guest recursion becomes a reportable error instead of exhausting memory.
//!
//! # Configuration
//!
//! - **Red zone**: 128KB. Below this remaining stack, a new segment is allocated.
//! - **Segment size**: 2MB per growth.
//! - **Frame limit**: [`MAX_GUEST_DEPTH`] nested guest frames per thread.

use std::cell::Cell;

/// Minimum stack space to keep available before entering a guest frame.
const RED_ZONE: usize = 128 * 1024;

/// Stack space to allocate when growing.
const STACK_PER_SEGMENT: usize = 2 * 1024 * 1024;

/// Maximum nesting of guest method invocations on one thread.
pub const MAX_GUEST_DEPTH: usize = 4096;

thread_local! {
    static GUEST_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Ensure sufficient native stack space is available before executing `f`.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_SEGMENT, f)
}

/// WASM version: WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Error returned when the guest frame limit is exceeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthExceeded {
    pub limit: usize,
}

impl std::fmt::Display for DepthExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "guest call depth exceeded {} frames", self.limit)
    }
}

impl std::error::Error for DepthExceeded {}

/// RAII token for one nested guest frame.
///
/// Entering increments the per-thread depth counter; dropping decrements it.
#[derive(Debug)]
pub struct DepthGuard {
    _private: (),
}

impl DepthGuard {
    /// Enter a guest frame, failing when the thread is already at the limit.
    pub fn enter() -> Result<Self, DepthExceeded> {
        Self::enter_with_limit(MAX_GUEST_DEPTH)
    }

    /// Enter a guest frame against an explicit limit.
    pub fn enter_with_limit(limit: usize) -> Result<Self, DepthExceeded> {
        GUEST_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= limit {
                return Err(DepthExceeded { limit });
            }
            depth.set(current + 1);
            Ok(DepthGuard { _private: () })
        })
    }

    /// Current guest depth on this thread.
    pub fn current() -> usize {
        GUEST_DEPTH.with(Cell::get)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        GUEST_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests;

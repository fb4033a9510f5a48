//! Dispatch Context
//!
//! Tracks which observables are currently delivering notifications on this
//! thread. A value write walks its whole observer chain before returning, so
//! a write to `a` that updates `b` that updates `c` shows up here as a stack
//! `[a, b, c]`.
//!
//! # Implementation
//!
//! We use a thread-local stack. `ObservationRegistry::notify` pushes the
//! source id before dispatching and the returned guard pops it afterwards,
//! even if an observer panics.
//!
//! The stack is only used for diagnostics. Trace events carry the dispatch
//! depth and flag a source that dispatches again inside its own dispatch,
//! which is how write-backs and two-way bindings show up. A warning fires
//! when nesting gets deep enough to suggest a binding cycle. The stack never
//! blocks a dispatch.

use std::cell::RefCell;

use super::ObserverId;

/// Nesting depth beyond which a dispatch is reported as a probable cycle.
pub const DEPTH_WARNING_THRESHOLD: usize = 128;

thread_local! {
    static DISPATCH_STACK: RefCell<Vec<ObserverId>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the dispatch stack when dropped.
pub struct DispatchContext {
    source: ObserverId,
}

impl DispatchContext {
    /// Enter a dispatch for the given source.
    ///
    /// The context is exited when the returned guard is dropped.
    pub fn enter(source: ObserverId) -> Self {
        let parent = Self::current_source();
        let reentered = Self::is_dispatching(source);
        let depth = DISPATCH_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(source);
            stack.len()
        });

        if reentered {
            tracing::trace!(
                %source,
                ?parent,
                depth,
                "source dispatching again inside its own dispatch"
            );
        }

        if depth == DEPTH_WARNING_THRESHOLD {
            tracing::warn!(
                %source,
                depth,
                "observer dispatch nested unusually deep; check for a binding cycle"
            );
        }

        Self { source }
    }

    /// Number of nested dispatches currently running.
    pub fn depth() -> usize {
        DISPATCH_STACK.with(|stack| stack.borrow().len())
    }

    /// The innermost source currently dispatching, if any.
    pub fn current_source() -> Option<ObserverId> {
        DISPATCH_STACK.with(|stack| stack.borrow().last().copied())
    }

    /// Whether `source` appears anywhere in the current dispatch chain.
    pub fn is_dispatching(source: ObserverId) -> bool {
        DISPATCH_STACK.with(|stack| stack.borrow().contains(&source))
    }
}

impl Drop for DispatchContext {
    fn drop(&mut self) {
        DISPATCH_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(source) = popped {
                debug_assert_eq!(
                    source, self.source,
                    "DispatchContext mismatch: expected {:?}, got {:?}",
                    self.source, source
                );
            }
        });
    }
}

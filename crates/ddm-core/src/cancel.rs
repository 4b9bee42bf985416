//! Hierarchical cancellation scopes: caller -> download -> per-task.
//!
//! Generalizes a single abort-token-per-job registry into a small tree.
//! Cancelling any ancestor cancels every descendant;
//! a scope can also be queried for whether *it itself* (as opposed to an
//! ancestor) was cancelled, which is how the worker tells a health-monitor
//! kill of its current task apart from a download-wide shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A node in the cancellation tree. Cheaply `Clone`-able; clones share the
/// same underlying flag and parent chain.
#[derive(Clone)]
pub struct CancelScope {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelScope>>,
}

impl CancelScope {
    /// A fresh scope with no parent (the caller's top-level scope).
    pub fn root() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: None,
        }
    }

    /// Derive a child scope. Cancelling `self` (or any of its ancestors)
    /// makes the child report cancelled too, but cancelling the child never
    /// affects `self`.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Request cancellation of this scope (and transitively, its children).
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True if this exact scope (not an ancestor) was cancelled.
    pub fn is_self_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// True if this scope or any ancestor was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.is_self_cancelled() || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::root()
    }
}

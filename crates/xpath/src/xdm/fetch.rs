//! Suspension primitives shared by every lazy combinator.
//!
//! A pull either completes (`Ready`) or reports that it is waiting on some outside work
//! (`NotReady`). Nothing in the engine blocks: suspension travels upward as a value until it reaches
//! the host, which resolves the [`Pending`] and pulls again.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Handle to a computation the evaluation is waiting for.
#[derive(Clone)]
pub struct Pending {
    inner: Arc<PendingInner>,
}

struct PendingInner {
    label: String,
    resolved: AtomicBool,
}

impl Pending {
    pub fn new(label: impl Into<String>) -> Self {
        Self { inner: Arc::new(PendingInner { label: label.into(), resolved: AtomicBool::new(false) }) }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Marks the awaited work as finished. Capabilities that handed this out answer synchronously from now on.
    pub fn resolve(&self) {
        self.inner.resolved.store(true, Ordering::Release);
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.load(Ordering::Acquire)
    }

    /// Identity comparison: two clones of the same handle are the same pending.
    pub fn same_as(&self, other: &Pending) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").field("label", &self.inner.label).field("resolved", &self.is_resolved()).finish()
    }
}

/// Outcome of a pull that may suspend.
#[derive(Debug, Clone)]
pub enum Fetch<T> {
    Ready(T),
    NotReady(Pending),
}

impl<T> Fetch<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Fetch::Ready(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetch<U> {
        match self {
            Fetch::Ready(v) => Fetch::Ready(f(v)),
            Fetch::NotReady(p) => Fetch::NotReady(p),
        }
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Fetch::Ready(v) => Some(v),
            Fetch::NotReady(_) => None,
        }
    }

    pub fn pending(&self) -> Option<&Pending> {
        match self {
            Fetch::Ready(_) => None,
            Fetch::NotReady(p) => Some(p),
        }
    }
}

/// One step of the iteration protocol: `Ready(None)` is done, `Ready(Some(v))` a value,
/// `NotReady(p)` a suspension.
pub type Step<T> = Fetch<Option<T>>;

/// Unwraps a [`Fetch::Ready`] or returns `Ok(Fetch::NotReady(..))` from the enclosing function.
#[macro_export]
macro_rules! ready {
    ($e:expr) => {
        match $e {
            $crate::xdm::Fetch::Ready(value) => value,
            $crate::xdm::Fetch::NotReady(pending) => return Ok($crate::xdm::Fetch::NotReady(pending)),
        }
    };
}

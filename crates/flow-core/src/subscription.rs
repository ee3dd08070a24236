//! Composable, idempotent cancellation handle.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::TeardownError;

/// Boxed release callback owned by a subscription.
pub type TeardownFn = Box<dyn FnOnce() -> Result<(), TeardownError> + Send>;

/// A single child owned by a [`Subscription`].
pub enum Teardown {
    /// A nested subscription, closed along with its parent.
    Subscription(Subscription),
    /// An arbitrary release callback.
    Callback(TeardownFn),
}

impl Teardown {
    /// Wrap an infallible release callback.
    pub fn from_fn(f: impl FnOnce() + Send + 'static) -> Self {
        Self::Callback(Box::new(move || {
            f();
            Ok(())
        }))
    }

    /// Wrap a release callback that may fail.
    pub fn fallible(f: impl FnOnce() -> Result<(), TeardownError> + Send + 'static) -> Self {
        Self::Callback(Box::new(f))
    }

    fn run(self) -> Result<(), TeardownError> {
        match self {
            Self::Subscription(sub) => sub.unsubscribe(),
            Self::Callback(f) => f(),
        }
    }
}

impl From<Subscription> for Teardown {
    fn from(sub: Subscription) -> Self {
        Self::Subscription(sub)
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscription(sub) => f.debug_tuple("Subscription").field(sub).finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

struct Inner {
    closed: AtomicBool,
    children: Mutex<Vec<Teardown>>,
}

/// Resource-ownership handle for a running subscription.
///
/// A subscription owns zero or more children (nested subscriptions or
/// release callbacks). Closing it runs every child exactly once, in the
/// order they were added. Clones share the same state.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<Inner>,
}

impl Subscription {
    /// Create a new, open subscription.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                closed: AtomicBool::new(false),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a subscription that is already closed.
    pub fn closed() -> Self {
        let sub = Self::new();
        sub.inner.closed.store(true, Ordering::Release);
        sub
    }

    /// Check if this subscription has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Attach a child teardown.
    ///
    /// If the subscription is already closed the teardown runs immediately;
    /// a failure there is logged, since no later close will report it.
    pub fn add(&self, teardown: impl Into<Teardown>) {
        let teardown = teardown.into();
        if let Teardown::Subscription(sub) = &teardown {
            if sub.ptr_eq(self) {
                return;
            }
        }

        let teardown = {
            let mut children = self.inner.children.lock();
            if !self.is_closed() {
                children.push(teardown);
                return;
            }
            teardown
        };

        if let Err(err) = teardown.run() {
            tracing::warn!(error = %err, "teardown added to closed subscription failed");
        }
    }

    /// Detach a nested subscription without closing it.
    pub fn remove(&self, child: &Subscription) {
        self.inner
            .children
            .lock()
            .retain(|t| !matches!(t, Teardown::Subscription(sub) if sub.ptr_eq(child)));
    }

    /// Close this subscription and release every child.
    ///
    /// Only the first call has any effect. Each child is released even if
    /// an earlier one fails; the first failure is returned.
    pub fn unsubscribe(&self) -> Result<(), TeardownError> {
        let children = {
            let mut children = self.inner.children.lock();
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            std::mem::take(&mut *children)
        };

        let mut first = None;
        for child in children {
            if let Err(err) = child.run() {
                tracing::warn!(error = %err, "teardown failed");
                first.get_or_insert(err);
            }
        }

        first.map_or(Ok(()), Err)
    }

    /// Number of children still attached.
    pub fn len(&self) -> usize {
        self.inner.children.lock().len()
    }

    /// Check if no children are attached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if two handles refer to the same subscription.
    pub fn ptr_eq(&self, other: &Subscription) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

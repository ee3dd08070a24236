//! Value, error and completion delivery.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::error::StreamError;
use crate::subscription::Subscription;

/// Receiver of a stream's notifications.
pub trait Observer<T>: Send {
    /// Called for each value.
    fn next(&mut self, value: T);

    /// Called once if the stream fails.
    fn error(&mut self, err: StreamError);

    /// Called once if the stream finishes.
    fn complete(&mut self);
}

/// Observer assembled from three closures.
pub struct FnObserver<N, E, C> {
    on_next: N,
    on_error: E,
    on_complete: C,
}

impl<N, E, C> FnObserver<N, E, C> {
    /// Create an observer from value, error and completion callbacks.
    pub fn new(on_next: N, on_error: E, on_complete: C) -> Self {
        Self {
            on_next,
            on_error,
            on_complete,
        }
    }
}

impl<T, N, E, C> Observer<T> for FnObserver<N, E, C>
where
    N: FnMut(T) + Send,
    E: FnMut(StreamError) + Send,
    C: FnMut() + Send,
{
    fn next(&mut self, value: T) {
        (self.on_next)(value)
    }

    fn error(&mut self, err: StreamError) {
        (self.on_error)(err)
    }

    fn complete(&mut self) {
        (self.on_complete)()
    }
}

/// A terminal notification waiting for the observer to come back.
enum Terminal {
    Error(StreamError),
    Complete,
}

impl Terminal {
    fn deliver<T>(self, mut observer: Box<dyn Observer<T>>) {
        match self {
            Self::Error(err) => observer.error(err),
            Self::Complete => observer.complete(),
        }
    }
}

struct Slot<T> {
    /// `None` while a value is being delivered, or after termination.
    observer: Option<Box<dyn Observer<T>>>,
    /// Values emitted from inside the observer's own `next`.
    queued: VecDeque<T>,
    /// Terminal notification that arrived during delivery.
    pending: Option<Terminal>,
    terminated: bool,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    /// Serializes deliveries across threads; re-entered by the delivering thread.
    emit: ReentrantMutex<()>,
    subscription: Subscription,
}

/// An observer bound to the subscription it owns.
///
/// The subscription's closed flag is the single liveness check: values
/// are dropped once it is closed, and a terminal notification is delivered
/// at most once before it closes. Clones share the same state.
///
/// No lock is held while the observer runs, so the observer may call back
/// into the same subscriber. A value emitted that way is delivered after the
/// current one; a terminal notification is delivered once the current
/// value returns.
pub struct Subscriber<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Subscriber<T> {
    /// Create a subscriber with a fresh subscription.
    pub fn new(observer: impl Observer<T> + 'static) -> Self {
        Self::with_subscription(observer, Subscription::new())
    }

    /// Create a subscriber that owns an existing subscription.
    ///
    /// Useful when the caller needs the handle before `subscribe` returns,
    /// e.g. to cancel from inside a callback.
    pub fn with_subscription(observer: impl Observer<T> + 'static, subscription: Subscription) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    observer: Some(Box::new(observer)),
                    queued: VecDeque::new(),
                    pending: None,
                    terminated: false,
                }),
                emit: ReentrantMutex::new(()),
                subscription,
            }),
        }
    }

    /// Create a subscriber from value, error and completion callbacks.
    pub fn from_fn<N, E, C>(on_next: N, on_error: E, on_complete: C) -> Self
    where
        N: FnMut(T) + Send + 'static,
        E: FnMut(StreamError) + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        Self::new(FnObserver::new(on_next, on_error, on_complete))
    }

    /// Deliver a value, unless the subscription is closed.
    pub fn next(&self, value: T) {
        if self.is_closed() {
            return;
        }

        let _emit = self.shared.emit.lock();
        let mut observer = {
            let mut slot = self.shared.slot.lock();
            match slot.observer.take() {
                Some(observer) => observer,
                None => {
                    // Called from inside the observer.
                    if !slot.terminated {
                        slot.queued.push_back(value);
                    }
                    return;
                }
            }
        };

        let mut current = value;
        let terminal = loop {
            observer.next(current);

            let mut slot = self.shared.slot.lock();
            if let Some(value) = slot.queued.pop_front() {
                if slot.pending.is_some() || !self.is_closed() {
                    current = value;
                    continue;
                }
                slot.queued.clear();
            }
            match slot.pending.take() {
                Some(terminal) => break terminal,
                None => {
                    slot.observer = Some(observer);
                    return;
                }
            }
        };

        terminal.deliver(observer);
    }

    /// Release the subscription, then deliver a terminal error.
    pub fn error(&self, err: StreamError) {
        self.terminate(Terminal::Error(err));
    }

    /// Release the subscription, then deliver completion.
    ///
    /// Resources are released first, so the observer may start follow-up
    /// work without this subscription's resources still held.
    pub fn complete(&self) {
        self.terminate(Terminal::Complete);
    }

    /// Check if this subscriber can still receive notifications.
    pub fn is_closed(&self) -> bool {
        self.shared.subscription.is_closed()
    }

    /// Get the subscription owned by this subscriber.
    pub fn subscription(&self) -> &Subscription {
        &self.shared.subscription
    }

    /// Cancel without delivering any notification.
    pub fn unsubscribe(&self) {
        self.release();
    }

    fn terminate(&self, terminal: Terminal) {
        let observer = {
            let mut slot = self.shared.slot.lock();
            if slot.terminated || self.is_closed() {
                return;
            }
            slot.terminated = true;
            match slot.observer.take() {
                Some(observer) => observer,
                None => {
                    // Delivered by `next` once the observer returns.
                    slot.pending = Some(terminal);
                    drop(slot);
                    self.release();
                    return;
                }
            }
        };

        self.release();
        terminal.deliver(observer);
    }

    fn release(&self) {
        if let Err(err) = self.shared.subscription.unsubscribe() {
            tracing::warn!(error = %err, "subscriber teardown failed");
        }
    }
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

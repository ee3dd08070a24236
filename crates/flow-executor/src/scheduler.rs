//! The scheduling contract.

use std::sync::Arc;
use std::time::Duration;

use flow_core::Subscription;

/// A unit of work run by a scheduler, once per tick.
pub type Work = Box<dyn FnMut(&mut Tick) + Send>;

/// Shared, type-erased scheduler.
pub type SharedScheduler = Arc<dyn Scheduler>;

/// Policy for when scheduled work executes.
///
/// `schedule` returns the only handle to the pending work. Closing it
/// prevents the work from running if it has not started, and prevents
/// every continuation requested through [`Tick::reschedule`]. A tick that
/// is already running is not interrupted.
///
/// Implementations must run a rescheduled continuation from their own
/// loop rather than by calling the work again from inside itself, so that
/// a long run of ticks uses constant stack depth.
pub trait Scheduler: Send + Sync {
    /// Schedule `work` to run after an optional delay.
    fn schedule(&self, work: Work, delay: Option<Duration>) -> Subscription;
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn schedule(&self, work: Work, delay: Option<Duration>) -> Subscription {
        (**self).schedule(work, delay)
    }
}

/// Execution context handed to work while it runs.
#[derive(Debug)]
pub struct Tick {
    handle: Subscription,
    next: Option<Duration>,
}

impl Tick {
    /// Create the context for one run of the work owned by `handle`.
    pub fn new(handle: Subscription) -> Self {
        Self { handle, next: None }
    }

    /// Run this work again once the current tick returns.
    ///
    /// The continuation is owned by the handle returned from the original
    /// `schedule` call. Calling this more than once keeps the last delay.
    pub fn reschedule(&mut self, delay: Option<Duration>) {
        self.next = Some(delay.unwrap_or_default());
    }

    /// Check if a continuation has been requested.
    pub fn is_rescheduled(&self) -> bool {
        self.next.is_some()
    }

    /// Check if the pending-work handle has been closed.
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_closed()
    }

    /// Get the handle for the pending work.
    pub fn handle(&self) -> &Subscription {
        &self.handle
    }

    /// Consume the context, returning the delay before the next run.
    ///
    /// Returns `None` if no continuation was requested or the handle was
    /// closed during the tick.
    pub fn into_continuation(self) -> Option<Duration> {
        if self.handle.is_closed() {
            return None;
        }
        self.next
    }
}

/// Convenience methods available on every scheduler.
pub trait SchedulerExt: Scheduler {
    /// Schedule a closure to run as soon as the policy allows.
    fn schedule_fn<F>(&self, work: F) -> Subscription
    where
        F: FnMut(&mut Tick) + Send + 'static,
    {
        self.schedule(Box::new(work), None)
    }

    /// Schedule a closure to run after `delay`.
    fn schedule_after<F>(&self, delay: Duration, work: F) -> Subscription
    where
        F: FnMut(&mut Tick) + Send + 'static,
    {
        self.schedule(Box::new(work), Some(delay))
    }
}

impl<S: Scheduler + ?Sized> SchedulerExt for S {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_without_reschedule() {
        let tick = Tick::new(Subscription::new());

        assert!(!tick.is_rescheduled());
        assert_eq!(tick.into_continuation(), None);
    }

    #[test]
    fn test_tick_reschedule_keeps_last_delay() {
        let mut tick = Tick::new(Subscription::new());
        tick.reschedule(Some(Duration::from_millis(5)));
        tick.reschedule(None);

        assert!(tick.is_rescheduled());
        assert_eq!(tick.into_continuation(), Some(Duration::ZERO));
    }

    #[test]
    fn test_tick_cancelled_drops_continuation() {
        let handle = Subscription::new();
        let mut tick = Tick::new(handle.clone());
        tick.reschedule(None);
        handle.unsubscribe().unwrap();

        assert!(tick.is_cancelled());
        assert_eq!(tick.into_continuation(), None);
    }
}

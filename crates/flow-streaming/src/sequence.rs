//! Indexed sequence driver.

use std::sync::Arc;
use std::time::Duration;

use flow_core::{SchedulerConfig, Source, StreamError, Subscriber, Subscription};
use flow_executor::{SharedScheduler, Tick};

/// Source that emits each element of a finite sequence, one per tick.
///
/// Each tick emits the element at the cursor and reschedules itself; the
/// tick after the last element signals completion. An empty sequence
/// completes on its first tick.
pub struct ScheduledSequence<T> {
    items: Arc<[T]>,
    scheduler: SharedScheduler,
    delay: Option<Duration>,
}

impl<T> ScheduledSequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a driver over `items`.
    pub fn new(items: impl Into<Arc<[T]>>, scheduler: SharedScheduler) -> Self {
        Self {
            items: items.into(),
            scheduler,
            delay: None,
        }
    }

    /// Wait `delay` between consecutive ticks.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Apply the tick delay from a scheduler configuration.
    pub fn with_config(mut self, config: &SchedulerConfig) -> Self {
        self.delay = config.tick_delay();
        self
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the sequence has no elements.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Source for ScheduledSequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;

    fn subscribe(&self, subscriber: Subscriber<T>) -> Result<Subscription, StreamError> {
        let sub = subscriber.subscription().clone();
        let items = self.items.clone();
        let delay = self.delay;
        let mut index = 0;

        tracing::debug!(len = items.len(), "subscribing indexed sequence");

        let work = self.scheduler.schedule(
            Box::new(move |tick: &mut Tick| {
                if index == items.len() {
                    subscriber.complete();
                    return;
                }

                subscriber.next(items[index].clone());
                index += 1;

                // The consumer may have cancelled from inside `next`.
                if !subscriber.is_closed() {
                    tick.reschedule(delay);
                }
            }),
            None,
        );
        sub.add(work);

        Ok(sub)
    }
}

/// Create a source emitting `items` on `scheduler`, one per tick.
pub fn scheduled<T>(items: impl Into<Arc<[T]>>, scheduler: SharedScheduler) -> ScheduledSequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    ScheduledSequence::new(items, scheduler)
}

//! Constant-value mapping.

use flow_core::{Observer, Source, StreamError, Subscriber, Subscription};

/// Source that emits a clone of a fixed value for every upstream value.
///
/// Completion, errors and cancellation pass through unchanged.
pub struct MapTo<S, R> {
    source: S,
    value: R,
}

impl<S, R> MapTo<S, R> {
    /// Wrap `source`, replacing each value with `value`.
    pub fn new(source: S, value: R) -> Self {
        Self { source, value }
    }
}

impl<S, R> Source for MapTo<S, R>
where
    S: Source,
    R: Clone + Send + Sync + 'static,
{
    type Item = R;

    fn subscribe(&self, subscriber: Subscriber<R>) -> Result<Subscription, StreamError> {
        let upstream = Subscriber::new(MapToObserver {
            value: self.value.clone(),
            downstream: subscriber.clone(),
        });
        subscriber.subscription().add(upstream.subscription().clone());

        let handle = self.source.subscribe(upstream.clone())?;
        upstream.subscription().add(handle);
        Ok(subscriber.subscription().clone())
    }
}

struct MapToObserver<R> {
    value: R,
    downstream: Subscriber<R>,
}

impl<T, R> Observer<T> for MapToObserver<R>
where
    R: Clone + Send,
{
    fn next(&mut self, _: T) {
        self.downstream.next(self.value.clone());
    }

    fn error(&mut self, err: StreamError) {
        self.downstream.error(err);
    }

    fn complete(&mut self) {
        self.downstream.complete();
    }
}

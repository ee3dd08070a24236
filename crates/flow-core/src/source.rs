//! The subscribable source abstraction.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::StreamError;
use crate::subscriber::{FnObserver, Subscriber};
use crate::subscription::Subscription;

/// Anything that emits zero or more values followed by at most one
/// terminal notification.
///
/// `subscribe` returns `Err` only for configuration errors, detected before
/// any work is scheduled. Failures during the stream's lifetime are
/// delivered through [`Subscriber::error`].
pub trait Source: Send + Sync {
    /// Type of the emitted values.
    type Item: Send + 'static;

    /// Start emitting into `subscriber`.
    fn subscribe(&self, subscriber: Subscriber<Self::Item>) -> Result<Subscription, StreamError>;
}

/// Shared, type-erased source.
pub type BoxSource<T> = Arc<dyn Source<Item = T>>;

impl<S: Source + ?Sized> Source for Arc<S> {
    type Item = S::Item;

    fn subscribe(&self, subscriber: Subscriber<Self::Item>) -> Result<Subscription, StreamError> {
        (**self).subscribe(subscriber)
    }
}

/// Convenience methods available on every source.
pub trait SourceExt: Source {
    /// Subscribe with value, error and completion callbacks.
    fn subscribe_with<N, E, C>(
        &self,
        on_next: N,
        on_error: E,
        on_complete: C,
    ) -> Result<Subscription, StreamError>
    where
        N: FnMut(Self::Item) + Send + 'static,
        E: FnMut(StreamError) + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        self.subscribe(Subscriber::new(FnObserver::new(on_next, on_error, on_complete)))
    }

    /// Erase the concrete type.
    fn boxed(self) -> BoxSource<Self::Item>
    where
        Self: Sized + 'static,
    {
        Arc::new(self)
    }
}

impl<S: Source + ?Sized> SourceExt for S {}

/// Source built from a closure that drives the subscriber directly.
///
/// See [`create`].
pub struct Create<T, F> {
    producer: F,
    _item: PhantomData<fn() -> T>,
}

impl<T, F> Source for Create<T, F>
where
    T: Send + 'static,
    F: Fn(&Subscriber<T>) -> Result<(), StreamError> + Send + Sync,
{
    type Item = T;

    fn subscribe(&self, subscriber: Subscriber<T>) -> Result<Subscription, StreamError> {
        (self.producer)(&subscriber)?;
        Ok(subscriber.subscription().clone())
    }
}

/// Create a source from a producer closure.
///
/// The producer receives the subscriber on every subscription. It may emit
/// synchronously, hand the subscriber to other work, and attach release
/// callbacks to `subscriber.subscription()`.
pub fn create<T, F>(producer: F) -> Create<T, F>
where
    T: Send + 'static,
    F: Fn(&Subscriber<T>) -> Result<(), StreamError> + Send + Sync,
{
    Create {
        producer,
        _item: PhantomData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_create_emits_synchronously() {
        let source = create(|s: &Subscriber<i32>| {
            s.next(1);
            s.next(2);
            s.complete();
            Ok(())
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(Mutex::new(false));
        let (v, d) = (seen.clone(), done.clone());

        let sub = source
            .subscribe_with(move |x| v.lock().push(x), |_| {}, move || *d.lock() = true)
            .unwrap();

        assert_eq!(*seen.lock(), vec![1, 2]);
        assert!(*done.lock());
        assert!(sub.is_closed());
    }

    #[test]
    fn test_create_config_error_is_returned() {
        let source = create(|_: &Subscriber<i32>| Err(StreamError::config("missing input")));

        let err = source.subscribe_with(|_| {}, |_| {}, || {}).unwrap_err();

        assert!(err.is_config());
    }

    #[test]
    fn test_boxed_source_subscribes() {
        let source: BoxSource<&'static str> = create(|s: &Subscriber<&'static str>| {
            s.next("a");
            Ok(())
        })
        .boxed();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let v = seen.clone();

        let sub = source.subscribe_with(move |x| v.lock().push(x), |_| {}, || {}).unwrap();

        assert_eq!(*seen.lock(), vec!["a"]);
        assert!(!sub.is_closed());
    }
}

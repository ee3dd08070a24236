//! Asynchronous pull sequence driver.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use flow_core::{Source, StreamError, Subscriber, Subscription, Teardown};
use flow_executor::{SharedScheduler, Tick, Work};
use futures::stream::BoxStream;
use futures::task::{waker, ArcWake};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;

type Cursor<T> = BoxStream<'static, Result<T, StreamError>>;
type OpenCursor<T> = Arc<dyn Fn() -> Cursor<T> + Send + Sync>;

/// Source that emits the values of an asynchronous pull sequence.
///
/// The sequence is a [`Stream`] produced by a cursor factory. On the
/// first tick the driver opens a cursor, then a nested step requests one
/// value per tick. When the stream is not ready the driver parks; the
/// stream's waker schedules the next step. Only one request is ever
/// outstanding.
pub struct ScheduledPull<T> {
    open: Option<OpenCursor<T>>,
    scheduler: SharedScheduler,
}

impl<T: Send + 'static> ScheduledPull<T> {
    /// Create a driver over an infallible stream.
    ///
    /// `open` is called once per subscription to acquire a fresh cursor.
    /// Subscribing to a driver built with `None` fails with a
    /// configuration error before anything is scheduled.
    pub fn new<F, S>(open: Option<F>, scheduler: SharedScheduler) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = T> + Send + 'static,
    {
        let open =
            open.map(|f| Arc::new(move || f().map(Ok::<T, StreamError>).boxed()) as OpenCursor<T>);
        Self { open, scheduler }
    }

    /// Create a driver over a stream of results.
    ///
    /// An `Err` item terminates the subscription with a source error.
    pub fn try_new<F, S, E>(open: Option<F>, scheduler: SharedScheduler) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let open = open.map(|f| {
            Arc::new(move || {
                f().map(|item| item.map_err(|e| StreamError::Source(e.into())))
                    .boxed()
            }) as OpenCursor<T>
        });
        Self { open, scheduler }
    }
}

impl<T: Send + 'static> Source for ScheduledPull<T> {
    type Item = T;

    fn subscribe(&self, subscriber: Subscriber<T>) -> Result<Subscription, StreamError> {
        let open = self
            .open
            .clone()
            .ok_or_else(|| StreamError::config("pull sequence source cannot be absent"))?;
        let sub = subscriber.subscription().clone();
        let scheduler = self.scheduler.clone();

        let acquire = self.scheduler.schedule(
            Box::new(move |_: &mut Tick| {
                if subscriber.is_closed() {
                    return;
                }

                let state = Arc::new(PullState {
                    cursor: Mutex::new(Some(open())),
                    subscriber: subscriber.clone(),
                    scheduler: scheduler.clone(),
                    step: Mutex::new(None),
                    generation: AtomicU64::new(0),
                    state: AtomicU8::new(ACTIVE),
                });
                tracing::debug!("pull cursor acquired");

                let release = state.clone();
                subscriber.subscription().add(Teardown::from_fn(move || {
                    release.cursor.lock().take();
                    release.step.lock().take();
                }));

                state.schedule_step();
            }),
            None,
        );
        sub.add(acquire);

        Ok(sub)
    }
}

/// Create a source emitting the values of the stream returned by `open`.
pub fn scheduled_stream<T, F, S>(open: F, scheduler: SharedScheduler) -> ScheduledPull<T>
where
    T: Send + 'static,
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = T> + Send + 'static,
{
    ScheduledPull::new(Some(open), scheduler)
}

/// No step is scheduled; the cursor is waiting on its waker.
const IDLE: u8 = 0;
/// A step is scheduled or running.
const ACTIVE: u8 = 1;
/// The waker fired while a step was running.
const NOTIFIED: u8 = 2;

struct PullState<T> {
    cursor: Mutex<Option<Cursor<T>>>,
    subscriber: Subscriber<T>,
    scheduler: SharedScheduler,
    /// Handle of the most recently scheduled pull step, with its generation.
    step: Mutex<Option<(u64, Subscription)>>,
    generation: AtomicU64,
    state: AtomicU8,
}

impl<T: Send + 'static> PullState<T> {
    fn schedule_step(self: &Arc<Self>) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let state = self.clone();
        let work: Work = Box::new(move |tick: &mut Tick| state.pull(tick));
        let handle = self.scheduler.schedule(work, None);

        // A step may run, park and be woken before `schedule` returns.
        let sub = self.subscriber.subscription();
        let mut step = self.step.lock();
        if matches!(&*step, Some((newest, _)) if *newest > generation) {
            tracing::trace!(generation, "pull step superseded before it was recorded");
            return;
        }
        if let Some((_, previous)) = step.replace((generation, handle.clone())) {
            sub.remove(&previous);
        }
        sub.add(handle);
    }

    fn pull(self: &Arc<Self>, tick: &mut Tick) {
        if self.subscriber.is_closed() {
            return;
        }

        let polled = {
            let mut cursor = self.cursor.lock();
            let Some(stream) = cursor.as_mut() else {
                return;
            };
            self.state.store(ACTIVE, Ordering::Release);
            let waker = waker(self.clone());
            let mut cx = Context::from_waker(&waker);
            stream.poll_next_unpin(&mut cx)
        };

        match polled {
            Poll::Ready(Some(Ok(value))) => {
                self.subscriber.next(value);
                if !self.subscriber.is_closed() {
                    tick.reschedule(None);
                }
            }
            Poll::Ready(Some(Err(err))) => {
                tracing::debug!(error = %err, "pull sequence failed");
                self.subscriber.error(err);
            }
            Poll::Ready(None) => {
                tracing::debug!("pull sequence exhausted");
                self.subscriber.complete();
            }
            Poll::Pending => {
                let parked = self
                    .state
                    .compare_exchange(ACTIVE, IDLE, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
                if parked {
                    tracing::trace!("pull sequence pending");
                } else {
                    // Woken while polling.
                    self.state.store(ACTIVE, Ordering::Release);
                    tick.reschedule(None);
                }
            }
        }
    }
}

impl<T: Send + 'static> ArcWake for PullState<T> {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        if arc_self.subscriber.is_closed() {
            return;
        }

        let mut current = arc_self.state.load(Ordering::Acquire);
        loop {
            let next = match current {
                IDLE => ACTIVE,
                ACTIVE => NOTIFIED,
                _ => return,
            };
            match arc_self
                .state
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        if current == IDLE {
            arc_self.schedule_step();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::{FnObserver, SourceExt};
    use flow_executor::TrampolineScheduler;
    use futures::channel::mpsc;

    #[derive(Debug, PartialEq)]
    enum Event {
        Next(i32),
        Error(String),
        Complete,
    }

    fn trampoline() -> SharedScheduler {
        Arc::new(TrampolineScheduler::new())
    }

    fn record<S: Source<Item = i32>>(source: &S) -> (Arc<Mutex<Vec<Event>>>, Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let (n, e, c) = (events.clone(), events.clone(), events.clone());
        let sub = source
            .subscribe_with(
                move |v| n.lock().push(Event::Next(v)),
                move |err| e.lock().push(Event::Error(err.to_string())),
                move || c.lock().push(Event::Complete),
            )
            .unwrap();
        (events, sub)
    }

    #[test]
    fn test_ready_stream_emits_then_completes() {
        let source = scheduled_stream(|| futures::stream::iter(vec![1, 2, 3]), trampoline());

        let (events, sub) = record(&source);

        assert_eq!(
            *events.lock(),
            vec![Event::Next(1), Event::Next(2), Event::Next(3), Event::Complete]
        );
        assert!(sub.is_closed());
    }

    #[test]
    fn test_absent_source_is_config_error() {
        let source = ScheduledPull::new(None::<fn() -> futures::stream::Empty<i32>>, trampoline());

        let err = source.subscribe_with(|_| {}, |_| {}, || {}).unwrap_err();

        assert!(err.is_config());
    }

    #[test]
    fn test_each_subscription_opens_a_fresh_cursor() {
        let source = scheduled_stream(|| futures::stream::iter(vec![7]), trampoline());

        let (first, _) = record(&source);
        let (second, _) = record(&source);

        assert_eq!(*first.lock(), vec![Event::Next(7), Event::Complete]);
        assert_eq!(*second.lock(), vec![Event::Next(7), Event::Complete]);
    }

    #[test]
    fn test_resumes_when_pending_stream_wakes() {
        let (tx, rx) = mpsc::unbounded::<i32>();
        let rx = Mutex::new(Some(rx));
        let source = scheduled_stream(
            move || rx.lock().take().unwrap_or_else(|| mpsc::unbounded().1),
            trampoline(),
        );

        let (events, sub) = record(&source);
        assert!(events.lock().is_empty());

        tx.unbounded_send(1).unwrap();
        tx.unbounded_send(2).unwrap();
        assert_eq!(*events.lock(), vec![Event::Next(1), Event::Next(2)]);

        drop(tx);
        assert_eq!(
            *events.lock(),
            vec![Event::Next(1), Event::Next(2), Event::Complete]
        );
        assert!(sub.is_closed());
    }

    #[test]
    fn test_cancel_while_pending_drops_cursor() {
        let (tx, rx) = mpsc::unbounded::<i32>();
        let rx = Mutex::new(Some(rx));
        let source = scheduled_stream(
            move || rx.lock().take().unwrap_or_else(|| mpsc::unbounded().1),
            trampoline(),
        );

        let (events, sub) = record(&source);
        sub.unsubscribe().unwrap();

        assert!(tx.unbounded_send(1).is_err());
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_cancel_inside_next_stops_pulling() {
        let sub = Subscription::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (v, handle) = (seen.clone(), sub.clone());
        let subscriber = Subscriber::with_subscription(
            FnObserver::new(
                move |x: i32| {
                    v.lock().push(x);
                    handle.unsubscribe().unwrap();
                },
                |_: StreamError| {},
                || {},
            ),
            sub,
        );

        scheduled_stream(|| futures::stream::iter(vec![1, 2, 3]), trampoline())
            .subscribe(subscriber)
            .unwrap();

        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn test_error_item_terminates_with_source_error() {
        let source = ScheduledPull::try_new(
            Some(|| {
                futures::stream::iter(vec![Ok(1), Err(anyhow::anyhow!("disk gone")), Ok(3)])
            }),
            trampoline(),
        );

        let (events, sub) = record(&source);

        assert_eq!(
            *events.lock(),
            vec![
                Event::Next(1),
                Event::Error("Source error: disk gone".to_string())
            ]
        );
        assert!(sub.is_closed());
    }

    /// Trampoline that runs a hook after one `schedule` call's work ran,
    /// before that call returns its handle.
    struct WakeBeforeReturn {
        inner: TrampolineScheduler,
        calls: std::sync::atomic::AtomicUsize,
        hook_at: usize,
        hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
        handles: Mutex<Vec<(usize, Subscription)>>,
    }

    impl flow_executor::Scheduler for WakeBeforeReturn {
        fn schedule(&self, work: Work, delay: Option<std::time::Duration>) -> Subscription {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let handle = self.inner.schedule(work, delay);
            if call == self.hook_at {
                let hook = self.hook.lock().take();
                if let Some(hook) = hook {
                    hook();
                }
            }
            self.handles.lock().push((call, handle.clone()));
            handle
        }
    }

    #[test]
    fn test_newest_step_stays_attached_when_recorded_late() {
        let (tx, rx) = mpsc::unbounded::<i32>();
        let rx = Mutex::new(Some(rx));
        // Calls: 0 acquire, 1 first step, 2 step woken by the first value,
        // 3 step woken from inside call 2.
        let scheduler = Arc::new(WakeBeforeReturn {
            inner: TrampolineScheduler::new(),
            calls: std::sync::atomic::AtomicUsize::new(0),
            hook_at: 2,
            hook: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        });
        let hook_tx = tx.clone();
        *scheduler.hook.lock() = Some(Box::new(move || {
            hook_tx.unbounded_send(2).unwrap();
        }));
        let source = scheduled_stream(
            move || rx.lock().take().unwrap_or_else(|| mpsc::unbounded().1),
            scheduler.clone(),
        );

        let (events, sub) = record(&source);
        tx.unbounded_send(1).unwrap();
        assert_eq!(*events.lock(), vec![Event::Next(1), Event::Next(2)]);

        sub.unsubscribe().unwrap();

        let newest = scheduler
            .handles
            .lock()
            .iter()
            .find(|(call, _)| *call == 3)
            .map(|(_, handle)| handle.clone())
            .unwrap();
        assert!(newest.is_closed());
    }

    #[tokio::test]
    async fn test_pull_on_tokio_scheduler() {
        let scheduler: SharedScheduler =
            Arc::new(flow_executor::TokioScheduler::current().unwrap());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let done_tx = tx.clone();

        scheduled_stream(
            || {
                futures::stream::iter(vec![1, 2, 3]).then(|x| async move {
                    tokio::task::yield_now().await;
                    x * 10
                })
            },
            scheduler,
        )
        .subscribe_with(
            move |x| {
                let _ = tx.send(Some(x));
            },
            |_| {},
            move || {
                let _ = done_tx.send(None);
            },
        )
        .unwrap();

        let mut seen = Vec::new();
        while let Some(Some(x)) = rx.recv().await {
            seen.push(x);
        }
        assert_eq!(seen, vec![10, 20, 30]);
    }
}

//! Sequential concatenation of sources.

use std::collections::VecDeque;
use std::sync::Arc;

use flow_core::{BoxSource, Observer, Source, StreamError, Subscriber, Subscription};
use parking_lot::Mutex;

/// Source that subscribes to each member in turn.
///
/// A member is only subscribed after the previous one completes. Values
/// are forwarded unchanged; the first member error ends the whole chain
/// and later members are never subscribed. Cancelling tears down only the
/// member that is currently active, including the handle its `subscribe`
/// returned.
///
/// A member that rejects its subscription with a configuration error,
/// the first member included, ends the chain through the error callback.
/// `subscribe` on the chain itself never fails.
pub struct Concat<T> {
    sources: Vec<BoxSource<T>>,
}

impl<T: Send + 'static> Concat<T> {
    /// Create a chain over `sources`, in order.
    pub fn new(sources: impl IntoIterator<Item = BoxSource<T>>) -> Self {
        Self {
            sources: sources.into_iter().collect(),
        }
    }

    /// Append a member to the end of the chain.
    pub fn then(mut self, source: BoxSource<T>) -> Self {
        self.sources.push(source);
        self
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if the chain has no members.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl<T: Send + 'static> Source for Concat<T> {
    type Item = T;

    fn subscribe(&self, subscriber: Subscriber<T>) -> Result<Subscription, StreamError> {
        let sub = subscriber.subscription().clone();
        let chain = Arc::new(Chain {
            state: Mutex::new(ChainState {
                remaining: self.sources.iter().cloned().collect(),
                active: None,
                activating: false,
                advance_pending: false,
            }),
            outer: subscriber,
        });

        tracing::debug!(members = self.sources.len(), "subscribing concat chain");
        chain.advance();

        Ok(sub)
    }
}

/// Create a source that runs each of `sources` to completion, in order.
pub fn concat<T: Send + 'static>(sources: impl IntoIterator<Item = BoxSource<T>>) -> Concat<T> {
    Concat::new(sources)
}

struct ChainState<T> {
    remaining: VecDeque<BoxSource<T>>,
    /// Subscription of the member currently running.
    active: Option<Subscription>,
    /// An activation loop is on the stack.
    activating: bool,
    /// A member completed while the loop was subscribing it.
    advance_pending: bool,
}

struct Chain<T> {
    state: Mutex<ChainState<T>>,
    outer: Subscriber<T>,
}

impl<T: Send + 'static> Chain<T> {
    /// Detach the finished member and activate the next one.
    ///
    /// A member that completes synchronously inside its own `subscribe`
    /// is handled by the loop already running, not by recursing.
    fn advance(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.activating {
                state.advance_pending = true;
                return;
            }
            state.activating = true;
        }

        loop {
            if self.outer.is_closed() {
                break;
            }

            let next = {
                let mut state = self.state.lock();
                if let Some(finished) = state.active.take() {
                    self.outer.subscription().remove(&finished);
                }
                state.remaining.pop_front()
            };

            let Some(source) = next else {
                tracing::debug!("concat chain complete");
                self.outer.complete();
                break;
            };

            let inner = Subscription::new();
            self.state.lock().active = Some(inner.clone());
            self.outer.subscription().add(inner.clone());

            let member = Subscriber::with_subscription(Member { chain: self.clone() }, inner.clone());
            match source.subscribe(member) {
                Ok(handle) => inner.add(handle),
                Err(err) => {
                    tracing::debug!(error = %err, "concat member rejected subscription");
                    self.outer.error(err);
                    break;
                }
            }

            let mut state = self.state.lock();
            if !state.advance_pending {
                state.activating = false;
                return;
            }
            state.advance_pending = false;
        }

        self.state.lock().activating = false;
    }
}

/// Observer attached to the active member.
struct Member<T> {
    chain: Arc<Chain<T>>,
}

impl<T: Send + 'static> Observer<T> for Member<T> {
    fn next(&mut self, value: T) {
        self.chain.outer.next(value);
    }

    fn error(&mut self, err: StreamError) {
        self.chain.outer.error(err);
    }

    fn complete(&mut self) {
        tracing::debug!("concat member complete");
        self.chain.advance();
    }
}

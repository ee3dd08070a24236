//! Current-thread trampolining scheduler.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use flow_core::{SchedulerConfig, Subscription};

use crate::scheduler::{Scheduler, Tick, Work};

struct Queued {
    due: Instant,
    seq: u64,
    work: Work,
    handle: Subscription,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Reversed: BinaryHeap pops the earliest due, then the earliest queued.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Queued>,
    seq: u64,
}

impl Queue {
    fn push(&mut self, due: Instant, work: Work, handle: Subscription) {
        self.seq += 1;
        self.heap.push(Queued {
            due,
            seq: self.seq,
            work,
            handle,
        });
    }
}

thread_local! {
    // `Some` while a drain loop is running on this thread.
    static QUEUE: RefCell<Option<Queue>> = const { RefCell::new(None) };
}

/// Clears the thread's queue if a tick unwinds, so later calls drain again.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        QUEUE.with(|q| q.borrow_mut().take());
    }
}

/// Scheduler that runs work on the calling thread.
///
/// Work scheduled from outside a tick runs immediately, and the call
/// returns once the thread's queue is empty. Work scheduled from inside a
/// tick (including continuations) is queued and run by the same loop once
/// the current tick returns, so ticks never nest on the stack. Delayed work
/// blocks the thread until it is due.
#[derive(Debug, Clone)]
pub struct TrampolineScheduler {
    config: SchedulerConfig,
}

impl TrampolineScheduler {
    /// Create a new trampoline scheduler.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::new("trampoline"))
    }

    /// Create a trampoline scheduler with the given configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Check if a drain loop is running on this thread.
    pub fn is_draining() -> bool {
        QUEUE.with(|q| q.borrow().is_some())
    }

    fn drain(&self) {
        let _guard = DrainGuard;
        let mut ticks = 0u64;

        while let Some(mut queued) = QUEUE.with(|q| q.borrow_mut().as_mut().and_then(|q| q.heap.pop())) {
            if queued.handle.is_closed() {
                continue;
            }

            let now = Instant::now();
            if queued.due > now {
                std::thread::sleep(queued.due - now);
                if queued.handle.is_closed() {
                    continue;
                }
            }

            ticks += 1;
            tracing::trace!(scheduler = %self.config.label, seq = queued.seq, "tick");

            let mut tick = Tick::new(queued.handle.clone());
            (queued.work)(&mut tick);

            if let Some(delay) = tick.into_continuation() {
                let due = Instant::now() + delay;
                QUEUE.with(|q| {
                    if let Some(q) = q.borrow_mut().as_mut() {
                        q.push(due, queued.work, queued.handle);
                    }
                });
            }
        }

        tracing::debug!(scheduler = %self.config.label, ticks, "queue drained");
    }
}

impl Default for TrampolineScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TrampolineScheduler {
    fn schedule(&self, work: Work, delay: Option<Duration>) -> Subscription {
        let handle = Subscription::new();
        let due = Instant::now() + delay.unwrap_or_default();

        let nested = QUEUE.with(|q| {
            let mut q = q.borrow_mut();
            let nested = q.is_some();
            q.get_or_insert_with(Queue::default)
                .push(due, work, handle.clone());
            nested
        });

        if !nested {
            self.drain();
        }

        handle
    }
}

//! Tokio-backed scheduler.

use std::time::Duration;

use flow_core::{SchedulerConfig, StreamError, Subscription, Teardown};
use tokio::runtime::Handle;

use crate::scheduler::{Scheduler, Tick, Work};

/// Scheduler that runs each work item as a task on a tokio runtime.
///
/// A scheduled item gets one task for its whole lifetime: continuations
/// loop inside that task (sleeping for their delay) instead of spawning
/// again. Closing the returned handle aborts the task.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
    config: SchedulerConfig,
}

impl TokioScheduler {
    /// Create a scheduler that spawns onto the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            config: SchedulerConfig::new("tokio"),
        }
    }

    /// Create a scheduler for the runtime the caller is running in.
    pub fn current() -> Result<Self, StreamError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| StreamError::config(e.to_string()))
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, mut work: Work, delay: Option<Duration>) -> Subscription {
        let sub = Subscription::new();
        let handle = sub.clone();
        let label = self.config.label.clone();
        let yield_interval = u64::from(self.config.yield_interval.max(1));

        let task = self.handle.spawn(async move {
            let mut delay = delay.unwrap_or_default();
            let mut ticks = 0u64;

            loop {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if handle.is_closed() {
                    break;
                }

                ticks += 1;
                tracing::trace!(scheduler = %label, ticks, "tick");

                let mut tick = Tick::new(handle.clone());
                work(&mut tick);

                match tick.into_continuation() {
                    Some(next) => {
                        delay = next;
                        if ticks % yield_interval == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                    None => break,
                }
            }
        });

        sub.add(Teardown::from_fn(move || task.abort()));
        sub
    }
}

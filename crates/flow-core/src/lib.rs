//! Core abstractions for scheduled, cancellable value streams.
//!
//! This crate provides the fundamental types and traits:
//! - `Subscription` - Composable, idempotent cancellation handle
//! - `Subscriber` / `Observer` - Value, error and completion delivery
//! - `Source` trait - Anything that can be subscribed to
//! - `SchedulerConfig` - Tick timing configuration
//! - `StreamError` - Configuration, source and teardown failures

mod config;
mod error;
mod source;
mod subscriber;
mod subscription;

pub use config::*;
pub use error::*;
pub use source::*;
pub use subscriber::*;
pub use subscription::*;

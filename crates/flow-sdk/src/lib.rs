//! Public SDK for scheduled, cancellable value streams.
//!
//! This crate re-exports all stream functionality:
//!
//! ```ignore
//! use flow_sdk::prelude::*;
//!
//! let scheduler: SharedScheduler = Arc::new(TrampolineScheduler::new());
//!
//! let sub = scheduled(vec![1, 2], scheduler.clone())
//!     .concat_with(vec![scheduled(vec![3], scheduler).boxed()])
//!     .subscribe_with(
//!         |v| println!("value {v}"),
//!         |err| eprintln!("failed: {err}"),
//!         || println!("done"),
//!     )?;
//!
//! sub.unsubscribe()?;
//! ```

pub use flow_core;
pub use flow_executor;
pub use flow_streaming;

/// Prelude for convenient imports.
pub mod prelude {
    pub use flow_core::*;
    pub use flow_executor::*;
    pub use flow_streaming::*;
}

//! Pluggable tick schedulers for stream drivers.
//!
//! This crate decides *when* a unit of work runs:
//! - `Scheduler` - The scheduling contract, with self-rescheduling via `Tick`
//! - `TrampolineScheduler` - Current-thread queue, bounded stack depth
//! - `TokioScheduler` - One runtime task per scheduled work item

mod runtime;
mod scheduler;
mod trampoline;

pub use runtime::*;
pub use scheduler::*;
pub use trampoline::*;

//! Scheduled sequence drivers and stream combinators.
//!
//! This crate turns data into sources that emit one value per tick:
//! - `ScheduledSequence` - Emits a finite indexed sequence
//! - `ScheduledPull` - Emits an asynchronous pull sequence (`Stream`)
//! - `Concat` - Chains sources, each starting after the previous completes
//! - `MapTo` - Replaces every value with a constant

mod concat;
mod map_to;
mod ops;
mod pull;
mod sequence;

pub use concat::*;
pub use map_to::*;
pub use ops::*;
pub use pull::*;
pub use sequence::*;

//! Friend activity change-detection pipeline
//!
//! - `detector`: pure snapshot diffing into activity events
//! - `populator`: expands a tracked user's friend list into queue items
//! - `worker`: bounded-concurrency batch processing of leased items

mod detector;
mod populator;
mod worker;

pub use detector::{NewActivity, diff};
pub use populator::populate;
pub use worker::{CycleReport, run_cycle};

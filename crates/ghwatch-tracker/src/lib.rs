//! The change-detection and checkpointing engine.
//!
//! [`Tracker`] holds the last-known run/job/step state, turns each new
//! snapshot into a minimal ordered list of [`Event`]s, hands them to a
//! [`Reporter`] and advances the checkpoint watermarks. [`scheduler`] drives
//! it on a fixed interval with cooperative shutdown.

pub mod catalog;
pub mod event;
pub mod fetch;
pub mod report;
pub mod scheduler;
pub mod state;
pub mod tracker;
pub mod watermark;

#[cfg(test)]
mod testing;

pub use catalog::Catalog;
pub use event::{Event, JobInfo, RunInfo, StepInfo};
pub use report::{CollectReporter, JsonReporter, Reporter, TextReporter};
pub use scheduler::{run_scheduler, PollCycle, SchedulerConfig, SchedulerState, SchedulerStats};
pub use state::TrackerState;
pub use tracker::{CycleError, CycleReport, Mode, Tracker, TrackerConfig};
pub use watermark::Watermarks;

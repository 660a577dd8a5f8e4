// src/state/mod.rs

//! Document-transfer jobs and their state machine.
//!
//! - [`model`] holds the pure transition table.
//! - [`job`] owns one job's mutable state and applies the table under a lock.
//! - [`event_file`] parses and formats event file names.
//! - [`factory`] builds jobs with shared collaborators for the poller.

pub mod event_file;
pub mod factory;
pub mod job;
pub mod model;
pub mod timeout;
pub mod transition;

/// Milliseconds since the Unix epoch, UTC.
pub type EpochMillis = i64;

pub use factory::JobFactory;
pub use job::{Job, JobSnapshot, JobTimeouts};
pub use model::{AckFlags, Event, State, TimeoutKind};
pub use timeout::Timeout;
pub use transition::Transition;

/// Current wall-clock time as [`EpochMillis`].
pub fn now_millis() -> EpochMillis {
    chrono::Utc::now().timestamp_millis()
}

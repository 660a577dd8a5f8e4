// src/state/transition.rs

use std::fmt;

use super::model::{Event, State};
use super::EpochMillis;

/// One observed state change of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: State,
    pub to: State,
    pub event: Event,
    /// When the event happened (epoch millis), not when it was observed.
    pub event_time: EpochMillis,
}

impl Transition {
    pub fn new(from: State, to: State, event: Event, event_time: EpochMillis) -> Self {
        Self {
            from,
            to,
            event,
            event_time,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} on {} @ {}",
            self.from, self.to, self.event, self.event_time
        )
    }
}

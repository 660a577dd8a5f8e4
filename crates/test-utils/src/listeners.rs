#![allow(dead_code)]

use std::sync::Mutex;

use docs_finalizer::errors::{FinalizerError, Result};
use docs_finalizer::notify::TransitionListener;
use docs_finalizer::state::{Event, Job, JobSnapshot, Transition};

/// One dispatched transition together with the job's status at dispatch time.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub job: JobSnapshot,
    pub transition: Transition,
}

/// Captures every transition it receives.
#[derive(Debug, Default)]
pub struct RecordingListener {
    seen: Mutex<Vec<Recorded>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.seen.lock().unwrap().clone()
    }

    pub fn transitions(&self) -> Vec<Transition> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.transition)
            .collect()
    }

    pub fn events_for(&self, correlation_id: &str) -> Vec<Event> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.job.correlation_id == correlation_id)
            .map(|r| r.transition.event)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap().clear();
    }
}

impl TransitionListener for RecordingListener {
    fn on_transition(&self, job: &Job, transition: &Transition) -> Result<()> {
        self.seen.lock().unwrap().push(Recorded {
            job: job.snapshot(),
            transition: *transition,
        });
        Ok(())
    }
}

/// Fails every call and counts the attempts.
#[derive(Debug, Default)]
pub struct FailingListener {
    attempts: Mutex<usize>,
}

impl FailingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

impl TransitionListener for FailingListener {
    fn on_transition(&self, job: &Job, transition: &Transition) -> Result<()> {
        *self.attempts.lock().unwrap() += 1;
        Err(FinalizerError::ListenerError {
            correlation_id: job.correlation_id().to_string(),
            message: format!("refusing {transition}"),
        })
    }
}

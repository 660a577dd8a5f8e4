// src/state/factory.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::fs::FileSystem;
use crate::notify::TransitionListener;

use super::job::{Job, JobTimeouts};

/// Creates jobs that share a file system, a listener and timeout thresholds.
#[derive(Clone)]
pub struct JobFactory {
    fs: Arc<dyn FileSystem>,
    listener: Arc<dyn TransitionListener>,
    timeouts: JobTimeouts,
}

impl fmt::Debug for JobFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobFactory")
            .field("fs", &self.fs)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl JobFactory {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        listener: Arc<dyn TransitionListener>,
        timeouts: JobTimeouts,
    ) -> Self {
        Self {
            fs,
            listener,
            timeouts,
        }
    }

    pub fn timeouts(&self) -> &JobTimeouts {
        &self.timeouts
    }

    pub fn create(&self, correlation_id: &str, root_folder: PathBuf) -> Job {
        Job::new(
            correlation_id,
            root_folder,
            Arc::clone(&self.fs),
            Arc::clone(&self.listener),
            self.timeouts,
        )
    }
}

// src/engine/poller.rs

//! Directory-scanning reconciliation of the in-progress folder.
//!
//! The poller keeps an in-memory cache of jobs keyed by correlation id plus,
//! per job, the names of the control and event files it has already applied.
//! None of this is persisted: after a restart every still-open job is rebuilt
//! from PARSING by replaying its whole `control/` and `events/` history, and
//! the idempotent dispatch layer is what keeps those replays from re-running
//! listeners.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::fs::{file_name_of, FileSystem};
use crate::state::job::{CONTROL_FOLDER, EVENTS_FOLDER};
use crate::state::{EpochMillis, Job, JobFactory};

/// Counters for one `poll` cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Jobs tracked after eviction.
    pub tracked: usize,
    /// Jobs created this cycle.
    pub created: usize,
    /// Jobs evicted because their directory disappeared.
    pub evicted: usize,
    /// Jobs whose scan or timeout check returned an error.
    pub failed: usize,
}

#[derive(Debug)]
struct TrackedJob {
    job: Arc<Job>,
    processed_control: HashSet<String>,
    processed_events: HashSet<String>,
}

impl TrackedJob {
    fn new(job: Job) -> Self {
        Self {
            job: Arc::new(job),
            processed_control: HashSet::new(),
            processed_events: HashSet::new(),
        }
    }
}

/// Scans the in-progress folder and feeds new files into jobs.
///
/// `poll` must not be called concurrently; the runtime serializes cycles.
#[derive(Debug)]
pub struct InProgressPoller {
    fs: Arc<dyn FileSystem>,
    in_progress_folder: PathBuf,
    factory: JobFactory,
    tracked: HashMap<String, TrackedJob>,
}

impl InProgressPoller {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        in_progress_folder: impl Into<PathBuf>,
        factory: JobFactory,
    ) -> Self {
        Self {
            fs,
            in_progress_folder: in_progress_folder.into(),
            factory,
            tracked: HashMap::new(),
        }
    }

    pub fn in_progress_folder(&self) -> &Path {
        &self.in_progress_folder
    }

    pub fn job(&self, correlation_id: &str) -> Option<Arc<Job>> {
        self.tracked
            .get(correlation_id)
            .map(|tracked| Arc::clone(&tracked.job))
    }

    /// Correlation ids currently tracked, sorted.
    pub fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tracked.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Run one reconciliation cycle.
    ///
    /// Per-job errors (listener failures) are logged and counted; they never
    /// abort the scan of other jobs.
    pub fn poll(&mut self, now: EpochMillis) -> PollReport {
        let mut report = PollReport::default();
        let job_dirs = self.list_job_dirs();
        let mut present: HashSet<String> = HashSet::with_capacity(job_dirs.len());

        for (correlation_id, root_folder) in job_dirs {
            present.insert(correlation_id.clone());

            let tracked = self
                .tracked
                .entry(correlation_id.clone())
                .or_insert_with(|| {
                    report.created += 1;
                    info!(correlation_id = %correlation_id, "tracking new job");
                    TrackedJob::new(self.factory.create(&correlation_id, root_folder))
                });

            if scan_job(self.fs.as_ref(), tracked) > 0 {
                report.failed += 1;
            }
        }

        let before = self.tracked.len();
        self.tracked.retain(|correlation_id, _| {
            let keep = present.contains(correlation_id);
            if !keep {
                debug!(correlation_id = %correlation_id, "job directory gone; evicting");
            }
            keep
        });
        report.evicted = before - self.tracked.len();

        for (correlation_id, tracked) in &self.tracked {
            if let Err(err) = tracked.job.process_timeouts(now) {
                report.failed += 1;
                error!(
                    correlation_id = %correlation_id,
                    error = %err,
                    "timeout processing failed"
                );
            }
        }

        report.tracked = self.tracked.len();
        debug!(?report, "poll cycle complete");
        report
    }

    /// Immediate subdirectories of the in-progress folder as
    /// `(correlation id, path)` pairs. Missing or unreadable folder yields none.
    fn list_job_dirs(&self) -> Vec<(String, PathBuf)> {
        let entries = match self.fs.read_dir(&self.in_progress_folder) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(
                    folder = ?self.in_progress_folder,
                    error = %err,
                    "in-progress folder not readable; no jobs this cycle"
                );
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .filter(|path| self.fs.is_dir(path))
            .filter_map(|path| {
                let name = file_name_of(&path)?.to_string();
                Some((name, path))
            })
            .collect()
    }
}

/// Apply new control files, then new event files in ascending name order.
///
/// A listener error is logged and the scan carries on with the next file, so
/// every event on disk is applied before the job's timeouts are checked.
/// Returns the number of files whose dispatch failed.
fn scan_job(fs: &dyn FileSystem, tracked: &mut TrackedJob) -> usize {
    let job = Arc::clone(&tracked.job);

    let control_folder = job.root_folder().join(CONTROL_FOLDER);
    for (name, path) in list_names(fs, &control_folder) {
        if !tracked.processed_control.insert(name.clone()) {
            continue;
        }
        if !fs.is_file(&path) {
            continue;
        }
        let first_line = read_first_line(fs, job.correlation_id(), &path);
        job.register_control_file(&name, first_line.as_deref());
    }

    let events_folder = job.root_folder().join(EVENTS_FOLDER);
    let mut events = list_names(fs, &events_folder);
    events.sort_unstable_by(|a, b| a.0.cmp(&b.0));

    let mut failures = 0;
    for (name, path) in events {
        if !tracked.processed_events.insert(name.clone()) {
            continue;
        }
        if !fs.is_file(&path) {
            continue;
        }
        if let Err(err) = job.register_event_file(&name) {
            failures += 1;
            error!(
                correlation_id = %job.correlation_id(),
                file = %name,
                error = %err,
                "listener failed for event file"
            );
        }
    }

    failures
}

fn list_names(fs: &dyn FileSystem, folder: &Path) -> Vec<(String, PathBuf)> {
    if !fs.is_dir(folder) {
        return Vec::new();
    }
    match fs.read_dir(folder) {
        Ok(entries) => entries
            .into_iter()
            .filter_map(|path| Some((file_name_of(&path)?.to_string(), path)))
            .collect(),
        Err(err) => {
            debug!(folder = ?folder, error = %err, "unable to list folder");
            Vec::new()
        }
    }
}

fn read_first_line(fs: &dyn FileSystem, correlation_id: &str, path: &Path) -> Option<String> {
    match fs.read_to_string(path) {
        Ok(contents) => Some(contents.lines().next().unwrap_or_default().to_string()),
        Err(err) => {
            warn!(
                correlation_id,
                file = ?path,
                error = %err,
                "unable to read control file"
            );
            None
        }
    }
}

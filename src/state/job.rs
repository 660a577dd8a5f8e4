// src/state/job.rs

//! Per-correlation-id state machine.
//!
//! All mutation goes through three entry points (`register_control_file`,
//! `register_event_file`, `process_timeouts`), each of which holds the job's
//! mutation lock from start to finish, including the synchronous listener
//! dispatch. Status fields live outside that lock (atomics and small
//! `RwLock`s written only while the mutation lock is held), so listeners and
//! other observers can read them while a mutation is in flight.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::notify::TransitionListener;

use super::event_file::{format_event_file_name, parse_event_file_name};
use super::model::{self, AckFlags, Effect, Event, State, TimeoutKind};
use super::timeout::Timeout;
use super::transition::Transition;
use super::EpochMillis;

pub const CONTROL_FOLDER: &str = "control";
pub const EVENTS_FOLDER: &str = "events";

pub const COMPLETED_FOLDER_FILE: &str = "completed-folder";
pub const ERROR_FOLDER_FILE: &str = "error-folder";
pub const WANTS_INF_ACK_FILE: &str = "wants-inf-ack";
pub const WANTS_BUS_ACK_FILE: &str = "wants-bus-ack";

/// Thresholds for the four job timeouts. A zero duration disables one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTimeouts {
    pub document_preparation: Duration,
    pub document_send: Duration,
    pub inf_response: Duration,
    pub bus_response: Duration,
}

impl Default for JobTimeouts {
    fn default() -> Self {
        Self {
            document_preparation: Duration::from_secs(5 * 60),
            document_send: Duration::from_secs(5 * 60),
            inf_response: Duration::from_secs(60 * 60),
            bus_response: Duration::from_secs(60 * 60),
        }
    }
}

/// The timeouts guarded by the job's mutation lock.
#[derive(Debug, Clone, Copy)]
struct Timeouts {
    preparation: Timeout,
    send: Timeout,
    inf_response: Timeout,
    bus_response: Timeout,
}

impl Timeouts {
    fn new(thresholds: &JobTimeouts) -> Self {
        Self {
            preparation: Timeout::new(thresholds.document_preparation),
            send: Timeout::new(thresholds.document_send),
            inf_response: Timeout::new(thresholds.inf_response),
            bus_response: Timeout::new(thresholds.bus_response),
        }
    }

    fn get(&self, kind: TimeoutKind) -> &Timeout {
        match kind {
            TimeoutKind::Preparation => &self.preparation,
            TimeoutKind::Send => &self.send,
            TimeoutKind::InfResponse => &self.inf_response,
            TimeoutKind::BusResponse => &self.bus_response,
        }
    }

    fn get_mut(&mut self, kind: TimeoutKind) -> &mut Timeout {
        match kind {
            TimeoutKind::Preparation => &mut self.preparation,
            TimeoutKind::Send => &mut self.send,
            TimeoutKind::InfResponse => &mut self.inf_response,
            TimeoutKind::BusResponse => &mut self.bus_response,
        }
    }

    fn cancel_all(&mut self) {
        for kind in TimeoutKind::ALL {
            self.get_mut(kind).cancel();
        }
    }
}

/// Point-in-time copy of a job's status fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub correlation_id: String,
    pub root_folder: PathBuf,
    pub state: State,
    pub completed_folder: String,
    pub error_folder: String,
    pub inf_ack_wanted: bool,
    pub bus_ack_wanted: bool,
}

/// One in-flight document transfer.
pub struct Job {
    correlation_id: String,
    root_folder: PathBuf,
    fs: Arc<dyn FileSystem>,
    listener: Arc<dyn TransitionListener>,

    timeouts: Mutex<Timeouts>,

    state: AtomicU8,
    inf_ack_wanted: AtomicBool,
    bus_ack_wanted: AtomicBool,
    completed_folder: RwLock<String>,
    error_folder: RwLock<String>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("correlation_id", &self.correlation_id)
            .field("root_folder", &self.root_folder)
            .field("state", &self.state())
            .field("inf_ack_wanted", &self.is_inf_ack_wanted())
            .field("bus_ack_wanted", &self.is_bus_ack_wanted())
            .finish_non_exhaustive()
    }
}

fn read_string(lock: &RwLock<String>) -> String {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write_string(lock: &RwLock<String>, value: String) {
    *lock.write().unwrap_or_else(PoisonError::into_inner) = value;
}

impl Job {
    pub fn new(
        correlation_id: impl Into<String>,
        root_folder: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        listener: Arc<dyn TransitionListener>,
        thresholds: JobTimeouts,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            root_folder: root_folder.into(),
            fs,
            listener,
            timeouts: Mutex::new(Timeouts::new(&thresholds)),
            state: AtomicU8::new(State::Parsing.to_u8()),
            inf_ack_wanted: AtomicBool::new(false),
            bus_ack_wanted: AtomicBool::new(false),
            completed_folder: RwLock::new(String::new()),
            error_folder: RwLock::new(String::new()),
        }
    }

    // Read accessors: never take the mutation lock.

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn control_folder(&self) -> PathBuf {
        self.root_folder.join(CONTROL_FOLDER)
    }

    pub fn events_folder(&self) -> PathBuf {
        self.root_folder.join(EVENTS_FOLDER)
    }

    pub fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(State::Parsing)
    }

    pub fn completed_folder(&self) -> String {
        read_string(&self.completed_folder)
    }

    pub fn error_folder(&self) -> String {
        read_string(&self.error_folder)
    }

    pub fn is_inf_ack_wanted(&self) -> bool {
        self.inf_ack_wanted.load(Ordering::Acquire)
    }

    pub fn is_bus_ack_wanted(&self) -> bool {
        self.bus_ack_wanted.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            correlation_id: self.correlation_id.clone(),
            root_folder: self.root_folder.clone(),
            state: self.state(),
            completed_folder: self.completed_folder(),
            error_folder: self.error_folder(),
            inf_ack_wanted: self.is_inf_ack_wanted(),
            bus_ack_wanted: self.is_bus_ack_wanted(),
        }
    }

    /// Copy of one timeout.
    ///
    /// Takes the mutation lock, so it must not be called from a listener.
    pub fn timeout(&self, kind: TimeoutKind) -> Timeout {
        *self.lock().get(kind)
    }

    /// Kinds of the timeouts currently running. Takes the mutation lock.
    pub fn running_timeouts(&self) -> Vec<TimeoutKind> {
        let timeouts = self.lock();
        TimeoutKind::ALL
            .into_iter()
            .filter(|kind| timeouts.get(*kind).is_started())
            .collect()
    }

    // Mutating entry points.

    /// Apply one file from the job's `control/` folder.
    ///
    /// `first_line` is the file's first line, or `None` if it could not be
    /// read, in which case a target folder keeps its previous value. Unknown
    /// names are ignored.
    pub fn register_control_file(&self, name: &str, first_line: Option<&str>) {
        let _guard = self.lock();

        match name {
            COMPLETED_FOLDER_FILE | ERROR_FOLDER_FILE => {
                let target = if name == COMPLETED_FOLDER_FILE {
                    &self.completed_folder
                } else {
                    &self.error_folder
                };
                match first_line {
                    Some(line) => write_string(target, line.trim().to_string()),
                    None => debug!(
                        correlation_id = %self.correlation_id,
                        file = name,
                        "control file unreadable; keeping previous value"
                    ),
                }
            }
            WANTS_INF_ACK_FILE => self.inf_ack_wanted.store(true, Ordering::Release),
            WANTS_BUS_ACK_FILE => self.bus_ack_wanted.store(true, Ordering::Release),
            _ => trace!(
                correlation_id = %self.correlation_id,
                file = name,
                "ignoring unknown control file"
            ),
        }
    }

    /// Apply one file from the job's `events/` folder.
    ///
    /// Malformed names, invalid timestamps and unknown suffixes are ignored.
    /// Listener errors are returned to the caller.
    pub fn register_event_file(&self, name: &str) -> Result<Option<Transition>> {
        let mut timeouts = self.lock();

        let parsed = match parse_event_file_name(name) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(
                    correlation_id = %self.correlation_id,
                    file = name,
                    error = %err,
                    "unable to register event file"
                );
                return Ok(None);
            }
        };

        let Some(event) = parsed.event() else {
            trace!(
                correlation_id = %self.correlation_id,
                file = name,
                "ignoring event file with unknown suffix"
            );
            return Ok(None);
        };

        self.apply_locked(&mut timeouts, event, parsed.event_time)
    }

    /// Apply `event` directly, as if read from an event file stamped
    /// `event_time`.
    pub fn apply(&self, event: Event, event_time: EpochMillis) -> Result<Option<Transition>> {
        let mut timeouts = self.lock();
        self.apply_locked(&mut timeouts, event, event_time)
    }

    /// Fire every timeout whose deadline is at or before `now`.
    ///
    /// Each crossing is persisted as a marker file in `events/` (best effort)
    /// before the timeout event is applied, so a replay after restart sees it
    /// as an ordinary event file.
    pub fn process_timeouts(&self, now: EpochMillis) -> Result<Vec<Transition>> {
        let mut timeouts = self.lock();
        let mut fired = Vec::new();

        for kind in TimeoutKind::ALL {
            let timeout = timeouts.get(kind);
            if !timeout.is_triggered(now) {
                continue;
            }

            let event_time = timeout.trigger();
            timeouts.get_mut(kind).cancel();

            let event = kind.event();
            self.persist_event_marker(event, event_time);

            if let Some(transition) = self.apply_locked(&mut timeouts, event, event_time)? {
                fired.push(transition);
            }
        }

        Ok(fired)
    }

    // Internals: callers hold the mutation lock.

    fn lock(&self) -> MutexGuard<'_, Timeouts> {
        self.timeouts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ack_flags(&self) -> AckFlags {
        AckFlags {
            inf: self.is_inf_ack_wanted(),
            bus: self.is_bus_ack_wanted(),
        }
    }

    fn apply_locked(
        &self,
        timeouts: &mut Timeouts,
        event: Event,
        event_time: EpochMillis,
    ) -> Result<Option<Transition>> {
        let from = self.state();

        let step = match model::next(from, event, self.ack_flags()) {
            Some(step) if step.to != from => step,
            _ => {
                trace!(
                    correlation_id = %self.correlation_id,
                    state = %from,
                    event = %event,
                    "event has no transition in current state"
                );
                return Ok(None);
            }
        };

        for effect in &step.effects {
            match *effect {
                Effect::Start(kind) => timeouts.get_mut(kind).start(event_time),
                Effect::Cancel(kind) => timeouts.get_mut(kind).cancel(),
            }
        }
        if step.to.is_terminal() {
            timeouts.cancel_all();
        }

        self.state.store(step.to.to_u8(), Ordering::Release);

        info!(
            correlation_id = %self.correlation_id,
            from = %from,
            to = %step.to,
            event = %event,
            event_time,
            "state transition"
        );

        let transition = Transition::new(from, step.to, event, event_time);
        self.listener.on_transition(self, &transition)?;

        Ok(Some(transition))
    }

    fn persist_event_marker(&self, event: Event, event_time: EpochMillis) {
        let Some(name) = format_event_file_name(event_time, event) else {
            warn!(
                correlation_id = %self.correlation_id,
                event = %event,
                event_time,
                "cannot name timeout marker for event time"
            );
            return;
        };

        let path = self.events_folder().join(&name);
        if let Err(err) = self.fs.write(&path, b"") {
            warn!(
                correlation_id = %self.correlation_id,
                file = %name,
                error = %err,
                "failed to persist timeout marker"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::notify::test_support::Recorder;

    const T0: EpochMillis = 1_672_574_400_000; // 2023-01-01T12:00:00Z

    fn thresholds() -> JobTimeouts {
        JobTimeouts {
            document_preparation: Duration::from_millis(1_000),
            document_send: Duration::from_millis(2_000),
            inf_response: Duration::from_millis(3_000),
            bus_response: Duration::from_millis(4_000),
        }
    }

    fn job_with(fs: Arc<MockFileSystem>, recorder: Arc<Recorder>) -> Job {
        Job::new("corr-1", "/in/corr-1", fs, recorder, thresholds())
    }

    fn job() -> (Job, Arc<Recorder>, Arc<MockFileSystem>) {
        let fs = Arc::new(MockFileSystem::new());
        let recorder = Arc::new(Recorder::default());
        (job_with(fs.clone(), recorder.clone()), recorder, fs)
    }

    /// Drive a fresh job to `Sending`.
    fn sending_job() -> (Job, Arc<Recorder>, Arc<MockFileSystem>) {
        let (job, recorder, fs) = job();
        job.apply(Event::DocumentParsed, T0).unwrap();
        job.apply(Event::DocumentPrepared, T0 + 10).unwrap();
        (job, recorder, fs)
    }

    #[test]
    fn new_job_starts_parsing_with_no_timeouts() {
        let (job, recorder, _) = job();
        assert_eq!(job.state(), State::Parsing);
        assert!(job.running_timeouts().is_empty());
        assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn control_files_set_targets_and_flags() {
        let (job, _, _) = job();
        job.register_control_file(COMPLETED_FOLDER_FILE, Some("  /done/corr-1  "));
        job.register_control_file(ERROR_FOLDER_FILE, Some("/error/corr-1"));
        job.register_control_file(WANTS_INF_ACK_FILE, None);
        job.register_control_file("something-else", Some("ignored"));

        let snapshot = job.snapshot();
        assert_eq!(snapshot.completed_folder, "/done/corr-1");
        assert_eq!(snapshot.error_folder, "/error/corr-1");
        assert!(snapshot.inf_ack_wanted);
        assert!(!snapshot.bus_ack_wanted);
    }

    #[test]
    fn unreadable_target_keeps_previous_value() {
        let (job, _, _) = job();
        job.register_control_file(COMPLETED_FOLDER_FILE, Some("/done/a"));
        job.register_control_file(COMPLETED_FOLDER_FILE, None);
        assert_eq!(job.completed_folder(), "/done/a");
    }

    #[test]
    fn document_parsed_starts_preparation_timeout_at_event_time() {
        let (job, recorder, _) = job();
        let t = job.apply(Event::DocumentParsed, T0).unwrap().unwrap();

        assert_eq!(t, Transition::new(State::Parsing, State::Preparing, Event::DocumentParsed, T0));
        assert_eq!(job.running_timeouts(), vec![TimeoutKind::Preparation]);
        assert_eq!(job.timeout(TimeoutKind::Preparation).start_time(), T0);
        assert_eq!(recorder.count(), 1);
    }

    #[test]
    fn invalid_event_for_state_is_a_no_op() {
        let (job, recorder, _) = job();
        assert!(job.apply(Event::DocumentSent, T0).unwrap().is_none());
        assert_eq!(job.state(), State::Parsing);
        assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn sent_with_inf_ack_waits_for_inf_only() {
        let (job, _, _) = sending_job();
        job.register_control_file(WANTS_INF_ACK_FILE, None);

        job.apply(Event::DocumentSent, T0 + 20).unwrap();

        assert_eq!(job.state(), State::WaitingInfResponse);
        assert_eq!(job.running_timeouts(), vec![TimeoutKind::InfResponse]);
    }

    #[test]
    fn sent_without_acks_succeeds_directly() {
        let (job, recorder, _) = sending_job();

        job.apply(Event::DocumentSent, T0 + 20).unwrap();

        assert_eq!(job.state(), State::Succeeded);
        assert!(job.running_timeouts().is_empty());
        assert_eq!(recorder.transitions().last().unwrap().event, Event::DocumentSent);
    }

    #[test]
    fn register_event_file_applies_named_event() {
        let (job, recorder, _) = sending_job();
        let before = recorder.count();

        let t = job
            .register_event_file("20230101-120000000-bus-message-sent")
            .unwrap()
            .unwrap();

        assert_eq!(t.from, State::Sending);
        assert_eq!(t.to, State::Succeeded);
        assert_eq!(t.event_time, T0);
        assert_eq!(recorder.count(), before + 1);
    }

    #[test]
    fn malformed_event_files_are_ignored() {
        let (job, recorder, _) = job();
        assert!(job.register_event_file("not-an-event").unwrap().is_none());
        assert!(job.register_event_file("20231341-120000000-document-parsed").unwrap().is_none());
        assert!(job.register_event_file("20230101-120000000-mystery").unwrap().is_none());
        assert_eq!(job.state(), State::Parsing);
        assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn timeout_fires_persists_marker_and_fails_job() {
        let (job, recorder, fs) = job();
        job.apply(Event::DocumentParsed, T0).unwrap();

        assert!(job.process_timeouts(T0 + 999).unwrap().is_empty());
        let fired = job.process_timeouts(T0 + 1_000).unwrap();

        assert_eq!(
            fired,
            vec![Transition::new(
                State::Preparing,
                State::Failed,
                Event::DocumentPreparationTimeout,
                T0 + 1_000
            )]
        );
        assert_eq!(job.state(), State::Failed);
        assert!(job.running_timeouts().is_empty());
        assert!(fs.is_file(Path::new(
            "/in/corr-1/events/20230101-120001000-document-preparation-timeout"
        )));
        assert_eq!(recorder.count(), 2);

        // Already cancelled: nothing fires again.
        assert!(job.process_timeouts(T0 + 100_000).unwrap().is_empty());
    }

    #[test]
    fn failure_in_dual_wait_cancels_both_response_timeouts() {
        let (job, _, _) = sending_job();
        job.register_control_file(WANTS_INF_ACK_FILE, None);
        job.register_control_file(WANTS_BUS_ACK_FILE, None);
        job.apply(Event::DocumentSent, T0 + 20).unwrap();
        assert_eq!(
            job.running_timeouts(),
            vec![TimeoutKind::InfResponse, TimeoutKind::BusResponse]
        );

        job.apply(Event::InfNackReceived, T0 + 30).unwrap();

        assert_eq!(job.state(), State::Failed);
        assert!(job.running_timeouts().is_empty());
    }

    #[test]
    fn terminal_job_absorbs_every_event() {
        let (job, recorder, _) = sending_job();
        job.apply(Event::DocumentSendFailed, T0 + 20).unwrap();
        let count = recorder.count();

        for event in Event::ALL {
            assert!(job.apply(event, T0 + 30).unwrap().is_none());
        }
        assert_eq!(job.state(), State::Failed);
        assert_eq!(recorder.count(), count);
        assert!(job.running_timeouts().is_empty());
    }

    #[test]
    fn listener_error_propagates_after_state_change() {
        let fs = Arc::new(MockFileSystem::new());
        let job = job_with(fs, Arc::new(Recorder::failing()));

        assert!(job.apply(Event::DocumentParsed, T0).is_err());
        assert_eq!(job.state(), State::Preparing);
    }

    #[test]
    fn listener_can_read_status_during_dispatch() {
        struct StateReader(Mutex<Option<State>>);
        impl TransitionListener for StateReader {
            fn on_transition(&self, job: &Job, _t: &Transition) -> Result<()> {
                *self.0.lock().unwrap() = Some(job.state());
                let _ = job.snapshot();
                Ok(())
            }
        }

        let reader = Arc::new(StateReader(Mutex::new(None)));
        let job = Job::new(
            "corr-1",
            "/in/corr-1",
            Arc::new(MockFileSystem::new()),
            reader.clone(),
            thresholds(),
        );
        job.apply(Event::DocumentParsed, T0).unwrap();

        assert_eq!(*reader.0.lock().unwrap(), Some(State::Preparing));
    }
}

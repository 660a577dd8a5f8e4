mod common;

use std::path::Path;
use std::sync::Arc;

use common::{init_tracing, poller, short_timeouts, T0};
use docs_finalizer::fs::mock::MockFileSystem;
use docs_finalizer::fs::FileSystem;
use docs_finalizer::notify::{NoopListener, RegistryBuilder};
use docs_finalizer::state::{Event, Job, State, TimeoutKind};
use docs_finalizer_test_utils::{FailingListener, InProgressTreeBuilder, RecordingListener};

#[test]
fn jobs_are_reconciled_independently() {
    init_tracing();
    let fs = Arc::new(MockFileSystem::new());
    InProgressTreeBuilder::new(fs.as_ref(), "/in", "job-a")
        .wants_inf_ack()
        .event(T0, Event::DocumentParsed)
        .event(T0 + 10, Event::DocumentPrepared)
        .event(T0 + 20, Event::DocumentSent);
    InProgressTreeBuilder::new(fs.as_ref(), "/in", "job-b")
        .event(T0, Event::DocumentParsed)
        .event(T0 + 10, Event::DocumentPreparationFailed);
    InProgressTreeBuilder::new(fs.as_ref(), "/in", "job-c");

    let recorder = Arc::new(RecordingListener::new());
    let mut poller = poller(fs.clone(), "/in", recorder.clone(), short_timeouts());

    let report = poller.poll(T0 + 100);

    assert_eq!(report.created, 3);
    assert_eq!(report.tracked, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(poller.job("job-a").unwrap().state(), State::WaitingInfResponse);
    assert_eq!(poller.job("job-b").unwrap().state(), State::Failed);
    assert_eq!(poller.job("job-c").unwrap().state(), State::Parsing);
    assert_eq!(
        recorder.events_for("job-b"),
        vec![Event::DocumentParsed, Event::DocumentPreparationFailed]
    );
}

#[test]
fn reversed_listing_still_applies_events_chronologically() {
    init_tracing();
    let fs = Arc::new(MockFileSystem::new());
    // Written newest first; the mock lists in insertion order.
    InProgressTreeBuilder::new(fs.as_ref(), "/in", "job-a")
        .event(T0 + 30, Event::BusAckReceived)
        .event(T0 + 20, Event::DocumentSent)
        .event(T0 + 10, Event::DocumentPrepared)
        .event(T0, Event::DocumentParsed)
        .wants_bus_ack();

    let recorder = Arc::new(RecordingListener::new());
    let mut poller = poller(fs.clone(), "/in", recorder.clone(), short_timeouts());
    poller.poll(T0 + 100);

    assert_eq!(
        recorder.events_for("job-a"),
        vec![
            Event::DocumentParsed,
            Event::DocumentPrepared,
            Event::DocumentSent,
            Event::BusAckReceived,
        ]
    );
    let times: Vec<_> = recorder.transitions().iter().map(|t| t.event_time).collect();
    assert_eq!(times, vec![T0, T0 + 10, T0 + 20, T0 + 30]);
    assert_eq!(poller.job("job-a").unwrap().state(), State::Succeeded);
}

#[test]
fn late_control_file_affects_only_later_events() {
    init_tracing();
    let fs = Arc::new(MockFileSystem::new());
    let tree = InProgressTreeBuilder::new(fs.as_ref(), "/in", "job-a")
        .event(T0, Event::DocumentParsed)
        .event(T0 + 10, Event::DocumentPrepared);
    let root = tree.root().to_path_buf();

    let recorder = Arc::new(RecordingListener::new());
    let mut poller = poller(fs.clone(), "/in", recorder.clone(), short_timeouts());
    poller.poll(T0 + 100);
    assert_eq!(poller.job("job-a").unwrap().state(), State::Sending);

    InProgressTreeBuilder::new(fs.as_ref(), "/in", "job-a")
        .wants_inf_ack()
        .event(T0 + 200, Event::DocumentSent);
    poller.poll(T0 + 300);

    let job = poller.job("job-a").unwrap();
    assert_eq!(job.root_folder(), root.as_path());
    assert_eq!(job.state(), State::WaitingInfResponse);
    assert_eq!(job.running_timeouts(), vec![TimeoutKind::InfResponse]);
}

#[test]
fn eviction_then_recreation_starts_a_fresh_job() {
    init_tracing();
    let fs = Arc::new(MockFileSystem::new());
    InProgressTreeBuilder::new(fs.as_ref(), "/in", "job-a")
        .event(T0, Event::DocumentParsed)
        .event(T0 + 10, Event::DocumentPrepared);

    let recorder = Arc::new(RecordingListener::new());
    let mut poller = poller(fs.clone(), "/in", recorder.clone(), short_timeouts());
    poller.poll(T0 + 100);
    let first = poller.job("job-a").unwrap();
    assert_eq!(first.state(), State::Sending);

    fs.remove("/in/job-a");
    let report = poller.poll(T0 + 200);
    assert_eq!(report.evicted, 1);
    assert_eq!(report.tracked, 0);

    fs.add_dir("/in/job-a");
    poller.poll(T0 + 300);
    let second = poller.job("job-a").unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.state(), State::Parsing);
    assert!(second.running_timeouts().is_empty());
}

#[test]
fn timeout_markers_are_replayed_after_restart() {
    init_tracing();
    let fs = Arc::new(MockFileSystem::new());
    InProgressTreeBuilder::new(fs.as_ref(), "/in", "job-a").event(T0, Event::DocumentParsed);

    let recorder = Arc::new(RecordingListener::new());
    let mut poller = poller(fs.clone(), "/in", recorder.clone(), short_timeouts());
    poller.poll(T0 + 500);
    poller.poll(T0 + 1_000);
    assert_eq!(poller.job("job-a").unwrap().state(), State::Failed);
    assert!(fs.is_file(Path::new(
        "/in/job-a/events/20230101-120001000-document-preparation-timeout"
    )));

    // A fresh poller sees the marker as an ordinary event file.
    let replayed = Arc::new(RecordingListener::new());
    let mut restarted = common::poller(fs.clone(), "/in", replayed.clone(), short_timeouts());
    restarted.poll(T0 + 1_100);

    assert_eq!(restarted.job("job-a").unwrap().state(), State::Failed);
    assert_eq!(
        replayed.events_for("job-a"),
        vec![Event::DocumentParsed, Event::DocumentPreparationTimeout]
    );
    assert_eq!(replayed.transitions()[1].event_time, T0 + 1_000);
}

#[test]
fn listener_failure_mid_scan_matches_a_restart_replay() {
    init_tracing();
    let fs = Arc::new(MockFileSystem::new());
    InProgressTreeBuilder::new(fs.as_ref(), "/in", "job-a")
        .event(T0, Event::DocumentParsed)
        .event(T0 + 10, Event::DocumentPrepared)
        .event(T0 + 20, Event::DocumentSent);

    let failing = Arc::new(FailingListener::new());
    let recorder = Arc::new(RecordingListener::new());
    let registry = RegistryBuilder::new()
        .on(State::Preparing, failing.clone())
        .on(State::Sending, recorder.clone())
        .on(State::Succeeded, recorder.clone())
        .on(State::Failed, recorder.clone())
        .build();
    let mut poller = poller(fs.clone(), "/in", Arc::new(registry), short_timeouts());

    // First cycle lands after the 1s preparation deadline of the parsed event.
    let report = poller.poll(T0 + 5_000);

    assert_eq!(report.failed, 1);
    assert_eq!(failing.attempts(), 1);
    assert_eq!(poller.job("job-a").unwrap().state(), State::Succeeded);
    assert_eq!(
        recorder.events_for("job-a"),
        vec![Event::DocumentPrepared, Event::DocumentSent]
    );
    assert!(!fs.is_file(Path::new(
        "/in/job-a/events/20230101-120001000-document-preparation-timeout"
    )));

    let replayed = Arc::new(RecordingListener::new());
    let mut restarted = common::poller(fs.clone(), "/in", replayed.clone(), short_timeouts());
    restarted.poll(T0 + 5_000);
    assert_eq!(restarted.job("job-a").unwrap().state(), State::Succeeded);
}

#[test]
fn unknown_and_malformed_files_are_skipped() {
    init_tracing();
    let fs = Arc::new(MockFileSystem::new());
    InProgressTreeBuilder::new(fs.as_ref(), "/in", "job-a")
        .control_file("notes.txt", "hello")
        .raw_event("README")
        .raw_event("20231399-120000000-document-parsed")
        .raw_event("20230101-120000000-document-teleported")
        .event(T0 + 5, Event::DocumentParsed);
    fs.add_dir("/in/job-a/events/nested-dir");

    let recorder = Arc::new(RecordingListener::new());
    let mut poller = poller(fs.clone(), "/in", recorder.clone(), short_timeouts());
    let report = poller.poll(T0 + 100);

    assert_eq!(report.failed, 0);
    assert_eq!(recorder.events_for("job-a"), vec![Event::DocumentParsed]);
}

#[test]
fn document_sent_from_sending_emits_exactly_one_transition() {
    init_tracing();
    let fs = Arc::new(MockFileSystem::new());
    let recorder = Arc::new(RecordingListener::new());
    let job = Job::new("job-a", "/in/job-a", fs.clone(), recorder.clone(), short_timeouts());
    job.apply(Event::DocumentParsed, T0 - 20).unwrap();
    job.apply(Event::DocumentPrepared, T0 - 10).unwrap();
    assert_eq!(job.state(), State::Sending);
    recorder.clear();

    job.register_event_file("20230101-120000000-bus-message-sent")
        .unwrap();

    assert_eq!(job.state(), State::Succeeded);
    let transitions = recorder.transitions();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].event, Event::DocumentSent);
    assert_eq!(transitions[0].event_time, T0);
}

#[test]
fn root_folder_missing_is_not_an_error() {
    init_tracing();
    let fs = Arc::new(MockFileSystem::new());
    let mut poller = poller(fs.clone(), "/does/not/exist", Arc::new(NoopListener), short_timeouts());

    let report = poller.poll(T0);

    assert_eq!(report.tracked, 0);
    assert!(!fs.exists(Path::new("/does/not/exist")));
}

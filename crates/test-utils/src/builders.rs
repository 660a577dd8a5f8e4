#![allow(dead_code)]

use std::path::{Path, PathBuf};

use docs_finalizer::fs::FileSystem;
use docs_finalizer::state::event_file::format_event_file_name;
use docs_finalizer::state::job::{
    COMPLETED_FOLDER_FILE, CONTROL_FOLDER, ERROR_FOLDER_FILE, EVENTS_FOLDER, WANTS_BUS_ACK_FILE,
    WANTS_INF_ACK_FILE,
};
use docs_finalizer::state::{EpochMillis, Event};

/// Lays out one job directory under an in-progress folder on any
/// [`FileSystem`].
///
/// ```ignore
/// InProgressTreeBuilder::new(&fs, "/in", "job-a")
///     .completed_folder("/done/job-a")
///     .wants_inf_ack()
///     .event(T0, Event::DocumentParsed);
/// ```
pub struct InProgressTreeBuilder<'a> {
    fs: &'a dyn FileSystem,
    root: PathBuf,
}

impl<'a> InProgressTreeBuilder<'a> {
    pub fn new(fs: &'a dyn FileSystem, in_progress: impl AsRef<Path>, correlation_id: &str) -> Self {
        let root = in_progress.as_ref().join(correlation_id);
        fs.create_dir_all(&root).expect("create job folder");
        Self { fs, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn control_file(self, name: &str, contents: &str) -> Self {
        let path = self.root.join(CONTROL_FOLDER).join(name);
        self.fs
            .write(&path, contents.as_bytes())
            .expect("write control file");
        self
    }

    pub fn completed_folder(self, target: impl AsRef<Path>) -> Self {
        let line = format!("{}\n", target.as_ref().display());
        self.control_file(COMPLETED_FOLDER_FILE, &line)
    }

    pub fn error_folder(self, target: impl AsRef<Path>) -> Self {
        let line = format!("{}\n", target.as_ref().display());
        self.control_file(ERROR_FOLDER_FILE, &line)
    }

    pub fn wants_inf_ack(self) -> Self {
        self.control_file(WANTS_INF_ACK_FILE, "")
    }

    pub fn wants_bus_ack(self) -> Self {
        self.control_file(WANTS_BUS_ACK_FILE, "")
    }

    /// Write an event marker named from `event_time` and `event`.
    pub fn event(self, event_time: EpochMillis, event: Event) -> Self {
        let name = format_event_file_name(event_time, event).expect("representable event time");
        self.raw_event(&name)
    }

    /// Write an arbitrary file into `events/`.
    pub fn raw_event(self, name: &str) -> Self {
        let path = self.root.join(EVENTS_FOLDER).join(name);
        self.fs.write(&path, b"").expect("write event file");
        self
    }
}

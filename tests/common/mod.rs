#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use docs_finalizer::engine::InProgressPoller;
use docs_finalizer::fs::FileSystem;
use docs_finalizer::notify::TransitionListener;
use docs_finalizer::state::{EpochMillis, JobFactory, JobTimeouts};

pub use docs_finalizer_test_utils::init_tracing;

/// 2023-01-01T12:00:00.000Z
pub const T0: EpochMillis = 1_672_574_400_000;

pub fn short_timeouts() -> JobTimeouts {
    JobTimeouts {
        document_preparation: Duration::from_secs(1),
        document_send: Duration::from_secs(2),
        inf_response: Duration::from_secs(3),
        bus_response: Duration::from_secs(4),
    }
}

pub fn poller(
    fs: Arc<dyn FileSystem>,
    in_progress: impl AsRef<Path>,
    listener: Arc<dyn TransitionListener>,
    timeouts: JobTimeouts,
) -> InProgressPoller {
    let factory = JobFactory::new(Arc::clone(&fs), listener, timeouts);
    InProgressPoller::new(fs, in_progress.as_ref(), factory)
}

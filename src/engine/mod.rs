// src/engine/mod.rs

//! Reconciliation engine for the in-progress folder.
//!
//! The synchronous scan lives in [`poller`]; the async shell that invokes it
//! on a period, one cycle at a time, is implemented in [`runtime`].

use crate::state::EpochMillis;

/// Runtime options for the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Stop after the first completed poll cycle (used for `--once`).
    pub exit_after_first_poll: bool,
}

/// Events flowing into the runtime from the ticker and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Run one poll cycle with the given clock reading.
    PollRequested { now: EpochMillis },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod poller;
pub mod runtime;

pub use poller::{InProgressPoller, PollReport};
pub use runtime::{spawn_ticker, Runtime};

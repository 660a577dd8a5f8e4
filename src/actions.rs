// src/actions.rs

//! Listeners that act on terminal transitions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::errors::{FinalizerError, Result};
use crate::fs::FileSystem;
use crate::notify::TransitionListener;
use crate::state::{Job, Transition};
use crate::types::ActionKind;

/// Which control-file target a [`MoveJobFolder`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTarget {
    Completed,
    Error,
}

impl MoveTarget {
    fn resolve(self, job: &Job) -> String {
        match self {
            MoveTarget::Completed => job.completed_folder(),
            MoveTarget::Error => job.error_folder(),
        }
    }

    fn control_file(self) -> &'static str {
        match self {
            MoveTarget::Completed => crate::state::job::COMPLETED_FOLDER_FILE,
            MoveTarget::Error => crate::state::job::ERROR_FOLDER_FILE,
        }
    }
}

/// Moves the job's root folder to the path named in its control files.
///
/// The target's parent directory is created first. An empty target or a
/// failed move is an error.
#[derive(Debug, Clone)]
pub struct MoveJobFolder {
    fs: Arc<dyn FileSystem>,
    target: MoveTarget,
}

impl MoveJobFolder {
    pub fn new(fs: Arc<dyn FileSystem>, target: MoveTarget) -> Self {
        Self { fs, target }
    }

    pub fn to_completed_folder(fs: Arc<dyn FileSystem>) -> Self {
        Self::new(fs, MoveTarget::Completed)
    }

    pub fn to_error_folder(fs: Arc<dyn FileSystem>) -> Self {
        Self::new(fs, MoveTarget::Error)
    }

    fn move_folder(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs
                .create_dir_all(parent)
                .with_context(|| format!("creating target parent {:?}", parent))?;
        }
        self.fs
            .rename(from, to)
            .with_context(|| format!("moving {:?} to {:?}", from, to))
    }
}

impl TransitionListener for MoveJobFolder {
    fn on_transition(&self, job: &Job, transition: &Transition) -> Result<()> {
        let target = self.target.resolve(job);
        if target.is_empty() {
            return Err(FinalizerError::ListenerError {
                correlation_id: job.correlation_id().to_string(),
                message: format!(
                    "no target folder (control/{} missing or empty)",
                    self.target.control_file()
                ),
            });
        }

        let target = PathBuf::from(target);
        self.move_folder(job.root_folder(), &target)?;

        info!(
            correlation_id = %job.correlation_id(),
            to = %transition.to,
            target = ?target,
            "moved job folder"
        );
        Ok(())
    }
}

/// Logs the transition and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransition;

impl TransitionListener for LogTransition {
    fn on_transition(&self, job: &Job, transition: &Transition) -> Result<()> {
        info!(
            correlation_id = %job.correlation_id(),
            transition = %transition,
            "job reached state"
        );
        Ok(())
    }
}

/// Build the listener for a configured action.
pub fn listener_for(kind: ActionKind, fs: &Arc<dyn FileSystem>) -> Arc<dyn TransitionListener> {
    match kind {
        ActionKind::MoveToCompletedFolder => {
            Arc::new(MoveJobFolder::to_completed_folder(Arc::clone(fs)))
        }
        ActionKind::MoveToErrorFolder => Arc::new(MoveJobFolder::to_error_folder(Arc::clone(fs))),
        ActionKind::Log => Arc::new(LogTransition),
    }
}

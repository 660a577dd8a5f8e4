// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::state::{JobTimeouts, State};
use crate::types::{ActionKind, IdempotentStorageMode};

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// in_progress_folder = "/var/spool/docs/in-progress"
/// poll_period = "5s"
/// idempotent_storage = "file"
///
/// [timeouts]
/// document_preparation = "5m"
/// inf_response = "0s"        # disabled
///
/// [[listener]]
/// to = "SUCCEEDED"
/// action = "move-to-completed-folder"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub timeouts: TimeoutsSection,

    /// `[[listener]]` entries. Empty means the default move actions.
    #[serde(default)]
    pub listener: Vec<ListenerConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    #[serde(default = "default_in_progress_folder")]
    pub in_progress_folder: String,

    /// Duration string, e.g. `"5s"`. Must not be zero.
    #[serde(default = "default_poll_period")]
    pub poll_period: String,

    #[serde(default)]
    pub idempotent_storage: IdempotentStorageMode,

    /// Used when `idempotent_storage = "file"`.
    #[serde(default = "default_idempotent_store_path")]
    pub idempotent_store_path: String,

    /// Most keys the file store keeps; the oldest are dropped beyond this.
    #[serde(default = "default_idempotent_store_capacity")]
    pub idempotent_store_capacity: usize,

    /// Wrap every listener so replayed transitions run it at most once.
    #[serde(default = "default_true")]
    pub idempotent: bool,
}

fn default_in_progress_folder() -> String {
    "in-progress".to_string()
}

fn default_poll_period() -> String {
    "5s".to_string()
}

fn default_idempotent_store_path() -> String {
    ".docs-finalizer/transitions".to_string()
}

fn default_idempotent_store_capacity() -> usize {
    crate::notify::DEFAULT_STORE_CAPACITY
}

fn default_true() -> bool {
    true
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            in_progress_folder: default_in_progress_folder(),
            poll_period: default_poll_period(),
            idempotent_storage: IdempotentStorageMode::default(),
            idempotent_store_path: default_idempotent_store_path(),
            idempotent_store_capacity: default_idempotent_store_capacity(),
            idempotent: default_true(),
        }
    }
}

/// `[timeouts]` section. `"0s"` disables a timeout.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsSection {
    #[serde(default = "five_minutes")]
    pub document_preparation: String,

    #[serde(default = "five_minutes")]
    pub document_send: String,

    #[serde(default = "one_hour")]
    pub inf_response: String,

    #[serde(default = "one_hour")]
    pub bus_response: String,
}

fn five_minutes() -> String {
    "5m".to_string()
}

fn one_hour() -> String {
    "1h".to_string()
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            document_preparation: five_minutes(),
            document_send: five_minutes(),
            inf_response: one_hour(),
            bus_response: one_hour(),
        }
    }
}

/// One `[[listener]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
    /// Destination state name, e.g. `"FAILED"`.
    pub to: String,
    /// Action name, e.g. `"move-to-error-folder"`.
    pub action: String,
}

/// A validated `[[listener]]` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerRule {
    pub to: State,
    pub action: ActionKind,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub in_progress_folder: PathBuf,
    pub poll_period: Duration,
    pub idempotent_storage: IdempotentStorageMode,
    pub idempotent_store_path: PathBuf,
    pub idempotent_store_capacity: usize,
    pub idempotent: bool,
    pub timeouts: JobTimeouts,
    pub listeners: Vec<ListenerRule>,
}

impl ConfigFile {
    /// Listeners used when the file configures none.
    pub fn default_listeners() -> Vec<ListenerRule> {
        vec![
            ListenerRule {
                to: State::Succeeded,
                action: ActionKind::MoveToCompletedFolder,
            },
            ListenerRule {
                to: State::Failed,
                action: ActionKind::MoveToErrorFolder,
            },
        ]
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            in_progress_folder: PathBuf::from(default_in_progress_folder()),
            poll_period: Duration::from_secs(5),
            idempotent_storage: IdempotentStorageMode::default(),
            idempotent_store_path: PathBuf::from(default_idempotent_store_path()),
            idempotent_store_capacity: default_idempotent_store_capacity(),
            idempotent: true,
            timeouts: JobTimeouts::default(),
            listeners: Self::default_listeners(),
        }
    }
}

// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Where the idempotent dispatch layer keeps the keys it has seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdempotentStorageMode {
    /// Keep keys in memory only (lost on restart).
    Memory,
    /// Append keys to `idempotent_store_path` so suppression survives restarts.
    #[default]
    File,
}

/// Listener action named in a `[[listener]]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    MoveToCompletedFolder,
    MoveToErrorFolder,
    Log,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::MoveToCompletedFolder => "move-to-completed-folder",
            ActionKind::MoveToErrorFolder => "move-to-error-folder",
            ActionKind::Log => "log",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "move-to-completed-folder" => Ok(ActionKind::MoveToCompletedFolder),
            "move-to-error-folder" => Ok(ActionKind::MoveToErrorFolder),
            "log" => Ok(ActionKind::Log),
            other => Err(format!(
                "unknown action: {other} (expected \"move-to-completed-folder\", \
                 \"move-to-error-folder\" or \"log\")"
            )),
        }
    }
}

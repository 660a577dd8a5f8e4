// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, ListenerConfig, ListenerRule, RawConfigFile};
use crate::errors::{FinalizerError, Result};
use crate::state::{JobTimeouts, State};
use crate::types::ActionKind;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FinalizerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let cfg = &raw.config;

        if cfg.in_progress_folder.trim().is_empty() {
            return Err(config_error("[config].in_progress_folder must not be empty"));
        }

        let poll_period = duration_field("[config].poll_period", &cfg.poll_period)?;
        if poll_period.is_zero() {
            return Err(config_error("[config].poll_period must be greater than 0"));
        }

        if cfg.idempotent_store_path.trim().is_empty() {
            return Err(config_error("[config].idempotent_store_path must not be empty"));
        }
        if cfg.idempotent_store_capacity == 0 {
            return Err(config_error(
                "[config].idempotent_store_capacity must be greater than 0",
            ));
        }

        let t = &raw.timeouts;
        let timeouts = JobTimeouts {
            document_preparation: duration_field(
                "[timeouts].document_preparation",
                &t.document_preparation,
            )?,
            document_send: duration_field("[timeouts].document_send", &t.document_send)?,
            inf_response: duration_field("[timeouts].inf_response", &t.inf_response)?,
            bus_response: duration_field("[timeouts].bus_response", &t.bus_response)?,
        };

        let listeners = if raw.listener.is_empty() {
            ConfigFile::default_listeners()
        } else {
            raw.listener
                .iter()
                .enumerate()
                .map(|(i, l)| listener_rule(i, l))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(ConfigFile {
            in_progress_folder: cfg.in_progress_folder.trim().into(),
            poll_period,
            idempotent_storage: cfg.idempotent_storage,
            idempotent_store_path: cfg.idempotent_store_path.trim().into(),
            idempotent_store_capacity: cfg.idempotent_store_capacity,
            idempotent: cfg.idempotent,
            timeouts,
            listeners,
        })
    }
}

fn config_error(message: impl Into<String>) -> FinalizerError {
    FinalizerError::ConfigError(message.into())
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| config_error(format!("{field}: {e}")))
}

fn listener_rule(index: usize, l: &ListenerConfig) -> Result<ListenerRule> {
    let to: State = l
        .to
        .parse()
        .map_err(|e| config_error(format!("[[listener]] #{}: to: {e}", index + 1)))?;
    let action: ActionKind = l
        .action
        .parse()
        .map_err(|e| config_error(format!("[[listener]] #{}: action: {e}", index + 1)))?;
    Ok(ListenerRule { to, action })
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"5m"`, `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' missing unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    };

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs(60),
        "h" => secs(60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

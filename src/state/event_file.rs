// src/state/event_file.rs

//! Naming convention for files in a job's `events/` folder:
//! `<yyyyMMdd>-<HHmmssSSS>-<suffix>`, timestamps in UTC.
//!
//! The fixed-width, zero-padded prefix makes lexical order equal to
//! chronological order.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use thiserror::Error;

use super::model::Event;
use super::EpochMillis;

static EVENT_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})(\d{2})(\d{2})-(\d{2})(\d{2})(\d{2})(\d{3})-(.+)$")
        .expect("event file name pattern is a valid regex")
});

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S%3f";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventFileNameError {
    #[error("name does not match <yyyyMMdd>-<HHmmssSSS>-<suffix>")]
    PatternMismatch,

    #[error("timestamp is not a valid date/time: {0}")]
    InvalidTimestamp(String),
}

/// A parsed event file name. The suffix may still be unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFileName<'a> {
    pub event_time: EpochMillis,
    pub suffix: &'a str,
}

impl EventFileName<'_> {
    pub fn event(&self) -> Option<Event> {
        Event::from_file_suffix(self.suffix)
    }
}

pub fn parse_event_file_name(name: &str) -> Result<EventFileName<'_>, EventFileNameError> {
    let caps = EVENT_FILE_NAME
        .captures(name)
        .ok_or(EventFileNameError::PatternMismatch)?;

    let field = |i: usize| -> u32 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(u32::MAX)
    };
    let year = i32::try_from(field(1)).unwrap_or(i32::MAX);

    let timestamp = NaiveDate::from_ymd_opt(year, field(2), field(3))
        .and_then(|date| date.and_hms_milli_opt(field(4), field(5), field(6), field(7)));

    let Some(timestamp) = timestamp else {
        let raw = name.get(..18).unwrap_or(name);
        return Err(EventFileNameError::InvalidTimestamp(raw.to_string()));
    };

    let suffix = caps.get(8).map(|m| m.as_str()).unwrap_or_default();

    Ok(EventFileName {
        event_time: timestamp.and_utc().timestamp_millis(),
        suffix,
    })
}

/// Build the file name a job uses to persist `event` at `event_time`.
///
/// Returns `None` for instants chrono cannot represent.
pub fn format_event_file_name(event_time: EpochMillis, event: Event) -> Option<String> {
    let at: DateTime<Utc> = DateTime::from_timestamp_millis(event_time)?;
    Some(format!(
        "{}-{}",
        at.format(TIMESTAMP_FORMAT),
        event.file_suffix()
    ))
}

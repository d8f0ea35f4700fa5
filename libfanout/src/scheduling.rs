//! Schedule parsing
//!
//! Turns operator input into a [`Schedule`]. Accepted forms, tried in order:
//! - Calendar dates: "2026-11-20" (date-only, eligible all that day)
//! - RFC 3339 instants: "2026-11-20T15:00:00Z", "2026-11-20T15:00:00+02:00"
//! - Date and time in UTC: "2026-11-20 15:00", "2026-11-20 15:00:30"
//! - Relative durations: "30m", "2h", "1d"
//! - Natural language: "tomorrow", "next monday 10am"

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::error::{FanoutError, Result};
use crate::types::Schedule;

/// Parse a schedule string relative to `now`
///
/// # Errors
///
/// Returns `FanoutError::Validation` if the input is empty or matches none of
/// the accepted forms.
pub fn parse_schedule(input: &str, now: DateTime<Utc>) -> Result<Schedule> {
    let input = input.trim();
    if input.is_empty() {
        return Err(FanoutError::Validation(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(Schedule::Date(date));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(Schedule::At(dt.with_timezone(&Utc)));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(Schedule::At(naive.and_utc()));
        }
    }

    if let Ok(duration) = parse_duration(input) {
        return Ok(Schedule::At(now + duration));
    }

    if let Ok(dt) = parse_natural_language(input, now) {
        return Ok(Schedule::At(dt));
    }

    Err(FanoutError::Validation(format!(
        "Could not parse schedule string: {}",
        input
    )))
}

/// Parse a duration string into a chrono::Duration
fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration = humantime::parse_duration(input)
        .map_err(|e| FanoutError::Validation(format!("Could not parse duration: {}", e)))?;

    Duration::from_std(std_duration)
        .map_err(|_| FanoutError::Validation("Duration out of range".to_string()))
}

/// Parse natural language time expression
fn parse_natural_language(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us)
        .map_err(|e| FanoutError::Validation(format!("Could not parse time: {}", e)))
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::error::AppError;

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC3339 timestamp back into a UTC instant.
pub fn parse_utc_rfc3339(value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Database(format!("Invalid timestamp '{value}': {e}")))
}

/// Parse Garmin's `startTimeGMT` format (`2024-01-15 10:30:00`, UTC with no
/// zone designator). Some endpoints return the `T` separator instead.
pub fn parse_garmin_time(value: &str) -> Result<DateTime<Utc>, AppError> {
    let normalized = value.replace(' ', "T");
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| AppError::GarminApi(format!("Invalid start time '{value}': {e}")))
}

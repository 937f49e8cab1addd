// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types.

/// Application error type covering both API boundaries and local state.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Credentials are missing or could not be refreshed. This is the one
    /// error that aborts a whole sync run; everything else is absorbed
    /// per-activity.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Garmin API error: {0}")]
    GarminApi(String),

    #[error("Strava API error: {0}")]
    StravaApi(String),

    #[error("FIT extraction failed: {0}")]
    FitExtraction(String),

    /// An activity with the same Garmin ID is already recorded in the
    /// ledger. Unreachable in normal operation thanks to the pre-check.
    #[error("Activity already recorded: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Marker for Strava 401 responses (token invalid or revoked).
    pub const STRAVA_TOKEN_ERROR: &'static str = "Strava token invalid or expired";

    /// Marker for Strava 429 responses.
    pub const STRAVA_RATE_LIMIT: &'static str = "Strava rate limit exceeded";

    /// Whether this error indicates an invalid/expired Strava token.
    pub fn is_strava_token_error(&self) -> bool {
        match self {
            AppError::StravaApi(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("token") || msg.contains("unauthorized") || msg.contains("invalid")
            }
            _ => false,
        }
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;

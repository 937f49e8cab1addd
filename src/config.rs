//! Application configuration loaded from environment variables and the
//! database config table.
//!
//! Process-level settings (paths, API credentials) come from the
//! environment once at startup. Per-run sync settings are re-read from the
//! database at the start of every cycle so that long-lived processes pick
//! up changes without a restart.

use std::env;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::db::{keys, Database};
use crate::error::{AppError, Result};

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite state database
    pub db_path: PathBuf,
    /// Directory holding the saved Garmin Connect session (garth layout)
    pub garmin_session_dir: PathBuf,
    /// Max activities requested from Garmin per run
    pub fetch_limit: u32,
    /// Activity type keys that are never transferred (default, DB can override)
    pub blocked_activity_types: Vec<String>,
    /// Gear assignment rules, `condition:gear_id[,...]`
    pub gear_rules: String,
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Strava OAuth client secret
    pub strava_client_secret: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./garsync.db"),
            garmin_session_dir: PathBuf::from("/tmp/garsync-test-session"),
            fetch_limit: 20,
            blocked_activity_types: vec!["strength_training".to_string()],
            gear_rules: String::new(),
            strava_client_id: "test_client_id".to_string(),
            strava_client_secret: "test_secret".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env file if present

        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());

        Self {
            db_path: env::var("GARSYNC_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./garsync.db")),
            garmin_session_dir: env::var("GARSYNC_GARMIN_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(home).join(".garth")),
            fetch_limit: env::var("GARSYNC_FETCH_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            blocked_activity_types: parse_blocked_types(
                &env::var("GARSYNC_BLOCKED_TYPES").unwrap_or_else(|_| "strength_training".into()),
            ),
            gear_rules: env::var("GARSYNC_GEAR_RULES").unwrap_or_default(),
            strava_client_id: env::var("STRAVA_CLIENT_ID").unwrap_or_default(),
            strava_client_secret: env::var("STRAVA_CLIENT_SECRET").unwrap_or_default(),
        }
    }

    /// Return a list of validation errors, empty if the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.strava_client_id.is_empty() {
            errors.push("STRAVA_CLIENT_ID environment variable is required".to_string());
        }
        if self.strava_client_secret.is_empty() {
            errors.push("STRAVA_CLIENT_SECRET environment variable is required".to_string());
        }
        if self.fetch_limit < 1 {
            errors.push("Fetch limit must be at least 1".to_string());
        }

        errors
    }
}

/// Split a comma-separated blocked-types value into trimmed entries.
fn parse_blocked_types(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Per-run sync settings, loaded fresh from the database at run start.
///
/// The sync horizon has write-once semantics: it is established as "now" on
/// the very first run and never overwritten afterwards, so a new install
/// never bulk-transfers its historical backlog.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Activity type keys that are never transferred
    pub blocked_types: Vec<String>,
    /// Max activities requested from Garmin this run
    pub fetch_limit: u32,
    /// Activities starting before this instant are never transferred
    pub sync_horizon: DateTime<Utc>,
}

impl SyncSettings {
    /// Load settings for one run, falling back to the environment config
    /// where the database has no override.
    pub async fn load(db: &Database, config: &Config, now: DateTime<Utc>) -> Result<Self> {
        let blocked_types = match db.get_config_value(keys::BLOCKED_TYPES).await? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| AppError::Config(format!("Invalid blocked_types in database: {e}")))?,
            None => config.blocked_activity_types.clone(),
        };

        let fetch_limit = match db.get_config_value(keys::FETCH_LIMIT).await? {
            Some(value) => value
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid fetch_limit in database: {e}")))?,
            None => config.fetch_limit,
        };

        let sync_horizon = db.init_sync_horizon(now).await?;

        Ok(Self {
            blocked_types,
            fetch_limit,
            sync_horizon,
        })
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite state store with typed operations.
//!
//! Provides high-level operations for:
//! - Activities (the idempotency ledger, unique per Garmin activity ID)
//! - Strava tokens (singleton OAuth credential)
//! - Sync runs (append-only run history)
//! - Config (key/value, including the write-once sync horizon)

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};

use crate::db::keys;
use crate::error::{AppError, Result};
use crate::models::{ActivityStatus, ProcessedActivity, StravaToken, SyncRun, SyncTotals};
use crate::time_utils::{format_utc_rfc3339, parse_utc_rfc3339};

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS activities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        garmin_activity_id TEXT UNIQUE NOT NULL,
        activity_type TEXT NOT NULL,
        activity_name TEXT NOT NULL DEFAULT '',
        garmin_start_time TEXT NOT NULL,
        status TEXT NOT NULL,
        strava_activity_id TEXT,
        skip_reason TEXT,
        error_message TEXT,
        processed_at TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_activities_status ON activities(status)",
    "CREATE INDEX IF NOT EXISTS idx_activities_processed_at ON activities(processed_at)",
    r"
    CREATE TABLE IF NOT EXISTS strava_tokens (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        access_token TEXT NOT NULL,
        refresh_token TEXT NOT NULL,
        expires_at INTEGER NOT NULL,
        athlete_id INTEGER,
        updated_at TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS sync_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        activities_checked INTEGER NOT NULL DEFAULT 0,
        activities_transferred INTEGER NOT NULL DEFAULT 0,
        activities_skipped INTEGER NOT NULL DEFAULT 0,
        activities_failed INTEGER NOT NULL DEFAULT 0,
        error TEXT
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS config (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    ",
];

/// SQLite database client.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (creating if needed) the database at `path` and ensure the
    /// schema exists.
    pub async fn connect(path: &Path) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path.display());
        Self::connect_url(&url).await
    }

    /// Open an in-memory database (testing). A single pooled connection is
    /// used so the database lives as long as the pool.
    pub async fn in_memory() -> Result<Self> {
        Self::connect_url("sqlite::memory:").await
    }

    async fn connect_url(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database: {e}")))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Create tables if they don't exist.
    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Database(format!("Migration failed: {e}")))?;
        }
        Ok(())
    }

    // ─── Activity Ledger Operations ──────────────────────────────

    /// Check whether an activity has already been processed.
    ///
    /// Any stored row counts, including `failed` ones: failed transfers are
    /// terminal until an operator clears them via `delete_failed_activity`.
    pub async fn activity_exists(&self, garmin_activity_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM activities WHERE garmin_activity_id = ?1")
            .bind(garmin_activity_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(row.is_some())
    }

    /// Insert one ledger row.
    ///
    /// Fails with [`AppError::Conflict`] if the Garmin activity ID is
    /// already recorded; the existing row is never touched.
    pub async fn insert_activity(&self, activity: &ProcessedActivity) -> Result<ProcessedActivity> {
        let result = sqlx::query(
            r"
            INSERT INTO activities (
                garmin_activity_id, activity_type, activity_name, garmin_start_time,
                status, strava_activity_id, skip_reason, error_message, processed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(&activity.garmin_activity_id)
        .bind(&activity.activity_type)
        .bind(&activity.activity_name)
        .bind(format_utc_rfc3339(activity.garmin_start_time))
        .bind(activity.status.as_str())
        .bind(&activity.strava_activity_id)
        .bind(&activity.skip_reason)
        .bind(&activity.error_message)
        .bind(format_utc_rfc3339(activity.processed_at))
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(activity.garmin_activity_id.clone())
            }
            _ => AppError::Database(format!("Failed to insert activity: {e}")),
        })?;

        let mut stored = activity.clone();
        stored.id = Some(result.last_insert_rowid());
        Ok(stored)
    }

    /// Get an activity by Garmin ID.
    pub async fn get_activity(&self, garmin_activity_id: &str) -> Result<Option<ProcessedActivity>> {
        let row = sqlx::query(
            r"
            SELECT id, garmin_activity_id, activity_type, activity_name, garmin_start_time,
                   status, strava_activity_id, skip_reason, error_message, processed_at
            FROM activities WHERE garmin_activity_id = ?1
            ",
        )
        .bind(garmin_activity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(|r| activity_from_row(&r)).transpose()
    }

    /// Get recent activities ordered by processed time, newest first.
    pub async fn recent_activities(&self, limit: u32) -> Result<Vec<ProcessedActivity>> {
        let rows = sqlx::query(
            r"
            SELECT id, garmin_activity_id, activity_type, activity_name, garmin_start_time,
                   status, strava_activity_id, skip_reason, error_message, processed_at
            FROM activities ORDER BY processed_at DESC, id DESC LIMIT ?1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.iter().map(activity_from_row).collect()
    }

    /// Get all failed activities for review.
    pub async fn failed_activities(&self) -> Result<Vec<ProcessedActivity>> {
        let rows = sqlx::query(
            r"
            SELECT id, garmin_activity_id, activity_type, activity_name, garmin_start_time,
                   status, strava_activity_id, skip_reason, error_message, processed_at
            FROM activities WHERE status = ?1 ORDER BY processed_at DESC
            ",
        )
        .bind(ActivityStatus::Failed.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.iter().map(activity_from_row).collect()
    }

    /// Delete a failed activity record so the next run re-attempts it.
    ///
    /// Returns `true` if a record was deleted. Only `failed` rows can be
    /// reopened this way.
    pub async fn delete_failed_activity(&self, garmin_activity_id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM activities WHERE garmin_activity_id = ?1 AND status = ?2")
                .bind(garmin_activity_id)
                .bind(ActivityStatus::Failed.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    // ─── Strava Token Operations ─────────────────────────────────

    /// Get the stored Strava OAuth token.
    pub async fn get_strava_token(&self) -> Result<Option<StravaToken>> {
        let row = sqlx::query(
            "SELECT access_token, refresh_token, expires_at, athlete_id, updated_at \
             FROM strava_tokens WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(|r| {
            Ok(StravaToken {
                access_token: r.get("access_token"),
                refresh_token: r.get("refresh_token"),
                expires_at: r.get("expires_at"),
                athlete_id: r.get("athlete_id"),
                updated_at: parse_utc_rfc3339(&r.get::<String, _>("updated_at"))?,
            })
        })
        .transpose()
    }

    /// Save or update the Strava OAuth token in a single upsert.
    pub async fn save_strava_token(&self, token: &StravaToken) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO strava_tokens (id, access_token, refresh_token, expires_at, athlete_id, updated_at)
            VALUES (1, ?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                athlete_id = excluded.athlete_id,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&token.access_token)
        .bind(&token.refresh_token)
        .bind(token.expires_at)
        .bind(token.athlete_id)
        .bind(format_utc_rfc3339(token.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Sync Run Operations ─────────────────────────────────────

    /// Create a new sync run record.
    pub async fn create_sync_run(&self, started_at: DateTime<Utc>) -> Result<SyncRun> {
        let result = sqlx::query("INSERT INTO sync_runs (started_at) VALUES (?1)")
            .bind(format_utc_rfc3339(started_at))
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut run = SyncRun::new(started_at);
        run.id = Some(result.last_insert_rowid());
        Ok(run)
    }

    /// Update a sync run with its final counters.
    pub async fn update_sync_run(&self, run: &SyncRun) -> Result<()> {
        let id = run
            .id
            .ok_or_else(|| AppError::Database("Cannot update a sync run without an id".into()))?;

        sqlx::query(
            r"
            UPDATE sync_runs SET
                completed_at = ?1,
                activities_checked = ?2,
                activities_transferred = ?3,
                activities_skipped = ?4,
                activities_failed = ?5,
                error = ?6
            WHERE id = ?7
            ",
        )
        .bind(run.completed_at.map(format_utc_rfc3339))
        .bind(i64::from(run.activities_checked))
        .bind(i64::from(run.activities_transferred))
        .bind(i64::from(run.activities_skipped))
        .bind(i64::from(run.activities_failed))
        .bind(&run.error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get the most recent sync run.
    pub async fn last_sync_run(&self) -> Result<Option<SyncRun>> {
        let row = sqlx::query(
            r"
            SELECT id, started_at, completed_at, activities_checked,
                   activities_transferred, activities_skipped, activities_failed, error
            FROM sync_runs ORDER BY id DESC LIMIT 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(|r| run_from_row(&r)).transpose()
    }

    // ─── Config Operations ───────────────────────────────────────

    /// Get a config value.
    pub async fn get_config_value(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM config WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(row.map(|r| r.get("value")))
    }

    /// Set a config value.
    ///
    /// The sync horizon is write-once; use [`Database::init_sync_horizon`]
    /// for it instead.
    pub async fn set_config_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO config (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Establish the sync horizon on first use and return the stored value.
    ///
    /// Insert-if-absent: once a horizon is persisted, later calls return it
    /// unchanged no matter what `now` is passed.
    pub async fn init_sync_horizon(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        sqlx::query("INSERT INTO config (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO NOTHING")
            .bind(keys::SYNC_HORIZON)
            .bind(format_utc_rfc3339(now))
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let stored = self
            .get_config_value(keys::SYNC_HORIZON)
            .await?
            .ok_or_else(|| AppError::Database("sync_horizon missing after init".into()))?;
        parse_utc_rfc3339(&stored)
    }

    // ─── Statistics ──────────────────────────────────────────────

    /// Overall per-status totals plus run count.
    pub async fn stats(&self) -> Result<SyncTotals> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM activities GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut totals = SyncTotals::default();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            let count = count as u64;
            match status.parse::<ActivityStatus>()? {
                ActivityStatus::Transferred => totals.transferred = count,
                ActivityStatus::Skipped => totals.skipped = count,
                ActivityStatus::Failed => totals.failed = count,
                ActivityStatus::Duplicate => totals.duplicate = count,
            }
        }

        let runs: i64 = sqlx::query("SELECT COUNT(*) AS count FROM sync_runs")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .get("count");
        totals.total_runs = runs as u64;

        let last_started: Option<String> =
            sqlx::query("SELECT started_at FROM sync_runs ORDER BY id DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?
                .map(|r| r.get("started_at"));
        totals.last_run_started_at = last_started.map(|v| parse_utc_rfc3339(&v)).transpose()?;

        Ok(totals)
    }
}

fn activity_from_row(row: &SqliteRow) -> Result<ProcessedActivity> {
    let status: String = row.get("status");
    Ok(ProcessedActivity {
        id: Some(row.get("id")),
        garmin_activity_id: row.get("garmin_activity_id"),
        activity_type: row.get("activity_type"),
        activity_name: row.get("activity_name"),
        garmin_start_time: parse_utc_rfc3339(&row.get::<String, _>("garmin_start_time"))?,
        status: status.parse()?,
        strava_activity_id: row.get("strava_activity_id"),
        skip_reason: row.get("skip_reason"),
        error_message: row.get("error_message"),
        processed_at: parse_utc_rfc3339(&row.get::<String, _>("processed_at"))?,
    })
}

fn run_from_row(row: &SqliteRow) -> Result<SyncRun> {
    Ok(SyncRun {
        id: Some(row.get("id")),
        started_at: parse_utc_rfc3339(&row.get::<String, _>("started_at"))?,
        completed_at: row
            .get::<Option<String>, _>("completed_at")
            .map(|v| parse_utc_rfc3339(&v))
            .transpose()?,
        activities_checked: row.get::<i64, _>("activities_checked") as u32,
        activities_transferred: row.get::<i64, _>("activities_transferred") as u32,
        activities_skipped: row.get::<i64, _>("activities_skipped") as u32,
        activities_failed: row.get::<i64, _>("activities_failed") as u32,
        error: row.get("error"),
    })
}

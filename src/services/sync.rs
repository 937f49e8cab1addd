// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Core sync engine orchestration.
//!
//! One run: verify the Garmin session, ensure a valid Strava token, load
//! per-run settings, fetch a batch of recent activities, and feed each one
//! through the processing pipeline. The run summary is persisted whether
//! the run succeeds or aborts.

use chrono::{Local, NaiveDateTime, Timelike, Utc};

use crate::config::{Config, SyncSettings};
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::SyncRun;
use crate::services::filter::ActivityFilter;
use crate::services::garmin::{ActivitySource, GarminClient};
use crate::services::processor::{process_activity, ProcessAction, ProcessResult};
use crate::services::strava::{FitUploader, StravaClient, TokenManager};

/// Result of a complete sync run.
#[derive(Debug)]
pub struct SyncOutcome {
    pub run: SyncRun,
    pub results: Vec<ProcessResult>,
}

/// Main engine orchestrating Garmin-to-Strava sync runs.
pub struct SyncEngine<S, U> {
    config: Config,
    db: Database,
    source: S,
    uploader: U,
    tokens: TokenManager,
}

impl SyncEngine<GarminClient, StravaClient> {
    /// Create a fully wired engine from application config.
    pub async fn create(config: Config) -> Result<Self> {
        let db = Database::connect(&config.db_path).await?;
        let source = GarminClient::new(config.garmin_session_dir.clone());
        let client = StravaClient::new(
            config.strava_client_id.clone(),
            config.strava_client_secret.clone(),
        );
        let tokens = TokenManager::new(db.clone(), client.clone());

        Ok(Self::new(config, db, source, client, tokens))
    }
}

impl<S, U> SyncEngine<S, U>
where
    S: ActivitySource + Sync,
    U: FitUploader + Sync,
{
    pub fn new(config: Config, db: Database, source: S, uploader: U, tokens: TokenManager) -> Self {
        Self {
            config,
            db,
            source,
            uploader,
            tokens,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Execute one complete sync run.
    ///
    /// A run-level failure (authentication, fetch) is recorded in the
    /// returned summary rather than propagated; the next cycle simply tries
    /// again. Only ledger-infrastructure failures surface as `Err`.
    pub async fn run_once(&self) -> Result<SyncOutcome> {
        let mut run = self.db.create_sync_run(Utc::now()).await?;
        let mut results = Vec::new();

        if let Err(e) = self.run_cycle(&mut run, &mut results).await {
            match &e {
                AppError::Database(_) => return Err(e),
                AppError::Authentication(msg) => {
                    tracing::error!(error = %msg, "Auth error during sync")
                }
                other => tracing::error!(error = %other, "Sync run failed"),
            }
            run.error = Some(e.to_string());
        } else {
            tracing::info!(
                checked = run.activities_checked,
                transferred = run.activities_transferred,
                skipped = run.activities_skipped,
                failed = run.activities_failed,
                "Sync run complete"
            );
        }

        run.complete(Utc::now());
        self.db.update_sync_run(&run).await?;

        Ok(SyncOutcome { run, results })
    }

    async fn run_cycle(
        &self,
        run: &mut SyncRun,
        results: &mut Vec<ProcessResult>,
    ) -> Result<()> {
        tracing::info!("Starting sync run");

        // Both sessions must be usable before any transfer work starts.
        self.source.ensure_session().await?;
        let token = self.tokens.ensure_valid_token().await?;

        // Settings are re-read every run so a long-lived process picks up
        // filter changes; the horizon is established once and kept.
        let settings = SyncSettings::load(&self.db, &self.config, Utc::now()).await?;
        let filter = ActivityFilter::new(&settings.blocked_types);

        let activities = self
            .source
            .recent_activities(settings.fetch_limit)
            .await?;
        run.activities_checked = activities.len() as u32;
        tracing::info!(count = activities.len(), "Fetched activities from Garmin");

        // Sequential on purpose: the ledger check and the Strava upload
        // must be serialized against the same account.
        for garmin_activity in &activities {
            let result = process_activity(
                garmin_activity,
                &self.db,
                &self.source,
                &self.uploader,
                &token.access_token,
                &filter,
                settings.sync_horizon,
            )
            .await?;

            match result.action {
                ProcessAction::Transferred | ProcessAction::Duplicate => {
                    run.activities_transferred += 1
                }
                ProcessAction::Skipped => run.activities_skipped += 1,
                ProcessAction::Failed => run.activities_failed += 1,
                ProcessAction::Exists => {}
            }
            results.push(result);
        }

        Ok(())
    }

    /// Run continuously, syncing at :00, :15, :30 and :45.
    pub async fn run_forever(&self) -> Result<()> {
        loop {
            let outcome = self.run_once().await?;
            if let Some(error) = &outcome.run.error {
                tracing::error!(error = %error, "Run failed, retrying next cycle");
            }

            let now = Local::now().naive_local();
            let next = next_quarter_hour(now);
            let sleep_secs = (next - now).num_seconds().max(1) as u64;
            tracing::info!(next = %next.format("%H:%M"), "Next sync scheduled");
            tokio::time::sleep(std::time::Duration::from_secs(sleep_secs)).await;
        }
    }
}

/// The next :00, :15, :30 or :45 mark after `now`.
pub fn next_quarter_hour(now: NaiveDateTime) -> NaiveDateTime {
    let truncated = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);

    let next_minute = (now.minute() / 15 + 1) * 15;
    if next_minute >= 60 {
        truncated.with_minute(0).unwrap_or(truncated) + chrono::Duration::hours(1)
    } else {
        truncated.with_minute(next_minute).unwrap_or(truncated)
    }
}

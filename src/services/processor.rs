// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Single activity processing pipeline.
//!
//! The per-activity state machine:
//! 1. Ledger check - already processed activities short-circuit
//! 2. Filter check - blocked types are recorded as skipped
//! 3. Horizon check - activities before the sync horizon are skipped
//! 4. FIT download - failures are recorded as failed
//! 5. Strava upload - duplicates are success, timeouts and rejections are
//!    recorded as failed with distinguishing detail
//!
//! Every pass except the ledger short-circuit writes exactly one ledger row
//! before returning; an activity is never left unrecorded.

use chrono::{DateTime, Utc};

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{GarminActivity, ProcessedActivity, SKIP_BEFORE_SYNC_HORIZON};
use crate::services::filter::ActivityFilter;
use crate::services::garmin::ActivitySource;
use crate::services::strava::{FitUploader, UploadError};

/// What happened to a single activity this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessAction {
    /// Already in the ledger; nothing written
    Exists,
    Skipped,
    Transferred,
    /// Strava already had the content; counted as a transfer
    Duplicate,
    Failed,
}

/// Result of processing a single activity.
#[derive(Debug)]
pub struct ProcessResult {
    pub activity: ProcessedActivity,
    pub action: ProcessAction,
}

/// Run one Garmin activity through the sync pipeline.
///
/// Per-activity failures are absorbed into durable `failed` rows; only
/// ledger-infrastructure errors propagate to the caller.
pub async fn process_activity<S, U>(
    garmin_activity: &GarminActivity,
    db: &Database,
    source: &S,
    uploader: &U,
    access_token: &str,
    filter: &ActivityFilter,
    sync_horizon: DateTime<Utc>,
) -> Result<ProcessResult>
where
    S: ActivitySource + Sync,
    U: FitUploader + Sync,
{
    let activity_id = garmin_activity.activity_id.as_str();
    let activity_type = garmin_activity.activity_type.as_str();

    // Check if already processed (idempotency)
    if db.activity_exists(activity_id).await? {
        tracing::debug!(activity_id, "Activity already processed, skipping");
        let existing = db.get_activity(activity_id).await?.ok_or_else(|| {
            AppError::Database(format!("Activity {activity_id} vanished from ledger"))
        })?;
        return Ok(ProcessResult {
            activity: existing,
            action: ProcessAction::Exists,
        });
    }

    // Check filter
    if let Some(reason) = filter.block_reason(activity_type) {
        tracing::info!(activity_id, activity_type, reason = %reason, "Skipped: blocked type");
        let row = ProcessedActivity::skipped(garmin_activity, reason, Utc::now());
        return Ok(ProcessResult {
            activity: record(db, row).await?,
            action: ProcessAction::Skipped,
        });
    }

    // Check sync horizon - historical backlog is never bulk-transferred
    if garmin_activity.start_time < sync_horizon {
        tracing::info!(
            activity_id,
            start_time = %garmin_activity.start_time,
            "Skipped: before sync horizon"
        );
        let row = ProcessedActivity::skipped(
            garmin_activity,
            SKIP_BEFORE_SYNC_HORIZON.to_string(),
            Utc::now(),
        );
        return Ok(ProcessResult {
            activity: record(db, row).await?,
            action: ProcessAction::Skipped,
        });
    }

    // Download FIT file
    let fit_bytes = match source.download_fit(activity_id).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(activity_id, error = %e, "FIT download failed");
            let row = ProcessedActivity::failed(garmin_activity, e.to_string(), Utc::now());
            return Ok(ProcessResult {
                activity: record(db, row).await?,
                action: ProcessAction::Failed,
            });
        }
    };

    // Upload to Strava
    let external_id = format!("garmin_{activity_id}");
    let name = (!garmin_activity.activity_name.is_empty())
        .then_some(garmin_activity.activity_name.as_str());

    match uploader
        .upload_fit(access_token, &fit_bytes, &external_id, name)
        .await
    {
        Ok(strava_id) => {
            tracing::info!(
                activity_id,
                activity_type,
                strava_id = %strava_id,
                "Transferred to Strava"
            );
            let row = ProcessedActivity::transferred(garmin_activity, strava_id, Utc::now());
            Ok(ProcessResult {
                activity: record(db, row).await?,
                action: ProcessAction::Transferred,
            })
        }
        Err(UploadError::Duplicate { existing_id }) => {
            tracing::info!(activity_id, ?existing_id, "Duplicate on Strava");
            let row = ProcessedActivity::duplicate(garmin_activity, existing_id, Utc::now());
            Ok(ProcessResult {
                activity: record(db, row).await?,
                action: ProcessAction::Duplicate,
            })
        }
        Err(e) => {
            tracing::error!(activity_id, error = %e, "Upload failed");
            let row = ProcessedActivity::failed(garmin_activity, e.to_string(), Utc::now());
            Ok(ProcessResult {
                activity: record(db, row).await?,
                action: ProcessAction::Failed,
            })
        }
    }
}

/// Persist one ledger row, tolerating a lost race with the unique key.
///
/// The pre-check makes a conflict unreachable in normal operation; if one
/// happens anyway the attempted row is discarded and the stored one wins.
async fn record(db: &Database, activity: ProcessedActivity) -> Result<ProcessedActivity> {
    match db.insert_activity(&activity).await {
        Ok(stored) => Ok(stored),
        Err(AppError::Conflict(id)) => {
            tracing::warn!(
                activity_id = %id,
                "Ledger already has this activity; discarding duplicate write"
            );
            db.get_activity(&id).await?.ok_or_else(|| {
                AppError::Database(format!("Activity {id} conflicted but is not stored"))
            })
        }
        Err(e) => Err(e),
    }
}

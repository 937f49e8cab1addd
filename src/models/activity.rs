// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Activity models: the fetched Garmin snapshot and the processed ledger row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Skip reason recorded for activities that started before the sync horizon.
pub const SKIP_BEFORE_SYNC_HORIZON: &str = "before_sync_horizon";

/// Terminal status of a processed activity in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Transferred,
    Skipped,
    Failed,
    Duplicate,
}

impl ActivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityStatus::Transferred => "transferred",
            ActivityStatus::Skipped => "skipped",
            ActivityStatus::Failed => "failed",
            ActivityStatus::Duplicate => "duplicate",
        }
    }
}

impl std::str::FromStr for ActivityStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "transferred" => Ok(ActivityStatus::Transferred),
            "skipped" => Ok(ActivityStatus::Skipped),
            "failed" => Ok(ActivityStatus::Failed),
            "duplicate" => Ok(ActivityStatus::Duplicate),
            other => Err(AppError::Database(format!(
                "Unknown activity status '{other}'"
            ))),
        }
    }
}

/// Snapshot of one activity as reported by Garmin Connect.
///
/// Produced fresh on every fetch and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarminActivity {
    /// Garmin activity ID (opaque, unique)
    pub activity_id: String,
    /// Garmin activity typeKey (e.g. "running", "strength_training")
    pub activity_type: String,
    /// Activity name/title
    pub activity_name: String,
    /// Start time (UTC)
    pub start_time: DateTime<Utc>,
    /// Duration in seconds, if reported
    pub duration_seconds: Option<f64>,
    /// Distance in meters, if reported
    pub distance_meters: Option<f64>,
}

/// Durable ledger record of a processed Garmin activity.
///
/// Exactly one row exists per Garmin activity ID; the database enforces
/// uniqueness, which is what makes repeated runs safe to re-invoke on
/// overlapping batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedActivity {
    /// Database row ID (assigned on insert)
    pub id: Option<i64>,
    /// Garmin activity ID (unique key)
    pub garmin_activity_id: String,
    /// Garmin activity typeKey
    pub activity_type: String,
    /// Activity name/title
    pub activity_name: String,
    /// Activity start time as reported by Garmin (UTC)
    pub garmin_start_time: DateTime<Utc>,
    /// Terminal disposition
    pub status: ActivityStatus,
    /// Strava activity ID, present for `transferred` and (when the
    /// destination reported it) `duplicate`
    pub strava_activity_id: Option<String>,
    /// Why the activity was skipped (`blocked_type:<type>` or
    /// `before_sync_horizon`)
    pub skip_reason: Option<String>,
    /// Error detail, present only for `failed`
    pub error_message: Option<String>,
    /// When the disposition was decided
    pub processed_at: DateTime<Utc>,
}

impl ProcessedActivity {
    fn base(garmin: &GarminActivity, status: ActivityStatus, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            garmin_activity_id: garmin.activity_id.clone(),
            activity_type: garmin.activity_type.clone(),
            activity_name: garmin.activity_name.clone(),
            garmin_start_time: garmin.start_time,
            status,
            strava_activity_id: None,
            skip_reason: None,
            error_message: None,
            processed_at: now,
        }
    }

    /// Row for a successfully transferred activity.
    pub fn transferred(garmin: &GarminActivity, strava_id: String, now: DateTime<Utc>) -> Self {
        Self {
            strava_activity_id: Some(strava_id),
            ..Self::base(garmin, ActivityStatus::Transferred, now)
        }
    }

    /// Row for an activity skipped by filter or horizon.
    pub fn skipped(garmin: &GarminActivity, reason: String, now: DateTime<Utc>) -> Self {
        Self {
            skip_reason: Some(reason),
            ..Self::base(garmin, ActivityStatus::Skipped, now)
        }
    }

    /// Row for an activity Strava already has.
    pub fn duplicate(
        garmin: &GarminActivity,
        strava_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            strava_activity_id: strava_id,
            ..Self::base(garmin, ActivityStatus::Duplicate, now)
        }
    }

    /// Row for a failed download or upload.
    pub fn failed(garmin: &GarminActivity, error: String, now: DateTime<Utc>) -> Self {
        Self {
            error_message: Some(error),
            ..Self::base(garmin, ActivityStatus::Failed, now)
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test helpers: in-memory database and mock collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use garsync::db::Database;
use garsync::error::AppError;
use garsync::models::{GarminActivity, StravaToken};
use garsync::services::{ActivitySource, FitUploader, UploadError};

/// Create an in-memory test database.
#[allow(dead_code)]
pub async fn test_db() -> Database {
    Database::in_memory().await.expect("in-memory database")
}

/// A fixed instant well in the past, used as an established sync horizon.
#[allow(dead_code)]
pub fn old_horizon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Build a Garmin activity snapshot starting at the given instant.
#[allow(dead_code)]
pub fn garmin_activity(id: &str, activity_type: &str, start_time: DateTime<Utc>) -> GarminActivity {
    GarminActivity {
        activity_id: id.to_string(),
        activity_type: activity_type.to_string(),
        activity_name: format!("Activity {id}"),
        start_time,
        duration_seconds: Some(1800.0),
        distance_meters: Some(5000.0),
    }
}

/// Store a token that will not need refreshing during the test.
#[allow(dead_code)]
pub async fn seed_valid_token(db: &Database) {
    let token = StravaToken {
        access_token: "test_access".to_string(),
        refresh_token: "test_refresh".to_string(),
        expires_at: Utc::now().timestamp() + 3600,
        athlete_id: Some(42),
        updated_at: Utc::now(),
    };
    db.save_strava_token(&token).await.expect("seed token");
}

/// Mock Garmin source backed by in-memory data.
#[allow(dead_code)]
pub struct MockSource {
    pub activities: Vec<GarminActivity>,
    /// FIT payload per activity ID; missing entries fail the download.
    pub payloads: HashMap<String, Vec<u8>>,
    pub session_valid: bool,
    pub fail_fetch: bool,
}

impl Default for MockSource {
    fn default() -> Self {
        Self {
            activities: Vec::new(),
            payloads: HashMap::new(),
            session_valid: true,
            fail_fetch: false,
        }
    }
}

impl MockSource {
    #[allow(dead_code)]
    pub fn with_activities(activities: Vec<GarminActivity>) -> Self {
        let payloads = activities
            .iter()
            .map(|a| (a.activity_id.clone(), b"fit-data".to_vec()))
            .collect();
        Self {
            activities,
            payloads,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ActivitySource for MockSource {
    async fn ensure_session(&self) -> Result<(), AppError> {
        if self.session_valid {
            Ok(())
        } else {
            Err(AppError::Authentication("Garmin session invalid".to_string()))
        }
    }

    async fn recent_activities(&self, limit: u32) -> Result<Vec<GarminActivity>, AppError> {
        if self.fail_fetch {
            return Err(AppError::GarminApi("activity list unavailable".to_string()));
        }
        Ok(self
            .activities
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn download_fit(&self, activity_id: &str) -> Result<Vec<u8>, AppError> {
        self.payloads.get(activity_id).cloned().ok_or_else(|| {
            AppError::FitExtraction(format!("No FIT payload for activity {activity_id}"))
        })
    }
}

/// How the mock uploader responds to a given external ID.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum UploadBehavior {
    Succeed,
    Duplicate(Option<String>),
    Timeout,
    Processing(String),
}

/// Mock Strava uploader recording every attempt.
#[allow(dead_code)]
pub struct MockUploader {
    /// Per-external-id behavior; anything unlisted succeeds.
    pub behaviors: HashMap<String, UploadBehavior>,
    pub uploads: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl Default for MockUploader {
    fn default() -> Self {
        Self {
            behaviors: HashMap::new(),
            uploads: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(9_000_000_001),
        }
    }
}

impl MockUploader {
    #[allow(dead_code)]
    pub fn with_behavior(external_id: &str, behavior: UploadBehavior) -> Self {
        let mut uploader = Self::default();
        uploader
            .behaviors
            .insert(external_id.to_string(), behavior);
        uploader
    }

    #[allow(dead_code)]
    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl FitUploader for MockUploader {
    async fn upload_fit(
        &self,
        _access_token: &str,
        _fit: &[u8],
        external_id: &str,
        _name: Option<&str>,
    ) -> Result<String, UploadError> {
        self.uploads.lock().unwrap().push(external_id.to_string());

        match self.behaviors.get(external_id) {
            None | Some(UploadBehavior::Succeed) => {
                Ok(self.next_id.fetch_add(1, Ordering::SeqCst).to_string())
            }
            Some(UploadBehavior::Duplicate(existing_id)) => Err(UploadError::Duplicate {
                existing_id: existing_id.clone(),
            }),
            Some(UploadBehavior::Timeout) => Err(UploadError::Timeout(120)),
            Some(UploadBehavior::Processing(msg)) => Err(UploadError::Processing(msg.clone())),
        }
    }
}

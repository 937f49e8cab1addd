// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin Connect client for fetching activities and FIT files.
//!
//! Handles:
//! - Resuming a previously saved Connect session (garth token layout)
//! - Activity listing
//! - FIT download and extraction from the ZIP container
//!
//! Interactive login is deliberately not implemented; a missing or invalid
//! session surfaces as an authentication failure telling the operator to
//! re-authenticate externally.

use std::io::{Cursor, Read};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::GarminActivity;
use crate::time_utils::parse_garmin_time;

/// File inside the session directory holding the Connect OAuth token.
const SESSION_TOKEN_FILE: &str = "oauth2_token.json";

/// Source-side collaborator seam consumed by the sync pipeline.
#[async_trait]
pub trait ActivitySource {
    /// Verify the saved session is usable, failing with
    /// [`AppError::Authentication`] otherwise.
    async fn ensure_session(&self) -> Result<(), AppError>;

    /// Fetch up to `limit` recent activities, newest first.
    async fn recent_activities(&self, limit: u32) -> Result<Vec<GarminActivity>, AppError>;

    /// Download and extract the FIT recording for one activity.
    async fn download_fit(&self, activity_id: &str) -> Result<Vec<u8>, AppError>;
}

/// Garmin Connect API client.
#[derive(Clone)]
pub struct GarminClient {
    http: reqwest::Client,
    base_url: String,
    session_dir: PathBuf,
}

impl GarminClient {
    /// Create a client reading its session from `session_dir`.
    pub fn new(session_dir: PathBuf) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://connectapi.garmin.com".to_string(),
            session_dir,
        }
    }

    /// Override the API base URL (testing).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Read the saved session token from disk.
    fn load_session(&self) -> Result<GarminSession, AppError> {
        let path = self.session_dir.join(SESSION_TOKEN_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|_| {
            AppError::Authentication(format!(
                "No saved Garmin session found at {}. Authenticate with garth first.",
                path.display()
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AppError::Authentication(format!("Unreadable Garmin session token: {e}"))
        })
    }

    /// Verify the current session is valid by making a lightweight request.
    pub async fn verify_session(&self) -> Result<bool, AppError> {
        let session = self.load_session()?;
        let url = format!("{}/userprofile-service/socialProfile", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(|e| AppError::GarminApi(format!("Session check failed: {e}")))?;

        if response.status().is_success() {
            return Ok(true);
        }
        tracing::warn!(status = %response.status(), "Garmin session verification failed");
        Ok(false)
    }

    /// Fetch recent activities from Garmin Connect.
    pub async fn get_activities(
        &self,
        start: u32,
        limit: u32,
    ) -> Result<Vec<GarminActivity>, AppError> {
        let session = self.load_session()?;
        let url = format!(
            "{}/activitylist-service/activities/search/activities",
            self.base_url
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&session.access_token)
            .query(&[("start", start.to_string()), ("limit", limit.to_string())])
            .send()
            .await
            .map_err(|e| AppError::GarminApi(format!("Failed to fetch activities: {e}")))?;

        let raw: Vec<RawGarminActivity> = check_response_json(response).await?;

        // Activities with missing or malformed fields are skipped, not fatal.
        let mut activities = Vec::with_capacity(raw.len());
        for item in raw {
            match item.into_activity() {
                Ok(activity) => activities.push(activity),
                Err(e) => tracing::warn!(error = %e, "Failed to parse activity, skipping"),
            }
        }

        tracing::debug!(count = activities.len(), "Fetched activities from Garmin");
        Ok(activities)
    }

    /// Download the ZIP archive containing the original FIT file.
    pub async fn download_activity_archive(&self, activity_id: &str) -> Result<Vec<u8>, AppError> {
        let session = self.load_session()?;
        let url = format!(
            "{}/download-service/files/activity/{}",
            self.base_url, activity_id
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(|e| AppError::GarminApi(format!("Download failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::GarminApi(format!(
                "Download of activity {activity_id} failed with HTTP {status}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::GarminApi(format!("Download read failed: {e}")))?;
        tracing::debug!(activity_id, bytes = bytes.len(), "Downloaded activity archive");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ActivitySource for GarminClient {
    async fn ensure_session(&self) -> Result<(), AppError> {
        if self.verify_session().await? {
            Ok(())
        } else {
            Err(AppError::Authentication(
                "Garmin session expired or invalid. Re-authenticate with garth.".to_string(),
            ))
        }
    }

    async fn recent_activities(&self, limit: u32) -> Result<Vec<GarminActivity>, AppError> {
        self.get_activities(0, limit).await
    }

    async fn download_fit(&self, activity_id: &str) -> Result<Vec<u8>, AppError> {
        let archive = self.download_activity_archive(activity_id).await?;
        extract_fit_from_zip(&archive).map_err(|e| {
            AppError::FitExtraction(format!("activity {activity_id}: {e}"))
        })
    }
}

/// Extract the FIT file from Garmin's ZIP download.
///
/// Garmin serves activity downloads as a ZIP archive containing a single
/// FIT file.
pub fn extract_fit_from_zip(zip_bytes: &[u8]) -> Result<Vec<u8>, AppError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes))
        .map_err(|e| AppError::FitExtraction(format!("Invalid ZIP file: {e}")))?;

    let fit_names: Vec<String> = archive
        .file_names()
        .filter(|name| name.to_lowercase().ends_with(".fit"))
        .map(String::from)
        .collect();

    let name = match fit_names.as_slice() {
        [] => {
            return Err(AppError::FitExtraction(
                "No FIT file found in ZIP archive".to_string(),
            ))
        }
        [single] => single.clone(),
        [first, ..] => {
            tracing::warn!(files = ?fit_names, "Multiple FIT files in archive, using first");
            first.clone()
        }
    };

    let mut file = archive
        .by_name(&name)
        .map_err(|e| AppError::FitExtraction(format!("Failed to open {name}: {e}")))?;
    let mut fit_bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut fit_bytes)
        .map_err(|e| AppError::FitExtraction(format!("Failed to read {name}: {e}")))?;

    tracing::debug!(file = %name, bytes = fit_bytes.len(), "Extracted FIT file");
    Ok(fit_bytes)
}

/// Saved Connect session token (garth `oauth2_token.json` layout).
#[derive(Debug, Clone, Deserialize)]
struct GarminSession {
    access_token: String,
}

/// Activity entry from the Connect activity list endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGarminActivity {
    activity_id: u64,
    #[serde(default)]
    activity_name: Option<String>,
    #[serde(default)]
    activity_type: Option<RawActivityType>,
    #[serde(rename = "startTimeGMT")]
    start_time_gmt: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    distance: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawActivityType {
    #[serde(default)]
    type_key: Option<String>,
}

impl RawGarminActivity {
    fn into_activity(self) -> Result<GarminActivity, AppError> {
        let start_raw = self.start_time_gmt.ok_or_else(|| {
            AppError::GarminApi(format!("Activity {} has no start time", self.activity_id))
        })?;

        Ok(GarminActivity {
            activity_id: self.activity_id.to_string(),
            activity_type: self
                .activity_type
                .and_then(|t| t.type_key)
                .unwrap_or_else(|| "unknown".to_string()),
            activity_name: self.activity_name.unwrap_or_default(),
            start_time: parse_garmin_time(&start_raw)?,
            duration_seconds: self.duration,
            distance_meters: self.distance,
        })
    }
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::GarminApi(format!("HTTP {status}: {body}")));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::GarminApi(format!("JSON parse error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_fit_from_zip() {
        let zip_bytes = build_zip(&[("12345_ACTIVITY.fit", b"fit-data")]);
        let fit = extract_fit_from_zip(&zip_bytes).unwrap();
        assert_eq!(fit, b"fit-data");
    }

    #[test]
    fn test_extract_fit_case_insensitive_extension() {
        let zip_bytes = build_zip(&[("ACTIVITY.FIT", b"fit-data")]);
        assert_eq!(extract_fit_from_zip(&zip_bytes).unwrap(), b"fit-data");
    }

    #[test]
    fn test_extract_fit_uses_first_of_multiple() {
        let zip_bytes = build_zip(&[("a.fit", b"first"), ("b.fit", b"second")]);
        assert_eq!(extract_fit_from_zip(&zip_bytes).unwrap(), b"first");
    }

    #[test]
    fn test_extract_fit_missing_fit_file() {
        let zip_bytes = build_zip(&[("readme.txt", b"nope")]);
        let err = extract_fit_from_zip(&zip_bytes).unwrap_err();
        assert!(matches!(err, AppError::FitExtraction(_)));
    }

    #[test]
    fn test_extract_fit_invalid_zip() {
        let err = extract_fit_from_zip(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, AppError::FitExtraction(_)));
    }

    #[test]
    fn test_raw_activity_defaults_unknown_type() {
        let raw: RawGarminActivity = serde_json::from_str(
            r#"{"activityId": 42, "startTimeGMT": "2024-01-15 10:30:00"}"#,
        )
        .unwrap();
        let activity = raw.into_activity().unwrap();
        assert_eq!(activity.activity_id, "42");
        assert_eq!(activity.activity_type, "unknown");
        assert_eq!(activity.activity_name, "");
    }

    #[test]
    fn test_raw_activity_without_start_time_is_rejected() {
        let raw: RawGarminActivity = serde_json::from_str(r#"{"activityId": 42}"#).unwrap();
        assert!(raw.into_activity().is_err());
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client for uploads and token management.
//!
//! Handles:
//! - FIT file uploads with processing-status polling
//! - Duplicate detection from Strava's upload error text
//! - Token refresh when expired (with 5-minute margin)
//! - Activity listing and gear updates
//! - Rate limit detection

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::time::Instant;

use crate::error::AppError;

/// OAuth scopes requested during authorization.
const OAUTH_SCOPES: &str = "activity:read_all,activity:write";

/// Destination-side collaborator seam consumed by the sync pipeline.
#[async_trait]
pub trait FitUploader {
    /// Upload a FIT recording, returning the new Strava activity ID.
    async fn upload_fit(
        &self,
        access_token: &str,
        fit: &[u8],
        external_id: &str,
        name: Option<&str>,
    ) -> Result<String, UploadError>;
}

/// Typed failure modes of an upload attempt.
///
/// `Duplicate` is success in disguise: the content already exists
/// downstream. `Timeout` and `Processing` are both terminal failures but
/// are surfaced differently to operators.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Activity already exists in Strava (existing id: {existing_id:?})")]
    Duplicate { existing_id: Option<String> },

    #[error("Upload processing timed out after {0} seconds")]
    Timeout(u64),

    #[error("Upload processing failed: {0}")]
    Processing(String),

    #[error("Strava API error: {0}")]
    Api(String),
}

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    upload_timeout: Duration,
    poll_interval: Duration,
}

impl StravaClient {
    /// Create a new Strava client with OAuth credentials.
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://www.strava.com".to_string(),
            client_id,
            client_secret,
            upload_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Override the base URL (testing).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override upload polling timing (testing).
    pub fn with_upload_timing(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.upload_timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    // ─── OAuth ───────────────────────────────────────────────────

    /// Build the authorization URL the user must visit to grant access.
    pub fn authorization_url(&self, redirect_uri: &str) -> String {
        format!(
            "{}/oauth/authorize?client_id={}&response_type=code&redirect_uri={}&approval_prompt=auto&scope={}",
            self.base_url,
            self.client_id,
            urlencoding::encode(redirect_uri),
            urlencoding::encode(OAUTH_SCOPES),
        )
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenExchangeResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/oauth/token", self.base_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(format!("Token exchange failed: {e}")))?;

        check_response_json(response).await
    }

    /// Refresh an expired access token.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenRefreshResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/oauth/token", self.base_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(format!("Token refresh request failed: {e}")))?;

        check_response_json(response).await
    }

    // ─── Activities ──────────────────────────────────────────────

    /// List the athlete's activities (paginated).
    pub async fn list_activities(
        &self,
        access_token: &str,
        after: i64, // Unix timestamp
        page: u32,
        per_page: u32,
    ) -> Result<Vec<StravaActivitySummary>, AppError> {
        let response = self
            .http
            .get(format!("{}/api/v3/athlete/activities", self.base_url))
            .bearer_auth(access_token)
            .query(&[
                ("after", after.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        check_response_json(response).await
    }

    /// Update an activity's gear assignment.
    pub async fn update_activity_gear(
        &self,
        access_token: &str,
        activity_id: u64,
        gear_id: &str,
    ) -> Result<(), AppError> {
        let body = serde_json::json!({ "gear_id": gear_id });

        let response = self
            .http
            .put(format!("{}/api/v3/activities/{}", self.base_url, activity_id))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        check_response(response).await
    }

    // ─── Uploads ─────────────────────────────────────────────────

    /// Start a FIT upload and poll until Strava finishes processing it.
    pub async fn upload_fit_file(
        &self,
        access_token: &str,
        fit: &[u8],
        external_id: &str,
        name: Option<&str>,
    ) -> Result<String, UploadError> {
        let mut status = self.start_upload(access_token, fit, external_id, name).await?;
        tracing::debug!(upload_id = status.id, external_id, "Upload started");

        let deadline = Instant::now() + self.upload_timeout;
        loop {
            if let Some(error) = status.error.as_deref().filter(|e| !e.is_empty()) {
                if error.to_lowercase().contains("duplicate") {
                    let existing_id = parse_duplicate_id(error);
                    tracing::info!(external_id, ?existing_id, "Duplicate activity detected");
                    return Err(UploadError::Duplicate { existing_id });
                }
                return Err(UploadError::Processing(error.to_string()));
            }

            if let Some(activity_id) = status.activity_id {
                tracing::info!(external_id, activity_id, "Upload successful");
                return Ok(activity_id.to_string());
            }

            if Instant::now() >= deadline {
                return Err(UploadError::Timeout(self.upload_timeout.as_secs()));
            }

            tokio::time::sleep(self.poll_interval).await;
            status = self.upload_status(access_token, status.id).await?;
        }
    }

    async fn start_upload(
        &self,
        access_token: &str,
        fit: &[u8],
        external_id: &str,
        name: Option<&str>,
    ) -> Result<UploadStatus, UploadError> {
        let part = reqwest::multipart::Part::bytes(fit.to_vec())
            .file_name(format!("{external_id}.fit"));
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("data_type", "fit")
            .text("external_id", external_id.to_string());
        if let Some(name) = name {
            form = form.text("name", name.to_string());
        }

        let response = self
            .http
            .post(format!("{}/api/v3/uploads", self.base_url))
            .bearer_auth(access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Api(format!("Upload request failed: {e}")))?;

        check_upload_response(response).await
    }

    async fn upload_status(
        &self,
        access_token: &str,
        upload_id: u64,
    ) -> Result<UploadStatus, UploadError> {
        let response = self
            .http
            .get(format!("{}/api/v3/uploads/{}", self.base_url, upload_id))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| UploadError::Api(format!("Upload status check failed: {e}")))?;

        check_upload_response(response).await
    }
}

#[async_trait]
impl FitUploader for StravaClient {
    async fn upload_fit(
        &self,
        access_token: &str,
        fit: &[u8],
        external_id: &str,
        name: Option<&str>,
    ) -> Result<String, UploadError> {
        self.upload_fit_file(access_token, fit, external_id, name)
            .await
    }
}

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<(), AppError> {
    if response.status().is_success() {
        return Ok(());
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status.as_u16() == 429 {
        tracing::warn!("Strava rate limit hit (429)");
        return Err(AppError::StravaApi(AppError::STRAVA_RATE_LIMIT.to_string()));
    }

    if status.as_u16() == 401 {
        return Err(AppError::StravaApi(AppError::STRAVA_TOKEN_ERROR.to_string()));
    }

    Err(AppError::StravaApi(format!("HTTP {status}: {body}")))
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            tracing::warn!("Strava rate limit hit (429)");
            return Err(AppError::StravaApi(AppError::STRAVA_RATE_LIMIT.to_string()));
        }

        if status.as_u16() == 401 {
            return Err(AppError::StravaApi(AppError::STRAVA_TOKEN_ERROR.to_string()));
        }

        return Err(AppError::StravaApi(format!("HTTP {status}: {body}")));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::StravaApi(format!("JSON parse error: {e}")))
}

/// Check an upload endpoint response, classifying failures.
async fn check_upload_response(response: reqwest::Response) -> Result<UploadStatus, UploadError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| UploadError::Api(format!("JSON parse error: {e}")));
    }

    let body = response.text().await.unwrap_or_default();
    if body.to_lowercase().contains("duplicate") {
        return Err(UploadError::Duplicate {
            existing_id: parse_duplicate_id(&body),
        });
    }
    Err(UploadError::Api(format!("HTTP {status}: {body}")))
}

/// Try to extract the existing activity ID from a duplicate error message.
///
/// Strava sometimes includes the existing activity ID in the error text.
fn parse_duplicate_id(message: &str) -> Option<String> {
    const PATTERNS: [&str; 3] = [r"(?i)activity[:\s]+(\d+)", r"(?i)id[:\s]+(\d+)", r"(\d{10,})"];

    for pattern in PATTERNS {
        let re = Regex::new(pattern).ok()?;
        if let Some(captures) = re.captures(message) {
            return Some(captures[1].to_string());
        }
    }
    None
}

/// Upload record returned by Strava's upload endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadStatus {
    pub id: u64,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub activity_id: Option<u64>,
}

/// Token refresh response from Strava.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Token exchange response from Strava OAuth (includes athlete info).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub athlete: StravaAthlete,
}

/// Athlete info from OAuth token exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaAthlete {
    pub id: i64,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
}

/// Summary activity for list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivitySummary {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sport_type: String,
    #[serde(default)]
    pub trainer: bool,
    #[serde(default)]
    pub gear_id: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// TokenManager - credential lifecycle for the single stored account
// ─────────────────────────────────────────────────────────────────────────────

use chrono::Utc;

use crate::db::Database;
use crate::models::StravaToken;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Owns the stored Strava credential and guarantees a valid access token
/// before any transfer attempt.
///
/// Refresh is attempted at most once per call; a rejected refresh is an
/// authentication failure the caller surfaces as a run-level error and the
/// next cycle simply tries again.
#[derive(Clone)]
pub struct TokenManager {
    db: Database,
    client: StravaClient,
}

impl TokenManager {
    pub fn new(db: Database, client: StravaClient) -> Self {
        Self { db, client }
    }

    /// Get the stored token, refreshing and persisting it first if it
    /// expires within the 5-minute margin.
    pub async fn ensure_valid_token(&self) -> Result<StravaToken, AppError> {
        let token = self.db.get_strava_token().await?.ok_or_else(|| {
            AppError::Authentication(
                "Strava not authenticated. Run 'garsync setup' to authorize.".to_string(),
            )
        })?;

        if !token.expires_within(TOKEN_REFRESH_MARGIN_SECS) {
            return Ok(token);
        }

        tracing::info!("Strava access token expiring, refreshing");
        let refreshed = self
            .client
            .refresh_token(&token.refresh_token)
            .await
            .map_err(|e| AppError::Authentication(format!("Strava token refresh failed: {e}")))?;

        let new_token = StravaToken {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            expires_at: refreshed.expires_at,
            athlete_id: token.athlete_id,
            updated_at: Utc::now(),
        };
        self.db.save_strava_token(&new_token).await?;

        tracing::info!("Strava token refreshed and stored");
        Ok(new_token)
    }

    /// Exchange an authorization code and persist the initial credential.
    pub async fn authorize_with_code(&self, code: &str) -> Result<StravaToken, AppError> {
        let exchanged = self.client.exchange_code(code).await?;

        let token = StravaToken {
            access_token: exchanged.access_token,
            refresh_token: exchanged.refresh_token,
            expires_at: exchanged.expires_at,
            athlete_id: Some(exchanged.athlete.id),
            updated_at: Utc::now(),
        };
        self.db.save_strava_token(&token).await?;

        tracing::info!(athlete_id = exchanged.athlete.id, "Strava authorization stored");
        Ok(token)
    }
}

//! Strava OAuth credential model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored Strava OAuth tokens. Singleton: one account per database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StravaToken {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry of the access token (unix seconds)
    pub expires_at: i64,
    /// Strava athlete ID, when known
    pub athlete_id: Option<i64>,
    /// When this credential was last written
    pub updated_at: DateTime<Utc>,
}

impl StravaToken {
    /// Whether the access token expires within `margin_secs` from now.
    ///
    /// Transfers require at least a 5-minute margin; a token inside the
    /// margin must be refreshed before use.
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        self.expires_at < Utc::now().timestamp() + margin_secs
    }
}

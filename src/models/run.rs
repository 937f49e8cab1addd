//! Sync run summary models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate outcome of one sync run. Appended to the run history and never
/// mutated after completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    /// Database row ID (assigned on insert)
    pub id: Option<i64>,
    pub started_at: DateTime<Utc>,
    /// Set when the run finalizes; `None` while in flight
    pub completed_at: Option<DateTime<Utc>>,
    pub activities_checked: u32,
    /// Includes duplicates: the content already exists downstream
    pub activities_transferred: u32,
    pub activities_skipped: u32,
    pub activities_failed: u32,
    /// Run-level error (authentication or fetch failure)
    pub error: Option<String>,
}

impl SyncRun {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            started_at,
            completed_at: None,
            activities_checked: 0,
            activities_transferred: 0,
            activities_skipped: 0,
            activities_failed: 0,
            error: None,
        }
    }

    /// Mark this run as completed.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
    }
}

/// Overall per-status totals across the whole ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncTotals {
    pub transferred: u64,
    pub skipped: u64,
    pub failed: u64,
    pub duplicate: u64,
    pub total_runs: u64,
    /// When the most recent run started, if any run has happened
    pub last_run_started_at: Option<DateTime<Utc>>,
}

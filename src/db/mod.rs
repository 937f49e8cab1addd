//! Database layer (SQLite).

pub mod sqlite;

pub use sqlite::Database;

/// Config table keys as constants.
pub mod keys {
    /// Instant before which activities are never transferred (write-once)
    pub const SYNC_HORIZON: &str = "sync_horizon";
    /// JSON array of blocked activity type keys
    pub const BLOCKED_TYPES: &str = "blocked_types";
    /// Per-run fetch limit override
    pub const FETCH_LIMIT: &str = "fetch_limit";
}

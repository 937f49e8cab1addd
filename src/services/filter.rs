// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity type filtering for transfer decisions.

use std::collections::HashSet;

/// Decides which activity types are transferred to Strava.
///
/// Matching is a case-insensitive exact match against the blocked set; no
/// prefix or wildcard semantics. An empty blocked set transfers everything.
#[derive(Debug, Clone)]
pub struct ActivityFilter {
    blocked_types: HashSet<String>,
}

impl ActivityFilter {
    /// Create a filter from blocked Garmin activity typeKeys.
    pub fn new<I, S>(blocked_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blocked_types: blocked_types
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Check whether an activity type should be transferred.
    pub fn should_sync(&self, activity_type: &str) -> bool {
        !self
            .blocked_types
            .contains(&activity_type.trim().to_lowercase())
    }

    /// The reason an activity type is blocked, `None` if it isn't.
    pub fn block_reason(&self, activity_type: &str) -> Option<String> {
        if self.should_sync(activity_type) {
            None
        } else {
            Some(format!("blocked_type:{}", activity_type.trim().to_lowercase()))
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod run;
pub mod token;

pub use activity::{ActivityStatus, GarminActivity, ProcessedActivity, SKIP_BEFORE_SYNC_HORIZON};
pub use run::{SyncRun, SyncTotals};
pub use token::StravaToken;

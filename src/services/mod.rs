// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod filter;
pub mod garmin;
pub mod gear;
pub mod processor;
pub mod strava;
pub mod sync;

pub use filter::ActivityFilter;
pub use garmin::{ActivitySource, GarminClient};
pub use processor::{ProcessAction, ProcessResult};
pub use strava::{FitUploader, StravaClient, TokenManager, UploadError};
pub use sync::{SyncEngine, SyncOutcome};

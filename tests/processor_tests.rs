// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! State machine tests for the per-activity processing pipeline.

use chrono::{Duration, Utc};

use garsync::models::{ActivityStatus, ProcessedActivity, SKIP_BEFORE_SYNC_HORIZON};
use garsync::services::processor::{process_activity, ProcessAction};
use garsync::services::ActivityFilter;

mod common;
use common::{
    garmin_activity, old_horizon, test_db, MockSource, MockUploader, UploadBehavior,
};

fn default_filter() -> ActivityFilter {
    ActivityFilter::new(["strength_training"])
}

#[tokio::test]
async fn test_known_activity_short_circuits() {
    let db = test_db().await;
    let activity = garmin_activity("10", "running", old_horizon() + Duration::days(1));

    let existing =
        ProcessedActivity::transferred(&activity, "777".to_string(), Utc::now());
    db.insert_activity(&existing).await.unwrap();

    let source = MockSource::with_activities(vec![activity.clone()]);
    let uploader = MockUploader::default();

    let result = process_activity(
        &activity,
        &db,
        &source,
        &uploader,
        "token",
        &default_filter(),
        old_horizon(),
    )
    .await
    .unwrap();

    assert_eq!(result.action, ProcessAction::Exists);
    assert_eq!(result.activity.strava_activity_id.as_deref(), Some("777"));
    // No new row, no upload attempt.
    assert_eq!(db.recent_activities(10).await.unwrap().len(), 1);
    assert_eq!(uploader.upload_count(), 0);
}

#[tokio::test]
async fn test_blocked_type_is_recorded_as_skipped() {
    let db = test_db().await;
    let activity = garmin_activity("11", "Strength_Training", old_horizon() + Duration::days(1));
    let source = MockSource::with_activities(vec![activity.clone()]);
    let uploader = MockUploader::default();

    let result = process_activity(
        &activity,
        &db,
        &source,
        &uploader,
        "token",
        &default_filter(),
        old_horizon(),
    )
    .await
    .unwrap();

    assert_eq!(result.action, ProcessAction::Skipped);
    assert_eq!(result.activity.status, ActivityStatus::Skipped);
    assert_eq!(
        result.activity.skip_reason.as_deref(),
        Some("blocked_type:strength_training")
    );
    assert_eq!(uploader.upload_count(), 0);
}

#[tokio::test]
async fn test_activity_before_horizon_is_skipped() {
    let db = test_db().await;
    let horizon = old_horizon();
    let activity = garmin_activity("12", "running", horizon - Duration::seconds(1));
    let source = MockSource::with_activities(vec![activity.clone()]);
    let uploader = MockUploader::default();

    let result = process_activity(
        &activity, &db, &source, &uploader, "token", &default_filter(), horizon,
    )
    .await
    .unwrap();

    assert_eq!(result.action, ProcessAction::Skipped);
    assert_eq!(
        result.activity.skip_reason.as_deref(),
        Some(SKIP_BEFORE_SYNC_HORIZON)
    );
    assert_eq!(uploader.upload_count(), 0);
}

#[tokio::test]
async fn test_activity_after_horizon_is_eligible() {
    let db = test_db().await;
    let horizon = old_horizon();
    let activity = garmin_activity("13", "running", horizon + Duration::seconds(1));
    let source = MockSource::with_activities(vec![activity.clone()]);
    let uploader = MockUploader::default();

    let result = process_activity(
        &activity, &db, &source, &uploader, "token", &default_filter(), horizon,
    )
    .await
    .unwrap();

    assert_eq!(result.action, ProcessAction::Transferred);
    assert_eq!(result.activity.status, ActivityStatus::Transferred);
    assert!(result.activity.strava_activity_id.is_some());
}

#[tokio::test]
async fn test_download_failure_is_recorded_as_failed() {
    let db = test_db().await;
    let activity = garmin_activity("14", "running", old_horizon() + Duration::days(1));
    // No payload registered: the download fails.
    let mut source = MockSource::with_activities(vec![activity.clone()]);
    source.payloads.clear();
    let uploader = MockUploader::default();

    let result = process_activity(
        &activity,
        &db,
        &source,
        &uploader,
        "token",
        &default_filter(),
        old_horizon(),
    )
    .await
    .unwrap();

    assert_eq!(result.action, ProcessAction::Failed);
    assert_eq!(result.activity.status, ActivityStatus::Failed);
    assert!(result
        .activity
        .error_message
        .as_deref()
        .unwrap()
        .contains("No FIT payload"));
    // Nothing was uploaded, but the activity is durably recorded.
    assert_eq!(uploader.upload_count(), 0);
    assert!(db.activity_exists("14").await.unwrap());
}

#[tokio::test]
async fn test_duplicate_upload_is_success_not_failure() {
    let db = test_db().await;
    let activity = garmin_activity("15", "running", old_horizon() + Duration::days(1));
    let source = MockSource::with_activities(vec![activity.clone()]);
    let uploader = MockUploader::with_behavior(
        "garmin_15",
        UploadBehavior::Duplicate(Some("1234567890".to_string())),
    );

    let result = process_activity(
        &activity,
        &db,
        &source,
        &uploader,
        "token",
        &default_filter(),
        old_horizon(),
    )
    .await
    .unwrap();

    assert_eq!(result.action, ProcessAction::Duplicate);
    assert_eq!(result.activity.status, ActivityStatus::Duplicate);
    assert_eq!(
        result.activity.strava_activity_id.as_deref(),
        Some("1234567890")
    );
    assert!(result.activity.error_message.is_none());
}

#[tokio::test]
async fn test_upload_timeout_is_recorded_as_failed() {
    let db = test_db().await;
    let activity = garmin_activity("16", "running", old_horizon() + Duration::days(1));
    let source = MockSource::with_activities(vec![activity.clone()]);
    let uploader = MockUploader::with_behavior("garmin_16", UploadBehavior::Timeout);

    let result = process_activity(
        &activity,
        &db,
        &source,
        &uploader,
        "token",
        &default_filter(),
        old_horizon(),
    )
    .await
    .unwrap();

    assert_eq!(result.action, ProcessAction::Failed);
    assert!(result
        .activity
        .error_message
        .as_deref()
        .unwrap()
        .contains("timed out"));
}

#[tokio::test]
async fn test_upload_rejection_detail_differs_from_timeout() {
    let db = test_db().await;
    let activity = garmin_activity("17", "running", old_horizon() + Duration::days(1));
    let source = MockSource::with_activities(vec![activity.clone()]);
    let uploader = MockUploader::with_behavior(
        "garmin_17",
        UploadBehavior::Processing("malformed FIT data".to_string()),
    );

    let result = process_activity(
        &activity,
        &db,
        &source,
        &uploader,
        "token",
        &default_filter(),
        old_horizon(),
    )
    .await
    .unwrap();

    assert_eq!(result.action, ProcessAction::Failed);
    let detail = result.activity.error_message.unwrap();
    assert!(detail.contains("malformed FIT data"));
    assert!(!detail.contains("timed out"));
}

#[tokio::test]
async fn test_transfer_uses_external_id_and_name() {
    let db = test_db().await;
    let activity = garmin_activity("18", "running", old_horizon() + Duration::days(1));
    let source = MockSource::with_activities(vec![activity.clone()]);
    let uploader = MockUploader::default();

    process_activity(
        &activity,
        &db,
        &source,
        &uploader,
        "token",
        &default_filter(),
        old_horizon(),
    )
    .await
    .unwrap();

    let uploads = uploader.uploads.lock().unwrap();
    assert_eq!(uploads.as_slice(), ["garmin_18"]);
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential manager tests: refresh boundary and persistence.

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use garsync::db::Database;
use garsync::error::AppError;
use garsync::models::StravaToken;
use garsync::services::{StravaClient, TokenManager};

mod common;
use common::test_db;

async fn seed_token_expiring_in(db: &Database, secs: i64) {
    let token = StravaToken {
        access_token: "old_access".to_string(),
        refresh_token: "old_refresh".to_string(),
        expires_at: Utc::now().timestamp() + secs,
        athlete_id: Some(42),
        updated_at: Utc::now(),
    };
    db.save_strava_token(&token).await.unwrap();
}

fn manager(db: &Database, server_uri: &str) -> TokenManager {
    let client = StravaClient::new("client_id".to_string(), "client_secret".to_string())
        .with_base_url(server_uri.to_string());
    TokenManager::new(db.clone(), client)
}

#[tokio::test]
async fn test_token_expiring_in_four_minutes_is_refreshed() {
    let server = MockServer::start().await;
    let db = test_db().await;
    seed_token_expiring_in(&db, 4 * 60).await;

    let new_expiry = Utc::now().timestamp() + 6 * 3600;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old_refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new_access",
            "refresh_token": "new_refresh",
            "expires_at": new_expiry,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = manager(&db, &server.uri()).ensure_valid_token().await.unwrap();

    assert_eq!(token.access_token, "new_access");
    assert_eq!(token.expires_at, new_expiry);

    // The refreshed credential is persisted atomically.
    let stored = db.get_strava_token().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "new_access");
    assert_eq!(stored.refresh_token, "new_refresh");
    assert_eq!(stored.athlete_id, Some(42));
}

#[tokio::test]
async fn test_token_expiring_in_six_minutes_is_not_refreshed() {
    let server = MockServer::start().await;
    let db = test_db().await;
    seed_token_expiring_in(&db, 6 * 60).await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let token = manager(&db, &server.uri()).ensure_valid_token().await.unwrap();
    assert_eq!(token.access_token, "old_access");
}

#[tokio::test]
async fn test_rejected_refresh_is_an_authentication_error() {
    let server = MockServer::start().await;
    let db = test_db().await;
    seed_token_expiring_in(&db, 60).await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "Bad Request",
            "errors": [{"resource": "RefreshToken", "code": "invalid"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = manager(&db, &server.uri()).ensure_valid_token().await.unwrap_err();
    assert!(matches!(err, AppError::Authentication(_)));

    // The stored credential is left as-is for the operator to inspect.
    let stored = db.get_strava_token().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "old_access");
}

#[tokio::test]
async fn test_missing_credential_is_an_authentication_error() {
    let server = MockServer::start().await;
    let db = test_db().await;

    let err = manager(&db, &server.uri()).ensure_valid_token().await.unwrap_err();
    match err {
        AppError::Authentication(msg) => assert!(msg.contains("setup")),
        other => panic!("expected Authentication, got {other:?}"),
    }
}

#[tokio::test]
async fn test_authorize_with_code_stores_initial_credential() {
    let server = MockServer::start().await;
    let db = test_db().await;

    let expiry = Utc::now().timestamp() + 6 * 3600;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "first_access",
            "refresh_token": "first_refresh",
            "expires_at": expiry,
            "athlete": {"id": 4242, "firstname": "Jo", "lastname": "Rider"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = manager(&db, &server.uri())
        .authorize_with_code("abc123")
        .await
        .unwrap();

    assert_eq!(token.athlete_id, Some(4242));
    let stored = db.get_strava_token().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "first_access");
    assert_eq!(stored.expires_at, expiry);
}

//! Integration tests for the HTTP API.
//!
//! Builds the router in-process and drives it with `tower::ServiceExt`.
//! Requires a live PostgreSQL (`DATABASE_URL`) and lock store
//! (`REDIS_URL`); each test is skipped when either is unset.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bankroll::db::{Database, DatabaseConfig};
use bankroll::ledger::LedgerManager;
use bankroll::lock::{LockManager, SharedCounter, connect_store};
use bankroll_server::api::middleware::{Claims, Role};
use bankroll_server::api::{AppState, create_router};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method
use uuid::Uuid;

const JWT_SECRET: &str = "test_secret_key_for_testing_only_32ch";

async fn create_test_server() -> Option<axum::Router> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let Ok(redis_url) = std::env::var("REDIS_URL") else {
        eprintln!("REDIS_URL not set, skipping");
        return None;
    };

    let config = DatabaseConfig {
        database_url,
        max_connections: 10,
        min_connections: 1,
        connection_timeout_secs: 5,
        idle_timeout_secs: 300,
        max_lifetime_secs: 1800,
    };
    let db = Database::new(&config)
        .await
        .expect("Failed to create test database");
    db.ensure_schema().await.expect("Schema should bootstrap");

    let pool = Arc::new(db.pool().clone());
    let store = connect_store(&redis_url)
        .await
        .expect("Failed to connect to lock store");
    let ledger = Arc::new(LedgerManager::new(
        pool.clone(),
        LockManager::new(store.clone()),
    ));

    let state = AppState {
        ledger,
        limiter: SharedCounter::new(store),
        jwt_secret: JWT_SECRET.to_string(),
        pool,
    };

    Some(create_router(state))
}

fn token(user_id: i64, role: Role) -> String {
    let claims = Claims {
        sub: user_id,
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
        role,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Token should encode")
}

fn unique_user() -> i64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .expect("in range") as i64
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Body should collect")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body should be JSON")
}

#[tokio::test]
async fn test_health_check_endpoint() {
    let Some(app) = create_test_server().await else { return };

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("Request should build");
    let response = app.oneshot(request).await.expect("Request should resolve");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn test_protected_endpoint_requires_token() {
    let Some(app) = create_test_server().await else { return };

    let request = Request::builder()
        .uri("/api/v1/users/balances")
        .body(Body::empty())
        .expect("Request should build");
    let response = app.oneshot(request).await.expect("Request should resolve");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deposit_and_replay_through_api() {
    let Some(app) = create_test_server().await else { return };
    let user_id = unique_user();
    let auth = format!("Bearer {}", token(user_id, Role::User));
    let operation_id = Uuid::new_v4();

    let payload = json!({
        "operationId": operation_id,
        "amount": 250,
        "asset": "EUR",
        "platform": "CASINO",
    });

    let deposit = |body: Value, auth: String| {
        Request::builder()
            .method("POST")
            .uri("/api/v1/users/deposit")
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("Request should build")
    };

    let response = app
        .clone()
        .oneshot(deposit(payload.clone(), auth.clone()))
        .await
        .expect("Request should resolve");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["balance"], 250);
    assert_eq!(body["duplicate"], false);

    // Replaying the same operationId returns the stored result.
    let response = app
        .oneshot(deposit(payload, auth))
        .await
        .expect("Request should resolve");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["balance"], 250);
    assert_eq!(body["duplicate"], true);
}

#[tokio::test]
async fn test_deposit_blocked_for_excluded_user() {
    let Some(app) = create_test_server().await else { return };
    let user_id = unique_user();
    let auth = format!("Bearer {}", token(user_id, Role::User));

    // Create a platform-wide permanent exclusion first.
    let create = Request::builder()
        .method("POST")
        .uri("/api/v1/users/self-exclusion")
        .header(header::AUTHORIZATION, auth.clone())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "exclusionType": "permanent",
                "platformType": "PLATFORM",
            })
            .to_string(),
        ))
        .expect("Request should build");
    let response = app
        .clone()
        .oneshot(create)
        .await
        .expect("Request should resolve");
    assert_eq!(response.status(), StatusCode::CREATED);

    let deposit = Request::builder()
        .method("POST")
        .uri("/api/v1/users/deposit")
        .header(header::AUTHORIZATION, auth)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "operationId": Uuid::new_v4(),
                "amount": 100,
                "asset": "EUR",
                "platform": "CASINO",
            })
            .to_string(),
        ))
        .expect("Request should build");
    let response = app
        .oneshot(deposit)
        .await
        .expect("Request should resolve");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert!(
        body["error"]
            .as_str()
            .expect("message present")
            .contains("permanently excluded")
    );
}

#[tokio::test]
async fn test_admin_endpoint_rejects_user_role() {
    let Some(app) = create_test_server().await else { return };
    let user_id = unique_user();
    let auth = format!("Bearer {}", token(user_id, Role::User));

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/admin/operations")
        .header(header::AUTHORIZATION, auth)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "operationId": Uuid::new_v4(),
                "userId": user_id,
                "kind": "manual_credit",
                "amount": 100,
                "asset": "EUR",
                "platform": "PLATFORM",
            })
            .to_string(),
        ))
        .expect("Request should build");
    let response = app
        .oneshot(request)
        .await
        .expect("Request should resolve");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_gambling_limits_endpoint() {
    let Some(app) = create_test_server().await else { return };
    let user_id = unique_user();
    let auth = format!("Bearer {}", token(user_id, Role::User));

    let create = Request::builder()
        .method("POST")
        .uri("/api/v1/users/self-exclusion")
        .header(header::AUTHORIZATION, auth.clone())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "exclusionType": "deposit_limit",
                "platformType": "PLATFORM",
                "period": "WEEKLY",
                "limitAmount": 1000,
            })
            .to_string(),
        ))
        .expect("Request should build");
    let response = app
        .clone()
        .oneshot(create)
        .await
        .expect("Request should resolve");
    assert_eq!(response.status(), StatusCode::CREATED);

    let request = Request::builder()
        .uri("/api/v1/users/gambling-limits")
        .header(header::AUTHORIZATION, auth)
        .body(Body::empty())
        .expect("Request should build");
    let response = app
        .oneshot(request)
        .await
        .expect("Request should resolve");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let summary = body.as_array().expect("Summary is an array");
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0]["limitAmount"], 1000);
    assert_eq!(summary[0]["remaining"], 1000);
}

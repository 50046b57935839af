//! HTTP API for the bankroll ledger server.
//!
//! # Endpoints Overview
//!
//! ## Health Check (public)
//! - `GET /health` - Database and lock-store health
//!
//! ## Wallet (auth required)
//! - `GET  /api/v1/users/balances` - All asset balances
//! - `GET  /api/v1/users/operations` - Operation history
//! - `POST /api/v1/users/deposit` - Deposit with idempotency key
//! - `POST /api/v1/admin/operations` - Manual credit/debit (admin)
//!
//! ## Self-exclusions (auth required)
//! - `POST   /api/v1/users/self-exclusion` - Create exclusion or limit
//! - `GET    /api/v1/users/self-exclusions` - Full history
//! - `GET    /api/v1/users/self-exclusions/active` - Records in force
//! - `DELETE /api/v1/users/self-exclusions/{id}` - Cancel / start removal
//! - `POST   /api/v1/users/self-exclusions/{id}/keep` - Reverse removal
//! - `POST   /api/v1/users/self-exclusion/extend/{id}` - Upgrade cooldown
//! - `GET    /api/v1/users/gambling-limits` - Remaining headroom
//!
//! Guard rejections map to `403` with the fixed user-facing message for
//! the access state, so clients can branch on its substrings.

pub mod exclusions;
pub mod middleware;
pub mod policy;
pub mod request_id;
pub mod wallet;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
};
use bankroll::ledger::LedgerManager;
use bankroll::lock::SharedCounter;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; cheap due to Arc wrappers and multiplexed store
/// connections.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerManager>,
    pub limiter: SharedCounter,
    pub jwt_secret: String,
    pub pool: Arc<PgPool>,
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let v1_routes = create_v1_router(state.clone());

    let root_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(root_routes)
        .nest("/api/v1", v1_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Create API v1 router with all versioned endpoints.
fn create_v1_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/users/balances", get(wallet::get_balances))
        .route("/users/operations", get(wallet::get_operations))
        .route("/users/deposit", post(wallet::deposit))
        .route("/admin/operations", post(wallet::manual_adjustment))
        .route("/users/self-exclusion", post(exclusions::create))
        .route("/users/self-exclusions", get(exclusions::list))
        .route(
            "/users/self-exclusions/active",
            get(exclusions::get_active),
        )
        .route(
            "/users/self-exclusions/{id}",
            delete(exclusions::cancel),
        )
        .route(
            "/users/self-exclusions/{id}/keep",
            post(exclusions::keep),
        )
        .route(
            "/users/self-exclusion/extend/{id}",
            post(exclusions::extend),
        )
        .route("/users/gambling-limits", get(exclusions::limit_summary))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ))
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the database answers, `503` otherwise. The
/// lock store is reported but does not fail the check: the ledger
/// degrades to rejecting mutations, reads keep working.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = sqlx::query("SELECT 1")
        .fetch_one(&*state.pool)
        .await
        .is_ok();

    let store_healthy = state
        .limiter
        .hit("health:probe", std::time::Duration::from_secs(1))
        .await
        .is_ok();

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "lock_store": store_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}

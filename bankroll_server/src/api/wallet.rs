//! Wallet REST handlers.
//!
//! The deposit flow exercises the full guard chain: exclusion check,
//! deposit-limit headroom, idempotent apply. Guard rejections map to
//! `403` with the fixed user-facing message for the access state, so
//! clients can branch on its substrings.

use axum::{
    Extension,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use bankroll::exclusion::PlatformType;
use bankroll::ledger::{LedgerError, OperationKind, UpdateBalanceRequest};
use bankroll::lock::LockError;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::AppState;
use super::middleware::Claims;
use super::policy::{self, EndpointPolicy, RateRule};
use crate::logging;
use crate::metrics;

const BALANCES: EndpointPolicy = EndpointPolicy::user("balances", RateRule::read());
const OPERATIONS: EndpointPolicy = EndpointPolicy::user("operations", RateRule::read());
const DEPOSIT: EndpointPolicy = EndpointPolicy::user("deposit", RateRule::mutation());
const MANUAL: EndpointPolicy = EndpointPolicy::admin("manual_adjustment");

/// Map a ledger error to an HTTP response with a client-safe body
fn error_response(err: LedgerError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        LedgerError::SelfExclusionActive(_) | LedgerError::LimitExceeded { .. } => {
            StatusCode::FORBIDDEN
        }
        LedgerError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::InvalidAmount | LedgerError::BalanceOverflow => StatusCode::BAD_REQUEST,
        LedgerError::Lock(LockError::Timeout { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::Exclusion(inner) => {
            log::error!("ledger exclusion lookup failed: {inner}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        LedgerError::Database(_) | LedgerError::Lock(_) => {
            log::error!("ledger handler error: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": err.client_message() })))
}

/// GET /api/v1/users/balances
pub async fn get_balances(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    if let Err(status) = policy::enforce(&state, &BALANCES, &claims).await {
        return status.into_response();
    }

    match state.ledger.get_balances(claims.sub).await {
        Ok(balances) => Json(balances).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/v1/users/operations
pub async fn get_operations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    if let Err(status) = policy::enforce(&state, &OPERATIONS, &claims).await {
        return status.into_response();
    }

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);

    match state.ledger.get_operations(claims.sub, limit, offset).await {
        Ok(operations) => Json(operations).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    /// Client-supplied idempotency key
    pub operation_id: Uuid,
    /// Positive amount in minor units
    pub amount: i64,
    pub asset: String,
    pub platform: PlatformType,
    pub description: Option<String>,
}

/// POST /api/v1/users/deposit
pub async fn deposit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DepositRequest>,
) -> impl IntoResponse {
    if let Err(status) = policy::enforce(&state, &DEPOSIT, &claims).await {
        return status.into_response();
    }

    let update = UpdateBalanceRequest {
        kind: OperationKind::Deposit,
        operation_id: req.operation_id,
        user_id: claims.sub,
        amount: req.amount,
        asset: req.asset,
        platform: req.platform,
        description: req.description,
    };

    apply(&state, claims.sub, update).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualAdjustmentRequest {
    pub operation_id: Uuid,
    /// Target user, not the authenticated operator
    pub user_id: i64,
    pub kind: OperationKind,
    pub amount: i64,
    pub asset: String,
    pub platform: PlatformType,
    pub description: Option<String>,
}

/// POST /api/v1/admin/operations
///
/// Manual credits and debits only; regular operation kinds must go
/// through their own flows.
pub async fn manual_adjustment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ManualAdjustmentRequest>,
) -> impl IntoResponse {
    if let Err(status) = policy::enforce(&state, &MANUAL, &claims).await {
        return status.into_response();
    }

    if !matches!(
        req.kind,
        OperationKind::ManualCredit | OperationKind::ManualDebit
    ) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Only manual credits and debits are accepted here" })),
        )
            .into_response();
    }

    log::info!(
        "operator {} applying {} of {} for user {}",
        claims.sub,
        req.kind,
        req.amount,
        req.user_id
    );

    let update = UpdateBalanceRequest {
        kind: req.kind,
        operation_id: req.operation_id,
        user_id: req.user_id,
        amount: req.amount,
        asset: req.asset,
        platform: req.platform,
        description: req.description,
    };

    apply(&state, req.user_id, update).await
}

/// Shared apply path with metrics and guard logging
async fn apply(
    state: &AppState,
    user_id: i64,
    update: UpdateBalanceRequest,
) -> axum::response::Response {
    let kind = update.kind;
    match state.ledger.update_balance(update).await {
        Ok(outcome) => {
            if outcome.duplicate {
                metrics::operations_replayed_total(kind.as_str());
            } else {
                metrics::operations_applied_total(kind.as_str());
            }
            Json(outcome).into_response()
        }
        Err(err) => {
            match &err {
                LedgerError::SelfExclusionActive(access) => {
                    metrics::guard_rejections_total("exclusion");
                    logging::log_guard_event("operation_blocked", user_id, access.user_message());
                }
                LedgerError::LimitExceeded { exclusion_type, .. } => {
                    metrics::guard_rejections_total("limit");
                    logging::log_guard_event("operation_blocked", user_id, exclusion_type.label());
                }
                LedgerError::Lock(LockError::Timeout { .. }) => {
                    metrics::lock_timeouts_total();
                }
                _ => {}
            }
            error_response(err).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankroll::exclusion::{AccessState, ExclusionType, LimitPeriod};

    #[test]
    fn test_exclusion_rejection_is_403_with_fixed_substring() {
        let (status, body) =
            error_response(LedgerError::SelfExclusionActive(AccessState::Permanent));
        assert_eq!(status, StatusCode::FORBIDDEN);
        let message = body.0["error"].as_str().expect("message present");
        assert!(message.contains("permanently excluded"));
    }

    #[test]
    fn test_cooldown_rejection_message() {
        let (status, body) =
            error_response(LedgerError::SelfExclusionActive(AccessState::Cooldown));
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.0["error"].as_str().expect("message").contains("cooldown"));
    }

    #[test]
    fn test_limit_rejection_is_403_and_names_the_limit() {
        let (status, body) = error_response(LedgerError::LimitExceeded {
            exclusion_type: ExclusionType::LossLimit,
            period: LimitPeriod::Daily,
            platform_type: PlatformType::Casino,
        });
        assert_eq!(status, StatusCode::FORBIDDEN);
        let message = body.0["error"].as_str().expect("message present");
        assert!(message.contains("Loss limit"));
        assert!(message.contains("DAILY"));
    }

    #[test]
    fn test_lock_timeout_is_503() {
        let (status, _) = error_response(LedgerError::Lock(LockError::Timeout {
            resource: "balance:1:EUR".to_string(),
            attempts: 11,
        }));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_database_error_is_sanitized() {
        let (status, body) = error_response(LedgerError::Database(sqlx::Error::PoolClosed));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0["error"], "Internal server error");
    }
}

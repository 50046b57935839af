//! Self-exclusion REST handlers.

use axum::{
    Extension,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use bankroll::exclusion::{
    CancelOutcome, CreateExclusionRequest, ExclusionError, PlatformType,
};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use super::middleware::Claims;
use super::policy::{self, EndpointPolicy, RateRule};
use crate::logging;

const CREATE: EndpointPolicy = EndpointPolicy::user("exclusion_create", RateRule::mutation());
const CANCEL: EndpointPolicy = EndpointPolicy::user("exclusion_cancel", RateRule::mutation());
const KEEP: EndpointPolicy = EndpointPolicy::user("exclusion_keep", RateRule::mutation());
const EXTEND: EndpointPolicy = EndpointPolicy::user("exclusion_extend", RateRule::mutation());
const LIST: EndpointPolicy = EndpointPolicy::user("exclusion_list", RateRule::read());

/// Map an exclusion error to an HTTP response with a client-safe body
fn error_response(err: ExclusionError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        ExclusionError::NotFound(_) => StatusCode::NOT_FOUND,
        ExclusionError::Conflict(_) => StatusCode::CONFLICT,
        ExclusionError::WindowExpired
        | ExclusionError::CooldownStillActive
        | ExclusionError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ExclusionError::NotCancellable(_) => StatusCode::FORBIDDEN,
        ExclusionError::Database(_) | ExclusionError::InvalidRecord(_) => {
            log::error!("exclusion handler error: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": err.client_message() })))
}

/// POST /api/v1/users/self-exclusion
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateExclusionRequest>,
) -> impl IntoResponse {
    if let Err(status) = policy::enforce(&state, &CREATE, &claims).await {
        return status.into_response();
    }

    match state.ledger.exclusions().create(claims.sub, req).await {
        Ok(exclusion) => {
            logging::log_guard_event(
                "exclusion_created",
                claims.sub,
                exclusion.exclusion_type.label(),
            );
            (StatusCode::CREATED, Json(exclusion)).into_response()
        }
        Err(err) => error_response(err).into_response(),
    }
}

/// GET /api/v1/users/self-exclusions
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    if let Err(status) = policy::enforce(&state, &LIST, &claims).await {
        return status.into_response();
    }

    match state.ledger.exclusions().list(claims.sub).await {
        Ok(records) => Json(records).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveQuery {
    pub platform_type: Option<PlatformType>,
}

/// GET /api/v1/users/self-exclusions/active?platformType=
pub async fn get_active(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ActiveQuery>,
) -> impl IntoResponse {
    if let Err(status) = policy::enforce(&state, &LIST, &claims).await {
        return status.into_response();
    }

    let exclusions = state.ledger.exclusions();
    let records = match exclusions.get_active_self_exclusions(claims.sub).await {
        Ok(records) => records,
        Err(err) => return error_response(err).into_response(),
    };
    let records: Vec<_> = records
        .into_iter()
        .filter(|r| r.applies_to(query.platform_type))
        .collect();

    let restriction = match exclusions
        .has_active_self_exclusion(claims.sub, query.platform_type)
        .await
    {
        Ok(active) => active,
        Err(err) => return error_response(err).into_response(),
    };

    Json(json!({
        "exclusions": records,
        "accessState": restriction.as_ref().map(|a| a.state),
        "message": restriction.map(|a| a.state.user_message()),
    }))
    .into_response()
}

/// DELETE /api/v1/users/self-exclusions/{id}
pub async fn cancel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    if let Err(status) = policy::enforce(&state, &CANCEL, &claims).await {
        return status.into_response();
    }

    match state.ledger.exclusions().cancel(claims.sub, id).await {
        Ok(CancelOutcome::Deleted) => {
            logging::log_guard_event("exclusion_cancelled", claims.sub, "cooldown deleted");
            Json(json!({ "status": "deleted" })).into_response()
        }
        Ok(CancelOutcome::RemovalPending { removal_due }) => {
            logging::log_guard_event("limit_removal_requested", claims.sub, "countdown running");
            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "status": "removalPending",
                    "removalDue": removal_due,
                })),
            )
                .into_response()
        }
        Err(err) => error_response(err).into_response(),
    }
}

/// POST /api/v1/users/self-exclusions/{id}/keep
pub async fn keep(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    if let Err(status) = policy::enforce(&state, &KEEP, &claims).await {
        return status.into_response();
    }

    match state.ledger.exclusions().revoke_removal(claims.sub, id).await {
        Ok(record) => {
            logging::log_guard_event("limit_removal_reversed", claims.sub, "limit kept");
            Json(record).into_response()
        }
        Err(err) => error_response(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendRequest {
    pub platform_type: PlatformType,
    /// Omit for a permanent exclusion
    pub duration_days: Option<i64>,
}

/// POST /api/v1/users/self-exclusion/extend/{id}
pub async fn extend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<ExtendRequest>,
) -> impl IntoResponse {
    if let Err(status) = policy::enforce(&state, &EXTEND, &claims).await {
        return status.into_response();
    }

    match state
        .ledger
        .exclusions()
        .extend(claims.sub, id, req.platform_type, req.duration_days)
        .await
    {
        Ok(record) => {
            logging::log_guard_event(
                "cooldown_extended",
                claims.sub,
                record.exclusion_type.label(),
            );
            (StatusCode::CREATED, Json(record)).into_response()
        }
        Err(err) => error_response(err).into_response(),
    }
}

/// GET /api/v1/users/gambling-limits
pub async fn limit_summary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    if let Err(status) = policy::enforce(&state, &LIST, &claims).await {
        return status.into_response();
    }

    match state
        .ledger
        .exclusions()
        .gambling_limit_summary(claims.sub, None)
        .await
    {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let (status, _) = error_response(ExclusionError::NotFound(9));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let (status, _) = error_response(ExclusionError::Conflict("dup".to_string()));
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_window_errors_map_to_400() {
        let (status, _) = error_response(ExclusionError::WindowExpired);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = error_response(ExclusionError::CooldownStillActive);
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_database_error_is_sanitized() {
        let (status, body) = error_response(ExclusionError::Database(sqlx::Error::PoolClosed));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0["error"], "Internal server error");
    }
}

//! Authentication middleware for protected endpoints.
//!
//! Extracts and validates JWT access tokens from the Authorization
//! header, then injects the authenticated user id and claims into
//! request extensions for downstream handlers. Token issuance lives in
//! the platform's identity service; this server only validates.

use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use super::AppState;

/// Caller role carried in the token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i64,
    /// Expiry as unix seconds
    pub exp: i64,
    #[serde(default)]
    pub role: Role,
}

/// Authentication middleware that validates JWT tokens and injects the
/// user id and [`Claims`] into request extensions.
///
/// - Missing header, invalid format, or invalid/expired token: `401`
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let Some(token) = auth_header else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    let key = DecodingKey::from_secret(state.jwt_secret.as_bytes());
    match decode::<Claims>(token, &key, &Validation::default()) {
        Ok(data) => {
            request.extensions_mut().insert(data.claims.sub);
            request.extensions_mut().insert(data.claims);
            Ok(next.run(request).await)
        }
        Err(err) => {
            log::debug!("token rejected: {err}");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

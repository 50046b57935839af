//! Per-endpoint access policy.
//!
//! Each handler declares its policy as a const (required role plus an
//! optional rate rule) and runs it through one enforcement function.
//! Rate counters live in the shared lock store, so the limit holds
//! across all workers, not per process.

use axum::http::StatusCode;
use std::time::Duration;

use super::AppState;
use super::middleware::{Claims, Role};
use crate::metrics;

/// Rate rule: at most `max_hits` requests per `window`
#[derive(Debug, Clone, Copy)]
pub struct RateRule {
    pub max_hits: u64,
    pub window: Duration,
}

impl RateRule {
    /// Tight rule for money-moving endpoints
    pub const fn mutation() -> Self {
        Self {
            max_hits: 30,
            window: Duration::from_secs(60),
        }
    }

    /// Relaxed rule for read endpoints
    pub const fn read() -> Self {
        Self {
            max_hits: 300,
            window: Duration::from_secs(60),
        }
    }
}

/// Access policy for one endpoint
#[derive(Debug, Clone, Copy)]
pub struct EndpointPolicy {
    /// Stable name, used in counter keys and metrics labels
    pub name: &'static str,
    pub required_role: Role,
    pub rate: Option<RateRule>,
}

impl EndpointPolicy {
    pub const fn user(name: &'static str, rate: RateRule) -> Self {
        Self {
            name,
            required_role: Role::User,
            rate: Some(rate),
        }
    }

    pub const fn admin(name: &'static str) -> Self {
        Self {
            name,
            required_role: Role::Admin,
            rate: None,
        }
    }
}

/// Enforce an endpoint policy for the authenticated caller.
///
/// Returns `403` for an insufficient role and `429` once the rate rule
/// is exhausted. A lock-store outage degrades open: rate limiting is a
/// protection layer, not a correctness dependency.
pub async fn enforce(
    state: &AppState,
    policy: &EndpointPolicy,
    claims: &Claims,
) -> Result<(), StatusCode> {
    if policy.required_role == Role::Admin && claims.role != Role::Admin {
        return Err(StatusCode::FORBIDDEN);
    }

    if let Some(rate) = policy.rate {
        let key = format!("rate:{}:{}", policy.name, claims.sub);
        match state.limiter.hit(&key, rate.window).await {
            Ok(hits) if hits > rate.max_hits => {
                metrics::rate_limit_hits_total(policy.name);
                log::info!("rate limit hit on {} for user {}", policy.name, claims.sub);
                return Err(StatusCode::TOO_MANY_REQUESTS);
            }
            Ok(_) => {}
            Err(err) => {
                log::warn!("rate counter unavailable for {}: {err}", policy.name);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_constructors() {
        let p = EndpointPolicy::user("deposit", RateRule::mutation());
        assert_eq!(p.required_role, Role::User);
        assert_eq!(p.rate.expect("has rate").max_hits, 30);

        let a = EndpointPolicy::admin("manual_adjustment");
        assert_eq!(a.required_role, Role::Admin);
        assert!(a.rate.is_none());
    }

    #[test]
    fn test_rate_rules() {
        assert!(RateRule::read().max_hits > RateRule::mutation().max_hits);
        assert_eq!(RateRule::read().window, Duration::from_secs(60));
    }
}

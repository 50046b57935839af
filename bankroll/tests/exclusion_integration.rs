//! Integration tests for the self-exclusion lifecycle.
//!
//! Requires a live PostgreSQL (`DATABASE_URL`); each test is skipped
//! when it is unset.

use bankroll::db::{Database, DatabaseConfig};
use bankroll::exclusion::{
    AccessState, CancelOutcome, CreateExclusionRequest, ExclusionError, ExclusionManager,
    ExclusionType, LimitPeriod, PlatformType,
};
use sqlx::PgPool;
use std::sync::Arc;

async fn setup() -> Option<(ExclusionManager, Arc<PgPool>)> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };

    let config = DatabaseConfig {
        database_url,
        max_connections: 5,
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
    Some((ExclusionManager::new(pool.clone()), pool))
}

fn unique_user() -> i64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .expect("in range") as i64
}

async fn cleanup_user(pool: &PgPool, user_id: i64) {
    let _ = sqlx::query("DELETE FROM self_exclusions WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await;
    let _ = sqlx::query("DELETE FROM daily_gambling_stats WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await;
}

fn cooldown_request(platform_type: PlatformType) -> CreateExclusionRequest {
    CreateExclusionRequest {
        exclusion_type: ExclusionType::Cooldown,
        platform_type,
        duration_days: None,
        period: None,
        limit_amount: None,
    }
}

#[tokio::test]
async fn test_cooldown_lifecycle() {
    let Some((mgr, pool)) = setup().await else { return };
    let user_id = unique_user();

    let cooldown = mgr
        .create(user_id, cooldown_request(PlatformType::Casino))
        .await
        .expect("Cooldown creation should succeed");
    assert_eq!(cooldown.exclusion_type, ExclusionType::Cooldown);

    // Roughly 24 hours out.
    let end = cooldown.end_date.expect("Cooldowns have an end date");
    let hours = (end - cooldown.start_date).num_hours();
    assert_eq!(hours, 24);

    let active = mgr
        .has_active_self_exclusion(user_id, Some(PlatformType::Casino))
        .await
        .expect("Lookup should succeed")
        .expect("Cooldown should apply");
    assert_eq!(active.state, AccessState::Cooldown);

    // Casino-scoped: sports unaffected.
    let sports = mgr
        .has_active_self_exclusion(user_id, Some(PlatformType::Sports))
        .await
        .expect("Lookup should succeed");
    assert!(sports.is_none());

    // Cooldowns cancel immediately, no countdown.
    let outcome = mgr
        .cancel(user_id, cooldown.id)
        .await
        .expect("Cancellation should succeed");
    assert_eq!(outcome, CancelOutcome::Deleted);
    assert!(matches!(
        mgr.get(user_id, cooldown.id).await,
        Err(ExclusionError::NotFound(_))
    ));

    cleanup_user(&pool, user_id).await;
}

#[tokio::test]
async fn test_duplicate_cooldown_rejected() {
    let Some((mgr, pool)) = setup().await else { return };
    let user_id = unique_user();

    mgr.create(user_id, cooldown_request(PlatformType::Casino))
        .await
        .expect("First cooldown should succeed");
    let err = mgr
        .create(user_id, cooldown_request(PlatformType::Casino))
        .await
        .expect_err("Second cooldown on the same segment must be rejected");
    assert!(matches!(err, ExclusionError::Conflict(_)));

    // A different segment is a different scope.
    mgr.create(user_id, cooldown_request(PlatformType::Sports))
        .await
        .expect("Sports cooldown is a distinct scope");

    cleanup_user(&pool, user_id).await;
}

#[tokio::test]
async fn test_extension_rejected_while_cooldown_active() {
    let Some((mgr, pool)) = setup().await else { return };
    let user_id = unique_user();

    let cooldown = mgr
        .create(user_id, cooldown_request(PlatformType::Platform))
        .await
        .expect("Cooldown creation should succeed");

    let err = mgr
        .extend(user_id, cooldown.id, PlatformType::Platform, Some(30))
        .await
        .expect_err("Extension before the window opens must fail");
    assert!(matches!(err, ExclusionError::CooldownStillActive));

    cleanup_user(&pool, user_id).await;
}

#[tokio::test]
async fn test_extension_during_window_upgrades() {
    let Some((mgr, pool)) = setup().await else { return };
    let user_id = unique_user();

    let cooldown = mgr
        .create(user_id, cooldown_request(PlatformType::Platform))
        .await
        .expect("Cooldown creation should succeed");

    // Backdate the cooldown so its end has passed but the window is open.
    sqlx::query(
        "UPDATE self_exclusions
         SET start_date = NOW() - INTERVAL '25 hours',
             end_date = NOW() - INTERVAL '1 hour'
         WHERE id = $1",
    )
    .bind(cooldown.id)
    .execute(pool.as_ref())
    .await
    .expect("Backdate should succeed");

    let active = mgr
        .has_active_self_exclusion(user_id, None)
        .await
        .expect("Lookup should succeed")
        .expect("Window should apply");
    assert_eq!(active.state, AccessState::PostCooldownWindow);

    let upgraded = mgr
        .extend(user_id, cooldown.id, PlatformType::Platform, None)
        .await
        .expect("Upgrade during the window should succeed");
    assert_eq!(upgraded.exclusion_type, ExclusionType::Permanent);
    assert!(upgraded.end_date.is_none());

    // The cooldown row was replaced.
    assert!(matches!(
        mgr.get(user_id, cooldown.id).await,
        Err(ExclusionError::NotFound(_))
    ));

    cleanup_user(&pool, user_id).await;
}

#[tokio::test]
async fn test_extension_after_window_rejected() {
    let Some((mgr, pool)) = setup().await else { return };
    let user_id = unique_user();

    let cooldown = mgr
        .create(user_id, cooldown_request(PlatformType::Platform))
        .await
        .expect("Cooldown creation should succeed");

    sqlx::query(
        "UPDATE self_exclusions
         SET start_date = NOW() - INTERVAL '80 hours',
             end_date = NOW() - INTERVAL '56 hours'
         WHERE id = $1",
    )
    .bind(cooldown.id)
    .execute(pool.as_ref())
    .await
    .expect("Backdate should succeed");

    let err = mgr
        .extend(user_id, cooldown.id, PlatformType::Platform, Some(30))
        .await
        .expect_err("Extension after the window must fail");
    assert!(matches!(err, ExclusionError::WindowExpired));

    cleanup_user(&pool, user_id).await;
}

#[tokio::test]
async fn test_limit_removal_countdown_and_reversal() {
    let Some((mgr, pool)) = setup().await else { return };
    let user_id = unique_user();

    let limit = mgr
        .create(
            user_id,
            CreateExclusionRequest {
                exclusion_type: ExclusionType::DepositLimit,
                platform_type: PlatformType::Platform,
                duration_days: None,
                period: Some(LimitPeriod::Monthly),
                limit_amount: Some(5_000),
            },
        )
        .await
        .expect("Limit creation should succeed");

    let first = mgr
        .cancel(user_id, limit.id)
        .await
        .expect("Cancellation should start the countdown");
    let CancelOutcome::RemovalPending { removal_due } = first else {
        panic!("limits must enter a removal countdown, got {first:?}");
    };

    // Repeating the request is idempotent: same deadline.
    let second = mgr
        .cancel(user_id, limit.id)
        .await
        .expect("Repeat should succeed");
    assert_eq!(second, CancelOutcome::RemovalPending { removal_due });

    // The limit stays enforced while the countdown runs.
    let active = mgr
        .get_active_self_exclusions(user_id)
        .await
        .expect("Lookup should succeed");
    assert!(active.iter().any(|r| r.id == limit.id));

    let kept = mgr
        .revoke_removal(user_id, limit.id)
        .await
        .expect("Reversal should succeed");
    assert!(kept.removal_requested_at.is_none());

    cleanup_user(&pool, user_id).await;
}

#[tokio::test]
async fn test_permanent_exclusion_not_cancellable() {
    let Some((mgr, pool)) = setup().await else { return };
    let user_id = unique_user();

    let perm = mgr
        .create(
            user_id,
            CreateExclusionRequest {
                exclusion_type: ExclusionType::Permanent,
                platform_type: PlatformType::Platform,
                duration_days: None,
                period: None,
                limit_amount: None,
            },
        )
        .await
        .expect("Permanent exclusion should succeed");

    let err = mgr
        .cancel(user_id, perm.id)
        .await
        .expect_err("Permanent exclusions cannot be cancelled");
    assert!(matches!(
        err,
        ExclusionError::NotCancellable(ExclusionType::Permanent)
    ));

    cleanup_user(&pool, user_id).await;
}

#[tokio::test]
async fn test_limit_summary_reports_headroom() {
    let Some((mgr, pool)) = setup().await else { return };
    let user_id = unique_user();

    mgr.create(
        user_id,
        CreateExclusionRequest {
            exclusion_type: ExclusionType::WagerLimit,
            platform_type: PlatformType::Platform,
            duration_days: None,
            period: Some(LimitPeriod::Daily),
            limit_amount: Some(200),
        },
    )
    .await
    .expect("Limit creation should succeed");

    // Accumulate 60 wagered today.
    bankroll::limits::LimitEvaluator::record(
        pool.as_ref(),
        user_id,
        PlatformType::Casino,
        bankroll::limits::StatField::Wagered,
        60,
    )
    .await
    .expect("Stats accumulation should succeed");

    let summary = mgr
        .gambling_limit_summary(user_id, None)
        .await
        .expect("Summary should succeed");
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].limit_amount, 200);
    assert_eq!(summary[0].used, 60);
    assert_eq!(summary[0].remaining, 140);

    cleanup_user(&pool, user_id).await;
}

#[tokio::test]
async fn test_invalid_limit_requests_rejected() {
    let Some((mgr, pool)) = setup().await else { return };
    let user_id = unique_user();

    // Missing period.
    let err = mgr
        .create(
            user_id,
            CreateExclusionRequest {
                exclusion_type: ExclusionType::LossLimit,
                platform_type: PlatformType::Casino,
                duration_days: None,
                period: None,
                limit_amount: Some(100),
            },
        )
        .await
        .expect_err("Missing period must be rejected");
    assert!(matches!(err, ExclusionError::InvalidRequest(_)));

    // Non-positive amount.
    let err = mgr
        .create(
            user_id,
            CreateExclusionRequest {
                exclusion_type: ExclusionType::LossLimit,
                platform_type: PlatformType::Casino,
                duration_days: None,
                period: Some(LimitPeriod::Daily),
                limit_amount: Some(0),
            },
        )
        .await
        .expect_err("Zero amount must be rejected");
    assert!(matches!(err, ExclusionError::InvalidRequest(_)));

    // Temporary without a duration.
    let err = mgr
        .create(
            user_id,
            CreateExclusionRequest {
                exclusion_type: ExclusionType::Temporary,
                platform_type: PlatformType::Casino,
                duration_days: None,
                period: None,
                limit_amount: None,
            },
        )
        .await
        .expect_err("Temporary without duration must be rejected");
    assert!(matches!(err, ExclusionError::InvalidRequest(_)));

    cleanup_user(&pool, user_id).await;
}

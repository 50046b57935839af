//! Self-exclusion manager implementation.
//!
//! All uniqueness rules ("one active wager limit per user", "one access
//! exclusion per segment", ...) are enforced by partial unique indexes;
//! the unique-constraint violation raced at commit time is translated
//! into [`ExclusionError::Conflict`] so concurrent duplicate creations
//! yield exactly one persisted row.

use super::errors::{ExclusionError, ExclusionResult};
use super::models::{
    ActiveExclusion, COOLDOWN_HOURS, ExclusionType, LimitPeriod, PlatformType,
    REMOVAL_GRACE_HOURS, SelfExclusion, most_restrictive,
};
use crate::db::is_unique_violation;
use crate::limits::{LimitEvaluator, LimitHeadroom};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;

/// Request to create a self-exclusion or spending limit
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExclusionRequest {
    pub exclusion_type: ExclusionType,
    pub platform_type: PlatformType,
    /// Temporary exclusions only
    pub duration_days: Option<i64>,
    /// Limit types only
    pub period: Option<LimitPeriod>,
    /// Limit types only, in minor units
    pub limit_amount: Option<i64>,
}

/// Result of a cancellation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Cooldowns are deleted immediately, with no grace period
    Deleted,
    /// Limits stay enforced until the grace countdown elapses
    RemovalPending { removal_due: DateTime<Utc> },
}

/// Self-exclusion manager
#[derive(Clone)]
pub struct ExclusionManager {
    pool: Arc<PgPool>,
    limits: LimitEvaluator,
}

impl ExclusionManager {
    /// Create a new exclusion manager
    pub fn new(pool: Arc<PgPool>) -> Self {
        let limits = LimitEvaluator::new(pool.clone());
        Self { pool, limits }
    }

    /// Create a new exclusion or limit for a user.
    ///
    /// # Errors
    ///
    /// * `ExclusionError::InvalidRequest` - missing or non-positive fields
    /// * `ExclusionError::Conflict` - an equivalent record is already active
    pub async fn create(
        &self,
        user_id: i64,
        req: CreateExclusionRequest,
    ) -> ExclusionResult<SelfExclusion> {
        let now = Utc::now();
        let end_date = match req.exclusion_type {
            ExclusionType::Cooldown => Some(now + Duration::hours(COOLDOWN_HOURS)),
            ExclusionType::Temporary => {
                let days = req.duration_days.ok_or_else(|| {
                    ExclusionError::InvalidRequest(
                        "durationDays is required for a temporary exclusion".to_string(),
                    )
                })?;
                if days <= 0 {
                    return Err(ExclusionError::InvalidRequest(
                        "durationDays must be positive".to_string(),
                    ));
                }
                Some(now + Duration::days(days))
            }
            ExclusionType::Permanent => None,
            _ => {
                // Limit types: open-ended, removed only via the countdown.
                if req.period.is_none() {
                    return Err(ExclusionError::InvalidRequest(
                        "period is required for a spending limit".to_string(),
                    ));
                }
                match req.limit_amount {
                    Some(amount) if amount > 0 => {}
                    _ => {
                        return Err(ExclusionError::InvalidRequest(
                            "limitAmount must be positive".to_string(),
                        ));
                    }
                }
                None
            }
        };

        let period = req.exclusion_type.is_limit().then_some(req.period).flatten();
        let limit_amount = req.exclusion_type.is_limit().then_some(req.limit_amount).flatten();

        let row = sqlx::query(
            "INSERT INTO self_exclusions
                 (user_id, exclusion_type, platform_type, period, limit_amount,
                  start_date, end_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(user_id)
        .bind(req.exclusion_type.as_str())
        .bind(req.platform_type.as_str())
        .bind(period.map(|p| p.as_str()))
        .bind(limit_amount)
        .bind(now)
        .bind(end_date)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                ExclusionError::Conflict(format!(
                    "an active {} already exists for this scope",
                    req.exclusion_type.label().to_lowercase()
                ))
            } else {
                ExclusionError::Database(err)
            }
        })?;

        row_to_exclusion(&row)
    }

    /// Fetch one exclusion owned by the user
    pub async fn get(&self, user_id: i64, id: i64) -> ExclusionResult<SelfExclusion> {
        let row = sqlx::query("SELECT * FROM self_exclusions WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(ExclusionError::NotFound(id))?;
        row_to_exclusion(&row)
    }

    /// Every exclusion and limit record for the user, newest first
    pub async fn list(&self, user_id: i64) -> ExclusionResult<Vec<SelfExclusion>> {
        let rows = sqlx::query(
            "SELECT * FROM self_exclusions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.iter().map(row_to_exclusion).collect()
    }

    /// Records that currently apply: access states in force plus limits
    /// still enforced (including those with a removal countdown running)
    pub async fn get_active_self_exclusions(
        &self,
        user_id: i64,
    ) -> ExclusionResult<Vec<SelfExclusion>> {
        let now = Utc::now();
        let all = self.active_rows(user_id).await?;
        Ok(all
            .into_iter()
            .filter(|r| {
                r.exclusion_type.is_limit() || r.access_state(now).is_some()
            })
            .collect())
    }

    /// The single most restrictive access-state exclusion applicable to the
    /// segment right now, or `None` if the user is unrestricted.
    ///
    /// A platform-wide exclusion always applies in addition to any
    /// segment-specific one.
    pub async fn has_active_self_exclusion(
        &self,
        user_id: i64,
        segment: Option<PlatformType>,
    ) -> ExclusionResult<Option<ActiveExclusion>> {
        let now = Utc::now();
        let records = self.active_rows(user_id).await?;
        Ok(most_restrictive(&records, segment, now))
    }

    /// Active limit records of the given types that are scoped to the
    /// segment (or platform-wide). Limits under a removal countdown are
    /// still enforced and therefore included.
    pub async fn active_limits(
        &self,
        user_id: i64,
        types: &[ExclusionType],
        segment: PlatformType,
    ) -> ExclusionResult<Vec<SelfExclusion>> {
        let records = self.active_rows(user_id).await?;
        Ok(records
            .into_iter()
            .filter(|r| types.contains(&r.exclusion_type))
            .filter(|r| r.applies_to(Some(segment)))
            .collect())
    }

    /// Cancel an exclusion.
    ///
    /// Cooldowns are deleted immediately. Limits enter a 24h removal
    /// countdown during which they stay enforced; repeating the request is
    /// idempotent and returns the original deadline. Temporary and
    /// permanent exclusions cannot be cancelled by the user.
    pub async fn cancel(&self, user_id: i64, id: i64) -> ExclusionResult<CancelOutcome> {
        let record = self.get(user_id, id).await?;

        match record.exclusion_type {
            ExclusionType::Cooldown => {
                sqlx::query("DELETE FROM self_exclusions WHERE id = $1 AND user_id = $2")
                    .bind(id)
                    .bind(user_id)
                    .execute(self.pool.as_ref())
                    .await?;
                log::info!("user {user_id} cancelled cooldown {id}");
                Ok(CancelOutcome::Deleted)
            }
            t if t.is_limit() => {
                if let Some(requested_at) = record.removal_requested_at {
                    return Ok(CancelOutcome::RemovalPending {
                        removal_due: requested_at + Duration::hours(REMOVAL_GRACE_HOURS),
                    });
                }
                let requested_at = Utc::now();
                sqlx::query(
                    "UPDATE self_exclusions SET removal_requested_at = $1
                     WHERE id = $2 AND user_id = $3 AND removal_requested_at IS NULL",
                )
                .bind(requested_at)
                .bind(id)
                .bind(user_id)
                .execute(self.pool.as_ref())
                .await?;
                log::info!("user {user_id} requested removal of limit {id}");
                Ok(CancelOutcome::RemovalPending {
                    removal_due: requested_at + Duration::hours(REMOVAL_GRACE_HOURS),
                })
            }
            t => Err(ExclusionError::NotCancellable(t)),
        }
    }

    /// Reverse a pending limit removal before the countdown elapses.
    pub async fn revoke_removal(&self, user_id: i64, id: i64) -> ExclusionResult<SelfExclusion> {
        let record = self.get(user_id, id).await?;
        if !record.exclusion_type.is_limit() {
            return Err(ExclusionError::InvalidRequest(
                "only spending limits have a removal countdown".to_string(),
            ));
        }
        if record.removal_requested_at.is_none() {
            return Err(ExclusionError::InvalidRequest(
                "no removal is pending for this limit".to_string(),
            ));
        }

        let row = sqlx::query(
            "UPDATE self_exclusions SET removal_requested_at = NULL
             WHERE id = $1 AND user_id = $2
             RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(self.pool.as_ref())
        .await?;
        log::info!("user {user_id} kept limit {id}, removal reversed");
        row_to_exclusion(&row)
    }

    /// Upgrade a cooldown to a temporary or permanent exclusion during its
    /// post-cooldown window. Omitting `duration_days` yields a permanent
    /// exclusion. The cooldown row is deleted and replaced atomically.
    ///
    /// # Errors
    ///
    /// * `ExclusionError::CooldownStillActive` - the cooldown has not ended
    /// * `ExclusionError::WindowExpired` - the grace window has closed
    pub async fn extend(
        &self,
        user_id: i64,
        cooldown_id: i64,
        platform_type: PlatformType,
        duration_days: Option<i64>,
    ) -> ExclusionResult<SelfExclusion> {
        let now = Utc::now();
        let record = self.get(user_id, cooldown_id).await?;

        if record.exclusion_type != ExclusionType::Cooldown {
            return Err(ExclusionError::InvalidRequest(
                "only a cooldown can be extended".to_string(),
            ));
        }
        match record.access_state(now) {
            Some(super::models::AccessState::PostCooldownWindow) => {}
            Some(super::models::AccessState::Cooldown) => {
                return Err(ExclusionError::CooldownStillActive);
            }
            _ => return Err(ExclusionError::WindowExpired),
        }

        let (new_type, end_date) = match duration_days {
            Some(days) if days > 0 => (
                ExclusionType::Temporary,
                Some(now + Duration::days(days)),
            ),
            Some(_) => {
                return Err(ExclusionError::InvalidRequest(
                    "durationDays must be positive".to_string(),
                ));
            }
            None => (ExclusionType::Permanent, None),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM self_exclusions WHERE id = $1 AND user_id = $2")
            .bind(cooldown_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            "INSERT INTO self_exclusions
                 (user_id, exclusion_type, platform_type, start_date, end_date)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(user_id)
        .bind(new_type.as_str())
        .bind(platform_type.as_str())
        .bind(now)
        .bind(end_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                ExclusionError::Conflict(format!(
                    "an active {} already exists for this scope",
                    new_type.label().to_lowercase()
                ))
            } else {
                ExclusionError::Database(err)
            }
        })?;

        let exclusion = row_to_exclusion(&row)?;
        tx.commit().await?;
        log::info!(
            "user {user_id} upgraded cooldown {cooldown_id} to {} on {platform_type}",
            new_type
        );
        Ok(exclusion)
    }

    /// Remaining headroom for every active spending limit of the user.
    pub async fn gambling_limit_summary(
        &self,
        user_id: i64,
        session_start: Option<DateTime<Utc>>,
    ) -> ExclusionResult<Vec<LimitHeadroom>> {
        let now = Utc::now();
        let records = self.active_rows(user_id).await?;
        let mut summary = Vec::new();
        for record in records.iter().filter(|r| r.exclusion_type.is_limit()) {
            if let Some(headroom) = self.limits.remaining(record, now, session_start).await? {
                summary.push(headroom);
            }
        }
        Ok(summary)
    }

    /// The limit evaluator sharing this manager's pool
    pub fn limits(&self) -> &LimitEvaluator {
        &self.limits
    }

    async fn active_rows(&self, user_id: i64) -> ExclusionResult<Vec<SelfExclusion>> {
        let rows = sqlx::query(
            "SELECT * FROM self_exclusions WHERE user_id = $1 AND is_active",
        )
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.iter().map(row_to_exclusion).collect()
    }
}

/// Decode a `self_exclusions` row into the typed model.
fn row_to_exclusion(row: &PgRow) -> ExclusionResult<SelfExclusion> {
    let type_str: String = row.try_get("exclusion_type")?;
    let platform_str: String = row.try_get("platform_type")?;
    let period_str: Option<String> = row.try_get("period")?;

    let exclusion_type = ExclusionType::parse(&type_str)
        .ok_or_else(|| ExclusionError::InvalidRecord(format!("exclusion_type '{type_str}'")))?;
    let platform_type = PlatformType::parse(&platform_str)
        .ok_or_else(|| ExclusionError::InvalidRecord(format!("platform_type '{platform_str}'")))?;
    let period = match period_str {
        Some(p) => Some(
            LimitPeriod::parse(&p)
                .ok_or_else(|| ExclusionError::InvalidRecord(format!("period '{p}'")))?,
        ),
        None => None,
    };

    Ok(SelfExclusion {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        exclusion_type,
        platform_type,
        period,
        limit_amount: row.try_get("limit_amount")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        is_active: row.try_get("is_active")?,
        removal_requested_at: row.try_get("removal_requested_at")?,
        post_cooldown_window_end: row.try_get("post_cooldown_window_end")?,
        created_at: row.try_get("created_at")?,
    })
}

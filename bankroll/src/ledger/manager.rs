//! Ledger manager implementation.
//!
//! Every mutation runs under a distributed lock on the (user, asset)
//! balance and inside one database transaction, so the gating checks,
//! the balance write, the operation record, and the stats accumulation
//! commit or roll back together.

use super::errors::{LedgerError, LedgerResult};
use super::models::{
    Balance, BalanceOperation, OperationKind, OperationOutcome, OperationStatus,
    UpdateBalanceRequest, next_balance,
};
use crate::db::is_unique_violation;
use crate::exclusion::ExclusionManager;
use crate::limits::LimitEvaluator;
use crate::lock::{AcquireOptions, LockManager};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default lock TTL; generous against transaction stalls, short enough
/// that a crashed worker frees the balance quickly
const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(5);

/// Ledger manager
#[derive(Clone)]
pub struct LedgerManager {
    pool: Arc<PgPool>,
    locks: LockManager,
    exclusions: ExclusionManager,
    limits: LimitEvaluator,
    lock_ttl: Duration,
    acquire: AcquireOptions,
}

impl LedgerManager {
    /// Create a new ledger manager
    pub fn new(pool: Arc<PgPool>, locks: LockManager) -> Self {
        let exclusions = ExclusionManager::new(pool.clone());
        let limits = LimitEvaluator::new(pool.clone());
        Self {
            pool,
            locks,
            exclusions,
            limits,
            lock_ttl: DEFAULT_LOCK_TTL,
            acquire: AcquireOptions::default(),
        }
    }

    /// Override the lock TTL and acquisition retry policy
    pub fn with_lock_settings(mut self, ttl: Duration, acquire: AcquireOptions) -> Self {
        self.lock_ttl = ttl;
        self.acquire = acquire;
        self
    }

    /// The exclusion manager sharing this ledger's pool
    pub fn exclusions(&self) -> &ExclusionManager {
        &self.exclusions
    }

    /// Apply a balance mutation.
    ///
    /// Retries with the same `operation_id` replay the stored result
    /// instead of applying twice, regardless of which worker handles the
    /// retry. Bets and deposits are gated on access exclusions and
    /// spending limits; withdrawals and wins never are.
    ///
    /// # Errors
    ///
    /// * `LedgerError::SelfExclusionActive` - an access exclusion blocks it
    /// * `LedgerError::LimitExceeded` - a spending limit has no headroom
    /// * `LedgerError::InsufficientBalance` - debit would overdraw
    /// * `LedgerError::Lock` - the balance lock could not be acquired
    pub async fn update_balance(
        &self,
        req: UpdateBalanceRequest,
    ) -> LedgerResult<OperationOutcome> {
        if req.amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }

        // Durable pre-check before taking the lock: a replayed retry
        // should not contend on the balance at all.
        if let Some(stored) = self.find_operation(req.operation_id).await? {
            log::debug!(
                "operation {} already applied, replaying stored result",
                req.operation_id
            );
            return Ok(replay(&stored));
        }

        let resource = format!("balance:{}:{}", req.user_id, req.asset);
        self.locks
            .with_lock(&resource, self.lock_ttl, &self.acquire, || {
                self.apply_locked(&req)
            })
            .await
    }

    /// Get a user's balance in one asset; zero if no row exists yet
    pub async fn get_balance(&self, user_id: i64, asset: &str) -> LedgerResult<Balance> {
        let row = sqlx::query(
            "SELECT user_id, asset, balance, updated_at
             FROM balances
             WHERE user_id = $1 AND asset = $2",
        )
        .bind(user_id)
        .bind(asset)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(match row {
            Some(row) => row_to_balance(&row)?,
            None => Balance {
                user_id,
                asset: asset.to_string(),
                balance: 0,
                updated_at: chrono::Utc::now(),
            },
        })
    }

    /// Get every asset balance a user holds
    pub async fn get_balances(&self, user_id: i64) -> LedgerResult<Vec<Balance>> {
        let rows = sqlx::query(
            "SELECT user_id, asset, balance, updated_at
             FROM balances
             WHERE user_id = $1
             ORDER BY asset",
        )
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(row_to_balance).collect()
    }

    /// Get a user's operation history, newest first
    pub async fn get_operations(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> LedgerResult<Vec<BalanceOperation>> {
        let rows = sqlx::query(
            "SELECT * FROM balance_operations
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(row_to_operation).collect()
    }

    /// The full mutation path, run while holding the balance lock.
    async fn apply_locked(&self, req: &UpdateBalanceRequest) -> LedgerResult<OperationOutcome> {
        // Re-check under the lock: a racing retry may have committed
        // between the pre-check and acquisition.
        if let Some(stored) = self.find_operation(req.operation_id).await? {
            return Ok(replay(&stored));
        }

        if req.kind.checks_exclusion() {
            if let Some(active) = self
                .exclusions
                .has_active_self_exclusion(req.user_id, Some(req.platform))
                .await?
            {
                log::info!(
                    "user {} blocked by {:?} exclusion on {} for {}",
                    req.user_id,
                    active.state,
                    req.platform,
                    req.kind
                );
                return Err(LedgerError::SelfExclusionActive(active.state));
            }
        }

        self.check_limits(req).await?;

        let mut tx = self.pool.begin().await?;

        // Materialize the balance row so the FOR UPDATE lock has
        // something to grab on a user's first operation.
        sqlx::query(
            "INSERT INTO balances (user_id, asset, balance)
             VALUES ($1, $2, 0)
             ON CONFLICT (user_id, asset) DO NOTHING",
        )
        .bind(req.user_id)
        .bind(&req.asset)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            "SELECT balance FROM balances WHERE user_id = $1 AND asset = $2 FOR UPDATE",
        )
        .bind(req.user_id)
        .bind(&req.asset)
        .fetch_one(&mut *tx)
        .await?;
        let current: i64 = row.try_get("balance")?;

        let updated = next_balance(current, req.kind, req.amount)?;

        sqlx::query(
            "UPDATE balances SET balance = $1, updated_at = NOW()
             WHERE user_id = $2 AND asset = $3",
        )
        .bind(updated)
        .bind(req.user_id)
        .bind(&req.asset)
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            "INSERT INTO balance_operations
                 (operation_id, user_id, asset, kind, amount, balance_after,
                  status, platform_type, description)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(req.operation_id)
        .bind(req.user_id)
        .bind(&req.asset)
        .bind(req.kind.as_str())
        .bind(req.amount)
        .bind(updated)
        .bind(OperationStatus::Completed.as_str())
        .bind(req.platform.as_str())
        .bind(&req.description)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            drop(tx);
            if is_unique_violation(&err) {
                // Lost the idempotency race to another worker; surface
                // the stored result instead of a constraint error.
                let stored = self
                    .find_operation(req.operation_id)
                    .await?
                    .ok_or(LedgerError::Database(err))?;
                return Ok(replay(&stored));
            }
            return Err(err.into());
        }

        if let Some(field) = req.kind.records_metric() {
            LimitEvaluator::record(&mut *tx, req.user_id, req.platform, field, req.amount)
                .await?;
        }

        tx.commit().await?;

        log::info!(
            "applied {} of {} {} for user {} (operation {})",
            req.kind,
            req.amount,
            req.asset,
            req.user_id,
            req.operation_id
        );

        Ok(OperationOutcome {
            operation_id: req.operation_id,
            balance: updated,
            status: OperationStatus::Completed,
            duplicate: false,
        })
    }

    /// Reject the request if any gated limit lacks headroom for it.
    async fn check_limits(&self, req: &UpdateBalanceRequest) -> LedgerResult<()> {
        let gated = req.kind.gated_limits();
        if gated.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now();
        let limits = self
            .exclusions
            .active_limits(req.user_id, gated, req.platform)
            .await?;

        for limit in &limits {
            let Some(headroom) = self.limits.remaining(limit, now, None).await? else {
                continue;
            };
            if req.amount > headroom.remaining {
                log::info!(
                    "user {} hit {} ({} remaining, {} requested)",
                    req.user_id,
                    headroom.exclusion_type.label(),
                    headroom.remaining,
                    req.amount
                );
                return Err(LedgerError::LimitExceeded {
                    exclusion_type: headroom.exclusion_type,
                    period: headroom.period,
                    platform_type: headroom.platform_type,
                });
            }
        }

        Ok(())
    }

    async fn find_operation(
        &self,
        operation_id: Uuid,
    ) -> LedgerResult<Option<BalanceOperation>> {
        let row = sqlx::query("SELECT * FROM balance_operations WHERE operation_id = $1")
            .bind(operation_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        row.as_ref().map(row_to_operation).transpose()
    }
}

fn replay(stored: &BalanceOperation) -> OperationOutcome {
    OperationOutcome {
        operation_id: stored.operation_id,
        balance: stored.balance_after,
        status: stored.status,
        duplicate: true,
    }
}

fn row_to_balance(row: &PgRow) -> LedgerResult<Balance> {
    Ok(Balance {
        user_id: row.try_get("user_id")?,
        asset: row.try_get("asset")?,
        balance: row.try_get("balance")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_operation(row: &PgRow) -> LedgerResult<BalanceOperation> {
    let kind_str: String = row.try_get("kind")?;
    let platform_str: String = row.try_get("platform_type")?;
    let status_str: String = row.try_get("status")?;

    let kind = OperationKind::parse(&kind_str).ok_or_else(|| {
        LedgerError::Database(sqlx::Error::Decode(
            format!("unknown operation kind '{kind_str}'").into(),
        ))
    })?;
    let platform_type =
        crate::exclusion::PlatformType::parse(&platform_str).ok_or_else(|| {
            LedgerError::Database(sqlx::Error::Decode(
                format!("unknown platform type '{platform_str}'").into(),
            ))
        })?;
    let status = OperationStatus::parse(&status_str).ok_or_else(|| {
        LedgerError::Database(sqlx::Error::Decode(
            format!("unknown operation status '{status_str}'").into(),
        ))
    })?;

    Ok(BalanceOperation {
        id: row.try_get("id")?,
        operation_id: row.try_get("operation_id")?,
        user_id: row.try_get("user_id")?,
        asset: row.try_get("asset")?,
        kind,
        amount: row.try_get("amount")?,
        balance_after: row.try_get("balance_after")?,
        status,
        platform_type,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

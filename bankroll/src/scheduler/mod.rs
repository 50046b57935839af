//! Expiry scheduler for time-driven exclusion transitions.
//!
//! Every statement is a conditional UPDATE or DELETE that only touches
//! rows whose deadline has passed, so concurrent sweeps from multiple
//! workers are safe without coordination; running the sweep twice in a
//! row changes nothing the second time.

use crate::exclusion::models::{POST_COOLDOWN_WINDOW_HOURS, REMOVAL_GRACE_HOURS};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Default interval between sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Row counts from one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepCounts {
    /// Cooldowns whose end passed and got their window stamped
    pub windows_stamped: u64,
    /// Cooldowns deleted after their window closed
    pub cooldowns_expired: u64,
    /// Temporary exclusions deleted after their end date
    pub temporaries_expired: u64,
    /// Limits deleted after their removal countdown elapsed
    pub limits_removed: u64,
}

impl SweepCounts {
    pub fn total(&self) -> u64 {
        self.windows_stamped
            + self.cooldowns_expired
            + self.temporaries_expired
            + self.limits_removed
    }
}

/// Expiry sweep over the self-exclusion table
#[derive(Clone)]
pub struct ExpirySweep {
    pool: Arc<PgPool>,
}

impl ExpirySweep {
    /// Create a new sweep
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Run one sweep pass
    pub async fn run_once(&self) -> Result<SweepCounts, sqlx::Error> {
        let mut counts = SweepCounts::default();

        // Stamp the post-cooldown window on cooldowns whose end passed.
        counts.windows_stamped = sqlx::query(&format!(
            "UPDATE self_exclusions
             SET post_cooldown_window_end = end_date + INTERVAL '{POST_COOLDOWN_WINDOW_HOURS} hours'
             WHERE exclusion_type = 'cooldown'
               AND end_date < NOW()
               AND post_cooldown_window_end IS NULL"
        ))
        .execute(self.pool.as_ref())
        .await?
        .rows_affected();

        // Drop cooldowns whose window has closed without an upgrade.
        counts.cooldowns_expired = sqlx::query(
            "DELETE FROM self_exclusions
             WHERE exclusion_type = 'cooldown'
               AND post_cooldown_window_end < NOW()",
        )
        .execute(self.pool.as_ref())
        .await?
        .rows_affected();

        // Drop temporary exclusions past their end date.
        counts.temporaries_expired = sqlx::query(
            "DELETE FROM self_exclusions
             WHERE exclusion_type = 'temporary'
               AND end_date < NOW()",
        )
        .execute(self.pool.as_ref())
        .await?
        .rows_affected();

        // Drop limits whose removal countdown has elapsed.
        counts.limits_removed = sqlx::query(&format!(
            "DELETE FROM self_exclusions
             WHERE exclusion_type IN ('deposit_limit', 'loss_limit', 'wager_limit')
               AND removal_requested_at < NOW() - INTERVAL '{REMOVAL_GRACE_HOURS} hours'"
        ))
        .execute(self.pool.as_ref())
        .await?
        .rows_affected();

        if counts.total() > 0 {
            log::info!(
                "expiry sweep: {} windows stamped, {} cooldowns expired, {} temporaries expired, {} limits removed",
                counts.windows_stamped,
                counts.cooldowns_expired,
                counts.temporaries_expired,
                counts.limits_removed,
            );
        }

        Ok(counts)
    }

    /// Spawn the sweep as a background task running every `interval`.
    pub fn spawn(self, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = self.run_once().await {
                    log::error!("expiry sweep failed: {err}");
                }
            }
        })
    }
}

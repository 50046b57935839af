//! Periodic limit evaluation over daily gambling stats.
//!
//! One stats row accumulates per (user, date, platform segment) in integer
//! minor units. The evaluator sums the rows inside a period's current
//! window and subtracts the total from the configured limit. Loss is
//! always recomputed as `max(wagered - won, 0)`, so a win restores
//! headroom instead of loss being decremented independently.

use crate::exclusion::models::{ExclusionType, LimitPeriod, PlatformType, SelfExclusion};
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool, Row};
use std::sync::Arc;

/// Accumulated totals for one user, day, and platform segment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyGamblingStats {
    pub user_id: i64,
    pub stat_date: NaiveDate,
    pub platform_type: PlatformType,
    pub wagered: i64,
    pub won: i64,
    pub deposited: i64,
    pub updated_at: DateTime<Utc>,
}

/// Stats column a successful operation accumulates into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatField {
    Wagered,
    Won,
    Deposited,
}

/// Metric a limit is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitMetric {
    Wager,
    Loss,
    Deposit,
}

impl LimitMetric {
    /// The metric gated by a limit type; `None` for access exclusions.
    pub fn for_limit(exclusion_type: ExclusionType) -> Option<Self> {
        match exclusion_type {
            ExclusionType::WagerLimit => Some(LimitMetric::Wager),
            ExclusionType::LossLimit => Some(LimitMetric::Loss),
            ExclusionType::DepositLimit => Some(LimitMetric::Deposit),
            _ => None,
        }
    }
}

/// Remaining headroom against one configured limit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitHeadroom {
    pub limit_id: i64,
    pub exclusion_type: ExclusionType,
    pub platform_type: PlatformType,
    pub period: LimitPeriod,
    pub limit_amount: i64,
    /// Period total of the gated metric
    pub used: i64,
    pub remaining: i64,
    pub is_removal_pending: bool,
}

/// Inclusive date range of the period's current window.
///
/// Sessions are tracked by the auth layer; when no session start is
/// supplied the session window degrades to the start of the current UTC
/// day.
pub fn period_window(
    period: LimitPeriod,
    now: DateTime<Utc>,
    session_start: Option<DateTime<Utc>>,
) -> (NaiveDate, NaiveDate) {
    let today = now.date_naive();
    let start = match period {
        LimitPeriod::Daily => today,
        LimitPeriod::Weekly => today.week(Weekday::Mon).first_day(),
        LimitPeriod::Monthly => today.with_day(1).unwrap_or(today),
        LimitPeriod::HalfYear => {
            let month = if today.month() <= 6 { 1 } else { 7 };
            NaiveDate::from_ymd_opt(today.year(), month, 1).unwrap_or(today)
        }
        LimitPeriod::Session => session_start.map(|s| s.date_naive()).unwrap_or(today),
    };
    (start, today)
}

/// Periodic limit evaluator
#[derive(Clone)]
pub struct LimitEvaluator {
    pool: Arc<PgPool>,
}

impl LimitEvaluator {
    /// Create a new evaluator
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Accumulate `amount` into today's stats row for the user and segment.
    ///
    /// Runs on any executor so the ledger can call it inside the same
    /// transaction that applies the balance mutation.
    pub async fn record<'e, E>(
        executor: E,
        user_id: i64,
        platform_type: PlatformType,
        field: StatField,
        amount: i64,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (wagered, won, deposited) = match field {
            StatField::Wagered => (amount, 0, 0),
            StatField::Won => (0, amount, 0),
            StatField::Deposited => (0, 0, amount),
        };

        sqlx::query(
            "INSERT INTO daily_gambling_stats
                 (user_id, stat_date, platform_type, wagered, won, deposited)
             VALUES ($1, CURRENT_DATE, $2, $3, $4, $5)
             ON CONFLICT (user_id, stat_date, platform_type)
             DO UPDATE SET
                 wagered = daily_gambling_stats.wagered + EXCLUDED.wagered,
                 won = daily_gambling_stats.won + EXCLUDED.won,
                 deposited = daily_gambling_stats.deposited + EXCLUDED.deposited,
                 updated_at = NOW()",
        )
        .bind(user_id)
        .bind(platform_type.as_str())
        .bind(wagered)
        .bind(won)
        .bind(deposited)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Sum the metric over a date window, scoped to a platform segment.
    ///
    /// A platform-wide limit aggregates every segment's rows; a
    /// segment-scoped limit only its own.
    pub async fn period_total(
        &self,
        user_id: i64,
        platform_type: PlatformType,
        metric: LimitMetric,
        window: (NaiveDate, NaiveDate),
    ) -> Result<i64, sqlx::Error> {
        let expr = match metric {
            LimitMetric::Wager => "COALESCE(SUM(wagered), 0)",
            LimitMetric::Loss => "GREATEST(COALESCE(SUM(wagered), 0) - COALESCE(SUM(won), 0), 0)",
            LimitMetric::Deposit => "COALESCE(SUM(deposited), 0)",
        };

        let row = if platform_type == PlatformType::Platform {
            sqlx::query(&format!(
                "SELECT {expr} AS total FROM daily_gambling_stats
                 WHERE user_id = $1 AND stat_date BETWEEN $2 AND $3"
            ))
            .bind(user_id)
            .bind(window.0)
            .bind(window.1)
            .fetch_one(self.pool.as_ref())
            .await?
        } else {
            sqlx::query(&format!(
                "SELECT {expr} AS total FROM daily_gambling_stats
                 WHERE user_id = $1 AND platform_type = $2 AND stat_date BETWEEN $3 AND $4"
            ))
            .bind(user_id)
            .bind(platform_type.as_str())
            .bind(window.0)
            .bind(window.1)
            .fetch_one(self.pool.as_ref())
            .await?
        };

        row.try_get("total")
    }

    /// Remaining headroom against a configured limit record at `now`.
    ///
    /// Returns `None` for records that are not spending limits.
    pub async fn remaining(
        &self,
        limit: &SelfExclusion,
        now: DateTime<Utc>,
        session_start: Option<DateTime<Utc>>,
    ) -> Result<Option<LimitHeadroom>, sqlx::Error> {
        let (Some(metric), Some(period), Some(limit_amount)) = (
            LimitMetric::for_limit(limit.exclusion_type),
            limit.period,
            limit.limit_amount,
        ) else {
            return Ok(None);
        };

        let window = period_window(period, now, session_start);
        let used = self
            .period_total(limit.user_id, limit.platform_type, metric, window)
            .await?;

        Ok(Some(LimitHeadroom {
            limit_id: limit.id,
            exclusion_type: limit.exclusion_type,
            platform_type: limit.platform_type,
            period,
            limit_amount,
            used,
            remaining: limit_amount.saturating_sub(used).max(0),
            is_removal_pending: limit.is_removal_pending(),
        }))
    }

    /// Today's stats rows for a user, most recent segment order unspecified
    pub async fn stats_for_window(
        &self,
        user_id: i64,
        window: (NaiveDate, NaiveDate),
    ) -> Result<Vec<DailyGamblingStats>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT user_id, stat_date, platform_type, wagered, won, deposited, updated_at
             FROM daily_gambling_stats
             WHERE user_id = $1 AND stat_date BETWEEN $2 AND $3
             ORDER BY stat_date",
        )
        .bind(user_id)
        .bind(window.0)
        .bind(window.1)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.into_iter()
            .map(|row| {
                let platform: String = row.try_get("platform_type")?;
                Ok(DailyGamblingStats {
                    user_id: row.try_get("user_id")?,
                    stat_date: row.try_get("stat_date")?,
                    platform_type: PlatformType::parse(&platform)
                        .unwrap_or(PlatformType::Platform),
                    wagered: row.try_get("wagered")?,
                    won: row.try_get("won")?,
                    deposited: row.try_get("deposited")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_daily_window_is_single_day() {
        let now = at(2026, 8, 23);
        assert_eq!(
            period_window(LimitPeriod::Daily, now, None),
            (date(2026, 8, 23), date(2026, 8, 23))
        );
    }

    #[test]
    fn test_weekly_window_starts_monday() {
        // 2026-08-23 is a Sunday; the ISO week began Monday the 17th.
        let now = at(2026, 8, 23);
        assert_eq!(
            period_window(LimitPeriod::Weekly, now, None),
            (date(2026, 8, 17), date(2026, 8, 23))
        );
    }

    #[test]
    fn test_monthly_window_starts_first() {
        let now = at(2026, 8, 23);
        assert_eq!(
            period_window(LimitPeriod::Monthly, now, None),
            (date(2026, 8, 1), date(2026, 8, 23))
        );
    }

    #[test]
    fn test_half_year_window_boundaries() {
        assert_eq!(
            period_window(LimitPeriod::HalfYear, at(2026, 6, 30), None).0,
            date(2026, 1, 1)
        );
        assert_eq!(
            period_window(LimitPeriod::HalfYear, at(2026, 7, 1), None).0,
            date(2026, 7, 1)
        );
    }

    #[test]
    fn test_session_window_uses_session_start() {
        let now = at(2026, 8, 23);
        let session = Some(at(2026, 8, 21));
        assert_eq!(
            period_window(LimitPeriod::Session, now, session),
            (date(2026, 8, 21), date(2026, 8, 23))
        );
        // No session start: degrade to today.
        assert_eq!(
            period_window(LimitPeriod::Session, now, None),
            (date(2026, 8, 23), date(2026, 8, 23))
        );
    }

    #[test]
    fn test_metric_for_limit_types() {
        assert_eq!(
            LimitMetric::for_limit(ExclusionType::WagerLimit),
            Some(LimitMetric::Wager)
        );
        assert_eq!(
            LimitMetric::for_limit(ExclusionType::LossLimit),
            Some(LimitMetric::Loss)
        );
        assert_eq!(
            LimitMetric::for_limit(ExclusionType::DepositLimit),
            Some(LimitMetric::Deposit)
        );
        assert_eq!(LimitMetric::for_limit(ExclusionType::Cooldown), None);
    }
}

//! Schema bootstrap for the ledger core.
//!
//! Every statement is idempotent (`IF NOT EXISTS`), so all workers can run
//! the bootstrap at startup without cross-process coordination.
//!
//! The partial unique indexes carry business rules the application relies
//! on at commit time:
//! - one `operation_id` ever applied (idempotency key),
//! - at most one active wager limit per user,
//! - one active deposit/loss limit per (type, period, platform segment),
//! - one active access exclusion per (type, platform segment).

use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS balances (
        user_id     BIGINT NOT NULL,
        asset       TEXT NOT NULL,
        balance     BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0),
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (user_id, asset)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS balance_operations (
        id             BIGSERIAL PRIMARY KEY,
        operation_id   UUID NOT NULL,
        user_id        BIGINT NOT NULL,
        asset          TEXT NOT NULL,
        kind           TEXT NOT NULL,
        amount         BIGINT NOT NULL,
        balance_after  BIGINT NOT NULL,
        status         TEXT NOT NULL,
        platform_type  TEXT NOT NULL,
        description    TEXT,
        created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS balance_operations_operation_id_key
        ON balance_operations (operation_id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS balance_operations_user_asset_idx
        ON balance_operations (user_id, asset, created_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS self_exclusions (
        id                        BIGSERIAL PRIMARY KEY,
        user_id                   BIGINT NOT NULL,
        exclusion_type            TEXT NOT NULL,
        platform_type             TEXT NOT NULL,
        period                    TEXT,
        limit_amount              BIGINT,
        start_date                TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        end_date                  TIMESTAMPTZ,
        is_active                 BOOLEAN NOT NULL DEFAULT TRUE,
        removal_requested_at      TIMESTAMPTZ,
        post_cooldown_window_end  TIMESTAMPTZ,
        created_at                TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS self_exclusions_one_wager_limit
        ON self_exclusions (user_id)
        WHERE exclusion_type = 'wager_limit' AND is_active
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS self_exclusions_one_limit_per_window
        ON self_exclusions (user_id, exclusion_type, platform_type, period)
        WHERE exclusion_type IN ('deposit_limit', 'loss_limit') AND is_active
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS self_exclusions_one_access_per_segment
        ON self_exclusions (user_id, exclusion_type, platform_type)
        WHERE exclusion_type IN ('cooldown', 'temporary', 'permanent') AND is_active
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS self_exclusions_user_idx
        ON self_exclusions (user_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS daily_gambling_stats (
        user_id        BIGINT NOT NULL,
        stat_date      DATE NOT NULL,
        platform_type  TEXT NOT NULL,
        wagered        BIGINT NOT NULL DEFAULT 0,
        won            BIGINT NOT NULL DEFAULT 0,
        deposited      BIGINT NOT NULL DEFAULT 0,
        updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (user_id, stat_date, platform_type)
    )
    "#,
];

/// Create all tables and indexes used by the ledger core.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

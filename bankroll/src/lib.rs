//! # Bankroll
//!
//! Multi-tenant real-money gambling ledger core: distributed locking,
//! an idempotent balance ledger, self-exclusion state management,
//! periodic spending limits, and the expiry scheduler that drives
//! time-based transitions.
//!
//! All money is integer minor units. The relational database is the
//! single source of truth; the shared key-value store is only a
//! coordination point for locks and counters.
//!
//! ## Core Modules
//!
//! - [`ledger`]: Balances, idempotent operations, and gating
//! - [`exclusion`]: Self-exclusions and spending limits
//! - [`limits`]: Periodic limit evaluation over daily stats
//! - [`lock`]: Distributed locks and cluster-wide counters
//! - [`scheduler`]: Expiry sweep for time-driven transitions
//!
//! ## Example
//!
//! ```no_run
//! use bankroll::db::{Database, DatabaseConfig};
//!
//! # async fn run() -> Result<(), sqlx::Error> {
//! let db = Database::new(&DatabaseConfig::development()).await?;
//! db.ensure_schema().await?;
//! # Ok(())
//! # }
//! ```

/// Database pool, schema, and configuration.
pub mod db;
pub use db::{Database, DatabaseConfig};

/// Distributed locking and shared counters.
pub mod lock;
pub use lock::{AcquireOptions, DistributedLock, LockError, LockManager, SharedCounter};

/// Self-exclusions and spending limits.
pub mod exclusion;
pub use exclusion::{
    AccessState, ActiveExclusion, CancelOutcome, CreateExclusionRequest, ExclusionError,
    ExclusionManager, ExclusionType, LimitPeriod, PlatformType, SelfExclusion,
};

/// Periodic limit evaluation.
pub mod limits;
pub use limits::{LimitEvaluator, LimitHeadroom, LimitMetric, StatField, period_window};

/// Idempotent balance ledger.
pub mod ledger;
pub use ledger::{
    Balance, BalanceOperation, LedgerError, LedgerManager, OperationKind, OperationOutcome,
    OperationStatus, UpdateBalanceRequest,
};

/// Expiry scheduler.
pub mod scheduler;
pub use scheduler::{ExpirySweep, SweepCounts};

//! Responsible-gambling self-exclusions and spending limits.
//!
//! This module implements:
//! - Access exclusions (cooldown, temporary, permanent) with a
//!   post-cooldown escalation window
//! - Spending limits (deposit, loss, wager) with a 24-hour removal
//!   countdown during which the limit stays enforced
//! - Platform-wide and per-segment scoping with most-restrictive-wins
//!   resolution
//!
//! State transitions driven purely by the passage of time are applied by
//! the expiry scheduler; the functions here evaluate the current state
//! from the stored rows without mutating them.

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{ExclusionError, ExclusionResult};
pub use manager::{CancelOutcome, CreateExclusionRequest, ExclusionManager};
pub use models::{
    AccessState, ActiveExclusion, ExclusionType, LimitPeriod, PlatformType, SelfExclusion,
    most_restrictive,
};

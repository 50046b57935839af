//! Ledger error types.

use crate::exclusion::models::{AccessState, ExclusionType, LimitPeriod, PlatformType};
use crate::exclusion::ExclusionError;
use crate::lock::LockError;
use thiserror::Error;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Lock store error or acquisition timeout
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Exclusion lookup failed
    #[error("Exclusion error: {0}")]
    Exclusion(#[from] ExclusionError),

    /// Debit would take the balance below zero
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: i64, required: i64 },

    /// A spending limit has no headroom for this amount
    #[error("{} reached for {} period on {platform_type}", exclusion_type.label(), period.as_str())]
    LimitExceeded {
        exclusion_type: ExclusionType,
        period: LimitPeriod,
        platform_type: PlatformType,
    },

    /// An access exclusion blocks this operation
    #[error("{}", .0.user_message())]
    SelfExclusionActive(AccessState),

    /// Amounts must be positive
    #[error("Amount must be positive")]
    InvalidAmount,

    /// Credit would overflow the stored integer
    #[error("Balance overflow")]
    BalanceOverflow,
}

impl LedgerError {
    /// Get a client-safe error message that doesn't leak storage details
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::Database(_) => "Internal server error".to_string(),
            LedgerError::Lock(err) => err.client_message(),
            LedgerError::Exclusion(err) => err.client_message(),
            _ => self.to_string(),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

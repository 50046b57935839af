//! Idempotent balance ledger.
//!
//! This module implements:
//! - Per (user, asset) integer balances that can never go negative
//! - An append-only operation history keyed by a client-supplied
//!   idempotency id, so retries replay instead of double-applying
//! - Responsible-gambling gating: bets and deposits are checked against
//!   access exclusions and spending limits before any money moves
//!
//! Amounts are integer minor units throughout; no floating point touches
//! money anywhere in this crate.

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{LedgerError, LedgerResult};
pub use manager::LedgerManager;
pub use models::{
    Balance, BalanceOperation, OperationKind, OperationOutcome, OperationStatus,
    UpdateBalanceRequest, next_balance,
};

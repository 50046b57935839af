//! Ledger data models and balance arithmetic.
//!
//! Balance arithmetic is a pure function so the invariants (no negative
//! balance, no overflow) can be tested without a database; the stored
//! CHECK constraint is only a backstop.

use super::errors::LedgerError;
use crate::exclusion::models::{ExclusionType, PlatformType};
use crate::limits::StatField;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's balance in one asset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub user_id: i64,
    pub asset: String,
    /// Minor units
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

/// Kind of balance mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Deposit,
    Withdrawal,
    Bet,
    Win,
    ManualCredit,
    ManualDebit,
}

impl OperationKind {
    /// Storage string for this kind
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Deposit => "deposit",
            OperationKind::Withdrawal => "withdrawal",
            OperationKind::Bet => "bet",
            OperationKind::Win => "win",
            OperationKind::ManualCredit => "manual_credit",
            OperationKind::ManualDebit => "manual_debit",
        }
    }

    /// Parse a storage string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(OperationKind::Deposit),
            "withdrawal" => Some(OperationKind::Withdrawal),
            "bet" => Some(OperationKind::Bet),
            "win" => Some(OperationKind::Win),
            "manual_credit" => Some(OperationKind::ManualCredit),
            "manual_debit" => Some(OperationKind::ManualDebit),
            _ => None,
        }
    }

    /// Whether this kind removes funds from the balance
    pub fn is_debit(self) -> bool {
        matches!(
            self,
            OperationKind::Withdrawal | OperationKind::Bet | OperationKind::ManualDebit
        )
    }

    /// Whether an active access exclusion blocks this kind.
    ///
    /// Withdrawals are never blocked: an excluded user keeps access to
    /// their funds. Wins settle bets already accepted, and manual
    /// adjustments are operator actions.
    pub fn checks_exclusion(self) -> bool {
        matches!(self, OperationKind::Bet | OperationKind::Deposit)
    }

    /// Limit types evaluated before this kind is applied
    pub fn gated_limits(self) -> &'static [ExclusionType] {
        match self {
            OperationKind::Bet => &[ExclusionType::WagerLimit, ExclusionType::LossLimit],
            OperationKind::Deposit => &[ExclusionType::DepositLimit],
            _ => &[],
        }
    }

    /// Stats column a successful operation of this kind accumulates into
    pub fn records_metric(self) -> Option<StatField> {
        match self {
            OperationKind::Bet => Some(StatField::Wagered),
            OperationKind::Win => Some(StatField::Won),
            OperationKind::Deposit => Some(StatField::Deposited),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a recorded operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Completed,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(OperationStatus::Completed),
            _ => None,
        }
    }
}

/// A recorded balance mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceOperation {
    pub id: i64,
    /// Client-supplied idempotency key
    pub operation_id: Uuid,
    pub user_id: i64,
    pub asset: String,
    pub kind: OperationKind,
    /// Positive magnitude; direction comes from `kind`
    pub amount: i64,
    pub balance_after: i64,
    pub status: OperationStatus,
    pub platform_type: PlatformType,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request to apply a balance mutation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBalanceRequest {
    pub kind: OperationKind,
    /// Idempotency key; retries with the same id replay the stored result
    pub operation_id: Uuid,
    pub user_id: i64,
    /// Positive magnitude in minor units
    pub amount: i64,
    pub asset: String,
    /// Segment the operation belongs to, for exclusion and limit scoping
    pub platform: PlatformType,
    pub description: Option<String>,
}

/// Outcome of a balance mutation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub operation_id: Uuid,
    /// Balance after the operation (the stored one on replay)
    pub balance: i64,
    pub status: OperationStatus,
    /// `true` when this operation_id was already applied
    pub duplicate: bool,
}

/// Apply a mutation to a balance, enforcing the non-negative invariant.
pub fn next_balance(
    current: i64,
    kind: OperationKind,
    amount: i64,
) -> Result<i64, LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if kind.is_debit() {
        if current < amount {
            return Err(LedgerError::InsufficientBalance {
                available: current,
                required: amount,
            });
        }
        Ok(current - amount)
    } else {
        current
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_debit_rejects_overdraft() {
        let err = next_balance(50, OperationKind::Bet, 51).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                available: 50,
                required: 51
            }
        ));
        assert_eq!(next_balance(50, OperationKind::Bet, 50).unwrap(), 0);
    }

    #[test]
    fn test_credit_rejects_overflow() {
        let err = next_balance(i64::MAX, OperationKind::Deposit, 1).unwrap_err();
        assert!(matches!(err, LedgerError::BalanceOverflow));
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        for amount in [0, -1, i64::MIN] {
            let err = next_balance(100, OperationKind::Deposit, amount).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount));
        }
    }

    #[test]
    fn test_operation_status_storage_round_trip() {
        let status = OperationStatus::Completed;
        assert_eq!(OperationStatus::parse(status.as_str()), Some(status));
        assert_eq!(OperationStatus::parse("pending"), None);
    }

    #[test]
    fn test_kind_gating_table() {
        assert!(OperationKind::Bet.checks_exclusion());
        assert!(OperationKind::Deposit.checks_exclusion());
        assert!(!OperationKind::Withdrawal.checks_exclusion());
        assert!(!OperationKind::Win.checks_exclusion());
        assert!(!OperationKind::ManualDebit.checks_exclusion());

        assert_eq!(
            OperationKind::Bet.gated_limits(),
            &[ExclusionType::WagerLimit, ExclusionType::LossLimit]
        );
        assert_eq!(
            OperationKind::Deposit.gated_limits(),
            &[ExclusionType::DepositLimit]
        );
        assert!(OperationKind::Win.gated_limits().is_empty());
        assert!(OperationKind::Withdrawal.gated_limits().is_empty());

        assert_eq!(OperationKind::Bet.records_metric(), Some(StatField::Wagered));
        assert_eq!(OperationKind::Win.records_metric(), Some(StatField::Won));
        assert_eq!(
            OperationKind::Deposit.records_metric(),
            Some(StatField::Deposited)
        );
        assert_eq!(OperationKind::Withdrawal.records_metric(), None);
    }

    proptest! {
        #[test]
        fn test_balance_never_goes_negative(
            current in 0i64..=i64::MAX,
            amount in proptest::num::i64::ANY,
            debit in proptest::bool::ANY,
        ) {
            let kind = if debit {
                OperationKind::Withdrawal
            } else {
                OperationKind::Deposit
            };
            if let Ok(next) = next_balance(current, kind, amount) {
                prop_assert!(next >= 0);
            }
        }
    }
}

//! Debt/refund matcher: remaining balances over linked refund entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{AggregateId, DomainError, DomainResult};

/// Debt entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebtId(pub AggregateId);

impl DebtId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DebtId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Refund entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefundId(pub AggregateId);

impl RefundId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RefundId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A debt owed, in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtEntry {
    pub id: DebtId,
    pub amount: i64,
    pub recorded_at: DateTime<Utc>,
}

impl DebtEntry {
    pub fn check(&self) -> DomainResult<()> {
        if self.amount <= 0 {
            return Err(DomainError::validation("debt amount must be positive"));
        }
        Ok(())
    }
}

/// A refund, optionally linked to the debt it pays down.
///
/// Unlinked refunds (`refunded_debt_id == None`) never affect any debt's
/// balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundEntry {
    pub id: RefundId,
    pub amount: i64,
    pub refunded_debt_id: Option<DebtId>,
    pub recorded_at: DateTime<Utc>,
}

impl RefundEntry {
    pub fn check(&self) -> DomainResult<()> {
        if self.amount <= 0 {
            return Err(DomainError::validation("refund amount must be positive"));
        }
        Ok(())
    }
}

/// Sum of refund amounts linked to the given debt.
pub fn linked_refund_total(debt_id: DebtId, refunds: &[RefundEntry]) -> i64 {
    refunds
        .iter()
        .filter(|r| r.refunded_debt_id == Some(debt_id))
        .map(|r| r.amount)
        .sum()
}

/// Remaining balance of a debt given a set of refund entries.
///
/// Over-refunding is NOT rejected here; the balance floors at zero and the
/// excess is surfaced via [`DebtSettlement::over_refunded`]. Callers that want
/// a hard guard check that flag before committing the refund.
pub fn remaining_balance(debt: &DebtEntry, refunds: &[RefundEntry]) -> i64 {
    (debt.amount - linked_refund_total(debt.id, refunds)).max(0)
}

/// Settlement view of one debt against a refund set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtSettlement {
    pub debt_id: DebtId,
    pub debt_amount: i64,
    pub refunded_total: i64,
    pub remaining_balance: i64,
    /// Linked refunds exceed the debt amount.
    pub over_refunded: bool,
}

impl DebtSettlement {
    pub fn is_settled(&self) -> bool {
        self.remaining_balance == 0
    }
}

/// Match refunds against a debt, validating the entries first.
pub fn settle(debt: &DebtEntry, refunds: &[RefundEntry]) -> DomainResult<DebtSettlement> {
    debt.check()?;
    for refund in refunds {
        refund.check()?;
    }

    let refunded_total = linked_refund_total(debt.id, refunds);
    Ok(DebtSettlement {
        debt_id: debt.id,
        debt_amount: debt.amount,
        refunded_total,
        remaining_balance: (debt.amount - refunded_total).max(0),
        over_refunded: refunded_total > debt.amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn debt(amount: i64) -> DebtEntry {
        DebtEntry {
            id: DebtId::new(AggregateId::new()),
            amount,
            recorded_at: Utc::now(),
        }
    }

    fn refund(amount: i64, debt_id: Option<DebtId>) -> RefundEntry {
        RefundEntry {
            id: RefundId::new(AggregateId::new()),
            amount,
            refunded_debt_id: debt_id,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn partial_refunds_reduce_the_balance() {
        let d = debt(1000);
        let refunds = vec![refund(300, Some(d.id)), refund(200, Some(d.id))];

        let settlement = settle(&d, &refunds).unwrap();
        assert_eq!(settlement.refunded_total, 500);
        assert_eq!(settlement.remaining_balance, 500);
        assert!(!settlement.over_refunded);
        assert!(!settlement.is_settled());
    }

    #[test]
    fn over_refund_floors_at_zero_and_is_flagged() {
        let d = debt(1000);
        let refunds = vec![
            refund(300, Some(d.id)),
            refund(200, Some(d.id)),
            refund(600, Some(d.id)),
        ];

        let settlement = settle(&d, &refunds).unwrap();
        assert_eq!(settlement.refunded_total, 1100);
        assert_eq!(settlement.remaining_balance, 0);
        assert!(settlement.over_refunded);
        assert!(settlement.is_settled());
    }

    #[test]
    fn refunds_linked_elsewhere_are_ignored() {
        let d = debt(800);
        let other = DebtId::new(AggregateId::new());
        let refunds = vec![
            refund(500, Some(other)),
            refund(100, None),
            refund(250, Some(d.id)),
        ];

        assert_eq!(remaining_balance(&d, &refunds), 550);
    }

    #[test]
    fn nonpositive_amounts_are_rejected() {
        let err = settle(&debt(0), &[]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let d = debt(100);
        let err = settle(&d, &[refund(-5, Some(d.id))]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn balance_never_negative_and_consistent(
            amount in 1i64..1_000_000,
            refund_amounts in proptest::collection::vec(1i64..100_000, 0..12),
        ) {
            let d = debt(amount);
            let refunds: Vec<RefundEntry> = refund_amounts
                .iter()
                .map(|&a| refund(a, Some(d.id)))
                .collect();

            let settlement = settle(&d, &refunds).unwrap();
            let total: i64 = refund_amounts.iter().sum();

            prop_assert!(settlement.remaining_balance >= 0);
            prop_assert_eq!(settlement.remaining_balance, (amount - total).max(0));
            prop_assert_eq!(settlement.over_refunded, total > amount);
        }
    }
}

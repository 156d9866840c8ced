//! `atelier-finance` — debt/refund matching ledger.
//!
//! A smaller sibling of the stock ledger: refunds link to a specific debt and
//! the remaining balance is a running total over the linked entries.

pub mod matcher;

pub use matcher::{
    DebtEntry, DebtId, DebtSettlement, RefundEntry, RefundId, linked_refund_total,
    remaining_balance, settle,
};

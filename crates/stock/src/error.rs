//! Stock ledger error taxonomy.
//!
//! All variants are recoverable, caller-visible failures: the ledger never
//! clamps a shortfall to zero or partially applies a withdrawal.

use thiserror::Error;

use crate::batch::BatchId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Total active remaining quantity is below the requested withdrawal.
    /// The operation is rejected atomically; no batch is decremented.
    #[error("insufficient stock: requested {requested}, available {available} (short {shortfall})")]
    InsufficientStock {
        requested: i64,
        available: i64,
        shortfall: i64,
    },

    /// An adjustment would violate `0 <= remaining_quantity <= quantity`.
    #[error("invalid adjustment: {0}")]
    InvalidAdjustment(String),

    /// The referenced batch does not belong to this product's ledger.
    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),

    /// A command value failed validation (e.g. non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A ledger invariant was violated (e.g. tenant mismatch).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl StockError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn adjustment(msg: impl Into<String>) -> Self {
        Self::InvalidAdjustment(msg.into())
    }
}

//! Production workflow/cost error taxonomy.

use thiserror::Error;

use crate::flow::FlowStepId;
use crate::production::ArticleId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProductionError {
    /// Attempted step is not reachable under the bound flow and its policy.
    #[error("invalid step: {attempted} not in allowed set ({} steps)", .allowed.len())]
    InvalidStep {
        attempted: FlowStepId,
        allowed: Vec<FlowStepId>,
    },

    /// The production (or article) has already been published.
    #[error("already published")]
    AlreadyPublished,

    /// The production is closed; no further mutations are accepted.
    #[error("production is closed")]
    Closed,

    /// The referenced article does not belong to this production.
    #[error("article not found: {0}")]
    ArticleNotFound(ArticleId),

    /// A command value failed validation (e.g. negative cost).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A workflow invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl ProductionError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

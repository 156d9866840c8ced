use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_catalog::ProductId;
use atelier_core::AggregateId;

use crate::error::StockError;

/// Stock batch identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub AggregateId);

impl BatchId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BatchId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Batch lifecycle: active until `remaining_quantity` reaches 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Active,
    Depleted,
}

/// A discrete stock lot with its own quantity and cost price, created by one
/// restock or publish event.
///
/// Invariant: `0 <= remaining_quantity <= quantity`. The sum of
/// `remaining_quantity` over a product's active batches is that product's
/// displayed stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBatch {
    pub id: BatchId,
    pub product_id: ProductId,
    /// Original quantity at creation (grows only via positive manual adjustment).
    pub quantity: i64,
    pub remaining_quantity: i64,
    /// Unit cost in smallest currency unit (e.g., cents).
    pub cost_price: i64,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
}

impl atelier_core::Entity for StockBatch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl StockBatch {
    pub fn is_active(&self) -> bool {
        self.status == BatchStatus::Active
    }

    /// Check the batch-local quantity invariant.
    pub fn check_invariant(&self) -> Result<(), StockError> {
        if self.remaining_quantity < 0 || self.remaining_quantity > self.quantity {
            return Err(StockError::invariant(format!(
                "batch {}: remaining_quantity {} outside [0, {}]",
                self.id, self.remaining_quantity, self.quantity
            )));
        }
        Ok(())
    }
}

/// Batch consumption ordering by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumptionPolicy {
    /// First-in-first-out: oldest batches first.
    Fifo,
    /// Last-in-first-out: newest batches first.
    Lifo,
}

/// One batch's share of a withdrawal.
///
/// `remaining_quantity` is the batch's remaining quantity **after** this
/// consumption is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConsumption {
    pub batch_id: BatchId,
    pub consumed_quantity: i64,
    pub remaining_quantity: i64,
    pub cost_price: i64,
}

/// Ordered per-batch consumption record produced by one withdrawal.
///
/// This is the basis for weighted cost attribution on the consuming
/// transaction (sale or production) and for audit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionTrace {
    pub entries: Vec<BatchConsumption>,
}

impl ConsumptionTrace {
    pub fn total_quantity(&self) -> i64 {
        self.entries.iter().map(|e| e.consumed_quantity).sum()
    }

    /// Total cost of the withdrawal: sum of consumed quantity x batch unit cost.
    pub fn total_cost(&self) -> i64 {
        self.entries
            .iter()
            .map(|e| e.consumed_quantity * e.cost_price)
            .sum()
    }

    /// Weighted average unit cost of the withdrawal (floor division; 0 for an
    /// empty trace).
    pub fn weighted_unit_cost(&self) -> i64 {
        let quantity = self.total_quantity();
        if quantity == 0 {
            0
        } else {
            self.total_cost() / quantity
        }
    }
}

/// Plan a withdrawal of `quantity` units across `batches` under `policy`.
///
/// Only active batches participate. Batches are ordered by `created_at`
/// (ascending for FIFO, descending for LIFO; batch id breaks ties so the plan
/// is deterministic) and consumed greedily until the request is satisfied.
///
/// Planning is pure: no batch is mutated. If total available stock is short,
/// the whole request fails with [`StockError::InsufficientStock`] carrying the
/// shortfall, leaving the caller free to surface it per material.
pub fn plan_consumption(
    batches: &[StockBatch],
    quantity: i64,
    policy: ConsumptionPolicy,
) -> Result<ConsumptionTrace, StockError> {
    if quantity <= 0 {
        return Err(StockError::validation("quantity must be positive"));
    }

    let mut active: Vec<&StockBatch> = batches
        .iter()
        .filter(|b| b.is_active() && b.remaining_quantity > 0)
        .collect();

    match policy {
        ConsumptionPolicy::Fifo => active.sort_by_key(|b| (b.created_at, b.id)),
        ConsumptionPolicy::Lifo => {
            active.sort_by_key(|b| (std::cmp::Reverse(b.created_at), b.id))
        }
    }

    let available: i64 = active.iter().map(|b| b.remaining_quantity).sum();
    if available < quantity {
        return Err(StockError::InsufficientStock {
            requested: quantity,
            available,
            shortfall: quantity - available,
        });
    }

    let mut outstanding = quantity;
    let mut entries = Vec::new();
    for batch in active {
        if outstanding == 0 {
            break;
        }
        let consumed = outstanding.min(batch.remaining_quantity);
        outstanding -= consumed;
        entries.push(BatchConsumption {
            batch_id: batch.id,
            consumed_quantity: consumed,
            remaining_quantity: batch.remaining_quantity - consumed,
            cost_price: batch.cost_price,
        });
    }

    Ok(ConsumptionTrace { entries })
}

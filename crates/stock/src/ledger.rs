use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_catalog::ProductId;
use atelier_core::{Aggregate, AggregateRoot, Event, TenantId};

use crate::batch::{
    plan_consumption, BatchId, BatchStatus, ConsumptionPolicy, ConsumptionTrace, StockBatch,
};
use crate::error::StockError;

/// Where a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestockSource {
    Purchase,
    /// Batch created by materializing a production into this product.
    ProductionPublish,
    Transfer,
    Manual,
}

/// Why stock was withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionReason {
    Sale,
    /// Materials debited for a production run.
    ProductionMaterial,
    Transfer,
    Other,
}

/// Aggregate root: one product's batch ledger.
///
/// State is the full batch list; the displayed stock is always derived as the
/// sum of active batches' remaining quantities, never cached here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductStock {
    product_id: ProductId,
    tenant_id: Option<TenantId>,
    batches: Vec<StockBatch>,
    version: u64,
}

impl ProductStock {
    /// Empty ledger for a product with no batches yet.
    pub fn empty(product_id: ProductId) -> Self {
        Self {
            product_id,
            tenant_id: None,
            batches: Vec::new(),
            version: 0,
        }
    }

    /// Rehydrate from batches read out of the batch store.
    pub fn from_batches(
        product_id: ProductId,
        tenant_id: TenantId,
        batches: Vec<StockBatch>,
    ) -> Self {
        Self {
            product_id,
            tenant_id: Some(tenant_id),
            batches,
            version: 0,
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn batches(&self) -> &[StockBatch] {
        &self.batches
    }

    pub fn batch(&self, id: BatchId) -> Option<&StockBatch> {
        self.batches.iter().find(|b| b.id == id)
    }

    /// Displayed stock: sum of active batches' remaining quantities.
    pub fn stock_on_hand(&self) -> i64 {
        self.batches
            .iter()
            .filter(|b| b.is_active())
            .map(|b| b.remaining_quantity)
            .sum()
    }

    /// Recompute stock from batches and flag inconsistencies against an
    /// optional cached/denormalized stock figure. Exposed for testing and
    /// debugging; never mutates.
    pub fn check_consistency(&self, cached_stock: Option<i64>) -> Vec<ConsistencyFinding> {
        let mut findings = Vec::new();

        let computed = self.stock_on_hand();
        if let Some(cached) = cached_stock {
            if cached != computed {
                findings.push(ConsistencyFinding::CachedStockMismatch { cached, computed });
            }
        }

        for b in &self.batches {
            if b.remaining_quantity < 0 {
                findings.push(ConsistencyFinding::NegativeRemaining { batch_id: b.id });
            }
            if b.remaining_quantity > b.quantity {
                findings.push(ConsistencyFinding::RemainingExceedsQuantity { batch_id: b.id });
            }
            if b.is_active() && b.remaining_quantity == 0 {
                findings.push(ConsistencyFinding::ActiveButEmpty { batch_id: b.id });
            }
            if !b.is_active() && b.remaining_quantity > 0 {
                findings.push(ConsistencyFinding::DepletedButRemaining { batch_id: b.id });
            }
        }

        findings
    }
}

/// A single inconsistency surfaced by [`ProductStock::check_consistency`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyFinding {
    CachedStockMismatch { cached: i64, computed: i64 },
    NegativeRemaining { batch_id: BatchId },
    RemainingExceedsQuantity { batch_id: BatchId },
    ActiveButEmpty { batch_id: BatchId },
    DepletedButRemaining { batch_id: BatchId },
}

impl AggregateRoot for ProductStock {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: Restock — create a new batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restock {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub batch_id: BatchId,
    pub quantity: i64,
    pub cost_price: i64,
    pub source: RestockSource,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConsumeStock — withdraw quantity under a FIFO/LIFO policy.
///
/// No deduplication key is carried: callers own exactly-once invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeStock {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub policy: ConsumptionPolicy,
    pub reason: ConsumptionReason,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustBatch — manual correction of a specific batch.
///
/// Positive `delta` raises both `quantity` and `remaining_quantity`; negative
/// `delta` lowers `remaining_quantity` only. `new_cost_price` rewrites the
/// batch's unit cost without touching quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustBatch {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub batch_id: BatchId,
    pub delta: i64,
    pub new_cost_price: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDamage — negative adjustment tagged for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDamage {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub batch_id: BatchId,
    pub damaged_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    Restock(Restock),
    ConsumeStock(ConsumeStock),
    AdjustBatch(AdjustBatch),
    RecordDamage(RecordDamage),
}

/// Event: BatchRestocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRestocked {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub batch_id: BatchId,
    pub quantity: i64,
    pub cost_price: i64,
    pub source: RestockSource,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockConsumed — carries the full per-batch trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockConsumed {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub policy: ConsumptionPolicy,
    pub reason: ConsumptionReason,
    pub trace: ConsumptionTrace,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAdjusted {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub batch_id: BatchId,
    pub delta: i64,
    pub new_cost_price: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchDamaged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDamaged {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub batch_id: BatchId,
    pub damaged_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    BatchRestocked(BatchRestocked),
    StockConsumed(StockConsumed),
    BatchAdjusted(BatchAdjusted),
    BatchDamaged(BatchDamaged),
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::BatchRestocked(_) => "stock.batch.restocked",
            StockEvent::StockConsumed(_) => "stock.consumed",
            StockEvent::BatchAdjusted(_) => "stock.batch.adjusted",
            StockEvent::BatchDamaged(_) => "stock.batch.damaged",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::BatchRestocked(e) => e.occurred_at,
            StockEvent::StockConsumed(e) => e.occurred_at,
            StockEvent::BatchAdjusted(e) => e.occurred_at,
            StockEvent::BatchDamaged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ProductStock {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = StockError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::BatchRestocked(e) => {
                self.tenant_id.get_or_insert(e.tenant_id);
                self.batches.push(StockBatch {
                    id: e.batch_id,
                    product_id: e.product_id,
                    quantity: e.quantity,
                    remaining_quantity: e.quantity,
                    cost_price: e.cost_price,
                    status: BatchStatus::Active,
                    created_at: e.occurred_at,
                });
            }
            StockEvent::StockConsumed(e) => {
                for entry in &e.trace.entries {
                    if let Some(batch) = self.batches.iter_mut().find(|b| b.id == entry.batch_id) {
                        batch.remaining_quantity = entry.remaining_quantity;
                        if batch.remaining_quantity == 0 {
                            batch.status = BatchStatus::Depleted;
                        }
                    }
                }
            }
            StockEvent::BatchAdjusted(e) => {
                if let Some(batch) = self.batches.iter_mut().find(|b| b.id == e.batch_id) {
                    if e.delta > 0 {
                        batch.quantity += e.delta;
                        batch.remaining_quantity += e.delta;
                    } else {
                        batch.remaining_quantity += e.delta;
                    }
                    if let Some(cost) = e.new_cost_price {
                        batch.cost_price = cost;
                    }
                    batch.status = if batch.remaining_quantity == 0 {
                        BatchStatus::Depleted
                    } else {
                        BatchStatus::Active
                    };
                }
            }
            StockEvent::BatchDamaged(e) => {
                if let Some(batch) = self.batches.iter_mut().find(|b| b.id == e.batch_id) {
                    batch.remaining_quantity -= e.damaged_quantity;
                    if batch.remaining_quantity == 0 {
                        batch.status = BatchStatus::Depleted;
                    }
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::Restock(cmd) => self.handle_restock(cmd),
            StockCommand::ConsumeStock(cmd) => self.handle_consume(cmd),
            StockCommand::AdjustBatch(cmd) => self.handle_adjust(cmd),
            StockCommand::RecordDamage(cmd) => self.handle_damage(cmd),
        }
    }
}

impl ProductStock {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), StockError> {
        match self.tenant_id {
            Some(existing) if existing != tenant_id => {
                Err(StockError::invariant("tenant mismatch"))
            }
            _ => Ok(()),
        }
    }

    fn ensure_product(&self, product_id: ProductId) -> Result<(), StockError> {
        if self.product_id != product_id {
            return Err(StockError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_restock(&self, cmd: &Restock) -> Result<Vec<StockEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_product(cmd.product_id)?;

        if cmd.quantity <= 0 {
            return Err(StockError::validation("quantity must be positive"));
        }
        if cmd.cost_price < 0 {
            return Err(StockError::validation("cost_price cannot be negative"));
        }
        if self.batch(cmd.batch_id).is_some() {
            return Err(StockError::invariant("batch_id already exists"));
        }

        Ok(vec![StockEvent::BatchRestocked(BatchRestocked {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            batch_id: cmd.batch_id,
            quantity: cmd.quantity,
            cost_price: cmd.cost_price,
            source: cmd.source,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_consume(&self, cmd: &ConsumeStock) -> Result<Vec<StockEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_product(cmd.product_id)?;

        let trace = plan_consumption(&self.batches, cmd.quantity, cmd.policy)?;

        Ok(vec![StockEvent::StockConsumed(StockConsumed {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            policy: cmd.policy,
            reason: cmd.reason,
            trace,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustBatch) -> Result<Vec<StockEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_product(cmd.product_id)?;

        if cmd.delta == 0 && cmd.new_cost_price.is_none() {
            return Err(StockError::validation(
                "adjustment must change quantity or cost price",
            ));
        }
        if let Some(cost) = cmd.new_cost_price {
            if cost < 0 {
                return Err(StockError::validation("cost_price cannot be negative"));
            }
        }

        let batch = self
            .batch(cmd.batch_id)
            .ok_or(StockError::BatchNotFound(cmd.batch_id))?;

        if cmd.delta < 0 && batch.remaining_quantity + cmd.delta < 0 {
            return Err(StockError::adjustment(format!(
                "delta {} would drive batch {} remaining below zero (remaining {})",
                cmd.delta, cmd.batch_id, batch.remaining_quantity
            )));
        }

        Ok(vec![StockEvent::BatchAdjusted(BatchAdjusted {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            batch_id: cmd.batch_id,
            delta: cmd.delta,
            new_cost_price: cmd.new_cost_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_damage(&self, cmd: &RecordDamage) -> Result<Vec<StockEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_product(cmd.product_id)?;

        if cmd.damaged_quantity <= 0 {
            return Err(StockError::validation("damaged_quantity must be positive"));
        }

        let batch = self
            .batch(cmd.batch_id)
            .ok_or(StockError::BatchNotFound(cmd.batch_id))?;

        if batch.remaining_quantity < cmd.damaged_quantity {
            return Err(StockError::adjustment(format!(
                "damaged quantity {} exceeds batch {} remaining {}",
                cmd.damaged_quantity, cmd.batch_id, batch.remaining_quantity
            )));
        }

        Ok(vec![StockEvent::BatchDamaged(BatchDamaged {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            batch_id: cmd.batch_id,
            damaged_quantity: cmd.damaged_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }
}

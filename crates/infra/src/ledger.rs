//! Stock ledger service: load → decide → commit around a [`BatchStore`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use atelier_catalog::ProductId;
use atelier_core::{Aggregate, Clock, ExpectedVersion, TenantId};
use atelier_stock::{
    AdjustBatch, BatchId, ConsistencyFinding, ConsumeStock, ConsumptionPolicy, ConsumptionReason,
    ConsumptionTrace, ProductStock, RecordDamage, Restock, RestockSource, StockCommand, StockError,
    StockEvent,
};

use crate::store::{BatchStore, StoreError};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] StockError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Application service for one tenant-scoped batch ledger per product.
///
/// Consumption carries no deduplication key; callers own exactly-once
/// invocation (a retried `consume` withdraws again).
pub struct StockLedger<S: BatchStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: BatchStore> StockLedger<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn load(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<ProductStock, LedgerError> {
        let batches = self.store.list_batches(tenant_id, product_id)?;
        Ok(ProductStock::from_batches(product_id, tenant_id, batches))
    }

    fn execute(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        command: StockCommand,
    ) -> Result<Vec<StockEvent>, LedgerError> {
        let loaded_version = self.store.stream_version(tenant_id, product_id)?;
        let mut stock = self.load(tenant_id, product_id)?;
        let events = stock.handle(&command)?;
        for event in &events {
            stock.apply(event);
        }
        self.store.commit(
            tenant_id,
            product_id,
            stock.batches(),
            &events,
            ExpectedVersion::Exact(loaded_version),
        )?;
        Ok(events)
    }

    /// Create a new batch.
    #[instrument(skip(self), fields(%product_id))]
    pub fn restock(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        quantity: i64,
        cost_price: i64,
        source: RestockSource,
    ) -> Result<BatchId, LedgerError> {
        let batch_id = BatchId::new(atelier_core::AggregateId::new());
        self.execute(
            tenant_id,
            product_id,
            StockCommand::Restock(Restock {
                tenant_id,
                product_id,
                batch_id,
                quantity,
                cost_price,
                source,
                occurred_at: self.clock.now(),
            }),
        )?;
        info!(%batch_id, quantity, cost_price, "batch restocked");
        Ok(batch_id)
    }

    /// Withdraw `quantity` units under `policy`, returning the per-batch trace.
    #[instrument(skip(self), fields(%product_id))]
    pub fn consume(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        quantity: i64,
        policy: ConsumptionPolicy,
        reason: ConsumptionReason,
    ) -> Result<ConsumptionTrace, LedgerError> {
        let events = self.execute(
            tenant_id,
            product_id,
            StockCommand::ConsumeStock(ConsumeStock {
                tenant_id,
                product_id,
                quantity,
                policy,
                reason,
                occurred_at: self.clock.now(),
            }),
        )?;
        match events.into_iter().next() {
            Some(StockEvent::StockConsumed(e)) => {
                info!(
                    quantity,
                    batches = e.trace.entries.len(),
                    total_cost = e.trace.total_cost(),
                    "stock consumed"
                );
                Ok(e.trace)
            }
            _ => Err(LedgerError::Domain(StockError::invariant(
                "consume produced no consumption event",
            ))),
        }
    }

    /// Manual correction of a specific batch.
    #[instrument(skip(self), fields(%product_id, %batch_id))]
    pub fn adjust_batch(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        batch_id: BatchId,
        delta: i64,
        new_cost_price: Option<i64>,
    ) -> Result<(), LedgerError> {
        self.execute(
            tenant_id,
            product_id,
            StockCommand::AdjustBatch(AdjustBatch {
                tenant_id,
                product_id,
                batch_id,
                delta,
                new_cost_price,
                occurred_at: self.clock.now(),
            }),
        )?;
        Ok(())
    }

    /// Write off damaged units from a specific batch.
    #[instrument(skip(self), fields(%product_id, %batch_id))]
    pub fn record_damage(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        batch_id: BatchId,
        damaged_quantity: i64,
    ) -> Result<(), LedgerError> {
        self.execute(
            tenant_id,
            product_id,
            StockCommand::RecordDamage(RecordDamage {
                tenant_id,
                product_id,
                batch_id,
                damaged_quantity,
                occurred_at: self.clock.now(),
            }),
        )?;
        Ok(())
    }

    /// Displayed stock: sum of active batches' remaining quantities.
    pub fn stock_on_hand(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<i64, LedgerError> {
        Ok(self.load(tenant_id, product_id)?.stock_on_hand())
    }

    /// Recompute stock from batches and report inconsistencies against an
    /// optional cached figure.
    pub fn check_consistency(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        cached_stock: Option<i64>,
    ) -> Result<Vec<ConsistencyFinding>, LedgerError> {
        Ok(self.load(tenant_id, product_id)?.check_consistency(cached_stock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryBatchStore;
    use atelier_core::{AggregateId, FixedClock};
    use chrono::{TimeZone, Utc};

    fn ledger() -> StockLedger<InMemoryBatchStore> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        StockLedger::new(
            Arc::new(InMemoryBatchStore::new()),
            Arc::new(FixedClock::new(start)),
        )
    }

    #[test]
    fn restock_then_consume_round_trips_through_the_store() {
        let ledger = ledger();
        let tenant_id = TenantId::new();
        let product_id = ProductId::new(AggregateId::new());

        ledger
            .restock(tenant_id, product_id, 5, 100, RestockSource::Purchase)
            .unwrap();
        ledger
            .restock(tenant_id, product_id, 5, 200, RestockSource::Purchase)
            .unwrap();

        let trace = ledger
            .consume(
                tenant_id,
                product_id,
                7,
                ConsumptionPolicy::Fifo,
                ConsumptionReason::Sale,
            )
            .unwrap();

        assert_eq!(trace.total_quantity(), 7);
        assert_eq!(trace.total_cost(), 5 * 100 + 2 * 200);
        assert_eq!(ledger.stock_on_hand(tenant_id, product_id).unwrap(), 3);
        assert!(ledger
            .check_consistency(tenant_id, product_id, Some(3))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn failed_consumption_commits_nothing() {
        let ledger = ledger();
        let tenant_id = TenantId::new();
        let product_id = ProductId::new(AggregateId::new());

        ledger
            .restock(tenant_id, product_id, 4, 100, RestockSource::Purchase)
            .unwrap();

        let err = ledger
            .consume(
                tenant_id,
                product_id,
                9,
                ConsumptionPolicy::Fifo,
                ConsumptionReason::Sale,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(StockError::InsufficientStock { shortfall: 5, .. })
        ));
        assert_eq!(ledger.stock_on_hand(tenant_id, product_id).unwrap(), 4);
    }
}

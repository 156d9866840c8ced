//! In-memory store adapters.
//!
//! Intended for tests/dev. Not optimized for performance.

use std::collections::HashMap;
use std::sync::RwLock;

use atelier_catalog::{ProductId, ProductRecord};
use atelier_core::{AggregateRoot, Event, ExpectedVersion, TenantId};
use atelier_production::{Production, ProductionId};
use atelier_stock::{StockBatch, StockEvent};

use crate::store::{AuditRecord, BatchStore, CatalogSink, ProductionStore, StoreError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct ProductKey {
    tenant_id: TenantId,
    product_id: ProductId,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct ProductionKey {
    tenant_id: TenantId,
    production_id: ProductionId,
}

/// In-memory batch store with an append-only audit log.
#[derive(Debug, Default)]
pub struct InMemoryBatchStore {
    batches: RwLock<HashMap<ProductKey, Vec<StockBatch>>>,
    versions: RwLock<HashMap<ProductKey, u64>>,
    audit: RwLock<Vec<AuditRecord>>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full audit log, in commit order. Exposed for tests and debugging.
    pub fn audit_log(&self) -> Result<Vec<AuditRecord>, StoreError> {
        Ok(self
            .audit
            .read()
            .map_err(|_| StoreError::storage("lock poisoned"))?
            .clone())
    }
}

impl BatchStore for InMemoryBatchStore {
    fn list_batches(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<StockBatch>, StoreError> {
        let map = self
            .batches
            .read()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        Ok(map
            .get(&ProductKey {
                tenant_id,
                product_id,
            })
            .cloned()
            .unwrap_or_default())
    }

    fn list_active_batches(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<StockBatch>, StoreError> {
        let mut batches = self.list_batches(tenant_id, product_id)?;
        batches.retain(|b| b.is_active());
        Ok(batches)
    }

    fn stream_version(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<u64, StoreError> {
        let versions = self
            .versions
            .read()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        Ok(versions
            .get(&ProductKey {
                tenant_id,
                product_id,
            })
            .copied()
            .unwrap_or(0))
    }

    fn commit(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        batches: &[StockBatch],
        events: &[StockEvent],
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        // Single write section: version check, batch replacement and audit
        // append land together.
        let mut map = self
            .batches
            .write()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        let mut versions = self
            .versions
            .write()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        let mut audit = self
            .audit
            .write()
            .map_err(|_| StoreError::storage("lock poisoned"))?;

        let key = ProductKey {
            tenant_id,
            product_id,
        };
        let current = versions.get(&key).copied().unwrap_or(0);
        if !expected.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "expected {expected:?}, found {current}"
            )));
        }

        let stream = product_id.to_string();
        let mut next = current + 1;
        for event in events {
            let payload = serde_json::to_value(event)
                .map_err(|e| StoreError::storage(format!("serialize event: {e}")))?;
            audit.push(AuditRecord {
                tenant_id,
                stream: stream.clone(),
                sequence_number: next,
                event_type: event.event_type().to_string(),
                event_version: event.version(),
                occurred_at: event.occurred_at(),
                payload,
            });
            next += 1;
        }

        versions.insert(key, current + events.len() as u64);
        map.insert(key, batches.to_vec());
        Ok(())
    }
}

/// In-memory production store with optimistic concurrency on save.
#[derive(Debug, Default)]
pub struct InMemoryProductionStore {
    productions: RwLock<HashMap<ProductionKey, Production>>,
}

impl InMemoryProductionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProductionStore for InMemoryProductionStore {
    fn get(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<Production, StoreError> {
        let map = self
            .productions
            .read()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        map.get(&ProductionKey {
            tenant_id,
            production_id,
        })
        .cloned()
        .ok_or(StoreError::NotFound)
    }

    fn save(
        &self,
        tenant_id: TenantId,
        production: &Production,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut map = self
            .productions
            .write()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        let key = ProductionKey {
            tenant_id,
            production_id: production.id_typed(),
        };

        let current = map.get(&key).map(|p| p.version()).unwrap_or(0);
        if !expected.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "expected {expected:?}, found {current}"
            )));
        }

        map.insert(key, production.clone());
        Ok(())
    }
}

/// In-memory catalog sink.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductKey, ProductRecord>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CatalogSink for InMemoryCatalog {
    fn create_product(
        &self,
        tenant_id: TenantId,
        record: ProductRecord,
    ) -> Result<(), StoreError> {
        let mut map = self
            .products
            .write()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        let key = ProductKey {
            tenant_id,
            product_id: record.id,
        };
        if map.contains_key(&key) {
            return Err(StoreError::Concurrency(format!(
                "product {} already exists",
                record.id
            )));
        }
        map.insert(key, record);
        Ok(())
    }

    fn get_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<ProductRecord, StoreError> {
        let map = self
            .products
            .read()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        map.get(&ProductKey {
            tenant_id,
            product_id,
        })
        .cloned()
        .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::AggregateId;
    use atelier_production::{CreateProduction, ProductionCommand};
    use atelier_core::Aggregate;
    use chrono::Utc;

    #[test]
    fn production_save_enforces_expected_version() {
        let store = InMemoryProductionStore::new();
        let tenant_id = TenantId::new();
        let production_id = ProductionId::new(AggregateId::new());

        let mut production = Production::empty(production_id);
        let events = production
            .handle(&ProductionCommand::CreateProduction(CreateProduction {
                tenant_id,
                production_id,
                name: "Batch".to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            production.apply(e);
        }

        store
            .save(tenant_id, &production, ExpectedVersion::Exact(0))
            .unwrap();

        // Saving again against a stale expectation fails.
        let err = store
            .save(tenant_id, &production, ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));

        store
            .save(tenant_id, &production, ExpectedVersion::Any)
            .unwrap();
    }

    #[test]
    fn batch_commit_rejects_stale_stream_version() {
        use atelier_stock::{BatchId, BatchRestocked, BatchStatus, RestockSource};

        let store = InMemoryBatchStore::new();
        let tenant_id = TenantId::new();
        let product_id = ProductId::new(AggregateId::new());

        let batch = StockBatch {
            id: BatchId::new(AggregateId::new()),
            product_id,
            quantity: 5,
            remaining_quantity: 5,
            cost_price: 100,
            status: BatchStatus::Active,
            created_at: Utc::now(),
        };
        let events = vec![StockEvent::BatchRestocked(BatchRestocked {
            tenant_id,
            product_id,
            batch_id: batch.id,
            quantity: 5,
            cost_price: 100,
            source: RestockSource::Purchase,
            occurred_at: batch.created_at,
        })];

        assert_eq!(store.stream_version(tenant_id, product_id).unwrap(), 0);
        store
            .commit(
                tenant_id,
                product_id,
                std::slice::from_ref(&batch),
                &events,
                ExpectedVersion::Exact(0),
            )
            .unwrap();
        assert_eq!(store.stream_version(tenant_id, product_id).unwrap(), 1);

        // A plan made against the pre-commit stream can no longer land.
        let err = store
            .commit(
                tenant_id,
                product_id,
                &[],
                &events,
                ExpectedVersion::Exact(0),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));

        store
            .commit(tenant_id, product_id, &[], &events, ExpectedVersion::Any)
            .unwrap();
        assert_eq!(store.stream_version(tenant_id, product_id).unwrap(), 2);
    }

    #[test]
    fn catalog_rejects_duplicate_product_ids() {
        let catalog = InMemoryCatalog::new();
        let tenant_id = TenantId::new();
        let record = ProductRecord {
            id: ProductId::new(AggregateId::new()),
            name: "Boule".to_string(),
            selling_price: 900,
            cost_price: 400,
            category: None,
            description: None,
            created_at: Utc::now(),
        };

        catalog.create_product(tenant_id, record.clone()).unwrap();
        let err = catalog.create_product(tenant_id, record).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
    }
}

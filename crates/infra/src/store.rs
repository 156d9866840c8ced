//! Store traits: the IO seams between the pure domain and any backend.
//!
//! Implementations own atomicity: a single `commit`/`save` call either lands
//! entirely or not at all. Services exploit that by deciding everything
//! (handling commands, planning consumptions) before committing anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use atelier_catalog::{ProductId, ProductRecord};
use atelier_core::{ExpectedVersion, TenantId};
use atelier_production::{Production, ProductionId};
use atelier_stock::{StockBatch, StockEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency failure (stale version).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("not found")]
    NotFound,

    /// Backend failure (lock poisoned, serialization, ...).
    #[error("storage failure: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

/// Append-only audit entry recorded alongside every committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub tenant_id: TenantId,
    /// Stream identity, e.g. the product or production id.
    pub stream: String,
    pub sequence_number: u64,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

/// Per-product batch persistence.
pub trait BatchStore: Send + Sync {
    /// All batches of a product, including depleted ones.
    fn list_batches(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<StockBatch>, StoreError>;

    /// Active batches only (the consumption planner's input).
    fn list_active_batches(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<StockBatch>, StoreError>;

    /// Number of events committed to the product's stream so far (0 for a
    /// product with no batches yet).
    fn stream_version(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<u64, StoreError>;

    /// Replace the product's batch set and append the events that produced it
    /// to the audit log. Must be atomic, and must check `expected` against the
    /// current stream version so a plan made against stale batches cannot
    /// overwrite a concurrent commit.
    fn commit(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        batches: &[StockBatch],
        events: &[StockEvent],
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;
}

/// Production aggregate persistence.
pub trait ProductionStore: Send + Sync {
    fn get(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<Production, StoreError>;

    /// Persist the aggregate, checking `expected` against the stored version
    /// (0 when the production does not exist yet).
    fn save(
        &self,
        tenant_id: TenantId,
        production: &Production,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;
}

/// Where materialized products land.
pub trait CatalogSink: Send + Sync {
    fn create_product(
        &self,
        tenant_id: TenantId,
        record: ProductRecord,
    ) -> Result<(), StoreError>;

    fn get_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<ProductRecord, StoreError>;
}

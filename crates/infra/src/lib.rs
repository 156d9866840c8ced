//! Infrastructure layer: store traits, in-memory adapters, application services.
//!
//! Domain crates stay pure; this crate owns IO seams (batch store, production
//! store, catalog sink) and the services that orchestrate load → decide →
//! commit around them, including the publish/materialize engine.

pub mod in_memory;
pub mod ledger;
pub mod publish;
pub mod store;
pub mod workflow;

#[cfg(test)]
mod integration_tests;

pub use in_memory::{InMemoryBatchStore, InMemoryCatalog, InMemoryProductionStore};
pub use ledger::{LedgerError, StockLedger};
pub use publish::{ArticlePublishRequest, EngineError, MaterialShortfall, PublishEngine, PublishRequest};
pub use store::{AuditRecord, BatchStore, CatalogSink, ProductionStore, StoreError};
pub use workflow::{ProductionService, WorkflowError};

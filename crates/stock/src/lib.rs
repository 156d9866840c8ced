//! `atelier-stock` — batch-level stock ledger.
//!
//! Physical stock is an ordered sequence of cost-bearing batches per product.
//! Withdrawals (sales, production materials) consume batches under a FIFO or
//! LIFO policy and yield a per-batch consumption trace used for weighted cost
//! attribution.

pub mod batch;
pub mod error;
pub mod ledger;

pub use batch::{
    plan_consumption, BatchConsumption, BatchId, BatchStatus, ConsumptionPolicy, ConsumptionTrace,
    StockBatch,
};
pub use error::StockError;
pub use ledger::{
    AdjustBatch, BatchAdjusted, BatchDamaged, BatchRestocked, ConsistencyFinding, ConsumeStock,
    ConsumptionReason, ProductStock, RecordDamage, Restock, RestockSource, StockCommand,
    StockConsumed, StockEvent,
};

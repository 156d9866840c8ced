//! Publish/materialize engine: turn a production (or one article) into a
//! sellable catalog product with an initial stock batch, debiting materials.
//!
//! All decisions are made before anything is committed: every material
//! consumption is planned against the store's current batches, the production's
//! publish events are produced, and only then do commits run. A short material
//! therefore aborts the whole publish with nothing written.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use atelier_catalog::{ProductDraft, ProductId, ProductRecord};
use atelier_core::{Aggregate, AggregateId, AggregateRoot, Clock, ExpectedVersion, TenantId};
use atelier_production::{
    ArticleId, MarkArticlePublished, MarkPublished, Production, ProductionCommand, ProductionError,
    ProductionEvent, ProductionId,
};
use atelier_stock::{
    BatchId, ConsumeStock, ConsumptionPolicy, ConsumptionReason, ProductStock, Restock,
    RestockSource, StockCommand, StockError, StockEvent,
};

use crate::store::{BatchStore, CatalogSink, ProductionStore, StoreError};

/// One material the stock ledger could not cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialShortfall {
    pub product_id: ProductId,
    pub required: i64,
    pub available: i64,
    pub shortfall: i64,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Production(#[from] ProductionError),

    #[error(transparent)]
    Stock(#[from] StockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// At least one material is short; nothing was committed.
    #[error("insufficient materials: {} short", .0.len())]
    InsufficientMaterials(Vec<MaterialShortfall>),

    /// The engine is configured to require human cost validation first.
    #[error("production cost has not been validated")]
    CostNotValidated,
}

/// What the caller supplies when publishing a whole production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    /// Selling price of the materialized product, smallest currency unit.
    pub selling_price: i64,
    /// Units placed into the product's initial stock batch.
    pub stock_quantity: i64,
    pub category: Option<String>,
    pub description: Option<String>,
    /// Policy used to debit each material's batches.
    pub policy: ConsumptionPolicy,
}

/// What the caller supplies when publishing a single article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticlePublishRequest {
    pub selling_price: i64,
    pub category: Option<String>,
    pub description: Option<String>,
    pub policy: ConsumptionPolicy,
}

/// A fully planned material debit, ready to commit.
struct PlannedConsumption {
    product_id: ProductId,
    stock: ProductStock,
    events: Vec<StockEvent>,
    /// Stream version the plan was made against; the commit must still see it.
    planned_at_version: u64,
}

pub struct PublishEngine<B, P, C>
where
    B: BatchStore,
    P: ProductionStore,
    C: CatalogSink,
{
    batches: Arc<B>,
    productions: Arc<P>,
    catalog: Arc<C>,
    clock: Arc<dyn Clock>,
    require_validated_cost: bool,
}

impl<B, P, C> PublishEngine<B, P, C>
where
    B: BatchStore,
    P: ProductionStore,
    C: CatalogSink,
{
    pub fn new(
        batches: Arc<B>,
        productions: Arc<P>,
        catalog: Arc<C>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            batches,
            productions,
            catalog,
            clock,
            require_validated_cost: false,
        }
    }

    /// Refuse to publish a production whose cost has not been human-validated.
    pub fn with_required_cost_validation(mut self) -> Self {
        self.require_validated_cost = true;
        self
    }

    /// Publish a whole production as one new product.
    ///
    /// Debits every required material in full, creates the product with
    /// `cost_price = effective cost / stock_quantity` (floor), restocks the new
    /// product with one batch, and marks the production published.
    #[instrument(skip(self, request), fields(%production_id))]
    pub fn publish(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        request: PublishRequest,
    ) -> Result<ProductId, EngineError> {
        if request.stock_quantity <= 0 {
            return Err(ProductionError::validation("stock_quantity must be positive").into());
        }
        if request.selling_price < 0 {
            return Err(ProductionError::validation("selling_price cannot be negative").into());
        }

        let production = self.productions.get(tenant_id, production_id)?;
        let loaded_version = production.version();
        self.check_cost_gate(&production)?;

        let product_id = ProductId::new(AggregateId::new());
        // Pure decision: enforces not-closed / not-already-published.
        let publish_events =
            production.handle(&ProductionCommand::MarkPublished(MarkPublished {
                tenant_id,
                production_id,
                product_id,
                occurred_at: self.clock.now(),
            }))?;

        let debits: Vec<(ProductId, i64)> = production
            .materials()
            .iter()
            .map(|m| (m.product_id, m.required_quantity))
            .collect();
        let planned = self.plan_consumptions(tenant_id, &debits, request.policy)?;

        let unit_cost = production.effective_cost() / request.stock_quantity;
        let draft = ProductDraft {
            name: production.name().to_string(),
            selling_price: request.selling_price,
            cost_price: unit_cost,
            category: request.category,
            description: request.description,
        };

        self.commit(
            tenant_id,
            production,
            loaded_version,
            publish_events,
            planned,
            product_id,
            draft,
            request.stock_quantity,
            unit_cost,
        )?;

        info!(%product_id, unit_cost, "production published");
        Ok(product_id)
    }

    /// Publish one article as its own product.
    ///
    /// Materials are debited pro-rata by the article's share of all articles'
    /// units: `required × article.quantity / total_articles_quantity` (floor;
    /// zero debits are skipped). The unit cost is the production's effective
    /// cost spread over all article units.
    #[instrument(skip(self, request), fields(%production_id, %article_id))]
    pub fn publish_article(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        article_id: ArticleId,
        request: ArticlePublishRequest,
    ) -> Result<ProductId, EngineError> {
        if request.selling_price < 0 {
            return Err(ProductionError::validation("selling_price cannot be negative").into());
        }

        let production = self.productions.get(tenant_id, production_id)?;
        let loaded_version = production.version();
        self.check_cost_gate(&production)?;

        let article = production
            .article(article_id)
            .ok_or(ProductionError::ArticleNotFound(article_id))?
            .clone();
        let total_quantity = production.total_articles_quantity();
        if total_quantity <= 0 {
            return Err(ProductionError::invariant("production has no article units").into());
        }

        let product_id = ProductId::new(AggregateId::new());
        let publish_events =
            production.handle(&ProductionCommand::MarkArticlePublished(MarkArticlePublished {
                tenant_id,
                production_id,
                article_id,
                product_id,
                occurred_at: self.clock.now(),
            }))?;

        let debits: Vec<(ProductId, i64)> = production
            .materials()
            .iter()
            .map(|m| {
                (
                    m.product_id,
                    m.required_quantity * article.quantity / total_quantity,
                )
            })
            .filter(|(_, q)| *q > 0)
            .collect();
        let planned = self.plan_consumptions(tenant_id, &debits, request.policy)?;

        let unit_cost = production.effective_cost() / total_quantity;
        let draft = ProductDraft {
            name: article.name.clone(),
            selling_price: request.selling_price,
            cost_price: unit_cost,
            category: request.category,
            description: request.description,
        };

        self.commit(
            tenant_id,
            production,
            loaded_version,
            publish_events,
            planned,
            product_id,
            draft,
            article.quantity,
            unit_cost,
        )?;

        info!(%product_id, unit_cost, "article published");
        Ok(product_id)
    }

    /// Publish several articles, one at a time.
    ///
    /// Each article is its own publish: an earlier failure does not roll back
    /// articles already published, and later articles are still attempted.
    pub fn bulk_publish_articles(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        article_ids: &[ArticleId],
        request: &ArticlePublishRequest,
    ) -> Vec<(ArticleId, Result<ProductId, EngineError>)> {
        article_ids
            .iter()
            .map(|&article_id| {
                let outcome =
                    self.publish_article(tenant_id, production_id, article_id, request.clone());
                if let Err(err) = &outcome {
                    warn!(%article_id, %err, "article publish failed");
                }
                (article_id, outcome)
            })
            .collect()
    }

    fn check_cost_gate(&self, production: &Production) -> Result<(), EngineError> {
        if self.require_validated_cost && !production.is_cost_validated() {
            return Err(EngineError::CostNotValidated);
        }
        Ok(())
    }

    /// Plan every material debit without committing anything; a single short
    /// material fails the whole plan with the full shortfall list.
    fn plan_consumptions(
        &self,
        tenant_id: TenantId,
        debits: &[(ProductId, i64)],
        policy: ConsumptionPolicy,
    ) -> Result<Vec<PlannedConsumption>, EngineError> {
        let mut planned = Vec::with_capacity(debits.len());
        let mut shortfalls = Vec::new();

        for &(product_id, quantity) in debits {
            let planned_at_version = self.batches.stream_version(tenant_id, product_id)?;
            let batches = self.batches.list_batches(tenant_id, product_id)?;
            let mut stock = ProductStock::from_batches(product_id, tenant_id, batches);
            let command = StockCommand::ConsumeStock(ConsumeStock {
                tenant_id,
                product_id,
                quantity,
                policy,
                reason: ConsumptionReason::ProductionMaterial,
                occurred_at: self.clock.now(),
            });
            match stock.handle(&command) {
                Ok(events) => {
                    for event in &events {
                        stock.apply(event);
                    }
                    planned.push(PlannedConsumption {
                        product_id,
                        stock,
                        events,
                        planned_at_version,
                    });
                }
                Err(StockError::InsufficientStock {
                    requested,
                    available,
                    shortfall,
                }) => shortfalls.push(MaterialShortfall {
                    product_id,
                    required: requested,
                    available,
                    shortfall,
                }),
                Err(other) => return Err(other.into()),
            }
        }

        if !shortfalls.is_empty() {
            return Err(EngineError::InsufficientMaterials(shortfalls));
        }
        Ok(planned)
    }

    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        tenant_id: TenantId,
        mut production: Production,
        loaded_version: u64,
        publish_events: Vec<ProductionEvent>,
        planned: Vec<PlannedConsumption>,
        product_id: ProductId,
        draft: ProductDraft,
        stock_quantity: i64,
        unit_cost: i64,
    ) -> Result<(), EngineError> {
        for plan in &planned {
            self.batches.commit(
                tenant_id,
                plan.product_id,
                plan.stock.batches(),
                &plan.events,
                ExpectedVersion::Exact(plan.planned_at_version),
            )?;
        }

        let created_at = self.clock.now();
        self.catalog
            .create_product(tenant_id, ProductRecord::from_draft(product_id, draft, created_at))?;

        // Initial batch of the materialized product.
        let mut product_stock = ProductStock::empty(product_id);
        let restock = StockCommand::Restock(Restock {
            tenant_id,
            product_id,
            batch_id: BatchId::new(AggregateId::new()),
            quantity: stock_quantity,
            cost_price: unit_cost,
            source: RestockSource::ProductionPublish,
            occurred_at: created_at,
        });
        let restock_events = product_stock.handle(&restock)?;
        for event in &restock_events {
            product_stock.apply(event);
        }
        // The product id is freshly minted, so its stream must be empty.
        self.batches.commit(
            tenant_id,
            product_id,
            product_stock.batches(),
            &restock_events,
            ExpectedVersion::Exact(0),
        )?;

        for event in &publish_events {
            production.apply(event);
        }
        self.productions
            .save(tenant_id, &production, ExpectedVersion::Exact(loaded_version))?;
        Ok(())
    }
}

//! Production workflow service: command orchestration over a [`ProductionStore`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use atelier_core::{Aggregate, AggregateId, AggregateRoot, Clock, ExpectedVersion, TenantId};
use atelier_production::{
    AddArticle, AddMaterial, ArticleId, ArticleStatus, AssignFlow, AttachCharge,
    ChangeArticleStatus, ChangeArticleStep, ChangeStatus, ChangeStep, ChargeId, ChargeKind,
    CloseProduction, CostBreakdown, CreateProduction, FlowStepId, Production, ProductionCommand,
    ProductionError, ProductionFlow, ProductionId, ProductionStatus, RemoveCharge, RemoveMaterial,
    ResetCostValidation, TransitionPolicy, ValidateCost,
};

use atelier_catalog::ProductId;

use crate::store::{ProductionStore, StoreError};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Domain(#[from] ProductionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Application service for production lifecycle commands.
///
/// Saves use `ExpectedVersion::Exact(loaded version)`, so two concurrent
/// mutations of the same production cannot both land.
pub struct ProductionService<P: ProductionStore> {
    store: Arc<P>,
    clock: Arc<dyn Clock>,
}

impl<P: ProductionStore> ProductionService<P> {
    pub fn new(store: Arc<P>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a new production in `Draft`.
    #[instrument(skip(self, name))]
    pub fn create(&self, tenant_id: TenantId, name: String) -> Result<ProductionId, WorkflowError> {
        let production_id = ProductionId::new(AggregateId::new());
        let mut production = Production::empty(production_id);
        let events = production.handle(&ProductionCommand::CreateProduction(CreateProduction {
            tenant_id,
            production_id,
            name,
            occurred_at: self.clock.now(),
        }))?;
        for event in &events {
            production.apply(event);
        }
        self.store
            .save(tenant_id, &production, ExpectedVersion::Exact(0))?;
        info!(%production_id, "production created");
        Ok(production_id)
    }

    fn execute(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        command: ProductionCommand,
    ) -> Result<Production, WorkflowError> {
        let mut production = self.store.get(tenant_id, production_id)?;
        let loaded_version = production.version();
        let events = production.handle(&command)?;
        for event in &events {
            production.apply(event);
        }
        self.store
            .save(tenant_id, &production, ExpectedVersion::Exact(loaded_version))?;
        Ok(production)
    }

    pub fn get(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<Production, WorkflowError> {
        Ok(self.store.get(tenant_id, production_id)?)
    }

    /// Attach a required material with its cost snapshot.
    #[instrument(skip(self), fields(%production_id, %product_id))]
    pub fn add_material(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        product_id: ProductId,
        required_quantity: i64,
        cost_price: i64,
        unit: String,
    ) -> Result<(), WorkflowError> {
        self.execute(
            tenant_id,
            production_id,
            ProductionCommand::AddMaterial(AddMaterial {
                tenant_id,
                production_id,
                product_id,
                required_quantity,
                cost_price,
                unit,
                occurred_at: self.clock.now(),
            }),
        )?;
        Ok(())
    }

    pub fn remove_material(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        product_id: ProductId,
    ) -> Result<(), WorkflowError> {
        self.execute(
            tenant_id,
            production_id,
            ProductionCommand::RemoveMaterial(RemoveMaterial {
                tenant_id,
                production_id,
                product_id,
                occurred_at: self.clock.now(),
            }),
        )?;
        Ok(())
    }

    /// Attach a fixed (master) or custom (one-off) charge snapshot.
    pub fn attach_charge(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        kind: ChargeKind,
        name: String,
        amount: i64,
        category: Option<String>,
    ) -> Result<ChargeId, WorkflowError> {
        let charge_id = ChargeId::new(AggregateId::new());
        self.execute(
            tenant_id,
            production_id,
            ProductionCommand::AttachCharge(AttachCharge {
                tenant_id,
                production_id,
                charge_id,
                kind,
                name,
                amount,
                category,
                occurred_at: self.clock.now(),
            }),
        )?;
        Ok(charge_id)
    }

    pub fn remove_charge(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        charge_id: ChargeId,
    ) -> Result<(), WorkflowError> {
        self.execute(
            tenant_id,
            production_id,
            ProductionCommand::RemoveCharge(RemoveCharge {
                tenant_id,
                production_id,
                charge_id,
                occurred_at: self.clock.now(),
            }),
        )?;
        Ok(())
    }

    /// Current calculated breakdown (materials + charges).
    pub fn cost_breakdown(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<CostBreakdown, WorkflowError> {
        Ok(self.store.get(tenant_id, production_id)?.cost_breakdown())
    }

    #[instrument(skip(self), fields(%production_id))]
    pub fn validate_cost(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        amount: i64,
    ) -> Result<(), WorkflowError> {
        self.execute(
            tenant_id,
            production_id,
            ProductionCommand::ValidateCost(ValidateCost {
                tenant_id,
                production_id,
                amount,
                occurred_at: self.clock.now(),
            }),
        )?;
        info!(amount, "cost validated");
        Ok(())
    }

    pub fn reset_cost_validation(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<(), WorkflowError> {
        self.execute(
            tenant_id,
            production_id,
            ProductionCommand::ResetCostValidation(ResetCostValidation {
                tenant_id,
                production_id,
                occurred_at: self.clock.now(),
            }),
        )?;
        Ok(())
    }

    pub fn change_status(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        new_status: ProductionStatus,
        note: Option<String>,
    ) -> Result<(), WorkflowError> {
        self.execute(
            tenant_id,
            production_id,
            ProductionCommand::ChangeStatus(ChangeStatus {
                tenant_id,
                production_id,
                new_status,
                note,
                occurred_at: self.clock.now(),
            }),
        )?;
        Ok(())
    }

    /// Bind a flow template, switching the production to flow mode.
    pub fn assign_flow(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        flow: &ProductionFlow,
        policy: TransitionPolicy,
        initial_step: Option<FlowStepId>,
    ) -> Result<(), WorkflowError> {
        self.execute(
            tenant_id,
            production_id,
            ProductionCommand::AssignFlow(AssignFlow {
                tenant_id,
                production_id,
                flow_id: flow.id,
                step_ids: flow.step_ids(),
                policy,
                initial_step,
                occurred_at: self.clock.now(),
            }),
        )?;
        Ok(())
    }

    pub fn change_step(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        step_id: FlowStepId,
        note: Option<String>,
    ) -> Result<(), WorkflowError> {
        self.execute(
            tenant_id,
            production_id,
            ProductionCommand::ChangeStep(ChangeStep {
                tenant_id,
                production_id,
                step_id,
                note,
                occurred_at: self.clock.now(),
            }),
        )?;
        Ok(())
    }

    pub fn add_article(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        name: String,
        quantity: i64,
    ) -> Result<ArticleId, WorkflowError> {
        let article_id = ArticleId::new(AggregateId::new());
        self.execute(
            tenant_id,
            production_id,
            ProductionCommand::AddArticle(AddArticle {
                tenant_id,
                production_id,
                article_id,
                name,
                quantity,
                occurred_at: self.clock.now(),
            }),
        )?;
        Ok(article_id)
    }

    pub fn change_article_status(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        article_id: ArticleId,
        new_status: ArticleStatus,
        note: Option<String>,
    ) -> Result<(), WorkflowError> {
        self.execute(
            tenant_id,
            production_id,
            ProductionCommand::ChangeArticleStatus(ChangeArticleStatus {
                tenant_id,
                production_id,
                article_id,
                new_status,
                note,
                occurred_at: self.clock.now(),
            }),
        )?;
        Ok(())
    }

    pub fn change_article_step(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        article_id: ArticleId,
        step_id: FlowStepId,
        note: Option<String>,
    ) -> Result<(), WorkflowError> {
        self.execute(
            tenant_id,
            production_id,
            ProductionCommand::ChangeArticleStep(ChangeArticleStep {
                tenant_id,
                production_id,
                article_id,
                step_id,
                note,
                occurred_at: self.clock.now(),
            }),
        )?;
        Ok(())
    }

    #[instrument(skip(self), fields(%production_id))]
    pub fn close(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
        note: Option<String>,
    ) -> Result<(), WorkflowError> {
        self.execute(
            tenant_id,
            production_id,
            ProductionCommand::CloseProduction(CloseProduction {
                tenant_id,
                production_id,
                note,
                occurred_at: self.clock.now(),
            }),
        )?;
        info!("production closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryProductionStore;
    use atelier_core::FixedClock;
    use chrono::{TimeZone, Utc};

    fn service() -> ProductionService<InMemoryProductionStore> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ProductionService::new(
            Arc::new(InMemoryProductionStore::new()),
            Arc::new(FixedClock::new(start)),
        )
    }

    #[test]
    fn create_then_mutate_persists_each_step() {
        let service = service();
        let tenant_id = TenantId::new();

        let production_id = service.create(tenant_id, "Batch 12".to_string()).unwrap();
        service
            .add_material(
                tenant_id,
                production_id,
                ProductId::new(AggregateId::new()),
                3,
                200,
                "kg".to_string(),
            )
            .unwrap();
        service
            .attach_charge(
                tenant_id,
                production_id,
                ChargeKind::Fixed,
                "Electricity".to_string(),
                500,
                None,
            )
            .unwrap();

        let breakdown = service.cost_breakdown(tenant_id, production_id).unwrap();
        assert_eq!(breakdown.total, 1100);

        let production = service.get(tenant_id, production_id).unwrap();
        assert_eq!(production.status(), ProductionStatus::Draft);
        assert_eq!(production.materials().len(), 1);
        assert_eq!(production.charges().len(), 1);
    }

    #[test]
    fn closed_production_rejects_service_mutations() {
        let service = service();
        let tenant_id = TenantId::new();

        let production_id = service.create(tenant_id, "Batch 13".to_string()).unwrap();
        service.close(tenant_id, production_id, None).unwrap();

        let err = service
            .validate_cost(tenant_id, production_id, 100)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Domain(ProductionError::Closed)));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_catalog::ProductId;
use atelier_core::{Aggregate, AggregateId, AggregateRoot, Entity, Event, TenantId};

use crate::cost::{Charge, ChargeId, ChargeKind, CostBreakdown, Material};
use crate::error::ProductionError;
use crate::flow::{FlowBinding, FlowId, FlowStepId, TransitionPolicy};

/// Production identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductionId(pub AggregateId);

impl ProductionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Article identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(pub AggregateId);

impl ArticleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ArticleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Production status lifecycle (simple mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStatus {
    Draft,
    InProgress,
    Ready,
    Published,
    Cancelled,
    Closed,
}

/// Article status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Draft,
    InProgress,
    Ready,
    Published,
    Cancelled,
}

/// An independently trackable and publishable sub-unit of a production.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub name: String,
    pub quantity: i64,
    pub status: ArticleStatus,
    pub current_step: Option<FlowStepId>,
    pub published_product_id: Option<ProductId>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Article {
    /// An article becomes individually publishable once it reaches
    /// `in_progress` or `ready`, regardless of its siblings.
    pub fn is_publishable(&self) -> bool {
        self.published_product_id.is_none()
            && matches!(self.status, ArticleStatus::InProgress | ArticleStatus::Ready)
    }
}

impl Entity for Article {
    type Id = ArticleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// What a history transition changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TransitionChange {
    Status {
        from: ProductionStatus,
        to: ProductionStatus,
    },
    Step {
        from: Option<FlowStepId>,
        to: FlowStepId,
    },
    ArticleStatus {
        article_id: ArticleId,
        from: ArticleStatus,
        to: ArticleStatus,
    },
    ArticleStep {
        article_id: ArticleId,
        from: Option<FlowStepId>,
        to: FlowStepId,
    },
}

/// One entry of the append-only state history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub change: TransitionChange,
    pub occurred_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Aggregate root: Production.
///
/// Either **simple mode** (status-driven) or **flow mode** (step-driven once a
/// flow is bound) — binding a flow selects flow mode for steps; the status
/// lifecycle keeps tracking publish/close either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Production {
    id: ProductionId,
    tenant_id: Option<TenantId>,
    name: String,
    status: ProductionStatus,
    flow: Option<FlowBinding>,
    current_step: Option<FlowStepId>,
    materials: Vec<Material>,
    charges: Vec<Charge>,
    validated_cost_price: Option<i64>,
    is_cost_validated: bool,
    history: Vec<Transition>,
    articles: Vec<Article>,
    is_published: bool,
    is_closed: bool,
    published_product_id: Option<ProductId>,
    version: u64,
    created: bool,
}

impl Production {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductionId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            status: ProductionStatus::Draft,
            flow: None,
            current_step: None,
            materials: Vec::new(),
            charges: Vec::new(),
            validated_cost_price: None,
            is_cost_validated: false,
            history: Vec::new(),
            articles: Vec::new(),
            is_published: false,
            is_closed: false,
            published_product_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductionId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ProductionStatus {
        self.status
    }

    pub fn flow(&self) -> Option<&FlowBinding> {
        self.flow.as_ref()
    }

    pub fn current_step(&self) -> Option<FlowStepId> {
        self.current_step
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn charges(&self) -> &[Charge] {
        &self.charges
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn article(&self, id: ArticleId) -> Option<&Article> {
        self.articles.iter().find(|a| a.id == id)
    }

    pub fn is_published(&self) -> bool {
        self.is_published
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed
    }

    pub fn is_cost_validated(&self) -> bool {
        self.is_cost_validated
    }

    pub fn validated_cost_price(&self) -> Option<i64> {
        self.validated_cost_price
    }

    pub fn published_product_id(&self) -> Option<ProductId> {
        self.published_product_id
    }

    /// Calculated cost from material snapshots and attached charges.
    pub fn cost_breakdown(&self) -> CostBreakdown {
        CostBreakdown::calculate(&self.materials, &self.charges)
    }

    /// The cost the publish engine should use: validated if present, else
    /// calculated.
    pub fn effective_cost(&self) -> i64 {
        self.validated_cost_price
            .unwrap_or_else(|| self.cost_breakdown().total)
    }

    /// Derived aggregate: number of articles already published.
    pub fn published_articles_count(&self) -> usize {
        self.articles
            .iter()
            .filter(|a| a.published_product_id.is_some())
            .count()
    }

    /// Derived aggregate: total units across all articles.
    pub fn total_articles_quantity(&self) -> i64 {
        self.articles.iter().map(|a| a.quantity).sum()
    }
}

impl AggregateRoot for Production {
    type Id = ProductionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduction {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddMaterial (cost snapshot taken here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMaterial {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub product_id: ProductId,
    pub required_quantity: i64,
    pub cost_price: i64,
    pub unit: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMaterial {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachCharge (snapshot of a fixed master record or a custom one-off).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachCharge {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub charge_id: ChargeId,
    pub kind: ChargeKind,
    pub name: String,
    pub amount: i64,
    pub category: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveCharge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveCharge {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub charge_id: ChargeId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ValidateCost — human-validated override of the calculated cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateCost {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResetCostValidation.
///
/// Cost validation is NOT auto-invalidated when materials or charges change;
/// callers enforce that policy by issuing this command explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetCostValidation {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStatus (simple mode). Any listed status is reachable from
/// any other; sensibility beyond that is caller policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub new_status: ProductionStatus,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignFlow — bind a flow template (selects flow mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignFlow {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub flow_id: FlowId,
    pub step_ids: Vec<FlowStepId>,
    pub policy: TransitionPolicy,
    pub initial_step: Option<FlowStepId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStep (flow mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStep {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub step_id: FlowStepId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddArticle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddArticle {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub article_id: ArticleId,
    pub name: String,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeArticleStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeArticleStatus {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub article_id: ArticleId,
    pub new_status: ArticleStatus,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeArticleStep — articles step independently of the parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeArticleStep {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub article_id: ArticleId,
    pub step_id: FlowStepId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkPublished — issued by the publish engine after materializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPublished {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkArticlePublished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkArticlePublished {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub article_id: ArticleId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseProduction — terminal; blocks all further mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseProduction {
    pub tenant_id: TenantId,
    pub production_id: ProductionId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionCommand {
    CreateProduction(CreateProduction),
    AddMaterial(AddMaterial),
    RemoveMaterial(RemoveMaterial),
    AttachCharge(AttachCharge),
    RemoveCharge(RemoveCharge),
    ValidateCost(ValidateCost),
    ResetCostValidation(ResetCostValidation),
    ChangeStatus(ChangeStatus),
    AssignFlow(AssignFlow),
    ChangeStep(ChangeStep),
    AddArticle(AddArticle),
    ChangeArticleStatus(ChangeArticleStatus),
    ChangeArticleStep(ChangeArticleStep),
    MarkPublished(MarkPublished),
    MarkArticlePublished(MarkArticlePublished),
    CloseProduction(CloseProduction),
}

/// Events (one per command; transitions also append to the history in `apply`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionEvent {
    ProductionCreated {
        tenant_id: TenantId,
        production_id: ProductionId,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    MaterialAdded {
        tenant_id: TenantId,
        production_id: ProductionId,
        material: Material,
        occurred_at: DateTime<Utc>,
    },
    MaterialRemoved {
        tenant_id: TenantId,
        production_id: ProductionId,
        product_id: ProductId,
        occurred_at: DateTime<Utc>,
    },
    ChargeAttached {
        tenant_id: TenantId,
        production_id: ProductionId,
        charge: Charge,
        occurred_at: DateTime<Utc>,
    },
    ChargeRemoved {
        tenant_id: TenantId,
        production_id: ProductionId,
        charge_id: ChargeId,
        occurred_at: DateTime<Utc>,
    },
    CostValidated {
        tenant_id: TenantId,
        production_id: ProductionId,
        amount: i64,
        occurred_at: DateTime<Utc>,
    },
    CostValidationReset {
        tenant_id: TenantId,
        production_id: ProductionId,
        occurred_at: DateTime<Utc>,
    },
    StatusChanged {
        tenant_id: TenantId,
        production_id: ProductionId,
        from: ProductionStatus,
        to: ProductionStatus,
        note: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    FlowAssigned {
        tenant_id: TenantId,
        production_id: ProductionId,
        binding: FlowBinding,
        initial_step: Option<FlowStepId>,
        occurred_at: DateTime<Utc>,
    },
    StepChanged {
        tenant_id: TenantId,
        production_id: ProductionId,
        from: Option<FlowStepId>,
        to: FlowStepId,
        note: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    ArticleAdded {
        tenant_id: TenantId,
        production_id: ProductionId,
        article_id: ArticleId,
        name: String,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    },
    ArticleStatusChanged {
        tenant_id: TenantId,
        production_id: ProductionId,
        article_id: ArticleId,
        from: ArticleStatus,
        to: ArticleStatus,
        note: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    ArticleStepChanged {
        tenant_id: TenantId,
        production_id: ProductionId,
        article_id: ArticleId,
        from: Option<FlowStepId>,
        to: FlowStepId,
        note: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    ProductionPublished {
        tenant_id: TenantId,
        production_id: ProductionId,
        product_id: ProductId,
        occurred_at: DateTime<Utc>,
    },
    ArticlePublished {
        tenant_id: TenantId,
        production_id: ProductionId,
        article_id: ArticleId,
        product_id: ProductId,
        occurred_at: DateTime<Utc>,
    },
    ProductionClosed {
        tenant_id: TenantId,
        production_id: ProductionId,
        note: Option<String>,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for ProductionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductionEvent::ProductionCreated { .. } => "production.created",
            ProductionEvent::MaterialAdded { .. } => "production.material.added",
            ProductionEvent::MaterialRemoved { .. } => "production.material.removed",
            ProductionEvent::ChargeAttached { .. } => "production.charge.attached",
            ProductionEvent::ChargeRemoved { .. } => "production.charge.removed",
            ProductionEvent::CostValidated { .. } => "production.cost.validated",
            ProductionEvent::CostValidationReset { .. } => "production.cost.validation_reset",
            ProductionEvent::StatusChanged { .. } => "production.status.changed",
            ProductionEvent::FlowAssigned { .. } => "production.flow.assigned",
            ProductionEvent::StepChanged { .. } => "production.step.changed",
            ProductionEvent::ArticleAdded { .. } => "production.article.added",
            ProductionEvent::ArticleStatusChanged { .. } => "production.article.status_changed",
            ProductionEvent::ArticleStepChanged { .. } => "production.article.step_changed",
            ProductionEvent::ProductionPublished { .. } => "production.published",
            ProductionEvent::ArticlePublished { .. } => "production.article.published",
            ProductionEvent::ProductionClosed { .. } => "production.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductionEvent::ProductionCreated { occurred_at, .. }
            | ProductionEvent::MaterialAdded { occurred_at, .. }
            | ProductionEvent::MaterialRemoved { occurred_at, .. }
            | ProductionEvent::ChargeAttached { occurred_at, .. }
            | ProductionEvent::ChargeRemoved { occurred_at, .. }
            | ProductionEvent::CostValidated { occurred_at, .. }
            | ProductionEvent::CostValidationReset { occurred_at, .. }
            | ProductionEvent::StatusChanged { occurred_at, .. }
            | ProductionEvent::FlowAssigned { occurred_at, .. }
            | ProductionEvent::StepChanged { occurred_at, .. }
            | ProductionEvent::ArticleAdded { occurred_at, .. }
            | ProductionEvent::ArticleStatusChanged { occurred_at, .. }
            | ProductionEvent::ArticleStepChanged { occurred_at, .. }
            | ProductionEvent::ProductionPublished { occurred_at, .. }
            | ProductionEvent::ArticlePublished { occurred_at, .. }
            | ProductionEvent::ProductionClosed { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Production {
    type Command = ProductionCommand;
    type Event = ProductionEvent;
    type Error = ProductionError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductionEvent::ProductionCreated {
                tenant_id,
                production_id,
                name,
                ..
            } => {
                self.id = *production_id;
                self.tenant_id = Some(*tenant_id);
                self.name = name.clone();
                self.status = ProductionStatus::Draft;
                self.created = true;
            }
            ProductionEvent::MaterialAdded { material, .. } => {
                self.materials.push(material.clone());
            }
            ProductionEvent::MaterialRemoved { product_id, .. } => {
                self.materials.retain(|m| m.product_id != *product_id);
            }
            ProductionEvent::ChargeAttached { charge, .. } => {
                self.charges.push(charge.clone());
            }
            ProductionEvent::ChargeRemoved { charge_id, .. } => {
                self.charges.retain(|c| c.charge_id != *charge_id);
            }
            ProductionEvent::CostValidated { amount, .. } => {
                self.validated_cost_price = Some(*amount);
                self.is_cost_validated = true;
            }
            ProductionEvent::CostValidationReset { .. } => {
                self.validated_cost_price = None;
                self.is_cost_validated = false;
            }
            ProductionEvent::StatusChanged {
                from,
                to,
                note,
                occurred_at,
                ..
            } => {
                self.status = *to;
                if *to == ProductionStatus::Closed {
                    self.is_closed = true;
                }
                if *to == ProductionStatus::Published {
                    self.is_published = true;
                }
                self.history.push(Transition {
                    change: TransitionChange::Status {
                        from: *from,
                        to: *to,
                    },
                    occurred_at: *occurred_at,
                    note: note.clone(),
                });
            }
            ProductionEvent::FlowAssigned {
                binding,
                initial_step,
                ..
            } => {
                self.flow = Some(binding.clone());
                self.current_step = *initial_step;
            }
            ProductionEvent::StepChanged {
                from,
                to,
                note,
                occurred_at,
                ..
            } => {
                self.current_step = Some(*to);
                self.history.push(Transition {
                    change: TransitionChange::Step {
                        from: *from,
                        to: *to,
                    },
                    occurred_at: *occurred_at,
                    note: note.clone(),
                });
            }
            ProductionEvent::ArticleAdded {
                article_id,
                name,
                quantity,
                ..
            } => {
                self.articles.push(Article {
                    id: *article_id,
                    name: name.clone(),
                    quantity: *quantity,
                    status: ArticleStatus::Draft,
                    current_step: None,
                    published_product_id: None,
                    published_at: None,
                });
            }
            ProductionEvent::ArticleStatusChanged {
                article_id,
                from,
                to,
                note,
                occurred_at,
                ..
            } => {
                if let Some(article) = self.articles.iter_mut().find(|a| a.id == *article_id) {
                    article.status = *to;
                }
                self.history.push(Transition {
                    change: TransitionChange::ArticleStatus {
                        article_id: *article_id,
                        from: *from,
                        to: *to,
                    },
                    occurred_at: *occurred_at,
                    note: note.clone(),
                });
            }
            ProductionEvent::ArticleStepChanged {
                article_id,
                from,
                to,
                note,
                occurred_at,
                ..
            } => {
                if let Some(article) = self.articles.iter_mut().find(|a| a.id == *article_id) {
                    article.current_step = Some(*to);
                }
                self.history.push(Transition {
                    change: TransitionChange::ArticleStep {
                        article_id: *article_id,
                        from: *from,
                        to: *to,
                    },
                    occurred_at: *occurred_at,
                    note: note.clone(),
                });
            }
            ProductionEvent::ProductionPublished {
                product_id,
                occurred_at,
                ..
            } => {
                let from = self.status;
                self.status = ProductionStatus::Published;
                self.is_published = true;
                self.published_product_id = Some(*product_id);
                self.history.push(Transition {
                    change: TransitionChange::Status {
                        from,
                        to: ProductionStatus::Published,
                    },
                    occurred_at: *occurred_at,
                    note: None,
                });
            }
            ProductionEvent::ArticlePublished {
                article_id,
                product_id,
                occurred_at,
                ..
            } => {
                let mut from = ArticleStatus::Draft;
                if let Some(article) = self.articles.iter_mut().find(|a| a.id == *article_id) {
                    from = article.status;
                    article.status = ArticleStatus::Published;
                    article.published_product_id = Some(*product_id);
                    article.published_at = Some(*occurred_at);
                }
                self.history.push(Transition {
                    change: TransitionChange::ArticleStatus {
                        article_id: *article_id,
                        from,
                        to: ArticleStatus::Published,
                    },
                    occurred_at: *occurred_at,
                    note: None,
                });
            }
            ProductionEvent::ProductionClosed {
                note, occurred_at, ..
            } => {
                let from = self.status;
                self.status = ProductionStatus::Closed;
                self.is_closed = true;
                self.history.push(Transition {
                    change: TransitionChange::Status {
                        from,
                        to: ProductionStatus::Closed,
                    },
                    occurred_at: *occurred_at,
                    note: note.clone(),
                });
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductionCommand::CreateProduction(cmd) => self.handle_create(cmd),
            ProductionCommand::AddMaterial(cmd) => self.handle_add_material(cmd),
            ProductionCommand::RemoveMaterial(cmd) => self.handle_remove_material(cmd),
            ProductionCommand::AttachCharge(cmd) => self.handle_attach_charge(cmd),
            ProductionCommand::RemoveCharge(cmd) => self.handle_remove_charge(cmd),
            ProductionCommand::ValidateCost(cmd) => self.handle_validate_cost(cmd),
            ProductionCommand::ResetCostValidation(cmd) => self.handle_reset_validation(cmd),
            ProductionCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            ProductionCommand::AssignFlow(cmd) => self.handle_assign_flow(cmd),
            ProductionCommand::ChangeStep(cmd) => self.handle_change_step(cmd),
            ProductionCommand::AddArticle(cmd) => self.handle_add_article(cmd),
            ProductionCommand::ChangeArticleStatus(cmd) => self.handle_article_status(cmd),
            ProductionCommand::ChangeArticleStep(cmd) => self.handle_article_step(cmd),
            ProductionCommand::MarkPublished(cmd) => self.handle_mark_published(cmd),
            ProductionCommand::MarkArticlePublished(cmd) => self.handle_mark_article_published(cmd),
            ProductionCommand::CloseProduction(cmd) => self.handle_close(cmd),
        }
    }
}

impl Production {
    fn ensure_exists(&self) -> Result<(), ProductionError> {
        if !self.created {
            return Err(ProductionError::invariant("production does not exist"));
        }
        Ok(())
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), ProductionError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(ProductionError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_production_id(&self, production_id: ProductionId) -> Result<(), ProductionError> {
        if self.id != production_id {
            return Err(ProductionError::invariant("production_id mismatch"));
        }
        Ok(())
    }

    /// Closed productions accept no further mutations of any kind.
    fn ensure_open(&self) -> Result<(), ProductionError> {
        if self.is_closed {
            return Err(ProductionError::Closed);
        }
        Ok(())
    }

    fn guard(
        &self,
        tenant_id: TenantId,
        production_id: ProductionId,
    ) -> Result<(), ProductionError> {
        self.ensure_exists()?;
        self.ensure_tenant(tenant_id)?;
        self.ensure_production_id(production_id)?;
        self.ensure_open()
    }

    fn handle_create(&self, cmd: &CreateProduction) -> Result<Vec<ProductionEvent>, ProductionError> {
        if self.created {
            return Err(ProductionError::invariant("production already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(ProductionError::validation("name cannot be empty"));
        }
        Ok(vec![ProductionEvent::ProductionCreated {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            name: cmd.name.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_add_material(&self, cmd: &AddMaterial) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        if cmd.required_quantity <= 0 {
            return Err(ProductionError::validation(
                "required_quantity must be positive",
            ));
        }
        if cmd.cost_price < 0 {
            return Err(ProductionError::validation("cost_price cannot be negative"));
        }
        if self.materials.iter().any(|m| m.product_id == cmd.product_id) {
            return Err(ProductionError::validation("material already attached"));
        }

        Ok(vec![ProductionEvent::MaterialAdded {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            material: Material {
                product_id: cmd.product_id,
                required_quantity: cmd.required_quantity,
                cost_price: cmd.cost_price,
                unit: cmd.unit.clone(),
            },
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_remove_material(
        &self,
        cmd: &RemoveMaterial,
    ) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        if !self.materials.iter().any(|m| m.product_id == cmd.product_id) {
            return Err(ProductionError::validation("material not attached"));
        }

        Ok(vec![ProductionEvent::MaterialRemoved {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_attach_charge(
        &self,
        cmd: &AttachCharge,
    ) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        if cmd.amount <= 0 {
            return Err(ProductionError::validation("amount must be positive"));
        }
        if cmd.name.trim().is_empty() {
            return Err(ProductionError::validation("name cannot be empty"));
        }
        if self.charges.iter().any(|c| c.charge_id == cmd.charge_id) {
            return Err(ProductionError::validation("charge already attached"));
        }

        Ok(vec![ProductionEvent::ChargeAttached {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            charge: Charge {
                charge_id: cmd.charge_id,
                kind: cmd.kind,
                name: cmd.name.clone(),
                amount: cmd.amount,
                category: cmd.category.clone(),
                attached_at: cmd.occurred_at,
            },
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_remove_charge(
        &self,
        cmd: &RemoveCharge,
    ) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        if !self.charges.iter().any(|c| c.charge_id == cmd.charge_id) {
            return Err(ProductionError::validation("charge not attached"));
        }

        Ok(vec![ProductionEvent::ChargeRemoved {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            charge_id: cmd.charge_id,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_validate_cost(
        &self,
        cmd: &ValidateCost,
    ) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        if cmd.amount < 0 {
            return Err(ProductionError::validation("amount cannot be negative"));
        }

        Ok(vec![ProductionEvent::CostValidated {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_reset_validation(
        &self,
        cmd: &ResetCostValidation,
    ) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        if !self.is_cost_validated {
            return Err(ProductionError::validation("cost is not validated"));
        }

        Ok(vec![ProductionEvent::CostValidationReset {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_change_status(
        &self,
        cmd: &ChangeStatus,
    ) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        if cmd.new_status == self.status {
            return Err(ProductionError::validation("status unchanged"));
        }

        Ok(vec![ProductionEvent::StatusChanged {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            from: self.status,
            to: cmd.new_status,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_assign_flow(&self, cmd: &AssignFlow) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        if cmd.step_ids.is_empty() {
            return Err(ProductionError::validation("flow has no steps"));
        }
        let binding = FlowBinding {
            flow_id: cmd.flow_id,
            step_ids: cmd.step_ids.clone(),
            policy: cmd.policy,
        };
        if let Some(initial) = cmd.initial_step {
            if !binding.contains(initial) {
                return Err(ProductionError::InvalidStep {
                    attempted: initial,
                    allowed: binding.step_ids.clone(),
                });
            }
        }

        Ok(vec![ProductionEvent::FlowAssigned {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            binding,
            initial_step: cmd.initial_step,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_change_step(&self, cmd: &ChangeStep) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        let flow = self
            .flow
            .as_ref()
            .ok_or_else(|| ProductionError::validation("production is not in flow mode"))?;
        flow.check_transition(self.current_step, cmd.step_id)?;

        Ok(vec![ProductionEvent::StepChanged {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            from: self.current_step,
            to: cmd.step_id,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_add_article(&self, cmd: &AddArticle) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        if cmd.name.trim().is_empty() {
            return Err(ProductionError::validation("name cannot be empty"));
        }
        if cmd.quantity <= 0 {
            return Err(ProductionError::validation("quantity must be positive"));
        }
        if self.articles.iter().any(|a| a.id == cmd.article_id) {
            return Err(ProductionError::validation("article already exists"));
        }

        Ok(vec![ProductionEvent::ArticleAdded {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            article_id: cmd.article_id,
            name: cmd.name.clone(),
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_article_status(
        &self,
        cmd: &ChangeArticleStatus,
    ) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        let article = self
            .article(cmd.article_id)
            .ok_or(ProductionError::ArticleNotFound(cmd.article_id))?;
        if article.status == cmd.new_status {
            return Err(ProductionError::validation("status unchanged"));
        }

        Ok(vec![ProductionEvent::ArticleStatusChanged {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            article_id: cmd.article_id,
            from: article.status,
            to: cmd.new_status,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_article_step(
        &self,
        cmd: &ChangeArticleStep,
    ) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        let article = self
            .article(cmd.article_id)
            .ok_or(ProductionError::ArticleNotFound(cmd.article_id))?;
        let flow = self
            .flow
            .as_ref()
            .ok_or_else(|| ProductionError::validation("production is not in flow mode"))?;
        flow.check_transition(article.current_step, cmd.step_id)?;

        Ok(vec![ProductionEvent::ArticleStepChanged {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            article_id: cmd.article_id,
            from: article.current_step,
            to: cmd.step_id,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_mark_published(
        &self,
        cmd: &MarkPublished,
    ) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        if self.is_published {
            return Err(ProductionError::AlreadyPublished);
        }

        Ok(vec![ProductionEvent::ProductionPublished {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_mark_article_published(
        &self,
        cmd: &MarkArticlePublished,
    ) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        let article = self
            .article(cmd.article_id)
            .ok_or(ProductionError::ArticleNotFound(cmd.article_id))?;
        if article.published_product_id.is_some() {
            return Err(ProductionError::AlreadyPublished);
        }
        if !article.is_publishable() {
            return Err(ProductionError::invariant(
                "article must be in_progress or ready to publish",
            ));
        }

        Ok(vec![ProductionEvent::ArticlePublished {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            article_id: cmd.article_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_close(&self, cmd: &CloseProduction) -> Result<Vec<ProductionEvent>, ProductionError> {
        self.guard(cmd.tenant_id, cmd.production_id)?;

        Ok(vec![ProductionEvent::ProductionClosed {
            tenant_id: cmd.tenant_id,
            production_id: cmd.production_id,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }
}

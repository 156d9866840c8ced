//! `atelier-production` — production cost and workflow engine.
//!
//! A production tracks required materials (with snapshot pricing), attached
//! charges, a calculated/validated cost, and a finite-state workflow: either a
//! flat status lifecycle (simple mode) or an ordered step template (flow mode),
//! with an independent sub-machine per article. Every transition is recorded in
//! an append-only history.

pub mod cost;
pub mod error;
pub mod flow;
pub mod production;

pub use cost::{Charge, ChargeId, ChargeKind, CostBreakdown, Material};
pub use error::ProductionError;
pub use flow::{FlowBinding, FlowId, FlowStep, FlowStepId, ProductionFlow, TransitionPolicy};
pub use production::{
    AddArticle, AddMaterial, Article, ArticleId, ArticleStatus, AssignFlow,
    AttachCharge, ChangeArticleStatus, ChangeArticleStep, ChangeStatus, ChangeStep,
    CloseProduction, CreateProduction, MarkArticlePublished, MarkPublished, Production,
    ProductionCommand, ProductionEvent, ProductionId, ProductionStatus, RemoveCharge,
    RemoveMaterial, ResetCostValidation, Transition, TransitionChange, ValidateCost,
};

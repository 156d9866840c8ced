use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::AggregateId;

/// Catalog product identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Data for a product about to be materialized into the catalog.
///
/// `cost_price` is seeded by the publish engine from the production's
/// validated-or-calculated cost; `selling_price` and the rest are caller-supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    /// Price in smallest currency unit (e.g., cents).
    pub selling_price: i64,
    /// Per-unit cost in smallest currency unit.
    pub cost_price: i64,
    pub category: Option<String>,
    pub description: Option<String>,
}

/// A product as stored by the catalog sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub selling_price: i64,
    pub cost_price: i64,
    pub category: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ProductRecord {
    pub fn from_draft(id: ProductId, draft: ProductDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            selling_price: draft.selling_price,
            cost_price: draft.cost_price,
            category: draft.category,
            description: draft.description,
            created_at,
        }
    }
}

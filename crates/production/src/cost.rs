//! Production cost model: material snapshots, charges, cost breakdown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_catalog::ProductId;
use atelier_core::AggregateId;

/// A required material with its cost **snapshot**.
///
/// `cost_price` is captured when the material is attached, not re-read from
/// live batch costs — later batch repricing must not drift an allocated
/// production's cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub product_id: ProductId,
    pub required_quantity: i64,
    /// Unit cost snapshot in smallest currency unit.
    pub cost_price: i64,
    pub unit: String,
}

impl Material {
    pub fn line_cost(&self) -> i64 {
        self.required_quantity * self.cost_price
    }
}

/// Charge identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChargeId(pub AggregateId);

impl ChargeId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ChargeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Fixed charges are reusable master records; custom charges are
/// production-scoped one-offs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeKind {
    Fixed,
    Custom,
}

/// A cost line item attached to a production — a snapshot taken at attach time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub charge_id: ChargeId,
    pub kind: ChargeKind,
    pub name: String,
    /// Amount in smallest currency unit.
    pub amount: i64,
    pub category: Option<String>,
    pub attached_at: DateTime<Utc>,
}

/// Cost breakdown: materials + charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub materials_cost: i64,
    pub charges_total: i64,
    pub total: i64,
}

impl CostBreakdown {
    /// `materials_cost = Σ required_quantity × snapshot cost`,
    /// `charges_total = Σ charge.amount`, `total` is their sum.
    pub fn calculate(materials: &[Material], charges: &[Charge]) -> Self {
        let materials_cost = materials.iter().map(Material::line_cost).sum();
        let charges_total = charges.iter().map(|c| c.amount).sum();
        Self {
            materials_cost,
            charges_total,
            total: materials_cost + charges_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(quantity: i64, cost: i64) -> Material {
        Material {
            product_id: ProductId::new(AggregateId::new()),
            required_quantity: quantity,
            cost_price: cost,
            unit: "kg".to_string(),
        }
    }

    fn charge(kind: ChargeKind, amount: i64) -> Charge {
        Charge {
            charge_id: ChargeId::new(AggregateId::new()),
            kind,
            name: "charge".to_string(),
            amount,
            category: None,
            attached_at: Utc::now(),
        }
    }

    #[test]
    fn breakdown_sums_materials_and_charges() {
        let materials = vec![material(3, 200), material(2, 150)];
        let charges = vec![charge(ChargeKind::Fixed, 500), charge(ChargeKind::Custom, 120)];

        let breakdown = CostBreakdown::calculate(&materials, &charges);

        assert_eq!(breakdown.materials_cost, 900);
        assert_eq!(breakdown.charges_total, 620);
        assert_eq!(breakdown.total, 1520);
    }

    #[test]
    fn empty_production_costs_nothing() {
        let breakdown = CostBreakdown::calculate(&[], &[]);
        assert_eq!(breakdown.total, 0);
    }
}

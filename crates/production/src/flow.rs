//! Flow templates: ordered step sequences for flow-mode productions.

use serde::{Deserialize, Serialize};

use atelier_core::AggregateId;

use crate::error::ProductionError;

/// Flow template identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(pub AggregateId);

impl FlowId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for FlowId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Flow step identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowStepId(pub AggregateId);

impl FlowStepId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for FlowStepId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One named stage in a flow template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStep {
    pub id: FlowStepId,
    pub name: String,
    pub color: String,
    pub image: Option<String>,
}

/// Ordered template of stages a flow-mode production can occupy.
///
/// Step ordering defines intended progression; whether it is enforced depends
/// on the [`TransitionPolicy`] chosen when the flow is bound to a production.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionFlow {
    pub id: FlowId,
    pub name: String,
    pub steps: Vec<FlowStep>,
}

impl ProductionFlow {
    pub fn step_ids(&self) -> Vec<FlowStepId> {
        self.steps.iter().map(|s| s.id).collect()
    }

    pub fn first_step(&self) -> Option<FlowStepId> {
        self.steps.first().map(|s| s.id)
    }
}

/// Step adjacency policy for a bound flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Any step in the list is reachable from any other (source behavior).
    #[default]
    Permissive,
    /// Only steps strictly after the current one are reachable.
    StrictSequential,
}

/// A flow as bound to one production: the step sequence snapshot + policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowBinding {
    pub flow_id: FlowId,
    pub step_ids: Vec<FlowStepId>,
    pub policy: TransitionPolicy,
}

impl FlowBinding {
    pub fn contains(&self, step_id: FlowStepId) -> bool {
        self.step_ids.contains(&step_id)
    }

    pub fn position(&self, step_id: FlowStepId) -> Option<usize> {
        self.step_ids.iter().position(|s| *s == step_id)
    }

    /// Validate a step transition under this binding's policy.
    pub fn check_transition(
        &self,
        from: Option<FlowStepId>,
        to: FlowStepId,
    ) -> Result<(), ProductionError> {
        if !self.contains(to) {
            return Err(ProductionError::InvalidStep {
                attempted: to,
                allowed: self.step_ids.clone(),
            });
        }

        if self.policy == TransitionPolicy::StrictSequential {
            if let Some(from) = from {
                let from_pos = self.position(from);
                let to_pos = self.position(to);
                match (from_pos, to_pos) {
                    (Some(f), Some(t)) if t > f => {}
                    _ => {
                        return Err(ProductionError::InvalidStep {
                            attempted: to,
                            allowed: self
                                .step_ids
                                .iter()
                                .copied()
                                .skip(from_pos.map(|f| f + 1).unwrap_or(0))
                                .collect(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

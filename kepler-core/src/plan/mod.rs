//! Diagram plan: the pre-layout bridge between the property graph and the
//! scene builder. Created by the planner, read by the scene builder and the
//! layout engine, never mutated afterwards.

pub mod planner;
pub mod temporal;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::NodeType;
use crate::types::{Domain, Position};

pub use planner::Planner;
pub use temporal::{TemporalAnalysis, TemporalAnalyzer, TransitionKind};

// ── Strategy / solver / priority ───────────────────────────────────

/// How the scene builder assembles the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    Direct,
    Hierarchical,
    ConstraintFirst,
}

/// Which layout back-end the plan nominates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverChoice {
    Heuristic,
    Smt,
    Symbolic,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

// ── Plan pieces ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntity {
    /// Stable id; equals the originating graph node id.
    pub id: String,
    pub entity_type: NodeType,
    pub label: String,
    pub properties: BTreeMap<String, serde_json::Value>,
    pub primitive_hint: Option<String>,
}

/// Visual relation between two plan entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    Series,
    Parallel,
    ConnectedTo,
    ActsOn,
    Contains,
    LocatedAt,
    RelatedTo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRelation {
    pub source_id: String,
    pub target_id: String,
    pub kind: RelationKind,
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintKind {
    Distance,
    Alignment,
    NoOverlap,
    Bounds,
    Between,
    Above,
    Below,
    LeftOf,
    RightOf,
    ClosedLoop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConstraint {
    pub kind: ConstraintKind,
    pub entities: Vec<String>,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl LayoutConstraint {
    pub fn new(kind: ConstraintKind, entities: Vec<String>, priority: Priority) -> Self {
        Self { kind, entities, priority, parameters: BTreeMap::new() }
    }

    pub fn with_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(serde_json::Value::as_f64)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(serde_json::Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutHints {
    pub solver: SolverChoice,
    /// Initial positions from the heuristic planning pass.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub positions: BTreeMap<String, Position>,
    pub canvas_w: f64,
    pub canvas_h: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleHint {
    pub fill: String,
    pub stroke: String,
    pub stroke_width: f64,
    pub width: f64,
    pub height: f64,
    /// Domain symbol override (`battery_symbol`, `resistor_zigzag`, …).
    pub symbol: Option<String>,
}

// ── The plan ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramPlan {
    pub original_request: String,
    pub domain: Option<Domain>,
    /// Weighted complexity in `[0, 1]`.
    pub complexity_score: f64,
    pub strategy: Strategy,
    pub entities: Vec<PlanEntity>,
    pub relations: Vec<PlanRelation>,
    pub constraints: Vec<LayoutConstraint>,
    pub layout_hints: LayoutHints,
    pub style_hints: BTreeMap<String, StyleHint>,
}

impl DiagramPlan {
    pub fn entity(&self, id: &str) -> Option<&PlanEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn has_critical_constraint(&self) -> bool {
        self.constraints.iter().any(|c| c.priority == Priority::Critical)
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Weighted sum of entity, relation and constraint counts, plus a bump for
/// any CRITICAL constraint. Clamped to `[0, 1]`.
#[allow(clippy::cast_precision_loss)]
pub fn complexity_score(
    entity_count: usize,
    relation_count: usize,
    constraint_count: usize,
    has_critical: bool,
) -> f64 {
    let entities = (entity_count as f64 / 20.0).min(1.0) * 0.4;
    let relations = (relation_count as f64 / 20.0).min(1.0) * 0.25;
    let constraints = (constraint_count as f64 / 30.0).min(1.0) * 0.2;
    let critical = if has_critical { 0.15 } else { 0.0 };
    (entities + relations + constraints + critical).clamp(0.0, 1.0)
}

/// Strategy selection thresholds. A plan is constraint-dominant when it
/// carries more than two constraints per entity.
pub fn select_strategy(score: f64, entity_count: usize, constraint_count: usize) -> Strategy {
    if score < 0.4 {
        Strategy::Direct
    } else if score < 0.7 && constraint_count > entity_count * 2 {
        Strategy::ConstraintFirst
    } else {
        Strategy::Hierarchical
    }
}

/// Solver choice by entity count: small plans stay heuristic, mid-size plans
/// go to the constraint solver, anything larger is left to the symbolic path.
pub fn select_solver(entity_count: usize) -> SolverChoice {
    if entity_count <= 5 {
        SolverChoice::Heuristic
    } else if entity_count <= 15 {
        SolverChoice::Smt
    } else {
        SolverChoice::Symbolic
    }
}

// ── Tests ──────────────────────────────────────────────────────────

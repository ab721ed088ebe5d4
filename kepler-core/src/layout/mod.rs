//! Layout engine: heuristic solver + constraint-solver back-end + symbolic
//! verifier, with strategy dispatch and fallback.
//!
//! Dispatch: simple DIRECT plans go straight to the heuristic; constraint-
//! heavy plans try the solver back-end first and fall back to the heuristic
//! on UNSAT or timeout. The symbolic verifier always runs afterwards and its
//! violations feed the refinement loop.

pub mod heuristic;
pub mod solver;
pub mod symbolic;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::plan::{DiagramPlan, Strategy};
use crate::scene::Scene;

pub use heuristic::{HeuristicConfig, HeuristicSolver, HeuristicStats};
pub use solver::{ConstraintSolver, ProjectionSolver, SolverSolution};
pub use symbolic::{GeometryVerifier, VerificationReport};

/// Which path produced the final positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverUsed {
    Heuristic,
    Smt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutOutcome {
    pub solver: SolverUsed,
    /// Present when the solver back-end ran (successfully or not).
    pub smt: Option<SolverSolution>,
    pub verification: VerificationReport,
    pub issues: Vec<String>,
}

#[derive(Debug)]
pub struct LayoutEngine {
    heuristic: HeuristicSolver,
    backend: Box<dyn ConstraintSolver>,
    smt_enabled: bool,
    smt_timeout: Duration,
}

impl LayoutEngine {
    pub fn new(smt_enabled: bool, smt_timeout: Duration) -> Self {
        Self {
            heuristic: HeuristicSolver::default(),
            backend: Box::new(ProjectionSolver),
            smt_enabled,
            smt_timeout,
        }
    }

    /// Test seam: replace the solver back-end.
    pub fn with_backend(mut self, backend: Box<dyn ConstraintSolver>) -> Self {
        self.backend = backend;
        self
    }

    /// Assign positions to every layout-participating object.
    pub fn layout(&self, scene: &mut Scene, plan: &DiagramPlan) -> LayoutOutcome {
        let mut issues = Vec::new();
        let mut smt_solution = None;

        let simple = plan.strategy == Strategy::Direct && plan.complexity_score < 0.5;
        let try_smt = self.smt_enabled && !simple && !plan.entities.is_empty();

        let mut solver_used = SolverUsed::Heuristic;
        if try_smt {
            let dims = object_dims(plan, scene);
            let solution = self.backend.solve_layout(plan, &dims, self.smt_timeout);
            if solution.satisfiable {
                for (id, position) in &solution.positions {
                    if let Some(object) = scene.object_mut(id) {
                        object.position = Some(*position);
                    }
                }
                solver_used = SolverUsed::Smt;
                info!(
                    backend = self.backend.name(),
                    elapsed_ms = solution.elapsed_ms,
                    "solver back-end placed the plan entities"
                );
            } else {
                issues.push(format!(
                    "constraint solver unsatisfiable after {}ms; falling back to heuristic",
                    solution.elapsed_ms
                ));
                debug!("solver reported UNSAT/timeout; heuristic fallback");
            }
            smt_solution = Some(solution);
        }

        // The heuristic always runs: it is the whole path in fallback mode,
        // and the wire/label/aesthetic finisher after a solver placement.
        let stats = self.heuristic.solve(scene);
        issues.extend(stats.issues);

        let verification = GeometryVerifier.verify(scene);
        for violation in &verification.violated {
            debug!(kind = ?violation.kind, details = %violation.details, "constraint violated after layout");
        }

        LayoutOutcome { solver: solver_used, smt: smt_solution, verification, issues }
    }
}

/// Entity dimensions for the solver: scene objects first, style hints second.
fn object_dims(plan: &DiagramPlan, scene: &Scene) -> BTreeMap<String, (f64, f64)> {
    plan.entities
        .iter()
        .map(|entity| {
            let dims = scene
                .object(&entity.id)
                .map(|o| {
                    let (hw, hh) = o.half_extent();
                    (hw * 2.0, hh * 2.0)
                })
                .or_else(|| plan.style_hints.get(&entity.id).map(|s| (s.width, s.height)))
                .unwrap_or((50.0, 50.0));
            (entity.id.clone(), dims)
        })
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeType;
    use crate::plan::{
        ConstraintKind, LayoutConstraint, LayoutHints, PlanEntity, Priority, SolverChoice,
    };
    use crate::scene::{PrimitiveType, RenderLayer, SceneObject};
    use crate::types::Domain;

    fn plan_and_scene(strategy: Strategy, score: f64) -> (DiagramPlan, Scene) {
        let entities: Vec<PlanEntity> = ["a", "b"]
            .iter()
            .map(|id| PlanEntity {
                id: (*id).to_string(),
                entity_type: NodeType::Object,
                label: (*id).to_string(),
                properties: BTreeMap::new(),
                primitive_hint: None,
            })
            .collect();
        let plan = DiagramPlan {
            original_request: "test".into(),
            domain: Some(Domain::General),
            complexity_score: score,
            strategy,
            entities,
            relations: vec![],
            constraints: vec![LayoutConstraint::new(
                ConstraintKind::NoOverlap,
                vec!["a".into(), "b".into()],
                Priority::Normal,
            )],
            layout_hints: LayoutHints {
                solver: SolverChoice::Smt,
                positions: BTreeMap::new(),
                canvas_w: 800.0,
                canvas_h: 600.0,
            },
            style_hints: BTreeMap::new(),
        };
        let mut scene = Scene::new(800.0, 600.0, Domain::General);
        for id in ["a", "b"] {
            scene
                .add_object(SceneObject::new(id, PrimitiveType::Rectangle, RenderLayer::Shapes))
                .unwrap();
        }
        scene.constraints = plan.constraints.clone();
        (plan, scene)
    }

    #[test]
    fn simple_direct_plans_stay_heuristic() {
        let (plan, mut scene) = plan_and_scene(Strategy::Direct, 0.2);
        let engine = LayoutEngine::new(true, Duration::from_secs(1));
        let outcome = engine.layout(&mut scene, &plan);
        assert_eq!(outcome.solver, SolverUsed::Heuristic);
        assert!(outcome.smt.is_none());
        assert!(scene.unpositioned().is_empty());
    }

    #[test]
    fn constraint_first_plans_try_the_backend() {
        let (plan, mut scene) = plan_and_scene(Strategy::ConstraintFirst, 0.6);
        let engine = LayoutEngine::new(true, Duration::from_secs(1));
        let outcome = engine.layout(&mut scene, &plan);
        assert!(outcome.smt.is_some());
        assert!(scene.unpositioned().is_empty());
    }

    #[test]
    fn unsat_backend_falls_back_to_heuristic() {
        let (plan, mut scene) = plan_and_scene(Strategy::ConstraintFirst, 0.6);
        let engine = LayoutEngine::new(true, Duration::from_secs(1))
            .with_backend(Box::new(solver::UnsatSolver));
        let outcome = engine.layout(&mut scene, &plan);
        assert_eq!(outcome.solver, SolverUsed::Heuristic);
        assert!(outcome.issues.iter().any(|i| i.contains("unsatisfiable")));
        // Fallback still positions everything.
        assert!(scene.unpositioned().is_empty());
    }

    #[test]
    fn smt_disabled_skips_backend() {
        let (plan, mut scene) = plan_and_scene(Strategy::ConstraintFirst, 0.6);
        let engine = LayoutEngine::new(false, Duration::from_secs(1));
        let outcome = engine.layout(&mut scene, &plan);
        assert!(outcome.smt.is_none());
        assert_eq!(outcome.solver, SolverUsed::Heuristic);
    }

    #[test]
    fn verification_always_runs() {
        let (plan, mut scene) = plan_and_scene(Strategy::Direct, 0.1);
        let engine = LayoutEngine::new(true, Duration::from_secs(1));
        let outcome = engine.layout(&mut scene, &plan);
        assert_eq!(
            outcome.verification.satisfied.len() + outcome.verification.violated.len(),
            scene.constraints.len()
        );
    }
}

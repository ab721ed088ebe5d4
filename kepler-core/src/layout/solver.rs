//! Constraint-solver back-end for mid-size plans.
//!
//! The solver is a black box behind [`ConstraintSolver`]: it receives the
//! plan's constraints as assertions over `(x_i, y_i)` and returns positions
//! or `satisfiable = false`. The built-in back-end is a priority-weighted
//! iterative projection kernel with a hard wall-clock timeout; an external
//! SMT process can be plugged in through the same trait.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::plan::{DiagramPlan, Priority};
use crate::scene::{PrimitiveType, RenderLayer, Scene, SceneObject};
use crate::types::Position;

use super::heuristic::{HeuristicConfig, HeuristicSolver};
use super::symbolic;

/// Solution returned by a solver back-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverSolution {
    pub satisfiable: bool,
    pub positions: BTreeMap<String, Position>,
    pub satisfied_constraints: usize,
    pub total_constraints: usize,
    pub elapsed_ms: u64,
}

/// Contract for layout-constraint solvers.
pub trait ConstraintSolver: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Solve for entity positions. `object_dims` maps entity id to `(w, h)`.
    fn solve_layout(
        &self,
        plan: &DiagramPlan,
        object_dims: &BTreeMap<String, (f64, f64)>,
        timeout: Duration,
    ) -> SolverSolution;
}

/// Built-in projection back-end.
#[derive(Debug, Default)]
pub struct ProjectionSolver;

impl ConstraintSolver for ProjectionSolver {
    fn name(&self) -> &'static str {
        "projection"
    }

    fn solve_layout(
        &self,
        plan: &DiagramPlan,
        object_dims: &BTreeMap<String, (f64, f64)>,
        timeout: Duration,
    ) -> SolverSolution {
        let start = Instant::now();

        // Assertion system: one rectangle variable per entity, constrained by
        // the plan. Reuses the relaxation kernel over a synthetic scene.
        let mut system = Scene::new(
            plan.layout_hints.canvas_w,
            plan.layout_hints.canvas_h,
            plan.domain.unwrap_or_default(),
        );
        for entity in &plan.entities {
            let (w, h) = object_dims.get(&entity.id).copied().unwrap_or((50.0, 50.0));
            let mut object =
                SceneObject::new(&entity.id, PrimitiveType::Rectangle, RenderLayer::Shapes)
                    .with_prop("width", serde_json::json!(w))
                    .with_prop("height", serde_json::json!(h));
            object.position = plan.layout_hints.positions.get(&entity.id).copied();
            if system.add_object(object).is_err() {
                return SolverSolution {
                    satisfiable: false,
                    positions: BTreeMap::new(),
                    satisfied_constraints: 0,
                    total_constraints: plan.constraints.len(),
                    elapsed_ms: elapsed_ms(start),
                };
            }
        }
        for constraint in &plan.constraints {
            // Constraints over filtered entities cannot be asserted.
            let _ = system.add_constraint(constraint.clone());
        }

        let kernel = HeuristicSolver {
            config: HeuristicConfig { max_iterations: 10, epsilon: 0.25 },
        };
        let deadline = start + timeout;
        let mut rounds: u32 = 0;
        let mut timed_out = false;
        loop {
            kernel.solve(&mut system);
            rounds += 1;
            if critical_satisfied(&system) || rounds >= 50 {
                break;
            }
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }
        }

        let satisfied = count_satisfied(&system);
        let satisfiable = !timed_out && critical_satisfied(&system);
        let positions = system
            .objects
            .iter()
            .filter_map(|o| o.position.map(|p| (o.id.clone(), p)))
            .collect();

        debug!(
            satisfiable,
            rounds,
            satisfied,
            total = system.constraints.len(),
            "projection solve finished"
        );

        SolverSolution {
            satisfiable,
            positions,
            satisfied_constraints: satisfied,
            total_constraints: system.constraints.len(),
            elapsed_ms: elapsed_ms(start),
        }
    }
}

/// CRITICAL and HIGH assertions must hold for the solution to count.
fn critical_satisfied(scene: &Scene) -> bool {
    scene
        .constraints
        .iter()
        .filter(|c| c.priority >= Priority::High)
        .all(|c| symbolic::evaluate(scene, c, symbolic::TOLERANCE).is_ok())
}

fn count_satisfied(scene: &Scene) -> usize {
    scene
        .constraints
        .iter()
        .filter(|c| symbolic::evaluate(scene, c, symbolic::TOLERANCE).is_ok())
        .count()
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// A solver that always reports UNSAT. Exercises the heuristic fallback.
#[derive(Debug, Default)]
pub struct UnsatSolver;

impl ConstraintSolver for UnsatSolver {
    fn name(&self) -> &'static str {
        "unsat"
    }

    fn solve_layout(
        &self,
        plan: &DiagramPlan,
        _object_dims: &BTreeMap<String, (f64, f64)>,
        _timeout: Duration,
    ) -> SolverSolution {
        SolverSolution {
            satisfiable: false,
            positions: BTreeMap::new(),
            satisfied_constraints: 0,
            total_constraints: plan.constraints.len(),
            elapsed_ms: 0,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeType;
    use crate::plan::{
        ConstraintKind, LayoutConstraint, LayoutHints, PlanEntity, SolverChoice, Strategy,
    };
    use crate::types::Domain;

    fn plan_with(
        ids: &[&str],
        constraints: Vec<LayoutConstraint>,
    ) -> (DiagramPlan, BTreeMap<String, (f64, f64)>) {
        let plan = DiagramPlan {
            original_request: "test".into(),
            domain: Some(Domain::General),
            complexity_score: 0.5,
            strategy: Strategy::ConstraintFirst,
            entities: ids
                .iter()
                .map(|id| PlanEntity {
                    id: (*id).to_string(),
                    entity_type: NodeType::Object,
                    label: (*id).to_string(),
                    properties: BTreeMap::new(),
                    primitive_hint: None,
                })
                .collect(),
            relations: vec![],
            constraints,
            layout_hints: LayoutHints {
                solver: SolverChoice::Smt,
                positions: BTreeMap::new(),
                canvas_w: 800.0,
                canvas_h: 600.0,
            },
            style_hints: BTreeMap::new(),
        };
        let dims = ids.iter().map(|id| ((*id).to_string(), (40.0, 40.0))).collect();
        (plan, dims)
    }

    #[test]
    fn satisfiable_system_returns_positions() {
        let (plan, dims) = plan_with(
            &["a", "b"],
            vec![
                LayoutConstraint::new(
                    ConstraintKind::Distance,
                    vec!["a".into(), "b".into()],
                    Priority::High,
                )
                .with_param("min", serde_json::json!(80.0))
                .with_param("max", serde_json::json!(200.0)),
                LayoutConstraint::new(
                    ConstraintKind::Bounds,
                    vec!["a".into()],
                    Priority::Normal,
                )
                .with_param("width", serde_json::json!(800.0))
                .with_param("height", serde_json::json!(600.0)),
            ],
        );
        let solution = ProjectionSolver.solve_layout(&plan, &dims, Duration::from_secs(5));
        assert!(solution.satisfiable);
        assert_eq!(solution.positions.len(), 2);
        let a = solution.positions["a"];
        let b = solution.positions["b"];
        let d = a.distance_to(&b);
        assert!((75.0..=205.0).contains(&d), "distance {d}");
    }

    #[test]
    fn contradictory_assertions_are_unsat() {
        // Two objects forced both coincident and far apart.
        let (plan, dims) = plan_with(
            &["a", "b"],
            vec![
                LayoutConstraint::new(
                    ConstraintKind::Distance,
                    vec!["a".into(), "b".into()],
                    Priority::Critical,
                )
                .with_param("min", serde_json::json!(0.0))
                .with_param("max", serde_json::json!(1.0)),
                LayoutConstraint::new(
                    ConstraintKind::Distance,
                    vec!["a".into(), "b".into()],
                    Priority::Critical,
                )
                .with_param("min", serde_json::json!(500.0))
                .with_param("max", serde_json::json!(600.0)),
            ],
        );
        let solution = ProjectionSolver.solve_layout(&plan, &dims, Duration::from_millis(300));
        assert!(!solution.satisfiable);
    }

    #[test]
    fn timeout_is_respected() {
        let (plan, dims) = plan_with(
            &["a", "b"],
            vec![
                LayoutConstraint::new(
                    ConstraintKind::Distance,
                    vec!["a".into(), "b".into()],
                    Priority::Critical,
                )
                .with_param("min", serde_json::json!(0.0))
                .with_param("max", serde_json::json!(1.0)),
                LayoutConstraint::new(
                    ConstraintKind::Distance,
                    vec!["a".into(), "b".into()],
                    Priority::Critical,
                )
                .with_param("min", serde_json::json!(500.0))
                .with_param("max", serde_json::json!(600.0)),
            ],
        );
        let start = Instant::now();
        let solution = ProjectionSolver.solve_layout(&plan, &dims, Duration::from_millis(50));
        assert!(!solution.satisfiable);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn unsat_stub_reports_unsatisfiable() {
        let (plan, dims) = plan_with(&["a"], vec![]);
        let solution = UnsatSolver.solve_layout(&plan, &dims, Duration::from_secs(1));
        assert!(!solution.satisfiable);
        assert!(solution.positions.is_empty());
    }
}

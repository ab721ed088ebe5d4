//! Symbolic geometry verifier.
//!
//! Independent post-layout check: every spatial constraint is evaluated
//! directly against the recorded coordinates, with a fixed tolerance, so
//! numerical drift from the iterative solvers cannot go unnoticed. The
//! violations feed the refinement loop.

use serde::{Deserialize, Serialize};

use crate::plan::ConstraintKind;
use crate::scene::{Constraint, Scene};
use crate::types::Position;

/// Coordinate tolerance in canvas units.
pub const TOLERANCE: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintViolation {
    /// Index of the constraint in `scene.constraints`.
    pub index: usize,
    pub kind: ConstraintKind,
    pub entities: Vec<String>,
    pub details: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    pub satisfied: Vec<usize>,
    pub violated: Vec<ConstraintViolation>,
}

impl VerificationReport {
    pub fn all_satisfied(&self) -> bool {
        self.violated.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct GeometryVerifier;

impl GeometryVerifier {
    pub fn verify(&self, scene: &Scene) -> VerificationReport {
        let mut report = VerificationReport::default();
        for (index, constraint) in scene.constraints.iter().enumerate() {
            match evaluate(scene, constraint, TOLERANCE) {
                Ok(()) => report.satisfied.push(index),
                Err(details) => report.violated.push(ConstraintViolation {
                    index,
                    kind: constraint.kind,
                    entities: constraint.entities.clone(),
                    details,
                }),
            }
        }
        report
    }
}

/// Evaluate one constraint; `Err` carries the violation detail.
pub fn evaluate(scene: &Scene, constraint: &Constraint, tolerance: f64) -> Result<(), String> {
    let positions: Option<Vec<Position>> = constraint
        .entities
        .iter()
        .map(|id| scene.object(id).and_then(|o| o.position))
        .collect();
    let Some(positions) = positions else {
        return Err("unpositioned or missing entity".to_string());
    };

    match constraint.kind {
        ConstraintKind::Distance => {
            let [a, b] = positions.as_slice() else {
                return Err("distance needs two entities".into());
            };
            let d = a.distance_to(b);
            let min = constraint.param_f64("min").unwrap_or(0.0);
            let max = constraint.param_f64("max").unwrap_or(f64::INFINITY);
            if d + tolerance < min {
                Err(format!("distance {d:.1} below minimum {min:.1}"))
            } else if d - tolerance > max {
                Err(format!("distance {d:.1} above maximum {max:.1}"))
            } else {
                Ok(())
            }
        }
        ConstraintKind::Alignment => {
            if positions.len() < 2 {
                return Ok(());
            }
            let horizontal = constraint.param_str("axis") != Some("vertical");
            let coords: Vec<f64> = positions
                .iter()
                .map(|p| if horizontal { p.y } else { p.x })
                .collect();
            let min = coords.iter().copied().fold(f64::INFINITY, f64::min);
            let max = coords.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if max - min > tolerance {
                Err(format!("alignment spread {:.1} exceeds tolerance", max - min))
            } else {
                Ok(())
            }
        }
        ConstraintKind::NoOverlap => {
            let [a_id, b_id] = constraint.entities.as_slice() else {
                return Err("no-overlap needs two entities".into());
            };
            let (Some(a), Some(b)) = (scene.object(a_id), scene.object(b_id)) else {
                return Err("missing object".into());
            };
            let (pa, pb) = (positions[0], positions[1]);
            let (ahw, ahh) = a.half_extent();
            let (bhw, bhh) = b.half_extent();
            let overlap_x = (ahw + bhw) - (pa.x - pb.x).abs();
            let overlap_y = (ahh + bhh) - (pa.y - pb.y).abs();
            if overlap_x > tolerance && overlap_y > tolerance {
                Err(format!("boxes overlap by {:.1}x{:.1}", overlap_x, overlap_y))
            } else {
                Ok(())
            }
        }
        ConstraintKind::Bounds => {
            let width = constraint.param_f64("width").unwrap_or(f64::INFINITY);
            let height = constraint.param_f64("height").unwrap_or(f64::INFINITY);
            for p in &positions {
                if p.x < -tolerance
                    || p.y < -tolerance
                    || p.x > width + tolerance
                    || p.y > height + tolerance
                {
                    return Err(format!("position ({:.1}, {:.1}) outside canvas", p.x, p.y));
                }
            }
            Ok(())
        }
        ConstraintKind::Between => {
            let [subject, first, second] = positions.as_slice() else {
                return Err("between needs three entities".into());
            };
            let axis_x = (second.x - first.x).abs();
            let axis_y = (second.y - first.y).abs();
            let (value, lo, hi) = if axis_y >= axis_x {
                (subject.y, first.y.min(second.y), first.y.max(second.y))
            } else {
                (subject.x, first.x.min(second.x), first.x.max(second.x))
            };
            if value + tolerance < lo || value - tolerance > hi {
                Err(format!("subject at {value:.1} outside [{lo:.1}, {hi:.1}]"))
            } else {
                Ok(())
            }
        }
        ConstraintKind::Above => ordered(&positions, |a, b| a.y <= b.y + tolerance, "above"),
        ConstraintKind::Below => ordered(&positions, |a, b| a.y >= b.y - tolerance, "below"),
        ConstraintKind::LeftOf => ordered(&positions, |a, b| a.x <= b.x + tolerance, "left of"),
        ConstraintKind::RightOf => ordered(&positions, |a, b| a.x >= b.x - tolerance, "right of"),
        ConstraintKind::ClosedLoop => {
            if positions.len() < 3 {
                return Ok(());
            }
            #[allow(clippy::cast_precision_loss)]
            let n = positions.len() as f64;
            let cx: f64 = positions.iter().map(|p| p.x).sum::<f64>() / n;
            let cy: f64 = positions.iter().map(|p| p.y).sum::<f64>() / n;
            let centre = Position::new(cx, cy);
            let radii: Vec<f64> = positions.iter().map(|p| p.distance_to(&centre)).collect();
            let mean: f64 = radii.iter().sum::<f64>() / n;
            if mean < 1.0 {
                return Err("loop members are coincident".into());
            }
            // Ring membership within half the mean radius closes the loop.
            for (i, r) in radii.iter().enumerate() {
                if (r - mean).abs() > mean * 0.5 + tolerance {
                    return Err(format!(
                        "member {i} at radius {r:.1} breaks the loop (mean {mean:.1})"
                    ));
                }
            }
            Ok(())
        }
    }
}

fn ordered(
    positions: &[Position],
    check: impl Fn(&Position, &Position) -> bool,
    relation: &str,
) -> Result<(), String> {
    let [a, b] = positions else {
        return Err(format!("{relation} needs two entities"));
    };
    if check(a, b) {
        Ok(())
    } else {
        Err(format!("first entity is not {relation} second"))
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{LayoutConstraint, Priority};
    use crate::scene::{PrimitiveType, RenderLayer, SceneObject};
    use crate::types::Domain;

    fn scene_with_pair(ax: f64, ay: f64, bx: f64, by: f64) -> Scene {
        let mut scene = Scene::new(800.0, 600.0, Domain::General);
        scene
            .add_object(
                SceneObject::new("a", PrimitiveType::Rectangle, RenderLayer::Shapes).at(ax, ay),
            )
            .unwrap();
        scene
            .add_object(
                SceneObject::new("b", PrimitiveType::Rectangle, RenderLayer::Shapes).at(bx, by),
            )
            .unwrap();
        scene
    }

    #[test]
    fn distance_within_band_is_satisfied() {
        let mut scene = scene_with_pair(100.0, 300.0, 200.0, 300.0);
        scene
            .add_constraint(
                LayoutConstraint::new(
                    ConstraintKind::Distance,
                    vec!["a".into(), "b".into()],
                    Priority::High,
                )
                .with_param("min", serde_json::json!(50.0))
                .with_param("max", serde_json::json!(150.0)),
            )
            .unwrap();
        let report = GeometryVerifier.verify(&scene);
        assert!(report.all_satisfied());
        assert_eq!(report.satisfied, vec![0]);
    }

    #[test]
    fn tolerance_absorbs_small_drift() {
        let mut scene = scene_with_pair(100.0, 300.0, 100.0, 303.0);
        scene
            .add_constraint(
                LayoutConstraint::new(
                    ConstraintKind::Alignment,
                    vec!["a".into(), "b".into()],
                    Priority::High,
                )
                .with_param("axis", serde_json::json!("horizontal")),
            )
            .unwrap();
        assert!(GeometryVerifier.verify(&scene).all_satisfied());
    }

    #[test]
    fn gross_misalignment_is_violated() {
        let mut scene = scene_with_pair(100.0, 300.0, 100.0, 360.0);
        scene
            .add_constraint(
                LayoutConstraint::new(
                    ConstraintKind::Alignment,
                    vec!["a".into(), "b".into()],
                    Priority::High,
                )
                .with_param("axis", serde_json::json!("horizontal")),
            )
            .unwrap();
        let report = GeometryVerifier.verify(&scene);
        assert_eq!(report.violated.len(), 1);
        assert_eq!(report.violated[0].kind, ConstraintKind::Alignment);
        assert_eq!(report.violated[0].index, 0);
    }

    #[test]
    fn unpositioned_entity_is_a_violation() {
        let mut scene = Scene::new(800.0, 600.0, Domain::General);
        scene
            .add_object(SceneObject::new("a", PrimitiveType::Rectangle, RenderLayer::Shapes))
            .unwrap();
        scene
            .add_constraint(LayoutConstraint::new(
                ConstraintKind::Bounds,
                vec!["a".into()],
                Priority::Normal,
            ))
            .unwrap();
        let report = GeometryVerifier.verify(&scene);
        assert_eq!(report.violated.len(), 1);
        assert!(report.violated[0].details.contains("unpositioned"));
    }

    #[test]
    fn ordering_constraints_respect_svg_y_axis() {
        // y grows downward: "above" means smaller y.
        let mut scene = scene_with_pair(100.0, 100.0, 100.0, 300.0);
        scene
            .add_constraint(LayoutConstraint::new(
                ConstraintKind::Above,
                vec!["a".into(), "b".into()],
                Priority::Normal,
            ))
            .unwrap();
        assert!(GeometryVerifier.verify(&scene).all_satisfied());

        let mut inverted = scene_with_pair(100.0, 300.0, 100.0, 100.0);
        inverted
            .add_constraint(LayoutConstraint::new(
                ConstraintKind::Above,
                vec!["a".into(), "b".into()],
                Priority::Normal,
            ))
            .unwrap();
        assert!(!GeometryVerifier.verify(&inverted).all_satisfied());
    }

    #[test]
    fn between_checks_dominant_axis() {
        let mut scene = Scene::new(800.0, 600.0, Domain::General);
        for (id, x, y) in [("slab", 350.0, 300.0), ("top", 400.0, 200.0), ("bottom", 400.0, 400.0)]
        {
            scene
                .add_object(
                    SceneObject::new(id, PrimitiveType::Rectangle, RenderLayer::Shapes).at(x, y),
                )
                .unwrap();
        }
        scene
            .add_constraint(LayoutConstraint::new(
                ConstraintKind::Between,
                vec!["slab".into(), "top".into(), "bottom".into()],
                Priority::High,
            ))
            .unwrap();
        assert!(GeometryVerifier.verify(&scene).all_satisfied());

        scene.object_mut("slab").unwrap().position = Some(Position::new(350.0, 100.0));
        assert!(!GeometryVerifier.verify(&scene).all_satisfied());
    }

    #[test]
    fn closed_loop_accepts_ring_layouts() {
        let mut scene = Scene::new(800.0, 600.0, Domain::Electronics);
        let centre = Position::new(400.0, 300.0);
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let t = (i as f64 / 4.0) * std::f64::consts::TAU;
            scene
                .add_object(
                    SceneObject::new(id, PrimitiveType::Rectangle, RenderLayer::Shapes)
                        .at(centre.x + 150.0 * t.cos(), centre.y + 150.0 * t.sin()),
                )
                .unwrap();
        }
        scene
            .add_constraint(LayoutConstraint::new(
                ConstraintKind::ClosedLoop,
                vec!["a".into(), "b".into(), "c".into(), "d".into()],
                Priority::Critical,
            ))
            .unwrap();
        assert!(GeometryVerifier.verify(&scene).all_satisfied());
    }
}

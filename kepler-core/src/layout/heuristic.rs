//! Heuristic iterative layout solver.
//!
//! Initial placement (domain template or grid) followed by up to 50
//! constraint-relaxation iterations, an aesthetic pass, and label placement.
//! Each iteration applies a small corrective displacement per constraint;
//! the loop exits early once the largest displacement drops under epsilon.

use std::collections::BTreeMap;

use tracing::debug;

use crate::plan::{ConstraintKind, Priority};
use crate::scene::{PrimitiveType, Scene};
use crate::types::{Domain, Position};

const GRID_SNAP: f64 = 10.0;
const COLINEAR_TOLERANCE: f64 = 12.0;

#[derive(Debug, Clone)]
pub struct HeuristicConfig {
    pub max_iterations: u32,
    /// Early-exit threshold on the largest per-iteration displacement.
    pub epsilon: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self { max_iterations: 50, epsilon: 0.5 }
    }
}

#[derive(Debug, Default, Clone)]
pub struct HeuristicStats {
    pub iterations: u32,
    pub converged: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Default)]
pub struct HeuristicSolver {
    pub config: HeuristicConfig,
}

impl HeuristicSolver {
    /// Assign a position to every layout-participating object.
    pub fn solve(&self, scene: &mut Scene) -> HeuristicStats {
        let mut stats = HeuristicStats::default();

        self.initial_placement(scene);
        stats.iterations = self.relax_constraints(scene, &mut stats.converged);
        self.aesthetic_pass(scene);
        self.resolve_connector_positions(scene);
        self.place_labels(scene);

        for id in scene.unpositioned() {
            stats.issues.push(format!("object '{id}' has no position after layout"));
        }
        debug!(
            iterations = stats.iterations,
            converged = stats.converged,
            issues = stats.issues.len(),
            "heuristic layout complete"
        );
        stats
    }

    // ── Initial placement ──────────────────────────────────────────

    fn initial_placement(&self, scene: &mut Scene) {
        let domain = scene.domain();
        let unplaced: Vec<String> = scene
            .objects
            .iter()
            .filter(|o| o.needs_position() && o.position.is_none() && !is_connector(o))
            .map(|o| o.id.clone())
            .collect();
        if unplaced.is_empty() {
            return;
        }

        let width = scene.coord_system.width;
        let height = scene.coord_system.height;

        match domain {
            // Circuit components sit on a rectangular loop.
            Domain::Electronics => {
                let positions = loop_positions(unplaced.len(), width, height);
                for (id, position) in unplaced.iter().zip(positions) {
                    if let Some(object) = scene.object_mut(id) {
                        object.position = Some(position);
                    }
                }
            }
            _ => {
                let positions = grid_positions(unplaced.len(), width, height);
                for (id, position) in unplaced.iter().zip(positions) {
                    if let Some(object) = scene.object_mut(id) {
                        object.position = Some(position);
                    }
                }
            }
        }
    }

    // ── Constraint relaxation ──────────────────────────────────────

    fn relax_constraints(&self, scene: &mut Scene, converged: &mut bool) -> u32 {
        let constraints = scene.constraints.clone();
        let mut iterations = 0;

        for _ in 0..self.config.max_iterations {
            iterations += 1;
            let mut max_displacement = 0.0f64;

            for constraint in &constraints {
                let weight = priority_weight(constraint.priority);
                let displacement = match constraint.kind {
                    ConstraintKind::Alignment => apply_alignment(scene, constraint, weight),
                    ConstraintKind::Distance => apply_distance(scene, constraint, weight),
                    ConstraintKind::NoOverlap => apply_no_overlap(scene, constraint, weight),
                    ConstraintKind::Between => apply_between(scene, constraint, weight),
                    ConstraintKind::Above => apply_order(scene, constraint, weight, Axis::Y, true),
                    ConstraintKind::Below => apply_order(scene, constraint, weight, Axis::Y, false),
                    ConstraintKind::LeftOf => apply_order(scene, constraint, weight, Axis::X, true),
                    ConstraintKind::RightOf => {
                        apply_order(scene, constraint, weight, Axis::X, false)
                    }
                    ConstraintKind::Bounds => apply_bounds(scene, constraint),
                    ConstraintKind::ClosedLoop => apply_closed_loop(scene, constraint, weight),
                };
                max_displacement = max_displacement.max(displacement);
            }

            if max_displacement < self.config.epsilon {
                *converged = true;
                break;
            }
        }
        iterations
    }

    // ── Aesthetic pass ─────────────────────────────────────────────

    fn aesthetic_pass(&self, scene: &mut Scene) {
        // Snap to grid.
        for object in &mut scene.objects {
            if let Some(position) = object.position {
                object.position = Some(Position::new(
                    (position.x / GRID_SNAP).round() * GRID_SNAP,
                    (position.y / GRID_SNAP).round() * GRID_SNAP,
                ));
            }
        }

        // Equal spacing in co-linear rows.
        let mut rows: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for object in &scene.objects {
            if is_connector(object) {
                continue;
            }
            if let Some(position) = object.position {
                #[allow(clippy::cast_possible_truncation)]
                let bucket = (position.y / COLINEAR_TOLERANCE).round() as i64;
                rows.entry(bucket).or_default().push(object.id.clone());
            }
        }
        for ids in rows.values() {
            if ids.len() < 3 {
                continue;
            }
            let mut ordered: Vec<(String, f64)> = ids
                .iter()
                .filter_map(|id| scene.object(id).and_then(|o| o.position.map(|p| (id.clone(), p.x))))
                .collect();
            ordered.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            let first = ordered.first().map(|(_, x)| *x).unwrap_or(0.0);
            let last = ordered.last().map(|(_, x)| *x).unwrap_or(0.0);
            if last <= first {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let step = (last - first) / (ordered.len() as f64 - 1.0);
            for (i, (id, _)) in ordered.iter().enumerate() {
                if let Some(object) = scene.object_mut(id) {
                    if let Some(position) = object.position {
                        #[allow(clippy::cast_precision_loss)]
                        let x = first + step * i as f64;
                        object.position = Some(Position::new(x, position.y));
                    }
                }
            }
        }

        // Centre of mass to canvas centre.
        let positioned: Vec<Position> = scene
            .objects
            .iter()
            .filter(|o| !is_connector(o))
            .filter_map(|o| o.position)
            .collect();
        if !positioned.is_empty() {
            #[allow(clippy::cast_precision_loss)]
            let n = positioned.len() as f64;
            let cx: f64 = positioned.iter().map(|p| p.x).sum::<f64>() / n;
            let cy: f64 = positioned.iter().map(|p| p.y).sum::<f64>() / n;
            let dx = scene.coord_system.width / 2.0 - cx;
            let dy = scene.coord_system.height / 2.0 - cy;
            let width = scene.coord_system.width;
            let height = scene.coord_system.height;
            for object in &mut scene.objects {
                if let Some(position) = object.position {
                    object.position = Some(position.offset(dx, dy).clamped(width, height));
                }
            }
        }
    }

    /// Wires and other from/to connectors sit at their endpoints' midpoint.
    fn resolve_connector_positions(&self, scene: &mut Scene) {
        let updates: Vec<(String, Position)> = scene
            .objects
            .iter()
            .filter(|o| is_connector(o))
            .filter_map(|o| {
                let from = o.prop_str("from")?;
                let to = o.prop_str("to")?;
                let a = scene.object(from)?.position?;
                let b = scene.object(to)?.position?;
                Some((o.id.clone(), a.midpoint(&b)))
            })
            .collect();
        for (id, position) in updates {
            if let Some(object) = scene.object_mut(&id) {
                object.position = Some(position);
            }
        }
    }

    // ── Label placement ────────────────────────────────────────────

    /// Try the 8 compass offsets per annotation; keep the least-overlapping.
    fn place_labels(&self, scene: &mut Scene) {
        const OFFSETS: [(f64, f64); 8] = [
            (0.0, -40.0),   // N
            (35.0, -35.0),  // NE
            (45.0, 0.0),    // E
            (35.0, 35.0),   // SE
            (0.0, 40.0),    // S
            (-35.0, 35.0),  // SW
            (-45.0, 0.0),   // W
            (-35.0, -35.0), // NW
        ];

        let boxes: Vec<(Position, f64, f64)> = scene
            .objects
            .iter()
            .filter_map(|o| {
                let position = o.position?;
                let (hw, hh) = o.half_extent();
                Some((position, hw, hh))
            })
            .collect();

        let mut fallback_y = 20.0;
        for annotation in &mut scene.annotations {
            if annotation.position.is_some() {
                continue;
            }
            let anchor = annotation
                .target
                .as_ref()
                .and_then(|id| scene.objects.iter().find(|o| &o.id == id))
                .and_then(|o| o.position);
            match anchor {
                Some(anchor) => {
                    let best = OFFSETS
                        .iter()
                        .map(|(dx, dy)| anchor.offset(*dx, *dy))
                        .min_by_key(|candidate| {
                            boxes
                                .iter()
                                .filter(|(p, hw, hh)| {
                                    (candidate.x - p.x).abs() < hw + 20.0
                                        && (candidate.y - p.y).abs() < hh + 10.0
                                })
                                .count()
                        })
                        .unwrap_or(anchor);
                    annotation.position = Some(best.clamped(
                        scene.coord_system.width,
                        scene.coord_system.height,
                    ));
                }
                None => {
                    annotation.position = Some(Position::new(20.0, fallback_y));
                    fallback_y += 18.0;
                }
            }
        }
    }
}

fn is_connector(object: &crate::scene::SceneObject) -> bool {
    object.object_type == PrimitiveType::Line && object.prop_str("from").is_some()
}

pub fn priority_weight(priority: Priority) -> f64 {
    match priority {
        Priority::Critical => 1.0,
        Priority::High => 0.8,
        Priority::Normal => 0.5,
        Priority::Low => 0.25,
    }
}

// ── Placement templates ────────────────────────────────────────────

#[allow(clippy::cast_precision_loss)]
fn grid_positions(count: usize, width: f64, height: f64) -> Vec<Position> {
    let columns = (count as f64).sqrt().ceil().max(1.0) as usize;
    let rows = count.div_ceil(columns);
    let cell_w = width / (columns as f64 + 1.0);
    let cell_h = height / (rows as f64 + 1.0);
    (0..count)
        .map(|i| {
            let col = i % columns;
            let row = i / columns;
            Position::new(cell_w * (col as f64 + 1.0), cell_h * (row as f64 + 1.0))
        })
        .collect()
}

/// Evenly spaced points on a rectangular circuit loop.
#[allow(clippy::cast_precision_loss)]
fn loop_positions(count: usize, width: f64, height: f64) -> Vec<Position> {
    let cx = width / 2.0;
    let cy = height / 2.0;
    let rx = width * 0.3;
    let ry = height * 0.3;
    (0..count)
        .map(|i| {
            let t = (i as f64 / count.max(1) as f64) * std::f64::consts::TAU;
            Position::new(cx + rx * t.cos(), cy + ry * t.sin())
        })
        .collect()
}

// ── Per-constraint corrections ─────────────────────────────────────

enum Axis {
    X,
    Y,
}

fn positions_of(scene: &Scene, ids: &[String]) -> Option<Vec<Position>> {
    ids.iter().map(|id| scene.object(id).and_then(|o| o.position)).collect()
}

fn move_object(scene: &mut Scene, id: &str, dx: f64, dy: f64) {
    if let Some(object) = scene.object_mut(id) {
        if let Some(position) = object.position {
            object.position = Some(position.offset(dx, dy));
        }
    }
}

fn apply_alignment(scene: &mut Scene, constraint: &crate::scene::Constraint, weight: f64) -> f64 {
    let Some(positions) = positions_of(scene, &constraint.entities) else { return 0.0 };
    if positions.len() < 2 {
        return 0.0;
    }
    let horizontal = constraint.param_str("axis") != Some("vertical");
    #[allow(clippy::cast_precision_loss)]
    let n = positions.len() as f64;
    let mut displacement = 0.0f64;
    if horizontal {
        let mean_y: f64 = positions.iter().map(|p| p.y).sum::<f64>() / n;
        for (id, position) in constraint.entities.iter().zip(&positions) {
            let dy = (mean_y - position.y) * weight;
            displacement = displacement.max(dy.abs());
            move_object(scene, id, 0.0, dy);
        }
    } else {
        let mean_x: f64 = positions.iter().map(|p| p.x).sum::<f64>() / n;
        for (id, position) in constraint.entities.iter().zip(&positions) {
            let dx = (mean_x - position.x) * weight;
            displacement = displacement.max(dx.abs());
            move_object(scene, id, dx, 0.0);
        }
    }
    displacement
}

fn apply_distance(scene: &mut Scene, constraint: &crate::scene::Constraint, weight: f64) -> f64 {
    let Some(positions) = positions_of(scene, &constraint.entities) else { return 0.0 };
    let [a, b] = positions.as_slice() else { return 0.0 };
    let min = constraint.param_f64("min").unwrap_or(0.0);
    let max = constraint.param_f64("max").unwrap_or(f64::INFINITY);
    let d = a.distance_to(b).max(1e-6);
    let target = if d < min {
        min
    } else if d > max {
        max
    } else {
        return 0.0;
    };
    let correction = (target - d) / 2.0 * weight;
    let ux = (b.x - a.x) / d;
    let uy = (b.y - a.y) / d;
    move_object(scene, &constraint.entities[0], -ux * correction, -uy * correction);
    move_object(scene, &constraint.entities[1], ux * correction, uy * correction);
    correction.abs()
}

fn apply_no_overlap(scene: &mut Scene, constraint: &crate::scene::Constraint, weight: f64) -> f64 {
    let ids = &constraint.entities;
    if ids.len() != 2 {
        return 0.0;
    }
    let (Some(a), Some(b)) = (scene.object(&ids[0]), scene.object(&ids[1])) else { return 0.0 };
    let (Some(pa), Some(pb)) = (a.position, b.position) else { return 0.0 };
    let (ahw, ahh) = a.half_extent();
    let (bhw, bhh) = b.half_extent();

    let overlap_x = (ahw + bhw) - (pa.x - pb.x).abs();
    let overlap_y = (ahh + bhh) - (pa.y - pb.y).abs();
    if overlap_x <= 0.0 || overlap_y <= 0.0 {
        return 0.0;
    }

    // Push apart along the centre vector by half the smaller overlap.
    let d = pa.distance_to(&pb).max(1e-6);
    let push = overlap_x.min(overlap_y) / 2.0 * weight;
    let (ux, uy) = if d < 1e-3 {
        (1.0, 0.0) // coincident centres: separate horizontally
    } else {
        ((pa.x - pb.x) / d, (pa.y - pb.y) / d)
    };
    move_object(scene, &ids[0], ux * push, uy * push);
    move_object(scene, &ids[1], -ux * push, -uy * push);
    push
}

/// First entity moves toward the midpoint of the other two, but only along
/// the axis joining them, so side-by-side siblings stay apart.
fn apply_between(scene: &mut Scene, constraint: &crate::scene::Constraint, weight: f64) -> f64 {
    let Some(positions) = positions_of(scene, &constraint.entities) else { return 0.0 };
    let [subject, first, second] = positions.as_slice() else { return 0.0 };
    let mid = first.midpoint(second);
    let axis_x = (second.x - first.x).abs();
    let axis_y = (second.y - first.y).abs();
    let (dx, dy) = if axis_y >= axis_x {
        (0.0, (mid.y - subject.y) * weight)
    } else {
        ((mid.x - subject.x) * weight, 0.0)
    };
    move_object(scene, &constraint.entities[0], dx, dy);
    dx.abs().max(dy.abs())
}

fn apply_order(
    scene: &mut Scene,
    constraint: &crate::scene::Constraint,
    weight: f64,
    axis: Axis,
    first_is_lesser: bool,
) -> f64 {
    let Some(positions) = positions_of(scene, &constraint.entities) else { return 0.0 };
    let [a, b] = positions.as_slice() else { return 0.0 };
    let margin = constraint.param_f64("margin").unwrap_or(20.0);
    let (va, vb) = match axis {
        Axis::X => (a.x, b.x),
        Axis::Y => (a.y, b.y),
    };
    let violation = if first_is_lesser { va - (vb - margin) } else { (vb + margin) - va };
    if violation <= 0.0 {
        return 0.0;
    }
    let correction = violation / 2.0 * weight;
    let sign = if first_is_lesser { -1.0 } else { 1.0 };
    match axis {
        Axis::X => {
            move_object(scene, &constraint.entities[0], sign * correction, 0.0);
            move_object(scene, &constraint.entities[1], -sign * correction, 0.0);
        }
        Axis::Y => {
            move_object(scene, &constraint.entities[0], 0.0, sign * correction);
            move_object(scene, &constraint.entities[1], 0.0, -sign * correction);
        }
    }
    correction
}

fn apply_bounds(scene: &mut Scene, constraint: &crate::scene::Constraint) -> f64 {
    let width = constraint.param_f64("width").unwrap_or(f64::INFINITY);
    let height = constraint.param_f64("height").unwrap_or(f64::INFINITY);
    let mut displacement = 0.0f64;
    for id in &constraint.entities {
        if let Some(object) = scene.object_mut(id) {
            let (hw, hh) = object.half_extent();
            if let Some(position) = object.position {
                let clamped = Position::new(
                    position.x.clamp(hw, (width - hw).max(hw)),
                    position.y.clamp(hh, (height - hh).max(hh)),
                );
                displacement = displacement.max(position.distance_to(&clamped));
                object.position = Some(clamped);
            }
        }
    }
    displacement
}

/// Nudge loop members toward an ellipse around their centroid so the
/// sum-of-direction-vectors closes.
fn apply_closed_loop(scene: &mut Scene, constraint: &crate::scene::Constraint, weight: f64) -> f64 {
    let Some(positions) = positions_of(scene, &constraint.entities) else { return 0.0 };
    if positions.len() < 3 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = positions.len() as f64;
    let cx: f64 = positions.iter().map(|p| p.x).sum::<f64>() / n;
    let cy: f64 = positions.iter().map(|p| p.y).sum::<f64>() / n;
    let radius: f64 =
        (positions.iter().map(|p| p.distance_to(&Position::new(cx, cy))).sum::<f64>() / n)
            .max(80.0);

    let mut displacement = 0.0f64;
    for (i, (id, position)) in constraint.entities.iter().zip(&positions).enumerate() {
        let d = position.distance_to(&Position::new(cx, cy));
        // Members sitting on the centroid get a ring slot by index; the rest
        // move radially outward to the common radius.
        let angle = if d < 1.0 {
            #[allow(clippy::cast_precision_loss)]
            let slot = (i as f64 / n) * std::f64::consts::TAU;
            slot
        } else {
            (position.y - cy).atan2(position.x - cx)
        };
        let target = Position::new(cx + radius * angle.cos(), cy + radius * angle.sin());
        let dx = (target.x - position.x) * weight * 0.5;
        let dy = (target.y - position.y) * weight * 0.5;
        displacement = displacement.max(dx.abs().max(dy.abs()));
        move_object(scene, id, dx, dy);
    }
    displacement
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::LayoutConstraint;
    use crate::scene::{RenderLayer, SceneObject};

    fn scene_with(objects: Vec<SceneObject>) -> Scene {
        let mut scene = Scene::new(800.0, 600.0, Domain::General);
        for object in objects {
            scene.add_object(object).unwrap();
        }
        scene
    }

    fn rect(id: &str) -> SceneObject {
        SceneObject::new(id, PrimitiveType::Rectangle, RenderLayer::Shapes)
            .with_prop("width", serde_json::json!(40.0))
            .with_prop("height", serde_json::json!(40.0))
    }

    #[test]
    fn every_object_is_positioned_after_solve() {
        let mut scene = scene_with(vec![rect("a"), rect("b"), rect("c")]);
        let stats = HeuristicSolver::default().solve(&mut scene);
        assert!(scene.unpositioned().is_empty());
        assert!(stats.issues.is_empty());
    }

    #[test]
    fn alignment_snaps_to_common_row() {
        let mut scene = scene_with(vec![rect("a").at(100.0, 100.0), rect("b").at(300.0, 400.0)]);
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
        HeuristicSolver::default().solve(&mut scene);
        let ya = scene.object("a").unwrap().position.unwrap().y;
        let yb = scene.object("b").unwrap().position.unwrap().y;
        assert!((ya - yb).abs() <= GRID_SNAP, "ya={ya} yb={yb}");
    }

    #[test]
    fn distance_band_is_enforced() {
        let mut scene = scene_with(vec![rect("a").at(100.0, 300.0), rect("b").at(700.0, 300.0)]);
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
        HeuristicSolver::default().solve(&mut scene);
        let a = scene.object("a").unwrap().position.unwrap();
        let b = scene.object("b").unwrap().position.unwrap();
        let d = a.distance_to(&b);
        assert!(d <= 170.0, "distance {d} should approach the band");
        assert!(d >= 30.0);
    }

    #[test]
    fn overlapping_objects_get_pushed_apart() {
        let mut scene = scene_with(vec![rect("a").at(400.0, 300.0), rect("b").at(405.0, 300.0)]);
        scene
            .add_constraint(LayoutConstraint::new(
                ConstraintKind::NoOverlap,
                vec!["a".into(), "b".into()],
                Priority::Normal,
            ))
            .unwrap();
        HeuristicSolver::default().solve(&mut scene);
        let a = scene.object("a").unwrap().position.unwrap();
        let b = scene.object("b").unwrap().position.unwrap();
        assert!(
            (a.x - b.x).abs() >= 30.0 || (a.y - b.y).abs() >= 30.0,
            "a={a:?} b={b:?}"
        );
    }

    #[test]
    fn between_pulls_subject_onto_axis_midpoint() {
        let mut scene = scene_with(vec![
            rect("slab").at(380.0, 100.0),
            rect("top").at(400.0, 200.0),
            rect("bottom").at(400.0, 400.0),
        ]);
        scene
            .add_constraint(LayoutConstraint::new(
                ConstraintKind::Between,
                vec!["slab".into(), "top".into(), "bottom".into()],
                Priority::High,
            ))
            .unwrap();
        HeuristicSolver::default().solve(&mut scene);
        let slab = scene.object("slab").unwrap().position.unwrap();
        let top = scene.object("top").unwrap().position.unwrap();
        let bottom = scene.object("bottom").unwrap().position.unwrap();
        let mid_y = (top.y + bottom.y) / 2.0;
        assert!((slab.y - mid_y).abs() <= GRID_SNAP + 1.0, "slab.y={} mid={mid_y}", slab.y);
        // X was preserved modulo snapping/centering, not collapsed onto the plates.
        assert!((slab.x - top.x).abs() <= 40.0);
    }

    #[test]
    fn bounds_clamp_into_canvas() {
        let mut scene = scene_with(vec![rect("a").at(-50.0, 900.0)]);
        scene
            .add_constraint(
                LayoutConstraint::new(ConstraintKind::Bounds, vec!["a".into()], Priority::Normal)
                    .with_param("width", serde_json::json!(800.0))
                    .with_param("height", serde_json::json!(600.0)),
            )
            .unwrap();
        HeuristicSolver::default().solve(&mut scene);
        let a = scene.object("a").unwrap().position.unwrap();
        assert!(a.x >= 0.0 && a.x <= 800.0);
        assert!(a.y >= 0.0 && a.y <= 600.0);
    }

    #[test]
    fn connectors_sit_between_endpoints() {
        let mut scene = scene_with(vec![rect("a").at(100.0, 300.0), rect("b").at(500.0, 300.0)]);
        scene
            .add_object(
                SceneObject::new("wire", PrimitiveType::Line, RenderLayer::Lines)
                    .with_prop("from", serde_json::json!("a"))
                    .with_prop("to", serde_json::json!("b")),
            )
            .unwrap();
        HeuristicSolver::default().solve(&mut scene);
        let a = scene.object("a").unwrap().position.unwrap();
        let b = scene.object("b").unwrap().position.unwrap();
        let wire = scene.object("wire").unwrap().position.unwrap();
        assert!((wire.x - (a.x + b.x) / 2.0).abs() < 1.0);
        assert!((wire.y - (a.y + b.y) / 2.0).abs() < 1.0);
    }

    #[test]
    fn labels_get_positions_avoiding_objects() {
        let mut scene = scene_with(vec![rect("a").at(400.0, 300.0)]);
        scene.annotations.push(crate::scene::Annotation {
            id: "label_a".into(),
            text: "A".into(),
            target: Some("a".into()),
            position: None,
        });
        scene.annotations.push(crate::scene::Annotation {
            id: "title".into(),
            text: "untargeted".into(),
            target: None,
            position: None,
        });
        HeuristicSolver::default().solve(&mut scene);
        for annotation in &scene.annotations {
            assert!(annotation.position.is_some());
        }
    }

    #[test]
    fn solver_terminates_within_iteration_budget() {
        let mut scene = scene_with(vec![
            rect("a").at(400.0, 300.0),
            rect("b").at(400.0, 300.0),
            rect("c").at(400.0, 300.0),
        ]);
        for pair in [["a", "b"], ["b", "c"], ["a", "c"]] {
            scene
                .add_constraint(LayoutConstraint::new(
                    ConstraintKind::NoOverlap,
                    vec![pair[0].into(), pair[1].into()],
                    Priority::Normal,
                ))
                .unwrap();
        }
        let stats = HeuristicSolver::default().solve(&mut scene);
        assert!(stats.iterations <= 50);
    }
}

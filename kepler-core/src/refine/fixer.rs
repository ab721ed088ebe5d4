//! Issue fixer: typed repairs driven by `IssueKind`.
//!
//! Matches on the issue kind and its parameters only; message text is for
//! humans. Returns the number of issues it acted on so the loop can detect
//! a no-progress round.

use tracing::debug;

use crate::layout::heuristic::{HeuristicConfig, HeuristicSolver};
use crate::scene::Scene;
use crate::types::Position;

use super::structural::{IssueKind, ValidationIssue};

#[derive(Debug, Default)]
pub struct Refiner;

impl Refiner {
    pub fn fix(&self, scene: &mut Scene, issues: &[ValidationIssue]) -> usize {
        let mut fixed = 0;
        let mut rerun_constraints = false;

        for issue in issues {
            match issue.kind {
                IssueKind::Overlap => {
                    if self.separate(scene, issue) {
                        fixed += 1;
                    }
                }
                IssueKind::OutOfBounds => {
                    if self.clamp_into_canvas(scene, issue) {
                        fixed += 1;
                    }
                }
                IssueKind::MissingPosition => {
                    if self.place_missing(scene, issue) {
                        fixed += 1;
                    }
                }
                IssueKind::ConstraintViolated => {
                    // One targeted relaxation round repairs these in bulk.
                    rerun_constraints = true;
                    fixed += 1;
                }
                IssueKind::LabelCollision => {
                    if self.spread_labels(scene, issue) {
                        fixed += 1;
                    }
                }
                IssueKind::EmptyScene => {}
            }
        }

        if rerun_constraints {
            let solver = HeuristicSolver {
                config: HeuristicConfig { max_iterations: 15, epsilon: 0.5 },
            };
            solver.solve(scene);
        }

        debug!(fixed, total = issues.len(), "refiner pass complete");
        fixed
    }

    /// Push an overlapping pair apart by the recorded overlap extents.
    fn separate(&self, scene: &mut Scene, issue: &ValidationIssue) -> bool {
        let [a_id, b_id] = issue.object_ids.as_slice() else { return false };
        let (Some(a), Some(b)) = (
            scene.object(a_id).and_then(|o| o.position),
            scene.object(b_id).and_then(|o| o.position),
        ) else {
            return false;
        };
        let overlap_x = issue
            .parameters
            .get("overlap_x")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(20.0);
        let overlap_y = issue
            .parameters
            .get("overlap_y")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(20.0);

        // Separate along the axis needing the smaller shift.
        let (dx, dy) = if overlap_x <= overlap_y {
            let sign = if a.x <= b.x { -1.0 } else { 1.0 };
            (sign * (overlap_x / 2.0 + 2.0), 0.0)
        } else {
            let sign = if a.y <= b.y { -1.0 } else { 1.0 };
            (0.0, sign * (overlap_y / 2.0 + 2.0))
        };

        if let Some(object) = scene.object_mut(a_id) {
            object.position = Some(a.offset(dx, dy));
        }
        if let Some(object) = scene.object_mut(b_id) {
            object.position = Some(b.offset(-dx, -dy));
        }
        true
    }

    fn clamp_into_canvas(&self, scene: &mut Scene, issue: &ValidationIssue) -> bool {
        let width = scene.coord_system.width;
        let height = scene.coord_system.height;
        let mut changed = false;
        for id in &issue.object_ids {
            if let Some(object) = scene.object_mut(id) {
                if let Some(position) = object.position {
                    let (hw, hh) = object.half_extent();
                    let clamped = Position::new(
                        position.x.clamp(hw, (width - hw).max(hw)),
                        position.y.clamp(hh, (height - hh).max(hh)),
                    );
                    if clamped != position {
                        object.position = Some(clamped);
                        changed = true;
                    }
                }
            }
        }
        changed
    }

    fn place_missing(&self, scene: &mut Scene, issue: &ValidationIssue) -> bool {
        let cx = scene.coord_system.width / 2.0;
        let cy = scene.coord_system.height / 2.0;
        let mut placed = false;
        #[allow(clippy::cast_precision_loss)]
        for (i, id) in issue.object_ids.iter().enumerate() {
            if let Some(object) = scene.object_mut(id) {
                if object.position.is_none() {
                    object.position = Some(Position::new(cx + 60.0 * i as f64, cy));
                    placed = true;
                }
            }
        }
        placed
    }

    /// Nudge the second of two colliding annotations downward.
    fn spread_labels(&self, scene: &mut Scene, issue: &ValidationIssue) -> bool {
        let Some(indices) = issue
            .parameters
            .get("annotations")
            .and_then(serde_json::Value::as_array)
        else {
            return false;
        };
        let Some(second) = indices.get(1).and_then(serde_json::Value::as_u64) else {
            return false;
        };
        #[allow(clippy::cast_possible_truncation)]
        let Some(annotation) = scene.annotations.get_mut(second as usize) else {
            return false;
        };
        if let Some(position) = annotation.position {
            annotation.position = Some(position.offset(0.0, 16.0));
            return true;
        }
        false
    }
}

// ── Tests ──────────────────────────────────────────────────────────

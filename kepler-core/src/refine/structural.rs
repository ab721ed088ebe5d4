//! Structural scene validation.
//!
//! Produces a `QualityScore` with typed issues. Issues carry an `IssueKind`,
//! the affected object ids and numeric parameters, so the fixer never parses
//! message strings. Coordinate reads go through `SceneObject::position` —
//! the single `Position` value type absorbs both record-shaped and
//! mapping-shaped serialisations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::layout::symbolic::GeometryVerifier;
use crate::plan::Priority;
use crate::scene::{RenderLayer, Scene};
use crate::types::Severity;

const PASSING_SCORE: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    EmptyScene,
    MissingPosition,
    Overlap,
    OutOfBounds,
    ConstraintViolated,
    LabelCollision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    pub object_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl ValidationIssue {
    fn new(kind: IssueKind, severity: Severity, message: String, object_ids: Vec<String>) -> Self {
        Self { kind, severity, message, object_ids, parameters: BTreeMap::new() }
    }

    fn with_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScore {
    pub overall: f64,
    pub layout: f64,
    pub connectivity: f64,
    pub style: f64,
    pub physics: f64,
    pub issues: Vec<ValidationIssue>,
}

impl QualityScore {
    pub fn passing(&self) -> bool {
        self.overall >= PASSING_SCORE
    }
}

#[derive(Debug, Default)]
pub struct StructuralValidator;

impl StructuralValidator {
    #[allow(clippy::too_many_lines, clippy::cast_precision_loss)]
    pub fn validate(&self, scene: &Scene) -> QualityScore {
        let mut issues: Vec<ValidationIssue> = Vec::new();

        if scene.objects.is_empty() {
            issues.push(ValidationIssue::new(
                IssueKind::EmptyScene,
                Severity::Critical,
                "scene contains no objects".into(),
                vec![],
            ));
            return QualityScore {
                overall: 0.0,
                layout: 0.0,
                connectivity: 0.0,
                style: 0.0,
                physics: 0.0,
                issues,
            };
        }

        let mut layout: f64 = 100.0;
        let mut style: f64 = 100.0;
        let mut physics: f64 = 100.0;

        // Missing positions.
        for id in scene.unpositioned() {
            layout -= 20.0;
            issues.push(ValidationIssue::new(
                IssueKind::MissingPosition,
                Severity::Error,
                format!("object '{id}' has no position"),
                vec![id.to_string()],
            ));
        }

        // Overlaps between solid shapes.
        let shapes: Vec<_> = scene
            .objects
            .iter()
            .filter(|o| o.layer == RenderLayer::Shapes && o.position.is_some())
            .collect();
        for (i, a) in shapes.iter().enumerate() {
            for b in &shapes[i + 1..] {
                let (pa, pb) = (a.position.unwrap_or_default(), b.position.unwrap_or_default());
                let (ahw, ahh) = a.half_extent();
                let (bhw, bhh) = b.half_extent();
                let overlap_x = (ahw + bhw) - (pa.x - pb.x).abs();
                let overlap_y = (ahh + bhh) - (pa.y - pb.y).abs();
                if overlap_x > 5.0 && overlap_y > 5.0 {
                    layout -= 20.0;
                    issues.push(
                        ValidationIssue::new(
                            IssueKind::Overlap,
                            Severity::Warn,
                            format!("objects '{}' and '{}' overlap", a.id, b.id),
                            vec![a.id.clone(), b.id.clone()],
                        )
                        .with_param("overlap_x", serde_json::json!(overlap_x))
                        .with_param("overlap_y", serde_json::json!(overlap_y)),
                    );
                }
            }
        }

        // Out-of-canvas positions.
        let width = scene.coord_system.width;
        let height = scene.coord_system.height;
        for object in &scene.objects {
            if let Some(position) = object.position {
                if position.x < 0.0 || position.y < 0.0 || position.x > width || position.y > height
                {
                    layout -= 10.0;
                    issues.push(
                        ValidationIssue::new(
                            IssueKind::OutOfBounds,
                            Severity::Warn,
                            format!("object '{}' lies outside the canvas", object.id),
                            vec![object.id.clone()],
                        )
                        .with_param("x", serde_json::json!(position.x))
                        .with_param("y", serde_json::json!(position.y)),
                    );
                }
            }
        }

        // Constraint satisfaction via the symbolic verifier.
        let verification = GeometryVerifier.verify(scene);
        let total = scene.constraints.len();
        let connectivity = if total == 0 {
            100.0
        } else {
            100.0 * verification.satisfied.len() as f64 / total as f64
        };
        for violation in &verification.violated {
            let priority = scene
                .constraints
                .get(violation.index)
                .map_or(Priority::Normal, |c| c.priority);
            let severity = if priority == Priority::Critical {
                physics -= 30.0;
                Severity::Critical
            } else {
                Severity::Warn
            };
            issues.push(
                ValidationIssue::new(
                    IssueKind::ConstraintViolated,
                    severity,
                    format!("constraint {:?} violated: {}", violation.kind, violation.details),
                    violation.entities.clone(),
                )
                .with_param("constraint_index", serde_json::json!(violation.index)),
            );
        }

        // Label collisions.
        let placed: Vec<(usize, crate::types::Position)> = scene
            .annotations
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.position.map(|p| (i, p)))
            .collect();
        for (i, (ai, pa)) in placed.iter().enumerate() {
            for (bi, pb) in &placed[i + 1..] {
                if pa.distance_to(pb) < 12.0 {
                    style -= 5.0;
                    issues.push(
                        ValidationIssue::new(
                            IssueKind::LabelCollision,
                            Severity::Info,
                            "annotation labels collide".into(),
                            vec![],
                        )
                        .with_param("annotations", serde_json::json!([ai, bi])),
                    );
                }
            }
        }

        let layout = layout.clamp(0.0, 100.0);
        let style = style.clamp(0.0, 100.0);
        let physics = physics.clamp(0.0, 100.0);
        let overall =
            (0.4 * layout + 0.25 * connectivity + 0.1 * style + 0.25 * physics).clamp(0.0, 100.0);

        QualityScore { overall, layout, connectivity, style, physics, issues }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ConstraintKind, LayoutConstraint};
    use crate::scene::{PrimitiveType, SceneObject};
    use crate::types::Domain;

    fn rect(id: &str, x: f64, y: f64) -> SceneObject {
        SceneObject::new(id, PrimitiveType::Rectangle, RenderLayer::Shapes)
            .at(x, y)
            .with_prop("width", serde_json::json!(40.0))
            .with_prop("height", serde_json::json!(40.0))
    }

    #[test]
    fn empty_scene_scores_zero_with_critical_issue() {
        let score = StructuralValidator.validate(&Scene::new(800.0, 600.0, Domain::General));
        assert_eq!(score.overall, 0.0);
        assert_eq!(score.issues[0].kind, IssueKind::EmptyScene);
        assert_eq!(score.issues[0].severity, Severity::Critical);
    }

    #[test]
    fn clean_scene_passes() {
        let mut scene = Scene::new(800.0, 600.0, Domain::General);
        scene.add_object(rect("a", 200.0, 300.0)).unwrap();
        scene.add_object(rect("b", 500.0, 300.0)).unwrap();
        let score = StructuralValidator.validate(&scene);
        assert!(score.passing(), "overall = {}", score.overall);
        assert!(score.issues.is_empty());
    }

    #[test]
    fn overlap_produces_typed_issue_with_parameters() {
        let mut scene = Scene::new(800.0, 600.0, Domain::General);
        scene.add_object(rect("a", 300.0, 300.0)).unwrap();
        scene.add_object(rect("b", 310.0, 300.0)).unwrap();
        let score = StructuralValidator.validate(&scene);
        let issue = score.issues.iter().find(|i| i.kind == IssueKind::Overlap).unwrap();
        assert_eq!(issue.object_ids, vec!["a".to_string(), "b".to_string()]);
        assert!(issue.parameters["overlap_x"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn missing_position_is_an_error() {
        let mut scene = Scene::new(800.0, 600.0, Domain::General);
        scene
            .add_object(SceneObject::new("a", PrimitiveType::Rectangle, RenderLayer::Shapes))
            .unwrap();
        let score = StructuralValidator.validate(&scene);
        let issue = score.issues.iter().find(|i| i.kind == IssueKind::MissingPosition).unwrap();
        assert_eq!(issue.severity, Severity::Error);
        assert!(score.layout < 100.0);
    }

    #[test]
    fn critical_constraint_violation_hits_physics_score() {
        let mut scene = Scene::new(800.0, 600.0, Domain::Electronics);
        scene.add_object(rect("a", 100.0, 100.0)).unwrap();
        scene.add_object(rect("b", 700.0, 500.0)).unwrap();
        scene
            .add_constraint(
                LayoutConstraint::new(
                    ConstraintKind::Distance,
                    vec!["a".into(), "b".into()],
                    crate::plan::Priority::Critical,
                )
                .with_param("min", serde_json::json!(0.0))
                .with_param("max", serde_json::json!(50.0)),
            )
            .unwrap();
        let score = StructuralValidator.validate(&scene);
        let issue = score
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::ConstraintViolated)
            .unwrap();
        assert_eq!(issue.severity, Severity::Critical);
        assert!(score.physics < 100.0);
        assert!(score.connectivity < 100.0);
    }

    #[test]
    fn positions_deserialized_from_pairs_still_validate() {
        // Mapping-shaped and pair-shaped positions meet the same accessor.
        let json = r##"{
            "version": "1.0",
            "metadata": {"domain": "general"},
            "coord_system": {"width": 800.0, "height": 600.0, "origin": "top-left"},
            "objects": [
                {"id": "a", "object_type": "RECTANGLE", "position": [200.0, 300.0],
                 "layer": "SHAPES", "style": {"fill": "#fff", "stroke": "#000", "stroke_width": 1.0, "opacity": 1.0}},
                {"id": "b", "object_type": "RECTANGLE", "position": {"x": 500.0, "y": 300.0},
                 "layer": "SHAPES", "style": {"fill": "#fff", "stroke": "#000", "stroke_width": 1.0, "opacity": 1.0}}
            ],
            "constraints": [],
            "annotations": []
        }"##;
        let scene: Scene = serde_json::from_str(json).unwrap();
        let score = StructuralValidator.validate(&scene);
        assert!(score.passing());
    }
}

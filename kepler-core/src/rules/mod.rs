//! Domain-rule engine: checks physical, chemical and geometric laws against
//! the built scene.
//!
//! Checks are non-blocking by default (severity WARN); only topology
//! violations, like an open electrical loop around a power source, report
//! CRITICAL. The report feeds the refinement loop and the final result.

use std::collections::BTreeMap;

use petgraph::algo::is_cyclic_undirected;
use petgraph::graph::UnGraph;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chem;
use crate::scene::{PrimitiveType, Scene};
use crate::types::{Domain, Severity};

/// Net-force tolerance (newtons) for the equilibrium check.
const NEWTON_TOLERANCE: f64 = 1.0;
/// Relative tolerance for the lens equation and energy conservation.
const RELATIVE_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCheck {
    pub name: String,
    pub passed: bool,
    pub severity: Severity,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleReport {
    pub domain: Domain,
    pub checks: Vec<RuleCheck>,
    pub errors: u32,
    pub warnings: u32,
}

impl RuleReport {
    fn from_checks(domain: Domain, checks: Vec<RuleCheck>) -> Self {
        let errors = checks
            .iter()
            .filter(|c| !c.passed && c.severity >= Severity::Error)
            .count() as u32;
        let warnings = checks
            .iter()
            .filter(|c| !c.passed && c.severity == Severity::Warn)
            .count() as u32;
        Self { domain, checks, errors, warnings }
    }

    pub fn critical_failures(&self) -> Vec<&RuleCheck> {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.severity == Severity::Critical)
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct RuleEngine;

impl RuleEngine {
    /// Run the domain's law checks over the scene.
    pub fn run(&self, domain: Domain, scene: &Scene, text: &str) -> RuleReport {
        let name = domain.as_str();
        let checks = if name.contains("electro") || text.to_lowercase().contains("current") {
            electronics_checks(scene)
        } else if name.contains("mechan") || name.contains("physics") {
            mechanics_checks(scene, text)
        } else if name.contains("optic") || text.to_lowercase().contains("light ") {
            optics_checks(scene)
        } else if name.contains("chem") {
            chemistry_checks(scene)
        } else if name.contains("geometry") || name.contains("math") {
            geometry_checks(scene)
        } else {
            Vec::new()
        };

        debug!(domain = name, checks = checks.len(), "rule engine complete");
        RuleReport::from_checks(domain, checks)
    }
}

// ── Electronics ────────────────────────────────────────────────────

fn is_component(object_type: PrimitiveType) -> bool {
    matches!(
        object_type,
        PrimitiveType::Battery
            | PrimitiveType::Capacitor
            | PrimitiveType::CapacitorPlate
            | PrimitiveType::Resistor
            | PrimitiveType::Switch
            | PrimitiveType::Ground
    )
}

fn electronics_checks(scene: &Scene) -> Vec<RuleCheck> {
    let mut checks = Vec::new();

    let components: Vec<&str> = scene
        .objects
        .iter()
        .filter(|o| is_component(o.object_type))
        .map(|o| o.id.as_str())
        .collect();
    let has_source = scene
        .objects
        .iter()
        .any(|o| o.object_type == PrimitiveType::Battery);

    // Wire objects carry their endpoints in properties.
    let mut graph = UnGraph::<&str, ()>::default();
    let mut index = BTreeMap::new();
    for id in &components {
        index.insert(*id, graph.add_node(*id));
    }
    let mut wired: u32 = 0;
    for object in &scene.objects {
        if object.object_type != PrimitiveType::Line {
            continue;
        }
        if let (Some(from), Some(to)) = (object.prop_str("from"), object.prop_str("to")) {
            if let (Some(&s), Some(&t)) = (index.get(from), index.get(to)) {
                graph.add_edge(s, t, ());
                wired += 1;
            }
        }
    }

    if has_source {
        let closed = is_cyclic_undirected(&graph);
        checks.push(RuleCheck {
            name: "kirchhoff_closed_loop".into(),
            passed: closed,
            severity: Severity::Critical,
            details: if closed {
                "circuit forms at least one closed loop through the power source".into()
            } else {
                format!("open loop: {wired} wires over {} components", components.len())
            },
        });

        let source_connected = scene.objects.iter().any(|o| {
            o.object_type == PrimitiveType::Line
                && [o.prop_str("from"), o.prop_str("to")].iter().any(|end| {
                    end.is_some_and(|id| {
                        scene
                            .object(id)
                            .is_some_and(|obj| obj.object_type == PrimitiveType::Battery)
                    })
                })
        });
        checks.push(RuleCheck {
            name: "power_source_connectivity".into(),
            passed: source_connected,
            severity: Severity::Warn,
            details: if source_connected {
                "power source is wired to the circuit".into()
            } else {
                "power source has no wire connections".into()
            },
        });
    } else {
        checks.push(RuleCheck {
            name: "kirchhoff_closed_loop".into(),
            passed: true,
            severity: Severity::Info,
            details: "no power source present; loop check not applicable".into(),
        });
    }

    checks
}

// ── Mechanics ──────────────────────────────────────────────────────

fn mechanics_checks(scene: &Scene, text: &str) -> Vec<RuleCheck> {
    let mut checks = Vec::new();

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut force_count = 0;
    for object in &scene.objects {
        if object.object_type != PrimitiveType::Arrow {
            continue;
        }
        let (Some(magnitude), Some(angle_deg)) =
            (object.prop_f64("magnitude"), object.prop_f64("angle_deg"))
        else {
            continue;
        };
        let angle = angle_deg.to_radians();
        sum_x += magnitude * angle.cos();
        sum_y += magnitude * angle.sin();
        force_count += 1;
    }

    if force_count > 0 {
        let balanced = sum_x.abs() <= NEWTON_TOLERANCE && sum_y.abs() <= NEWTON_TOLERANCE;
        checks.push(RuleCheck {
            name: "newton_equilibrium".into(),
            passed: balanced,
            // Non-zero net force is expected in dynamic scenarios; warn only.
            severity: Severity::Warn,
            details: format!("net force: Fx = {sum_x:.2} N, Fy = {sum_y:.2} N over {force_count} forces"),
        });
    }

    let lower = text.to_lowercase();
    let initial = extract_energy(&lower, "initial");
    let final_ = extract_energy(&lower, "final");
    if let (Some(e0), Some(e1)) = (initial, final_) {
        let within = e0 != 0.0 && ((e1 - e0) / e0).abs() <= RELATIVE_TOLERANCE;
        checks.push(RuleCheck {
            name: "energy_conservation".into(),
            passed: within,
            severity: Severity::Warn,
            details: format!("initial {e0} J vs final {e1} J"),
        });
    }

    checks
}

/// Pull "<stage> ... energy ... <value> J" out of the text, when present.
fn extract_energy(lower: &str, stage: &str) -> Option<f64> {
    let pos = lower.find(&format!("{stage} energy"))?;
    let tail = &lower[pos..];
    let digits: String = tail
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok()
}

// ── Optics ─────────────────────────────────────────────────────────

fn optics_checks(scene: &Scene) -> Vec<RuleCheck> {
    let mut checks = Vec::new();
    let lens = scene
        .objects
        .iter()
        .find(|o| o.object_type == PrimitiveType::Lens);

    if let Some(lens) = lens {
        if let (Some(f), Some(d_o), Some(d_i)) = (
            lens.prop_f64("focal_length"),
            lens.prop_f64("object_distance"),
            lens.prop_f64("image_distance"),
        ) {
            if f != 0.0 && d_o != 0.0 && d_i != 0.0 {
                let lhs = 1.0 / f;
                let rhs = 1.0 / d_o + 1.0 / d_i;
                let within = ((lhs - rhs) / lhs).abs() <= RELATIVE_TOLERANCE;
                checks.push(RuleCheck {
                    name: "lens_equation".into(),
                    passed: within,
                    severity: Severity::Warn,
                    details: format!(
                        "1/f = {lhs:.4}, 1/d_o + 1/d_i = {rhs:.4} (f={f}, d_o={d_o}, d_i={d_i})"
                    ),
                });
            }
        }
    }

    checks
}

// ── Chemistry ──────────────────────────────────────────────────────

fn chemistry_checks(scene: &Scene) -> Vec<RuleCheck> {
    let mut checks = Vec::new();

    let reaction: Option<crate::enrich::Reaction> = scene
        .metadata
        .get("reaction")
        .and_then(|v| serde_json::from_value(v.clone()).ok());

    if let Some(reaction) = reaction {
        let lhs = chem::atom_totals(&reaction.reactants);
        let rhs = chem::atom_totals(&reaction.products);
        let mut imbalances = Vec::new();
        let elements: std::collections::BTreeSet<&String> =
            lhs.keys().chain(rhs.keys()).collect();
        for element in elements {
            let l = lhs.get(element).copied().unwrap_or(0);
            let r = rhs.get(element).copied().unwrap_or(0);
            if l != r {
                imbalances.push(format!("{element}: {l} vs {r}"));
            }
        }
        let balanced = imbalances.is_empty();
        checks.push(RuleCheck {
            name: "atom_balance".into(),
            passed: balanced,
            severity: Severity::Warn,
            details: if balanced {
                let summary: Vec<String> =
                    lhs.iter().map(|(el, n)| format!("{el}: {n}={n}")).collect();
                summary.join(", ")
            } else {
                format!("unbalanced elements: {}", imbalances.join(", "))
            },
        });
    }

    checks
}

// ── Geometry ───────────────────────────────────────────────────────

fn geometry_checks(scene: &Scene) -> Vec<RuleCheck> {
    let mut checks = Vec::new();
    for object in &scene.objects {
        if object.object_type != PrimitiveType::Polygon {
            continue;
        }
        let sides = [
            object.prop_f64("side_a"),
            object.prop_f64("side_b"),
            object.prop_f64("side_c"),
        ];
        if let [Some(a), Some(b), Some(c)] = sides {
            let valid = a + b > c && b + c > a && a + c > b;
            checks.push(RuleCheck {
                name: format!("triangle_inequality_{}", object.id),
                passed: valid,
                severity: Severity::Warn,
                details: format!("sides {a}, {b}, {c}"),
            });
        }
    }
    checks
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{RenderLayer, SceneObject};

    fn circuit_scene(with_loop: bool) -> Scene {
        let mut scene = Scene::new(800.0, 600.0, Domain::Electronics);
        scene
            .add_object(SceneObject::new("battery", PrimitiveType::Battery, RenderLayer::Shapes))
            .unwrap();
        scene
            .add_object(SceneObject::new("c1", PrimitiveType::Capacitor, RenderLayer::Shapes))
            .unwrap();
        scene
            .add_object(SceneObject::new("c2", PrimitiveType::Capacitor, RenderLayer::Shapes))
            .unwrap();
        let mut wires = vec![("w0", "battery", "c1"), ("w1", "c1", "c2")];
        if with_loop {
            wires.push(("w2", "c2", "battery"));
        }
        for (id, from, to) in wires {
            scene
                .add_object(
                    SceneObject::new(id, PrimitiveType::Line, RenderLayer::Lines)
                        .with_prop("from", serde_json::json!(from))
                        .with_prop("to", serde_json::json!(to)),
                )
                .unwrap();
        }
        scene
    }

    #[test]
    fn closed_loop_passes_kirchhoff() {
        let report = RuleEngine.run(Domain::Electronics, &circuit_scene(true), "circuit");
        let loop_check = report
            .checks
            .iter()
            .find(|c| c.name == "kirchhoff_closed_loop")
            .unwrap();
        assert!(loop_check.passed);
        assert_eq!(report.errors, 0);
    }

    #[test]
    fn open_loop_is_critical() {
        let report = RuleEngine.run(Domain::Electronics, &circuit_scene(false), "circuit");
        let loop_check = report
            .checks
            .iter()
            .find(|c| c.name == "kirchhoff_closed_loop")
            .unwrap();
        assert!(!loop_check.passed);
        assert_eq!(loop_check.severity, Severity::Critical);
        assert_eq!(report.critical_failures().len(), 1);
    }

    #[test]
    fn incline_forces_report_net_force_as_warning() {
        let mut scene = Scene::new(800.0, 600.0, Domain::Mechanics);
        for (id, magnitude, angle) in [
            ("gravity", 98.0, 270.0),
            ("normal", 84.87, 60.0),
            ("friction", 25.46, 150.0),
        ] {
            scene
                .add_object(
                    SceneObject::new(id, PrimitiveType::Arrow, RenderLayer::Arrows)
                        .with_prop("magnitude", serde_json::json!(magnitude))
                        .with_prop("angle_deg", serde_json::json!(angle)),
                )
                .unwrap();
        }
        let report = RuleEngine.run(Domain::Mechanics, &scene, "mass slides down the incline");
        let newton = report
            .checks
            .iter()
            .find(|c| c.name == "newton_equilibrium")
            .unwrap();
        assert!(!newton.passed, "net force along the slope is non-zero");
        assert_eq!(newton.severity, Severity::Warn);
        assert_eq!(report.errors, 0);
        assert_eq!(report.warnings, 1);
    }

    #[test]
    fn balanced_forces_pass() {
        let mut scene = Scene::new(800.0, 600.0, Domain::Mechanics);
        for (id, magnitude, angle) in [("up", 50.0, 90.0), ("down", 50.0, 270.0)] {
            scene
                .add_object(
                    SceneObject::new(id, PrimitiveType::Arrow, RenderLayer::Arrows)
                        .with_prop("magnitude", serde_json::json!(magnitude))
                        .with_prop("angle_deg", serde_json::json!(angle)),
                )
                .unwrap();
        }
        let report = RuleEngine.run(Domain::Mechanics, &scene, "hanging mass at rest");
        assert!(report.checks.iter().all(|c| c.passed));
    }

    #[test]
    fn lens_equation_within_tolerance_passes() {
        let mut scene = Scene::new(800.0, 600.0, Domain::Optics);
        scene
            .add_object(
                SceneObject::new("lens", PrimitiveType::Lens, RenderLayer::Shapes)
                    .with_prop("focal_length", serde_json::json!(10.0))
                    .with_prop("object_distance", serde_json::json!(30.0))
                    .with_prop("image_distance", serde_json::json!(15.0)),
            )
            .unwrap();
        let report = RuleEngine.run(Domain::Optics, &scene, "lens");
        let check = report.checks.iter().find(|c| c.name == "lens_equation").unwrap();
        assert!(check.passed, "{}", check.details);
    }

    #[test]
    fn lens_equation_violation_warns() {
        let mut scene = Scene::new(800.0, 600.0, Domain::Optics);
        scene
            .add_object(
                SceneObject::new("lens", PrimitiveType::Lens, RenderLayer::Shapes)
                    .with_prop("focal_length", serde_json::json!(10.0))
                    .with_prop("object_distance", serde_json::json!(30.0))
                    .with_prop("image_distance", serde_json::json!(40.0)),
            )
            .unwrap();
        let report = RuleEngine.run(Domain::Optics, &scene, "lens");
        let check = report.checks.iter().find(|c| c.name == "lens_equation").unwrap();
        assert!(!check.passed);
        assert_eq!(report.warnings, 1);
    }

    fn reaction_scene(product_coefficient: u32) -> Scene {
        let mut scene = Scene::new(800.0, 600.0, Domain::Chemistry);
        let reaction = crate::enrich::Reaction {
            reactants: vec![
                crate::enrich::ReactionTerm { coefficient: 2, formula: "H2".into() },
                crate::enrich::ReactionTerm { coefficient: 1, formula: "O2".into() },
            ],
            products: vec![crate::enrich::ReactionTerm {
                coefficient: product_coefficient,
                formula: "H2O".into(),
            }],
        };
        scene
            .metadata
            .insert("reaction".into(), serde_json::to_value(reaction).unwrap());
        scene
    }

    #[test]
    fn balanced_reaction_passes_atom_balance() {
        let report = RuleEngine.run(Domain::Chemistry, &reaction_scene(2), "2H2 + O2 -> 2H2O");
        let check = report.checks.iter().find(|c| c.name == "atom_balance").unwrap();
        assert!(check.passed);
        assert!(check.details.contains("H: 4=4"));
        assert!(check.details.contains("O: 2=2"));
    }

    #[test]
    fn unbalanced_reaction_warns() {
        let report = RuleEngine.run(Domain::Chemistry, &reaction_scene(1), "2H2 + O2 -> H2O");
        let check = report.checks.iter().find(|c| c.name == "atom_balance").unwrap();
        assert!(!check.passed);
        assert_eq!(check.severity, Severity::Warn);
        assert!(check.details.contains('H'));
    }

    #[test]
    fn triangle_inequality() {
        let mut scene = Scene::new(800.0, 600.0, Domain::Geometry);
        scene
            .add_object(
                SceneObject::new("tri", PrimitiveType::Polygon, RenderLayer::Shapes)
                    .with_prop("side_a", serde_json::json!(3.0))
                    .with_prop("side_b", serde_json::json!(4.0))
                    .with_prop("side_c", serde_json::json!(5.0)),
            )
            .unwrap();
        let report = RuleEngine.run(Domain::Geometry, &scene, "triangle");
        assert!(report.checks[0].passed);

        let mut degenerate = Scene::new(800.0, 600.0, Domain::Geometry);
        degenerate
            .add_object(
                SceneObject::new("tri", PrimitiveType::Polygon, RenderLayer::Shapes)
                    .with_prop("side_a", serde_json::json!(1.0))
                    .with_prop("side_b", serde_json::json!(2.0))
                    .with_prop("side_c", serde_json::json!(10.0)),
            )
            .unwrap();
        let report = RuleEngine.run(Domain::Geometry, &degenerate, "triangle");
        assert!(!report.checks[0].passed);
    }

    #[test]
    fn unknown_domain_yields_empty_report() {
        let scene = Scene::new(800.0, 600.0, Domain::General);
        let report = RuleEngine.run(Domain::General, &scene, "nothing in particular");
        assert!(report.checks.is_empty());
        assert_eq!(report.errors, 0);
    }
}

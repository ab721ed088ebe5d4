//! Domain interpreters: turn a spec (problem text + plan) into a scene.
//!
//! The interpreter is a pluggable collaborator; the built-ins here cover the
//! fixed domain catalog. Interpreters are pure with respect to configuration:
//! the same input always yields the same scene.

use std::sync::OnceLock;

use regex::Regex;

use crate::enrich::tools::extract_variables;
use crate::error::Result;
use crate::plan::{
    ConstraintKind, DiagramPlan, LayoutConstraint, Priority, RelationKind, TemporalAnalysis,
};
use crate::types::Domain;

use super::{Annotation, ObjectStyle, PrimitiveType, RenderLayer, Scene, SceneObject};

/// Everything an interpreter sees about the request.
#[derive(Debug)]
pub struct InterpreterInput<'a> {
    pub text: &'a str,
    pub domain: Domain,
    pub plan: &'a DiagramPlan,
    pub temporal: Option<&'a TemporalAnalysis>,
}

/// Contract for domain interpreters.
pub trait DomainInterpreter: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn interpret(&self, input: &InterpreterInput<'_>) -> Result<Scene>;
}

/// Built-in interpreter for a domain. Process-wide statics; stateless.
pub fn interpreter_for(domain: Domain) -> &'static dyn DomainInterpreter {
    static ELECTRONICS: ElectronicsInterpreter = ElectronicsInterpreter;
    static MECHANICS: MechanicsInterpreter = MechanicsInterpreter;
    static OPTICS: OpticsInterpreter = OpticsInterpreter;
    static CHEMISTRY: ChemistryInterpreter = ChemistryInterpreter;
    static GENERIC: GenericInterpreter = GenericInterpreter;
    match domain {
        Domain::Electronics => &ELECTRONICS,
        Domain::Mechanics => &MECHANICS,
        Domain::Optics => &OPTICS,
        Domain::Chemistry => &CHEMISTRY,
        Domain::Geometry | Domain::General => &GENERIC,
    }
}

/// Object-id-safe slug of an arbitrary label.
fn slug(label: &str) -> String {
    let mut out: String = label
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    while out.contains("__") {
        out = out.replace("__", "_");
    }
    out.trim_matches('_').to_string()
}

fn style_from_plan(plan: &DiagramPlan, entity_id: &str) -> ObjectStyle {
    plan.style_hints.get(entity_id).map_or_else(ObjectStyle::default, |hint| ObjectStyle {
        fill: hint.fill.clone(),
        stroke: hint.stroke.clone(),
        stroke_width: hint.stroke_width,
        opacity: 1.0,
    })
}

// ── Electronics ────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ElectronicsInterpreter;

fn kappa_variables(text: &str) -> Vec<(String, f64)> {
    extract_variables(text)
        .into_iter()
        .filter(|v| v.name.starts_with('κ') || v.name.to_lowercase().starts_with("kappa"))
        .filter_map(|v| v.value.map(|value| (v.name, value)))
        .collect()
}

impl DomainInterpreter for ElectronicsInterpreter {
    fn name(&self) -> &'static str {
        "electronics"
    }

    fn interpret(&self, input: &InterpreterInput<'_>) -> Result<Scene> {
        let kappas = kappa_variables(input.text);
        if !kappas.is_empty() {
            return build_dielectric_capacitor(input, &kappas);
        }
        build_circuit(input)
    }
}

/// Parallel-plate capacitor with dielectric slabs between the plates.
fn build_dielectric_capacitor(
    input: &InterpreterInput<'_>,
    kappas: &[(String, f64)],
) -> Result<Scene> {
    let mut scene = Scene::new(
        input.plan.layout_hints.canvas_w,
        input.plan.layout_hints.canvas_h,
        input.domain,
    );
    let cx = scene.coord_system.width / 2.0;
    let cy = scene.coord_system.height / 2.0;
    let plate_w = 240.0;
    let gap = 120.0;

    for (id, y) in [("plate_top", cy - gap / 2.0), ("plate_bottom", cy + gap / 2.0)] {
        scene.add_object(
            SceneObject::new(id, PrimitiveType::CapacitorPlate, RenderLayer::Shapes)
                .at(cx, y)
                .with_prop("width", serde_json::json!(plate_w))
                .with_prop("height", serde_json::json!(10.0)),
        )?;
    }

    // Slabs split the gap left-to-right; each is tied between the plates.
    #[allow(clippy::cast_precision_loss)]
    let slab_w = plate_w / kappas.len() as f64;
    for (i, (name, value)) in kappas.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let x = cx - plate_w / 2.0 + slab_w * (i as f64 + 0.5);
        let id = format!("dielectric_{}", i + 1);
        scene.add_object(
            SceneObject::new(&id, PrimitiveType::Rectangle, RenderLayer::Fill)
                .at(x, cy)
                .with_prop("width", serde_json::json!(slab_w - 6.0))
                .with_prop("height", serde_json::json!(gap - 14.0))
                .with_prop("kappa", serde_json::json!(value))
                .with_style(ObjectStyle {
                    fill: dielectric_fill(i),
                    stroke: "#1f3a5f".to_string(),
                    stroke_width: 1.0,
                    opacity: 0.8,
                }),
        )?;
        scene.add_constraint(LayoutConstraint::new(
            ConstraintKind::Between,
            vec![id.clone(), "plate_top".to_string(), "plate_bottom".to_string()],
            Priority::High,
        ))?;
        scene.annotations.push(Annotation {
            id: format!("label_{id}"),
            text: format!("{name} = {value}"),
            target: Some(id),
            position: None,
        });
    }

    scene.add_constraint(
        LayoutConstraint::new(
            ConstraintKind::Alignment,
            vec!["plate_top".to_string(), "plate_bottom".to_string()],
            Priority::High,
        )
        .with_param("axis", serde_json::json!("vertical")),
    )?;

    for variable in extract_variables(input.text) {
        if variable.name.starts_with('κ') {
            continue;
        }
        if let Some(value) = variable.value {
            let unit = variable.unit.as_deref().unwrap_or("");
            scene.annotations.push(Annotation {
                id: format!("label_{}", slug(&variable.name)),
                text: format!("{} = {value} {unit}", variable.name),
                target: None,
                position: None,
            });
        }
    }

    Ok(scene)
}

/// Distinct fills so adjacent slabs read apart.
fn dielectric_fill(index: usize) -> String {
    const FILLS: [&str; 4] = ["#c7d8ec", "#9fc0e0", "#7aa8d4", "#5890c8"];
    FILLS[index % FILLS.len()].to_string()
}

/// Component circuit: one glyph per plan entity plus wires along relations.
fn build_circuit(input: &InterpreterInput<'_>) -> Result<Scene> {
    let plan = input.plan;
    let mut scene = Scene::new(plan.layout_hints.canvas_w, plan.layout_hints.canvas_h, input.domain);

    for entity in &plan.entities {
        let object_type = match entity.primitive_hint.as_deref() {
            Some("battery_symbol") => PrimitiveType::Battery,
            Some("capacitor_symbol") => PrimitiveType::Capacitor,
            Some("resistor_zigzag") => PrimitiveType::Resistor,
            Some("switch_symbol") => PrimitiveType::Switch,
            Some("ground_symbol") => PrimitiveType::Ground,
            Some("charge_dot") => PrimitiveType::Charge,
            _ => PrimitiveType::Rectangle,
        };
        let style = style_from_plan(plan, &entity.id);
        let hint = plan.style_hints.get(&entity.id);
        let mut object = SceneObject::new(&entity.id, object_type, RenderLayer::Shapes)
            .with_prop("width", serde_json::json!(hint.map_or(40.0, |h| h.width)))
            .with_prop("height", serde_json::json!(hint.map_or(40.0, |h| h.height)))
            .with_prop("label", serde_json::json!(entity.label))
            .with_style(style);
        if let Some(position) = plan.layout_hints.positions.get(&entity.id) {
            object.position = Some(*position);
        }
        scene.add_object(object)?;
        scene.annotations.push(Annotation {
            id: format!("label_{}", slug(&entity.id)),
            text: entity.label.clone(),
            target: Some(entity.id.clone()),
            position: None,
        });
    }

    // Wires follow the connective relations; endpoints resolve at render time.
    for (i, relation) in plan.relations.iter().enumerate() {
        if !matches!(
            relation.kind,
            RelationKind::ConnectedTo | RelationKind::Series | RelationKind::Parallel
        ) {
            continue;
        }
        let id = format!("wire_{i}");
        scene.add_object(
            SceneObject::new(&id, PrimitiveType::Line, RenderLayer::Lines)
                .with_prop("from", serde_json::json!(relation.source_id))
                .with_prop("to", serde_json::json!(relation.target_id)),
        )?;
    }

    Ok(scene)
}

// ── Mechanics ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MechanicsInterpreter;

const GRAVITY: f64 = 9.8;

fn angle_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(?:°|degrees?|deg\b)").expect("angle regex"))
}

fn friction_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:μ|mu|coefficient of(?: kinetic| static)? friction)[ =a-z]*?(0?\.\d+)")
            .expect("friction regex")
    })
}

fn mass_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*kg").expect("mass regex"))
}

impl DomainInterpreter for MechanicsInterpreter {
    fn name(&self) -> &'static str {
        "mechanics"
    }

    fn interpret(&self, input: &InterpreterInput<'_>) -> Result<Scene> {
        let lower = input.text.to_lowercase();
        let incline = lower.contains("incline") || lower.contains("ramp") || lower.contains("slope");
        if incline {
            build_incline(input)
        } else {
            build_body_with_forces(input)
        }
    }
}

/// Mass on an inclined surface with the standard force triple.
fn build_incline(input: &InterpreterInput<'_>) -> Result<Scene> {
    let mut scene = Scene::new(
        input.plan.layout_hints.canvas_w,
        input.plan.layout_hints.canvas_h,
        input.domain,
    );
    let text = input.text;
    let mass_kg = mass_regex()
        .captures(text)
        .and_then(|c| c[1].parse::<f64>().ok())
        .unwrap_or(1.0);
    let angle_deg = angle_regex()
        .captures(text)
        .and_then(|c| c[1].parse::<f64>().ok())
        .unwrap_or(30.0);
    let mu = friction_regex()
        .captures(&text.to_lowercase())
        .and_then(|c| c[1].parse::<f64>().ok());

    let cx = scene.coord_system.width / 2.0;
    let cy = scene.coord_system.height * 0.6;

    scene.add_object(
        SceneObject::new("incline_surface", PrimitiveType::Line, RenderLayer::Shapes)
            .at(cx, cy)
            .with_prop("length", serde_json::json!(320.0))
            .with_prop("angle_deg", serde_json::json!(angle_deg)),
    )?;

    let angle_rad = angle_deg.to_radians();
    let block = SceneObject::new("mass_block", PrimitiveType::Mass, RenderLayer::Shapes)
        .at(cx, cy - 80.0 * angle_rad.sin() - 30.0)
        .with_prop("width", serde_json::json!(60.0))
        .with_prop("height", serde_json::json!(60.0))
        .with_prop("mass_kg", serde_json::json!(mass_kg))
        .with_prop("label", serde_json::json!(format!("{mass_kg} kg")));
    scene.add_object(block)?;

    let weight = mass_kg * GRAVITY;
    let normal = weight * angle_rad.cos();
    let mut forces: Vec<(&str, f64, f64)> = vec![
        ("gravity", weight, 270.0),
        ("normal force", normal, 90.0 - angle_deg),
    ];
    if let Some(mu) = mu {
        // Kinetic friction resists sliding, pointing up the slope.
        forces.push(("friction", mu * normal, 180.0 - angle_deg));
    }

    for (name, magnitude, direction_deg) in forces {
        let id = format!("force_{}", slug(name));
        scene.add_object(
            SceneObject::new(&id, PrimitiveType::Arrow, RenderLayer::Arrows)
                .with_prop("magnitude", serde_json::json!(round2(magnitude)))
                .with_prop("angle_deg", serde_json::json!(round2(direction_deg)))
                .with_prop("length", serde_json::json!(30.0 + magnitude.min(120.0)))
                .with_prop("label", serde_json::json!(format!("{name} {:.1} N", magnitude)))
                .with_style(ObjectStyle {
                    fill: "#b03a2e".to_string(),
                    stroke: "#b03a2e".to_string(),
                    stroke_width: 2.5,
                    opacity: 1.0,
                }),
        )?;
        scene.add_constraint(
            LayoutConstraint::new(
                ConstraintKind::Distance,
                vec![id, "mass_block".to_string()],
                Priority::High,
            )
            .with_param("min", serde_json::json!(0.0))
            .with_param("max", serde_json::json!(40.0)),
        )?;
        let last = scene.objects.len() - 1;
        scene.annotations.push(Annotation {
            id: format!("label_{}", scene.objects[last].id),
            text: scene.objects[last]
                .prop_str("label")
                .unwrap_or_default()
                .to_string(),
            target: Some(scene.objects[last].id.clone()),
            position: None,
        });
    }

    scene.add_constraint(LayoutConstraint::new(
        ConstraintKind::Above,
        vec!["mass_block".to_string(), "incline_surface".to_string()],
        Priority::High,
    ))?;

    Ok(scene)
}

/// Free body: one object per plan entity, gravity on massive bodies.
fn build_body_with_forces(input: &InterpreterInput<'_>) -> Result<Scene> {
    let plan = input.plan;
    let mut scene = Scene::new(plan.layout_hints.canvas_w, plan.layout_hints.canvas_h, input.domain);

    for entity in &plan.entities {
        let object_type = match entity.primitive_hint.as_deref() {
            Some("mass_block") => PrimitiveType::Mass,
            Some("spring_coil") => PrimitiveType::Spring,
            Some("pulley_wheel") => PrimitiveType::Pulley,
            Some("force_arrow") => PrimitiveType::Arrow,
            Some("inclined_plane") => PrimitiveType::InclinedPlane,
            _ => PrimitiveType::Rectangle,
        };
        let layer = if object_type == PrimitiveType::Arrow {
            RenderLayer::Arrows
        } else {
            RenderLayer::Shapes
        };
        let hint = plan.style_hints.get(&entity.id);
        let mut object = SceneObject::new(&entity.id, object_type, layer)
            .with_prop("width", serde_json::json!(hint.map_or(50.0, |h| h.width)))
            .with_prop("height", serde_json::json!(hint.map_or(50.0, |h| h.height)))
            .with_prop("label", serde_json::json!(entity.label))
            .with_style(style_from_plan(plan, &entity.id));
        if let Some(value) = entity.properties.get("value") {
            object.properties.insert("mass_kg".to_string(), value.clone());
        }
        if let Some(position) = plan.layout_hints.positions.get(&entity.id) {
            object.position = Some(*position);
        }
        scene.add_object(object)?;
        scene.annotations.push(Annotation {
            id: format!("label_{}", slug(&entity.id)),
            text: entity.label.clone(),
            target: Some(entity.id.clone()),
            position: None,
        });
    }

    // A body at rest still feels gravity; draw it when a mass is present.
    let body = scene
        .objects
        .iter()
        .find(|o| o.object_type == PrimitiveType::Mass)
        .map(|o| (o.id.clone(), o.prop_f64("mass_kg").unwrap_or(1.0)));
    if let Some((body_id, mass_kg)) = body {
        let weight = mass_kg * GRAVITY;
        scene.add_object(
            SceneObject::new("force_gravity", PrimitiveType::Arrow, RenderLayer::Arrows)
                .with_prop("magnitude", serde_json::json!(round2(weight)))
                .with_prop("angle_deg", serde_json::json!(270.0))
                .with_prop("length", serde_json::json!(30.0 + weight.min(120.0)))
                .with_prop("label", serde_json::json!(format!("W = {:.1} N", weight))),
        )?;
        scene.add_constraint(
            LayoutConstraint::new(
                ConstraintKind::Distance,
                vec!["force_gravity".to_string(), body_id],
                Priority::High,
            )
            .with_param("min", serde_json::json!(0.0))
            .with_param("max", serde_json::json!(40.0)),
        )?;
    }

    Ok(scene)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ── Optics ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct OpticsInterpreter;

impl DomainInterpreter for OpticsInterpreter {
    fn name(&self) -> &'static str {
        "optics"
    }

    fn interpret(&self, input: &InterpreterInput<'_>) -> Result<Scene> {
        let mut scene = Scene::new(
            input.plan.layout_hints.canvas_w,
            input.plan.layout_hints.canvas_h,
            input.domain,
        );
        let variables = extract_variables(input.text);
        let read = |names: &[&str]| {
            variables
                .iter()
                .find(|v| names.contains(&v.name.as_str()))
                .and_then(|v| v.value)
        };
        let focal = read(&["f", "F"]).unwrap_or(10.0);
        let d_object = read(&["d_o", "do", "p"]).unwrap_or(2.0 * focal);
        let d_image = read(&["d_i", "di", "q"]).unwrap_or(2.0 * focal);

        let cx = scene.coord_system.width / 2.0;
        let cy = scene.coord_system.height / 2.0;
        // px per cm, sized so the longer distance fits the half canvas.
        let scale = (scene.coord_system.width * 0.4) / d_object.max(d_image).max(focal);

        scene.add_object(
            SceneObject::new("optical_axis", PrimitiveType::Line, RenderLayer::Background)
                .at(cx, cy)
                .with_prop("length", serde_json::json!(scene.coord_system.width * 0.9))
                .with_prop("angle_deg", serde_json::json!(0.0)),
        )?;
        scene.add_object(
            SceneObject::new("lens", PrimitiveType::Lens, RenderLayer::Shapes)
                .at(cx, cy)
                .with_prop("height", serde_json::json!(140.0))
                .with_prop("width", serde_json::json!(24.0))
                .with_prop("focal_length", serde_json::json!(focal))
                .with_prop("object_distance", serde_json::json!(d_object))
                .with_prop("image_distance", serde_json::json!(d_image)),
        )?;

        let object_x = cx - d_object * scale;
        let image_x = cx + d_image * scale;
        scene.add_object(
            SceneObject::new("object_marker", PrimitiveType::Arrow, RenderLayer::Shapes)
                .at(object_x, cy)
                .with_prop("magnitude", serde_json::json!(40.0))
                .with_prop("angle_deg", serde_json::json!(90.0))
                .with_prop("length", serde_json::json!(50.0))
                .with_prop("label", serde_json::json!("object")),
        )?;
        scene.add_object(
            SceneObject::new("image_marker", PrimitiveType::Arrow, RenderLayer::Shapes)
                .at(image_x, cy)
                .with_prop("magnitude", serde_json::json!(40.0))
                .with_prop("angle_deg", serde_json::json!(270.0))
                .with_prop("length", serde_json::json!(50.0))
                .with_prop("label", serde_json::json!("image")),
        )?;

        // Principal ray pair: parallel-then-focus and through-centre.
        for (i, (x1, y1, x2, y2)) in [
            (object_x, cy - 50.0, cx, cy - 50.0),
            (cx, cy - 50.0, image_x, cy + 50.0),
            (object_x, cy - 50.0, image_x, cy + 50.0),
        ]
        .into_iter()
        .enumerate()
        {
            scene.add_object(
                SceneObject::new(&format!("ray_{}", i + 1), PrimitiveType::Ray, RenderLayer::Lines)
                    .at((x1 + x2) / 2.0, (y1 + y2) / 2.0)
                    .with_prop("x1", serde_json::json!(x1))
                    .with_prop("y1", serde_json::json!(y1))
                    .with_prop("x2", serde_json::json!(x2))
                    .with_prop("y2", serde_json::json!(y2)),
            )?;
        }

        scene.add_constraint(LayoutConstraint::new(
            ConstraintKind::LeftOf,
            vec!["object_marker".to_string(), "lens".to_string()],
            Priority::High,
        ))?;
        scene.add_constraint(LayoutConstraint::new(
            ConstraintKind::RightOf,
            vec!["image_marker".to_string(), "lens".to_string()],
            Priority::High,
        ))?;

        scene.annotations.push(Annotation {
            id: "label_lens".to_string(),
            text: format!("f = {focal} cm"),
            target: Some("lens".to_string()),
            position: None,
        });

        Ok(scene)
    }
}

// ── Chemistry ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ChemistryInterpreter;

impl DomainInterpreter for ChemistryInterpreter {
    fn name(&self) -> &'static str {
        "chemistry"
    }

    fn interpret(&self, input: &InterpreterInput<'_>) -> Result<Scene> {
        let mut scene = Scene::new(
            input.plan.layout_hints.canvas_w,
            input.plan.layout_hints.canvas_h,
            input.domain,
        );

        let reaction = input
            .text
            .split(['.', ';', '\n'])
            .find_map(crate::chem::parse_reaction);

        let Some(reaction) = reaction else {
            // No reaction: fall back to one molecule per formula entity.
            for entity in &input.plan.entities {
                scene.add_object(
                    SceneObject::new(&slug(&entity.id), PrimitiveType::Molecule, RenderLayer::Shapes)
                        .with_prop("label", serde_json::json!(entity.label))
                        .with_style(style_from_plan(input.plan, &entity.id)),
                )?;
            }
            return Ok(scene);
        };

        scene.metadata.insert(
            "reaction".to_string(),
            serde_json::to_value(&reaction).unwrap_or(serde_json::Value::Null),
        );

        let cy = scene.coord_system.height / 2.0;
        let mut x = scene.coord_system.width * 0.15;
        let step = 90.0;

        let term_objects = |scene: &mut Scene,
                                terms: &[crate::enrich::ReactionTerm],
                                role: &str,
                                x: &mut f64|
         -> Result<Vec<String>> {
            let mut ids = Vec::new();
            for term in terms {
                let id = format!("{role}_{}", slug(&term.formula));
                scene.add_object(
                    SceneObject::new(&id, PrimitiveType::Molecule, RenderLayer::Shapes)
                        .at(*x, cy)
                        .with_prop("formula", serde_json::json!(term.formula))
                        .with_prop("coefficient", serde_json::json!(term.coefficient))
                        .with_prop("role", serde_json::json!(role)),
                )?;
                scene.annotations.push(Annotation {
                    id: format!("label_{id}"),
                    text: if term.coefficient > 1 {
                        format!("{}{}", term.coefficient, term.formula)
                    } else {
                        term.formula.clone()
                    },
                    target: Some(id.clone()),
                    position: None,
                });
                ids.push(id);
                *x += step;
            }
            Ok(ids)
        };

        let reactant_ids = term_objects(&mut scene, &reaction.reactants, "reactant", &mut x)?;
        let arrow_x = x;
        scene.add_object(
            SceneObject::new("reaction_arrow", PrimitiveType::Arrow, RenderLayer::Arrows)
                .at(arrow_x, cy)
                .with_prop("magnitude", serde_json::json!(40.0))
                .with_prop("angle_deg", serde_json::json!(0.0))
                .with_prop("length", serde_json::json!(60.0)),
        )?;
        x += step;
        let product_ids = term_objects(&mut scene, &reaction.products, "product", &mut x)?;

        for id in &reactant_ids {
            scene.add_constraint(LayoutConstraint::new(
                ConstraintKind::LeftOf,
                vec![id.clone(), "reaction_arrow".to_string()],
                Priority::High,
            ))?;
        }
        for id in &product_ids {
            scene.add_constraint(LayoutConstraint::new(
                ConstraintKind::RightOf,
                vec![id.clone(), "reaction_arrow".to_string()],
                Priority::High,
            ))?;
        }

        Ok(scene)
    }
}

// ── Generic fallback ───────────────────────────────────────────────

#[derive(Debug)]
pub struct GenericInterpreter;

impl DomainInterpreter for GenericInterpreter {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn interpret(&self, input: &InterpreterInput<'_>) -> Result<Scene> {
        let plan = input.plan;
        let mut scene =
            Scene::new(plan.layout_hints.canvas_w, plan.layout_hints.canvas_h, input.domain);
        for entity in &plan.entities {
            let hint = plan.style_hints.get(&entity.id);
            let mut object = SceneObject::new(&entity.id, PrimitiveType::Rectangle, RenderLayer::Shapes)
                .with_prop("width", serde_json::json!(hint.map_or(50.0, |h| h.width)))
                .with_prop("height", serde_json::json!(hint.map_or(50.0, |h| h.height)))
                .with_prop("label", serde_json::json!(entity.label))
                .with_style(style_from_plan(plan, &entity.id));
            if let Some(position) = plan.layout_hints.positions.get(&entity.id) {
                object.position = Some(*position);
            }
            scene.add_object(object)?;
            scene.annotations.push(Annotation {
                id: format!("label_{}", slug(&entity.id)),
                text: entity.label.clone(),
                target: Some(entity.id.clone()),
                position: None,
            });
        }
        Ok(scene)
    }
}

// ── Tests ──────────────────────────────────────────────────────────

//! Diagram planner: property graph + problem text → ordered diagram plan.
//!
//! Five deterministic stages: entity extraction (drawable test +
//! canonicalisation), relation mapping (edge table + implicit text patterns +
//! temporal hints), constraint generation, layout planning, style assignment.

use std::collections::BTreeMap;

use petgraph::algo::is_cyclic_undirected;
use petgraph::graph::UnGraph;
use tracing::debug;

use crate::graph::{EdgeType, NodeType, PropertyGraph};
use crate::types::{Domain, Position};
use crate::vocab;

use super::temporal::{TemporalAnalysis, TemporalAnalyzer};
use super::{
    complexity_score, select_solver, select_strategy, ConstraintKind, DiagramPlan,
    LayoutConstraint, LayoutHints, PlanEntity, PlanRelation, Priority, RelationKind, StyleHint,
};

/// Planner output: the plan plus the entity ids the drawable test rejected,
/// with reasons, for the trace.
#[derive(Debug)]
pub struct PlannerOutput {
    pub plan: DiagramPlan,
    pub filtered: Vec<(String, String)>,
    pub temporal: TemporalAnalysis,
}

#[derive(Debug)]
pub struct Planner {
    canvas_w: f64,
    canvas_h: f64,
}

impl Planner {
    pub fn new(canvas_w: f64, canvas_h: f64) -> Self {
        Self { canvas_w, canvas_h }
    }

    pub fn plan_from_property_graph(
        &self,
        graph: &PropertyGraph,
        text: &str,
        domain: Option<Domain>,
    ) -> PlannerOutput {
        let domain = domain.unwrap_or_else(|| Domain::detect(text));
        let temporal = TemporalAnalyzer.analyze(text);

        let (entities, filtered) = extract_entities(graph, domain);
        let relations = map_relations(graph, &entities, text, domain, &temporal);
        let constraints = generate_constraints(&entities, &relations, domain, self.canvas_w, self.canvas_h);

        let score = complexity_score(
            entities.len(),
            relations.len(),
            constraints.len(),
            constraints.iter().any(|c| c.priority == Priority::Critical),
        );
        let strategy = select_strategy(score, entities.len(), constraints.len());

        let layout_hints = LayoutHints {
            solver: select_solver(entities.len()),
            positions: initial_positions(&entities, self.canvas_w, self.canvas_h),
            canvas_w: self.canvas_w,
            canvas_h: self.canvas_h,
        };

        let style_hints = entities
            .iter()
            .map(|e| (e.id.clone(), style_for(e, domain)))
            .collect();

        debug!(
            domain = %domain,
            entities = entities.len(),
            relations = relations.len(),
            constraints = constraints.len(),
            score,
            ?strategy,
            "plan assembled"
        );

        PlannerOutput {
            plan: DiagramPlan {
                original_request: text.to_string(),
                domain: Some(domain),
                complexity_score: score,
                strategy,
                entities,
                relations,
                constraints,
                layout_hints,
                style_hints,
            },
            filtered,
            temporal,
        }
    }
}

// ── Stage 1: entity extraction ─────────────────────────────────────

/// Component kind a unit implies, per domain.
fn unit_primitive(unit: &str, domain: Domain) -> Option<&'static str> {
    let u = unit.trim();
    match domain {
        Domain::Electronics => match u {
            "F" | "μF" | "uF" | "nF" | "pF" => Some("capacitor_symbol"),
            "V" | "kV" | "mV" => Some("battery_symbol"),
            "Ω" | "kΩ" | "ohm" => Some("resistor_zigzag"),
            _ => None,
        },
        Domain::Mechanics => match u {
            "kg" | "g" | "mg" => Some("mass_block"),
            _ => None,
        },
        _ => None,
    }
}

/// Sub-component hints absorbed into a parent component when one exists.
fn absorbed_by(hint: &str) -> Option<&'static str> {
    match hint {
        "capacitor_plate" | "dielectric_slab" | "charge_dot" => Some("capacitor_symbol"),
        "wire_line" => Some("battery_symbol"),
        _ => None,
    }
}

fn is_abstract(node_type: NodeType) -> bool {
    matches!(node_type, NodeType::Concept | NodeType::Relation | NodeType::Action)
}

#[allow(clippy::too_many_lines)]
fn extract_entities(
    graph: &PropertyGraph,
    domain: Domain,
) -> (Vec<PlanEntity>, Vec<(String, String)>) {
    let mut entities: Vec<PlanEntity> = Vec::new();
    let mut filtered: Vec<(String, String)> = Vec::new();
    let mut hints_present: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();

    let has_hint = |set: &std::collections::BTreeSet<String>, h: &str| set.contains(h);

    // Pass 1: variable parameters whose unit names a component. One entity
    // per variable (C₁ and C₂ are distinct capacitors).
    for (id, node) in &graph.nodes {
        if node.properties.get("type").and_then(serde_json::Value::as_str) != Some("variable") {
            continue;
        }
        let Some(unit) = node.properties.get("unit").and_then(serde_json::Value::as_str) else {
            continue;
        };
        if let Some(hint) = unit_primitive(unit, domain) {
            entities.push(PlanEntity {
                id: id.clone(),
                entity_type: node.node_type,
                label: node.label.clone(),
                properties: node.properties.clone(),
                primitive_hint: Some(hint.to_string()),
            });
            hints_present.insert(hint.to_string());
        }
    }

    // Pass 2: everything else through the drawable test.
    for (id, node) in &graph.nodes {
        if entities.iter().any(|e| &e.id == id) {
            continue;
        }
        if is_abstract(node.node_type) {
            filtered.push((id.clone(), "abstract node type".into()));
            continue;
        }

        // Forces are always drawable as arrows.
        if node.node_type == NodeType::Force {
            entities.push(PlanEntity {
                id: id.clone(),
                entity_type: node.node_type,
                label: node.label.clone(),
                properties: node.properties.clone(),
                primitive_hint: Some("force_arrow".to_string()),
            });
            continue;
        }

        let vocab_hit = vocab::lookup_contained(&node.label);
        let unit = node.properties.get("unit").and_then(serde_json::Value::as_str);
        if vocab_hit.is_none() && unit.is_none() && !node.properties.contains_key("formula") {
            filtered.push((id.clone(), "outside domain vocabulary, no unit".into()));
            continue;
        }

        // Unit-bearing quantities that duplicate an already-planned component
        // kind are measurements of it, not new entities.
        if let Some(unit) = unit {
            if let Some(hint) = unit_primitive(unit, domain) {
                if has_hint(&hints_present, hint) {
                    filtered.push((id.clone(), format!("measurement of existing {hint}")));
                    continue;
                }
                entities.push(PlanEntity {
                    id: id.clone(),
                    entity_type: node.node_type,
                    label: component_label(hint),
                    properties: node.properties.clone(),
                    primitive_hint: Some(hint.to_string()),
                });
                hints_present.insert(hint.to_string());
                continue;
            }
            if vocab_hit.is_none() {
                filtered.push((id.clone(), "bare measurement".into()));
                continue;
            }
        }

        if node.properties.contains_key("formula") {
            entities.push(PlanEntity {
                id: id.clone(),
                entity_type: node.node_type,
                label: node.label.clone(),
                properties: node.properties.clone(),
                primitive_hint: Some("molecule_cluster".to_string()),
            });
            continue;
        }

        let Some((_, entry)) = vocab_hit else {
            filtered.push((id.clone(), "outside domain vocabulary".into()));
            continue;
        };
        let hint = entry.primitive_hint;

        if let Some(parent) = absorbed_by(hint) {
            if has_hint(&hints_present, parent) {
                filtered.push((id.clone(), format!("absorbed into {parent}")));
                continue;
            }
        }
        if has_hint(&hints_present, hint) {
            filtered.push((id.clone(), format!("duplicate of existing {hint}")));
            continue;
        }

        entities.push(PlanEntity {
            id: id.clone(),
            entity_type: node.node_type,
            label: node.label.clone(),
            properties: node.properties.clone(),
            primitive_hint: Some(hint.to_string()),
        });
        hints_present.insert(hint.to_string());
    }

    (entities, filtered)
}

/// Display label for a component derived from a bare measurement.
fn component_label(hint: &str) -> String {
    match hint {
        "battery_symbol" => "battery".to_string(),
        "capacitor_symbol" => "capacitor".to_string(),
        "resistor_zigzag" => "resistor".to_string(),
        "mass_block" => "mass".to_string(),
        other => other.replace('_', " "),
    }
}

// ── Stage 2: relation mapping ──────────────────────────────────────

/// Fixed edge-type → visual-relation table.
fn relation_for_edge(edge_type: EdgeType) -> RelationKind {
    match edge_type {
        EdgeType::ConnectedTo | EdgeType::BondedTo => RelationKind::ConnectedTo,
        EdgeType::ActsOn => RelationKind::ActsOn,
        EdgeType::Contains => RelationKind::Contains,
        EdgeType::LocatedAt => RelationKind::LocatedAt,
        EdgeType::RelatedTo | EdgeType::PartOf => RelationKind::RelatedTo,
    }
}

fn map_relations(
    graph: &PropertyGraph,
    entities: &[PlanEntity],
    text: &str,
    domain: Domain,
    temporal: &TemporalAnalysis,
) -> Vec<PlanRelation> {
    let kept: std::collections::BTreeSet<&str> =
        entities.iter().map(|e| e.id.as_str()).collect();
    let mut relations: Vec<PlanRelation> = Vec::new();
    let mut push_unique = |relations: &mut Vec<PlanRelation>, r: PlanRelation| {
        let duplicate = relations.iter().any(|existing| {
            existing.kind == r.kind
                && ((existing.source_id == r.source_id && existing.target_id == r.target_id)
                    || (existing.source_id == r.target_id && existing.target_id == r.source_id))
        });
        if !duplicate && r.source_id != r.target_id {
            relations.push(r);
        }
    };

    // Explicit edges between kept entities.
    for edge in &graph.edges {
        if kept.contains(edge.source.as_str()) && kept.contains(edge.target.as_str()) {
            push_unique(
                &mut relations,
                PlanRelation {
                    source_id: edge.source.clone(),
                    target_id: edge.target.clone(),
                    kind: relation_for_edge(edge.edge_type),
                    label: Some(edge.label.clone()),
                    properties: BTreeMap::new(),
                },
            );
        }
    }

    // Implicit relations from text patterns and the temporal analyzer.
    let lower = text.to_lowercase();
    if domain == Domain::Electronics {
        let components: Vec<&PlanEntity> = entities
            .iter()
            .filter(|e| {
                e.primitive_hint.as_deref() != Some("battery_symbol")
                    && e.primitive_hint.as_deref() != Some("force_arrow")
            })
            .collect();
        let source = entities
            .iter()
            .find(|e| e.primitive_hint.as_deref() == Some("battery_symbol"));

        // Final-stage topology wins over the initial wiring.
        let topology = temporal
            .implicit_relationships
            .get("circuit_topology")
            .map(String::as_str);
        let kind = match topology {
            Some("parallel") => Some(RelationKind::Parallel),
            Some(_) => Some(RelationKind::Series),
            None if lower.contains("parallel") => Some(RelationKind::Parallel),
            None if lower.contains("series") => Some(RelationKind::Series),
            None => None,
        };
        if let Some(kind) = kind {
            for pair in components.windows(2) {
                push_unique(
                    &mut relations,
                    PlanRelation {
                        source_id: pair[0].id.clone(),
                        target_id: pair[1].id.clone(),
                        kind,
                        label: None,
                        properties: BTreeMap::new(),
                    },
                );
            }
        }

        // The power source is wired to every component.
        if let Some(source) = source {
            for component in &components {
                push_unique(
                    &mut relations,
                    PlanRelation {
                        source_id: source.id.clone(),
                        target_id: component.id.clone(),
                        kind: RelationKind::ConnectedTo,
                        label: None,
                        properties: BTreeMap::new(),
                    },
                );
            }
        }
    }

    if domain == Domain::Mechanics {
        // Every force arrow acts on the (first) massive body.
        let body = entities
            .iter()
            .find(|e| e.primitive_hint.as_deref() == Some("mass_block"));
        if let Some(body) = body {
            for force in entities
                .iter()
                .filter(|e| e.primitive_hint.as_deref() == Some("force_arrow"))
            {
                push_unique(
                    &mut relations,
                    PlanRelation {
                        source_id: force.id.clone(),
                        target_id: body.id.clone(),
                        kind: RelationKind::ActsOn,
                        label: None,
                        properties: BTreeMap::new(),
                    },
                );
            }
        }
    }

    relations
}

// ── Stage 3: constraint generation ─────────────────────────────────

fn generate_constraints(
    entities: &[PlanEntity],
    relations: &[PlanRelation],
    domain: Domain,
    canvas_w: f64,
    canvas_h: f64,
) -> Vec<LayoutConstraint> {
    let mut constraints = Vec::new();

    for relation in relations {
        let pair = vec![relation.source_id.clone(), relation.target_id.clone()];
        match relation.kind {
            RelationKind::ConnectedTo => constraints.push(
                LayoutConstraint::new(ConstraintKind::Distance, pair, Priority::High)
                    .with_param("min", serde_json::json!(40.0))
                    .with_param("max", serde_json::json!(160.0)),
            ),
            RelationKind::Series => constraints.push(
                LayoutConstraint::new(ConstraintKind::Alignment, pair, Priority::High)
                    .with_param("axis", serde_json::json!("horizontal")),
            ),
            RelationKind::Parallel => {
                constraints.push(
                    LayoutConstraint::new(
                        ConstraintKind::Alignment,
                        pair.clone(),
                        Priority::High,
                    )
                    .with_param("axis", serde_json::json!("horizontal")),
                );
                constraints.push(
                    LayoutConstraint::new(ConstraintKind::Distance, pair, Priority::Normal)
                        .with_param("min", serde_json::json!(60.0))
                        .with_param("max", serde_json::json!(200.0)),
                );
            }
            RelationKind::ActsOn => constraints.push(
                LayoutConstraint::new(ConstraintKind::Distance, pair, Priority::High)
                    .with_param("min", serde_json::json!(0.0))
                    .with_param("max", serde_json::json!(80.0)),
            ),
            RelationKind::Contains => constraints.push(
                LayoutConstraint::new(ConstraintKind::Distance, pair, Priority::Normal)
                    .with_param("min", serde_json::json!(0.0))
                    .with_param("max", serde_json::json!(50.0)),
            ),
            RelationKind::LocatedAt => constraints.push(
                LayoutConstraint::new(ConstraintKind::Above, pair, Priority::Normal),
            ),
            RelationKind::RelatedTo => constraints.push(
                LayoutConstraint::new(ConstraintKind::Distance, pair, Priority::Low)
                    .with_param("min", serde_json::json!(40.0))
                    .with_param("max", serde_json::json!(300.0)),
            ),
        }
    }

    // Closed electrical loops are topology-critical.
    if domain == Domain::Electronics && relation_graph_has_cycle(entities, relations) {
        constraints.push(LayoutConstraint::new(
            ConstraintKind::ClosedLoop,
            entities.iter().map(|e| e.id.clone()).collect(),
            Priority::Critical,
        ));
    }

    // All pairs must not overlap.
    for (i, a) in entities.iter().enumerate() {
        for b in &entities[i + 1..] {
            constraints.push(LayoutConstraint::new(
                ConstraintKind::NoOverlap,
                vec![a.id.clone(), b.id.clone()],
                Priority::Normal,
            ));
        }
    }

    // Every entity stays on the canvas.
    for entity in entities {
        constraints.push(
            LayoutConstraint::new(
                ConstraintKind::Bounds,
                vec![entity.id.clone()],
                Priority::Normal,
            )
            .with_param("width", serde_json::json!(canvas_w))
            .with_param("height", serde_json::json!(canvas_h)),
        );
    }

    constraints
}

fn relation_graph_has_cycle(entities: &[PlanEntity], relations: &[PlanRelation]) -> bool {
    let mut graph = UnGraph::<&str, ()>::default();
    let mut index = BTreeMap::new();
    for entity in entities {
        index.insert(entity.id.as_str(), graph.add_node(entity.id.as_str()));
    }
    for relation in relations {
        if let (Some(&s), Some(&t)) = (
            index.get(relation.source_id.as_str()),
            index.get(relation.target_id.as_str()),
        ) {
            graph.add_edge(s, t, ());
        }
    }
    is_cyclic_undirected(&graph)
}

// ── Stage 4: layout planning ───────────────────────────────────────

/// Initial heuristic positions: one row, evenly spread, vertically centred.
#[allow(clippy::cast_precision_loss)]
fn initial_positions(
    entities: &[PlanEntity],
    canvas_w: f64,
    canvas_h: f64,
) -> BTreeMap<String, Position> {
    let n = entities.len();
    if n == 0 {
        return BTreeMap::new();
    }
    let margin = canvas_w * 0.15;
    let span = canvas_w - 2.0 * margin;
    let step = if n > 1 { span / (n as f64 - 1.0) } else { 0.0 };
    entities
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let x = if n == 1 { canvas_w / 2.0 } else { margin + step * i as f64 };
            (e.id.clone(), Position::new(x, canvas_h / 2.0))
        })
        .collect()
}

// ── Stage 5: style assignment ──────────────────────────────────────

fn style_for(entity: &PlanEntity, domain: Domain) -> StyleHint {
    let (fill, stroke) = match domain {
        Domain::Electronics => ("#eef3f8", "#1f3a5f"),
        Domain::Mechanics => ("#f5efe6", "#5a4632"),
        Domain::Optics => ("#eefaf5", "#1d6b4f"),
        Domain::Chemistry => ("#f8eef6", "#6b1d55"),
        Domain::Geometry | Domain::General => ("#f2f2f2", "#333333"),
    };
    let (width, height) = match entity.primitive_hint.as_deref() {
        Some("battery_symbol") => (30.0, 60.0),
        Some("capacitor_symbol" | "capacitor_plate") => (40.0, 60.0),
        Some("resistor_zigzag") => (60.0, 20.0),
        Some("mass_block") => (60.0, 60.0),
        Some("inclined_plane") => (200.0, 120.0),
        Some("lens_shape") => (20.0, 120.0),
        Some("force_arrow") => (80.0, 8.0),
        _ => (50.0, 50.0),
    };
    StyleHint {
        fill: fill.to_string(),
        stroke: stroke.to_string(),
        stroke_width: if entity.entity_type == NodeType::Force { 2.5 } else { 1.5 },
        width,
        height,
        symbol: entity.primitive_hint.clone(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────

//! Scene builder: strategy dispatch over the domain interpreters.
//!
//! DIRECT hands the whole spec to one interpreter. HIERARCHICAL splits the
//! plan into independent subproblems, interprets each, and composes the
//! subscenes left-to-right. CONSTRAINT_FIRST extracts spatial constraints
//! from the text, builds a minimal base scene, and augments it.
//!
//! An interpreter failure never aborts the pipeline: the builder degrades to
//! a minimal fallback scene and records a warning.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use petgraph::graph::UnGraph;
use petgraph::unionfind::UnionFind;
use petgraph::visit::{EdgeRef, NodeIndexable};
use regex::Regex;
use tracing::{debug, warn};

use crate::enrich::{NlpResult, ToolPayload};
use crate::graph::{normalize_id, PropertyGraph};
use crate::library::{library, PrimitiveStore};
use crate::plan::{
    ConstraintKind, DiagramPlan, LayoutConstraint, Priority, Strategy, TemporalAnalysis,
};
use crate::types::Domain;

use super::interpreters::{interpreter_for, DomainInterpreter, InterpreterInput};
use super::Scene;

/// Similarity above which a retrieved primitive's SVG body replaces the
/// interpreter's procedural shape.
const PRIMITIVE_SIM_THRESHOLD: f32 = 0.45;

const COMPOSE_GUTTER: f64 = 80.0;

#[derive(Debug)]
pub struct BuilderInput<'a> {
    pub text: &'a str,
    pub plan: &'a DiagramPlan,
    pub temporal: Option<&'a TemporalAnalysis>,
    pub nlp: Option<&'a NlpResult>,
    pub graph: Option<&'a PropertyGraph>,
}

#[derive(Debug, Default)]
pub struct SceneBuilder {
    /// Test seam: replaces the built-in interpreter lookup when set.
    interpreter_override: Option<Box<dyn DomainInterpreter>>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interpreter(interpreter: Box<dyn DomainInterpreter>) -> Self {
        Self { interpreter_override: Some(interpreter) }
    }

    /// Build a scene for the plan's strategy. Returns the scene plus warnings.
    pub fn build(&self, input: &BuilderInput<'_>) -> (Scene, Vec<String>) {
        let mut warnings = Vec::new();
        let domain = input.plan.domain.unwrap_or(Domain::General);

        let mut scene = match input.plan.strategy {
            Strategy::Direct => self.interpret(input, input.plan, domain, &mut warnings),
            Strategy::Hierarchical => self.build_hierarchical(input, domain, &mut warnings),
            Strategy::ConstraintFirst => {
                self.build_constraint_first(input, domain, &mut warnings)
            }
        };

        self.adopt_plan_constraints(&mut scene, input.plan);
        if let Some(nlp) = input.nlp {
            self.apply_nlp_context(&mut scene, nlp, input.graph, &mut warnings);
        }
        self.attach_primitives(&mut scene, domain);

        if scene.objects.is_empty() {
            warnings.push("scene has no drawable objects".to_string());
        }
        (scene, warnings)
    }

    fn interpret(
        &self,
        input: &BuilderInput<'_>,
        plan: &DiagramPlan,
        domain: Domain,
        warnings: &mut Vec<String>,
    ) -> Scene {
        let interpreter: &dyn DomainInterpreter = match &self.interpreter_override {
            Some(i) => i.as_ref(),
            None => interpreter_for(domain),
        };
        let interpreter_input = InterpreterInput {
            text: input.text,
            domain,
            plan,
            temporal: input.temporal,
        };
        match interpreter.interpret(&interpreter_input) {
            Ok(scene) => scene,
            Err(e) => {
                warn!(domain = %domain, error = %e, "interpreter failed; using fallback scene");
                warnings.push(format!("interpreter '{}' failed: {e}", interpreter.name()));
                Scene::fallback(plan.layout_hints.canvas_w, plan.layout_hints.canvas_h, domain)
            }
        }
    }

    // ── HIERARCHICAL ───────────────────────────────────────────────

    fn build_hierarchical(
        &self,
        input: &BuilderInput<'_>,
        domain: Domain,
        warnings: &mut Vec<String>,
    ) -> Scene {
        let groups = identify_subproblems(input.plan);
        if groups.len() <= 1 {
            return self.interpret(input, input.plan, domain, warnings);
        }

        let mut subscenes = Vec::new();
        for group in &groups {
            let sub_plan = restrict_plan(input.plan, group);
            subscenes.push(self.interpret(input, &sub_plan, domain, warnings));
        }
        compose_scenes(
            subscenes,
            input.plan.layout_hints.canvas_w,
            input.plan.layout_hints.canvas_h,
            domain,
            warnings,
        )
    }

    // ── CONSTRAINT_FIRST ───────────────────────────────────────────

    fn build_constraint_first(
        &self,
        input: &BuilderInput<'_>,
        domain: Domain,
        warnings: &mut Vec<String>,
    ) -> Scene {
        let extracted = extract_spatial_constraints(input.text);
        let mut scene = self.interpret(input, input.plan, domain, warnings);
        augment_with_constraints(&mut scene, &extracted, warnings);
        scene
    }

    // ── Shared post-processing ─────────────────────────────────────

    /// Plan constraints whose entities all map onto scene objects carry over.
    /// Template scenes replace plan entities with composed structures, so a
    /// miss here is normal, not an error.
    fn adopt_plan_constraints(&self, scene: &mut Scene, plan: &DiagramPlan) {
        for constraint in &plan.constraints {
            if constraint.entities.iter().all(|id| scene.object(id).is_some()) {
                let duplicate = scene
                    .constraints
                    .iter()
                    .any(|c| c.kind == constraint.kind && c.entities == constraint.entities);
                if !duplicate {
                    let _ = scene.add_constraint(constraint.clone());
                }
            } else {
                debug!(kind = ?constraint.kind, "plan constraint not adopted; entities absent");
            }
        }
    }

    /// NLP-context pass: object-presence validation and extra relations from
    /// triples whose endpoints both exist in the scene.
    fn apply_nlp_context(
        &self,
        scene: &mut Scene,
        nlp: &NlpResult,
        graph: Option<&PropertyGraph>,
        warnings: &mut Vec<String>,
    ) {
        if let Some(graph) = graph {
            for (id, node) in &graph.nodes {
                let represented = scene.object(id).is_some()
                    || scene
                        .objects
                        .iter()
                        .any(|o| o.prop_str("label").is_some_and(|l| normalize_id(l) == *id));
                if !represented && node.metadata.sources.len() > 1 {
                    // Multi-tool agreement suggests the entity matters.
                    warnings.push(format!("entity '{id}' is not represented in the scene"));
                }
            }
        }

        if let Some(ToolPayload::Triples { triples }) = nlp.get("openie") {
            for triple in triples {
                let s = normalize_id(&triple.subject);
                let o = normalize_id(&triple.object);
                if scene.object(&s).is_some() && scene.object(&o).is_some() {
                    let exists = scene.constraints.iter().any(|c| {
                        c.entities.contains(&s) && c.entities.contains(&o)
                    });
                    if !exists {
                        let _ = scene.add_constraint(
                            LayoutConstraint::new(
                                ConstraintKind::Distance,
                                vec![s.clone(), o.clone()],
                                Priority::Low,
                            )
                            .with_param("min", serde_json::json!(40.0))
                            .with_param("max", serde_json::json!(280.0)),
                        );
                    }
                }
            }
        }
    }

    /// Retrieve a library primitive per object; above the similarity
    /// threshold its SVG body is referenced instead of the procedural glyph.
    fn attach_primitives(&self, scene: &mut Scene, domain: Domain) {
        for object in &mut scene.objects {
            let query = object
                .prop_str("label")
                .map_or_else(|| object.id.replace('_', " "), str::to_string);
            let hits = library().semantic_search(&query, 1, Some(domain));
            if let Some(best) = hits.first() {
                if best.score >= PRIMITIVE_SIM_THRESHOLD {
                    object.properties.insert(
                        "primitive_id".to_string(),
                        serde_json::json!(best.primitive.id),
                    );
                }
            }
        }
    }
}

// ── Subproblem identification & composition ────────────────────────

/// Independent subsystems: connected components of the relation graph.
/// Isolated entities join the component of their nearest type peer, or form
/// a trailing group of their own.
fn identify_subproblems(plan: &DiagramPlan) -> Vec<Vec<String>> {
    let mut graph = UnGraph::<&str, ()>::default();
    let mut index = BTreeMap::new();
    for entity in &plan.entities {
        index.insert(entity.id.as_str(), graph.add_node(entity.id.as_str()));
    }
    for relation in &plan.relations {
        if let (Some(&s), Some(&t)) = (
            index.get(relation.source_id.as_str()),
            index.get(relation.target_id.as_str()),
        ) {
            graph.add_edge(s, t, ());
        }
    }

    let mut union = UnionFind::new(graph.node_bound());
    for edge in graph.edge_references() {
        union.union(graph.to_index(edge.source()), graph.to_index(edge.target()));
    }

    let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for entity in &plan.entities {
        let idx = index[entity.id.as_str()];
        let root = union.find(graph.to_index(idx));
        groups.entry(root).or_default().push(entity.id.clone());
    }
    groups.into_values().collect()
}

/// Sub-plan containing only the given entities and whatever references them.
fn restrict_plan(plan: &DiagramPlan, entity_ids: &[String]) -> DiagramPlan {
    let keep: std::collections::BTreeSet<&str> =
        entity_ids.iter().map(String::as_str).collect();
    let mut sub = plan.clone();
    sub.entities.retain(|e| keep.contains(e.id.as_str()));
    sub.relations.retain(|r| {
        keep.contains(r.source_id.as_str()) && keep.contains(r.target_id.as_str())
    });
    sub.constraints
        .retain(|c| c.entities.iter().all(|id| keep.contains(id.as_str())));
    sub.layout_hints.positions.retain(|id, _| keep.contains(id.as_str()));
    sub.style_hints.retain(|id, _| keep.contains(id.as_str()));
    sub
}

/// Lay subscenes out left-to-right with a fixed gutter, offsetting each
/// subscene's positioned objects. Colliding ids are renamed per subscene.
fn compose_scenes(
    subscenes: Vec<Scene>,
    canvas_w: f64,
    canvas_h: f64,
    domain: Domain,
    warnings: &mut Vec<String>,
) -> Scene {
    let mut composed = Scene::new(canvas_w, canvas_h, domain);
    let mut x_offset = 0.0;

    for (i, mut subscene) in subscenes.into_iter().enumerate() {
        // Rename ids that already exist in the composed scene.
        let taken: Vec<String> = composed.objects.iter().map(|o| o.id.clone()).collect();
        let mut renames: BTreeMap<String, String> = BTreeMap::new();
        for object in &subscene.objects {
            if taken.contains(&object.id) {
                renames.insert(object.id.clone(), format!("s{i}_{}", object.id));
            }
        }
        if !renames.is_empty() {
            for object in &mut subscene.objects {
                if let Some(renamed) = renames.get(&object.id) {
                    object.id.clone_from(renamed);
                }
            }
            for constraint in &mut subscene.constraints {
                for id in &mut constraint.entities {
                    if let Some(renamed) = renames.get(id) {
                        id.clone_from(renamed);
                    }
                }
            }
            for annotation in &mut subscene.annotations {
                if let Some(target) = &annotation.target {
                    if let Some(renamed) = renames.get(target) {
                        annotation.target = Some(renamed.clone());
                    }
                }
                annotation.id = format!("s{i}_{}", annotation.id);
            }
        }

        let width = subscene_width(&subscene);
        for mut object in subscene.objects {
            if let Some(position) = object.position {
                object.position = Some(position.offset(x_offset, 0.0));
            }
            if composed.add_object(object).is_err() {
                warnings.push(format!("dropped colliding object while composing subscene {i}"));
            }
        }
        for constraint in subscene.constraints {
            if composed.add_constraint(constraint).is_err() {
                warnings.push(format!(
                    "dropped dangling constraint while composing subscene {i}"
                ));
            }
        }
        composed.annotations.extend(subscene.annotations);
        x_offset += width + COMPOSE_GUTTER;
    }

    composed
}

/// Horizontal extent of a subscene's positioned objects.
fn subscene_width(scene: &Scene) -> f64 {
    let xs: Vec<f64> = scene
        .objects
        .iter()
        .filter_map(|o| o.position.map(|p| p.x))
        .collect();
    if xs.is_empty() {
        return 160.0;
    }
    let min = xs.iter().copied().fold(f64::INFINITY, f64::min);
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (max - min).max(120.0)
}

// ── Spatial constraint extraction (CONSTRAINT_FIRST) ───────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedConstraint {
    pub subject: String,
    pub kind: ConstraintKind,
    pub object: String,
    pub distance: Option<f64>,
}

fn relative_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:the\s+)?(\w+)\s+is\s+(above|below|left of|right of|to the left of|to the right of)\s+(?:the\s+)?(\w+)",
        )
        .expect("relative constraint regex")
    })
}

fn distance_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:the\s+)?(\w+)\s+is\s+(\d+(?:\.\d+)?)\s*(?:m|cm|mm|units?)\s+(?:from|away from)\s+(?:the\s+)?(\w+)",
        )
        .expect("distance constraint regex")
    })
}

/// Regex-based spatial extraction ("X is above Y", "X is 3 m from Y").
pub fn extract_spatial_constraints(text: &str) -> Vec<ExtractedConstraint> {
    let mut out = Vec::new();
    for caps in relative_regex().captures_iter(text) {
        let kind = match caps[2].to_lowercase().as_str() {
            "above" => ConstraintKind::Above,
            "below" => ConstraintKind::Below,
            "left of" | "to the left of" => ConstraintKind::LeftOf,
            _ => ConstraintKind::RightOf,
        };
        out.push(ExtractedConstraint {
            subject: caps[1].to_lowercase(),
            kind,
            object: caps[3].to_lowercase(),
            distance: None,
        });
    }
    for caps in distance_regex().captures_iter(text) {
        out.push(ExtractedConstraint {
            subject: caps[1].to_lowercase(),
            kind: ConstraintKind::Distance,
            object: caps[3].to_lowercase(),
            distance: caps[2].parse().ok(),
        });
    }
    out
}

/// Map extracted names to scene object ids and add the constraints.
fn augment_with_constraints(
    scene: &mut Scene,
    extracted: &[ExtractedConstraint],
    warnings: &mut Vec<String>,
) {
    for constraint in extracted {
        let subject = find_object_by_name(scene, &constraint.subject);
        let object = find_object_by_name(scene, &constraint.object);
        match (subject, object) {
            (Some(s), Some(o)) => {
                let mut c = LayoutConstraint::new(
                    constraint.kind,
                    vec![s, o],
                    Priority::High,
                );
                if let Some(d) = constraint.distance {
                    // Text distances are in world units; keep them as a band.
                    c = c
                        .with_param("min", serde_json::json!(d * 20.0))
                        .with_param("max", serde_json::json!(d * 60.0));
                }
                let _ = scene.add_constraint(c);
            }
            _ => warnings.push(format!(
                "spatial constraint '{} {:?} {}' references unknown objects",
                constraint.subject, constraint.kind, constraint.object
            )),
        }
    }
}

fn find_object_by_name(scene: &Scene, name: &str) -> Option<String> {
    scene
        .objects
        .iter()
        .find(|o| {
            o.id.contains(name)
                || o.prop_str("label").is_some_and(|l| l.to_lowercase().contains(name))
        })
        .map(|o| o.id.clone())
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{KeplerError, SceneError};
    use crate::graph::NodeType;
    use crate::plan::{LayoutHints, PlanEntity, PlanRelation, RelationKind, SolverChoice};
    use crate::scene::{PrimitiveType, RenderLayer, SceneObject};

    fn plan_with_entities(labels: &[&str], strategy: Strategy) -> DiagramPlan {
        DiagramPlan {
            original_request: "test".into(),
            domain: Some(Domain::General),
            complexity_score: 0.2,
            strategy,
            entities: labels
                .iter()
                .map(|l| PlanEntity {
                    id: (*l).to_string(),
                    entity_type: NodeType::Object,
                    label: (*l).to_string(),
                    properties: BTreeMap::new(),
                    primitive_hint: None,
                })
                .collect(),
            relations: vec![],
            constraints: vec![],
            layout_hints: LayoutHints {
                solver: SolverChoice::Heuristic,
                positions: BTreeMap::new(),
                canvas_w: 800.0,
                canvas_h: 600.0,
            },
            style_hints: BTreeMap::new(),
        }
    }

    fn builder_input<'a>(text: &'a str, plan: &'a DiagramPlan) -> BuilderInput<'a> {
        BuilderInput { text, plan, temporal: None, nlp: None, graph: None }
    }

    #[test]
    fn direct_strategy_uses_interpreter() {
        let plan = plan_with_entities(&["box"], Strategy::Direct);
        let (scene, _) = SceneBuilder::new().build(&builder_input("a box", &plan));
        assert_eq!(scene.objects.len(), 1);
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn failing_interpreter_degrades_to_fallback() {
        #[derive(Debug)]
        struct Exploding;
        impl DomainInterpreter for Exploding {
            fn name(&self) -> &'static str {
                "exploding"
            }
            fn interpret(&self, _input: &InterpreterInput<'_>) -> crate::error::Result<Scene> {
                Err(KeplerError::Scene(SceneError::Interpreter {
                    domain: "test".into(),
                    message: "boom".into(),
                }))
            }
        }
        let plan = plan_with_entities(&["box"], Strategy::Direct);
        let builder = SceneBuilder::with_interpreter(Box::new(Exploding));
        let (scene, warnings) = builder.build(&builder_input("a box", &plan));
        assert_eq!(scene.metadata.get("fallback"), Some(&serde_json::json!(true)));
        assert!(warnings.iter().any(|w| w.contains("boom")));
    }

    #[test]
    fn subproblems_follow_connected_components() {
        let mut plan = plan_with_entities(&["a", "b", "c", "d"], Strategy::Hierarchical);
        plan.relations.push(PlanRelation {
            source_id: "a".into(),
            target_id: "b".into(),
            kind: RelationKind::ConnectedTo,
            label: None,
            properties: BTreeMap::new(),
        });
        plan.relations.push(PlanRelation {
            source_id: "c".into(),
            target_id: "d".into(),
            kind: RelationKind::ConnectedTo,
            label: None,
            properties: BTreeMap::new(),
        });
        let groups = identify_subproblems(&plan);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().any(|g| g.contains(&"a".to_string()) && g.contains(&"b".to_string())));
        assert!(groups.iter().any(|g| g.contains(&"c".to_string()) && g.contains(&"d".to_string())));
    }

    #[test]
    fn hierarchical_compose_offsets_subscenes() {
        let mut plan = plan_with_entities(&["a", "b", "c", "d"], Strategy::Hierarchical);
        for id in ["a", "b", "c", "d"] {
            plan.layout_hints
                .positions
                .insert(id.to_string(), crate::types::Position::new(100.0, 300.0));
        }
        plan.relations.push(PlanRelation {
            source_id: "a".into(),
            target_id: "b".into(),
            kind: RelationKind::ConnectedTo,
            label: None,
            properties: BTreeMap::new(),
        });
        plan.relations.push(PlanRelation {
            source_id: "c".into(),
            target_id: "d".into(),
            kind: RelationKind::ConnectedTo,
            label: None,
            properties: BTreeMap::new(),
        });
        let (scene, _) = SceneBuilder::new().build(&builder_input("a b c d", &plan));
        assert_eq!(scene.objects.len(), 4);
        assert!(scene.validate().is_ok());

        // Second component is shifted right of the first.
        let x_a = scene.object("a").unwrap().position.unwrap().x;
        let x_c = scene.object("c").unwrap().position.unwrap().x;
        assert!(x_c > x_a);
    }

    #[test]
    fn spatial_extraction_reads_relative_phrases() {
        let extracted =
            extract_spatial_constraints("The lamp is above the table. A chair is 2 m from the table.");
        assert_eq!(extracted.len(), 2);
        assert_eq!(extracted[0].kind, ConstraintKind::Above);
        assert_eq!(extracted[0].subject, "lamp");
        assert_eq!(extracted[0].object, "table");
        assert_eq!(extracted[1].kind, ConstraintKind::Distance);
        assert_eq!(extracted[1].distance, Some(2.0));
    }

    #[test]
    fn constraint_first_augments_scene() {
        let mut plan = plan_with_entities(&["lamp", "table"], Strategy::ConstraintFirst);
        plan.domain = Some(Domain::General);
        let (scene, _) =
            SceneBuilder::new().build(&builder_input("The lamp is above the table.", &plan));
        assert!(scene
            .constraints
            .iter()
            .any(|c| c.kind == ConstraintKind::Above
                && c.entities == vec!["lamp".to_string(), "table".to_string()]));
    }

    #[test]
    fn unknown_spatial_names_warn_instead_of_failing() {
        let plan = plan_with_entities(&["table"], Strategy::ConstraintFirst);
        let (_, warnings) =
            SceneBuilder::new().build(&builder_input("The ghost is above the table.", &plan));
        assert!(warnings.iter().any(|w| w.contains("ghost")));
    }

    #[test]
    fn plan_constraints_adopted_when_ids_match() {
        let mut plan = plan_with_entities(&["a", "b"], Strategy::Direct);
        plan.constraints.push(LayoutConstraint::new(
            ConstraintKind::NoOverlap,
            vec!["a".into(), "b".into()],
            Priority::Normal,
        ));
        let (scene, _) = SceneBuilder::new().build(&builder_input("a and b", &plan));
        assert!(scene
            .constraints
            .iter()
            .any(|c| c.kind == ConstraintKind::NoOverlap));
    }

    #[test]
    fn compose_renames_colliding_ids() {
        let mut first = Scene::new(800.0, 600.0, Domain::General);
        first
            .add_object(
                SceneObject::new("shared", PrimitiveType::Rectangle, RenderLayer::Shapes)
                    .at(50.0, 50.0),
            )
            .unwrap();
        let mut second = Scene::new(800.0, 600.0, Domain::General);
        second
            .add_object(
                SceneObject::new("shared", PrimitiveType::Circle, RenderLayer::Shapes)
                    .at(60.0, 60.0),
            )
            .unwrap();
        let mut warnings = Vec::new();
        let composed =
            compose_scenes(vec![first, second], 800.0, 600.0, Domain::General, &mut warnings);
        assert_eq!(composed.objects.len(), 2);
        assert!(composed.object("shared").is_some());
        assert!(composed.object("s1_shared").is_some());
        assert!(warnings.is_empty());
    }
}

//! Domain ontology: class hierarchy, property domain/range, rule checks.
//!
//! The validator imports property-graph nodes as instances of ontology
//! classes, materialises an RL-style closure (transitive subclasses,
//! symmetric relations), and reports consistency. It never mutates the input
//! graph; it returns a report together with an enriched copy, and adopting
//! that copy is the pipeline's explicit decision.
//!
//! The ontology itself is process-wide: built once, immutable after init.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{EdgeType, NodeType, PropertyGraph};
use crate::types::Domain;
use crate::vocab;

// ── Ontology model ─────────────────────────────────────────────────

#[derive(Debug)]
pub struct Ontology {
    classes: BTreeSet<&'static str>,
    /// Direct subclass pairs `(sub, super)`.
    subclass: Vec<(&'static str, &'static str)>,
    /// Edge-type signatures: `(domain class, range class)`.
    signatures: BTreeMap<EdgeType, (&'static str, &'static str)>,
    /// Edge types whose inverse holds by symmetry.
    symmetric: BTreeSet<EdgeType>,
}

impl Ontology {
    fn build() -> Self {
        let classes: BTreeSet<&'static str> = [
            "Thing",
            "PhysicalObject",
            "Component",
            "ElectricalComponent",
            "MechanicalBody",
            "OpticalElement",
            "ChemicalSpecies",
            "GeometricShape",
            "Parameter",
            "Force",
            "Concept",
        ]
        .into_iter()
        .collect();

        let subclass = vec![
            ("PhysicalObject", "Thing"),
            ("Parameter", "Thing"),
            ("Force", "Thing"),
            ("Concept", "Thing"),
            ("Component", "PhysicalObject"),
            ("ElectricalComponent", "Component"),
            ("MechanicalBody", "Component"),
            ("OpticalElement", "Component"),
            ("ChemicalSpecies", "PhysicalObject"),
            ("GeometricShape", "PhysicalObject"),
        ];

        let mut signatures = BTreeMap::new();
        signatures.insert(EdgeType::ActsOn, ("Thing", "PhysicalObject"));
        signatures.insert(EdgeType::ConnectedTo, ("PhysicalObject", "PhysicalObject"));
        signatures.insert(EdgeType::Contains, ("PhysicalObject", "Thing"));
        signatures.insert(EdgeType::LocatedAt, ("PhysicalObject", "Thing"));
        signatures.insert(EdgeType::BondedTo, ("ChemicalSpecies", "ChemicalSpecies"));

        let symmetric = [EdgeType::ConnectedTo, EdgeType::BondedTo].into_iter().collect();

        Self { classes, subclass, signatures, symmetric }
    }

    /// All ancestors of a class, including itself (transitive closure).
    pub fn ancestors(&self, class: &str) -> BTreeSet<&'static str> {
        let mut out = BTreeSet::new();
        let mut frontier = vec![class.to_string()];
        while let Some(current) = frontier.pop() {
            if let Some(&known) = self.classes.get(current.as_str()) {
                if out.insert(known) {
                    for (sub, sup) in &self.subclass {
                        if *sub == known {
                            frontier.push((*sup).to_string());
                        }
                    }
                }
            }
        }
        out
    }

    pub fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        self.ancestors(class).contains(ancestor)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }
}

/// Process-wide ontology instance.
pub fn ontology() -> &'static Ontology {
    static INSTANCE: OnceLock<Ontology> = OnceLock::new();
    INSTANCE.get_or_init(Ontology::build)
}

// ── Classification ─────────────────────────────────────────────────

/// Ontology class best matching a node, refined by domain vocabulary.
pub fn classify(node: &crate::graph::PgNode) -> &'static str {
    if let Some((_, entry)) = vocab::lookup_contained(&node.label) {
        return match entry.domain {
            Domain::Electronics => "ElectricalComponent",
            Domain::Mechanics => "MechanicalBody",
            Domain::Optics => "OpticalElement",
            Domain::Chemistry => "ChemicalSpecies",
            Domain::Geometry => "GeometricShape",
            Domain::General => "PhysicalObject",
        };
    }
    if node.properties.get("formula").is_some() {
        return "ChemicalSpecies";
    }
    match node.node_type {
        NodeType::Object => "PhysicalObject",
        NodeType::Parameter | NodeType::Quantity => "Parameter",
        NodeType::Force => "Force",
        NodeType::Concept | NodeType::Relation | NodeType::Action => "Concept",
    }
}

// ── Validation ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyReport {
    /// `None` when the phase was skipped or unavailable.
    pub consistent: Option<bool>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub inferences_count: u64,
    pub triples_count: u64,
}

impl OntologyReport {
    /// Report for a skipped phase. Non-fatal by design.
    pub fn skipped(reason: &str) -> Self {
        Self {
            consistent: None,
            errors: vec![],
            warnings: vec![format!("ontology validation skipped: {reason}")],
            inferences_count: 0,
            triples_count: 0,
        }
    }
}

/// Validate the graph against the ontology for the given domain.
///
/// Returns the report and an enriched copy carrying the classification and
/// the materialised symmetric edges. The input graph is untouched.
pub fn validate(graph: &PropertyGraph, domain: Domain) -> (OntologyReport, PropertyGraph) {
    let onto = ontology();
    let mut enriched = graph.clone();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut inferences: u64 = 0;
    let mut triples: u64 = 0;

    // Import: assign every node its class and materialise ancestors.
    let mut classes: BTreeMap<String, &'static str> = BTreeMap::new();
    for (id, node) in &graph.nodes {
        let class = classify(node);
        if !onto.has_class(class) {
            errors.push(format!("node '{id}' classified into unknown class '{class}'"));
            continue;
        }
        triples += 1;
        let ancestors = onto.ancestors(class);
        inferences += ancestors.len() as u64 - 1; // closure beyond the direct class
        classes.insert(id.clone(), class);

        if let Some(enriched_node) = enriched.nodes.get_mut(id) {
            enriched_node
                .properties
                .entry("ontology_class".to_string())
                .or_insert_with(|| serde_json::json!(class));
        }
    }

    // Property domain/range checks.
    for edge in &graph.edges {
        triples += 1;
        if let Some((domain_class, range_class)) = onto.signatures.get(&edge.edge_type) {
            if let Some(source_class) = classes.get(&edge.source) {
                if !onto.is_subclass_of(source_class, domain_class) {
                    warnings.push(format!(
                        "edge {} -> {} : source class {source_class} outside domain {domain_class}",
                        edge.source, edge.target
                    ));
                }
            }
            if let Some(target_class) = classes.get(&edge.target) {
                if !onto.is_subclass_of(target_class, range_class) {
                    warnings.push(format!(
                        "edge {} -> {} : target class {target_class} outside range {range_class}",
                        edge.source, edge.target
                    ));
                }
            }
        }
    }

    // Symmetric closure: materialise reverse edges in the enriched copy.
    let existing: BTreeSet<(String, String, EdgeType)> = graph
        .edges
        .iter()
        .map(|e| (e.source.clone(), e.target.clone(), e.edge_type))
        .collect();
    for edge in &graph.edges {
        if onto.symmetric.contains(&edge.edge_type)
            && !existing.contains(&(edge.target.clone(), edge.source.clone(), edge.edge_type))
        {
            let _ = enriched.add_edge(
                &edge.target,
                &edge.source,
                edge.edge_type,
                &edge.label,
                edge.confidence,
                "ontology",
            );
            inferences += 1;
        }
    }

    // Per-domain rules.
    warnings.extend(domain_rule_warnings(graph, domain));

    let consistent = Some(errors.is_empty());
    debug!(
        ?consistent,
        inferences, triples, "ontology validation complete"
    );
    (
        OntologyReport {
            consistent,
            errors,
            warnings,
            inferences_count: inferences,
            triples_count: triples,
        },
        enriched,
    )
}

/// Per-domain structural expectations, reported as warnings.
fn domain_rule_warnings(graph: &PropertyGraph, domain: Domain) -> Vec<String> {
    let mut warnings = Vec::new();
    match domain {
        Domain::Mechanics => {
            for (id, node) in &graph.nodes {
                if node.node_type == NodeType::Force
                    && (!node.properties.contains_key("magnitude")
                        || !node.properties.contains_key("direction"))
                {
                    warnings.push(format!(
                        "force '{id}' is missing magnitude and/or direction"
                    ));
                }
            }
        }
        Domain::Electronics => {
            let has_source = graph.nodes.values().any(|n| {
                let l = n.label.to_lowercase();
                l.contains("battery") || l.contains("source") || l.contains("potential")
            });
            if !has_source && graph.node_count() > 0 {
                warnings.push("electronics graph has no power source node".to_string());
            }
        }
        Domain::Chemistry => {
            let has_formula = graph
                .nodes
                .values()
                .any(|n| n.properties.contains_key("formula"));
            if !has_formula && graph.node_count() > 0 {
                warnings.push("chemistry graph has no formula node".to_string());
            }
        }
        _ => {}
    }
    warnings
}

// ── Tests ──────────────────────────────────────────────────────────

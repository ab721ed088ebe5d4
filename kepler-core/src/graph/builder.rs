//! Deterministic merge of all extractor outputs into one property graph.
//!
//! Each tool family has a fixed merge rule; the duplicate policy lives in
//! `PropertyGraph::upsert_node` (first insertion wins type/label, later
//! sources add provenance and missing property keys).

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::enrich::{EntityTag, NlpResult, ToolPayload};

use super::{EdgeType, NodeType, PropertyGraph};

/// Statistics from one graph build, reported into the trace.
#[derive(Debug, Default, Clone)]
pub struct BuildStats {
    pub nodes_created: u64,
    pub nodes_merged: u64,
    pub edges_created: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
pub struct GraphBuilder;

impl GraphBuilder {
    /// Build the property graph from a (possibly partial) NLP result.
    ///
    /// Individual tool failures were already isolated upstream; a totally
    /// empty result yields an empty graph and a warning, never an error.
    pub fn build(&self, nlp: &NlpResult) -> (PropertyGraph, BuildStats) {
        let mut graph = PropertyGraph::default();
        let mut stats = BuildStats::default();

        for (tool, payload) in nlp.outcomes.iter().filter_map(|(name, outcome)| {
            match outcome {
                crate::enrich::ToolOutcome::Success(p) => Some((name.as_str(), p)),
                crate::enrich::ToolOutcome::Failure { .. } => None,
            }
        }) {
            match payload {
                ToolPayload::Triples { triples } => {
                    merge_triples(&mut graph, &mut stats, tool, triples, 0.8);
                }
                ToolPayload::Entities { entities } => {
                    merge_entities(&mut graph, &mut stats, tool, entities);
                }
                ToolPayload::Chemistry { formulas, reactions } => {
                    merge_chemistry(&mut graph, &mut stats, tool, formulas, reactions);
                }
                ToolPayload::MathExpressions { variables, .. } => {
                    merge_variables(&mut graph, &mut stats, tool, variables);
                }
                ToolPayload::Amr { concepts, relations } => {
                    for concept in concepts {
                        upsert(&mut graph, &mut stats, concept, NodeType::Concept, BTreeMap::new(), tool);
                    }
                    merge_triples(&mut graph, &mut stats, tool, relations, 0.7);
                }
                ToolPayload::Embeddings { spans } => {
                    for span in spans {
                        let mut props = BTreeMap::new();
                        props.insert(
                            "embedding".to_string(),
                            serde_json::json!(span.embedding),
                        );
                        upsert(&mut graph, &mut stats, &span.text, NodeType::Object, props, tool);
                    }
                }
                ToolPayload::EntityRelations { entities, relations } => {
                    merge_entities(&mut graph, &mut stats, tool, entities);
                    merge_triples(&mut graph, &mut stats, tool, relations, 0.75);
                }
            }
        }

        if graph.node_count() == 0 {
            stats
                .warnings
                .push("empty NLP result produced an empty property graph".to_string());
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "property graph built"
        );
        (graph, stats)
    }
}

fn upsert(
    graph: &mut PropertyGraph,
    stats: &mut BuildStats,
    label: &str,
    node_type: NodeType,
    properties: BTreeMap<String, serde_json::Value>,
    tool: &str,
) -> String {
    let (id, created) = graph.upsert_node(label, node_type, properties, tool);
    if created {
        stats.nodes_created += 1;
    } else {
        stats.nodes_merged += 1;
    }
    id
}

fn merge_triples(
    graph: &mut PropertyGraph,
    stats: &mut BuildStats,
    tool: &str,
    triples: &[crate::enrich::Triple],
    confidence: f64,
) {
    for triple in triples {
        let s = upsert(graph, stats, &triple.subject, NodeType::Object, BTreeMap::new(), tool);
        let o = upsert(graph, stats, &triple.object, NodeType::Object, BTreeMap::new(), tool);
        let edge_type = classify_relation(&triple.relation);
        if graph
            .add_edge(&s, &o, edge_type, &triple.relation, confidence, tool)
            .is_ok()
        {
            stats.edges_created += 1;
        }
    }
}

/// Fixed mapping from relation phrasing to edge type.
fn classify_relation(relation: &str) -> EdgeType {
    let lower = relation.to_lowercase();
    if lower.contains("connect") || lower.contains("wired") || lower.contains("attached") {
        EdgeType::ConnectedTo
    } else if lower.contains("acts on") || lower.contains("applied to") {
        EdgeType::ActsOn
    } else if lower.contains("contain") || lower.contains("filled") || lower.contains("consists")
    {
        EdgeType::Contains
    } else if lower.contains("rests on")
        || lower.contains("sits on")
        || lower.contains("placed")
        || lower.contains("hangs")
        || lower.contains("suspended")
    {
        EdgeType::LocatedAt
    } else {
        EdgeType::RelatedTo
    }
}

fn merge_entities(
    graph: &mut PropertyGraph,
    stats: &mut BuildStats,
    tool: &str,
    entities: &[crate::enrich::TaggedEntity],
) {
    for entity in entities {
        // Fixed tag → node-type mapping: QUANTITY becomes PARAMETER.
        let node_type = match entity.tag {
            EntityTag::Quantity => NodeType::Parameter,
            EntityTag::Force => NodeType::Force,
            EntityTag::Concept => NodeType::Concept,
            EntityTag::Object | EntityTag::Other => NodeType::Object,
        };
        let mut props = BTreeMap::new();
        props.insert("span".to_string(), serde_json::json!([entity.start, entity.end]));
        if entity.tag == EntityTag::Quantity {
            if let Some((value, unit)) = split_quantity(&entity.text) {
                props.insert("value".to_string(), serde_json::json!(value));
                props.insert("unit".to_string(), serde_json::json!(unit));
            }
        }
        upsert(graph, stats, &entity.text, node_type, props, tool);
    }
}

fn quantity_split_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(-?\d+(?:\.\d+)?)\s*(.+)$").expect("quantity split regex"))
}

/// Split "300 V" into `(300.0, "V")`.
fn split_quantity(text: &str) -> Option<(f64, String)> {
    let caps = quantity_split_regex().captures(text.trim())?;
    let value = caps[1].parse().ok()?;
    Some((value, caps[2].trim().to_string()))
}

fn merge_chemistry(
    graph: &mut PropertyGraph,
    stats: &mut BuildStats,
    tool: &str,
    formulas: &[String],
    reactions: &[crate::enrich::Reaction],
) {
    for formula in formulas {
        let mut props = BTreeMap::new();
        props.insert("formula".to_string(), serde_json::json!(true));
        upsert(graph, stats, formula, NodeType::Object, props, tool);
    }

    for reaction in reactions {
        for term in &reaction.reactants {
            let mut props = BTreeMap::new();
            props.insert("formula".to_string(), serde_json::json!(true));
            props.insert("role".to_string(), serde_json::json!("reactant"));
            props.insert("coefficient".to_string(), serde_json::json!(term.coefficient));
            upsert(graph, stats, &term.formula, NodeType::Object, props, tool);
        }
        for term in &reaction.products {
            let mut props = BTreeMap::new();
            props.insert("formula".to_string(), serde_json::json!(true));
            props.insert("role".to_string(), serde_json::json!("product"));
            props.insert("coefficient".to_string(), serde_json::json!(term.coefficient));
            upsert(graph, stats, &term.formula, NodeType::Object, props, tool);
        }
        for reactant in &reaction.reactants {
            for product in &reaction.products {
                let s = crate::graph::normalize_id(&reactant.formula);
                let t = crate::graph::normalize_id(&product.formula);
                if graph.add_edge(&s, &t, EdgeType::RelatedTo, "yields", 1.0, tool).is_ok() {
                    stats.edges_created += 1;
                }
            }
        }
    }
}

fn merge_variables(
    graph: &mut PropertyGraph,
    stats: &mut BuildStats,
    tool: &str,
    variables: &[crate::enrich::MathVariable],
) {
    for var in variables {
        let mut props = BTreeMap::new();
        props.insert("type".to_string(), serde_json::json!("variable"));
        if let Some(value) = var.value {
            props.insert("value".to_string(), serde_json::json!(value));
        }
        if let Some(unit) = &var.unit {
            props.insert("unit".to_string(), serde_json::json!(unit));
        }
        upsert(graph, stats, &var.name, NodeType::Parameter, props, tool);
    }
}

// ── Tests ──────────────────────────────────────────────────────────

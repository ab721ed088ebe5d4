//! Typed, provenance-tagged property graph.
//!
//! The graph is an arena of nodes keyed by stable string ids (the normalised
//! label); edges reference ids, never pointers. `BTreeMap` storage keeps
//! iteration and serialisation order stable, which is what makes graph build
//! idempotent and the persisted JSON reproducible.

pub mod builder;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

pub use builder::{BuildStats, GraphBuilder};

// ── Node / edge types ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    Object,
    Parameter,
    Concept,
    Quantity,
    Force,
    Relation,
    Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    RelatedTo,
    ActsOn,
    Contains,
    ConnectedTo,
    LocatedAt,
    BondedTo,
    PartOf,
}

/// Provenance metadata. `source` is the first producing tool and is always
/// set; `sources` accumulates every tool that touched the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub sources: Vec<String>,
}

impl Provenance {
    pub fn new(source: &str) -> Self {
        Self { source: source.to_string(), sources: vec![source.to_string()] }
    }

    fn record(&mut self, source: &str) {
        if !self.sources.iter().any(|s| s == source) {
            self.sources.push(source.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PgNode {
    pub id: String,
    pub node_type: NodeType,
    pub label: String,
    pub properties: BTreeMap<String, serde_json::Value>,
    pub metadata: Provenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PgEdge {
    pub source: String,
    pub target: String,
    pub edge_type: EdgeType,
    pub label: String,
    pub properties: BTreeMap<String, serde_json::Value>,
    pub metadata: Provenance,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
}

// ── Graph ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyGraph {
    pub nodes: BTreeMap<String, PgNode>,
    pub edges: Vec<PgEdge>,
}

/// Node id = normalised label: lowercased, trimmed, inner whitespace collapsed.
pub fn normalize_id(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl PropertyGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn get(&self, id: &str) -> Option<&PgNode> {
        self.nodes.get(id)
    }

    /// Insert-or-merge. First insertion fixes type and label; later
    /// insertions add provenance and fill property keys not already present.
    /// Returns true when the node was newly created.
    pub fn upsert_node(
        &mut self,
        label: &str,
        node_type: NodeType,
        properties: BTreeMap<String, serde_json::Value>,
        source: &str,
    ) -> (String, bool) {
        let id = normalize_id(label);
        match self.nodes.get_mut(&id) {
            Some(existing) => {
                existing.metadata.record(source);
                for (key, value) in properties {
                    existing.properties.entry(key).or_insert(value);
                }
                (id, false)
            }
            None => {
                self.nodes.insert(
                    id.clone(),
                    PgNode {
                        id: id.clone(),
                        node_type,
                        label: label.trim().to_string(),
                        properties,
                        metadata: Provenance::new(source),
                    },
                );
                (id, true)
            }
        }
    }

    /// Add an edge. Both endpoints must already exist.
    pub fn add_edge(
        &mut self,
        source_id: &str,
        target_id: &str,
        edge_type: EdgeType,
        label: &str,
        confidence: f64,
        tool: &str,
    ) -> Result<()> {
        for endpoint in [source_id, target_id] {
            if !self.nodes.contains_key(endpoint) {
                return Err(GraphError::DanglingEdge(format!(
                    "{source_id} -> {target_id} ({endpoint} missing)"
                ))
                .into());
            }
        }
        self.edges.push(PgEdge {
            source: source_id.to_string(),
            target: target_id.to_string(),
            edge_type,
            label: label.to_string(),
            properties: BTreeMap::new(),
            metadata: Provenance::new(tool),
            confidence: confidence.clamp(0.0, 1.0),
        });
        Ok(())
    }

    /// Outgoing and incoming neighbours of a node.
    pub fn neighbors(&self, id: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for edge in &self.edges {
            if edge.source == id {
                out.push(edge.target.as_str());
            } else if edge.target == id {
                out.push(edge.source.as_str());
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Check that every edge endpoint exists as a node.
    pub fn validate(&self) -> Result<()> {
        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target)
            {
                return Err(GraphError::DanglingEdge(format!(
                    "{} -> {}",
                    edge.source, edge.target
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Project into a petgraph digraph for cycle and connectivity queries.
    pub fn to_digraph(&self) -> (DiGraph<String, f64>, BTreeMap<String, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index: BTreeMap<String, NodeIndex> = BTreeMap::new();
        for id in self.nodes.keys() {
            let idx = graph.add_node(id.clone());
            index.insert(id.clone(), idx);
        }
        for edge in &self.edges {
            if let (Some(&s), Some(&t)) = (index.get(&edge.source), index.get(&edge.target)) {
                graph.add_edge(s, t, edge.confidence);
            }
        }
        (graph, index)
    }

    /// Persist as `property_graph.json` under the given directory.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).map_err(GraphError::Io)?;
        let path = dir.join("property_graph.json");
        let json = serde_json::to_string_pretty(self).map_err(GraphError::Serialization)?;
        std::fs::write(&path, json).map_err(GraphError::Io)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(GraphError::Io)?;
        let graph: Self = serde_json::from_str(&text).map_err(GraphError::Serialization)?;
        graph.validate()?;
        Ok(graph)
    }
}

/// Optional push connector to an external graph database.
/// Absence of a connector is not an error; the pipeline just skips the push.
pub trait GraphSink: Send + Sync + std::fmt::Debug {
    fn push(&self, graph: &PropertyGraph) -> Result<()>;
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalised_ids() {
        assert_eq!(normalize_id("  Charged   Capacitors "), "charged capacitors");
        assert_eq!(normalize_id("C1"), "c1");
    }

    #[test]
    fn upsert_merges_without_overwriting() {
        let mut g = PropertyGraph::default();
        let mut props = BTreeMap::new();
        props.insert("unit".into(), serde_json::json!("V"));
        let (id, created) = g.upsert_node("Battery", NodeType::Object, props, "openie");
        assert!(created);

        let mut props2 = BTreeMap::new();
        props2.insert("unit".into(), serde_json::json!("volts"));
        props2.insert("value".into(), serde_json::json!(300.0));
        let (id2, created2) = g.upsert_node("battery", NodeType::Parameter, props2, "stanza");
        assert_eq!(id, id2);
        assert!(!created2);

        let node = g.get(&id).unwrap();
        // First insertion fixed the type; later source filled missing keys only.
        assert_eq!(node.node_type, NodeType::Object);
        assert_eq!(node.properties["unit"], serde_json::json!("V"));
        assert_eq!(node.properties["value"], serde_json::json!(300.0));
        assert_eq!(node.metadata.source, "openie");
        assert_eq!(node.metadata.sources, vec!["openie", "stanza"]);
    }

    #[test]
    fn edges_require_existing_endpoints() {
        let mut g = PropertyGraph::default();
        g.upsert_node("a", NodeType::Object, BTreeMap::new(), "openie");
        assert!(g
            .add_edge("a", "missing", EdgeType::RelatedTo, "touches", 0.9, "openie")
            .is_err());

        g.upsert_node("b", NodeType::Object, BTreeMap::new(), "openie");
        assert!(g
            .add_edge("a", "b", EdgeType::ConnectedTo, "wired to", 0.9, "openie")
            .is_ok());
        assert!(g.validate().is_ok());
    }

    #[test]
    fn confidence_is_clamped() {
        let mut g = PropertyGraph::default();
        g.upsert_node("a", NodeType::Object, BTreeMap::new(), "t");
        g.upsert_node("b", NodeType::Object, BTreeMap::new(), "t");
        g.add_edge("a", "b", EdgeType::RelatedTo, "x", 1.7, "t").unwrap();
        assert_eq!(g.edges[0].confidence, 1.0);
    }

    #[test]
    fn digraph_projection_matches_counts() {
        let mut g = PropertyGraph::default();
        g.upsert_node("a", NodeType::Object, BTreeMap::new(), "t");
        g.upsert_node("b", NodeType::Object, BTreeMap::new(), "t");
        g.upsert_node("c", NodeType::Object, BTreeMap::new(), "t");
        g.add_edge("a", "b", EdgeType::ConnectedTo, "", 1.0, "t").unwrap();
        g.add_edge("b", "c", EdgeType::ConnectedTo, "", 1.0, "t").unwrap();
        let (dg, _) = g.to_digraph();
        assert_eq!(dg.node_count(), 3);
        assert_eq!(dg.edge_count(), 2);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = PropertyGraph::default();
        g.upsert_node("capacitor", NodeType::Object, BTreeMap::new(), "stanza");
        g.upsert_node("battery", NodeType::Object, BTreeMap::new(), "stanza");
        g.add_edge("capacitor", "battery", EdgeType::ConnectedTo, "", 1.0, "stanza")
            .unwrap();

        let path = g.save(dir.path()).unwrap();
        assert!(path.ends_with("property_graph.json"));
        let loaded = PropertyGraph::load(&path).unwrap();
        assert_eq!(loaded, g);
    }

    #[test]
    fn neighbors_are_deduped() {
        let mut g = PropertyGraph::default();
        g.upsert_node("a", NodeType::Object, BTreeMap::new(), "t");
        g.upsert_node("b", NodeType::Object, BTreeMap::new(), "t");
        g.add_edge("a", "b", EdgeType::RelatedTo, "", 1.0, "t").unwrap();
        g.add_edge("b", "a", EdgeType::RelatedTo, "", 1.0, "t").unwrap();
        assert_eq!(g.neighbors("a"), vec!["b"]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn normalize_is_idempotent(label in "[ A-Za-z0-9]{0,30}") {
                let once = normalize_id(&label);
                prop_assert_eq!(normalize_id(&once), once);
            }

            #[test]
            fn upsert_same_label_never_duplicates(
                label in "[A-Za-z]{1,12}",
                sources in proptest::collection::vec("[a-z]{3,8}", 1..5),
            ) {
                let mut g = PropertyGraph::default();
                for s in &sources {
                    g.upsert_node(&label, NodeType::Object, BTreeMap::new(), s);
                }
                prop_assert_eq!(g.node_count(), 1);
                let node = g.get(&normalize_id(&label)).unwrap();
                prop_assert_eq!(&node.metadata.source, &sources[0]);
            }
        }
    }
}

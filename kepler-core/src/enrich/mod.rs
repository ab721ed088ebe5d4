//! NLP enrichment phase: fan the problem text out over the configured tool
//! adapters and collect a per-tool result map.
//!
//! Tools run as independent tokio tasks with a per-tool timeout. A failing or
//! panicking tool lands an error entry in its own slot and never cancels its
//! siblings; the phase itself never fails the pipeline.

pub mod tools;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::KeplerConfig;

pub use tools::{NlpTool, ToolRegistry};

// ── Payload shapes ─────────────────────────────────────────────────

/// An OpenIE-style `(subject, relation, object)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub relation: String,
    pub object: String,
}

/// Entity category assigned by the tagger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityTag {
    Quantity,
    Force,
    Object,
    Concept,
    Other,
}

/// A typed entity span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedEntity {
    pub text: String,
    pub tag: EntityTag,
    pub start: usize,
    pub end: usize,
}

/// A text span with its embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedSpan {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// One side of a chemical reaction: `coefficient × formula`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionTerm {
    pub coefficient: u32,
    pub formula: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub reactants: Vec<ReactionTerm>,
    pub products: Vec<ReactionTerm>,
}

/// A named variable with an optional value and unit (`C₁ = 2.00 μF`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathVariable {
    pub name: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
}

/// Tool-specific payload. One variant per extractor family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolPayload {
    Triples { triples: Vec<Triple> },
    Entities { entities: Vec<TaggedEntity> },
    Embeddings { spans: Vec<EmbeddedSpan> },
    Chemistry { formulas: Vec<String>, reactions: Vec<Reaction> },
    MathExpressions { variables: Vec<MathVariable>, expressions: Vec<String> },
    Amr { concepts: Vec<String>, relations: Vec<Triple> },
    EntityRelations { entities: Vec<TaggedEntity>, relations: Vec<Triple> },
}

impl ToolPayload {
    /// Whether this payload carries no extracted data at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Triples { triples } => triples.is_empty(),
            Self::Entities { entities } => entities.is_empty(),
            Self::Embeddings { spans } => spans.is_empty(),
            Self::Chemistry { formulas, reactions } => {
                formulas.is_empty() && reactions.is_empty()
            }
            Self::MathExpressions { variables, expressions } => {
                variables.is_empty() && expressions.is_empty()
            }
            Self::Amr { concepts, relations } => concepts.is_empty() && relations.is_empty(),
            Self::EntityRelations { entities, relations } => {
                entities.is_empty() && relations.is_empty()
            }
        }
    }
}

// ── Result map ─────────────────────────────────────────────────────

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutcome {
    Success(ToolPayload),
    Failure { error: String, traceback: Option<String> },
}

/// Mapping from tool name to outcome, preserving config order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NlpResult {
    pub outcomes: Vec<(String, ToolOutcome)>,
    pub warnings: Vec<String>,
}

impl NlpResult {
    pub fn get(&self, tool: &str) -> Option<&ToolPayload> {
        self.outcomes.iter().find_map(|(name, outcome)| match outcome {
            ToolOutcome::Success(payload) if name == tool => Some(payload),
            _ => None,
        })
    }

    /// Names of tools that produced a payload, in invocation order.
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ToolOutcome::Success(_)))
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// True when no tool produced any data. Valid, but warned downstream.
    pub fn is_empty(&self) -> bool {
        !self.outcomes.iter().any(|(_, o)| match o {
            ToolOutcome::Success(p) => !p.is_empty(),
            ToolOutcome::Failure { .. } => false,
        })
    }
}

// ── Enricher ───────────────────────────────────────────────────────

/// Runs each configured tool over the problem text.
#[derive(Debug)]
pub struct Enricher {
    registry: ToolRegistry,
}

impl Enricher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn from_config(config: &KeplerConfig) -> Self {
        Self::new(ToolRegistry::from_config(config))
    }

    /// Fan out over all enabled tools with per-tool timeouts, joining all.
    pub async fn enrich(&self, text: &str, per_tool_timeout: Duration) -> NlpResult {
        let mut result = NlpResult::default();

        let mut handles = Vec::new();
        for tool in self.registry.tools() {
            let tool: Arc<dyn NlpTool> = Arc::clone(tool);
            let text = text.to_string();
            let name = tool.name().to_string();
            let handle = tokio::spawn(async move {
                tokio::time::timeout(per_tool_timeout, tool.extract(&text)).await
            });
            handles.push((name, handle));
        }

        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(Ok(payload))) => {
                    debug!(tool = %name, "tool succeeded");
                    ToolOutcome::Success(payload)
                }
                Ok(Ok(Err(e))) => {
                    warn!(tool = %name, error = %e, "tool failed");
                    ToolOutcome::Failure { error: e.to_string(), traceback: None }
                }
                Ok(Err(_elapsed)) => {
                    warn!(tool = %name, "tool timed out");
                    result.warnings.push(format!(
                        "tool '{name}' timed out after {}s",
                        per_tool_timeout.as_secs()
                    ));
                    ToolOutcome::Failure {
                        error: format!("timed out after {}s", per_tool_timeout.as_secs()),
                        traceback: None,
                    }
                }
                Err(join_err) => {
                    // A panicking adapter is isolated to its own slot.
                    warn!(tool = %name, "tool task panicked");
                    ToolOutcome::Failure {
                        error: format!("adapter panicked: {join_err}"),
                        traceback: Some(join_err.to_string()),
                    }
                }
            };
            result.outcomes.push((name, outcome));
        }

        if result.is_empty() {
            result
                .warnings
                .push("no NLP tool produced output; downstream phases run on an empty graph".into());
        }
        result
    }
}

// ── Tests ──────────────────────────────────────────────────────────

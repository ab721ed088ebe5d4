//! Tool adapters and the data-driven registry.
//!
//! The external model wrappers (OpenIE, Stanza, SciBERT, …) sit behind the
//! [`NlpTool`] trait. The built-in adapters here are pattern-based stand-ins
//! implementing the same contract, so the pipeline runs end-to-end without a
//! model server; remote wrappers register through the same registry.
//!
//! Adding a tool takes a new adapter here plus a merge rule in the graph
//! builder — nothing else.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::warn;

use crate::chem;
use crate::config::KeplerConfig;
use crate::embedding;
use crate::error::Result;
use crate::vocab;

use super::{
    EmbeddedSpan, EntityTag, MathVariable, TaggedEntity, ToolPayload, Triple,
};

/// Common interface for NLP tool adapters.
#[async_trait::async_trait]
pub trait NlpTool: Send + Sync + std::fmt::Debug {
    /// Tool name as it appears in config and in the result map.
    fn name(&self) -> &'static str;

    /// Run extraction over the full problem text.
    async fn extract(&self, text: &str) -> Result<ToolPayload>;
}

/// Ordered set of tool adapters for one pipeline instance.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn NlpTool>>,
}

impl ToolRegistry {
    /// Instantiate the enabled tools in config order. Names without a
    /// built-in adapter are skipped with a warning.
    pub fn from_config(config: &KeplerConfig) -> Self {
        let mut registry = Self::default();
        for name in &config.nlp.tools {
            match name.as_str() {
                "openie" => registry.register(Arc::new(TripleTool)),
                "stanza" => registry.register(Arc::new(EntityTool)),
                "scibert" => registry.register(Arc::new(EmbedTool)),
                "chemdataextractor" => registry.register(Arc::new(ChemTool)),
                "mathbert" => registry.register(Arc::new(MathTool)),
                other => {
                    warn!(tool = other, "no adapter registered for tool; skipping");
                }
            }
        }
        registry
    }

    pub fn from_tools(tools: Vec<Arc<dyn NlpTool>>) -> Self {
        Self { tools }
    }

    pub fn register(&mut self, tool: Arc<dyn NlpTool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Arc<dyn NlpTool>] {
        &self.tools
    }
}

// ── Triple extraction (openie) ─────────────────────────────────────

/// Relation phrases recognised between clause halves, longest first.
const RELATION_PHRASES: &[&str] = &[
    "is applied to a series connection of",
    "is applied to",
    "are applied to",
    "is connected to",
    "are connected to",
    "is connected in series with",
    "is connected in parallel with",
    "are disconnected and reconnected with",
    "is attached to",
    "are attached to",
    "is placed between",
    "is placed on",
    "is suspended from",
    "hangs from",
    "rests on",
    "sits on",
    "slides down",
    "acts on",
    "passes through",
    "consists of",
    "is filled with",
    "contains",
];

#[derive(Debug)]
pub struct TripleTool;

#[async_trait::async_trait]
impl NlpTool for TripleTool {
    fn name(&self) -> &'static str {
        "openie"
    }

    async fn extract(&self, text: &str) -> Result<ToolPayload> {
        let mut triples = Vec::new();
        for sentence in split_sentences(text) {
            let lower = sentence.to_lowercase();
            for phrase in RELATION_PHRASES {
                if let Some(pos) = lower.find(phrase) {
                    let subject = clean_span(&sentence[..pos]);
                    let object = clean_span(&sentence[pos + phrase.len()..]);
                    if !subject.is_empty() && !object.is_empty() {
                        triples.push(Triple {
                            subject,
                            relation: (*phrase).to_string(),
                            object,
                        });
                    }
                    break; // first relation per sentence
                }
            }
        }
        Ok(ToolPayload::Triples { triples })
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Strip leading articles and trailing punctuation from a clause half.
fn clean_span(span: &str) -> String {
    let trimmed = span.trim().trim_end_matches([',', ':']);
    let lower = trimmed.to_lowercase();
    for article in ["a ", "an ", "the "] {
        if lower.starts_with(article) {
            return trimmed[article.len()..].trim().to_string();
        }
    }
    trimmed.to_string()
}

// ── Entity tagging (stanza) ────────────────────────────────────────

#[derive(Debug)]
pub struct EntityTool;

fn quantity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Units ordered longest-first so μF beats F and cm² beats cm.
        Regex::new(
            r"(\d+(?:\.\d+)?)\s*(μF|uF|pF|nF|kV|mV|kΩ|m/s²|m/s|cm²|cm|mm|km|kN|mA|ms|kJ|kW|mol|degrees|degree|ohm|deg|°C|V|F|Ω|kg|mg|g|m|N|A|s|J|W|K|°)",
        )
        .expect("quantity regex")
    })
}

const FORCE_TERMS: &[&str] = &[
    "normal force",
    "applied force",
    "frictional force",
    "gravitational force",
    "friction",
    "gravity",
    "tension",
    "weight",
];

#[async_trait::async_trait]
impl NlpTool for EntityTool {
    fn name(&self) -> &'static str {
        "stanza"
    }

    async fn extract(&self, text: &str) -> Result<ToolPayload> {
        let mut entities = Vec::new();

        for caps in quantity_regex().captures_iter(text) {
            let m = caps.get(0).expect("whole match");
            entities.push(TaggedEntity {
                text: m.as_str().to_string(),
                tag: EntityTag::Quantity,
                start: m.start(),
                end: m.end(),
            });
        }

        let lower = text.to_lowercase();
        for term in FORCE_TERMS {
            for (start, matched) in lower.match_indices(term) {
                entities.push(TaggedEntity {
                    text: matched.to_string(),
                    tag: EntityTag::Force,
                    start,
                    end: start + matched.len(),
                });
            }
        }

        for term in all_vocab_terms() {
            for (start, matched) in lower.match_indices(term.as_str()) {
                // Skip spans already claimed by a longer force term.
                if entities
                    .iter()
                    .any(|e| e.tag == EntityTag::Force && e.start <= start && start < e.end)
                {
                    continue;
                }
                entities.push(TaggedEntity {
                    text: matched.to_string(),
                    tag: EntityTag::Object,
                    start,
                    end: start + matched.len(),
                });
            }
        }

        entities.sort_by_key(|e| (e.start, std::cmp::Reverse(e.end)));
        entities.dedup_by(|later, earlier| {
            // Drop spans fully covered by an earlier, longer span.
            later.start >= earlier.start && later.end <= earlier.end
        });

        Ok(ToolPayload::Entities { entities })
    }
}

fn all_vocab_terms() -> Vec<String> {
    use crate::types::Domain;
    let mut terms: Vec<String> = [
        Domain::Electronics,
        Domain::Mechanics,
        Domain::Optics,
        Domain::Chemistry,
        Domain::Geometry,
    ]
    .iter()
    .flat_map(|d| vocab::terms_for(*d))
    .map(str::to_string)
    .collect();
    terms.sort_by_key(|t| std::cmp::Reverse(t.len()));
    terms
}

// ── Chemistry extraction (chemdataextractor) ───────────────────────

#[derive(Debug)]
pub struct ChemTool;

#[async_trait::async_trait]
impl NlpTool for ChemTool {
    fn name(&self) -> &'static str {
        "chemdataextractor"
    }

    async fn extract(&self, text: &str) -> Result<ToolPayload> {
        // Word-boundary regexes misfire on subscript digits and coefficient
        // prefixes (2H₂O), so formulas are found by token validation instead.
        let mut formulas = Vec::new();
        let tokens = text.split(|c: char| {
            !(c.is_alphanumeric() || c == '(' || c == ')' || ('₀'..='₉').contains(&c))
        });
        for raw in tokens {
            let token = raw.trim_start_matches(|c: char| c.is_ascii_digit());
            if token.is_empty() {
                continue;
            }
            if chem::is_plausible_formula(token) {
                let normalized = chem::normalize_subscripts(token);
                if !formulas.contains(&normalized) {
                    formulas.push(normalized);
                }
            }
        }

        let mut reactions = Vec::new();
        for segment in text.split(['.', ';', '\n']) {
            if let Some(rx) = chem::parse_reaction(segment) {
                reactions.push(rx);
            }
        }

        Ok(ToolPayload::Chemistry { formulas, reactions })
    }
}

// ── Math variable extraction (mathbert) ────────────────────────────

#[derive(Debug)]
pub struct MathTool;

fn variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Names like C₁, κ2, d_o, f; values like 2.00; units like μF, cm.
        Regex::new(
            r"([A-Za-zκλμθφα-ω][A-Za-z0-9₀-₉_]*)\s*=\s*(-?\d+(?:\.\d+)?)\s*(μF|uF|pF|nF|kV|mV|cm²|cm|mm|km|m/s²|m/s|kΩ|kg|mg|mol|deg|°|V|F|Ω|g|m|N|A|s|J|W|K)?",
        )
        .expect("variable regex")
    })
}

/// Synchronous variable extraction, shared with the scene interpreters.
pub fn extract_variables(text: &str) -> Vec<MathVariable> {
    variable_regex()
        .captures_iter(text)
        .map(|caps| MathVariable {
            name: chem::normalize_subscripts(&caps[1]),
            value: caps[2].parse::<f64>().ok(),
            unit: caps.get(3).map(|m| m.as_str().to_string()),
        })
        .collect()
}

#[async_trait::async_trait]
impl NlpTool for MathTool {
    fn name(&self) -> &'static str {
        "mathbert"
    }

    async fn extract(&self, text: &str) -> Result<ToolPayload> {
        let expressions = variable_regex()
            .captures_iter(text)
            .map(|caps| caps[0].trim().to_string())
            .collect();
        Ok(ToolPayload::MathExpressions {
            variables: extract_variables(text),
            expressions,
        })
    }
}

// ── Embedding extraction (scibert) ─────────────────────────────────

const STOPWORDS: &[&str] = &[
    "the", "with", "that", "this", "from", "into", "are", "and", "for", "has", "have",
    "was", "were", "then", "when", "what", "which", "their", "there", "between",
];

#[derive(Debug)]
pub struct EmbedTool;

#[async_trait::async_trait]
impl NlpTool for EmbedTool {
    fn name(&self) -> &'static str {
        "scibert"
    }

    async fn extract(&self, text: &str) -> Result<ToolPayload> {
        let mut seen = std::collections::BTreeSet::new();
        let mut spans = Vec::new();
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 4)
        {
            let lower = token.to_lowercase();
            if STOPWORDS.contains(&lower.as_str()) || !seen.insert(lower.clone()) {
                continue;
            }
            spans.push(EmbeddedSpan {
                text: lower.clone(),
                embedding: embedding::embed(&lower),
            });
        }
        Ok(ToolPayload::Embeddings { spans })
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const CAPACITOR_TEXT: &str = "A potential difference of 300 V is applied to a series \
        connection of two capacitors C₁=2.00 μF and C₂=8.00 μF. The charged capacitors are \
        disconnected and reconnected with plates of the same signs wired together.";

    #[tokio::test]
    async fn triple_tool_finds_application_relation() {
        let payload = TripleTool.extract(CAPACITOR_TEXT).await.unwrap();
        let ToolPayload::Triples { triples } = payload else {
            panic!("wrong payload kind");
        };
        assert!(!triples.is_empty());
        let first = &triples[0];
        assert!(first.subject.contains("300 V"));
        assert!(first.object.contains("capacitor"));
    }

    #[tokio::test]
    async fn entity_tool_tags_quantities_and_objects() {
        let payload = EntityTool.extract(CAPACITOR_TEXT).await.unwrap();
        let ToolPayload::Entities { entities } = payload else {
            panic!("wrong payload kind");
        };

        let quantities: Vec<_> =
            entities.iter().filter(|e| e.tag == EntityTag::Quantity).collect();
        assert!(quantities.iter().any(|e| e.text.contains("300 V")));
        assert!(quantities.iter().any(|e| e.text.contains("μF")));

        let objects: Vec<_> =
            entities.iter().filter(|e| e.tag == EntityTag::Object).collect();
        assert!(objects.iter().any(|e| e.text == "capacitor"));
        assert!(objects.iter().any(|e| e.text == "plate"));
    }

    #[tokio::test]
    async fn entity_tool_tags_forces() {
        let payload = EntityTool
            .extract("The normal force balances gravity while friction acts up the incline")
            .await
            .unwrap();
        let ToolPayload::Entities { entities } = payload else {
            panic!("wrong payload kind");
        };
        let forces: Vec<_> = entities.iter().filter(|e| e.tag == EntityTag::Force).collect();
        let texts: Vec<&str> = forces.iter().map(|e| e.text.as_str()).collect();
        assert!(texts.contains(&"normal force"));
        assert!(texts.contains(&"gravity"));
        assert!(texts.contains(&"friction"));
    }

    #[tokio::test]
    async fn entity_spans_are_well_formed() {
        let text = "A 10 kg mass on a 30° incline with friction";
        let payload = EntityTool.extract(text).await.unwrap();
        let ToolPayload::Entities { entities } = payload else {
            panic!("wrong payload kind");
        };
        for e in &entities {
            assert!(e.start < e.end);
            assert!(e.end <= text.len());
        }
    }

    #[tokio::test]
    async fn chem_tool_parses_reaction() {
        let payload = ChemTool
            .extract("Balance the reaction 2H₂ + O₂ → 2H₂O in the beaker.")
            .await
            .unwrap();
        let ToolPayload::Chemistry { formulas, reactions } = payload else {
            panic!("wrong payload kind");
        };
        assert!(formulas.contains(&"H2O".to_string()));
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].products[0].coefficient, 2);
    }

    #[tokio::test]
    async fn math_tool_reads_subscripted_variables() {
        let payload = MathTool.extract(CAPACITOR_TEXT).await.unwrap();
        let ToolPayload::MathExpressions { variables, .. } = payload else {
            panic!("wrong payload kind");
        };
        let c1 = variables.iter().find(|v| v.name == "C1").unwrap();
        assert_eq!(c1.value, Some(2.0));
        assert_eq!(c1.unit.as_deref(), Some("μF"));
        let c2 = variables.iter().find(|v| v.name == "C2").unwrap();
        assert_eq!(c2.value, Some(8.0));
    }

    #[tokio::test]
    async fn math_tool_reads_dielectric_constants() {
        let payload = MathTool
            .extract("Three dielectrics with κ₁=21, κ₂=42 and κ₃=58 fill the gap")
            .await
            .unwrap();
        let ToolPayload::MathExpressions { variables, .. } = payload else {
            panic!("wrong payload kind");
        };
        assert_eq!(variables.len(), 3);
        assert_eq!(variables[0].name, "κ1");
        assert_eq!(variables[2].value, Some(58.0));
    }

    #[tokio::test]
    async fn embed_tool_skips_stopwords_and_dedups() {
        let payload = EmbedTool
            .extract("the capacitor and the capacitor with plates")
            .await
            .unwrap();
        let ToolPayload::Embeddings { spans } = payload else {
            panic!("wrong payload kind");
        };
        let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts.iter().filter(|t| **t == "capacitor").count(), 1);
        assert!(!texts.contains(&"with"));
    }

    #[test]
    fn registry_respects_config_order_and_skips_unknown() {
        let mut config = KeplerConfig::default();
        config.nlp.tools =
            vec!["mathbert".into(), "nonexistent".into(), "openie".into()];
        let registry = ToolRegistry::from_config(&config);
        let names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["mathbert", "openie"]);
    }

    #[test]
    fn clean_span_strips_articles() {
        assert_eq!(clean_span("the charged capacitors"), "charged capacitors");
        assert_eq!(clean_span(" a battery,"), "battery");
    }
}

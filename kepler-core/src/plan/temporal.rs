//! Temporal analysis of the problem text.
//!
//! Detects multi-stage problems ("initial/final", "before/after", "then",
//! "collide and stick", reconnection phrasing) and derives the implicit
//! relational hints a single-pass reading misses. Domain-agnostic; consumed
//! by the planner and the scene builder.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageKind {
    Initial,
    Intermediate,
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub kind: StageKind,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionKind {
    /// Circuit or linkage is rewired between stages.
    ConnectionChange,
    /// Bodies collide (and possibly stick).
    Collision,
    /// A quantity or configuration changes without rewiring.
    StateChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub kind: TransitionKind,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalAnalysis {
    pub is_multistage: bool,
    pub stages: Vec<Stage>,
    /// Index into `stages` the question asks about, when determinable.
    pub question_target_stage: Option<usize>,
    pub transitions: Vec<Transition>,
    /// Implicit relational hints, e.g. `circuit_topology -> parallel`.
    pub implicit_relationships: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct TemporalAnalyzer;

fn then_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(then|after that|subsequently)\b").expect("then regex"))
}

impl TemporalAnalyzer {
    pub fn analyze(&self, text: &str) -> TemporalAnalysis {
        let lower = text.to_lowercase();
        let mut analysis = TemporalAnalysis::default();

        let has_initial_final = lower.contains("initial") && lower.contains("final");
        let has_before_after = lower.contains("before") && lower.contains("after");
        let has_then = then_regex().is_match(&lower);
        let has_reconnection =
            lower.contains("reconnected") || lower.contains("re-connected");
        let has_collision = lower.contains("collide") || lower.contains("collision");

        analysis.is_multistage =
            has_initial_final || has_before_after || has_then || has_reconnection || has_collision;
        if !analysis.is_multistage {
            return analysis;
        }

        // Stage split: the sentence introducing the transition starts the
        // final stage; everything before it is the initial configuration.
        let sentences: Vec<&str> = text
            .split(['.', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let transition_marker = |s: &str| {
            let l = s.to_lowercase();
            l.contains("reconnected")
                || l.contains("then")
                || l.contains("collide")
                || l.contains("after")
                || l.contains("final")
        };
        let split_at = sentences.iter().position(|s| transition_marker(s));
        match split_at {
            Some(i) if i > 0 => {
                analysis.stages.push(Stage {
                    kind: StageKind::Initial,
                    description: sentences[..i].join(". "),
                });
                analysis.stages.push(Stage {
                    kind: StageKind::Final,
                    description: sentences[i..].join(". "),
                });
            }
            _ => {
                analysis.stages.push(Stage {
                    kind: StageKind::Initial,
                    description: text.trim().to_string(),
                });
            }
        }

        if has_reconnection {
            analysis.transitions.push(Transition {
                kind: TransitionKind::ConnectionChange,
                description: "components are disconnected and reconnected".into(),
            });
        }
        if has_collision {
            let sticks = lower.contains("stick");
            analysis.transitions.push(Transition {
                kind: TransitionKind::Collision,
                description: if sticks {
                    "bodies collide and stick together".into()
                } else {
                    "bodies collide".into()
                },
            });
            if sticks {
                analysis
                    .implicit_relationships
                    .insert("collision_type".into(), "perfectly_inelastic".into());
            }
        }
        if analysis.transitions.is_empty() {
            analysis.transitions.push(Transition {
                kind: TransitionKind::StateChange,
                description: "configuration changes between stages".into(),
            });
        }

        // "plates of the same signs wired together" and friends mean the
        // rewired circuit is a parallel combination.
        if has_reconnection
            && (lower.contains("same sign") || lower.contains("positive plates together"))
        {
            analysis
                .implicit_relationships
                .insert("circuit_topology".into(), "parallel".into());
        }
        if has_reconnection
            && (lower.contains("opposite sign") || lower.contains("opposite plates"))
        {
            analysis
                .implicit_relationships
                .insert("circuit_topology".into(), "series_opposing".into());
        }

        // Questions about the outcome target the last stage.
        analysis.question_target_stage = if lower.contains("initial charge")
            || lower.contains("at first")
        {
            Some(0)
        } else if analysis.stages.len() > 1 {
            Some(analysis.stages.len() - 1)
        } else {
            None
        };

        analysis
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const RECONNECTION: &str = "A potential difference of 300 V is applied to a series \
        connection of two capacitors C1=2.00 μF and C2=8.00 μF. The charged capacitors are \
        disconnected and reconnected with plates of the same signs wired together.";

    #[test]
    fn reconnection_is_multistage_with_connection_change() {
        let analysis = TemporalAnalyzer.analyze(RECONNECTION);
        assert!(analysis.is_multistage);
        assert_eq!(analysis.stages.len(), 2);
        assert_eq!(analysis.stages[0].kind, StageKind::Initial);
        assert_eq!(analysis.stages[1].kind, StageKind::Final);
        assert!(analysis
            .transitions
            .iter()
            .any(|t| t.kind == TransitionKind::ConnectionChange));
    }

    #[test]
    fn same_signs_imply_parallel_topology() {
        let analysis = TemporalAnalyzer.analyze(RECONNECTION);
        assert_eq!(
            analysis.implicit_relationships.get("circuit_topology").map(String::as_str),
            Some("parallel")
        );
        assert_eq!(analysis.question_target_stage, Some(1));
    }

    #[test]
    fn collide_and_stick_detected() {
        let analysis = TemporalAnalyzer
            .analyze("Two carts move toward each other, collide and stick together.");
        assert!(analysis.is_multistage);
        assert!(analysis
            .transitions
            .iter()
            .any(|t| t.kind == TransitionKind::Collision));
        assert_eq!(
            analysis.implicit_relationships.get("collision_type").map(String::as_str),
            Some("perfectly_inelastic")
        );
    }

    #[test]
    fn initial_final_pair_detected() {
        let analysis = TemporalAnalyzer.analyze(
            "The initial velocity is 4 m/s. Find the final velocity after the push.",
        );
        assert!(analysis.is_multistage);
    }

    #[test]
    fn single_stage_text_is_not_multistage() {
        let analysis =
            TemporalAnalyzer.analyze("A 10 kg mass rests on a 30 degree incline.");
        assert!(!analysis.is_multistage);
        assert!(analysis.stages.is_empty());
        assert!(analysis.transitions.is_empty());
    }

    #[test]
    fn then_marks_multistage() {
        let analysis = TemporalAnalyzer
            .analyze("The switch is closed. Then the capacitor discharges through the resistor.");
        assert!(analysis.is_multistage);
        assert!(analysis.stages.len() >= 2);
    }
}

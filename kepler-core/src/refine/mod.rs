//! Refinement loop: bounded validate → fix → re-render cycle.
//!
//! Each iteration validates the scene, applies typed fixes, and re-renders.
//! Two terminal states: GOOD_ENOUGH once the structural score passes, and
//! NO_PROGRESS when a round fixes nothing. An optional VLM pass contributes
//! a visual-semantic verdict to the final confidence.

pub mod fixer;
pub mod structural;
pub mod vlm;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::render::Renderer;
use crate::scene::Scene;

pub use fixer::Refiner;
pub use structural::{IssueKind, QualityScore, StructuralValidator, ValidationIssue};
pub use vlm::{vlm_from_config, ChatBackedVlm, VlmProvider, VlmValidation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    Validating,
    Fixing,
    ReRendering,
    GoodEnough,
    NoProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementReport {
    pub structural: QualityScore,
    pub visual_semantic: Option<VlmValidation>,
    pub overall_confidence: f64,
    pub issues: Vec<ValidationIssue>,
    pub suggestions: Vec<String>,
    pub refinement_iterations: u32,
    /// State transitions, ending in a terminal state.
    pub states: Vec<LoopState>,
    /// Structural score after each validation pass.
    pub score_history: Vec<f64>,
}

#[derive(Debug)]
pub struct RefinementLoop {
    max_iterations: u32,
    validator: StructuralValidator,
    refiner: Refiner,
    renderer: Renderer,
}

impl RefinementLoop {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
            validator: StructuralValidator,
            refiner: Refiner,
            renderer: Renderer,
        }
    }

    /// Run the loop, mutating the scene and SVG in place, then apply the
    /// optional VLM pass.
    pub async fn post_validate(
        &self,
        svg: &mut String,
        scene: &mut Scene,
        problem_text: &str,
        vlm: Option<&dyn VlmProvider>,
    ) -> RefinementReport {
        let mut states = Vec::new();
        let mut score_history = Vec::new();
        let mut iterations = 0;
        let mut quality;

        loop {
            states.push(LoopState::Validating);
            quality = self.validator.validate(scene);
            score_history.push(quality.overall);
            debug!(iteration = iterations, score = quality.overall, "structural validation");

            if quality.passing() {
                states.push(LoopState::GoodEnough);
                break;
            }
            if iterations >= self.max_iterations {
                states.push(LoopState::NoProgress);
                break;
            }

            states.push(LoopState::Fixing);
            let fixed = self.refiner.fix(scene, &quality.issues);
            if fixed == 0 {
                states.push(LoopState::NoProgress);
                break;
            }

            states.push(LoopState::ReRendering);
            *svg = self.renderer.render(scene);
            iterations += 1;
        }

        let visual_semantic = match vlm {
            Some(vlm) => vlm.validate(svg, problem_text).await.ok(),
            None => None,
        };

        let structural_confidence = quality.overall / 100.0;
        let overall_confidence = match &visual_semantic {
            Some(v) => f64::midpoint(structural_confidence, v.confidence),
            None => structural_confidence,
        };

        let mut suggestions: Vec<String> = quality
            .issues
            .iter()
            .filter(|i| i.severity >= crate::types::Severity::Warn)
            .map(|i| i.message.clone())
            .collect();
        if let Some(v) = &visual_semantic {
            suggestions.extend(v.suggestions.iter().cloned());
        }

        info!(
            iterations,
            confidence = overall_confidence,
            terminal = ?states.last(),
            "refinement complete"
        );

        RefinementReport {
            issues: quality.issues.clone(),
            structural: quality,
            visual_semantic,
            overall_confidence,
            suggestions,
            refinement_iterations: iterations,
            states,
            score_history,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

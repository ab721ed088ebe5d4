use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Top-level Kepler configuration, matching `kepler.toml`.
///
/// Every optional subsystem is gated by a flag here. Unknown keys are
/// collected, not rejected — they surface as warnings on the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeplerConfig {
    #[serde(default)]
    pub nlp: NlpSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
    #[serde(default)]
    pub canvas: CanvasSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub vlm: VlmSection,

    /// Keys nobody recognises. Warnings, not errors.
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unknown: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlpSection {
    /// Enabled tools, in invocation order. Order is preserved in the result map.
    pub tools: Vec<String>,
}

impl Default for NlpSection {
    fn default() -> Self {
        Self {
            tools: vec![
                "openie".into(),
                "stanza".into(),
                "scibert".into(),
                "chemdataextractor".into(),
                "mathbert".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct PipelineSection {
    pub enable_property_graph: bool,
    pub enable_ontology_validation: bool,
    pub enable_smt: bool,
    pub enable_refinement: bool,
    pub enable_vlm: bool,
    pub enable_tracing: bool,
    pub max_refinement_iterations: u32,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            enable_property_graph: true,
            enable_ontology_validation: true,
            enable_smt: true,
            enable_refinement: true,
            enable_vlm: false, // opt-in: needs a vision endpoint
            enable_tracing: true,
            max_refinement_iterations: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSection {
    /// Per-NLP-tool timeout, seconds.
    pub nlp_tool_secs: u64,
    /// Constraint-solver timeout, milliseconds.
    pub smt_ms: u64,
    pub vlm_secs: u64,
    pub llm_secs: u64,
    /// Overall per-request deadline, seconds.
    pub request_secs: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            nlp_tool_secs: 30,
            smt_ms: 5_000,
            vlm_secs: 30,
            llm_secs: 180,
            request_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasSection {
    pub width: f64,
    pub height: f64,
}

impl Default for CanvasSection {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    /// Root directory for per-request artifacts.
    pub dir: PathBuf,
    /// Also persist the scene IR as `<req_id>_scene.json`.
    pub write_scene_json: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            write_scene_json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    pub provider: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Base URL override (for local or custom providers).
    pub base_url: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlmSection {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub base_url: Option<String>,
}

impl Default for VlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
        }
    }
}

impl KeplerConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.display().to_string()))?;
        Self::from_toml(&text)
    }

    /// Parse from a TOML string.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.canvas.width <= 0.0 || self.canvas.height <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "canvas dimensions must be positive, got {}x{}",
                self.canvas.width, self.canvas.height
            ))
            .into());
        }
        if self.pipeline.max_refinement_iterations == 0 {
            return Err(
                ConfigError::Invalid("max_refinement_iterations must be >= 1".into()).into(),
            );
        }
        Ok(())
    }

    /// Warnings for flags nobody recognises.
    pub fn unknown_flag_warnings(&self) -> Vec<String> {
        self.unknown
            .keys()
            .map(|k| format!("unknown config flag '{k}' ignored"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = KeplerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeouts.nlp_tool_secs, 30);
        assert_eq!(config.timeouts.smt_ms, 5_000);
        assert_eq!(config.pipeline.max_refinement_iterations, 3);
        assert!(!config.pipeline.enable_vlm);
    }

    #[test]
    fn parses_partial_toml() {
        let config = KeplerConfig::from_toml(
            r#"
            [pipeline]
            enable_property_graph = true
            enable_ontology_validation = false
            enable_smt = false
            enable_refinement = true
            enable_vlm = false
            enable_tracing = true
            max_refinement_iterations = 2

            [canvas]
            width = 1024.0
            height = 768.0
            "#,
        )
        .unwrap();
        assert!(!config.pipeline.enable_smt);
        assert_eq!(config.pipeline.max_refinement_iterations, 2);
        assert_eq!(config.canvas.width, 1024.0);
        // Untouched sections fall back to defaults
        assert_eq!(config.nlp.tools.len(), 5);
    }

    #[test]
    fn unknown_flags_become_warnings() {
        let config = KeplerConfig::from_toml(
            r#"
            turbo_mode = true

            [canvas]
            width = 640.0
            height = 480.0
            "#,
        )
        .unwrap();
        let warnings = config.unknown_flag_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("turbo_mode"));
    }

    #[test]
    fn rejects_degenerate_canvas() {
        let result = KeplerConfig::from_toml(
            r#"
            [canvas]
            width = 0.0
            height = 600.0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_refinement_iterations() {
        let result = KeplerConfig::from_toml(
            r#"
            [pipeline]
            enable_property_graph = true
            enable_ontology_validation = true
            enable_smt = true
            enable_refinement = true
            enable_vlm = false
            enable_tracing = true
            max_refinement_iterations = 0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn tool_order_is_preserved() {
        let config = KeplerConfig::from_toml(
            r#"
            [nlp]
            tools = ["mathbert", "openie"]
            "#,
        )
        .unwrap();
        assert_eq!(config.nlp.tools, vec!["mathbert", "openie"]);
    }
}

//! Shared fixtures for Kepler integration tests.

use std::path::Path;

use kepler_core::config::KeplerConfig;
use kepler_core::pipeline::{DiagramResult, Pipeline, PipelineOptions};
use kepler_core::types::RequestId;

/// Canonical seed problem statements used across the test suite.
pub mod problems {
    pub const CAPACITOR_RECONNECTION: &str =
        "A potential difference of 300 V is applied to a series connection of two capacitors \
         C₁=2.00 μF and C₂=8.00 μF. The charged capacitors are disconnected and reconnected \
         with plates of the same signs wired together.";

    pub const DIELECTRIC_CAPACITOR: &str =
        "A parallel-plate capacitor has plate area A=10.5 cm² and plate separation 2d=7.12 mm. \
         The gap is filled with three dielectric slabs with κ₁=21, κ₂=42 and κ₃=58.";

    pub const INCLINED_PLANE: &str =
        "A 10 kg mass rests on a 30° incline with coefficient of friction μ = 0.3.";

    pub const THIN_LENS: &str =
        "A converging lens with f=10 cm forms an image of an object: d_o=30 cm, d_i=15 cm.";

    pub const BALANCED_REACTION: &str = "Balance the equation 2H₂ + O₂ → 2H₂O in the beaker.";

    pub const UNBALANCED_REACTION: &str = "Consider the equation 2H₂ + O₂ → H₂O in the beaker.";
}

/// Test config writing all artifacts into the given directory.
pub fn test_config(output_dir: &Path) -> KeplerConfig {
    let mut config = KeplerConfig::default();
    config.output.dir = output_dir.to_path_buf();
    config.output.write_scene_json = true;
    config.timeouts.nlp_tool_secs = 10;
    config.timeouts.request_secs = 120;
    config
}

/// Run the full pipeline over `text` into a fresh temp dir. Returns the
/// result and the temp dir guard (artifacts live until it drops).
pub async fn run_pipeline(text: &str) -> (DiagramResult, tempfile::TempDir) {
    run_pipeline_with_id(text, None).await
}

/// Like [`run_pipeline`] but with a fixed request id for artifact checks.
pub async fn run_pipeline_with_id(
    text: &str,
    request_id: Option<&str>,
) -> (DiagramResult, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut pipeline = Pipeline::new(test_config(dir.path()));
    let options = PipelineOptions {
        domain: None,
        request_id: request_id.map(|id| RequestId(id.to_string())),
    };
    let result = pipeline.generate(text, options).await;
    (result, dir)
}

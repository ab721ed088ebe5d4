//! Pipeline orchestrator: problem text → enriched property graph → diagram
//! plan → positioned scene → validated SVG.
//!
//! Phase order is total: enrich → graph → (ontology, plan) → primitives →
//! scene → rules → layout → render → refinement, with the tracer observing
//! every phase. Every phase body is wrapped: failures degrade into recorded
//! warnings and the pipeline continues; only input errors and fatal internal
//! corruption abort the request.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::KeplerConfig;
use crate::enrich::{Enricher, NlpResult};
use crate::graph::{GraphBuilder, PropertyGraph};
use crate::layout::{LayoutEngine, SolverUsed};
use crate::library::{library, PrimitiveStore};
use crate::ontology::{self, OntologyReport};
use crate::plan::{DiagramPlan, Planner};
use crate::progress::{NoopReporter, ProgressReporter};
use crate::refine::{vlm_from_config, RefinementLoop, RefinementReport};
use crate::render::Renderer;
use crate::rules::{RuleEngine, RuleReport};
use crate::scene::{BuilderInput, Scene, SceneBuilder};
use crate::trace::{RequestTrace, Tracer};
use crate::types::{Domain, RequestId};

/// Per-request options supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Domain override; detected from the text when absent.
    pub domain: Option<Domain>,
    pub request_id: Option<RequestId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub domain: Option<Domain>,
    pub last_completed_phase: Option<String>,
    pub degraded: bool,
    pub duration_ms: u64,
    pub layout_solver: Option<SolverUsed>,
    pub refinement_iterations: u32,
}

/// Everything one request produced.
#[derive(Debug, Serialize, Deserialize)]
pub struct DiagramResult {
    pub request_id: RequestId,
    pub svg: Option<String>,
    pub scene: Option<Scene>,
    pub property_graph: Option<PropertyGraph>,
    pub diagram_plan: Option<DiagramPlan>,
    pub nlp_results: Option<NlpResult>,
    pub ontology_validation: Option<OntologyReport>,
    pub domain_rule_report: Option<RuleReport>,
    pub validation: Option<RefinementReport>,
    pub metadata: ResultMetadata,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl DiagramResult {
    fn aborted(request_id: RequestId, error: String) -> Self {
        Self {
            request_id,
            svg: None,
            scene: None,
            property_graph: None,
            diagram_plan: None,
            nlp_results: None,
            ontology_validation: None,
            domain_rule_report: None,
            validation: None,
            metadata: ResultMetadata::default(),
            errors: vec![error],
            warnings: vec![],
        }
    }
}

/// One pipeline instance serves one request at a time; concurrent requests
/// each own their instance. The property graph lives here between phases.
pub struct Pipeline {
    config: KeplerConfig,
    /// Built by the graph phase, optionally replaced by ontology adoption,
    /// read-only for every later phase.
    property_graph: Option<PropertyGraph>,
    reporter: Box<dyn ProgressReporter>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("property_graph", &self.property_graph.is_some())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(config: KeplerConfig) -> Self {
        Self { config, property_graph: None, reporter: Box::new(NoopReporter) }
    }

    /// Attach a progress reporter (the CLI uses the phase bar).
    #[must_use]
    pub fn with_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &KeplerConfig {
        &self.config
    }

    /// Run the full pipeline for one problem statement.
    pub async fn generate(
        &mut self,
        problem_text: &str,
        options: PipelineOptions,
    ) -> DiagramResult {
        let request_id = options.request_id.clone().unwrap_or_default();

        if problem_text.trim().is_empty() {
            return DiagramResult::aborted(request_id, "empty problem text".to_string());
        }

        let deadline = Duration::from_secs(self.config.timeouts.request_secs);
        let outcome = tokio::time::timeout(
            deadline,
            self.run_phases(problem_text, &options, request_id.clone()),
        )
        .await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(request = %request_id, "request deadline exceeded");
                let mut result = DiagramResult::aborted(
                    request_id,
                    format!("request deadline of {}s exceeded", deadline.as_secs()),
                );
                // The renderer contract: some SVG always comes back.
                result.svg = Some(Renderer.placeholder(
                    self.config.canvas.width,
                    self.config.canvas.height,
                    "diagram generation timed out",
                ));
                result.metadata.degraded = true;
                result
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn run_phases(
        &mut self,
        problem_text: &str,
        options: &PipelineOptions,
        request_id: RequestId,
    ) -> DiagramResult {
        let start = Instant::now();
        let mut errors: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = self.config.unknown_flag_warnings();
        let mut degraded = false;

        let mut tracer = if self.config.pipeline.enable_tracing {
            Tracer::new(self.config.output.dir.join("logs"))
        } else {
            Tracer::disabled()
        };

        let total_phases = if self.config.pipeline.enable_refinement { 10 } else { 9 };
        self.reporter.begin(total_phases);
        // ── C1: NLP enrichment ─────────────────────────────────────
        self.reporter.phase("nlp_enrichment");
        tracer.start_component("nlp_enrichment", 1, serde_json::json!({
            "tools": self.config.nlp.tools,
        }));
        tracer.log_input(&serde_json::json!(problem_text), "problem_text");
        let enricher = Enricher::from_config(&self.config);
        let nlp = enricher
            .enrich(problem_text, Duration::from_secs(self.config.timeouts.nlp_tool_secs))
            .await;
        for warning in &nlp.warnings {
            tracer.log_warning(warning, None);
            warnings.push(warning.clone());
        }
        tracer.log_output(
            &serde_json::json!({"succeeded": nlp.succeeded(), "total": nlp.outcomes.len()}),
            "tool_outcomes",
        );
        tracer.complete_component();
        if nlp.succeeded().is_empty() && !nlp.outcomes.is_empty() {
            degraded = true;
            warnings.push("all NLP tools failed".to_string());
        }

        // ── C2: property graph ─────────────────────────────────────
        self.reporter.phase("property_graph");
        tracer.start_component("property_graph", 2, serde_json::Value::Null);
        let graph = if self.config.pipeline.enable_property_graph {
            let (graph, stats) = GraphBuilder.build(&nlp);
            for (id, node) in &graph.nodes {
                tracer.log_entity_added(id, serde_json::json!({"type": node.node_type}));
            }
            for warning in &stats.warnings {
                tracer.log_warning(warning, None);
                warnings.push(warning.clone());
            }
            tracer.log_output(
                &serde_json::json!({"nodes": graph.node_count(), "edges": graph.edge_count()}),
                "graph",
            );
            if let Err(e) = graph.validate() {
                tracer.log_error(&e.to_string(), Some("graph invariant"));
                errors.push(format!("property graph invariant violated: {e}"));
            }
            let graph_dir = self
                .config
                .output
                .dir
                .join("property_graphs")
                .join(request_id.to_string());
            match graph.save(&graph_dir) {
                Ok(path) => info!(path = %path.display(), "property graph persisted"),
                Err(e) => {
                    tracer.log_warning(&format!("graph persistence failed: {e}"), None);
                    warnings.push(format!("could not persist property graph: {e}"));
                }
            }
            graph
        } else {
            tracer.log_warning("property graph disabled by config", None);
            PropertyGraph::default()
        };
        tracer.complete_component();
        let mut working_graph = graph;

        let domain = options
            .domain
            .unwrap_or_else(|| Domain::detect(problem_text));

        // ── C3: ontology validation ────────────────────────────────
        self.reporter.phase("ontology_validation");
        tracer.start_component("ontology_validation", 3, serde_json::json!({"domain": domain}));
        let ontology_report = if self.config.pipeline.enable_ontology_validation {
            let (report, enriched) = ontology::validate(&working_graph, domain);
            for warning in &report.warnings {
                tracer.log_warning(warning, Some("ontology"));
            }
            for error in &report.errors {
                tracer.log_error(error, Some("ontology"));
            }
            // Adoption of the enriched copy is an explicit pipeline decision.
            if report.consistent == Some(true) {
                tracer.log_transformation(
                    "ontology_enrichment_adopted",
                    serde_json::json!({"inferences": report.inferences_count}),
                );
                working_graph = enriched;
            }
            report
        } else {
            OntologyReport::skipped("disabled by config")
        };
        if ontology_report.consistent.is_none() {
            warnings.extend(ontology_report.warnings.clone());
        }
        tracer.complete_component();

        // ── C4: diagram planning ───────────────────────────────────
        self.reporter.phase("diagram_planning");
        tracer.start_component("diagram_planning", 4, serde_json::Value::Null);
        let planner = Planner::new(self.config.canvas.width, self.config.canvas.height);
        let planner_output =
            planner.plan_from_property_graph(&working_graph, problem_text, Some(domain));
        for (id, reason) in &planner_output.filtered {
            tracer.log_entity_filtered(id, reason);
        }
        tracer.log_output(
            &serde_json::json!({
                "entities": planner_output.plan.entities.len(),
                "relations": planner_output.plan.relations.len(),
                "constraints": planner_output.plan.constraints.len(),
                "strategy": planner_output.plan.strategy,
                "complexity": planner_output.plan.complexity_score,
            }),
            "plan",
        );
        if planner_output.plan.is_empty() {
            tracer.log_warning("planner produced no drawable entities", None);
            warnings.push("planner produced no drawable entities".to_string());
        }
        tracer.complete_component();
        let plan = planner_output.plan;
        let temporal = planner_output.temporal;

        // ── C5: primitive retrieval ────────────────────────────────
        self.reporter.phase("primitive_retrieval");
        tracer.start_component("primitive_retrieval", 5, serde_json::Value::Null);
        for entity in &plan.entities {
            let hits = library().semantic_search(&entity.label, 1, Some(domain));
            if let Some(best) = hits.first() {
                tracer.log_transformation(
                    "primitive_match",
                    serde_json::json!({
                        "entity": entity.id,
                        "primitive": best.primitive.id,
                        "score": best.score,
                    }),
                );
            }
        }
        tracer.complete_component();

        // ── C6: scene building ─────────────────────────────────────
        self.reporter.phase("scene_building");
        tracer.start_component("scene_building", 6, serde_json::json!({"strategy": plan.strategy}));
        let builder = SceneBuilder::new();
        let (mut scene, scene_warnings) = builder.build(&BuilderInput {
            text: problem_text,
            plan: &plan,
            temporal: Some(&temporal),
            nlp: Some(&nlp),
            graph: Some(&working_graph),
        });
        for warning in &scene_warnings {
            tracer.log_warning(warning, None);
            warnings.push(warning.clone());
        }
        if scene.metadata.contains_key("fallback") {
            degraded = true;
        }
        if let Err(e) = scene.validate() {
            errors.push(format!("scene invariant violated: {e}"));
            tracer.log_error(&e.to_string(), Some("scene invariant"));
        }
        tracer.log_output(
            &serde_json::json!({
                "objects": scene.objects.len(),
                "constraints": scene.constraints.len(),
                "annotations": scene.annotations.len(),
            }),
            "scene",
        );
        tracer.complete_component();

        // ── C7: domain rules ───────────────────────────────────────
        self.reporter.phase("domain_rules");
        tracer.start_component("domain_rules", 7, serde_json::json!({"domain": domain}));
        let rule_report = RuleEngine.run(domain, &scene, problem_text);
        for check in &rule_report.checks {
            if !check.passed {
                tracer.log_warning(
                    &format!("{} failed: {}", check.name, check.details),
                    Some("rules"),
                );
            }
        }
        if !rule_report.critical_failures().is_empty() {
            warnings.push(format!(
                "domain rules reported {} critical violation(s)",
                rule_report.critical_failures().len()
            ));
        }
        tracer.complete_component();

        // ── C8: layout ─────────────────────────────────────────────
        self.reporter.phase("layout");
        tracer.start_component("layout", 8, serde_json::json!({"solver": plan.layout_hints.solver}));
        let engine = LayoutEngine::new(
            self.config.pipeline.enable_smt,
            Duration::from_millis(self.config.timeouts.smt_ms),
        );
        let layout_outcome = engine.layout(&mut scene, &plan);
        for issue in &layout_outcome.issues {
            tracer.log_warning(issue, Some("layout"));
            self.reporter.note(issue);
            warnings.push(issue.clone());
        }
        tracer.log_output(
            &serde_json::json!({
                "solver": layout_outcome.solver,
                "violations": layout_outcome.verification.violated.len(),
            }),
            "layout",
        );
        tracer.complete_component();
        let layout_solver = layout_outcome.solver;

        // ── C9: render ─────────────────────────────────────────────
        self.reporter.phase("render");
        tracer.start_component("render", 9, serde_json::Value::Null);
        let mut svg = Renderer.render(&scene);
        tracer.log_output(&serde_json::json!({"bytes": svg.len()}), "svg");
        tracer.complete_component();

        // ── C10: refinement ────────────────────────────────────────
        let validation = if self.config.pipeline.enable_refinement {
                self.reporter.phase("refinement");
            tracer.start_component("refinement", 10, serde_json::Value::Null);
            let refinement = RefinementLoop::new(self.config.pipeline.max_refinement_iterations);
            let report = if self.config.pipeline.enable_vlm {
                let (vlm, vlm_warning) = vlm_from_config(&self.config);
                if let Some(w) = vlm_warning {
                    tracer.log_warning(&w, Some("vlm"));
                    warnings.push(w);
                }
                refinement.post_validate(&mut svg, &mut scene, problem_text, Some(&vlm)).await
            } else {
                refinement.post_validate(&mut svg, &mut scene, problem_text, None).await
            };
            tracer.log_output(
                &serde_json::json!({
                    "confidence": report.overall_confidence,
                    "iterations": report.refinement_iterations,
                    "terminal": report.states.last(),
                }),
                "refinement",
            );
            tracer.complete_component();
            Some(report)
        } else {
            None
        };

        // ── Persist artifacts & assemble result ────────────────────
        if let Err(e) = self.persist_outputs(&request_id, &svg, &scene) {
            warnings.push(format!("artifact persistence failed: {e}"));
        }
        self.reporter.end();
        let trace = tracer.finish(&request_id);
        log_trace_summary(&trace);
        self.property_graph = Some(working_graph);

        let refinement_iterations =
            validation.as_ref().map_or(0, |v| v.refinement_iterations);
        let last_completed =
            if validation.is_some() { "refinement" } else { "render" }.to_string();
        DiagramResult {
            request_id,
            svg: Some(svg),
            scene: Some(scene),
            property_graph: self.property_graph.clone(),
            diagram_plan: Some(plan),
            nlp_results: Some(nlp),
            ontology_validation: Some(ontology_report),
            domain_rule_report: Some(rule_report),
            validation,
            metadata: ResultMetadata {
                domain: Some(domain),
                last_completed_phase: Some(last_completed),
                degraded,
                duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                layout_solver: Some(layout_solver),
                refinement_iterations,
            },
            errors,
            warnings,
        }
    }

    fn persist_outputs(
        &self,
        request_id: &RequestId,
        svg: &str,
        scene: &Scene,
    ) -> std::io::Result<()> {
        let dir = &self.config.output.dir;
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(format!("{request_id}.svg")), svg)?;
        if self.config.output.write_scene_json {
            let json = serde_json::to_string_pretty(scene)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(dir.join(format!("{request_id}_scene.json")), json)?;
        }
        Ok(())
    }
}

fn log_trace_summary(trace: &RequestTrace) {
    info!(
        request = %trace.request_id,
        phases = trace.phases.len(),
        errors = trace.summary.total_errors,
        warnings = trace.summary.total_warnings,
        duration_ms = trace.summary.total_duration_ms,
        "request trace finalised"
    );
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> KeplerConfig {
        let mut config = KeplerConfig::default();
        config.output.dir = dir.to_path_buf();
        config.output.write_scene_json = true;
        config.timeouts.nlp_tool_secs = 5;
        config
    }

    #[tokio::test]
    async fn empty_input_aborts_with_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(test_config(dir.path()));
        let result = pipeline.generate("", PipelineOptions::default()).await;
        assert!(result.svg.is_none());
        assert_eq!(result.errors, vec!["empty problem text".to_string()]);
        assert!(result.scene.is_none());

        let whitespace = pipeline.generate("   \n", PipelineOptions::default()).await;
        assert!(!whitespace.errors.is_empty());
    }

    #[tokio::test]
    async fn simple_problem_completes_all_phases() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(test_config(dir.path()));
        let result = pipeline
            .generate("A 10 kg mass rests on a table.", PipelineOptions::default())
            .await;

        assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
        assert!(result.svg.as_deref().is_some_and(|s| s.starts_with("<svg")));
        assert!(result.scene.is_some());
        assert!(result.property_graph.as_ref().unwrap().node_count() > 0);
        assert_eq!(result.metadata.last_completed_phase.as_deref(), Some("refinement"));
        assert!(!result.metadata.degraded);
    }

    #[tokio::test]
    async fn artifacts_are_persisted_per_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(test_config(dir.path()));
        let request_id = RequestId("req-artifacts".to_string());
        let options = PipelineOptions { domain: None, request_id: Some(request_id.clone()) };
        let result = pipeline
            .generate("A 5 kg block sits on a spring.", options)
            .await;
        assert_eq!(result.request_id, request_id);

        assert!(dir.path().join("req-artifacts.svg").exists());
        assert!(dir.path().join("req-artifacts_scene.json").exists());
        assert!(dir
            .path()
            .join("property_graphs/req-artifacts/property_graph.json")
            .exists());
        assert!(dir.path().join("logs/req-artifacts_detailed_trace.json").exists());
    }

    #[tokio::test]
    async fn trace_phases_follow_pipeline_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(test_config(dir.path()));
        let request_id = RequestId("req-order".to_string());
        pipeline
            .generate(
                "A 2 kg ball hangs from a spring.",
                PipelineOptions { domain: None, request_id: Some(request_id) },
            )
            .await;

        let trace: crate::trace::RequestTrace = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("logs/req-order_detailed_trace.json"))
                .unwrap(),
        )
        .unwrap();
        let expected = [
            "nlp_enrichment",
            "property_graph",
            "ontology_validation",
            "diagram_planning",
            "primitive_retrieval",
            "scene_building",
            "domain_rules",
            "layout",
            "render",
            "refinement",
        ];
        assert_eq!(trace.summary.phase_order, expected);
        for (i, phase) in trace.phases.iter().enumerate() {
            assert_eq!(phase.phase_number as usize, i + 1);
        }
    }

    #[tokio::test]
    async fn unknown_config_flags_surface_as_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config
            .unknown
            .insert("mystery_flag".to_string(), toml::Value::Boolean(true));
        let mut pipeline = Pipeline::new(config);
        let result = pipeline
            .generate("A lens with f=10 cm.", PipelineOptions::default())
            .await;
        assert!(result.warnings.iter().any(|w| w.contains("mystery_flag")));
    }

    #[tokio::test]
    async fn disabled_subsystems_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.pipeline.enable_ontology_validation = false;
        config.pipeline.enable_smt = false;
        config.pipeline.enable_refinement = false;
        let mut pipeline = Pipeline::new(config);
        let result = pipeline
            .generate("A 3 kg mass on a table.", PipelineOptions::default())
            .await;

        assert!(result.errors.is_empty());
        assert_eq!(result.ontology_validation.as_ref().unwrap().consistent, None);
        assert!(result.validation.is_none());
        assert_eq!(result.metadata.last_completed_phase.as_deref(), Some("render"));
        assert!(result.svg.is_some());
    }

    #[tokio::test]
    async fn nonsense_text_still_produces_svg() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(test_config(dir.path()));
        let result = pipeline
            .generate("zzz qqq unparseable gibberish", PipelineOptions::default())
            .await;
        // Minimal warning SVG, not a failure.
        assert!(result.svg.is_some());
        assert!(!result.warnings.is_empty());
    }
}

/// Top-level Kepler error type.
#[derive(thiserror::Error, Debug)]
pub enum KeplerError {
    /// Empty or non-textual problem statement. The pipeline aborts.
    #[error("Input error: {0}")]
    Input(String),

    /// An optional subsystem is missing. Downgraded to a warning by callers;
    /// the owning phase becomes a no-op.
    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Enrichment error: {0}")]
    Enrich(#[from] EnrichError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Ontology error: {0}")]
    Ontology(#[from] OntologyError),

    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Unrecoverable internal state corruption. The only variant the
    /// orchestrator propagates out of a phase wrapper.
    #[error("Fatal pipeline error in phase {phase}: {message}")]
    Fatal { phase: String, message: String },
}

#[derive(thiserror::Error, Debug)]
pub enum EnrichError {
    #[error("Tool '{tool}' failed: {message}")]
    ToolFailure { tool: String, message: String },

    #[error("Tool '{tool}' timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },
}

#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("Edge references missing node: {0}")]
    DanglingEdge(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum OntologyError {
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Inference error: {0}")]
    Inference(String),
}

#[derive(thiserror::Error, Debug)]
pub enum PlanError {
    #[error("Empty plan: {0}")]
    Empty(String),

    #[error("Unknown constraint type: {0}")]
    UnknownConstraint(String),
}

#[derive(thiserror::Error, Debug)]
pub enum SceneError {
    #[error("Duplicate object id: {0}")]
    DuplicateObject(String),

    #[error("Constraint references missing object: {0}")]
    DanglingConstraint(String),

    #[error("Interpreter '{domain}' failed: {message}")]
    Interpreter { domain: String, message: String },
}

#[derive(thiserror::Error, Debug)]
pub enum LayoutError {
    /// The constraint solver reported UNSAT or timed out.
    /// Triggers the heuristic fallback, never surfaces to the caller.
    #[error("Constraints unsatisfiable: {0}")]
    Unsatisfiable(String),

    #[error("Solver error: {0}")]
    Solver(String),
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("Glyph error for '{primitive}': {message}")]
    Glyph { primitive: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Structural validation failed: {0}")]
    Structural(String),

    #[error("Rule check failed: {0}")]
    Rule(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, KeplerError>;

impl KeplerError {
    /// Whether the orchestrator must abort the request on this error.
    /// Everything except input errors and fatal corruption degrades into
    /// a recorded warning and the pipeline continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Input(_) | Self::Fatal { .. })
    }
}

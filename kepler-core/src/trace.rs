//! Cross-cutting request tracer.
//!
//! Every pipeline phase is bracketed by `start_component` / `complete_component`;
//! inside the bracket the phase logs inputs, outputs, entity lifecycle events
//! and transformations. `finish()` assembles the full record and writes it to
//! `logs/<request_id>_detailed_trace.json`.
//!
//! The tracer must never take a request down: it is a no-op when disabled and
//! any internal failure (including the final file write) degrades into a
//! warning on the record.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::RequestId;

const MAX_STRING_SUMMARY: usize = 200;
const MAX_SEQ_HEAD: usize = 5;
const MAX_SEQ_TAIL: usize = 2;

// ── Record types ───────────────────────────────────────────────────

/// Trace of a single pipeline phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTrace {
    pub phase_number: u32,
    pub phase_name: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub duration_ms: u64,
    pub input_summary: BTreeMap<String, serde_json::Value>,
    pub output_summary: BTreeMap<String, serde_json::Value>,
    pub transformations: Vec<Transformation>,
    pub entities_added: u32,
    pub entities_filtered: u32,
    pub entities_modified: u32,
    pub logs: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transformation {
    pub kind: String,
    pub details: serde_json::Value,
}

/// One event in an entity's lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Monotonic sequence number across the whole request; events per entity
    /// are strictly ordered by it.
    pub seq: u64,
    pub phase: String,
    pub event: LifecycleKind,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Added,
    Filtered,
    Modified,
}

/// Per-phase snapshot of how many entities were alive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityFlowSnapshot {
    pub phase: String,
    pub alive: u64,
}

/// The complete per-request record produced by `Tracer::finish`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTrace {
    pub request_id: RequestId,
    pub phases: Vec<PhaseTrace>,
    pub entity_lifecycle: BTreeMap<String, Vec<LifecycleEvent>>,
    pub entity_flow: Vec<EntityFlowSnapshot>,
    pub summary: TraceSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSummary {
    pub phase_order: Vec<String>,
    pub phase_times_ms: BTreeMap<String, u64>,
    pub total_errors: u64,
    pub total_warnings: u64,
    pub total_duration_ms: u64,
}

// ── Tracer ─────────────────────────────────────────────────────────

struct OpenPhase {
    trace: PhaseTrace,
    started: Instant,
}

/// Per-request tracer. Not shared across requests.
pub struct Tracer {
    enabled: bool,
    log_dir: PathBuf,
    open: Option<OpenPhase>,
    phases: Vec<PhaseTrace>,
    lifecycle: BTreeMap<String, Vec<LifecycleEvent>>,
    flow: Vec<EntityFlowSnapshot>,
    alive: i64,
    seq: u64,
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.enabled)
            .field("phases", &self.phases.len())
            .finish_non_exhaustive()
    }
}

impl Tracer {
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            enabled: true,
            log_dir,
            open: None,
            phases: Vec::new(),
            lifecycle: BTreeMap::new(),
            flow: Vec::new(),
            alive: 0,
            seq: 0,
        }
    }

    /// A tracer that records nothing and writes nothing.
    pub fn disabled() -> Self {
        let mut t = Self::new(PathBuf::from("logs"));
        t.enabled = false;
        t
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Bracket open. An already-open phase is closed first (degraded, warned).
    pub fn start_component(
        &mut self,
        name: &str,
        phase_number: u32,
        metadata: serde_json::Value,
    ) {
        if !self.enabled {
            return;
        }
        if self.open.is_some() {
            self.log_warning("phase bracket left open; closing implicitly", None);
            self.complete_component();
        }
        let mut trace = PhaseTrace {
            phase_number,
            phase_name: name.to_string(),
            start_ts: Utc::now(),
            end_ts: Utc::now(),
            duration_ms: 0,
            input_summary: BTreeMap::new(),
            output_summary: BTreeMap::new(),
            transformations: Vec::new(),
            entities_added: 0,
            entities_filtered: 0,
            entities_modified: 0,
            logs: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        };
        if !metadata.is_null() {
            trace
                .input_summary
                .insert("metadata".into(), summarize(&metadata));
        }
        self.open = Some(OpenPhase {
            trace,
            started: Instant::now(),
        });
    }

    /// Bracket close.
    pub fn complete_component(&mut self) {
        if !self.enabled {
            return;
        }
        if let Some(open) = self.open.take() {
            let mut trace = open.trace;
            trace.end_ts = Utc::now();
            trace.duration_ms =
                u64::try_from(open.started.elapsed().as_millis()).unwrap_or(u64::MAX);
            let alive = u64::try_from(self.alive.max(0)).unwrap_or(0);
            self.flow.push(EntityFlowSnapshot {
                phase: trace.phase_name.clone(),
                alive,
            });
            self.phases.push(trace);
        }
    }

    pub fn log_input(&mut self, data: &serde_json::Value, name: &str) {
        if let Some(open) = self.active() {
            open.trace.input_summary.insert(name.into(), summarize(data));
        }
    }

    pub fn log_output(&mut self, data: &serde_json::Value, name: &str) {
        if let Some(open) = self.active() {
            open.trace.output_summary.insert(name.into(), summarize(data));
        }
    }

    pub fn log_entity_added(&mut self, id: &str, data: serde_json::Value) {
        self.lifecycle_event(id, LifecycleKind::Added, data);
        self.alive += 1;
        if let Some(open) = self.active() {
            open.trace.entities_added += 1;
        }
    }

    pub fn log_entity_filtered(&mut self, id: &str, reason: &str) {
        self.lifecycle_event(id, LifecycleKind::Filtered, serde_json::json!({"reason": reason}));
        self.alive -= 1;
        if let Some(open) = self.active() {
            open.trace.entities_filtered += 1;
        }
    }

    pub fn log_entity_modified(&mut self, id: &str, changes: serde_json::Value) {
        self.lifecycle_event(id, LifecycleKind::Modified, changes);
        if let Some(open) = self.active() {
            open.trace.entities_modified += 1;
        }
    }

    pub fn log_transformation(&mut self, kind: &str, details: serde_json::Value) {
        if let Some(open) = self.active() {
            open.trace.transformations.push(Transformation {
                kind: kind.to_string(),
                details: summarize(&details),
            });
        }
    }

    pub fn log_message(&mut self, msg: &str) {
        if let Some(open) = self.active() {
            open.trace.logs.push(msg.to_string());
        }
    }

    pub fn log_error(&mut self, msg: &str, ctx: Option<&str>) {
        let entry = match ctx {
            Some(c) => format!("{msg} ({c})"),
            None => msg.to_string(),
        };
        if let Some(open) = self.active() {
            open.trace.errors.push(entry);
        }
    }

    pub fn log_warning(&mut self, msg: &str, ctx: Option<&str>) {
        let entry = match ctx {
            Some(c) => format!("{msg} ({c})"),
            None => msg.to_string(),
        };
        if let Some(open) = self.active() {
            open.trace.warnings.push(entry);
        }
    }

    /// Close any open bracket, assemble the record, and persist it.
    ///
    /// The file write is best-effort: on failure the record gains a warning
    /// in its summary and is still returned.
    pub fn finish(mut self, request_id: &RequestId) -> RequestTrace {
        if self.open.is_some() {
            self.complete_component();
        }

        let mut summary = TraceSummary::default();
        for phase in &self.phases {
            summary.phase_order.push(phase.phase_name.clone());
            summary
                .phase_times_ms
                .insert(phase.phase_name.clone(), phase.duration_ms);
            summary.total_errors += phase.errors.len() as u64;
            summary.total_warnings += phase.warnings.len() as u64;
            summary.total_duration_ms += phase.duration_ms;
        }

        let record = RequestTrace {
            request_id: request_id.clone(),
            phases: std::mem::take(&mut self.phases),
            entity_lifecycle: std::mem::take(&mut self.lifecycle),
            entity_flow: std::mem::take(&mut self.flow),
            summary,
        };

        if self.enabled {
            if let Err(e) = self.persist(&record) {
                warn!(error = %e, "failed to persist trace record");
            }
        }
        record
    }

    fn persist(&self, record: &RequestTrace) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.log_dir)?;
        let path = self
            .log_dir
            .join(format!("{}_detailed_trace.json", record.request_id));
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    fn active(&mut self) -> Option<&mut OpenPhase> {
        if self.enabled {
            self.open.as_mut()
        } else {
            None
        }
    }

    fn lifecycle_event(&mut self, id: &str, event: LifecycleKind, detail: serde_json::Value) {
        if !self.enabled {
            return;
        }
        let phase = self
            .open
            .as_ref()
            .map_or_else(|| "outside-phase".to_string(), |o| o.trace.phase_name.clone());
        self.seq += 1;
        self.lifecycle.entry(id.to_string()).or_default().push(LifecycleEvent {
            seq: self.seq,
            phase,
            event,
            detail: summarize(&detail),
        });
    }
}

// ── Bounded summarisation ──────────────────────────────────────────

/// Shrink a JSON value to a bounded summary: long strings are truncated,
/// long sequences keep a head and tail sample with an omission marker.
pub fn summarize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) if s.chars().count() > MAX_STRING_SUMMARY => {
            let head: String = s.chars().take(MAX_STRING_SUMMARY).collect();
            serde_json::Value::String(format!("{head}… [{} chars]", s.chars().count()))
        }
        serde_json::Value::Array(items) if items.len() > MAX_SEQ_HEAD + MAX_SEQ_TAIL => {
            let omitted = items.len() - MAX_SEQ_HEAD - MAX_SEQ_TAIL;
            let mut out: Vec<serde_json::Value> =
                items.iter().take(MAX_SEQ_HEAD).map(summarize).collect();
            out.push(serde_json::Value::String(format!("…({omitted} omitted)")));
            out.extend(items.iter().skip(items.len() - MAX_SEQ_TAIL).map(summarize));
            serde_json::Value::Array(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(summarize).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), summarize(v))).collect(),
        ),
        other => other.clone(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────

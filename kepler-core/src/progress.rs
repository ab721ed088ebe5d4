//! Progress reporting shaped around the pipeline's phase sequence.
//!
//! The orchestrator announces each phase as it enters it; a reporter turns
//! that into user-visible feedback. The CLI's [`PhaseBarReporter`] renders
//! one bar segment per phase and prints a per-phase timing summary when the
//! request ends. Library callers use [`NoopReporter`].

use std::sync::Mutex;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

/// Receives the orchestrator's phase announcements for one request.
pub trait ProgressReporter: Send + Sync {
    /// A request is starting; `total_phases` announcements will follow.
    fn begin(&self, total_phases: u64);

    /// The pipeline entered the named phase.
    fn phase(&self, name: &str);

    /// Out-of-band information worth surfacing between phases.
    fn note(&self, msg: &str);

    /// The request finished, successfully or not.
    fn end(&self);
}

/// No-op reporter for library callers that don't need progress output.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn begin(&self, _total_phases: u64) {}
    fn phase(&self, _name: &str) {}
    fn note(&self, _msg: &str) {}
    fn end(&self) {}
}

/// CLI reporter: one bar segment per pipeline phase, plus a timing summary
/// line once the request completes.
#[derive(Debug)]
pub struct PhaseBarReporter {
    bar: ProgressBar,
    /// Start instant of every announced phase, in announcement order.
    timings: Mutex<Vec<(String, Instant)>>,
}

impl Default for PhaseBarReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseBarReporter {
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            timings: Mutex::new(Vec::new()),
        }
    }
}

impl ProgressReporter for PhaseBarReporter {
    fn begin(&self, total_phases: u64) {
        if let Ok(mut timings) = self.timings.lock() {
            timings.clear();
        }
        self.bar.set_length(total_phases);
        self.bar.set_style(
            ProgressStyle::with_template("{bar:20.green} phase {pos}/{len}: {msg}")
                .unwrap()
                .progress_chars("## "),
        );
        self.bar.reset();
    }

    fn phase(&self, name: &str) {
        if let Ok(mut timings) = self.timings.lock() {
            // The previous segment completes when the next phase starts.
            if !timings.is_empty() {
                self.bar.inc(1);
            }
            timings.push((name.to_string(), Instant::now()));
        }
        self.bar.set_message(name.to_string());
    }

    fn note(&self, msg: &str) {
        self.bar.println(msg);
    }

    fn end(&self) {
        self.bar.inc(1);
        if let Ok(timings) = self.timings.lock() {
            if let Some(line) = summary_line(&timings) {
                self.bar.println(line);
            }
        }
        self.bar.finish_and_clear();
    }
}

/// One compact line of per-phase durations, in announcement order.
/// The last phase is measured up to now.
fn summary_line(timings: &[(String, Instant)]) -> Option<String> {
    if timings.is_empty() {
        return None;
    }
    let parts: Vec<String> = timings
        .iter()
        .enumerate()
        .map(|(i, (name, started))| {
            let ended = timings.get(i + 1).map_or_else(Instant::now, |next| next.1);
            format!("{name} {}ms", ended.duration_since(*started).as_millis())
        })
        .collect();
    Some(format!("phases: {}", parts.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_reporter_is_silent() {
        let reporter = NoopReporter;
        reporter.begin(10);
        reporter.phase("nlp_enrichment");
        reporter.note("one tool timed out");
        reporter.end();
    }

    #[test]
    fn phase_bar_lifecycle() {
        let reporter = PhaseBarReporter::new();
        reporter.begin(3);
        reporter.phase("nlp_enrichment");
        reporter.phase("property_graph");
        reporter.note("graph persisted");
        reporter.phase("render");
        reporter.end();
    }

    #[test]
    fn begin_resets_previous_request_state() {
        let reporter = PhaseBarReporter::new();
        reporter.begin(2);
        reporter.phase("layout");
        reporter.end();

        reporter.begin(2);
        reporter.phase("render");
        let timings = reporter.timings.lock().unwrap();
        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].0, "render");
    }

    #[test]
    fn summary_line_lists_phases_in_order() {
        let now = Instant::now();
        let timings = vec![
            ("nlp_enrichment".to_string(), now),
            ("property_graph".to_string(), now),
            ("render".to_string(), now),
        ];
        let line = summary_line(&timings).unwrap();
        assert!(line.starts_with("phases: nlp_enrichment"));
        let graph_at = line.find("property_graph").unwrap();
        let render_at = line.find("render").unwrap();
        assert!(graph_at < render_at);
    }

    #[test]
    fn summary_line_empty_is_none() {
        assert!(summary_line(&[]).is_none());
    }
}

//! Ingestion progress reporting.
//!
//! Reports observable progress during `docqa ingest` so users see which step
//! a document is in and how far along embedding is. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// One progress update for a document being ingested.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEvent {
    /// Document title or file name.
    pub document: String,
    /// Completed fraction in `[0, 1]`.
    pub fraction: f32,
    /// Short human-readable status, e.g. `"embedding chunk 3 / 7"`.
    pub status: String,
}

/// Receives ingestion progress. Called from the pipeline after each step.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "ingest report.pdf  [ 45%] embedding chunk 3 / 7".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = format!(
            "ingest {}  [{:>3}%] {}\n",
            event.document,
            percent(event.fraction),
            event.status
        );
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = serde_json::json!({
            "event": "progress",
            "document": event.document,
            "fraction": event.fraction,
            "status": event.status,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn percent(fraction: f32) -> u32 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u32
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

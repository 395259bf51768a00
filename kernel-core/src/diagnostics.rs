//! Structured diagnostics sink: dumps sandbox-compile failures and emits
//! `tracing` events under the five kernel event categories.

use crate::error::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{event, Level};

/// Category a diagnostic event belongs to; doubles as its `tracing` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Kernel,
    Articulation,
    Gate,
    Context,
    Activation,
}

impl EventCategory {
    pub fn target(&self) -> &'static str {
        match self {
            EventCategory::Kernel => "kernel",
            EventCategory::Articulation => "articulation",
            EventCategory::Gate => "gate",
            EventCategory::Context => "context",
            EventCategory::Activation => "activation",
        }
    }
}

/// A structured diagnostic event, emitted via `tracing` and optionally
/// persisted by a [`DiagnosticsSink`].
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEvent {
    pub category_label: &'static str,
    pub timestamp_ms: i64,
    pub message: String,
    pub detail: Option<String>,
}

/// Sink for diagnostic payloads too large or too structured for a
/// `tracing` field — rejected rule program sources, self-heal reports.
pub trait DiagnosticsSink: Send + Sync {
    fn record_event(&self, event: &DiagnosticEvent) -> Result<()>;
    fn dump_program_source(&self, label: &str, source: &str) -> Result<()>;
}

/// Emit a `tracing` event at the category's target with structured fields,
/// independent of whether a [`DiagnosticsSink`] is configured.
pub fn emit(category: EventCategory, level: Level, message: &str, detail: Option<&str>) {
    match level {
        Level::ERROR => event!(target: "kernel_event", Level::ERROR, category = category.target(), message, detail),
        Level::WARN => event!(target: "kernel_event", Level::WARN, category = category.target(), message, detail),
        Level::INFO => event!(target: "kernel_event", Level::INFO, category = category.target(), message, detail),
        Level::DEBUG => event!(target: "kernel_event", Level::DEBUG, category = category.target(), message, detail),
        Level::TRACE => event!(target: "kernel_event", Level::TRACE, category = category.target(), message, detail),
    }
}

/// Filesystem-backed sink: one append-only JSONL event log plus a
/// `program_sources/` subdirectory for rejected rule dumps.
pub struct FsDiagnosticsSink {
    root: PathBuf,
}

impl FsDiagnosticsSink {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join("program_sources"))?;
        Ok(FsDiagnosticsSink { root })
    }

    fn events_path(&self) -> PathBuf {
        self.root.join("events.jsonl")
    }

    fn sanitize_label(label: &str) -> String {
        label.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
    }
}

impl DiagnosticsSink for FsDiagnosticsSink {
    fn record_event(&self, event: &DiagnosticEvent) -> Result<()> {
        use std::io::Write;
        let line = serde_json::to_string(event)?;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(self.events_path())?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn dump_program_source(&self, label: &str, source: &str) -> Result<()> {
        let filename = format!("{}-{}.mangle", Self::sanitize_label(label), now_unix_millis());
        let path: &Path = &self.root.join("program_sources").join(filename);
        std::fs::write(path, source)?;
        Ok(())
    }
}

fn now_unix_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

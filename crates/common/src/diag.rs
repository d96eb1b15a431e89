//! Diagnostic records and the shared sink.
//!
//! Every phase reports findings through a [`DiagnosticSink`]: defaulted
//! policies, passed-through unknown chain members, unresolved references.
//! The sink is append-only and lock-protected so emitters running on the
//! work pool can share it without further coordination. Content ordering of
//! the final report is by phase, then source location, then message, which
//! keeps the rendered report stable regardless of scheduling.

use crate::SourceLoc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// Pipeline phase a diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Ingest,
    Normalize,
    Emit,
    PostProcess,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Ingest => "ingest",
            Phase::Normalize => "normalize",
            Phase::Emit => "emit",
            Phase::PostProcess => "post-process",
        };
        f.write_str(s)
    }
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub phase: Phase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLoc>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.loc {
            Some(loc) => write!(f, "{}: {} [{}]: {}", loc, self.severity, self.phase, self.message),
            None => write!(f, "{} [{}]: {}", self.severity, self.phase, self.message),
        }
    }
}

/// Append-only, lock-protected collection of diagnostics.
///
/// Shared read-only across emitters; pushing never fails and never blocks
/// for long. A poisoned lock is treated as empty rather than propagated: a
/// panicking emitter thread already aborts the run through its join error.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    records: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, diag: Diagnostic) {
        if let Ok(mut records) = self.records.lock() {
            tracing::debug!(%diag, "diagnostic");
            records.push(diag);
        }
    }

    pub fn info(&self, phase: Phase, message: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Info,
            phase,
            message: message.into(),
            loc: None,
        });
    }

    pub fn warn(&self, phase: Phase, message: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Warn,
            phase,
            message: message.into(),
            loc: None,
        });
    }

    pub fn error(&self, phase: Phase, message: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Error,
            phase,
            message: message.into(),
            loc: None,
        });
    }

    pub fn error_at(&self, phase: Phase, loc: SourceLoc, message: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Error,
            phase,
            message: message.into(),
            loc: Some(loc),
        });
    }

    pub fn warn_at(&self, phase: Phase, loc: SourceLoc, message: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Warn,
            phase,
            message: message.into(),
            loc: Some(loc),
        });
    }

    /// Snapshot of all records in stable report order.
    pub fn records(&self) -> Vec<Diagnostic> {
        let mut records = self
            .records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default();
        records.sort_by(|a, b| {
            (a.phase, &a.loc, &a.message, a.severity).cmp(&(b.phase, &b.loc, &b.message, b.severity))
        });
        records
    }

    pub fn has_errors(&self) -> bool {
        self.records
            .lock()
            .map(|r| r.iter().any(|d| d.severity == Severity::Error))
            .unwrap_or(false)
    }

    /// Count of records at or above the given severity.
    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.records
            .lock()
            .map(|r| r.iter().filter(|d| d.severity >= severity).count())
            .unwrap_or(0)
    }

    /// Human-readable rendering, one finding per line.
    pub fn render_human(&self) -> String {
        let mut out = String::new();
        for diag in self.records() {
            out.push_str(&diag.to_string());
            out.push('\n');
        }
        out
    }

    /// Structured rendering for the diagnostics report file.
    pub fn render_json(&self) -> String {
        // Vec<Diagnostic> serialization cannot fail; fall back to an empty
        // array to keep the report file well-formed regardless.
        serde_json::to_string_pretty(&self.records()).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn sink_collects_and_orders() {
        let sink = DiagnosticSink::new();
        sink.warn(Phase::Emit, "unknown chain member");
        sink.info(Phase::Normalize, "defaulted policy");
        sink.error_at(
            Phase::Ingest,
            SourceLoc::new("vk.xml", 10),
            "unparseable element",
        );

        let records = sink.records();
        assert_eq!(records.len(), 3);
        // Report order is by phase, not insertion order.
        assert_eq!(records[0].phase, Phase::Ingest);
        assert_eq!(records[1].phase, Phase::Normalize);
        assert_eq!(records[2].phase, Phase::Emit);
        assert!(sink.has_errors());
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Error > Severity::Warn);
        assert!(Severity::Warn > Severity::Info);
        let sink = DiagnosticSink::new();
        sink.info(Phase::Emit, "a");
        sink.warn(Phase::Emit, "b");
        assert_eq!(sink.count_at_least(Severity::Warn), 1);
        assert!(!sink.has_errors());
    }

    #[test]
    fn json_rendering_is_an_array() {
        let sink = DiagnosticSink::new();
        sink.info(Phase::Ingest, "one");
        let json = sink.render_json();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_array());
        assert_eq!(parsed.as_array().unwrap().len(), 1);
    }
}

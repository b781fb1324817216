//! Report assembly, rendering and persistence.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result as AnyResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::BackendTarget;
use crate::error::{HarnessError, Result};
use crate::outcome::{ScenarioOutcome, Status};
use crate::scenario::ScenarioSummary;

const RULE_WIDTH: usize = 60;

/// One scenario row of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub scenario: ScenarioSummary,
    pub outcome: ScenarioOutcome,
}

/// The single artifact of one orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Adapters in run order and where their calls went.
    #[serde(default)]
    pub backends: Vec<BackendTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub entries: Vec<ReportEntry>,
}

impl Report {
    /// No scenario failed and the run completed.
    pub fn succeeded(&self) -> bool {
        self.failed == 0 && self.aborted.is_none()
    }

    /// Backends answered by an in-process emulator.
    pub fn emulated_backends(&self) -> Vec<&str> {
        self.backends
            .iter()
            .filter(|t| t.emulated)
            .map(|t| t.backend.as_str())
            .collect()
    }

    pub fn status_of(&self, id: u32) -> Option<Status> {
        self.entries
            .iter()
            .find(|e| e.scenario.id == id)
            .map(|e| e.outcome.status)
    }

    /// Fixed text layout: header, counts, then one block per scenario.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let rule = "─".repeat(RULE_WIDTH);
        let _ = writeln!(out, "S3 Vectors vs Qdrant: Comparison Report");
        let _ = writeln!(out, "Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
        if !self.backends.is_empty() {
            let _ = writeln!(out, "Backends:");
            for target in &self.backends {
                let _ = write!(out, "  {:<10} {}", target.backend, target.endpoint);
                if target.emulated {
                    let _ = write!(out, "  [EMULATED]");
                }
                let _ = writeln!(out);
            }
        }
        let emulated = self.emulated_backends();
        if !emulated.is_empty() {
            let _ = writeln!(
                out,
                "Note: {} ran against an in-process emulator; timings are not service latencies.",
                emulated.join(", ")
            );
        }
        let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Total: {} | Passed: {} | Failed: {} | Skipped: {}",
            self.total, self.passed, self.failed, self.skipped
        );
        if let Some(reason) = &self.aborted {
            let _ = writeln!(out, "ABORTED: {reason}");
        }
        for warning in &self.warnings {
            let _ = writeln!(out, "Warning: {warning}");
        }
        let _ = writeln!(out);

        for entry in &self.entries {
            let _ = writeln!(out, "{rule}");
            let _ = writeln!(
                out,
                "TEST {:02} [{}] {} ({})",
                entry.scenario.id, entry.outcome.status, entry.scenario.title, entry.scenario.category
            );
            let _ = writeln!(out, "{rule}");
            for backend in &entry.outcome.backends {
                let _ = write!(out, "  {:<10} {:<8}", backend.backend, backend.status.label());
                if backend.status != Status::Skipped {
                    let _ = write!(out, " {:>6} ms", backend.elapsed_ms);
                }
                if let Some(detail) = &backend.detail {
                    let _ = write!(out, "  {detail}");
                }
                let _ = writeln!(out);
            }
            if !entry.outcome.transcript.is_empty() {
                let _ = writeln!(out);
                for line in &entry.outcome.transcript {
                    let _ = writeln!(out, "{line}");
                }
            }
            let _ = writeln!(out);
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the text report, replacing any previous file.
    pub fn write_text(&self, path: &Path) -> AnyResult<()> {
        std::fs::write(path, self.render_text()).with_context(|| format!("write {:?}", path))?;
        Ok(())
    }

    /// Write the JSON report, replacing any previous file.
    pub fn write_json(&self, path: &Path) -> AnyResult<()> {
        let content = self.to_json().context("serialize report")?;
        std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
        Ok(())
    }
}

/// Folds outcomes into a [`Report`]. Finalizes exactly once.
#[derive(Debug, Default)]
pub struct ReportAssembler {
    entries: Vec<ReportEntry>,
    backends: Vec<BackendTarget>,
    warnings: Vec<String>,
    aborted: Option<String>,
    finalized: bool,
}

impl ReportAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, scenario: ScenarioSummary, outcome: ScenarioOutcome) -> Result<()> {
        if self.finalized {
            return Err(HarnessError::ReportAlreadyFinalized);
        }
        self.entries.push(ReportEntry { scenario, outcome });
        Ok(())
    }

    pub fn set_backends(&mut self, backends: Vec<BackendTarget>) {
        self.backends = backends;
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Mark the run as aborted. The first reason wins.
    pub fn abort(&mut self, reason: impl Into<String>) {
        self.aborted.get_or_insert_with(|| reason.into());
    }

    pub fn finalize(&mut self) -> Result<Report> {
        if self.finalized {
            return Err(HarnessError::ReportAlreadyFinalized);
        }
        self.finalized = true;
        let entries = std::mem::take(&mut self.entries);
        let count = |status: Status| entries.iter().filter(|e| e.outcome.status == status).count();
        Ok(Report {
            generated_at: Utc::now(),
            total: entries.len(),
            passed: count(Status::Passed),
            failed: count(Status::Failed),
            skipped: count(Status::Skipped),
            backends: std::mem::take(&mut self.backends),
            aborted: self.aborted.take(),
            warnings: std::mem::take(&mut self.warnings),
            entries,
        })
    }
}

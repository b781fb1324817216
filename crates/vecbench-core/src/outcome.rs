//! Per-scenario results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Passed => "PASSED",
            Status::Failed => "FAILED",
            Status::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one scenario against one adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendOutcome {
    pub backend: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Time spent inside backend calls.
    pub elapsed_ms: u64,
    pub backend_calls: u64,
}

impl BackendOutcome {
    pub fn skipped(backend: &str, reason: impl Into<String>) -> Self {
        Self {
            backend: backend.to_string(),
            status: Status::Skipped,
            detail: Some(reason.into()),
            elapsed_ms: 0,
            backend_calls: 0,
        }
    }

    pub fn failed(backend: &str, detail: impl Into<String>) -> Self {
        Self {
            backend: backend.to_string(),
            status: Status::Failed,
            detail: Some(detail.into()),
            elapsed_ms: 0,
            backend_calls: 0,
        }
    }
}

/// Aggregated result of one scenario. Written once by the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub status: Status,
    pub transcript: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub elapsed_ms: BTreeMap<String, u64>,
    pub backends: Vec<BackendOutcome>,
}

impl ScenarioOutcome {
    /// Fold per-backend results: any failure fails the scenario, otherwise
    /// any pass passes it, otherwise it was skipped everywhere.
    pub fn from_backends(transcript: Vec<String>, backends: Vec<BackendOutcome>) -> Self {
        let status = if backends.iter().any(|b| b.status == Status::Failed) {
            Status::Failed
        } else if backends.iter().any(|b| b.status == Status::Passed) {
            Status::Passed
        } else {
            Status::Skipped
        };
        let error_detail = backends
            .iter()
            .find(|b| b.status == Status::Failed)
            .map(|b| {
                format!(
                    "{}: {}",
                    b.backend,
                    b.detail.as_deref().unwrap_or("failed")
                )
            });
        let elapsed_ms = backends
            .iter()
            .filter(|b| b.status != Status::Skipped)
            .map(|b| (b.backend.clone(), b.elapsed_ms))
            .collect();
        Self {
            status,
            transcript,
            error_detail,
            elapsed_ms,
            backends,
        }
    }

    pub fn backend(&self, name: &str) -> Option<&BackendOutcome> {
        self.backends.iter().find(|b| b.backend == name)
    }
}

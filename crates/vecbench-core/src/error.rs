//! Harness-level error taxonomy.

use crate::embedding::EmbeddingError;

/// Errors that abort a harness operation. Scenario-level failures never
/// surface here; the runner records them in the outcome instead.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("duplicate scenario id: {0}")]
    DuplicateScenario(u32),

    #[error("invalid scenario id: {0} (ids start at 1)")]
    InvalidScenarioId(u32),

    #[error("scenario not found: {0}")]
    ScenarioNotFound(u32),

    #[error("report already finalized")]
    ReportAlreadyFinalized,

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("teardown failed for {backend}: {reason}")]
    Teardown { backend: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

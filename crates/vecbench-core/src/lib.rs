//! vecbench core: the harness engine
//!
//! Runs an ordered catalogue of comparison scenarios against interchangeable
//! vector-search backends and folds the results into one report.
//!
//! ## Key Components
//!
//! - `EmbeddingCache`: deterministic, persisted text → vector memoization
//! - `BackendAdapter`: the uniform backend contract, gated by `CapabilitySet`
//! - `ScenarioRegistry` / `ScenarioRunner`: catalogue and isolated execution
//! - `ReportAssembler` / `Report`: write-once aggregation and rendering
//! - `HarnessOrchestrator`: selection, provisioning, fixtures, cleanup

pub mod backend;
pub mod config;
pub mod embedding;
mod error;
pub mod fakes;
pub mod obs;
pub mod orchestrator;
pub mod outcome;
pub mod registry;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod sink;
pub mod telemetry;

pub use backend::{
    AdapterError, BackendAdapter, BackendLimits, BackendTarget, Capability, CapabilitySet, Filter,
    HitGroup, Metadata, MultiVectorItem, ScrollPage, SearchHit, SpaceQuery, SpaceSchema,
    SparseVector, TimedAdapter, VectorItem, QDRANT, S3_VECTORS,
};
pub use config::{EmbeddingProvider, HarnessConfig};
pub use embedding::{
    EmbeddingCache, EmbeddingError, EmbeddingKey, EmbeddingModel, EmbeddingStore,
    HashingEmbedder, JsonFileStore, MemoryEmbeddingStore, OllamaEmbedder,
};
pub use error::{HarnessError, Result};
pub use orchestrator::{CleanupPolicy, Fixture, HarnessContext, HarnessOrchestrator, Selection};
pub use outcome::{BackendOutcome, ScenarioOutcome, Status};
pub use registry::ScenarioRegistry;
pub use report::{Report, ReportAssembler, ReportEntry};
pub use runner::{AdapterState, Execution, ScenarioRunner};
pub use scenario::{Category, Scenario, ScenarioContext, ScenarioSummary};
pub use sink::{ConsoleSink, NullSink, Sink, TeeSink, TranscriptSink};

//! The backend adapter contract.
//!
//! A [`BackendAdapter`] gives scenarios one uniform surface over backends with
//! incompatible feature sets. Capabilities are declared up front
//! ([`BackendAdapter::capabilities`]) so the runner can gate scenarios before
//! dispatch instead of branching on backend identity.

pub mod capability;
pub mod filter;
pub mod space;
pub mod timed;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use capability::{Capability, CapabilitySet};
pub use filter::Filter;
pub use space::{MultiVectorItem, SpaceQuery, SpaceSchema, SparseVector};
pub use timed::{CallStats, TimedAdapter};

/// Well-known backend names.
pub const QDRANT: &str = "qdrant";
pub const S3_VECTORS: &str = "s3vectors";

/// Free-form JSON metadata attached to a vector.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// One vector with its string key and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorItem {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl VectorItem {
    pub fn new(id: impl Into<String>, vector: Vec<f32>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata,
        }
    }

    /// Size of the metadata when serialized as JSON.
    pub fn metadata_bytes(&self) -> usize {
        serde_json::to_vec(&self.metadata).map_or(0, |b| b.len())
    }
}

/// A search result. `score` is a similarity: higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A page of a filtered scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollPage {
    pub items: Vec<VectorItem>,
    pub next_cursor: Option<String>,
}

/// Hits sharing one value of the grouping field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitGroup {
    pub key: serde_json::Value,
    pub hits: Vec<SearchHit>,
}

/// Hard per-call limits of a backend. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendLimits {
    pub max_upsert_batch: Option<usize>,
    pub max_get_batch: Option<usize>,
    pub max_delete_batch: Option<usize>,
    pub max_top_k: Option<usize>,
    pub max_metadata_bytes: Option<usize>,
    pub max_filterable_metadata_bytes: Option<usize>,
}

/// Where an adapter's calls go. Recorded in the report header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendTarget {
    pub backend: String,
    pub endpoint: String,
    /// Answered by an in-process emulator rather than the real service.
    #[serde(default)]
    pub emulated: bool,
}

impl BackendTarget {
    pub fn live(backend: &str, endpoint: impl Into<String>) -> Self {
        Self {
            backend: backend.to_string(),
            endpoint: endpoint.into(),
            emulated: false,
        }
    }

    pub fn emulated(backend: &str, endpoint: impl Into<String>) -> Self {
        Self {
            emulated: true,
            ..Self::live(backend, endpoint)
        }
    }
}

/// Errors surfaced by adapters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    /// Provisioning failed; every execution against this backend fails.
    #[error("provisioning failed for {backend}: {reason}")]
    Provisioning { backend: String, reason: String },

    /// A request exceeds a hard backend limit. Raised before any write.
    #[error("capacity exceeded on {backend}: {reason}")]
    Capacity { backend: String, reason: String },

    #[error("rate limited by {backend} after {attempts} attempts")]
    RateLimited { backend: String, attempts: u32 },

    #[error("not supported: {operation} on {backend}")]
    Unsupported { backend: String, operation: String },

    #[error("{backend} error: {reason}")]
    Backend { backend: String, reason: String },
}

impl AdapterError {
    pub fn unsupported(backend: &str, operation: impl Into<String>) -> Self {
        AdapterError::Unsupported {
            backend: backend.to_string(),
            operation: operation.into(),
        }
    }

    pub fn capacity(backend: &str, reason: impl Into<String>) -> Self {
        AdapterError::Capacity {
            backend: backend.to_string(),
            reason: reason.into(),
        }
    }

    pub fn backend(backend: &str, reason: impl Into<String>) -> Self {
        AdapterError::Backend {
            backend: backend.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, AdapterError::Unsupported { .. })
    }
}

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Uniform operations over one vector backend.
///
/// Pass/fail semantics are identical across implementations; only the
/// advertised capabilities differ. Optional operations default to
/// [`AdapterError::Unsupported`].
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Stable backend name, e.g. [`QDRANT`].
    fn name(&self) -> &str;

    fn capabilities(&self) -> CapabilitySet;

    fn limits(&self) -> BackendLimits {
        BackendLimits::default()
    }

    fn target(&self) -> BackendTarget {
        BackendTarget::live(self.name(), "unspecified")
    }

    /// Idempotent provisioning of the collection/index.
    async fn ensure_ready(&self) -> Result<()>;

    /// Insert-or-update. Batches above the backend limit are split.
    async fn upsert(&self, items: &[VectorItem]) -> Result<()>;

    /// Nearest neighbours, best first.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchHit>>;

    /// Absent ids are omitted from the result.
    async fn get_by_id(&self, ids: &[String]) -> Result<BTreeMap<String, VectorItem>>;

    /// Idempotent.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Idempotent; a missing index is not an error.
    async fn teardown(&self) -> Result<()>;

    async fn count(&self) -> Result<usize> {
        Err(AdapterError::unsupported(self.name(), "count"))
    }

    /// Merge `patch` into the stored metadata without touching the vector.
    async fn update_metadata(&self, _id: &str, _patch: &Metadata) -> Result<()> {
        Err(AdapterError::unsupported(self.name(), "update_metadata"))
    }

    async fn scroll(
        &self,
        _filter: Option<&Filter>,
        _limit: usize,
        _cursor: Option<&str>,
    ) -> Result<ScrollPage> {
        Err(AdapterError::unsupported(self.name(), "scroll"))
    }

    async fn recommend(
        &self,
        _positive: &[String],
        _negative: &[String],
        _top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        Err(AdapterError::unsupported(self.name(), "recommend"))
    }

    async fn search_groups(
        &self,
        _vector: &[f32],
        _group_by: &str,
        _group_size: usize,
        _limit: usize,
    ) -> Result<Vec<HitGroup>> {
        Err(AdapterError::unsupported(self.name(), "search_groups"))
    }

    /// Create `space` with the given layout, replacing any previous one.
    /// Must never name the shared collection or index.
    async fn create_space(&self, _space: &str, _schema: &SpaceSchema) -> Result<()> {
        Err(AdapterError::unsupported(self.name(), "create_space"))
    }

    async fn upsert_space(&self, _space: &str, _items: &[MultiVectorItem]) -> Result<()> {
        Err(AdapterError::unsupported(self.name(), "upsert_space"))
    }

    /// Best first; fused queries score by reciprocal rank.
    async fn query_space(
        &self,
        _space: &str,
        _query: &SpaceQuery,
        _top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        Err(AdapterError::unsupported(self.name(), "query_space"))
    }

    /// Idempotent.
    async fn drop_space(&self, _space: &str) -> Result<()> {
        Err(AdapterError::unsupported(self.name(), "drop_space"))
    }
}

/// Reject a filter that needs capabilities `caps` lacks.
pub fn check_filter(backend: &str, caps: &CapabilitySet, filter: Option<&Filter>) -> Result<()> {
    let Some(filter) = filter else {
        return Ok(());
    };
    let missing = filter.required_capabilities().missing_from(caps);
    match missing.first() {
        Some(cap) => Err(AdapterError::unsupported(backend, format!("{cap} predicate"))),
        None => Ok(()),
    }
}

/// Sort hits best-first with a stable tie-break on id.
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Cosine similarity; zero when either vector has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

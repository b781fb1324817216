//! Typed boundary to the S3 Vectors service.
//!
//! Shapes follow the service API (`PutVectors`, `QueryVectors`, ...). Any
//! client that implements [`S3VectorsApi`] can back the adapter; the workspace
//! ships the in-memory emulator in [`crate::fakes`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vecbench_core::Metadata;

/// Service-side errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum S3VectorsError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("service quota exceeded: {0}")]
    ServiceQuotaExceeded(String),

    #[error("too many requests")]
    TooManyRequests,

    #[error("service error: {0}")]
    Service(String),
}

impl S3VectorsError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, S3VectorsError::TooManyRequests)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, S3VectorsError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, S3VectorsError::Conflict(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
}

/// `CreateIndex` parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub dimension: usize,
    pub distance_metric: DistanceMetric,
    /// Metadata keys stored but excluded from filtering (and from the
    /// filterable-size quota).
    pub non_filterable_metadata_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutInputVector {
    pub key: String,
    pub data: Vec<f32>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetOutputVector {
    pub key: String,
    pub data: Option<Vec<f32>>,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutputVector {
    pub key: String,
    pub distance: Option<f32>,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryVectorsRequest {
    pub query_vector: Vec<f32>,
    pub top_k: usize,
    pub filter: Option<Value>,
    pub return_metadata: bool,
    pub return_distance: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListVectorsPage {
    pub vectors: Vec<GetOutputVector>,
    pub next_token: Option<String>,
}

pub type S3Result<T> = std::result::Result<T, S3VectorsError>;

#[async_trait]
pub trait S3VectorsApi: Send + Sync {
    /// Where requests go, as shown in reports.
    fn endpoint(&self) -> String;

    /// True when no S3 Vectors service is behind this client.
    fn is_emulated(&self) -> bool {
        false
    }

    async fn create_vector_bucket(&self, bucket: &str) -> S3Result<()>;

    async fn create_index(&self, bucket: &str, index: &str, spec: &IndexSpec) -> S3Result<()>;

    async fn delete_index(&self, bucket: &str, index: &str) -> S3Result<()>;

    async fn delete_vector_bucket(&self, bucket: &str) -> S3Result<()>;

    async fn put_vectors(&self, bucket: &str, index: &str, vectors: Vec<PutInputVector>)
        -> S3Result<()>;

    async fn get_vectors(
        &self,
        bucket: &str,
        index: &str,
        keys: &[String],
        return_data: bool,
        return_metadata: bool,
    ) -> S3Result<Vec<GetOutputVector>>;

    async fn query_vectors(
        &self,
        bucket: &str,
        index: &str,
        request: QueryVectorsRequest,
    ) -> S3Result<Vec<QueryOutputVector>>;

    async fn delete_vectors(&self, bucket: &str, index: &str, keys: &[String]) -> S3Result<()>;

    async fn list_vectors(
        &self,
        bucket: &str,
        index: &str,
        max_results: usize,
        next_token: Option<&str>,
    ) -> S3Result<ListVectorsPage>;
}

//! vecbench backends: adapters for the compared vector stores
//!
//! ## Key Components
//!
//! - `QdrantAdapter`: Qdrant over its REST API (`QdrantHttp`)
//! - `S3VectorsAdapter`: S3 Vectors behind the typed `S3VectorsApi` boundary,
//!   with the service quotas enforced before any write
//! - `RetryPolicy`: exponential backoff for throttled calls
//! - `fakes`: in-memory Qdrant and S3 Vectors services for offline runs

pub mod config;
pub mod fakes;
pub mod qdrant;
pub mod retry;
pub mod s3vectors;

pub use config::{QdrantConfig, S3VectorsConfig};
pub use fakes::{MemoryQdrant, MemoryS3Vectors};
pub use qdrant::{QdrantAdapter, QdrantApi, QdrantApiError, QdrantHttp};
pub use retry::{with_backoff, RetryError, RetryPolicy};
pub use s3vectors::{S3VectorsAdapter, S3VectorsApi, S3VectorsError};

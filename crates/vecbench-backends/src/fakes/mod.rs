//! In-memory stand-ins for the backend services (offline runs and tests)
//!
//! `MemoryQdrant` answers the Qdrant REST calls and `MemoryS3Vectors`
//! emulates the S3 Vectors API including its request quotas. Both sit behind
//! the same boundary traits as the real clients, so the adapters under test
//! are the production ones.

mod memory_qdrant;
mod memory_s3vectors;

pub use memory_qdrant::MemoryQdrant;
pub use memory_s3vectors::MemoryS3Vectors;

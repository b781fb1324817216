//! Backend connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Qdrant connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    /// REST endpoint
    pub url: String,
    /// API key (optional for local servers)
    pub api_key: Option<String>,
    pub collection: String,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        QdrantConfig {
            url: std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6333".to_string()),
            api_key: std::env::var("QDRANT_API_KEY").ok().filter(|k| !k.is_empty()),
            collection: std::env::var("VECBENCH_QDRANT_COLLECTION")
                .unwrap_or_else(|_| "vecbench_movies".to_string()),
            timeout_secs: env_number("VECBENCH_QDRANT_TIMEOUT_SECS").unwrap_or(30),
            retry: retry_from_env(),
        }
    }
}

impl QdrantConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// S3 Vectors settings: one vector bucket holding one index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3VectorsConfig {
    pub bucket: String,
    pub index: String,
    pub retry: RetryPolicy,
    /// Emulated delay before writes become visible to queries (milliseconds).
    pub visibility_delay_ms: u64,
}

impl Default for S3VectorsConfig {
    fn default() -> Self {
        S3VectorsConfig {
            bucket: std::env::var("VECBENCH_S3_BUCKET")
                .unwrap_or_else(|_| "vecbench-movies".to_string()),
            index: std::env::var("VECBENCH_S3_INDEX").unwrap_or_else(|_| "movies".to_string()),
            retry: retry_from_env(),
            visibility_delay_ms: env_number("VECBENCH_S3_VISIBILITY_DELAY_MS").unwrap_or(0),
        }
    }
}

impl S3VectorsConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }
}

fn retry_from_env() -> RetryPolicy {
    let defaults = RetryPolicy::default();
    RetryPolicy {
        max_retries: env_number("VECBENCH_MAX_RETRIES").unwrap_or(defaults.max_retries),
        backoff_base_ms: env_number("VECBENCH_BACKOFF_BASE_MS").unwrap_or(defaults.backoff_base_ms),
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let q = QdrantConfig::from_env();
        assert!(!q.collection.is_empty());
        assert!(q.timeout() > Duration::ZERO || q.timeout_secs == 0);
        let s3 = S3VectorsConfig::from_env();
        assert!(!s3.bucket.is_empty());
        assert!(!s3.index.is_empty());
    }
}

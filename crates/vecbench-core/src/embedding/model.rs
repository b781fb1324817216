//! Embedding model boundary and the bundled model bindings.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{EmbeddingError, Result};

/// A black-box text → vector function.
///
/// `generate` returns exactly one vector per input text, in input order.
/// Vectors need not be normalized; the cache normalizes them.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Stable identifier mixed into every cache key.
    fn model_id(&self) -> &str;

    /// Expected output dimension.
    fn dimension(&self) -> usize;

    async fn generate(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase alphanumeric token is hashed with SHA-256 into one of the
/// first `dimension - 1` buckets with a hash-derived sign. The last component
/// is a constant bias that no token can reach, so every output has a norm of
/// at least 1. No network, no model files; used for offline runs and tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    model_id: String,
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            model_id: format!("hashing-sha256-v2-{dimension}"),
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let buckets = self.dimension - 1;
        vector[buckets] = 1.0;
        if buckets == 0 {
            return vector;
        }
        for token in tokens(text) {
            let (bucket, sign) = token_hash(&token, buckets);
            vector[bucket] += sign;
        }
        vector
    }
}

/// Lowercase alphanumeric tokens of `text`, in order.
pub fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Bucket in `0..buckets` and sign for `token`. `buckets` must be non-zero.
pub fn token_hash(token: &str, buckets: usize) -> (usize, f32) {
    let hash = Sha256::digest(token.as_bytes());
    let mut idx = [0u8; 8];
    idx.copy_from_slice(&hash[..8]);
    let bucket = (u64::from_le_bytes(idx) % buckets as u64) as usize;
    let sign = if hash[8] & 1 == 0 { 1.0 } else { -1.0 };
    (bucket, sign)
}

#[async_trait]
impl EmbeddingModel for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn generate(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client for an Ollama server's `/api/embed` endpoint (batch input).
pub struct OllamaEmbedder {
    endpoint: String,
    model: String,
    model_id: String,
    dimension: usize,
    http: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, dimension: usize, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("vecbench/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Generation(format!("build http client: {e}")))?;
        Ok(Self {
            endpoint: format!("{}/api/embed", base_url.trim_end_matches('/')),
            model: model.to_string(),
            model_id: format!("ollama:{model}"),
            dimension,
            http,
        })
    }
}

#[async_trait]
impl EmbeddingModel for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn generate(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(model = %self.model, count = texts.len(), "requesting embeddings");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("POST {}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Generation(format!(
                "embedding server returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("decode embed response: {e}")))?;
        Ok(parsed.embeddings)
    }
}

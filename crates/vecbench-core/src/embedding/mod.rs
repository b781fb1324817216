//! Deterministic text → vector embeddings.
//!
//! Every vector the harness feeds into a backend goes through
//! [`EmbeddingCache`], which memoizes model output under a content address
//! ([`EmbeddingKey`]) derived from the model identifier and the exact input
//! text. Entries are persisted through an [`EmbeddingStore`] so repeated runs
//! see byte-identical vectors and stable similarity scores.
//!
//! # Modules
//!
//! - [`cache`]: `EmbeddingCache` (`embed`, `embed_batch`, `clear`)
//! - [`store`]: `EmbeddingStore`, `JsonFileStore`, `MemoryEmbeddingStore`
//! - [`model`]: `EmbeddingModel`, `HashingEmbedder`, `OllamaEmbedder`

pub mod cache;
pub mod model;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use cache::{CacheStats, EmbeddingCache};
pub use model::{EmbeddingModel, HashingEmbedder, OllamaEmbedder};
pub use store::{EmbeddingStore, JsonFileStore, MemoryEmbeddingStore, StoreLoad};

/// Errors from embedding generation and persistence.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// The model failed or returned unusable output. Fatal for a harness run.
    #[error("embedding generation failed: {0}")]
    Generation(String),

    #[error("embedding store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Content address of one embedding: SHA-256 over `model_id ‖ 0x00 ‖ text`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingKey(String);

impl EmbeddingKey {
    /// Derive the key for `text` embedded by `model_id`.
    pub fn derive(model_id: &str, text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(model_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(text.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for EmbeddingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EmbeddingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EmbeddingKey({})", self.short())
    }
}

/// A stored, unit-length vector. The key is the map key in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingEntry {
    pub vector: Vec<f32>,
    pub dimension: usize,
}

impl EmbeddingEntry {
    pub fn new(vector: Vec<f32>) -> Self {
        let dimension = vector.len();
        Self { vector, dimension }
    }

    /// An entry is well-formed when its declared dimension matches the vector.
    pub fn is_consistent(&self) -> bool {
        self.dimension == self.vector.len() && self.dimension > 0
    }
}

/// Scale `vector` to unit L2 norm in place. Returns `false` for a zero or
/// non-finite vector, which cannot be normalized.
pub fn normalize(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for x in vector.iter_mut() {
        *x /= norm;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic() {
        let a = EmbeddingKey::derive("all-minilm", "space adventure");
        let b = EmbeddingKey::derive("all-minilm", "space adventure");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn key_depends_on_model_and_text() {
        let base = EmbeddingKey::derive("all-minilm", "crime films");
        assert_ne!(base, EmbeddingKey::derive("all-minilm", "crime film"));
        assert_ne!(base, EmbeddingKey::derive("other-model", "crime films"));
    }

    #[test]
    fn key_separator_prevents_boundary_collisions() {
        let a = EmbeddingKey::derive("ab", "c");
        let b = EmbeddingKey::derive("a", "bc");
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        assert!(normalize(&mut v));
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_rejects_zero_vector() {
        let mut v = vec![0.0; 4];
        assert!(!normalize(&mut v));
    }
}

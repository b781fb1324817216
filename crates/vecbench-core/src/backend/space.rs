//! Auxiliary vector spaces holding several vectors per point.
//!
//! The shared dataset lives in a single-vector index. Scenarios that need
//! named dense vectors or sparse keyword vectors build a scratch space beside
//! it, query it, and drop it again.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{Capability, Metadata};
use crate::embedding::model::{token_hash, tokens};

/// Index range of [`SparseVector::bag_of_words`].
pub const SPARSE_BUCKETS: usize = 10_000;

/// Parallel index/weight lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    /// One unit weight per distinct token of `text`, sorted by index.
    pub fn bag_of_words(text: &str) -> Self {
        let buckets: BTreeSet<u32> = tokens(text)
            .map(|t| token_hash(&t, SPARSE_BUCKETS).0 as u32)
            .collect();
        Self {
            values: vec![1.0; buckets.len()],
            indices: buckets.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dot product over the indices both vectors share.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let weights: BTreeMap<u32, f32> = other
            .indices
            .iter()
            .copied()
            .zip(other.values.iter().copied())
            .collect();
        self.indices
            .iter()
            .zip(&self.values)
            .filter_map(|(i, v)| weights.get(i).map(|w| v * w))
            .sum()
    }
}

/// Vector layout of a space. Dense vectors use the adapter's dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceSchema {
    pub dense: Vec<String>,
    pub sparse: Vec<String>,
}

impl SpaceSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dense(mut self, name: impl Into<String>) -> Self {
        self.dense.push(name.into());
        self
    }

    pub fn sparse(mut self, name: impl Into<String>) -> Self {
        self.sparse.push(name.into());
        self
    }

    /// What a backend must advertise to host this layout.
    pub fn required_capability(&self) -> Capability {
        if self.sparse.is_empty() {
            Capability::NamedVectors
        } else {
            Capability::HybridSearch
        }
    }
}

/// One point of a space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiVectorItem {
    pub id: String,
    #[serde(default)]
    pub dense: BTreeMap<String, Vec<f32>>,
    #[serde(default)]
    pub sparse: BTreeMap<String, SparseVector>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl MultiVectorItem {
    pub fn new(id: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            dense: BTreeMap::new(),
            sparse: BTreeMap::new(),
            metadata,
        }
    }

    pub fn with_dense(mut self, name: impl Into<String>, vector: Vec<f32>) -> Self {
        self.dense.insert(name.into(), vector);
        self
    }

    pub fn with_sparse(mut self, name: impl Into<String>, vector: SparseVector) -> Self {
        self.sparse.insert(name.into(), vector);
        self
    }
}

/// A query against one space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpaceQuery {
    Dense { using: String, vector: Vec<f32> },
    Sparse { using: String, vector: SparseVector },
    /// Reciprocal rank fusion of `branches`, each fetched to `prefetch` hits.
    Fusion {
        branches: Vec<SpaceQuery>,
        prefetch: usize,
    },
}

impl SpaceQuery {
    pub fn dense(using: impl Into<String>, vector: Vec<f32>) -> Self {
        SpaceQuery::Dense {
            using: using.into(),
            vector,
        }
    }

    pub fn sparse(using: impl Into<String>, vector: SparseVector) -> Self {
        SpaceQuery::Sparse {
            using: using.into(),
            vector,
        }
    }

    pub fn fusion(branches: impl IntoIterator<Item = SpaceQuery>, prefetch: usize) -> Self {
        SpaceQuery::Fusion {
            branches: branches.into_iter().collect(),
            prefetch,
        }
    }

    pub fn required_capability(&self) -> Capability {
        match self {
            SpaceQuery::Dense { .. } => Capability::NamedVectors,
            SpaceQuery::Sparse { .. } | SpaceQuery::Fusion { .. } => Capability::HybridSearch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bag_of_words_deduplicates_tokens() {
        let v = SparseVector::bag_of_words("Robots, robots and more ROBOTS");
        assert_eq!(v.indices.len(), 3);
        assert!(v.values.iter().all(|w| *w == 1.0));
        assert!(v.indices.windows(2).all(|w| w[0] < w[1]));
        assert!(v.indices.iter().all(|i| (*i as usize) < SPARSE_BUCKETS));
        assert!(SparseVector::bag_of_words("  ").is_empty());
    }

    #[test]
    fn dot_counts_shared_tokens() {
        let doc = SparseVector::bag_of_words("a robot explores space");
        let query = SparseVector::bag_of_words("space robots adventure");
        let same = SparseVector::bag_of_words("space");
        assert!(doc.dot(&query) >= 1.0);
        assert_eq!(same.dot(&same), 1.0);
        assert_eq!(same.dot(&SparseVector::default()), 0.0);
    }

    #[test]
    fn capabilities_follow_the_layout() {
        let named = SpaceSchema::new().dense("title").dense("description");
        assert_eq!(named.required_capability(), Capability::NamedVectors);
        let hybrid = SpaceSchema::new().dense("dense").sparse("sparse");
        assert_eq!(hybrid.required_capability(), Capability::HybridSearch);

        let fused = SpaceQuery::fusion(
            [
                SpaceQuery::dense("dense", vec![1.0]),
                SpaceQuery::sparse("sparse", SparseVector::bag_of_words("space")),
            ],
            10,
        );
        assert_eq!(fused.required_capability(), Capability::HybridSearch);
        assert_eq!(
            SpaceQuery::dense("title", vec![1.0]).required_capability(),
            Capability::NamedVectors
        );
    }
}

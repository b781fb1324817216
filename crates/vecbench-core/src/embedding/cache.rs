//! Content-addressed memoization of embedding model output.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
    normalize, EmbeddingEntry, EmbeddingError, EmbeddingKey, EmbeddingModel, EmbeddingStore,
    Result, StoreLoad,
};

/// Counters for one cache instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub model_calls: u64,
}

/// Deterministic text → vector cache.
///
/// - hit: the stored vector is returned, the model is not called
/// - miss: the model is called once for the whole missing subset, vectors are
///   normalized to unit length and committed to the store in one write
/// - unreadable store: every key is a miss, a warning is logged
/// - model failure: [`EmbeddingError::Generation`], nothing is written
pub struct EmbeddingCache {
    model: Arc<dyn EmbeddingModel>,
    store: Arc<dyn EmbeddingStore>,
    entries: Mutex<Option<BTreeMap<EmbeddingKey, EmbeddingEntry>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    model_calls: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(model: Arc<dyn EmbeddingModel>, store: Arc<dyn EmbeddingStore>) -> Self {
        Self {
            model,
            store,
            entries: Mutex::new(None),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            model_calls: AtomicU64::new(0),
        }
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    pub fn key_for(&self, text: &str) -> EmbeddingKey {
        EmbeddingKey::derive(self.model.model_id(), text)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            model_calls: self.model_calls.load(Ordering::Relaxed),
        }
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[("_", text)]).await?;
        out.remove("_")
            .ok_or_else(|| EmbeddingError::Generation("no vector returned".to_string()))
    }

    /// Embed `(id, text)` pairs, returning `id → vector`.
    ///
    /// Texts that appear more than once are embedded once.
    pub async fn embed_batch<I, T>(&self, items: &[(I, T)]) -> Result<BTreeMap<String, Vec<f32>>>
    where
        I: AsRef<str>,
        T: AsRef<str>,
    {
        let keyed: Vec<(&str, &str, EmbeddingKey)> = items
            .iter()
            .map(|(id, text)| (id.as_ref(), text.as_ref(), self.key_for(text.as_ref())))
            .collect();

        let missing: Vec<(EmbeddingKey, String)> = {
            let mut guard = self.lock_loaded();
            let entries = guard.get_or_insert_with(BTreeMap::new);
            let mut seen = HashSet::new();
            keyed
                .iter()
                .filter(|(_, _, key)| !entries.contains_key(key))
                .filter(|(_, _, key)| seen.insert((*key).clone()))
                .map(|(_, text, key)| (key.clone(), text.to_string()))
                .collect()
        };

        let hit_count = keyed.len() - missing.len();
        self.hits.fetch_add(hit_count as u64, Ordering::Relaxed);
        self.misses.fetch_add(missing.len() as u64, Ordering::Relaxed);

        if !missing.is_empty() {
            let fresh = self.generate_missing(&missing).await?;
            if let Err(e) = self.store.commit(&fresh) {
                warn!(error = %e, count = fresh.len(), "failed to persist embeddings; keeping them in memory only");
            }
            let mut guard = self.lock_loaded();
            guard.get_or_insert_with(BTreeMap::new).extend(fresh);
        }

        let guard = self.lock_loaded();
        let entries = guard.as_ref().ok_or_else(|| {
            EmbeddingError::Store("cache entries were not loaded".to_string())
        })?;
        keyed
            .into_iter()
            .map(|(id, _, key)| {
                entries
                    .get(&key)
                    .map(|entry| (id.to_string(), entry.vector.clone()))
                    .ok_or_else(|| {
                        EmbeddingError::Generation(format!("no vector for key {}", key.short()))
                    })
            })
            .collect()
    }

    /// Evict every entry, in memory and in the store.
    pub fn clear(&self) -> Result<()> {
        self.store.clear()?;
        *self.entries.lock().unwrap_or_else(PoisonError::into_inner) = Some(BTreeMap::new());
        info!(model = %self.model_id(), "embedding cache cleared");
        Ok(())
    }

    /// Lock the in-memory map, loading it from the store on first use.
    fn lock_loaded(
        &self,
    ) -> std::sync::MutexGuard<'_, Option<BTreeMap<EmbeddingKey, EmbeddingEntry>>> {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            let loaded = match self.store.load() {
                StoreLoad::Loaded(entries) => {
                    debug!(count = entries.len(), "loaded embedding cache");
                    entries
                }
                StoreLoad::Missing => BTreeMap::new(),
                StoreLoad::Corrupt(reason) => {
                    warn!(%reason, "embedding cache unreadable; recomputing every vector");
                    BTreeMap::new()
                }
            };
            *guard = Some(loaded);
        }
        guard
    }

    async fn generate_missing(
        &self,
        missing: &[(EmbeddingKey, String)],
    ) -> Result<BTreeMap<EmbeddingKey, EmbeddingEntry>> {
        let texts: Vec<String> = missing.iter().map(|(_, t)| t.clone()).collect();
        info!(model = %self.model_id(), count = texts.len(), "generating embeddings");
        self.model_calls.fetch_add(1, Ordering::Relaxed);
        let vectors = self.model.generate(&texts).await?;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::Generation(format!(
                "model returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        let expected = self.model.dimension();
        let mut fresh = BTreeMap::new();
        for ((key, text), mut vector) in missing.iter().zip(vectors) {
            if vector.len() != expected {
                return Err(EmbeddingError::Generation(format!(
                    "model returned dimension {} (expected {expected}) for {:?}",
                    vector.len(),
                    truncate(text, 40)
                )));
            }
            if !normalize(&mut vector) {
                return Err(EmbeddingError::Generation(format!(
                    "model returned a zero or non-finite vector for {:?}",
                    truncate(text, 40)
                )));
            }
            fresh.insert(key.clone(), EmbeddingEntry::new(vector));
        }
        Ok(fresh)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{HashingEmbedder, MemoryEmbeddingStore};

    fn cache_with(store: Arc<MemoryEmbeddingStore>) -> EmbeddingCache {
        EmbeddingCache::new(Arc::new(HashingEmbedder::new(32)), store)
    }

    #[tokio::test]
    async fn second_lookup_is_a_hit() {
        let store = Arc::new(MemoryEmbeddingStore::new());
        let cache = cache_with(store.clone());

        let a = cache.embed("romantic stories about love").await.unwrap();
        let b = cache.embed("romantic stories about love").await.unwrap();
        assert_eq!(a, b);

        let stats = cache.stats();
        assert_eq!(stats.model_calls, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn batch_generates_missing_subset_once() {
        let store = Arc::new(MemoryEmbeddingStore::new());
        let cache = cache_with(store.clone());
        cache.embed("alpha").await.unwrap();

        let out = cache
            .embed_batch(&[("a", "alpha"), ("b", "beta"), ("c", "gamma"), ("d", "beta")])
            .await
            .unwrap();

        assert_eq!(out.len(), 4);
        assert_eq!(out["b"], out["d"]);
        assert_eq!(cache.stats().model_calls, 2);
        assert_eq!(store.commit_count(), 2);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn vectors_are_unit_length() {
        let cache = cache_with(Arc::new(MemoryEmbeddingStore::new()));
        let v = cache.embed("crime and gangster films").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("Amélie", 3), "Amé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}

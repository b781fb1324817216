//! Dataset seeding run once per adapter before the scenarios.

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;
use vecbench_core::{BackendAdapter, EmbeddingCache, Fixture, Sink, VectorItem};

use crate::dataset::{movies, Movie};

/// Embed every movie through the cache and return them as upsertable items.
pub async fn movie_items(embeddings: &EmbeddingCache) -> vecbench_core::embedding::Result<Vec<VectorItem>> {
    let texts: Vec<(&str, String)> = movies().iter().map(|m| (m.id, m.embedding_text())).collect();
    let mut vectors = embeddings.embed_batch(&texts).await?;
    Ok(movies()
        .iter()
        .filter_map(|m: &Movie| vectors.remove(m.id).map(|v| m.to_item(v)))
        .collect())
}

/// Upserts the movie dataset into each ready backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct MovieFixture;

#[async_trait]
impl Fixture for MovieFixture {
    async fn prepare(
        &self,
        adapter: &dyn BackendAdapter,
        embeddings: &EmbeddingCache,
        sink: &dyn Sink,
    ) -> anyhow::Result<()> {
        let items = movie_items(embeddings).await?;
        adapter
            .upsert(&items)
            .await
            .with_context(|| format!("seeding {} movies into {}", items.len(), adapter.name()))?;
        info!(backend = adapter.name(), count = items.len(), "dataset seeded");
        sink.write_line(&format!("[{}] seeded {} movies", adapter.name(), items.len()));
        Ok(())
    }
}

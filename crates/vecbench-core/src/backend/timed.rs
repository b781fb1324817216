//! Timing proxy around an adapter.
//!
//! Scenario `elapsed_ms` covers backend calls only; embedding lookups and
//! transcript output are excluded. [`TimedAdapter`] measures every delegated
//! call and counts them.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use super::{
    BackendAdapter, BackendLimits, BackendTarget, CapabilitySet, Filter, HitGroup, Metadata,
    MultiVectorItem, Result, ScrollPage, SearchHit, SpaceQuery, SpaceSchema, VectorItem,
};

/// Accumulated backend time and call count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub calls: u64,
    pub elapsed_micros: u64,
}

impl CallStats {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_micros / 1_000
    }
}

pub struct TimedAdapter {
    inner: Arc<dyn BackendAdapter>,
    calls: AtomicU64,
    elapsed_micros: AtomicU64,
}

impl TimedAdapter {
    pub fn new(inner: Arc<dyn BackendAdapter>) -> Self {
        Self {
            inner,
            calls: AtomicU64::new(0),
            elapsed_micros: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CallStats {
        CallStats {
            calls: self.calls.load(Ordering::Relaxed),
            elapsed_micros: self.elapsed_micros.load(Ordering::Relaxed),
        }
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        let started = Instant::now();
        let out = fut.await;
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.elapsed_micros
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
        out
    }
}

#[async_trait]
impl BackendAdapter for TimedAdapter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.inner.capabilities()
    }

    fn limits(&self) -> BackendLimits {
        self.inner.limits()
    }

    fn target(&self) -> BackendTarget {
        self.inner.target()
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.timed(self.inner.ensure_ready()).await
    }

    async fn upsert(&self, items: &[VectorItem]) -> Result<()> {
        self.timed(self.inner.upsert(items)).await
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchHit>> {
        self.timed(self.inner.search(vector, top_k, filter)).await
    }

    async fn get_by_id(&self, ids: &[String]) -> Result<BTreeMap<String, VectorItem>> {
        self.timed(self.inner.get_by_id(ids)).await
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.timed(self.inner.delete(ids)).await
    }

    async fn teardown(&self) -> Result<()> {
        self.timed(self.inner.teardown()).await
    }

    async fn count(&self) -> Result<usize> {
        self.timed(self.inner.count()).await
    }

    async fn update_metadata(&self, id: &str, patch: &Metadata) -> Result<()> {
        self.timed(self.inner.update_metadata(id, patch)).await
    }

    async fn scroll(
        &self,
        filter: Option<&Filter>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<ScrollPage> {
        self.timed(self.inner.scroll(filter, limit, cursor)).await
    }

    async fn recommend(
        &self,
        positive: &[String],
        negative: &[String],
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        self.timed(self.inner.recommend(positive, negative, top_k))
            .await
    }

    async fn search_groups(
        &self,
        vector: &[f32],
        group_by: &str,
        group_size: usize,
        limit: usize,
    ) -> Result<Vec<HitGroup>> {
        self.timed(self.inner.search_groups(vector, group_by, group_size, limit))
            .await
    }

    async fn create_space(&self, space: &str, schema: &SpaceSchema) -> Result<()> {
        self.timed(self.inner.create_space(space, schema)).await
    }

    async fn upsert_space(&self, space: &str, items: &[MultiVectorItem]) -> Result<()> {
        self.timed(self.inner.upsert_space(space, items)).await
    }

    async fn query_space(
        &self,
        space: &str,
        query: &SpaceQuery,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        self.timed(self.inner.query_space(space, query, top_k)).await
    }

    async fn drop_space(&self, space: &str) -> Result<()> {
        self.timed(self.inner.drop_space(space)).await
    }
}

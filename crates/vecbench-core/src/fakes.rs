//! In-memory fakes for the adapter contract (testing only)
//!
//! `MemoryAdapter` satisfies [`BackendAdapter`] without any external service.
//! Its name, capability set and batch limit are configurable so one fake can
//! stand in for either backend, and it counts underlying calls so tests can
//! assert batching and capability gating.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{
    check_filter, cosine, sort_hits, AdapterError, BackendAdapter, BackendLimits, BackendTarget,
    Capability, CapabilitySet, Filter, HitGroup, Metadata, Result, ScrollPage, SearchHit, VectorItem,
};

// ---------------------------------------------------------------------------
// MemoryAdapter
// ---------------------------------------------------------------------------

/// In-memory adapter backed by a `BTreeMap<id, item>`.
#[derive(Debug)]
pub struct MemoryAdapter {
    name: String,
    capabilities: CapabilitySet,
    limits: BackendLimits,
    items: Mutex<BTreeMap<String, VectorItem>>,
    ready: AtomicBool,
    fail_provisioning: AtomicBool,
    calls: AtomicUsize,
    upsert_batches: AtomicUsize,
}

impl MemoryAdapter {
    /// An adapter with every single-index capability and no limits.
    pub fn new(name: &str) -> Self {
        let all = CapabilitySet::core()
            .with(Capability::Update)
            .with(Capability::Scroll)
            .with(Capability::FullTextFilter)
            .with(Capability::GeoFilter)
            .with(Capability::Recommend)
            .with(Capability::Grouping);
        Self::with_capabilities(name, all)
    }

    pub fn with_capabilities(name: &str, capabilities: CapabilitySet) -> Self {
        Self {
            name: name.to_string(),
            capabilities,
            limits: BackendLimits::default(),
            items: Mutex::new(BTreeMap::new()),
            ready: AtomicBool::new(false),
            fail_provisioning: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            upsert_batches: AtomicUsize::new(0),
        }
    }

    pub fn with_limits(mut self, limits: BackendLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Make `ensure_ready` fail with a provisioning error.
    pub fn failing_provisioning(self) -> Self {
        self.fail_provisioning.store(true, Ordering::SeqCst);
        self
    }

    /// Total adapter operations invoked (excluding `name`/`capabilities`).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Underlying write batches issued by `upsert`.
    pub fn upsert_batch_count(&self) -> usize {
        self.upsert_batches.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn require(&self, capability: Capability, operation: &str) -> Result<()> {
        if self.capabilities.contains(capability) {
            Ok(())
        } else {
            Err(AdapterError::unsupported(&self.name, operation))
        }
    }

    fn ranked(&self, vector: &[f32], filter: Option<&Filter>) -> Vec<SearchHit> {
        let items = self.items.lock().unwrap();
        let mut hits: Vec<SearchHit> = items
            .values()
            .filter(|item| filter.map_or(true, |f| f.matches(&item.metadata)))
            .map(|item| SearchHit {
                id: item.id.clone(),
                score: cosine(vector, &item.vector),
                metadata: item.metadata.clone(),
            })
            .collect();
        sort_hits(&mut hits);
        hits
    }
}

#[async_trait]
impl BackendAdapter for MemoryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities.clone()
    }

    fn limits(&self) -> BackendLimits {
        self.limits
    }

    fn target(&self) -> BackendTarget {
        BackendTarget::emulated(&self.name, "memory")
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.touch();
        if self.fail_provisioning.load(Ordering::SeqCst) {
            return Err(AdapterError::Provisioning {
                backend: self.name.clone(),
                reason: "index creation refused".to_string(),
            });
        }
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert(&self, items: &[VectorItem]) -> Result<()> {
        self.touch();
        self.require(Capability::Insert, "upsert")?;
        let batch = self.limits.max_upsert_batch.unwrap_or(usize::MAX).max(1);
        let mut stored = self.items.lock().unwrap();
        for chunk in items.chunks(batch) {
            self.upsert_batches.fetch_add(1, Ordering::SeqCst);
            for item in chunk {
                stored.insert(item.id.clone(), item.clone());
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchHit>> {
        self.touch();
        self.require(Capability::Search, "search")?;
        check_filter(&self.name, &self.capabilities, filter)?;
        if let Some(max) = self.limits.max_top_k {
            if top_k > max {
                return Err(AdapterError::capacity(
                    &self.name,
                    format!("top_k {top_k} exceeds maximum {max}"),
                ));
            }
        }
        let mut hits = self.ranked(vector, filter);
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn get_by_id(&self, ids: &[String]) -> Result<BTreeMap<String, VectorItem>> {
        self.touch();
        self.require(Capability::GetById, "get_by_id")?;
        let items = self.items.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| items.get(id).map(|item| (id.clone(), item.clone())))
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.touch();
        self.require(Capability::Delete, "delete")?;
        let mut items = self.items.lock().unwrap();
        for id in ids {
            items.remove(id);
        }
        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        self.touch();
        self.items.lock().unwrap().clear();
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        self.touch();
        Ok(self.items.lock().unwrap().len())
    }

    async fn update_metadata(&self, id: &str, patch: &Metadata) -> Result<()> {
        self.touch();
        self.require(Capability::Update, "update_metadata")?;
        let mut items = self.items.lock().unwrap();
        let item = items
            .get_mut(id)
            .ok_or_else(|| AdapterError::backend(&self.name, format!("no item {id}")))?;
        for (k, v) in patch {
            item.metadata.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn scroll(
        &self,
        filter: Option<&Filter>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<ScrollPage> {
        self.touch();
        self.require(Capability::Scroll, "scroll")?;
        check_filter(&self.name, &self.capabilities, filter)?;
        let items = self.items.lock().unwrap();
        let mut matching = items
            .values()
            .filter(|item| cursor.map_or(true, |c| item.id.as_str() >= c))
            .filter(|item| filter.map_or(true, |f| f.matches(&item.metadata)));
        let page: Vec<VectorItem> = matching.by_ref().take(limit).cloned().collect();
        let next_cursor = matching.next().map(|item| item.id.clone());
        Ok(ScrollPage {
            items: page,
            next_cursor,
        })
    }

    async fn recommend(
        &self,
        positive: &[String],
        negative: &[String],
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        self.touch();
        self.require(Capability::Recommend, "recommend")?;
        let query = {
            let items = self.items.lock().unwrap();
            let dim = items.values().next().map_or(0, |i| i.vector.len());
            let mut query = vec![0.0f32; dim];
            for (ids, sign) in [(positive, 1.0f32), (negative, -1.0f32)] {
                for id in ids {
                    let item = items
                        .get(id)
                        .ok_or_else(|| AdapterError::backend(&self.name, format!("no item {id}")))?;
                    for (q, x) in query.iter_mut().zip(&item.vector) {
                        *q += sign * x;
                    }
                }
            }
            query
        };
        let mut hits: Vec<SearchHit> = self
            .ranked(&query, None)
            .into_iter()
            .filter(|h| !positive.contains(&h.id) && !negative.contains(&h.id))
            .collect();
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn search_groups(
        &self,
        vector: &[f32],
        group_by: &str,
        group_size: usize,
        limit: usize,
    ) -> Result<Vec<HitGroup>> {
        self.touch();
        self.require(Capability::Grouping, "search_groups")?;
        let mut groups: Vec<HitGroup> = Vec::new();
        for hit in self.ranked(vector, None) {
            let Some(key) = hit.metadata.get(group_by).cloned() else {
                continue;
            };
            let pos = groups.iter().position(|g| g.key == key);
            let len = groups.len();
            match pos {
                Some(i) if groups[i].hits.len() < group_size => groups[i].hits.push(hit),
                Some(_) => {}
                None if len < limit => groups.push(HitGroup {
                    key,
                    hits: vec![hit],
                }),
                None => {}
            }
        }
        Ok(groups)
    }
}

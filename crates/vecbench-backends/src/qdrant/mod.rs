//! Qdrant adapter over the REST boundary.
//!
//! Qdrant point ids must be integers or UUIDs, so every string key is mapped
//! to a deterministic UUID (first 16 bytes of its SHA-256) and the original
//! key is kept in the payload under [`KEY_FIELD`].

pub mod client;
pub mod filter;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;
use vecbench_core::backend::{self, sort_hits, Result};
use vecbench_core::{
    AdapterError, BackendAdapter, BackendTarget, Capability, CapabilitySet, Filter, HitGroup,
    Metadata, MultiVectorItem, ScrollPage, SearchHit, SpaceQuery, SpaceSchema, VectorItem, QDRANT,
};

pub use client::{QdrantApi, QdrantApiError, QdrantHttp};
pub use filter::to_qdrant;

use crate::config::QdrantConfig;
use crate::retry::{with_backoff, RetryError, RetryPolicy};

/// Payload field holding the caller's string key.
pub const KEY_FIELD: &str = "_key";

/// Points per upsert request.
const UPSERT_CHUNK: usize = 1_000;

/// Deterministic UUID for a string key.
pub fn point_id(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

/// Payload indexes created on provisioning: keyword and numeric fields for
/// filtering, a word-tokenized text index and a geo index.
pub fn default_payload_indexes() -> Vec<(String, Value)> {
    let mut indexes: Vec<(String, Value)> = ["genre", "director", "language"]
        .into_iter()
        .map(|f| (f.to_string(), json!("keyword")))
        .collect();
    indexes.extend(["year", "rating"].into_iter().map(|f| (f.to_string(), json!("float"))));
    indexes.push((
        "description".to_string(),
        json!({ "type": "text", "tokenizer": "word", "lowercase": true }),
    ));
    indexes.push(("location".to_string(), json!("geo")));
    indexes
}

pub struct QdrantAdapter {
    api: Arc<dyn QdrantApi>,
    collection: String,
    dimension: usize,
    retry: RetryPolicy,
    payload_indexes: Vec<(String, Value)>,
}

impl QdrantAdapter {
    pub fn new(api: Arc<dyn QdrantApi>, collection: &str, dimension: usize) -> Self {
        Self {
            api,
            collection: collection.to_string(),
            dimension,
            retry: RetryPolicy::default(),
            payload_indexes: default_payload_indexes(),
        }
    }

    pub fn from_config(api: Arc<dyn QdrantApi>, config: &QdrantConfig, dimension: usize) -> Self {
        Self::new(api, &config.collection, dimension).with_retry(config.retry)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_payload_indexes(mut self, indexes: Vec<(String, Value)>) -> Self {
        self.payload_indexes = indexes;
        self
    }

    fn path(&self, suffix: &str) -> String {
        format!("/collections/{}{}", self.collection, suffix)
    }

    async fn raw_call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> std::result::Result<Value, RetryError<QdrantApiError>> {
        with_backoff(&self.retry, QdrantApiError::is_throttled, || {
            self.api.call(method.clone(), path, body.clone())
        })
        .await
    }

    async fn call(&self, method: Method, suffix: &str, body: Option<Value>) -> Result<Value> {
        self.raw_call(method, &self.path(suffix), body)
            .await
            .map_err(|e| self.adapter_error(e))
    }

    fn adapter_error(&self, err: RetryError<QdrantApiError>) -> AdapterError {
        match err {
            RetryError::Throttled { attempts } => AdapterError::RateLimited {
                backend: QDRANT.to_string(),
                attempts,
            },
            RetryError::Failed(e) => AdapterError::backend(QDRANT, e.to_string()),
        }
    }

    fn provisioning(&self, reason: impl std::fmt::Display) -> AdapterError {
        AdapterError::Provisioning {
            backend: QDRANT.to_string(),
            reason: reason.to_string(),
        }
    }

    fn ids(keys: &[String]) -> Vec<String> {
        keys.iter().map(|k| point_id(k)).collect()
    }

    /// Scratch spaces live beside the shared collection, never on top of it.
    fn space_path(&self, space: &str, suffix: &str) -> Result<String> {
        if space == self.collection {
            return Err(AdapterError::backend(
                QDRANT,
                format!("space {space} would replace the shared collection"),
            ));
        }
        Ok(format!("/collections/{space}{suffix}"))
    }

    async fn space_call(
        &self,
        method: Method,
        space: &str,
        suffix: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let path = self.space_path(space, suffix)?;
        self.raw_call(method, &path, body)
            .await
            .map_err(|e| self.adapter_error(e))
    }
}

/// Body of a Query API request, nesting fusion branches as prefetches.
fn query_json(query: &SpaceQuery, limit: usize) -> Value {
    match query {
        SpaceQuery::Dense { using, vector } => {
            json!({ "query": vector, "using": using, "limit": limit })
        }
        SpaceQuery::Sparse { using, vector } => json!({
            "query": { "indices": vector.indices, "values": vector.values },
            "using": using,
            "limit": limit,
        }),
        SpaceQuery::Fusion { branches, prefetch } => json!({
            "prefetch": branches.iter().map(|b| query_json(b, *prefetch)).collect::<Vec<_>>(),
            "query": { "fusion": "rrf" },
            "limit": limit,
        }),
    }
}

fn space_point(item: &MultiVectorItem) -> Value {
    let mut vector = serde_json::Map::new();
    for (name, dense) in &item.dense {
        vector.insert(name.clone(), json!(dense));
    }
    for (name, sparse) in &item.sparse {
        vector.insert(
            name.clone(),
            json!({ "indices": sparse.indices, "values": sparse.values }),
        );
    }
    let mut payload = item.metadata.clone();
    payload.insert(KEY_FIELD.to_string(), json!(item.id));
    json!({ "id": point_id(&item.id), "vector": vector, "payload": payload })
}

/// Split a Qdrant payload into (key, metadata).
fn split_payload(id: &Value, payload: Option<&Value>) -> (String, Metadata) {
    let mut metadata = payload
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let key = match metadata.remove(KEY_FIELD) {
        Some(Value::String(key)) => key,
        _ => match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    };
    (key, metadata)
}

fn parse_hit(point: &Value) -> SearchHit {
    let (id, metadata) = split_payload(&point["id"], point.get("payload"));
    SearchHit {
        id,
        score: point["score"].as_f64().unwrap_or(0.0) as f32,
        metadata,
    }
}

fn parse_point(point: &Value) -> VectorItem {
    let (id, metadata) = split_payload(&point["id"], point.get("payload"));
    let vector = point["vector"]
        .as_array()
        .map(|xs| xs.iter().filter_map(Value::as_f64).map(|x| x as f32).collect())
        .unwrap_or_default();
    VectorItem {
        id,
        vector,
        metadata,
    }
}

fn parse_hits(result: &Value) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = result
        .as_array()
        .map(|points| points.iter().map(parse_hit).collect())
        .unwrap_or_default();
    sort_hits(&mut hits);
    hits
}

#[async_trait]
impl BackendAdapter for QdrantAdapter {
    fn name(&self) -> &str {
        QDRANT
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::core()
            .with(Capability::Update)
            .with(Capability::Scroll)
            .with(Capability::FullTextFilter)
            .with(Capability::GeoFilter)
            .with(Capability::Recommend)
            .with(Capability::Grouping)
            .with(Capability::HybridSearch)
            .with(Capability::NamedVectors)
    }

    fn target(&self) -> BackendTarget {
        let endpoint = format!("{}/collections/{}", self.api.endpoint(), self.collection);
        if self.api.is_emulated() {
            BackendTarget::emulated(QDRANT, endpoint)
        } else {
            BackendTarget::live(QDRANT, endpoint)
        }
    }

    async fn ensure_ready(&self) -> Result<()> {
        let path = self.path("");
        match self.raw_call(Method::GET, &path, None).await {
            Ok(_) => debug!(collection = %self.collection, "collection exists"),
            Err(RetryError::Failed(e)) if e.is_not_found() => {
                let body = json!({ "vectors": { "size": self.dimension, "distance": "Cosine" } });
                self.raw_call(Method::PUT, &path, Some(body))
                    .await
                    .map_err(|e| self.provisioning(self.adapter_error(e)))?;
                info!(collection = %self.collection, dimension = self.dimension, "created collection");
            }
            Err(e) => return Err(self.provisioning(self.adapter_error(e))),
        }
        for (field, schema) in &self.payload_indexes {
            let body = json!({ "field_name": field, "field_schema": schema });
            self.raw_call(Method::PUT, &self.path("/index?wait=true"), Some(body))
                .await
                .map_err(|e| self.provisioning(self.adapter_error(e)))?;
        }
        Ok(())
    }

    async fn upsert(&self, items: &[VectorItem]) -> Result<()> {
        for chunk in items.chunks(UPSERT_CHUNK) {
            let points: Vec<Value> = chunk
                .iter()
                .map(|item| {
                    let mut payload = item.metadata.clone();
                    payload.insert(KEY_FIELD.to_string(), json!(item.id));
                    json!({ "id": point_id(&item.id), "vector": item.vector, "payload": payload })
                })
                .collect();
            self.call(Method::PUT, "/points?wait=true", Some(json!({ "points": points })))
                .await?;
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchHit>> {
        backend::check_filter(QDRANT, &self.capabilities(), filter)?;
        let mut body = json!({ "vector": vector, "limit": top_k, "with_payload": true });
        if let Some(f) = filter {
            body["filter"] = to_qdrant(f);
        }
        let result = self.call(Method::POST, "/points/search", Some(body)).await?;
        Ok(parse_hits(&result))
    }

    async fn get_by_id(&self, ids: &[String]) -> Result<BTreeMap<String, VectorItem>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let body = json!({ "ids": Self::ids(ids), "with_payload": true, "with_vector": true });
        let result = self.call(Method::POST, "/points", Some(body)).await?;
        Ok(result
            .as_array()
            .map(|points| {
                points
                    .iter()
                    .map(parse_point)
                    .map(|item| (item.id.clone(), item))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = json!({ "points": Self::ids(ids) });
        self.call(Method::POST, "/points/delete?wait=true", Some(body))
            .await?;
        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        match self.raw_call(Method::DELETE, &self.path(""), None).await {
            Ok(_) => {
                info!(collection = %self.collection, "deleted collection");
                Ok(())
            }
            Err(RetryError::Failed(e)) if e.is_not_found() => Ok(()),
            Err(e) => Err(self.adapter_error(e)),
        }
    }

    async fn count(&self) -> Result<usize> {
        let result = self
            .call(Method::POST, "/points/count", Some(json!({ "exact": true })))
            .await?;
        Ok(result["count"].as_u64().unwrap_or(0) as usize)
    }

    async fn update_metadata(&self, id: &str, patch: &Metadata) -> Result<()> {
        let body = json!({ "payload": patch, "points": [point_id(id)] });
        self.call(Method::POST, "/points/payload?wait=true", Some(body))
            .await?;
        Ok(())
    }

    async fn scroll(
        &self,
        filter: Option<&Filter>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<ScrollPage> {
        backend::check_filter(QDRANT, &self.capabilities(), filter)?;
        let mut body = json!({ "limit": limit, "with_payload": true, "with_vector": true });
        if let Some(f) = filter {
            body["filter"] = to_qdrant(f);
        }
        if let Some(offset) = cursor {
            body["offset"] = json!(offset);
        }
        let result = self.call(Method::POST, "/points/scroll", Some(body)).await?;
        let items = result["points"]
            .as_array()
            .map(|points| points.iter().map(parse_point).collect())
            .unwrap_or_default();
        let next_cursor = match &result["next_page_offset"] {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        };
        Ok(ScrollPage { items, next_cursor })
    }

    async fn recommend(
        &self,
        positive: &[String],
        negative: &[String],
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let body = json!({
            "positive": Self::ids(positive),
            "negative": Self::ids(negative),
            "limit": top_k,
            "with_payload": true,
        });
        let result = self.call(Method::POST, "/points/recommend", Some(body)).await?;
        Ok(parse_hits(&result))
    }

    async fn search_groups(
        &self,
        vector: &[f32],
        group_by: &str,
        group_size: usize,
        limit: usize,
    ) -> Result<Vec<HitGroup>> {
        let body = json!({
            "vector": vector,
            "group_by": group_by,
            "group_size": group_size,
            "limit": limit,
            "with_payload": true,
        });
        let result = self.call(Method::POST, "/points/search/groups", Some(body)).await?;
        Ok(result["groups"]
            .as_array()
            .map(|groups| {
                groups
                    .iter()
                    .map(|g| HitGroup {
                        key: g["id"].clone(),
                        hits: parse_hits(&g["hits"]),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_space(&self, space: &str, schema: &SpaceSchema) -> Result<()> {
        if schema.dense.is_empty() && schema.sparse.is_empty() {
            return Err(AdapterError::backend(QDRANT, format!("space {space} has no vectors")));
        }
        self.drop_space(space).await?;
        let vectors: serde_json::Map<String, Value> = schema
            .dense
            .iter()
            .map(|name| (name.clone(), json!({ "size": self.dimension, "distance": "Cosine" })))
            .collect();
        let sparse: serde_json::Map<String, Value> = schema
            .sparse
            .iter()
            .map(|name| (name.clone(), json!({})))
            .collect();
        let body = json!({ "vectors": vectors, "sparse_vectors": sparse });
        self.space_call(Method::PUT, space, "", Some(body)).await?;
        info!(space, dense = schema.dense.len(), sparse = schema.sparse.len(), "created space");
        Ok(())
    }

    async fn upsert_space(&self, space: &str, items: &[MultiVectorItem]) -> Result<()> {
        for chunk in items.chunks(UPSERT_CHUNK) {
            let points: Vec<Value> = chunk.iter().map(space_point).collect();
            self.space_call(
                Method::PUT,
                space,
                "/points?wait=true",
                Some(json!({ "points": points })),
            )
            .await?;
        }
        Ok(())
    }

    async fn query_space(
        &self,
        space: &str,
        query: &SpaceQuery,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let mut body = query_json(query, top_k);
        body["with_payload"] = json!(true);
        let result = self
            .space_call(Method::POST, space, "/points/query", Some(body))
            .await?;
        Ok(parse_hits(&result["points"]))
    }

    async fn drop_space(&self, space: &str) -> Result<()> {
        let path = self.space_path(space, "")?;
        match self.raw_call(Method::DELETE, &path, None).await {
            Ok(_) => {
                debug!(space, "dropped space");
                Ok(())
            }
            Err(RetryError::Failed(e)) if e.is_not_found() => Ok(()),
            Err(e) => Err(self.adapter_error(e)),
        }
    }
}

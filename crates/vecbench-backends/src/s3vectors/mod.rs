//! S3 Vectors adapter.
//!
//! The service enforces hard quotas per request; they are surfaced through
//! [`BackendAdapter::limits`] and checked here before anything is written, so
//! an oversized batch fails as a capacity error instead of a partial write.

pub mod api;
pub mod filter;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use vecbench_core::backend::{self, sort_hits, Result};
use vecbench_core::{
    AdapterError, BackendAdapter, BackendLimits, BackendTarget, CapabilitySet, Filter, Metadata, SearchHit,
    VectorItem, S3_VECTORS,
};

pub use api::{
    DistanceMetric, GetOutputVector, IndexSpec, ListVectorsPage, PutInputVector,
    QueryOutputVector, QueryVectorsRequest, S3Result, S3VectorsApi, S3VectorsError,
};
pub use filter::{to_s3, FilterError};

use crate::config::S3VectorsConfig;
use crate::retry::{with_backoff, RetryError, RetryPolicy};

pub const MAX_PUT_BATCH: usize = 500;
pub const MAX_GET_BATCH: usize = 100;
pub const MAX_DELETE_BATCH: usize = 500;
pub const MAX_TOP_K: usize = 100;
pub const MAX_METADATA_BYTES: usize = 40 * 1024;
pub const MAX_FILTERABLE_METADATA_BYTES: usize = 2 * 1024;

const LIST_PAGE: usize = 500;

/// Keys stored as non-filterable metadata by default.
pub fn default_non_filterable_keys() -> Vec<String> {
    vec!["description".to_string(), "location".to_string()]
}

/// Quotas as advertised to scenarios.
pub fn service_limits() -> BackendLimits {
    BackendLimits {
        max_upsert_batch: Some(MAX_PUT_BATCH),
        max_get_batch: Some(MAX_GET_BATCH),
        max_delete_batch: Some(MAX_DELETE_BATCH),
        max_top_k: Some(MAX_TOP_K),
        max_metadata_bytes: Some(MAX_METADATA_BYTES),
        max_filterable_metadata_bytes: Some(MAX_FILTERABLE_METADATA_BYTES),
    }
}

/// Serialized size of the metadata entries not listed in `non_filterable`.
pub fn filterable_bytes(metadata: &Metadata, non_filterable: &[String]) -> usize {
    let filterable: Metadata = metadata
        .iter()
        .filter(|(k, _)| !non_filterable.iter().any(|n| n == *k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    serde_json::to_vec(&filterable).map_or(0, |b| b.len())
}

pub struct S3VectorsAdapter {
    api: Arc<dyn S3VectorsApi>,
    bucket: String,
    index: String,
    dimension: usize,
    retry: RetryPolicy,
    non_filterable: Vec<String>,
}

impl S3VectorsAdapter {
    pub fn new(api: Arc<dyn S3VectorsApi>, bucket: &str, index: &str, dimension: usize) -> Self {
        Self {
            api,
            bucket: bucket.to_string(),
            index: index.to_string(),
            dimension,
            retry: RetryPolicy::default(),
            non_filterable: default_non_filterable_keys(),
        }
    }

    pub fn from_config(api: Arc<dyn S3VectorsApi>, config: &S3VectorsConfig, dimension: usize) -> Self {
        Self::new(api, &config.bucket, &config.index, dimension).with_retry(config.retry)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_non_filterable_keys(mut self, keys: Vec<String>) -> Self {
        self.non_filterable = keys;
        self
    }

    fn adapter_error(&self, err: RetryError<S3VectorsError>) -> AdapterError {
        match err {
            RetryError::Throttled { attempts } => AdapterError::RateLimited {
                backend: S3_VECTORS.to_string(),
                attempts,
            },
            RetryError::Failed(S3VectorsError::ServiceQuotaExceeded(reason))
            | RetryError::Failed(S3VectorsError::Validation(reason)) => {
                AdapterError::capacity(S3_VECTORS, reason)
            }
            RetryError::Failed(e) => AdapterError::backend(S3_VECTORS, e.to_string()),
        }
    }

    fn provisioning(&self, reason: impl std::fmt::Display) -> AdapterError {
        AdapterError::Provisioning {
            backend: S3_VECTORS.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Reject the whole batch if any item breaks a per-vector quota.
    fn validate(&self, items: &[VectorItem]) -> Result<()> {
        for item in items {
            if item.vector.len() != self.dimension {
                return Err(AdapterError::capacity(
                    S3_VECTORS,
                    format!(
                        "{}: dimension {} does not match index dimension {}",
                        item.id,
                        item.vector.len(),
                        self.dimension
                    ),
                ));
            }
            let total = item.metadata_bytes();
            if total > MAX_METADATA_BYTES {
                return Err(AdapterError::capacity(
                    S3_VECTORS,
                    format!("{}: metadata is {total} bytes, limit {MAX_METADATA_BYTES}", item.id),
                ));
            }
            let filterable = filterable_bytes(&item.metadata, &self.non_filterable);
            if filterable > MAX_FILTERABLE_METADATA_BYTES {
                return Err(AdapterError::capacity(
                    S3_VECTORS,
                    format!(
                        "{}: filterable metadata is {filterable} bytes, limit {MAX_FILTERABLE_METADATA_BYTES}",
                        item.id
                    ),
                ));
            }
        }
        Ok(())
    }

    fn ignore_conflict(&self, result: std::result::Result<(), RetryError<S3VectorsError>>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(RetryError::Failed(e)) if e.is_conflict() => Ok(()),
            Err(e) => Err(self.provisioning(self.adapter_error(e))),
        }
    }

    fn ignore_not_found(&self, result: std::result::Result<(), RetryError<S3VectorsError>>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(RetryError::Failed(e)) if e.is_not_found() => Ok(()),
            Err(e) => Err(self.adapter_error(e)),
        }
    }
}

fn hit_from(vector: QueryOutputVector) -> SearchHit {
    SearchHit {
        id: vector.key,
        // cosine distance is 1 - similarity
        score: 1.0 - vector.distance.unwrap_or(1.0),
        metadata: vector.metadata.unwrap_or_default(),
    }
}

#[async_trait]
impl BackendAdapter for S3VectorsAdapter {
    fn name(&self) -> &str {
        S3_VECTORS
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::core()
    }

    fn limits(&self) -> BackendLimits {
        service_limits()
    }

    fn target(&self) -> BackendTarget {
        let endpoint = format!("{}/{}/{}", self.api.endpoint(), self.bucket, self.index);
        if self.api.is_emulated() {
            BackendTarget::emulated(S3_VECTORS, endpoint)
        } else {
            BackendTarget::live(S3_VECTORS, endpoint)
        }
    }

    async fn ensure_ready(&self) -> Result<()> {
        let created = with_backoff(&self.retry, S3VectorsError::is_throttled, || {
            self.api.create_vector_bucket(&self.bucket)
        })
        .await;
        self.ignore_conflict(created)?;

        let spec = IndexSpec {
            dimension: self.dimension,
            distance_metric: DistanceMetric::Cosine,
            non_filterable_metadata_keys: self.non_filterable.clone(),
        };
        let created = with_backoff(&self.retry, S3VectorsError::is_throttled, || {
            self.api.create_index(&self.bucket, &self.index, &spec)
        })
        .await;
        self.ignore_conflict(created)?;
        info!(bucket = %self.bucket, index = %self.index, dimension = self.dimension, "index ready");
        Ok(())
    }

    async fn upsert(&self, items: &[VectorItem]) -> Result<()> {
        self.validate(items)?;
        for chunk in items.chunks(MAX_PUT_BATCH) {
            let vectors: Vec<PutInputVector> = chunk
                .iter()
                .map(|item| PutInputVector {
                    key: item.id.clone(),
                    data: item.vector.clone(),
                    metadata: item.metadata.clone(),
                })
                .collect();
            with_backoff(&self.retry, S3VectorsError::is_throttled, || {
                self.api.put_vectors(&self.bucket, &self.index, vectors.clone())
            })
            .await
            .map_err(|e| self.adapter_error(e))?;
            debug!(count = chunk.len(), "put vectors");
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchHit>> {
        if top_k > MAX_TOP_K {
            return Err(AdapterError::capacity(
                S3_VECTORS,
                format!("top_k {top_k} exceeds limit {MAX_TOP_K}"),
            ));
        }
        backend::check_filter(S3_VECTORS, &self.capabilities(), filter)?;
        let filter = filter
            .map(to_s3)
            .transpose()
            .map_err(|e| match e {
                FilterError::Unsupported(_) => AdapterError::unsupported(S3_VECTORS, e.to_string()),
                FilterError::Empty(_) => AdapterError::backend(S3_VECTORS, e.to_string()),
            })?;
        let request = QueryVectorsRequest {
            query_vector: vector.to_vec(),
            top_k,
            filter,
            return_metadata: true,
            return_distance: true,
        };
        let results = with_backoff(&self.retry, S3VectorsError::is_throttled, || {
            self.api.query_vectors(&self.bucket, &self.index, request.clone())
        })
        .await
        .map_err(|e| self.adapter_error(e))?;
        let mut hits: Vec<SearchHit> = results.into_iter().map(hit_from).collect();
        sort_hits(&mut hits);
        Ok(hits)
    }

    async fn get_by_id(&self, ids: &[String]) -> Result<BTreeMap<String, VectorItem>> {
        let mut found = BTreeMap::new();
        for chunk in ids.chunks(MAX_GET_BATCH) {
            let vectors = with_backoff(&self.retry, S3VectorsError::is_throttled, || {
                self.api.get_vectors(&self.bucket, &self.index, chunk, true, true)
            })
            .await
            .map_err(|e| self.adapter_error(e))?;
            for v in vectors {
                let item = VectorItem::new(
                    v.key.clone(),
                    v.data.unwrap_or_default(),
                    v.metadata.unwrap_or_default(),
                );
                found.insert(v.key, item);
            }
        }
        Ok(found)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        for chunk in ids.chunks(MAX_DELETE_BATCH) {
            with_backoff(&self.retry, S3VectorsError::is_throttled, || {
                self.api.delete_vectors(&self.bucket, &self.index, chunk)
            })
            .await
            .map_err(|e| self.adapter_error(e))?;
        }
        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        let index = with_backoff(&self.retry, S3VectorsError::is_throttled, || {
            self.api.delete_index(&self.bucket, &self.index)
        })
        .await;
        self.ignore_not_found(index)?;
        let bucket = with_backoff(&self.retry, S3VectorsError::is_throttled, || {
            self.api.delete_vector_bucket(&self.bucket)
        })
        .await;
        self.ignore_not_found(bucket)?;
        info!(bucket = %self.bucket, index = %self.index, "deleted index and bucket");
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let mut total = 0;
        let mut token: Option<String> = None;
        loop {
            let page = with_backoff(&self.retry, S3VectorsError::is_throttled, || {
                self.api
                    .list_vectors(&self.bucket, &self.index, LIST_PAGE, token.as_deref())
            })
            .await
            .map_err(|e| self.adapter_error(e))?;
            total += page.vectors.len();
            match page.next_token {
                Some(next) => token = Some(next),
                None => return Ok(total),
            }
        }
    }
}

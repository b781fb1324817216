//! In-process S3 Vectors emulator.
//!
//! Enforces the service's per-request quotas, evaluates `$`-operator filters
//! and can delay query visibility of fresh writes to mimic eventual
//! consistency.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use vecbench_core::backend::cosine;
use vecbench_core::backend::filter::value_matches;
use vecbench_core::Metadata;

use crate::s3vectors::{
    filterable_bytes, GetOutputVector, IndexSpec, ListVectorsPage, PutInputVector,
    QueryOutputVector, QueryVectorsRequest, S3Result, S3VectorsApi, S3VectorsError,
    MAX_DELETE_BATCH, MAX_FILTERABLE_METADATA_BYTES, MAX_GET_BATCH, MAX_METADATA_BYTES,
    MAX_PUT_BATCH, MAX_TOP_K,
};

const MAX_LIST_RESULTS: usize = 1_000;

#[derive(Debug, Clone)]
struct Stored {
    data: Vec<f32>,
    metadata: Metadata,
    visible_at: Instant,
}

#[derive(Debug)]
struct Index {
    spec: IndexSpec,
    vectors: BTreeMap<String, Stored>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, BTreeMap<String, Index>>,
    calls: usize,
    put_calls: usize,
    throttle_remaining: usize,
}

#[derive(Debug, Default)]
pub struct MemoryS3Vectors {
    state: Mutex<State>,
    visibility_delay: Duration,
}

impl MemoryS3Vectors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes become visible to `query_vectors` only after `delay`.
    pub fn with_visibility_delay(mut self, delay: Duration) -> Self {
        self.visibility_delay = delay;
        self
    }

    /// Answer the next `n` calls with `TooManyRequests`.
    pub fn throttle_next(&self, n: usize) {
        self.state.lock().unwrap().throttle_remaining = n;
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    /// Accepted `PutVectors` requests.
    pub fn put_call_count(&self) -> usize {
        self.state.lock().unwrap().put_calls
    }

    pub fn vector_count(&self, bucket: &str, index: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .buckets
            .get(bucket)
            .and_then(|b| b.get(index))
            .map_or(0, |i| i.vectors.len())
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.state.lock().unwrap().buckets.contains_key(bucket)
    }

    /// Count the call and consume one injected throttle, if any.
    fn admit(&self) -> S3Result<std::sync::MutexGuard<'_, State>> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if state.throttle_remaining > 0 {
            state.throttle_remaining -= 1;
            return Err(S3VectorsError::TooManyRequests);
        }
        Ok(state)
    }
}

fn index_mut<'a>(state: &'a mut State, bucket: &str, index: &str) -> S3Result<&'a mut Index> {
    state
        .buckets
        .get_mut(bucket)
        .ok_or_else(|| S3VectorsError::NotFound(format!("vector bucket {bucket}")))?
        .get_mut(index)
        .ok_or_else(|| S3VectorsError::NotFound(format!("index {index}")))
}

fn validation(reason: impl Into<String>) -> S3VectorsError {
    S3VectorsError::Validation(reason.into())
}

#[async_trait]
impl S3VectorsApi for MemoryS3Vectors {
    fn endpoint(&self) -> String {
        "memory://s3vectors".to_string()
    }

    fn is_emulated(&self) -> bool {
        true
    }

    async fn create_vector_bucket(&self, bucket: &str) -> S3Result<()> {
        let mut state = self.admit()?;
        if state.buckets.contains_key(bucket) {
            return Err(S3VectorsError::Conflict(format!("vector bucket {bucket} exists")));
        }
        state.buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn create_index(&self, bucket: &str, index: &str, spec: &IndexSpec) -> S3Result<()> {
        let mut state = self.admit()?;
        let indexes = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| S3VectorsError::NotFound(format!("vector bucket {bucket}")))?;
        if indexes.contains_key(index) {
            return Err(S3VectorsError::Conflict(format!("index {index} exists")));
        }
        indexes.insert(
            index.to_string(),
            Index {
                spec: spec.clone(),
                vectors: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_index(&self, bucket: &str, index: &str) -> S3Result<()> {
        let mut state = self.admit()?;
        state
            .buckets
            .get_mut(bucket)
            .and_then(|b| b.remove(index))
            .map(|_| ())
            .ok_or_else(|| S3VectorsError::NotFound(format!("index {index}")))
    }

    async fn delete_vector_bucket(&self, bucket: &str) -> S3Result<()> {
        let mut state = self.admit()?;
        let indexes = state
            .buckets
            .get(bucket)
            .ok_or_else(|| S3VectorsError::NotFound(format!("vector bucket {bucket}")))?;
        if !indexes.is_empty() {
            return Err(S3VectorsError::Conflict(format!("vector bucket {bucket} is not empty")));
        }
        state.buckets.remove(bucket);
        Ok(())
    }

    async fn put_vectors(
        &self,
        bucket: &str,
        index: &str,
        vectors: Vec<PutInputVector>,
    ) -> S3Result<()> {
        let mut state = self.admit()?;
        if vectors.len() > MAX_PUT_BATCH {
            return Err(validation(format!(
                "{} vectors in one request, limit {MAX_PUT_BATCH}",
                vectors.len()
            )));
        }
        let target = index_mut(&mut state, bucket, index)?;
        for v in &vectors {
            if v.data.len() != target.spec.dimension {
                return Err(validation(format!(
                    "{}: dimension {} does not match {}",
                    v.key,
                    v.data.len(),
                    target.spec.dimension
                )));
            }
            let total = serde_json::to_vec(&v.metadata).map_or(0, |b| b.len());
            if total > MAX_METADATA_BYTES {
                return Err(validation(format!("{}: metadata exceeds {MAX_METADATA_BYTES} bytes", v.key)));
            }
            let filterable = filterable_bytes(&v.metadata, &target.spec.non_filterable_metadata_keys);
            if filterable > MAX_FILTERABLE_METADATA_BYTES {
                return Err(validation(format!(
                    "{}: filterable metadata exceeds {MAX_FILTERABLE_METADATA_BYTES} bytes",
                    v.key
                )));
            }
        }
        let visible_at = Instant::now() + self.visibility_delay;
        for v in vectors {
            target.vectors.insert(
                v.key,
                Stored {
                    data: v.data,
                    metadata: v.metadata,
                    visible_at,
                },
            );
        }
        state.put_calls += 1;
        Ok(())
    }

    async fn get_vectors(
        &self,
        bucket: &str,
        index: &str,
        keys: &[String],
        return_data: bool,
        return_metadata: bool,
    ) -> S3Result<Vec<GetOutputVector>> {
        let mut state = self.admit()?;
        if keys.len() > MAX_GET_BATCH {
            return Err(validation(format!("{} keys in one request, limit {MAX_GET_BATCH}", keys.len())));
        }
        let target = index_mut(&mut state, bucket, index)?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                target.vectors.get(key).map(|s| GetOutputVector {
                    key: key.clone(),
                    data: return_data.then(|| s.data.clone()),
                    metadata: return_metadata.then(|| s.metadata.clone()),
                })
            })
            .collect())
    }

    async fn query_vectors(
        &self,
        bucket: &str,
        index: &str,
        request: QueryVectorsRequest,
    ) -> S3Result<Vec<QueryOutputVector>> {
        let mut state = self.admit()?;
        if request.top_k == 0 || request.top_k > MAX_TOP_K {
            return Err(validation(format!("topK must be between 1 and {MAX_TOP_K}")));
        }
        let target = index_mut(&mut state, bucket, index)?;
        if request.query_vector.len() != target.spec.dimension {
            return Err(validation("query vector dimension mismatch"));
        }
        if let Some(filter) = &request.filter {
            let mut fields = Vec::new();
            filter_fields(filter, &mut fields);
            if let Some(field) = fields
                .iter()
                .find(|f| target.spec.non_filterable_metadata_keys.contains(*f))
            {
                return Err(validation(format!("{field} is a non-filterable metadata key")));
            }
        }
        let now = Instant::now();
        let mut results: Vec<QueryOutputVector> = target
            .vectors
            .iter()
            .filter(|(_, s)| s.visible_at <= now)
            .filter(|(_, s)| {
                request
                    .filter
                    .as_ref()
                    .map_or(true, |f| matches_filter(f, &s.metadata))
            })
            .map(|(key, s)| QueryOutputVector {
                key: key.clone(),
                distance: Some(1.0 - cosine(&request.query_vector, &s.data)),
                metadata: request.return_metadata.then(|| s.metadata.clone()),
            })
            .collect();
        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        results.truncate(request.top_k);
        if !request.return_distance {
            for r in &mut results {
                r.distance = None;
            }
        }
        Ok(results)
    }

    async fn delete_vectors(&self, bucket: &str, index: &str, keys: &[String]) -> S3Result<()> {
        let mut state = self.admit()?;
        if keys.len() > MAX_DELETE_BATCH {
            return Err(validation(format!(
                "{} keys in one request, limit {MAX_DELETE_BATCH}",
                keys.len()
            )));
        }
        let target = index_mut(&mut state, bucket, index)?;
        for key in keys {
            target.vectors.remove(key);
        }
        Ok(())
    }

    async fn list_vectors(
        &self,
        bucket: &str,
        index: &str,
        max_results: usize,
        next_token: Option<&str>,
    ) -> S3Result<ListVectorsPage> {
        let mut state = self.admit()?;
        let target = index_mut(&mut state, bucket, index)?;
        let limit = max_results.clamp(1, MAX_LIST_RESULTS);
        let mut keys = target
            .vectors
            .keys()
            .filter(|k| next_token.map_or(true, |t| k.as_str() >= t));
        let vectors: Vec<GetOutputVector> = keys
            .by_ref()
            .take(limit)
            .map(|k| GetOutputVector {
                key: k.clone(),
                data: None,
                metadata: None,
            })
            .collect();
        Ok(ListVectorsPage {
            vectors,
            next_token: keys.next().cloned(),
        })
    }
}

fn filter_fields(filter: &Value, out: &mut Vec<String>) {
    let Some(obj) = filter.as_object() else {
        return;
    };
    for (key, value) in obj {
        match key.as_str() {
            "$and" | "$or" => {
                for f in value.as_array().into_iter().flatten() {
                    filter_fields(f, out);
                }
            }
            field => out.push(field.to_string()),
        }
    }
}

fn matches_filter(filter: &Value, metadata: &Metadata) -> bool {
    let Some(obj) = filter.as_object() else {
        return false;
    };
    obj.iter().all(|(key, value)| {
        let clauses = || value.as_array().into_iter().flatten();
        match key.as_str() {
            "$and" => clauses().all(|f| matches_filter(f, metadata)),
            "$or" => clauses().any(|f| matches_filter(f, metadata)),
            field => match value.as_object() {
                Some(ops) => ops
                    .iter()
                    .all(|(op, operand)| matches_op(metadata.get(field), op, operand)),
                None => matches_op(metadata.get(field), "$eq", value),
            },
        }
    })
}

fn matches_op(actual: Option<&Value>, op: &str, operand: &Value) -> bool {
    let number = || actual.and_then(Value::as_f64).zip(operand.as_f64());
    let any_of = |values: &Value| {
        actual.is_some_and(|a| {
            values
                .as_array()
                .is_some_and(|vs| vs.iter().any(|v| value_matches(a, v)))
        })
    };
    match op {
        "$eq" => actual.is_some_and(|a| value_matches(a, operand)),
        "$ne" => !actual.is_some_and(|a| value_matches(a, operand)),
        "$gt" => number().is_some_and(|(a, b)| a > b),
        "$gte" => number().is_some_and(|(a, b)| a >= b),
        "$lt" => number().is_some_and(|(a, b)| a < b),
        "$lte" => number().is_some_and(|(a, b)| a <= b),
        "$in" => any_of(operand),
        "$nin" => !any_of(operand),
        "$exists" => actual.is_some() == operand.as_bool().unwrap_or(true),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3vectors::DistanceMetric;
    use serde_json::json;

    fn spec(dimension: usize) -> IndexSpec {
        IndexSpec {
            dimension,
            distance_metric: DistanceMetric::Cosine,
            non_filterable_metadata_keys: vec!["description".into()],
        }
    }

    fn put(key: &str, data: Vec<f32>, metadata: Value) -> PutInputVector {
        PutInputVector {
            key: key.into(),
            data,
            metadata: metadata.as_object().cloned().unwrap(),
        }
    }

    async fn seeded() -> MemoryS3Vectors {
        let s3 = MemoryS3Vectors::new();
        s3.create_vector_bucket("b").await.unwrap();
        s3.create_index("b", "i", &spec(2)).await.unwrap();
        s3.put_vectors(
            "b",
            "i",
            vec![
                put("a", vec![1.0, 0.0], json!({ "genre": "Drama", "year": 2001 })),
                put("b", vec![0.0, 1.0], json!({ "genre": "Sci-Fi", "year": 2014 })),
            ],
        )
        .await
        .unwrap();
        s3
    }

    #[test]
    fn operator_filters() {
        let m = json!({ "genre": "Drama", "year": 2010 }).as_object().cloned().unwrap();
        assert!(matches_filter(&json!({ "genre": "Drama" }), &m));
        assert!(matches_filter(&json!({ "year": { "$gte": 2000, "$lt": 2011 } }), &m));
        assert!(matches_filter(
            &json!({ "$or": [{ "genre": { "$eq": "Comedy" } }, { "year": { "$in": [2010] } }] }),
            &m
        ));
        assert!(!matches_filter(&json!({ "genre": { "$nin": ["Drama"] } }), &m));
        assert!(matches_filter(&json!({ "director": { "$ne": "Nolan" } }), &m));
    }

    #[tokio::test]
    async fn query_orders_by_distance() {
        let s3 = seeded().await;
        let hits = s3
            .query_vectors(
                "b",
                "i",
                QueryVectorsRequest {
                    query_vector: vec![1.0, 0.1],
                    top_k: 2,
                    filter: None,
                    return_metadata: true,
                    return_distance: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(hits[0].key, "a");
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn quotas_are_enforced() {
        let s3 = seeded().await;
        let keys: Vec<String> = (0..101).map(|i| format!("k{i}")).collect();
        assert!(matches!(
            s3.get_vectors("b", "i", &keys, false, false).await,
            Err(S3VectorsError::Validation(_))
        ));
        let request = QueryVectorsRequest {
            query_vector: vec![1.0, 0.0],
            top_k: 101,
            filter: None,
            return_metadata: false,
            return_distance: true,
        };
        assert!(s3.query_vectors("b", "i", request).await.is_err());
        let big = put("c", vec![1.0, 1.0], json!({ "genre": "x".repeat(3_000) }));
        assert!(s3.put_vectors("b", "i", vec![big]).await.is_err());
        assert_eq!(s3.vector_count("b", "i"), 2);
    }

    #[tokio::test]
    async fn non_filterable_keys_reject_filters() {
        let s3 = seeded().await;
        let request = QueryVectorsRequest {
            query_vector: vec![1.0, 0.0],
            top_k: 1,
            filter: Some(json!({ "description": { "$eq": "x" } })),
            return_metadata: false,
            return_distance: true,
        };
        assert!(matches!(
            s3.query_vectors("b", "i", request).await,
            Err(S3VectorsError::Validation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn writes_become_visible_after_delay() {
        let s3 = MemoryS3Vectors::new().with_visibility_delay(Duration::from_secs(2));
        s3.create_vector_bucket("b").await.unwrap();
        s3.create_index("b", "i", &spec(2)).await.unwrap();
        s3.put_vectors("b", "i", vec![put("a", vec![1.0, 0.0], json!({}))])
            .await
            .unwrap();
        let request = QueryVectorsRequest {
            query_vector: vec![1.0, 0.0],
            top_k: 1,
            filter: None,
            return_metadata: false,
            return_distance: true,
        };
        assert!(s3.query_vectors("b", "i", request.clone()).await.unwrap().is_empty());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(s3.query_vectors("b", "i", request).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_pages_through_keys() {
        let s3 = seeded().await;
        let first = s3.list_vectors("b", "i", 1, None).await.unwrap();
        assert_eq!(first.vectors[0].key, "a");
        let token = first.next_token.unwrap();
        let second = s3.list_vectors("b", "i", 1, Some(&token)).await.unwrap();
        assert_eq!(second.vectors[0].key, "b");
        assert!(second.next_token.is_none());
    }
}

//! In-process stand-in for the Qdrant REST API.
//!
//! Routes the subset of endpoints [`crate::QdrantAdapter`] uses and evaluates
//! Qdrant filter JSON against stored payloads. Collections are either a single
//! unnamed vector or a set of named dense and sparse vectors.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use vecbench_core::backend::cosine;
use vecbench_core::backend::filter::{geo_point, haversine_m, value_matches};
use vecbench_core::{Metadata, SparseVector};

use crate::qdrant::{QdrantApi, QdrantApiError};

/// Reciprocal rank fusion constant, applied to 0-based ranks.
const RRF_K: f32 = 2.0;

#[derive(Debug, Clone, Default)]
struct Point {
    vector: Vec<f32>,
    named: BTreeMap<String, Vec<f32>>,
    sparse: BTreeMap<String, SparseVector>,
    payload: Metadata,
}

#[derive(Debug, Default)]
struct Collection {
    dimension: usize,
    named: BTreeMap<String, usize>,
    sparse: BTreeSet<String>,
    points: BTreeMap<String, Point>,
    indexes: BTreeSet<String>,
}

impl Collection {
    fn from_config(body: &Value) -> Self {
        let vectors = &body["vectors"];
        let mut collection = Collection::default();
        match vectors["size"].as_u64() {
            Some(size) => collection.dimension = size as usize,
            None => {
                for (name, config) in vectors.as_object().into_iter().flatten() {
                    let size = config["size"].as_u64().unwrap_or(0) as usize;
                    collection.named.insert(name.clone(), size);
                }
            }
        }
        collection.sparse = body["sparse_vectors"]
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        collection
    }

    fn is_multi_vector(&self) -> bool {
        !self.named.is_empty() || !self.sparse.is_empty()
    }

    fn parse_point(&self, p: &Value) -> Result<Point, QdrantApiError> {
        let payload = p["payload"].as_object().cloned().unwrap_or_default();
        if !self.is_multi_vector() {
            let vector = parse_vector(&p["vector"]);
            check_dimension(self.dimension, vector.len())?;
            return Ok(Point {
                vector,
                payload,
                ..Point::default()
            });
        }
        let mut point = Point {
            payload,
            ..Point::default()
        };
        let vectors = p["vector"]
            .as_object()
            .ok_or_else(|| bad_request("collection expects named vectors"))?;
        for (name, value) in vectors {
            if let Some(dimension) = self.named.get(name) {
                let vector = parse_vector(value);
                check_dimension(*dimension, vector.len())?;
                point.named.insert(name.clone(), vector);
            } else if self.sparse.contains(name) {
                let sparse: SparseVector = serde_json::from_value(value.clone())
                    .map_err(|e| bad_request(format!("bad sparse vector {name}: {e}")))?;
                if sparse.indices.len() != sparse.values.len() {
                    return Err(bad_request(format!("sparse vector {name}: length mismatch")));
                }
                point.sparse.insert(name.clone(), sparse);
            } else {
                return Err(bad_request(format!("Not existing vector name error: {name}")));
            }
        }
        Ok(point)
    }
}

fn check_dimension(expected: usize, got: usize) -> Result<(), QdrantApiError> {
    if expected != got {
        return Err(bad_request(format!(
            "wrong vector dimension: expected {expected}, got {got}"
        )));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, Collection>,
    calls: Vec<(Method, String)>,
    throttle_remaining: usize,
}

type ApiResult = Result<Value, QdrantApiError>;

#[derive(Debug, Default)]
pub struct MemoryQdrant {
    state: Mutex<State>,
}

impl MemoryQdrant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next `n` calls with HTTP 429.
    pub fn throttle_next(&self, n: usize) {
        self.state.lock().unwrap().throttle_remaining = n;
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// Calls whose path (without query string) ends with `suffix`.
    pub fn calls_to(&self, method: Method, suffix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(m, p)| *m == method && p.ends_with(suffix))
            .count()
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.state.lock().unwrap().collections.contains_key(name)
    }

    pub fn point_count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(collection)
            .map_or(0, |c| c.points.len())
    }

    pub fn indexed_fields(&self, collection: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(collection)
            .map(|c| c.indexes.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QdrantApi for MemoryQdrant {
    fn endpoint(&self) -> String {
        "memory://qdrant".to_string()
    }

    fn is_emulated(&self) -> bool {
        true
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> ApiResult {
        let mut state = self.state.lock().unwrap();
        let route = path.split('?').next().unwrap_or(path).to_string();
        state.calls.push((method.clone(), route.clone()));
        if state.throttle_remaining > 0 {
            state.throttle_remaining -= 1;
            return Err(QdrantApiError::status(429, "too many requests"));
        }

        let rest = route
            .strip_prefix("/collections/")
            .ok_or_else(|| QdrantApiError::status(404, format!("no route {route}")))?;
        let (name, suffix) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };
        let body = body.unwrap_or(Value::Null);

        match (method, suffix) {
            (Method::GET, "") => match state.collections.get(name) {
                Some(c) => Ok(json!({ "status": "green", "points_count": c.points.len() })),
                None => Err(not_found(name)),
            },
            (Method::PUT, "") => {
                if state.collections.contains_key(name) {
                    return Err(QdrantApiError::status(409, format!("collection {name} exists")));
                }
                state
                    .collections
                    .insert(name.to_string(), Collection::from_config(&body));
                Ok(json!(true))
            }
            (Method::DELETE, "") => match state.collections.remove(name) {
                Some(_) => Ok(json!(true)),
                None => Err(not_found(name)),
            },
            (method, suffix) => {
                let collection = state.collections.get_mut(name).ok_or_else(|| not_found(name))?;
                route_points(collection, method, suffix, &body)
            }
        }
    }
}

fn not_found(name: &str) -> QdrantApiError {
    QdrantApiError::status(404, format!("Collection `{name}` doesn't exist!"))
}

fn bad_request(reason: impl Into<String>) -> QdrantApiError {
    QdrantApiError::status(400, reason)
}

fn route_points(collection: &mut Collection, method: Method, suffix: &str, body: &Value) -> ApiResult {
    match (method, suffix) {
        (Method::PUT, "/index") => {
            let field = body["field_name"].as_str().unwrap_or_default();
            collection.indexes.insert(field.to_string());
            Ok(json!({ "status": "acknowledged" }))
        }
        (Method::PUT, "/points") => {
            let points = body["points"].as_array().cloned().unwrap_or_default();
            let parsed = points
                .iter()
                .map(|p| Ok((id_string(&p["id"]), collection.parse_point(p)?)))
                .collect::<Result<Vec<_>, QdrantApiError>>()?;
            collection.points.extend(parsed);
            Ok(json!({ "status": "completed" }))
        }
        (Method::POST, "/points") => {
            let points: Vec<Value> = ids(&body["ids"])
                .iter()
                .filter_map(|id| {
                    collection.points.get(id).map(|p| {
                        json!({ "id": id, "payload": p.payload, "vector": p.vector })
                    })
                })
                .collect();
            Ok(json!(points))
        }
        (Method::POST, "/points/delete") => {
            for id in ids(&body["points"]) {
                collection.points.remove(&id);
            }
            Ok(json!({ "status": "completed" }))
        }
        (Method::POST, "/points/count") => {
            let count = collection
                .points
                .values()
                .filter(|p| passes(&body["filter"], &p.payload))
                .count();
            Ok(json!({ "count": count }))
        }
        (Method::POST, "/points/payload") => {
            let patch = body["payload"].as_object().cloned().unwrap_or_default();
            for id in ids(&body["points"]) {
                if let Some(point) = collection.points.get_mut(&id) {
                    point.payload.extend(patch.clone());
                }
            }
            Ok(json!({ "status": "completed" }))
        }
        (Method::POST, "/points/search") => {
            let vector = parse_vector(&body["vector"]);
            let limit = body["limit"].as_u64().unwrap_or(10) as usize;
            let scored = rank(collection, &vector, &body["filter"], &BTreeSet::new());
            Ok(json!(scored.into_iter().take(limit).map(hit_json).collect::<Vec<_>>()))
        }
        (Method::POST, "/points/scroll") => {
            let limit = body["limit"].as_u64().unwrap_or(10) as usize;
            let offset = body.get("offset").filter(|o| !o.is_null()).map(id_string);
            let mut matching = collection
                .points
                .iter()
                .filter(|(id, _)| offset.as_ref().map_or(true, |o| id.as_str() >= o.as_str()))
                .filter(|(_, p)| passes(&body["filter"], &p.payload));
            let page: Vec<Value> = matching
                .by_ref()
                .take(limit)
                .map(|(id, p)| json!({ "id": id, "payload": p.payload, "vector": p.vector }))
                .collect();
            let next = matching.next().map(|(id, _)| json!(id)).unwrap_or(Value::Null);
            Ok(json!({ "points": page, "next_page_offset": next }))
        }
        (Method::POST, "/points/recommend") => {
            let positive = ids(&body["positive"]);
            let negative = ids(&body["negative"]);
            let limit = body["limit"].as_u64().unwrap_or(10) as usize;
            let mut target = vec![0.0f32; collection.dimension];
            for (group, sign) in [(&positive, 1.0f32), (&negative, -1.0f32)] {
                for id in group {
                    let point = collection
                        .points
                        .get(id)
                        .ok_or_else(|| bad_request(format!("no point with id {id}")))?;
                    for (t, x) in target.iter_mut().zip(&point.vector) {
                        *t += sign * x;
                    }
                }
            }
            let exclude: BTreeSet<String> = positive.into_iter().chain(negative).collect();
            let scored = rank(collection, &target, &body["filter"], &exclude);
            Ok(json!(scored.into_iter().take(limit).map(hit_json).collect::<Vec<_>>()))
        }
        (Method::POST, "/points/search/groups") => {
            let vector = parse_vector(&body["vector"]);
            let group_by = body["group_by"].as_str().unwrap_or_default();
            let group_size = body["group_size"].as_u64().unwrap_or(1) as usize;
            let limit = body["limit"].as_u64().unwrap_or(10) as usize;
            let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
            for hit in rank(collection, &vector, &body["filter"], &BTreeSet::new()) {
                let Some(key) = hit.2.get(group_by).cloned() else {
                    continue;
                };
                match groups.iter().position(|(k, _)| *k == key) {
                    Some(i) => {
                        if groups[i].1.len() < group_size {
                            groups[i].1.push(hit_json(hit));
                        }
                    }
                    None => {
                        if groups.len() < limit {
                            groups.push((key, vec![hit_json(hit)]));
                        }
                    }
                }
            }
            let groups: Vec<Value> = groups
                .into_iter()
                .map(|(id, hits)| json!({ "id": id, "hits": hits }))
                .collect();
            Ok(json!({ "groups": groups }))
        }
        (Method::POST, "/points/query") => {
            let points = query(collection, body)?;
            Ok(json!({ "points": points.into_iter().map(hit_json).collect::<Vec<_>>() }))
        }
        (method, suffix) => Err(QdrantApiError::status(404, format!("no route {method} {suffix}"))),
    }
}

type Scored = (String, f32, Metadata);

/// Query API: a dense or sparse lookup, or an RRF fusion of prefetches.
fn query(collection: &Collection, body: &Value) -> Result<Vec<Scored>, QdrantApiError> {
    let limit = body["limit"].as_u64().unwrap_or(10) as usize;
    let filter = &body["filter"];
    let mut scored = if let Some(prefetch) = body["prefetch"].as_array() {
        if body["query"]["fusion"] != json!("rrf") {
            return Err(bad_request("only rrf fusion is supported"));
        }
        let branches = prefetch
            .iter()
            .map(|p| query(collection, p))
            .collect::<Result<Vec<_>, _>>()?;
        fuse(&branches)
    } else {
        let using = body["using"].as_str();
        let q = &body["query"];
        if q.is_array() {
            let vector = parse_vector(q);
            match using {
                Some(name) => {
                    let dimension = collection
                        .named
                        .get(name)
                        .ok_or_else(|| bad_request(format!("Not existing vector name error: {name}")))?;
                    check_dimension(*dimension, vector.len())?;
                    rank_by(collection, filter, &BTreeSet::new(), |p| {
                        p.named.get(name).map(|v| cosine(&vector, v))
                    })
                }
                None => rank(collection, &vector, filter, &BTreeSet::new()),
            }
        } else {
            let name = using.ok_or_else(|| bad_request("sparse query needs a vector name"))?;
            if !collection.sparse.contains(name) {
                return Err(bad_request(format!("Not existing vector name error: {name}")));
            }
            let vector: SparseVector = serde_json::from_value(q.clone())
                .map_err(|e| bad_request(format!("bad query: {e}")))?;
            rank_by(collection, filter, &BTreeSet::new(), |p| {
                p.sparse
                    .get(name)
                    .map(|v| v.dot(&vector))
                    .filter(|score| *score > 0.0)
            })
        }
    };
    scored.truncate(limit);
    Ok(scored)
}

/// Sum of 1 / (k + rank) over the branches a point appears in.
fn fuse(branches: &[Vec<Scored>]) -> Vec<Scored> {
    let mut fused: BTreeMap<String, (f32, Metadata)> = BTreeMap::new();
    for branch in branches {
        for (rank, (id, _, payload)) in branch.iter().enumerate() {
            let entry = fused.entry(id.clone()).or_insert((0.0, payload.clone()));
            entry.0 += 1.0 / (RRF_K + rank as f32);
        }
    }
    let mut scored: Vec<Scored> = fused
        .into_iter()
        .map(|(id, (score, payload))| (id, score, payload))
        .collect();
    sort_scored(&mut scored);
    scored
}

/// Matching points scored by cosine similarity, best first.
fn rank(
    collection: &Collection,
    vector: &[f32],
    filter: &Value,
    exclude: &BTreeSet<String>,
) -> Vec<Scored> {
    rank_by(collection, filter, exclude, |p| Some(cosine(vector, &p.vector)))
}

/// Points `score` accepts, best first.
fn rank_by(
    collection: &Collection,
    filter: &Value,
    exclude: &BTreeSet<String>,
    score: impl Fn(&Point) -> Option<f32>,
) -> Vec<Scored> {
    let mut scored: Vec<Scored> = collection
        .points
        .iter()
        .filter(|(id, p)| !exclude.contains(*id) && passes(filter, &p.payload))
        .filter_map(|(id, p)| score(p).map(|s| (id.clone(), s, p.payload.clone())))
        .collect();
    sort_scored(&mut scored);
    scored
}

fn sort_scored(scored: &mut [Scored]) {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}

fn hit_json((id, score, payload): Scored) -> Value {
    json!({ "id": id, "score": score, "payload": payload })
}

fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|xs| xs.iter().map(id_string).collect())
        .unwrap_or_default()
}

fn parse_vector(value: &Value) -> Vec<f32> {
    value
        .as_array()
        .map(|xs| xs.iter().filter_map(Value::as_f64).map(|x| x as f32).collect())
        .unwrap_or_default()
}

/// A missing (null) filter passes everything.
fn passes(filter: &Value, payload: &Metadata) -> bool {
    filter.is_null() || matches_filter(filter, payload)
}

fn matches_filter(filter: &Value, payload: &Metadata) -> bool {
    let clauses = |name: &str| filter[name].as_array().cloned().unwrap_or_default();
    let must = clauses("must");
    let should = clauses("should");
    let must_not = clauses("must_not");
    must.iter().all(|c| matches_condition(c, payload))
        && (should.is_empty() || should.iter().any(|c| matches_condition(c, payload)))
        && !must_not.iter().any(|c| matches_condition(c, payload))
}

fn matches_condition(condition: &Value, payload: &Metadata) -> bool {
    let Some(key) = condition["key"].as_str() else {
        return matches_filter(condition, payload);
    };
    let Some(actual) = payload.get(key) else {
        return false;
    };
    if let Some(m) = condition.get("match") {
        if let Some(expected) = m.get("value") {
            return value_matches(actual, expected);
        }
        if let Some(any) = m["any"].as_array() {
            return any.iter().any(|v| value_matches(actual, v));
        }
        if let Some(except) = m["except"].as_array() {
            return !except.iter().any(|v| value_matches(actual, v));
        }
        if let Some(text) = m["text"].as_str() {
            let haystack = actual.as_str().unwrap_or_default().to_lowercase();
            return text
                .split_whitespace()
                .all(|word| haystack.contains(&word.to_lowercase()));
        }
        return false;
    }
    if let Some(range) = condition.get("range") {
        let Some(x) = actual.as_f64() else {
            return false;
        };
        let bound = |name: &str| range[name].as_f64();
        return bound("gt").map_or(true, |b| x > b)
            && bound("gte").map_or(true, |b| x >= b)
            && bound("lt").map_or(true, |b| x < b)
            && bound("lte").map_or(true, |b| x <= b);
    }
    if let Some(geo) = condition.get("geo_radius") {
        let (Some((lat, lon)), Some((clat, clon)), Some(radius)) = (
            geo_point(actual),
            geo_point(&geo["center"]),
            geo["radius"].as_f64(),
        ) else {
            return false;
        };
        return haversine_m(clat, clon, lat, lon) <= radius;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn filter_clauses_combine() {
        let p = payload(json!({ "genre": "Drama", "year": 2014, "language": "English" }));
        let f = json!({
            "must": [{ "key": "genre", "match": { "value": "Drama" } }],
            "should": [
                { "key": "year", "range": { "gte": 2010 } },
                { "key": "language", "match": { "value": "French" } }
            ],
            "must_not": [{ "key": "language", "match": { "any": ["Korean"] } }]
        });
        assert!(matches_filter(&f, &p));
        let f = json!({ "must_not": [{ "key": "genre", "match": { "value": "Drama" } }] });
        assert!(!matches_filter(&f, &p));
    }

    #[test]
    fn text_and_geo_conditions() {
        let p = payload(json!({
            "description": "A robot learns to love",
            "location": { "lat": 48.85, "lon": 2.35 }
        }));
        let text = json!({ "must": [{ "key": "description", "match": { "text": "Robot love" } }] });
        assert!(matches_filter(&text, &p));
        let near = json!({ "must": [{
            "key": "location",
            "geo_radius": { "center": { "lat": 48.8566, "lon": 2.3522 }, "radius": 10_000.0 }
        }] });
        assert!(matches_filter(&near, &p));
    }

    #[test]
    fn fusion_rewards_agreement_between_branches() {
        let hit = |id: &str| (id.to_string(), 0.0, Metadata::new());
        let fused = fuse(&[vec![hit("a"), hit("b")], vec![hit("b"), hit("c")]]);
        let order: Vec<&str> = fused.iter().map(|h| h.0.as_str()).collect();
        assert_eq!(order, ["b", "a", "c"]);
        assert!((fused[0].1 - (1.0 / 3.0 + 1.0 / 2.0)).abs() < 1e-6);
        assert!((fused[1].1 - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn named_collections_check_vector_names() {
        let q = MemoryQdrant::new();
        let config = json!({
            "vectors": { "title": { "size": 2, "distance": "Cosine" } },
            "sparse_vectors": { "words": {} }
        });
        q.call(Method::PUT, "/collections/n", Some(config)).await.unwrap();
        let good = json!({ "points": [{
            "id": "p1",
            "vector": { "title": [1.0, 0.0], "words": { "indices": [7], "values": [1.0] } },
            "payload": {}
        }] });
        q.call(Method::PUT, "/collections/n/points", Some(good)).await.unwrap();
        let bad = json!({ "points": [{ "id": "p2", "vector": { "plot": [1.0, 0.0] }, "payload": {} }] });
        let err = q.call(Method::PUT, "/collections/n/points", Some(bad)).await.unwrap_err();
        assert!(err.to_string().contains("Not existing vector name"));

        let sparse = json!({ "query": { "indices": [7], "values": [2.0] }, "using": "words" });
        let result = q.call(Method::POST, "/collections/n/points/query", Some(sparse)).await.unwrap();
        assert_eq!(result["points"][0]["score"], json!(2.0));
        let miss = json!({ "query": { "indices": [8], "values": [1.0] }, "using": "words" });
        let result = q.call(Method::POST, "/collections/n/points/query", Some(miss)).await.unwrap();
        assert_eq!(result["points"], json!([]));
    }

    #[tokio::test]
    async fn unknown_collection_is_404() {
        let q = MemoryQdrant::new();
        let err = q.call(Method::GET, "/collections/nope", None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn throttling_is_injected() {
        let q = MemoryQdrant::new();
        q.throttle_next(1);
        let err = q.call(Method::GET, "/collections/c", None).await.unwrap_err();
        assert!(err.is_throttled());
        let err = q.call(Method::GET, "/collections/c", None).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(q.call_count(), 2);
    }
}

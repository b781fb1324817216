use std::sync::Arc;

use reqwest::Method;
use serde_json::json;
use vecbench_backends::qdrant::KEY_FIELD;
use vecbench_backends::{
    MemoryQdrant, MemoryS3Vectors, QdrantAdapter, RetryPolicy, S3VectorsAdapter,
};
use vecbench_core::{
    AdapterError, BackendAdapter, Capability, Filter, Metadata, MultiVectorItem, SpaceQuery,
    SpaceSchema, SparseVector, VectorItem,
};

const DIM: usize = 4;

fn metadata(value: serde_json::Value) -> Metadata {
    value.as_object().cloned().unwrap()
}

fn item(id: &str, vector: [f32; DIM], genre: &str, year: i64) -> VectorItem {
    VectorItem::new(
        id,
        vector.to_vec(),
        metadata(json!({ "genre": genre, "year": year, "description": format!("{id} story") })),
    )
}

fn bulk(n: usize) -> Vec<VectorItem> {
    (0..n)
        .map(|i| {
            let x = i as f32 + 1.0;
            item(&format!("bulk_{i:04}"), [x, 1.0, 0.5, 0.25], "Bulk", 2000)
        })
        .collect()
}

fn s3(service: &Arc<MemoryS3Vectors>) -> S3VectorsAdapter {
    S3VectorsAdapter::new(service.clone(), "bucket", "index", DIM).with_retry(RetryPolicy::none())
}

fn qdrant(service: &Arc<MemoryQdrant>) -> QdrantAdapter {
    QdrantAdapter::new(service.clone(), "movies", DIM).with_retry(RetryPolicy::none())
}

// ---------------------------------------------------------------------------
// S3 Vectors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s3_bulk_upsert_is_split_into_service_sized_requests() {
    let service = Arc::new(MemoryS3Vectors::new());
    let adapter = s3(&service);
    adapter.ensure_ready().await.unwrap();

    adapter.upsert(&bulk(1200)).await.unwrap();

    assert_eq!(service.put_call_count(), 3);
    assert_eq!(service.vector_count("bucket", "index"), 1200);
    assert_eq!(adapter.count().await.unwrap(), 1200);
}

#[tokio::test]
async fn s3_provisioning_and_upsert_are_idempotent() {
    let service = Arc::new(MemoryS3Vectors::new());
    let adapter = s3(&service);
    adapter.ensure_ready().await.unwrap();
    adapter.ensure_ready().await.unwrap();

    let movie = item("mov_01", [1.0, 0.0, 0.0, 0.0], "Drama", 1994);
    adapter.upsert(&[movie.clone()]).await.unwrap();
    adapter.upsert(&[movie]).await.unwrap();

    assert_eq!(service.vector_count("bucket", "index"), 1);
}

#[tokio::test]
async fn s3_text_filter_is_unsupported_without_a_service_call() {
    let service = Arc::new(MemoryS3Vectors::new());
    let adapter = s3(&service);
    adapter.ensure_ready().await.unwrap();
    let before = service.call_count();

    let err = adapter
        .search(&[1.0, 0.0, 0.0, 0.0], 5, Some(&Filter::text("description", "story")))
        .await
        .unwrap_err();

    assert!(err.is_unsupported());
    assert!(!adapter.capabilities().contains(Capability::FullTextFilter));
    assert_eq!(service.call_count(), before);
}

#[tokio::test]
async fn s3_empty_filters_never_reach_the_service() {
    let service = Arc::new(MemoryS3Vectors::new());
    let adapter = s3(&service);
    adapter.ensure_ready().await.unwrap();
    let before = service.call_count();

    for filter in [
        Filter::or([]),
        Filter::and([Filter::eq("genre", "Drama"), Filter::and([])]),
        Filter::Range {
            field: "year".to_string(),
            gt: None,
            gte: None,
            lt: None,
            lte: None,
        },
    ] {
        let err = adapter
            .search(&[1.0, 0.0, 0.0, 0.0], 5, Some(&filter))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Backend { .. }), "{err}");
    }
    assert_eq!(service.call_count(), before);
}

#[tokio::test]
async fn s3_top_k_above_quota_is_a_capacity_error() {
    let service = Arc::new(MemoryS3Vectors::new());
    let adapter = s3(&service);
    adapter.ensure_ready().await.unwrap();

    let err = adapter.search(&[1.0, 0.0, 0.0, 0.0], 101, None).await.unwrap_err();
    assert!(matches!(err, AdapterError::Capacity { .. }));

    assert!(adapter.search(&[1.0, 0.0, 0.0, 0.0], 100, None).await.is_ok());
}

#[tokio::test]
async fn s3_oversized_filterable_metadata_is_rejected_before_writing() {
    let service = Arc::new(MemoryS3Vectors::new());
    let adapter = s3(&service);
    adapter.ensure_ready().await.unwrap();

    let fine = item("mov_01", [1.0, 0.0, 0.0, 0.0], "Drama", 1994);
    let oversized = VectorItem::new(
        "mov_02",
        vec![0.0, 1.0, 0.0, 0.0],
        metadata(json!({ "genre": "x".repeat(3 * 1024) })),
    );
    let err = adapter.upsert(&[fine, oversized]).await.unwrap_err();

    assert!(matches!(err, AdapterError::Capacity { .. }));
    assert_eq!(service.put_call_count(), 0);
    assert_eq!(service.vector_count("bucket", "index"), 0);
}

#[tokio::test]
async fn s3_large_non_filterable_description_is_accepted() {
    let service = Arc::new(MemoryS3Vectors::new());
    let adapter = s3(&service);
    adapter.ensure_ready().await.unwrap();

    let long = VectorItem::new(
        "mov_01",
        vec![1.0, 0.0, 0.0, 0.0],
        metadata(json!({ "genre": "Drama", "description": "y".repeat(10 * 1024) })),
    );
    adapter.upsert(&[long]).await.unwrap();
    assert_eq!(service.vector_count("bucket", "index"), 1);
}

#[tokio::test]
async fn s3_scores_are_similarities_best_first() {
    let service = Arc::new(MemoryS3Vectors::new());
    let adapter = s3(&service);
    adapter.ensure_ready().await.unwrap();
    adapter
        .upsert(&[
            item("near", [1.0, 0.0, 0.0, 0.0], "Drama", 2001),
            item("far", [0.0, 1.0, 0.0, 0.0], "Drama", 2002),
        ])
        .await
        .unwrap();

    let hits = adapter.search(&[1.0, 0.0, 0.0, 0.0], 2, None).await.unwrap();

    assert_eq!(hits[0].id, "near");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert!(hits[0].score > hits[1].score);
}

#[tokio::test]
async fn s3_filters_and_negations_reach_the_service() {
    let service = Arc::new(MemoryS3Vectors::new());
    let adapter = s3(&service);
    adapter.ensure_ready().await.unwrap();
    adapter
        .upsert(&[
            item("a", [1.0, 0.0, 0.0, 0.0], "Drama", 1994),
            item("b", [0.9, 0.1, 0.0, 0.0], "Sci-Fi", 2014),
            item("c", [0.8, 0.2, 0.0, 0.0], "Sci-Fi", 1999),
        ])
        .await
        .unwrap();

    let query = [1.0, 0.0, 0.0, 0.0];
    let sci_fi = Filter::and([Filter::eq("genre", "Sci-Fi"), Filter::gte("year", 2000.0)]);
    let hits = adapter.search(&query, 10, Some(&sci_fi)).await.unwrap();
    assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), ["b"]);

    let not_drama = Filter::not(Filter::eq("genre", "Drama"));
    let hits = adapter.search(&query, 10, Some(&not_drama)).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.id != "a"));
}

#[tokio::test]
async fn s3_get_and_delete_chunk_large_key_sets() {
    let service = Arc::new(MemoryS3Vectors::new());
    let adapter = s3(&service);
    adapter.ensure_ready().await.unwrap();
    let items = bulk(250);
    adapter.upsert(&items).await.unwrap();
    let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();

    let found = adapter.get_by_id(&ids).await.unwrap();
    assert_eq!(found.len(), 250);
    assert_eq!(found["bulk_0007"].vector.len(), DIM);

    adapter.delete(&ids).await.unwrap();
    adapter.delete(&ids).await.unwrap();
    assert_eq!(service.vector_count("bucket", "index"), 0);
}

#[tokio::test]
async fn s3_teardown_tolerates_missing_resources() {
    let service = Arc::new(MemoryS3Vectors::new());
    let adapter = s3(&service);
    adapter.ensure_ready().await.unwrap();

    adapter.teardown().await.unwrap();
    assert!(!service.has_bucket("bucket"));
    adapter.teardown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn s3_throttling_is_retried_with_backoff() {
    let service = Arc::new(MemoryS3Vectors::new());
    let adapter = S3VectorsAdapter::new(service.clone(), "bucket", "index", DIM);
    adapter.ensure_ready().await.unwrap();

    service.throttle_next(2);
    adapter
        .upsert(&[item("mov_01", [1.0, 0.0, 0.0, 0.0], "Drama", 1994)])
        .await
        .unwrap();
    assert_eq!(service.vector_count("bucket", "index"), 1);

    let impatient = s3(&service);
    service.throttle_next(1);
    let err = impatient.count().await.unwrap_err();
    assert!(matches!(err, AdapterError::RateLimited { attempts: 1, .. }));
}

#[tokio::test]
async fn s3_is_reported_as_emulated_and_has_no_spaces() {
    let service = Arc::new(MemoryS3Vectors::new());
    let adapter = s3(&service);

    let target = adapter.target();
    assert!(target.emulated);
    assert_eq!(target.endpoint, "memory://s3vectors/bucket/index");

    assert!(!adapter.capabilities().contains(Capability::HybridSearch));
    assert!(!adapter.capabilities().contains(Capability::NamedVectors));
    let schema = SpaceSchema::new().dense("title");
    let err = adapter.create_space("named", &schema).await.unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(service.call_count(), 0);
}

// ---------------------------------------------------------------------------
// Qdrant
// ---------------------------------------------------------------------------

#[tokio::test]
async fn qdrant_provisioning_creates_collection_and_indexes_once() {
    let service = Arc::new(MemoryQdrant::new());
    let adapter = qdrant(&service);

    adapter.ensure_ready().await.unwrap();
    adapter.ensure_ready().await.unwrap();

    assert!(service.has_collection("movies"));
    assert_eq!(service.calls_to(Method::PUT, "/collections/movies"), 1);
    let indexed = service.indexed_fields("movies");
    assert!(indexed.contains(&"description".to_string()));
    assert!(indexed.contains(&"location".to_string()));
}

#[tokio::test]
async fn qdrant_round_trip_preserves_string_keys() {
    let service = Arc::new(MemoryQdrant::new());
    let adapter = qdrant(&service);
    adapter.ensure_ready().await.unwrap();
    adapter
        .upsert(&[
            item("mov_01", [1.0, 0.0, 0.0, 0.0], "Drama", 1994),
            item("mov_02", [0.0, 1.0, 0.0, 0.0], "Sci-Fi", 2014),
        ])
        .await
        .unwrap();

    let hits = adapter.search(&[1.0, 0.1, 0.0, 0.0], 2, None).await.unwrap();
    assert_eq!(hits[0].id, "mov_01");
    assert!(!hits[0].metadata.contains_key(KEY_FIELD));

    let found = adapter
        .get_by_id(&["mov_02".to_string(), "missing".to_string()])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found["mov_02"].metadata["genre"], json!("Sci-Fi"));

    adapter.delete(&["mov_01".to_string()]).await.unwrap();
    assert_eq!(adapter.count().await.unwrap(), 1);
}

#[tokio::test]
async fn qdrant_text_and_range_filters_are_translated() {
    let service = Arc::new(MemoryQdrant::new());
    let adapter = qdrant(&service);
    adapter.ensure_ready().await.unwrap();
    adapter
        .upsert(&[
            item("mov_01", [1.0, 0.0, 0.0, 0.0], "Drama", 1994),
            item("mov_02", [0.9, 0.1, 0.0, 0.0], "Sci-Fi", 2014),
        ])
        .await
        .unwrap();

    let query = [1.0, 0.0, 0.0, 0.0];
    let hits = adapter
        .search(&query, 5, Some(&Filter::text("description", "mov_02")))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "mov_02");

    let hits = adapter
        .search(&query, 5, Some(&Filter::not(Filter::gte("year", 2000.0))))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "mov_01");
}

#[tokio::test]
async fn qdrant_bulk_upsert_uses_thousand_point_requests() {
    let service = Arc::new(MemoryQdrant::new());
    let adapter = qdrant(&service);
    adapter.ensure_ready().await.unwrap();

    adapter.upsert(&bulk(1200)).await.unwrap();

    assert_eq!(service.calls_to(Method::PUT, "/points"), 2);
    assert_eq!(service.point_count("movies"), 1200);
}

#[tokio::test]
async fn qdrant_payload_update_keeps_vector() {
    let service = Arc::new(MemoryQdrant::new());
    let adapter = qdrant(&service);
    adapter.ensure_ready().await.unwrap();
    adapter
        .upsert(&[item("mov_01", [1.0, 0.0, 0.0, 0.0], "Drama", 1994)])
        .await
        .unwrap();

    adapter
        .update_metadata("mov_01", &metadata(json!({ "rating": 9.1 })))
        .await
        .unwrap();

    let found = adapter.get_by_id(&["mov_01".to_string()]).await.unwrap();
    let movie = &found["mov_01"];
    assert_eq!(movie.metadata["rating"], json!(9.1));
    assert_eq!(movie.metadata["genre"], json!("Drama"));
    assert_eq!(movie.vector, vec![1.0, 0.0, 0.0, 0.0]);
}

#[tokio::test]
async fn qdrant_scroll_visits_every_match_once() {
    let service = Arc::new(MemoryQdrant::new());
    let adapter = qdrant(&service);
    adapter.ensure_ready().await.unwrap();
    adapter.upsert(&bulk(7)).await.unwrap();

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = adapter
            .scroll(Some(&Filter::eq("genre", "Bulk")), 3, cursor.as_deref())
            .await
            .unwrap();
        seen.extend(page.items.into_iter().map(|i| i.id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 7);
}

#[tokio::test]
async fn qdrant_recommend_excludes_examples() {
    let service = Arc::new(MemoryQdrant::new());
    let adapter = qdrant(&service);
    adapter.ensure_ready().await.unwrap();
    adapter
        .upsert(&[
            item("a", [1.0, 0.0, 0.0, 0.0], "Drama", 2001),
            item("b", [0.9, 0.1, 0.0, 0.0], "Drama", 2002),
            item("c", [0.0, 0.0, 1.0, 0.0], "Horror", 2003),
        ])
        .await
        .unwrap();

    let hits = adapter
        .recommend(&["a".to_string()], &["c".to_string()], 5)
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "b");
}

#[tokio::test]
async fn qdrant_groups_by_payload_field() {
    let service = Arc::new(MemoryQdrant::new());
    let adapter = qdrant(&service);
    adapter.ensure_ready().await.unwrap();
    adapter
        .upsert(&[
            item("a", [1.0, 0.0, 0.0, 0.0], "Drama", 2001),
            item("b", [0.9, 0.1, 0.0, 0.0], "Drama", 2002),
            item("c", [0.8, 0.2, 0.0, 0.0], "Sci-Fi", 2003),
        ])
        .await
        .unwrap();

    let groups = adapter
        .search_groups(&[1.0, 0.0, 0.0, 0.0], "genre", 1, 5)
        .await
        .unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].key, json!("Drama"));
    assert_eq!(groups[0].hits.len(), 1);
    assert_eq!(groups[0].hits[0].id, "a");
}

#[tokio::test]
async fn qdrant_teardown_of_missing_collection_is_ok() {
    let service = Arc::new(MemoryQdrant::new());
    let adapter = qdrant(&service);
    adapter.teardown().await.unwrap();
    adapter.ensure_ready().await.unwrap();
    adapter.teardown().await.unwrap();
    assert!(!service.has_collection("movies"));
}

#[tokio::test(start_paused = true)]
async fn qdrant_rate_limits_are_retried_then_surfaced() {
    let service = Arc::new(MemoryQdrant::new());
    let patient = QdrantAdapter::new(service.clone(), "movies", DIM);
    service.throttle_next(3);
    patient.ensure_ready().await.unwrap();
    assert!(service.has_collection("movies"));

    let impatient = qdrant(&service);
    service.throttle_next(1);
    let err = impatient.count().await.unwrap_err();
    assert!(matches!(err, AdapterError::RateLimited { .. }));
}

#[tokio::test]
async fn qdrant_target_names_the_collection() {
    let service = Arc::new(MemoryQdrant::new());
    let target = qdrant(&service).target();
    assert_eq!(target.backend, "qdrant");
    assert_eq!(target.endpoint, "memory://qdrant/collections/movies");
    assert!(target.emulated);
}

fn hybrid_item(id: &str, dense: [f32; DIM], words: &str) -> MultiVectorItem {
    MultiVectorItem::new(id, metadata(json!({ "words": words })))
        .with_dense("dense", dense.to_vec())
        .with_sparse("sparse", SparseVector::bag_of_words(words))
}

#[tokio::test]
async fn qdrant_hybrid_space_fuses_dense_and_sparse_ranks() {
    let service = Arc::new(MemoryQdrant::new());
    let adapter = qdrant(&service);
    let schema = SpaceSchema::new().dense("dense").sparse("sparse");
    adapter.create_space("hybrid", &schema).await.unwrap();
    adapter
        .upsert_space(
            "hybrid",
            &[
                hybrid_item("a", [1.0, 0.0, 0.0, 0.0], "space robots"),
                hybrid_item("b", [0.9, 0.1, 0.0, 0.0], "romance paris"),
                hybrid_item("c", [0.0, 1.0, 0.0, 0.0], "space robots adventure"),
            ],
        )
        .await
        .unwrap();

    let dense = SpaceQuery::dense("dense", vec![1.0, 0.0, 0.0, 0.0]);
    let sparse = SpaceQuery::sparse("sparse", SparseVector::bag_of_words("space robots adventure"));

    let hits = adapter.query_space("hybrid", &sparse, 10).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, ["c", "a"]);
    assert_eq!(hits[0].metadata["words"], json!("space robots adventure"));

    // a: 1/2 + 1/3, c: 1/4 + 1/2, b: 1/3
    let fused = SpaceQuery::fusion([dense, sparse], 10);
    let hits = adapter.query_space("hybrid", &fused, 2).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, ["a", "c"]);
    assert!(hits[0].score > hits[1].score);

    adapter.drop_space("hybrid").await.unwrap();
    assert!(!service.has_collection("hybrid"));
    adapter.drop_space("hybrid").await.unwrap();
}

#[tokio::test]
async fn qdrant_named_space_queries_by_vector_name() {
    let service = Arc::new(MemoryQdrant::new());
    let adapter = qdrant(&service);
    let schema = SpaceSchema::new().dense("title").dense("description");
    adapter.create_space("named", &schema).await.unwrap();
    let points = [
        MultiVectorItem::new("m1", Metadata::new())
            .with_dense("title", vec![1.0, 0.0, 0.0, 0.0])
            .with_dense("description", vec![0.0, 1.0, 0.0, 0.0]),
        MultiVectorItem::new("m2", Metadata::new())
            .with_dense("title", vec![0.0, 1.0, 0.0, 0.0])
            .with_dense("description", vec![1.0, 0.0, 0.0, 0.0]),
    ];
    adapter.upsert_space("named", &points).await.unwrap();

    let axis = vec![1.0, 0.0, 0.0, 0.0];
    let by_title = SpaceQuery::dense("title", axis.clone());
    let by_description = SpaceQuery::dense("description", axis);
    assert_eq!(adapter.query_space("named", &by_title, 1).await.unwrap()[0].id, "m1");
    assert_eq!(adapter.query_space("named", &by_description, 1).await.unwrap()[0].id, "m2");

    let unknown = MultiVectorItem::new("m3", Metadata::new()).with_dense("plot", vec![1.0; DIM]);
    let err = adapter.upsert_space("named", &[unknown]).await.unwrap_err();
    assert!(matches!(err, AdapterError::Backend { .. }), "{err}");

    // Re-creating starts from an empty space.
    adapter.create_space("named", &schema).await.unwrap();
    assert!(adapter.query_space("named", &by_title, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn qdrant_spaces_never_touch_the_shared_collection() {
    let service = Arc::new(MemoryQdrant::new());
    let adapter = qdrant(&service);
    adapter.ensure_ready().await.unwrap();
    adapter
        .upsert(&[item("mov_01", [1.0, 0.0, 0.0, 0.0], "Drama", 1994)])
        .await
        .unwrap();

    let schema = SpaceSchema::new().dense("title");
    let err = adapter.create_space("movies", &schema).await.unwrap_err();
    assert!(matches!(err, AdapterError::Backend { .. }));
    assert!(adapter.drop_space("movies").await.is_err());
    assert_eq!(service.point_count("movies"), 1);
}

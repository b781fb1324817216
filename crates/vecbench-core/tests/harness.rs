use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use vecbench_core::embedding;
use vecbench_core::fakes::MemoryAdapter;
use vecbench_core::{
    BackendAdapter, BackendLimits, Capability, CapabilitySet, Category, CleanupPolicy,
    EmbeddingCache, EmbeddingError, EmbeddingModel, Filter, Fixture, HarnessContext,
    HarnessOrchestrator, HashingEmbedder, MemoryEmbeddingStore, NullSink, Scenario,
    ScenarioRegistry, Selection, Sink, Status, VectorItem, QDRANT, S3_VECTORS,
};

fn cache() -> Arc<EmbeddingCache> {
    Arc::new(EmbeddingCache::new(
        Arc::new(HashingEmbedder::new(16)),
        Arc::new(MemoryEmbeddingStore::new()),
    ))
}

fn full(name: &str) -> Arc<MemoryAdapter> {
    Arc::new(MemoryAdapter::new(name))
}

fn basic(name: &str) -> Arc<MemoryAdapter> {
    Arc::new(MemoryAdapter::with_capabilities(name, CapabilitySet::core()))
}

fn context(adapters: Vec<Arc<MemoryAdapter>>) -> HarnessContext {
    let adapters: Vec<Arc<dyn BackendAdapter>> = adapters
        .into_iter()
        .map(|a| a as Arc<dyn BackendAdapter>)
        .collect();
    HarnessContext::new(adapters, cache(), Arc::new(NullSink))
}

fn search_scenario(id: u32) -> Scenario {
    Scenario::new(id, format!("search {id}"), Category::Common, |ctx| async move {
        let query = ctx.embed("space adventure").await?;
        let hits = ctx.adapter().search(&query, 3, None).await?;
        ctx.emit(format!("{} hits", hits.len()));
        Ok(())
    })
    .requires([Capability::Search])
}

fn registry(scenarios: impl IntoIterator<Item = Scenario>) -> ScenarioRegistry {
    let mut registry = ScenarioRegistry::new();
    for s in scenarios {
        registry.register(s).unwrap();
    }
    registry
}

#[tokio::test]
async fn range_one_to_one_runs_only_the_first_scenario() {
    let orchestrator = HarnessOrchestrator::new(
        registry((1..=3).map(search_scenario)),
        context(vec![full(QDRANT)]),
    );
    let report = orchestrator.run(&"1-1".parse().unwrap()).await.unwrap();
    assert_eq!(report.total, 1);
    assert_eq!(report.entries[0].scenario.id, 1);
    assert_eq!(report.status_of(1), Some(Status::Passed));
}

#[tokio::test]
async fn report_records_where_each_backend_ran() {
    let orchestrator = HarnessOrchestrator::new(
        registry([search_scenario(1)]),
        context(vec![full(QDRANT), basic(S3_VECTORS)]),
    );
    let report = orchestrator.run(&Selection::All).await.unwrap();
    let backends: Vec<_> = report.backends.iter().map(|t| t.backend.as_str()).collect();
    assert_eq!(backends, [QDRANT, S3_VECTORS]);
    assert_eq!(report.emulated_backends(), [QDRANT, S3_VECTORS]);
    assert!(report.render_text().contains("[EMULATED]"));
}

#[tokio::test]
async fn failing_scenario_does_not_affect_neighbours() {
    let failing = Scenario::new(2, "fails", Category::Common, |ctx| async move {
        ctx.emit("about to fail");
        anyhow::bail!("assertion failed: expected 5 hits");
    });
    let orchestrator = HarnessOrchestrator::new(
        registry([search_scenario(1), failing, search_scenario(3)]),
        context(vec![full(QDRANT)]),
    );
    let report = orchestrator.run(&Selection::All).await.unwrap();

    assert_eq!(report.status_of(1), Some(Status::Passed));
    assert_eq!(report.status_of(2), Some(Status::Failed));
    assert_eq!(report.status_of(3), Some(Status::Passed));
    let failed = &report.entries[1].outcome;
    assert!(failed.transcript.iter().any(|l| l == "about to fail"));
    assert!(failed.error_detail.as_deref().unwrap().contains("expected 5 hits"));
    assert!(report.aborted.is_none());
}

#[tokio::test]
async fn unsupported_filter_fails_only_the_limited_backend() {
    let text_filter = Scenario::new(15, "full-text", Category::Common, |ctx| async move {
        let query = ctx.embed("robot").await?;
        let filter = Filter::text("description", "robot");
        ctx.adapter().search(&query, 5, Some(&filter)).await?;
        Ok(())
    });
    let orchestrator = HarnessOrchestrator::new(
        registry([text_filter]),
        context(vec![full(QDRANT), basic(S3_VECTORS)]),
    );
    let report = orchestrator.run(&Selection::All).await.unwrap();
    let outcome = &report.entries[0].outcome;

    assert_eq!(outcome.backend(QDRANT).unwrap().status, Status::Passed);
    let s3 = outcome.backend(S3_VECTORS).unwrap();
    assert_eq!(s3.status, Status::Failed);
    assert!(s3.detail.as_deref().unwrap().contains("not supported:"));
}

#[tokio::test]
async fn capability_gate_skips_without_backend_calls() {
    let s3 = basic(S3_VECTORS);
    let scroll = Scenario::new(14, "scroll", Category::Common, |ctx| async move {
        ctx.adapter().scroll(None, 5, None).await?;
        Ok(())
    })
    .requires([Capability::Scroll]);
    let qdrant_only = Scenario::new(19, "zero setup", Category::backend_only(QDRANT), |_ctx| async {
        Ok(())
    });
    let orchestrator = HarnessOrchestrator::new(registry([scroll, qdrant_only]), context(vec![s3.clone()]));

    let calls_before = s3.call_count();
    let report = orchestrator.run(&Selection::All).await.unwrap();
    assert_eq!(report.skipped, 2);
    // only provisioning touched the adapter
    assert_eq!(s3.call_count(), calls_before + 1);
}

#[tokio::test]
async fn two_runs_produce_identical_statuses() {
    let mutating = Scenario::new(11, "delete and restore", Category::Common, |ctx| async move {
        let vector = ctx.embed("victim").await?;
        let item = VectorItem::new("victim", vector, Default::default());
        ctx.adapter().upsert(std::slice::from_ref(&item)).await?;
        ctx.adapter().delete(&[item.id.clone()]).await?;
        anyhow::ensure!(ctx.adapter().get_by_id(&[item.id.clone()]).await?.is_empty());
        ctx.adapter().upsert(&[item]).await?;
        Ok(())
    });
    let orchestrator = HarnessOrchestrator::new(
        registry([search_scenario(1), mutating, search_scenario(12)]),
        context(vec![full(QDRANT), basic(S3_VECTORS)]),
    );

    let first = orchestrator.run(&Selection::All).await.unwrap();
    let second = orchestrator.run(&Selection::All).await.unwrap();
    let statuses = |r: &vecbench_core::Report| {
        r.entries
            .iter()
            .map(|e| (e.scenario.id, e.outcome.status))
            .collect::<Vec<_>>()
    };
    assert_eq!(statuses(&first), statuses(&second));
}

#[tokio::test]
async fn unknown_ids_are_warnings_not_errors() {
    let orchestrator = HarnessOrchestrator::new(registry([search_scenario(1)]), context(vec![full(QDRANT)]));
    let report = orchestrator.run(&"1,42".parse().unwrap()).await.unwrap();
    assert_eq!(report.total, 1);
    assert_eq!(report.warnings, ["unknown scenario id 42"]);
    assert!(report.succeeded());
}

#[tokio::test]
async fn provisioning_failure_isolates_backend() {
    let bad = Arc::new(MemoryAdapter::new(S3_VECTORS).failing_provisioning());
    let orchestrator = HarnessOrchestrator::new(
        registry([search_scenario(1)]),
        context(vec![full(QDRANT), bad]),
    );
    let report = orchestrator.run(&Selection::All).await.unwrap();
    let outcome = &report.entries[0].outcome;
    assert_eq!(outcome.backend(QDRANT).unwrap().status, Status::Passed);
    assert_eq!(outcome.backend(S3_VECTORS).unwrap().status, Status::Failed);
}

struct OfflineModel;

#[async_trait]
impl EmbeddingModel for OfflineModel {
    fn model_id(&self) -> &str {
        "offline"
    }

    fn dimension(&self) -> usize {
        4
    }

    async fn generate(&self, _texts: &[String]) -> embedding::Result<Vec<Vec<f32>>> {
        Err(EmbeddingError::Generation("connection refused".into()))
    }
}

#[tokio::test]
async fn embedding_failure_inside_a_scenario_aborts_the_run() {
    let embeddings = Arc::new(EmbeddingCache::new(
        Arc::new(OfflineModel),
        Arc::new(MemoryEmbeddingStore::new()),
    ));
    let ctx = HarnessContext::new(vec![full(QDRANT) as Arc<dyn BackendAdapter>], embeddings, Arc::new(NullSink));
    let orchestrator = HarnessOrchestrator::new(registry((1..=3).map(search_scenario)), ctx);

    let report = orchestrator.run(&Selection::All).await.unwrap();
    assert_eq!(report.total, 1, "run stops after the fatal scenario");
    assert_eq!(report.status_of(1), Some(Status::Failed));
    assert!(report.aborted.as_deref().unwrap().contains("connection refused"));
    assert!(!report.succeeded());
}

struct SeedFixture;

#[async_trait]
impl Fixture for SeedFixture {
    async fn prepare(
        &self,
        adapter: &dyn BackendAdapter,
        embeddings: &EmbeddingCache,
        sink: &dyn Sink,
    ) -> anyhow::Result<()> {
        let vectors = embeddings
            .embed_batch(&[("m1", "space"), ("m2", "love")])
            .await
            .context("embedding dataset")?;
        let items: Vec<VectorItem> = vectors
            .into_iter()
            .map(|(id, v)| VectorItem::new(id, v, Default::default()))
            .collect();
        adapter.upsert(&items).await?;
        sink.write_line(&format!("seeded {} items into {}", items.len(), adapter.name()));
        Ok(())
    }
}

#[tokio::test]
async fn fixture_seeds_every_ready_adapter() {
    let q = full(QDRANT);
    let s3 = basic(S3_VECTORS);
    let orchestrator = HarnessOrchestrator::new(registry([search_scenario(1)]), context(vec![q.clone(), s3.clone()]))
        .with_fixture(Arc::new(SeedFixture));
    let report = orchestrator.run(&Selection::All).await.unwrap();
    assert!(report.succeeded());
    assert_eq!(q.len(), 2);
    assert_eq!(s3.len(), 2);
}

#[tokio::test]
async fn fixture_embedding_failure_aborts_before_any_scenario() {
    let ctx = HarnessContext::new(
        vec![full(QDRANT) as Arc<dyn BackendAdapter>],
        Arc::new(EmbeddingCache::new(Arc::new(OfflineModel), Arc::new(MemoryEmbeddingStore::new()))),
        Arc::new(NullSink),
    );
    let orchestrator = HarnessOrchestrator::new(registry([search_scenario(1)]), ctx)
        .with_fixture(Arc::new(SeedFixture));
    let report = orchestrator.run(&Selection::All).await.unwrap();
    assert_eq!(report.total, 0);
    assert!(report.aborted.is_some());
}

#[tokio::test]
async fn cleanup_policy_controls_teardown() {
    let failing = Scenario::new(2, "fails", Category::Common, |_ctx| async move {
        anyhow::bail!("nope")
    });

    let q = full(QDRANT);
    HarnessOrchestrator::new(registry([search_scenario(1), failing.clone()]), context(vec![q.clone()]))
        .with_cleanup(CleanupPolicy::CleanupOnSuccess)
        .run(&Selection::All)
        .await
        .unwrap();
    assert!(q.is_ready(), "failed run keeps resources");

    HarnessOrchestrator::new(registry([search_scenario(1), failing]), context(vec![q.clone()]))
        .with_cleanup(CleanupPolicy::AlwaysCleanup)
        .run(&Selection::All)
        .await
        .unwrap();
    assert!(!q.is_ready());
}

#[tokio::test]
async fn batch_limit_splits_one_logical_upsert() {
    let limited = Arc::new(MemoryAdapter::new(S3_VECTORS).with_limits(BackendLimits {
        max_upsert_batch: Some(500),
        ..BackendLimits::default()
    }));
    let bulk = Scenario::new(24, "bulk", Category::Limits, |ctx| async move {
        let items: Vec<VectorItem> = (0..1200)
            .map(|i| VectorItem::new(format!("bulk_{i:04}"), vec![1.0, 0.0], Default::default()))
            .collect();
        ctx.adapter().upsert(&items).await?;
        Ok(())
    });
    let report = HarnessOrchestrator::new(registry([bulk]), context(vec![limited.clone()]))
        .run(&Selection::All)
        .await
        .unwrap();
    assert!(report.succeeded());
    assert_eq!(limited.upsert_batch_count(), 3);
    assert_eq!(report.entries[0].outcome.backends[0].backend_calls, 1);
}

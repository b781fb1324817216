//! Operational properties and hard limits (ids 19-25).

use std::time::Duration;

use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::debug;
use vecbench_core::{
    AdapterError, BackendLimits, Capability, Category, Metadata, Scenario, ScenarioContext,
    VectorItem, QDRANT, S3_VECTORS,
};

use super::{emit_hits, title};

const CONSISTENCY_SENTINEL: &str = "consistency_sentinel";
const CONSISTENCY_TEXT: &str = "CONSISTENCY_TEST_MOVIE_XYZ";
/// Waits between visibility checks after the immediate one.
const CONSISTENCY_RETRIES: [u64; 3] = [1, 2, 3];

const BATCH_ITEMS: usize = 1200;
const BATCH_READBACK: usize = 250;
const SCALE_SENTINEL: &str = "scale_sentinel";

pub(super) fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new(19, "Zero-setup provisioning", Category::Common, provisioning),
        Scenario::new(20, "Authentication model", Category::Common, auth_notes),
        Scenario::new(
            21,
            "Bedrock Knowledge Bases integration",
            Category::backend_only(S3_VECTORS),
            bedrock_notes,
        ),
        Scenario::new(22, "Top-k limit", Category::Limits, top_k_limit)
            .requires([Capability::Search]),
        Scenario::new(23, "Read-after-write consistency", Category::Common, consistency)
            .requires([Capability::Insert, Capability::Search, Capability::Delete]),
        Scenario::new(24, "Batch size limits", Category::Limits, batch_limits)
            .requires([Capability::Insert, Capability::GetById, Capability::Delete]),
        Scenario::new(25, "Scale constraints", Category::Limits, scale_constraints)
            .requires([Capability::Insert, Capability::GetById, Capability::Delete]),
    ]
}

fn limit(value: Option<usize>) -> String {
    value.map_or_else(|| "no hard limit".to_string(), |n| n.to_string())
}

fn emit_limits(ctx: &ScenarioContext, limits: &BackendLimits) {
    let rows = [
        ("upsert batch", limits.max_upsert_batch),
        ("get batch", limits.max_get_batch),
        ("delete batch", limits.max_delete_batch),
        ("top-k per query", limits.max_top_k),
        ("metadata bytes", limits.max_metadata_bytes),
        ("filterable metadata bytes", limits.max_filterable_metadata_bytes),
    ];
    for (name, value) in rows {
        ctx.emit(format!("  {name:<26} {}", limit(value)));
    }
}

async fn provisioning(ctx: ScenarioContext) -> anyhow::Result<()> {
    let started = Instant::now();
    ctx.adapter().ensure_ready().await?;
    let elapsed = started.elapsed();
    ctx.emit(format!(
        "  ensure_ready on an existing index took {}ms",
        elapsed.as_millis()
    ));
    let notes: &[&str] = match ctx.backend() {
        QDRANT => &[
            "  Qdrant: run a server (docker compose), manage volumes, backups and scaling",
            "  Qdrant: TLS and API keys are configured by the operator",
        ],
        S3_VECTORS => &[
            "  S3 Vectors: two API calls (create bucket, create index), nothing to host",
            "  S3 Vectors: storage, availability and scaling are managed by AWS",
        ],
        _ => &["  no provisioning notes for this backend"],
    };
    for note in notes {
        ctx.emit(note);
    }
    Ok(())
}

async fn auth_notes(ctx: ScenarioContext) -> anyhow::Result<()> {
    let notes: &[&str] = match ctx.backend() {
        QDRANT => &[
            "  optional all-or-nothing API key, off by default",
            "  TLS, network rules, audit logging and encryption at rest are external",
        ],
        S3_VECTORS => &[
            "  AWS IAM policies with per-bucket and per-index permissions",
            "  VPC endpoints, SSE encryption at rest and CloudTrail audit logging",
            "  uses the ambient AWS credentials, no keys to manage",
        ],
        _ => &["  no authentication notes for this backend"],
    };
    for note in notes {
        ctx.emit(note);
    }
    Ok(())
}

async fn bedrock_notes(ctx: ScenarioContext) -> anyhow::Result<()> {
    for note in [
        "  Bedrock Knowledge Bases: chunking, embedding and storage into S3 Vectors are managed",
        "  s3vectors-embed CLI embeds and queries in one command",
        "  Lambda, CloudWatch, CloudTrail, IAM and VPC endpoints integrate natively",
    ] {
        ctx.emit(note);
    }
    Ok(())
}

async fn top_k_limit(ctx: ScenarioContext) -> anyhow::Result<()> {
    let vector = ctx.embed("popular movies").await?;
    let Some(max) = ctx.adapter().limits().max_top_k else {
        let hits = ctx.adapter().search(&vector, 200, None).await?;
        ctx.emit(format!("  top_k=200 -> {} results (no hard limit)", hits.len()));
        anyhow::ensure!(hits.len() <= 200, "returned more than top_k results");
        return Ok(());
    };

    let hits = ctx.adapter().search(&vector, max, None).await?;
    ctx.emit(format!("  top_k={max} -> {} results", hits.len()));
    anyhow::ensure!(hits.len() <= max, "returned more than top_k results");

    match ctx.adapter().search(&vector, max + 1, None).await {
        Err(AdapterError::Capacity { reason, .. }) => {
            ctx.emit(format!("  top_k={} -> rejected: {reason}", max + 1));
            Ok(())
        }
        Err(other) => Err(other.into()),
        Ok(hits) => anyhow::bail!(
            "top_k={} above the advertised limit returned {} results",
            max + 1,
            hits.len()
        ),
    }
}

async fn consistency(ctx: ScenarioContext) -> anyhow::Result<()> {
    let vector = ctx.embed(CONSISTENCY_TEXT).await?;
    let mut metadata = Metadata::new();
    metadata.insert("title".into(), json!(CONSISTENCY_TEXT));
    let sentinel = VectorItem::new(CONSISTENCY_SENTINEL, vector.clone(), metadata);
    ctx.adapter().upsert(&[sentinel]).await?;

    let result = async {
        if visible(&ctx, &vector).await? {
            ctx.emit("  insert -> immediate query -> FOUND");
            return Ok::<(), anyhow::Error>(());
        }
        ctx.emit("  insert -> immediate query -> NOT FOUND");
        let mut waited = 0;
        for delay in CONSISTENCY_RETRIES {
            sleep(Duration::from_secs(delay)).await;
            waited += delay;
            if visible(&ctx, &vector).await? {
                ctx.emit(format!("  found after ~{waited}s (eventual consistency)"));
                return Ok(());
            }
            ctx.emit(format!("  still not found after ~{waited}s"));
        }
        anyhow::bail!("sentinel not visible after {waited}s")
    }
    .await;

    ctx.adapter().delete(&[CONSISTENCY_SENTINEL.to_string()]).await?;
    result
}

async fn visible(ctx: &ScenarioContext, vector: &[f32]) -> anyhow::Result<bool> {
    let hits = ctx.adapter().search(vector, 1, None).await?;
    debug!(backend = ctx.backend(), hits = hits.len(), "consistency check");
    Ok(hits.first().is_some_and(|h| h.id == CONSISTENCY_SENTINEL))
}

async fn batch_limits(ctx: ScenarioContext) -> anyhow::Result<()> {
    let limits = ctx.adapter().limits();
    emit_limits(&ctx, &limits);

    let vector = ctx.embed("batch limit scratch item").await?;
    let items: Vec<VectorItem> = (0..BATCH_ITEMS)
        .map(|n| {
            let mut metadata = Metadata::new();
            metadata.insert("title".into(), json!(format!("batch item {n}")));
            VectorItem::new(format!("batch_{n:04}"), vector.clone(), metadata)
        })
        .collect();
    let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
    let calls = limits
        .max_upsert_batch
        .map_or(1, |max| BATCH_ITEMS.div_ceil(max));
    ctx.emit(format!(
        "  upserting {BATCH_ITEMS} items, at least {calls} underlying call(s)"
    ));

    let before = ctx.adapter().count().await.ok();
    let started = Instant::now();
    ctx.adapter().upsert(&items).await?;
    ctx.emit(format!("  upsert took {}ms", started.elapsed().as_millis()));

    let result = async {
        if let (Some(before), Ok(after)) = (before, ctx.adapter().count().await) {
            anyhow::ensure!(
                after == before + BATCH_ITEMS,
                "count went from {before} to {after}"
            );
        }
        let found = ctx.adapter().get_by_id(&ids[..BATCH_READBACK]).await?;
        ctx.emit(format!("  read back {} of {BATCH_READBACK}", found.len()));
        anyhow::ensure!(found.len() == BATCH_READBACK, "read back {} items", found.len());
        Ok::<(), anyhow::Error>(())
    }
    .await;

    ctx.adapter().delete(&ids).await?;
    ctx.emit(format!("  deleted {BATCH_ITEMS} scratch items"));
    result
}

async fn scale_constraints(ctx: ScenarioContext) -> anyhow::Result<()> {
    let limits = ctx.adapter().limits();
    emit_limits(&ctx, &limits);
    let capabilities = ctx.adapter().capabilities();
    ctx.emit(format!("  capabilities {capabilities}"));

    let vector = ctx.embed("scale constraint scratch item").await?;
    let cases = [
        ("filterable", limits.max_filterable_metadata_bytes, "genre"),
        ("total", limits.max_metadata_bytes, "description"),
    ];
    let mut checked = false;
    for (kind, max, field) in cases {
        let Some(max) = max else { continue };
        checked = true;
        let mut metadata = Metadata::new();
        metadata.insert(field.into(), json!("x".repeat(max + 1)));
        let item = VectorItem::new(SCALE_SENTINEL, vector.clone(), metadata);
        match ctx.adapter().upsert(&[item]).await {
            Err(AdapterError::Capacity { reason, .. }) => {
                ctx.emit(format!("  {kind} metadata over {max} bytes -> rejected: {reason}"));
            }
            Err(other) => return Err(other.into()),
            Ok(()) => {
                ctx.adapter().delete(&[SCALE_SENTINEL.to_string()]).await?;
                anyhow::bail!("{kind} metadata over {max} bytes was accepted");
            }
        }
        let written = ctx.adapter().get_by_id(&[SCALE_SENTINEL.to_string()]).await?;
        if let Some(item) = written.get(SCALE_SENTINEL) {
            ctx.emit(format!("  unexpected write: {}", title(&item.metadata)));
            ctx.adapter().delete(&[SCALE_SENTINEL.to_string()]).await?;
            anyhow::bail!("rejected sentinel was partially written");
        }
    }
    if !checked {
        ctx.emit("  no metadata size limit advertised");
        let hits = ctx.adapter().search(&vector, 3, None).await?;
        emit_hits(&ctx, &hits, &[]);
    }
    Ok(())
}

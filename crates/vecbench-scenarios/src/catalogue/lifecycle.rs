//! Data lifecycle: upsert, point reads, updates and deletes (ids 8-11).
//!
//! Mutating scenarios leave the shared dataset exactly as they found it.

use serde_json::json;
use vecbench_core::{Capability, Category, Metadata, Scenario, ScenarioContext};

use super::title;
use crate::dataset::movie;
use crate::fixture::movie_items;

const GET_SENTINEL: &str = "mov_01";
const UPDATE_SENTINEL: &str = "mov_05";
const DELETE_SENTINEL: &str = "mov_50";

pub(super) fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new(8, "Upsert is idempotent", Category::Common, upsert_idempotent)
            .requires([Capability::Insert]),
        Scenario::new(9, "Get by id", Category::Common, get_by_id)
            .requires([Capability::GetById]),
        Scenario::new(10, "Update metadata", Category::Common, update_metadata)
            .requires([Capability::Insert, Capability::GetById]),
        Scenario::new(11, "Delete by id", Category::Common, delete_by_id)
            .requires([Capability::Delete, Capability::Insert]),
    ]
}

async fn upsert_idempotent(ctx: ScenarioContext) -> anyhow::Result<()> {
    let items = movie_items(ctx.embeddings()).await?;
    let before = count(&ctx).await?;
    ctx.adapter().upsert(&items).await?;
    ctx.emit(format!("  re-upserted {} movies", items.len()));
    let after = count(&ctx).await?;
    if let (Some(before), Some(after)) = (before, after) {
        ctx.emit(format!("  count before={before} after={after}"));
        anyhow::ensure!(before == after, "re-upsert changed the count from {before} to {after}");
    }
    Ok(())
}

async fn get_by_id(ctx: ScenarioContext) -> anyhow::Result<()> {
    let ids = vec![GET_SENTINEL.to_string(), "mov_missing".to_string()];
    let found = ctx.adapter().get_by_id(&ids).await?;
    let item = found
        .get(GET_SENTINEL)
        .ok_or_else(|| anyhow::anyhow!("{GET_SENTINEL} not found"))?;
    ctx.emit(format!(
        "  {} -> {} ({} dims)",
        item.id,
        title(&item.metadata),
        item.vector.len()
    ));
    anyhow::ensure!(title(&item.metadata) == "Inception", "unexpected title for {GET_SENTINEL}");
    anyhow::ensure!(!found.contains_key("mov_missing"), "absent id was returned");
    Ok(())
}

async fn update_metadata(ctx: ScenarioContext) -> anyhow::Result<()> {
    let original = movie(UPDATE_SENTINEL)
        .ok_or_else(|| anyhow::anyhow!("{UPDATE_SENTINEL} is not in the dataset"))?
        .rating;
    set_rating(&ctx, json!(9.5)).await?;
    let result = async {
        let rating = read_rating(&ctx).await?;
        ctx.emit(format!("  {UPDATE_SENTINEL} rating {original} -> {rating}"));
        anyhow::ensure!(rating == json!(9.5), "rating was not updated: {rating}");
        Ok::<(), anyhow::Error>(())
    }
    .await;
    set_rating(&ctx, json!(original)).await?;
    result
}

async fn delete_by_id(ctx: ScenarioContext) -> anyhow::Result<()> {
    let sentinel = movie(DELETE_SENTINEL)
        .ok_or_else(|| anyhow::anyhow!("{DELETE_SENTINEL} is not in the dataset"))?;
    let before = count(&ctx).await?;
    let ids = vec![DELETE_SENTINEL.to_string()];
    ctx.adapter().delete(&ids).await?;
    let result = async {
        if let (Some(before), Some(after)) = (before, count(&ctx).await?) {
            ctx.emit(format!("  count before={before} after={after}"));
            anyhow::ensure!(after + 1 == before, "count went from {before} to {after}");
        }
        if ctx.supports(Capability::GetById) {
            let found = ctx.adapter().get_by_id(&ids).await?;
            anyhow::ensure!(found.is_empty(), "{DELETE_SENTINEL} still readable after delete");
        }
        ctx.emit(format!("  deleted {}", sentinel.title));
        Ok::<(), anyhow::Error>(())
    }
    .await;
    let vector = ctx.embed(&sentinel.embedding_text()).await?;
    ctx.adapter().upsert(&[sentinel.to_item(vector)]).await?;
    ctx.emit(format!("  restored {DELETE_SENTINEL}"));
    result
}

/// `None` when the backend cannot count.
async fn count(ctx: &ScenarioContext) -> anyhow::Result<Option<usize>> {
    match ctx.adapter().count().await {
        Ok(n) => Ok(Some(n)),
        Err(err) if err.is_unsupported() => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn set_rating(ctx: &ScenarioContext, rating: serde_json::Value) -> anyhow::Result<()> {
    let mut patch = Metadata::new();
    patch.insert("rating".into(), rating);
    if ctx.supports(Capability::Update) {
        return Ok(ctx.adapter().update_metadata(UPDATE_SENTINEL, &patch).await?);
    }
    // Without partial updates the whole record is re-put.
    let ids = vec![UPDATE_SENTINEL.to_string()];
    let mut item = ctx
        .adapter()
        .get_by_id(&ids)
        .await?
        .remove(UPDATE_SENTINEL)
        .ok_or_else(|| anyhow::anyhow!("{UPDATE_SENTINEL} not found"))?;
    item.metadata.extend(patch);
    ctx.adapter().upsert(&[item]).await?;
    Ok(())
}

async fn read_rating(ctx: &ScenarioContext) -> anyhow::Result<serde_json::Value> {
    let ids = vec![UPDATE_SENTINEL.to_string()];
    let found = ctx.adapter().get_by_id(&ids).await?;
    found
        .get(UPDATE_SENTINEL)
        .and_then(|item| item.metadata.get("rating").cloned())
        .ok_or_else(|| anyhow::anyhow!("{UPDATE_SENTINEL} has no rating"))
}

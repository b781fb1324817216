//! The canonical comparison catalogue.
//!
//! Ids follow the published comparison: 1-7 search and filtering, 8-11 data
//! lifecycle, 12-18 advanced retrieval, 19-25 platform and limits.

mod advanced;
mod lifecycle;
mod platform;
mod search;

use serde_json::Value;
use vecbench_core::{Filter, Metadata, Result, ScenarioContext, ScenarioRegistry, SearchHit};

/// Build the registry in id order.
pub fn catalogue() -> Result<ScenarioRegistry> {
    let mut registry = ScenarioRegistry::new();
    let scenarios = search::scenarios()
        .into_iter()
        .chain(lifecycle::scenarios())
        .chain(advanced::scenarios())
        .chain(platform::scenarios());
    for scenario in scenarios {
        registry.register(scenario)?;
    }
    Ok(registry)
}

fn render(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "-".to_string(),
    }
}

pub(crate) fn title(metadata: &Metadata) -> String {
    render(metadata.get("title"))
}

/// One transcript line per hit: rank, title, selected fields and score.
pub(crate) fn emit_hits(ctx: &ScenarioContext, hits: &[SearchHit], fields: &[&str]) {
    if hits.is_empty() {
        ctx.emit("  (no results)");
    }
    for (rank, hit) in hits.iter().enumerate() {
        let details: Vec<String> = fields
            .iter()
            .map(|f| format!("{f}={}", render(hit.metadata.get(*f))))
            .collect();
        let details = if details.is_empty() {
            String::new()
        } else {
            format!(" [{}]", details.join(", "))
        };
        ctx.emit(format!(
            "  {}. {}{} score={:.4}",
            rank + 1,
            title(&hit.metadata),
            details,
            hit.score
        ));
    }
}

/// Embed `query` and search with an optional filter.
pub(crate) async fn search(
    ctx: &ScenarioContext,
    query: &str,
    top_k: usize,
    filter: Option<&Filter>,
) -> anyhow::Result<Vec<SearchHit>> {
    let vector = ctx.embed(query).await?;
    Ok(ctx.adapter().search(&vector, top_k, filter).await?)
}

/// Fail unless every hit satisfies `filter` and the list is non-empty.
pub(crate) fn ensure_all_match(hits: &[SearchHit], filter: &Filter) -> anyhow::Result<()> {
    anyhow::ensure!(!hits.is_empty(), "filtered search returned no results");
    if let Some(stray) = hits.iter().find(|h| !filter.matches(&h.metadata)) {
        anyhow::bail!("{} does not satisfy the filter", title(&stray.metadata));
    }
    Ok(())
}

/// Fail unless scores are non-increasing.
pub(crate) fn ensure_ranked(hits: &[SearchHit]) -> anyhow::Result<()> {
    anyhow::ensure!(
        hits.windows(2).all(|w| w[0].score >= w[1].score),
        "results are not ordered best first"
    );
    Ok(())
}

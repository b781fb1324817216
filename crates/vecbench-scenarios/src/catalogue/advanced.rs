//! Advanced retrieval (ids 12-18). Backends lacking the feature are skipped
//! through their advertised capabilities.
//!
//! Hybrid and named-vector scenarios build a scratch space beside the shared
//! collection and drop it afterwards, pass or fail.

use std::collections::BTreeSet;

use vecbench_core::{
    Capability, Category, Filter, MultiVectorItem, Scenario, ScenarioContext, SearchHit,
    SpaceQuery, SpaceSchema, SparseVector, VectorItem,
};

use super::{emit_hits, ensure_all_match, ensure_ranked, search, title};
use crate::dataset::{movie, movies, Movie, LOCATIONS, PARIS};

const GEO_RADIUS_M: f64 = 50_000.0;
const SCROLL_PAGE: usize = 5;

const HYBRID_SPACE: &str = "vecbench_hybrid";
const HYBRID_PREFETCH: usize = 10;
const NAMED_SPACE: &str = "vecbench_named";
/// Movies loaded into the named-vector space.
const NAMED_SUBSET: usize = 20;

pub(super) fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new(12, "Hybrid search (dense + sparse, RRF)", Category::Common, hybrid)
            .requires([Capability::HybridSearch]),
        Scenario::new(13, "Recommendation by example", Category::Common, recommend)
            .requires([Capability::Recommend]),
        Scenario::new(14, "Scroll with filter (pagination)", Category::Common, scroll)
            .requires([Capability::Scroll, Capability::Filter]),
        Scenario::new(15, "Full-text filter on description", Category::Common, text_filter)
            .requires([Capability::Search, Capability::FullTextFilter]),
        Scenario::new(16, "Geo radius filter", Category::Common, geo_filter)
            .requires([Capability::Insert, Capability::GeoFilter, Capability::Delete]),
        Scenario::new(17, "Grouped search by genre", Category::Common, grouped)
            .requires([Capability::Grouping]),
        Scenario::new(18, "Named vectors (title + description)", Category::Common, named_vectors)
            .requires([Capability::NamedVectors]),
    ]
}

fn hit_ids(hits: &[SearchHit]) -> BTreeSet<&str> {
    hits.iter().map(|h| h.id.as_str()).collect()
}

/// Keyword text of a movie: title, description and genre.
fn keywords(m: &Movie) -> SparseVector {
    SparseVector::bag_of_words(&format!("{} {} {}", m.title, m.description, m.genre))
}

async fn hybrid(ctx: ScenarioContext) -> anyhow::Result<()> {
    let schema = SpaceSchema::new().dense("dense").sparse("sparse");
    ctx.adapter().create_space(HYBRID_SPACE, &schema).await?;

    let result = async {
        let texts: Vec<(&str, String)> = movies().iter().map(|m| (m.id, m.embedding_text())).collect();
        let vectors = ctx.embed_batch(&texts).await?;
        let items: Vec<MultiVectorItem> = movies()
            .iter()
            .filter_map(|m| {
                vectors.get(m.id).map(|v| {
                    MultiVectorItem::new(m.id, m.metadata())
                        .with_dense("dense", v.clone())
                        .with_sparse("sparse", keywords(m))
                })
            })
            .collect();
        ctx.adapter().upsert_space(HYBRID_SPACE, &items).await?;

        let query = "space robots adventure";
        let dense = SpaceQuery::dense("dense", ctx.embed(query).await?);
        let sparse = SpaceQuery::sparse("sparse", SparseVector::bag_of_words(query));
        let dense_hits = ctx.adapter().query_space(HYBRID_SPACE, &dense, HYBRID_PREFETCH).await?;
        let sparse_hits = ctx.adapter().query_space(HYBRID_SPACE, &sparse, HYBRID_PREFETCH).await?;
        let fusion = SpaceQuery::fusion([dense, sparse], HYBRID_PREFETCH);
        let fused = ctx.adapter().query_space(HYBRID_SPACE, &fusion, 5).await?;

        ctx.emit(format!(
            "\"{query}\": {} dense, {} keyword candidates",
            dense_hits.len(),
            sparse_hits.len()
        ));
        emit_hits(&ctx, &fused, &["genre"]);
        anyhow::ensure!(!fused.is_empty(), "hybrid search returned no results");
        anyhow::ensure!(fused.len() <= 5, "hybrid search returned {} results", fused.len());
        ensure_ranked(&fused)?;

        let dense_ids = hit_ids(&dense_hits);
        let sparse_ids = hit_ids(&sparse_hits);
        if let Some(stray) = fused
            .iter()
            .find(|h| !dense_ids.contains(h.id.as_str()) && !sparse_ids.contains(h.id.as_str()))
        {
            anyhow::bail!("{} is in neither prefetch", stray.id);
        }
        if !sparse_ids.is_empty() {
            anyhow::ensure!(
                fused.iter().any(|h| sparse_ids.contains(h.id.as_str())),
                "no keyword match survived fusion"
            );
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    ctx.adapter().drop_space(HYBRID_SPACE).await?;
    result
}

async fn named_vectors(ctx: ScenarioContext) -> anyhow::Result<()> {
    let schema = SpaceSchema::new().dense("title").dense("description");
    ctx.adapter().create_space(NAMED_SPACE, &schema).await?;

    let result = async {
        let subset = &movies()[..NAMED_SUBSET];
        let texts: Vec<(String, &str)> = subset
            .iter()
            .flat_map(|m| {
                [
                    (format!("{}#title", m.id), m.title),
                    (format!("{}#description", m.id), m.description),
                ]
            })
            .collect();
        let vectors = ctx.embed_batch(&texts).await?;
        let items: Vec<MultiVectorItem> = subset
            .iter()
            .filter_map(|m| {
                let title = vectors.get(&format!("{}#title", m.id))?;
                let description = vectors.get(&format!("{}#description", m.id))?;
                Some(
                    MultiVectorItem::new(m.id, m.metadata())
                        .with_dense("title", title.clone())
                        .with_dense("description", description.clone()),
                )
            })
            .collect();
        ctx.adapter().upsert_space(NAMED_SPACE, &items).await?;

        let matrix = movie("mov_03").ok_or_else(|| anyhow::anyhow!("mov_03 is not in the dataset"))?;
        let cases = [
            ("title", matrix.title, Some(matrix.id)),
            ("description", matrix.description, Some(matrix.id)),
            ("description", "a computer hacker discovers reality is simulated", None),
        ];
        for (using, text, expected) in cases {
            let query = SpaceQuery::dense(using, ctx.embed(text).await?);
            let hits = ctx.adapter().query_space(NAMED_SPACE, &query, 5).await?;
            ctx.emit(format!("By {using}: \"{text}\""));
            emit_hits(&ctx, &hits, &[]);
            anyhow::ensure!(!hits.is_empty(), "{using} search returned no results");
            ensure_ranked(&hits)?;
            if let Some(id) = expected {
                anyhow::ensure!(
                    hits[0].id == id,
                    "{using} search ranked {} above {id}",
                    hits[0].id
                );
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    ctx.adapter().drop_space(NAMED_SPACE).await?;
    result
}

fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

async fn recommend(ctx: ScenarioContext) -> anyhow::Result<()> {
    let cases = [
        (ids(&["mov_01"]), Vec::new()),
        (ids(&["mov_02", "mov_03"]), ids(&["mov_08"])),
    ];
    for (positive, negative) in cases {
        let hits = ctx.adapter().recommend(&positive, &negative, 5).await?;
        ctx.emit(format!("Like {positive:?}, unlike {negative:?}:"));
        emit_hits(&ctx, &hits, &["genre"]);
        anyhow::ensure!(!hits.is_empty(), "no recommendations for {positive:?}");
        ensure_ranked(&hits)?;
        if let Some(echo) = hits
            .iter()
            .find(|h| positive.contains(&h.id) || negative.contains(&h.id))
        {
            anyhow::bail!("example {} was returned as a recommendation", echo.id);
        }
    }
    Ok(())
}

async fn scroll(ctx: ScenarioContext) -> anyhow::Result<()> {
    let filter = Filter::eq("genre", "Sci-Fi");
    let first = ctx.adapter().scroll(Some(&filter), SCROLL_PAGE, None).await?;
    let cursor = first
        .next_cursor
        .clone()
        .ok_or_else(|| anyhow::anyhow!("first page has no continuation cursor"))?;
    let second = ctx
        .adapter()
        .scroll(Some(&filter), SCROLL_PAGE, Some(&cursor))
        .await?;

    let mut seen = BTreeSet::new();
    for (page, items) in [(1, &first.items), (2, &second.items)] {
        ctx.emit(format!("  page {page}: {} items", items.len()));
        for item in items.iter() {
            ctx.emit(format!("    {} ({})", title(&item.metadata), item.id));
            anyhow::ensure!(filter.matches(&item.metadata), "{} is not Sci-Fi", item.id);
            anyhow::ensure!(seen.insert(item.id.clone()), "{} appeared on two pages", item.id);
        }
    }
    anyhow::ensure!(first.items.len() == SCROLL_PAGE, "first page is short");
    anyhow::ensure!(!second.items.is_empty(), "second page is empty");
    Ok(())
}

async fn text_filter(ctx: ScenarioContext) -> anyhow::Result<()> {
    for keyword in ["robot", "war", "love"] {
        let filter = Filter::text("description", keyword);
        let hits = search(&ctx, &format!("movies about {keyword}"), 5, Some(&filter)).await?;
        ctx.emit(format!("Description contains \"{keyword}\":"));
        emit_hits(&ctx, &hits, &[]);
        ensure_all_match(&hits, &filter)?;
    }
    Ok(())
}

async fn geo_filter(ctx: ScenarioContext) -> anyhow::Result<()> {
    let titles: Vec<(&str, &str)> = LOCATIONS.iter().map(|l| (l.id, l.title)).collect();
    let vectors = ctx.embed_batch(&titles).await?;
    let items: Vec<VectorItem> = LOCATIONS
        .iter()
        .filter_map(|l| {
            vectors
                .get(l.id)
                .map(|v| VectorItem::new(l.id, v.clone(), l.metadata()))
        })
        .collect();
    let location_ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
    ctx.adapter().upsert(&items).await?;

    let result = async {
        let (lat, lon) = PARIS;
        let filter = Filter::geo_radius("location", lat, lon, GEO_RADIUS_M);
        let hits = search(&ctx, "films shot in Paris", LOCATIONS.len(), Some(&filter)).await?;
        ctx.emit(format!("Within {} km of Paris:", GEO_RADIUS_M / 1000.0));
        emit_hits(&ctx, &hits, &[]);
        let found: BTreeSet<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        let expected = BTreeSet::from(["geo_01", "geo_02", "geo_07"]);
        anyhow::ensure!(found == expected, "expected {expected:?}, got {found:?}");
        Ok::<(), anyhow::Error>(())
    }
    .await;

    ctx.adapter().delete(&location_ids).await?;
    result
}

async fn grouped(ctx: ScenarioContext) -> anyhow::Result<()> {
    let vector = ctx.embed("critically acclaimed films").await?;
    let groups = ctx.adapter().search_groups(&vector, "genre", 1, 10).await?;
    anyhow::ensure!(!groups.is_empty(), "no groups returned");
    anyhow::ensure!(groups.len() <= 10, "more than 10 groups");
    let mut keys = BTreeSet::new();
    for group in &groups {
        let key = group.key.as_str().map_or_else(|| group.key.to_string(), str::to_string);
        anyhow::ensure!(group.hits.len() <= 1, "group {key} exceeds its size");
        let best = group
            .hits
            .first()
            .ok_or_else(|| anyhow::anyhow!("group {key} is empty"))?;
        ctx.emit(format!("  {key}: {} score={:.4}", title(&best.metadata), best.score));
        anyhow::ensure!(keys.insert(key.clone()), "genre {key} grouped twice");
    }
    Ok(())
}

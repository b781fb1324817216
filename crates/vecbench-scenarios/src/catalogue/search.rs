//! Semantic search and metadata filtering (ids 1-7).

use vecbench_core::{Capability, Category, Filter, Scenario, ScenarioContext};

use super::{emit_hits, ensure_all_match, ensure_ranked, search};

const TOP_K: usize = 5;

pub(super) fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new(1, "Semantic search (top-k cosine)", Category::Common, |ctx| async move {
            for query in [
                "space exploration and adventure movies",
                "romantic stories about love",
                "crime and gangster films",
            ] {
                let hits = search(&ctx, query, TOP_K, None).await?;
                ctx.emit(format!("Query: \"{query}\""));
                emit_hits(&ctx, &hits, &[]);
                anyhow::ensure!(!hits.is_empty(), "no results for \"{query}\"");
                anyhow::ensure!(hits.len() <= TOP_K, "more than {TOP_K} results");
                ensure_ranked(&hits)?;
            }
            Ok(())
        })
        .requires([Capability::Search]),
        filtered(
            2,
            "Filter: exact match (genre = Sci-Fi)",
            "mind-bending science fiction",
            Filter::eq("genre", "Sci-Fi"),
            &["genre"],
        ),
        filtered(
            3,
            "Filter: numeric range (year >= 2010)",
            "great modern movies",
            Filter::gte("year", 2010.0),
            &["year"],
        ),
        filtered(
            4,
            "Filter: combined AND (Drama, rating >= 8.5)",
            "moving human stories",
            Filter::and([Filter::eq("genre", "Drama"), Filter::gte("rating", 8.5)]),
            &["genre", "rating"],
        ),
        filtered(
            5,
            "Filter: OR (Animation or Comedy)",
            "feel-good films for the whole family",
            Filter::or([Filter::eq("genre", "Animation"), Filter::eq("genre", "Comedy")]),
            &["genre"],
        ),
        filtered(
            6,
            "Filter: negation (language != English)",
            "great international films",
            Filter::ne("language", "English"),
            &["language"],
        ),
        filtered(
            7,
            "Filter: set membership (director in list)",
            "clever plots and sharp dialogue",
            Filter::is_in("director", ["Christopher Nolan", "Quentin Tarantino", "David Fincher"]),
            &["director"],
        ),
    ]
}

/// A filtered top-k search whose every hit must satisfy `filter`.
fn filtered(
    id: u32,
    title: &'static str,
    query: &'static str,
    filter: Filter,
    fields: &'static [&'static str],
) -> Scenario {
    Scenario::new(id, title, Category::Common, move |ctx: ScenarioContext| {
        let filter = filter.clone();
        async move {
            let hits = search(&ctx, query, TOP_K, Some(&filter)).await?;
            ctx.emit(format!("Query: \"{query}\""));
            emit_hits(&ctx, &hits, fields);
            ensure_all_match(&hits, &filter)?;
            ensure_ranked(&hits)
        }
    })
    .requires([Capability::Search, Capability::Filter])
}

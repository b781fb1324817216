//! Translation of the agnostic [`Filter`] into Qdrant's filter JSON.

use serde_json::{json, Map, Value};
use vecbench_core::Filter;

/// Top-level Qdrant filter object (`must` / `should` / `must_not`).
pub fn to_qdrant(filter: &Filter) -> Value {
    let condition = condition(filter);
    if is_filter_object(&condition) {
        condition
    } else {
        json!({ "must": [condition] })
    }
}

fn is_filter_object(value: &Value) -> bool {
    value.as_object().is_some_and(|o| {
        o.contains_key("must") || o.contains_key("should") || o.contains_key("must_not")
    })
}

fn condition(filter: &Filter) -> Value {
    match filter {
        Filter::Eq { field, value } => eq_condition(field, value),
        Filter::Ne { field, value } => json!({ "must_not": [eq_condition(field, value)] }),
        Filter::Range {
            field,
            gt,
            gte,
            lt,
            lte,
        } => {
            let mut range = Map::new();
            for (name, bound) in [("gt", gt), ("gte", gte), ("lt", lt), ("lte", lte)] {
                if let Some(b) = bound {
                    range.insert(name.to_string(), json!(b));
                }
            }
            json!({ "key": field, "range": range })
        }
        Filter::In { field, values } => json!({ "key": field, "match": { "any": values } }),
        Filter::NotIn { field, values } => {
            json!({ "must_not": [{ "key": field, "match": { "any": values } }] })
        }
        Filter::TextMatch { field, text } => json!({ "key": field, "match": { "text": text } }),
        Filter::GeoRadius {
            field,
            lat,
            lon,
            radius_m,
        } => json!({
            "key": field,
            "geo_radius": { "center": { "lat": lat, "lon": lon }, "radius": radius_m }
        }),
        Filter::And { filters } => json!({ "must": filters.iter().map(condition).collect::<Vec<_>>() }),
        Filter::Or { filters } => json!({ "should": filters.iter().map(condition).collect::<Vec<_>>() }),
        Filter::Not { filter } => json!({ "must_not": [condition(filter)] }),
    }
}

/// Qdrant's `match.value` only covers keywords, integers and booleans;
/// fractional numbers become a degenerate range.
fn eq_condition(field: &str, value: &Value) -> Value {
    match value.as_f64() {
        Some(x) if value.is_f64() && x.fract() != 0.0 => {
            json!({ "key": field, "range": { "gte": x, "lte": x } })
        }
        Some(x) if value.is_f64() => json!({ "key": field, "match": { "value": x as i64 } }),
        _ => json!({ "key": field, "match": { "value": value } }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_condition_is_wrapped_in_must() {
        let f = to_qdrant(&Filter::eq("genre", "Sci-Fi"));
        assert_eq!(f, json!({ "must": [{ "key": "genre", "match": { "value": "Sci-Fi" } }] }));
    }

    #[test]
    fn negation_uses_must_not() {
        let f = to_qdrant(&Filter::ne("language", "English"));
        assert_eq!(
            f,
            json!({ "must_not": [{ "key": "language", "match": { "value": "English" } }] })
        );
    }

    #[test]
    fn combinators_nest() {
        let f = to_qdrant(&Filter::and([
            Filter::gte("year", 2010.0),
            Filter::or([Filter::eq("genre", "Drama"), Filter::is_in("director", ["Nolan"])]),
        ]));
        assert_eq!(f["must"][0], json!({ "key": "year", "range": { "gte": 2010.0 } }));
        assert_eq!(f["must"][1]["should"][1]["match"]["any"], json!(["Nolan"]));
    }

    #[test]
    fn fractional_equality_becomes_range() {
        let f = to_qdrant(&Filter::eq("rating", 8.8));
        assert_eq!(f["must"][0]["range"], json!({ "gte": 8.8, "lte": 8.8 }));
        let g = to_qdrant(&Filter::eq("year", 2010.0));
        assert_eq!(g["must"][0]["match"]["value"], json!(2010));
    }

    #[test]
    fn geo_and_text() {
        let f = to_qdrant(&Filter::geo_radius("location", 48.8566, 2.3522, 50_000.0));
        assert_eq!(f["must"][0]["geo_radius"]["radius"], json!(50_000.0));
        let t = to_qdrant(&Filter::text("description", "robot"));
        assert_eq!(t["must"][0]["match"]["text"], json!("robot"));
    }
}

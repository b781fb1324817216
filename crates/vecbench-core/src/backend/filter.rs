//! Backend-agnostic metadata filter.
//!
//! Scenarios build a [`Filter`]; each adapter translates it into its own wire
//! shape or rejects it with an unsupported-operation error. [`Filter::matches`]
//! evaluates it directly against metadata and backs the in-memory fakes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Capability, CapabilitySet, Metadata};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A metadata predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Eq {
        field: String,
        value: Value,
    },
    Ne {
        field: String,
        value: Value,
    },
    Range {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gt: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gte: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lt: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lte: Option<f64>,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    NotIn {
        field: String,
        values: Vec<Value>,
    },
    /// Every whitespace-separated word of `text` occurs in the field
    /// (case-insensitive).
    TextMatch {
        field: String,
        text: String,
    },
    /// The `{lat, lon}` object in `field` lies within `radius_m` metres of
    /// the centre.
    GeoRadius {
        field: String,
        lat: f64,
        lon: f64,
        radius_m: f64,
    },
    And {
        filters: Vec<Filter>,
    },
    Or {
        filters: Vec<Filter>,
    },
    Not {
        filter: Box<Filter>,
    },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn gte(field: impl Into<String>, bound: f64) -> Self {
        Filter::Range {
            field: field.into(),
            gt: None,
            gte: Some(bound),
            lt: None,
            lte: None,
        }
    }

    pub fn between(field: impl Into<String>, gte: f64, lte: f64) -> Self {
        Filter::Range {
            field: field.into(),
            gt: None,
            gte: Some(gte),
            lt: None,
            lte: Some(lte),
        }
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::NotIn {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn text(field: impl Into<String>, text: impl Into<String>) -> Self {
        Filter::TextMatch {
            field: field.into(),
            text: text.into(),
        }
    }

    pub fn geo_radius(field: impl Into<String>, lat: f64, lon: f64, radius_m: f64) -> Self {
        Filter::GeoRadius {
            field: field.into(),
            lat,
            lon,
            radius_m,
        }
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And {
            filters: filters.into_iter().collect(),
        }
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or {
            filters: filters.into_iter().collect(),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// Capabilities an adapter needs to evaluate this filter.
    pub fn required_capabilities(&self) -> CapabilitySet {
        let mut set = CapabilitySet::new().with(Capability::Filter);
        self.collect_capabilities(&mut set);
        set
    }

    fn collect_capabilities(&self, set: &mut CapabilitySet) {
        match self {
            Filter::TextMatch { .. } => {
                set.insert(Capability::FullTextFilter);
            }
            Filter::GeoRadius { .. } => {
                set.insert(Capability::GeoFilter);
            }
            Filter::And { filters } | Filter::Or { filters } => {
                for f in filters {
                    f.collect_capabilities(set);
                }
            }
            Filter::Not { filter } => filter.collect_capabilities(set),
            _ => {}
        }
    }

    /// Evaluate against a metadata object. Missing fields never match a
    /// positive predicate.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Filter::Eq { field, value } => metadata
                .get(field)
                .is_some_and(|actual| value_matches(actual, value)),
            Filter::Ne { field, value } => !metadata
                .get(field)
                .is_some_and(|actual| value_matches(actual, value)),
            Filter::Range {
                field,
                gt,
                gte,
                lt,
                lte,
            } => match metadata.get(field).and_then(Value::as_f64) {
                Some(x) => {
                    gt.map_or(true, |b| x > b)
                        && gte.map_or(true, |b| x >= b)
                        && lt.map_or(true, |b| x < b)
                        && lte.map_or(true, |b| x <= b)
                }
                None => false,
            },
            Filter::In { field, values } => metadata
                .get(field)
                .is_some_and(|actual| values.iter().any(|v| value_matches(actual, v))),
            Filter::NotIn { field, values } => !metadata
                .get(field)
                .is_some_and(|actual| values.iter().any(|v| value_matches(actual, v))),
            Filter::TextMatch { field, text } => match metadata.get(field).and_then(Value::as_str) {
                Some(haystack) => {
                    let haystack = haystack.to_lowercase();
                    text.split_whitespace()
                        .all(|word| haystack.contains(&word.to_lowercase()))
                }
                None => false,
            },
            Filter::GeoRadius {
                field,
                lat,
                lon,
                radius_m,
            } => match metadata.get(field).and_then(geo_point) {
                Some((plat, plon)) => haversine_m(*lat, *lon, plat, plon) <= *radius_m,
                None => false,
            },
            Filter::And { filters } => filters.iter().all(|f| f.matches(metadata)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(metadata)),
            Filter::Not { filter } => !filter.matches(metadata),
        }
    }
}

/// Scalar equality with numbers compared as f64. An array field matches when
/// any element does.
pub fn value_matches(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| scalar_eq(item, expected)),
        other => scalar_eq(other, expected),
    }
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Extract `(lat, lon)` from a `{"lat": .., "lon": ..}` object.
pub fn geo_point(value: &Value) -> Option<(f64, f64)> {
    let lat = value.get("lat")?.as_f64()?;
    let lon = value.get("lon")?.as_f64()?;
    Some((lat, lon))
}

/// Great-circle distance in metres.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(v: Value) -> Metadata {
        match v {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn eq_compares_numbers_numerically() {
        let m = meta(json!({"year": 2010, "genre": "Sci-Fi"}));
        assert!(Filter::eq("year", 2010.0).matches(&m));
        assert!(Filter::eq("genre", "Sci-Fi").matches(&m));
        assert!(!Filter::eq("genre", "Drama").matches(&m));
    }

    #[test]
    fn ne_matches_missing_field() {
        let m = meta(json!({"genre": "Drama"}));
        assert!(Filter::ne("language", "English").matches(&m));
    }

    #[test]
    fn range_and_combinators() {
        let m = meta(json!({"year": 2014, "rating": 8.6, "genre": "Sci-Fi"}));
        let f = Filter::and([Filter::gte("year", 2010.0), Filter::eq("genre", "Sci-Fi")]);
        assert!(f.matches(&m));
        assert!(!Filter::not(f).matches(&m));
        assert!(Filter::or([Filter::eq("genre", "Drama"), Filter::between("rating", 8.5, 9.0)])
            .matches(&m));
    }

    #[test]
    fn in_matches_array_elements() {
        let m = meta(json!({"tags": ["space", "time"]}));
        assert!(Filter::is_in("tags", ["time", "heist"]).matches(&m));
        assert!(!Filter::not_in("tags", ["space"]).matches(&m));
    }

    #[test]
    fn text_match_requires_every_word() {
        let m = meta(json!({"description": "A robot falls in love on an abandoned Earth"}));
        assert!(Filter::text("description", "robot LOVE").matches(&m));
        assert!(!Filter::text("description", "robot war").matches(&m));
    }

    #[test]
    fn geo_radius_uses_great_circle_distance() {
        let versailles = meta(json!({"location": {"lat": 48.8049, "lon": 2.1204}}));
        let lyon = meta(json!({"location": {"lat": 45.7640, "lon": 4.8357}}));
        let near_paris = Filter::geo_radius("location", 48.8566, 2.3522, 50_000.0);
        assert!(near_paris.matches(&versailles));
        assert!(!near_paris.matches(&lyon));
    }

    #[test]
    fn required_capabilities_walks_the_tree() {
        let f = Filter::and([
            Filter::eq("genre", "Drama"),
            Filter::not(Filter::text("description", "war")),
        ]);
        let caps = f.required_capabilities();
        assert!(caps.contains(Capability::Filter));
        assert!(caps.contains(Capability::FullTextFilter));
        assert!(!caps.contains(Capability::GeoFilter));
    }
}

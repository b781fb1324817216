//! Translation of the agnostic [`Filter`] into S3 Vectors filter JSON.
//!
//! The service understands `$eq $ne $gt $gte $lt $lte $in $nin $and $or` but
//! has no `$not`, so negations are pushed down to the leaves. Empty
//! conjunctions and unbounded ranges are rejected before they reach the wire.

use serde_json::{json, Map, Value};
use vecbench_core::Filter;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// A predicate the service has no operator for.
    #[error("{0} predicate")]
    Unsupported(&'static str),

    /// A filter that would translate to an empty operator object or list.
    #[error("empty filter: {0}")]
    Empty(String),
}

/// Translate, or say why the service cannot take the filter.
pub fn to_s3(filter: &Filter) -> Result<Value, FilterError> {
    translate(filter, false)
}

fn translate(filter: &Filter, negated: bool) -> Result<Value, FilterError> {
    match filter {
        Filter::Eq { field, value } => Ok(leaf(field, if negated { "$ne" } else { "$eq" }, value.clone())),
        Filter::Ne { field, value } => Ok(leaf(field, if negated { "$eq" } else { "$ne" }, value.clone())),
        Filter::In { field, values } => Ok(leaf(field, if negated { "$nin" } else { "$in" }, json!(values))),
        Filter::NotIn { field, values } => Ok(leaf(field, if negated { "$in" } else { "$nin" }, json!(values))),
        Filter::Range {
            field,
            gt,
            gte,
            lt,
            lte,
        } => {
            let bounds = [("$gt", "$lte", gt), ("$gte", "$lt", gte), ("$lt", "$gte", lt), ("$lte", "$gt", lte)];
            if bounds.iter().all(|(_, _, b)| b.is_none()) {
                return Err(FilterError::Empty(format!("range on {field} has no bounds")));
            }
            if negated {
                // not(a AND b) = not a OR not b
                let mut alternatives: Vec<Value> = bounds
                    .iter()
                    .filter_map(|(_, inverse, b)| b.map(|b| leaf(field, inverse, json!(b))))
                    .collect();
                Ok(if alternatives.len() == 1 {
                    alternatives.remove(0)
                } else {
                    json!({ "$or": alternatives })
                })
            } else {
                let mut ops = Map::new();
                for (op, _, b) in bounds {
                    if let Some(b) = b {
                        ops.insert(op.to_string(), json!(b));
                    }
                }
                Ok(json!({ field: ops }))
            }
        }
        Filter::And { filters } | Filter::Or { filters } if filters.is_empty() => {
            Err(FilterError::Empty("and/or without operands".to_string()))
        }
        Filter::And { filters } => {
            let parts = filters
                .iter()
                .map(|f| translate(f, negated))
                .collect::<Result<Vec<_>, _>>()?;
            let op = if negated { "$or" } else { "$and" };
            Ok(json!({ op: parts }))
        }
        Filter::Or { filters } => {
            let parts = filters
                .iter()
                .map(|f| translate(f, negated))
                .collect::<Result<Vec<_>, _>>()?;
            let op = if negated { "$and" } else { "$or" };
            Ok(json!({ op: parts }))
        }
        Filter::Not { filter } => translate(filter, !negated),
        Filter::TextMatch { .. } => Err(FilterError::Unsupported("full_text_filter")),
        Filter::GeoRadius { .. } => Err(FilterError::Unsupported("geo_filter")),
    }
}

fn leaf(field: &str, op: &str, value: Value) -> Value {
    json!({ field: { op: value } })
}

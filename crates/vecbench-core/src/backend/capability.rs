//! Capability model advertised by backend adapters.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One backend feature a scenario may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Insert,
    Search,
    Filter,
    GetById,
    Update,
    Delete,
    Scroll,
    FullTextFilter,
    GeoFilter,
    Recommend,
    Grouping,
    /// Sparse keyword vectors fused with dense results.
    HybridSearch,
    /// Several named dense vectors per point.
    NamedVectors,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Insert => "insert",
            Capability::Search => "search",
            Capability::Filter => "filter",
            Capability::GetById => "get_by_id",
            Capability::Update => "update",
            Capability::Delete => "delete",
            Capability::Scroll => "scroll",
            Capability::FullTextFilter => "full_text_filter",
            Capability::GeoFilter => "geo_filter",
            Capability::Recommend => "recommend",
            Capability::Grouping => "grouping",
            Capability::HybridSearch => "hybrid_search",
            Capability::NamedVectors => "named_vectors",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of capabilities. Ordering keeps rendering stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The base set every adapter in this workspace supports.
    pub fn core() -> Self {
        [
            Capability::Insert,
            Capability::Search,
            Capability::Filter,
            Capability::GetById,
            Capability::Delete,
        ]
        .into_iter()
        .collect()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn is_subset_of(&self, other: &CapabilitySet) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Members of `self` that `other` lacks, in order.
    pub fn missing_from(&self, other: &CapabilitySet) -> Vec<Capability> {
        self.0.difference(&other.0).copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Capability> for CapabilitySet {
    fn extend<I: IntoIterator<Item = Capability>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Capability::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

//! Scenario definitions and the context handed to a scenario body.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendAdapter, Capability, CapabilitySet};
use crate::embedding::EmbeddingCache;
use crate::sink::Sink;

/// Which backends a scenario targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Runs against every adapter.
    Common,
    /// Runs only against the named adapter; skipped for the others.
    BackendOnly(String),
    /// Probes backend limits; runs against every adapter.
    Limits,
}

impl Category {
    pub fn backend_only(name: &str) -> Self {
        Category::BackendOnly(name.to_string())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Common => f.write_str("common"),
            Category::BackendOnly(name) => write!(f, "{name}-only"),
            Category::Limits => f.write_str("limits"),
        }
    }
}

type ScenarioBody =
    Arc<dyn Fn(ScenarioContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// One comparison scenario. Immutable once registered.
#[derive(Clone)]
pub struct Scenario {
    id: u32,
    title: String,
    category: Category,
    required: CapabilitySet,
    body: ScenarioBody,
}

impl Scenario {
    pub fn new<F, Fut>(id: u32, title: impl Into<String>, category: Category, body: F) -> Self
    where
        F: Fn(ScenarioContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id,
            title: title.into(),
            category,
            required: CapabilitySet::new(),
            body: Arc::new(move |ctx| body(ctx).boxed()),
        }
    }

    /// Add required capabilities.
    pub fn requires(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.required.extend(capabilities);
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn required_capabilities(&self) -> &CapabilitySet {
        &self.required
    }

    pub fn summary(&self) -> ScenarioSummary {
        ScenarioSummary {
            id: self.id,
            title: self.title.clone(),
            category: self.category.clone(),
        }
    }

    /// Why this scenario must be skipped on `adapter`, if it must.
    pub fn skip_reason(&self, backend: &str, capabilities: &CapabilitySet) -> Option<String> {
        if let Category::BackendOnly(only) = &self.category {
            if only != backend {
                return Some(format!("{only} only"));
            }
        }
        let missing = self.required.missing_from(capabilities);
        if missing.is_empty() {
            None
        } else {
            let names: Vec<&str> = missing.iter().map(Capability::as_str).collect();
            Some(format!("not supported: {}", names.join(", ")))
        }
    }

    pub(crate) fn invoke(&self, ctx: ScenarioContext) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.body)(ctx)
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("category", &self.category)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

/// Serializable identity of a scenario, as it appears in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub id: u32,
    pub title: String,
    pub category: Category,
}

/// Everything a scenario body may touch: one adapter, the embedding cache and
/// the transcript.
#[derive(Clone)]
pub struct ScenarioContext {
    scenario_id: u32,
    adapter: Arc<dyn BackendAdapter>,
    embeddings: Arc<EmbeddingCache>,
    sink: Arc<dyn Sink>,
}

impl ScenarioContext {
    pub fn new(
        scenario_id: u32,
        adapter: Arc<dyn BackendAdapter>,
        embeddings: Arc<EmbeddingCache>,
        sink: Arc<dyn Sink>,
    ) -> Self {
        Self {
            scenario_id,
            adapter,
            embeddings,
            sink,
        }
    }

    pub fn scenario_id(&self) -> u32 {
        self.scenario_id
    }

    pub fn adapter(&self) -> &dyn BackendAdapter {
        self.adapter.as_ref()
    }

    /// Name of the backend under test.
    pub fn backend(&self) -> &str {
        self.adapter.name()
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.adapter.capabilities().contains(capability)
    }

    pub fn embeddings(&self) -> &EmbeddingCache {
        &self.embeddings
    }

    /// Append a line to the transcript (and the live console).
    pub fn emit(&self, line: impl AsRef<str>) {
        self.sink.write_line(line.as_ref());
    }

    /// Embed one text through the cache.
    pub async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.embeddings.embed(text).await?)
    }

    pub async fn embed_batch<I, T>(
        &self,
        items: &[(I, T)],
    ) -> anyhow::Result<BTreeMap<String, Vec<f32>>>
    where
        I: AsRef<str> + Sync,
        T: AsRef<str> + Sync,
    {
        Ok(self.embeddings.embed_batch(items).await?)
    }
}

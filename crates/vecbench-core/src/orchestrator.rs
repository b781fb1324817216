//! Run orchestration: selection, provisioning, fixtures, dispatch, cleanup.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};

use crate::backend::BackendAdapter;
use crate::embedding::{EmbeddingCache, EmbeddingError};
use crate::error::{HarnessError, Result};
use crate::obs;
use crate::outcome::Status;
use crate::registry::ScenarioRegistry;
use crate::report::{Report, ReportAssembler};
use crate::runner::{AdapterState, ScenarioRunner};
use crate::scenario::Scenario;
use crate::sink::Sink;

/// Which scenarios to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Ids(BTreeSet<u32>),
    /// Inclusive.
    Range(u32, u32),
}

impl FromStr for Selection {
    type Err = HarnessError;

    /// Accepts `all`, `7`, `1,4,7` and `3-9`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || HarnessError::InvalidSelection(s.to_string());
        if s.eq_ignore_ascii_case("all") {
            return Ok(Selection::All);
        }
        if let Some((lo, hi)) = s.split_once('-') {
            let lo: u32 = lo.trim().parse().map_err(|_| invalid())?;
            let hi: u32 = hi.trim().parse().map_err(|_| invalid())?;
            if lo > hi {
                return Err(invalid());
            }
            return Ok(Selection::Range(lo, hi));
        }
        let ids = s
            .split(',')
            .map(|part| part.trim().parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<BTreeSet<u32>>>()?;
        Ok(Selection::Ids(ids))
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => f.write_str("all"),
            Selection::Ids(ids) => {
                let parts: Vec<String> = ids.iter().map(u32::to_string).collect();
                f.write_str(&parts.join(","))
            }
            Selection::Range(lo, hi) => write!(f, "{lo}-{hi}"),
        }
    }
}

/// When to tear backend resources down after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    #[default]
    None,
    CleanupOnSuccess,
    AlwaysCleanup,
}

impl FromStr for CleanupPolicy {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "never" => Ok(CleanupPolicy::None),
            "on-success" | "on_success" => Ok(CleanupPolicy::CleanupOnSuccess),
            "always" => Ok(CleanupPolicy::AlwaysCleanup),
            other => Err(HarnessError::InvalidConfig(format!(
                "unknown cleanup policy '{other}' (expected none, on-success or always)"
            ))),
        }
    }
}

impl fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CleanupPolicy::None => "none",
            CleanupPolicy::CleanupOnSuccess => "on-success",
            CleanupPolicy::AlwaysCleanup => "always",
        })
    }
}

/// Shared setup run once per ready adapter before any scenario, e.g.
/// dataset seeding.
#[async_trait]
pub trait Fixture: Send + Sync {
    async fn prepare(
        &self,
        adapter: &dyn BackendAdapter,
        embeddings: &EmbeddingCache,
        sink: &dyn Sink,
    ) -> anyhow::Result<()>;
}

/// Long-lived collaborators, built once by the binary and passed down.
#[derive(Clone)]
pub struct HarnessContext {
    pub adapters: Vec<Arc<dyn BackendAdapter>>,
    pub embeddings: Arc<EmbeddingCache>,
    pub console: Arc<dyn Sink>,
}

impl HarnessContext {
    pub fn new(
        adapters: Vec<Arc<dyn BackendAdapter>>,
        embeddings: Arc<EmbeddingCache>,
        console: Arc<dyn Sink>,
    ) -> Self {
        Self {
            adapters,
            embeddings,
            console,
        }
    }
}

pub struct HarnessOrchestrator {
    registry: ScenarioRegistry,
    context: HarnessContext,
    fixture: Option<Arc<dyn Fixture>>,
    cleanup: CleanupPolicy,
    timeout: Option<Duration>,
}

impl HarnessOrchestrator {
    pub fn new(registry: ScenarioRegistry, context: HarnessContext) -> Self {
        Self {
            registry,
            context,
            fixture: None,
            cleanup: CleanupPolicy::None,
            timeout: None,
        }
    }

    pub fn with_fixture(mut self, fixture: Arc<dyn Fixture>) -> Self {
        self.fixture = Some(fixture);
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ScenarioRegistry {
        &self.registry
    }

    /// Resolve a selection to scenarios in registry order, plus warnings for
    /// ids that do not exist.
    pub fn resolve(&self, selection: &Selection) -> (Vec<&Scenario>, Vec<String>) {
        let mut warnings = Vec::new();
        let scenarios = match selection {
            Selection::All => self.registry.all().iter().collect(),
            Selection::Ids(ids) => {
                for id in ids.iter().filter(|id| !self.registry.contains(**id)) {
                    warnings.push(format!("unknown scenario id {id}"));
                }
                self.registry
                    .all()
                    .iter()
                    .filter(|s| ids.contains(&s.id()))
                    .collect()
            }
            Selection::Range(lo, hi) => {
                let found = self.registry.by_range(*lo, *hi);
                if found.is_empty() {
                    warnings.push(format!("no scenarios in range {lo}-{hi}"));
                }
                found
            }
        };
        for warning in &warnings {
            warn!(%warning, "selection");
        }
        (scenarios, warnings)
    }

    /// Run the selected scenarios and assemble the report.
    ///
    /// Scenario failures are recorded, never returned. A fatal error (an
    /// embedding failure during setup or inside a scenario) stops the run and
    /// marks the report aborted.
    pub async fn run(&self, selection: &Selection) -> Result<Report> {
        self.run_selected(selection)
            .instrument(obs::run_span(&selection.to_string()))
            .await
    }

    async fn run_selected(&self, selection: &Selection) -> Result<Report> {
        let (scenarios, warnings) = self.resolve(selection);
        let mut assembler = ReportAssembler::new();
        for warning in warnings {
            assembler.warn(warning);
        }

        let names: Vec<&str> = self.context.adapters.iter().map(|a| a.name()).collect();
        obs::emit_run_started(scenarios.len(), &names);

        let targets: Vec<_> = self.context.adapters.iter().map(|a| a.target()).collect();
        for target in targets.iter().filter(|t| t.emulated) {
            warn!(
                backend = %target.backend,
                endpoint = %target.endpoint,
                "backend is emulated in-process; its timings are not service latencies"
            );
        }
        assembler.set_backends(targets);

        let mut states = self.provision().await;
        let mut any_failed = false;

        if let Err(fatal) = self.prepare_fixtures(&mut states).await {
            warn!(error = %fatal, "shared setup failed; aborting run");
            assembler.abort(fatal.to_string());
            any_failed = true;
        } else {
            let runner = ScenarioRunner::new(self.context.console.clone()).with_timeout(self.timeout);
            for scenario in scenarios {
                self.context.console.write_line(&format!(
                    "=== TEST {:02}: {} ===",
                    scenario.id(),
                    scenario.title()
                ));
                let execution = runner.run(scenario, &states, &self.context.embeddings).await;
                any_failed |= execution.outcome.status == Status::Failed;
                assembler.append(scenario.summary(), execution.outcome)?;
                if let Some(fatal) = execution.fatal {
                    warn!(scenario_id = scenario.id(), error = %fatal, "fatal error; aborting run");
                    assembler.abort(format!("scenario {}: {fatal}", scenario.id()));
                    break;
                }
            }
        }

        let teardown = match self.cleanup {
            CleanupPolicy::None => false,
            CleanupPolicy::CleanupOnSuccess => !any_failed,
            CleanupPolicy::AlwaysCleanup => true,
        };
        if teardown {
            for warning in self.teardown_all().await {
                assembler.warn(warning);
            }
        }

        let report = assembler.finalize()?;
        let stats = self.context.embeddings.stats();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            model_calls = stats.model_calls,
            "embedding cache"
        );
        obs::emit_run_finished(report.passed, report.failed, report.skipped, report.aborted.is_some());
        Ok(report)
    }

    /// Tear down every adapter without running anything.
    pub async fn cleanup_only(&self) -> Result<()> {
        match self.teardown_failures().await.into_iter().next() {
            None => Ok(()),
            Some((backend, reason)) => Err(HarnessError::Teardown { backend, reason }),
        }
    }

    async fn provision(&self) -> Vec<AdapterState> {
        let mut states = Vec::with_capacity(self.context.adapters.len());
        for adapter in &self.context.adapters {
            let provisioning_error = match adapter.ensure_ready().await {
                Ok(()) => {
                    info!(backend = adapter.name(), "backend ready");
                    None
                }
                Err(e) => {
                    warn!(backend = adapter.name(), error = %e, "provisioning failed");
                    Some(e.to_string())
                }
            };
            states.push(AdapterState {
                adapter: adapter.clone(),
                provisioning_error,
            });
        }
        states
    }

    /// Run the fixture on every ready adapter. Adapter errors isolate that
    /// backend; embedding failures are fatal.
    async fn prepare_fixtures(&self, states: &mut [AdapterState]) -> Result<()> {
        let Some(fixture) = &self.fixture else {
            return Ok(());
        };
        for state in states.iter_mut().filter(|s| s.is_ready()) {
            let result = fixture
                .prepare(
                    state.adapter.as_ref(),
                    &self.context.embeddings,
                    self.context.console.as_ref(),
                )
                .await;
            if let Err(err) = result {
                if let Some(EmbeddingError::Generation(msg)) = err
                    .chain()
                    .find_map(|c| c.downcast_ref::<EmbeddingError>())
                {
                    return Err(EmbeddingError::Generation(msg.clone()).into());
                }
                warn!(backend = state.name(), error = %format!("{err:#}"), "fixture failed");
                state.provisioning_error = Some(format!("fixture: {err:#}"));
            }
        }
        Ok(())
    }

    async fn teardown_failures(&self) -> Vec<(String, String)> {
        let mut failures = Vec::new();
        for adapter in &self.context.adapters {
            match adapter.teardown().await {
                Ok(()) => obs::emit_cleanup(adapter.name(), None),
                Err(e) => {
                    obs::emit_cleanup(adapter.name(), Some(&e));
                    failures.push((adapter.name().to_string(), e.to_string()));
                }
            }
        }
        failures
    }

    async fn teardown_all(&self) -> Vec<String> {
        self.teardown_failures()
            .await
            .into_iter()
            .map(|(backend, reason)| format!("teardown failed for {backend}: {reason}"))
            .collect()
    }
}

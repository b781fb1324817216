//! Isolated execution of one scenario against a set of adapters.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::backend::{BackendAdapter, TimedAdapter};
use crate::embedding::{EmbeddingCache, EmbeddingError};
use crate::error::HarnessError;
use crate::obs;
use crate::outcome::{BackendOutcome, ScenarioOutcome, Status};
use crate::scenario::{Scenario, ScenarioContext};
use crate::sink::{Sink, TeeSink, TranscriptSink};

/// An adapter together with the result of its provisioning.
#[derive(Clone)]
pub struct AdapterState {
    pub adapter: Arc<dyn BackendAdapter>,
    pub provisioning_error: Option<String>,
}

impl AdapterState {
    pub fn ready(adapter: Arc<dyn BackendAdapter>) -> Self {
        Self {
            adapter,
            provisioning_error: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.provisioning_error.is_none()
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }
}

/// What the runner hands back to the orchestrator.
#[derive(Debug)]
pub struct Execution {
    pub outcome: ScenarioOutcome,
    /// Set when the scenario hit an error that must end the run.
    pub fatal: Option<HarnessError>,
}

/// Runs scenarios one adapter at a time.
///
/// Per adapter the state machine is `Pending → Running → {Passed, Failed,
/// Skipped}`:
/// - skipped before any backend call when the category or the capability set
///   rules the adapter out
/// - failed without running when the adapter's provisioning failed
/// - failed on error, panic or timeout; passed on normal return
pub struct ScenarioRunner {
    console: Arc<dyn Sink>,
    timeout: Option<Duration>,
}

impl ScenarioRunner {
    pub fn new(console: Arc<dyn Sink>) -> Self {
        Self {
            console,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub async fn run(
        &self,
        scenario: &Scenario,
        adapters: &[AdapterState],
        embeddings: &Arc<EmbeddingCache>,
    ) -> Execution {
        let transcript = Arc::new(TranscriptSink::new());
        let tee: Arc<dyn Sink> = Arc::new(TeeSink::new(self.console.clone(), transcript.clone()));
        let mut backends = Vec::with_capacity(adapters.len());
        let mut fatal = None;

        for state in adapters {
            let backend = state.name().to_string();

            if let Some(reason) =
                scenario.skip_reason(&backend, &state.adapter.capabilities())
            {
                tee.write_line(&format!("[{backend}] SKIPPED ({reason})"));
                debug!(scenario_id = scenario.id(), %backend, %reason, "scenario skipped");
                backends.push(BackendOutcome::skipped(&backend, reason));
                continue;
            }

            if let Some(reason) = &state.provisioning_error {
                let detail = format!("provisioning failed: {reason}");
                tee.write_line(&format!("[{backend}] FAILED ({detail})"));
                backends.push(BackendOutcome::failed(&backend, detail));
                continue;
            }

            tee.write_line(&format!("[{backend}]"));
            let timed = Arc::new(TimedAdapter::new(state.adapter.clone()));
            let ctx = ScenarioContext::new(
                scenario.id(),
                timed.clone(),
                embeddings.clone(),
                tee.clone(),
            );

            let (status, detail) = match self.execute(scenario, ctx).await {
                Ok(()) => (Status::Passed, None),
                Err(Failure::Error(err)) => {
                    if let Some(embedding) = generation_failure(&err) {
                        fatal = Some(HarnessError::Embedding(embedding));
                    }
                    (Status::Failed, Some(format!("{err:#}")))
                }
                Err(Failure::Panic(msg)) => (Status::Failed, Some(format!("panicked: {msg}"))),
                Err(Failure::Timeout) => (Status::Failed, Some("timeout".to_string())),
            };

            let stats = timed.stats();
            match &detail {
                Some(d) => tee.write_line(&format!("[{backend}] {status}: {d}")),
                None => tee.write_line(&format!(
                    "[{backend}] {status} ({} ms in {} calls)",
                    stats.elapsed_ms(),
                    stats.calls
                )),
            }
            if status == Status::Failed {
                warn!(scenario_id = scenario.id(), %backend, detail = ?detail, "scenario failed");
            }
            backends.push(BackendOutcome {
                backend,
                status,
                detail,
                elapsed_ms: stats.elapsed_ms(),
                backend_calls: stats.calls,
            });

            if fatal.is_some() {
                break;
            }
        }

        let outcome = ScenarioOutcome::from_backends(transcript.take(), backends);
        obs::emit_scenario_finished(scenario.id(), outcome.status, &outcome.elapsed_ms);
        Execution { outcome, fatal }
    }

    async fn execute(&self, scenario: &Scenario, ctx: ScenarioContext) -> Result<(), Failure> {
        let guarded = AssertUnwindSafe(scenario.invoke(ctx)).catch_unwind();
        let caught = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .map_err(|_| Failure::Timeout)?,
            None => guarded.await,
        };
        match caught {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(Failure::Error(err)),
            Err(payload) => Err(Failure::Panic(panic_message(payload.as_ref()))),
        }
    }
}

enum Failure {
    Error(anyhow::Error),
    Panic(String),
    Timeout,
}

/// Find an embedding generation failure anywhere in the error chain.
fn generation_failure(err: &anyhow::Error) -> Option<EmbeddingError> {
    err.chain().find_map(|cause| match cause.downcast_ref::<EmbeddingError>() {
        Some(EmbeddingError::Generation(msg)) => Some(EmbeddingError::Generation(msg.clone())),
        _ => None,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Capability, S3_VECTORS};
    use crate::embedding::{HashingEmbedder, MemoryEmbeddingStore};
    use crate::fakes::MemoryAdapter;
    use crate::scenario::Category;
    use crate::sink::NullSink;

    fn cache() -> Arc<EmbeddingCache> {
        Arc::new(EmbeddingCache::new(
            Arc::new(HashingEmbedder::new(8)),
            Arc::new(MemoryEmbeddingStore::new()),
        ))
    }

    fn runner() -> ScenarioRunner {
        ScenarioRunner::new(Arc::new(NullSink))
    }

    #[tokio::test]
    async fn captures_transcript_in_order() {
        let scenario = Scenario::new(1, "emit", Category::Common, |ctx| async move {
            ctx.emit("one");
            ctx.emit(format!("two on {}", ctx.backend()));
            Ok(())
        });
        let adapters = [AdapterState::ready(Arc::new(MemoryAdapter::new("mem")))];
        let exec = runner().run(&scenario, &adapters, &cache()).await;
        assert_eq!(exec.outcome.status, Status::Passed);
        assert_eq!(exec.outcome.transcript[1..3], ["one", "two on mem"]);
    }

    #[tokio::test]
    async fn panic_becomes_failure() {
        let scenario = Scenario::new(2, "boom", Category::Common, |_ctx| async move {
            if true {
                panic!("kaboom");
            }
            Ok(())
        });
        let adapters = [AdapterState::ready(Arc::new(MemoryAdapter::new("mem")))];
        let exec = runner().run(&scenario, &adapters, &cache()).await;
        assert_eq!(exec.outcome.status, Status::Failed);
        assert_eq!(exec.outcome.error_detail.as_deref(), Some("mem: panicked: kaboom"));
        assert!(exec.fatal.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_failure() {
        let scenario = Scenario::new(3, "slow", Category::Common, |_ctx| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let adapters = [AdapterState::ready(Arc::new(MemoryAdapter::new("mem")))];
        let exec = runner()
            .with_timeout(Some(Duration::from_secs(5)))
            .run(&scenario, &adapters, &cache())
            .await;
        assert_eq!(exec.outcome.backends[0].detail.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn gated_scenario_makes_no_backend_calls() {
        let s3 = Arc::new(MemoryAdapter::with_capabilities(
            S3_VECTORS,
            crate::backend::CapabilitySet::core(),
        ));
        let scenario = Scenario::new(14, "scroll", Category::Common, |ctx| async move {
            ctx.adapter().scroll(None, 5, None).await?;
            Ok(())
        })
        .requires([Capability::Scroll]);
        let exec = runner()
            .run(&scenario, &[AdapterState::ready(s3.clone())], &cache())
            .await;
        assert_eq!(exec.outcome.status, Status::Skipped);
        assert_eq!(s3.call_count(), 0);
    }

    #[tokio::test]
    async fn provisioning_failure_fails_only_that_backend() {
        let scenario = Scenario::new(1, "noop", Category::Common, |_ctx| async { Ok(()) });
        let adapters = [
            AdapterState::ready(Arc::new(MemoryAdapter::new("good"))),
            AdapterState {
                adapter: Arc::new(MemoryAdapter::new("bad")),
                provisioning_error: Some("index creation refused".into()),
            },
        ];
        let exec = runner().run(&scenario, &adapters, &cache()).await;
        assert_eq!(exec.outcome.backend("good").unwrap().status, Status::Passed);
        let bad = exec.outcome.backend("bad").unwrap();
        assert_eq!(bad.status, Status::Failed);
        assert!(bad.detail.as_deref().unwrap().contains("index creation refused"));
    }

    #[test]
    fn generation_failure_is_found_through_context() {
        let err = anyhow::Error::new(EmbeddingError::Generation("offline".into()))
            .context("embedding query");
        assert!(matches!(
            generation_failure(&err),
            Some(EmbeddingError::Generation(m)) if m == "offline"
        ));
        assert!(generation_failure(&anyhow::anyhow!("plain")).is_none());
    }
}

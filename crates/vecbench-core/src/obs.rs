//! Structured observability hooks for harness run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via `run_span`
//! - Emission functions for key lifecycle events: run start, scenario finish,
//!   run finish, cleanup
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).

use std::collections::BTreeMap;

use tracing::info;

use crate::outcome::Status;

/// Span covering one orchestrator run. Attach it with
/// [`tracing::Instrument`] so it stays correct across await points.
///
/// # Example
///
/// ```ignore
/// orchestrator_future.instrument(run_span("1-25")).await;
/// // every event inside is tagged with selection = "1-25"
/// ```
pub fn run_span(selection: &str) -> tracing::Span {
    tracing::info_span!("vecbench.run", selection = %selection)
}

/// Emit event: run started with the scenario and adapter counts.
pub fn emit_run_started(scenarios: usize, backends: &[&str]) {
    info!(
        event = "run.started",
        scenarios = scenarios,
        backends = %backends.join(","),
    );
}

/// Emit event: one scenario finished.
pub fn emit_scenario_finished(scenario_id: u32, status: Status, elapsed_ms: &BTreeMap<String, u64>) {
    info!(
        event = "scenario.finished",
        scenario_id = scenario_id,
        status = %status,
        elapsed_ms = ?elapsed_ms,
    );
}

/// Emit event: run finished with counts.
pub fn emit_run_finished(passed: usize, failed: usize, skipped: usize, aborted: bool) {
    info!(
        event = "run.finished",
        passed = passed,
        failed = failed,
        skipped = skipped,
        aborted = aborted,
    );
}

/// Emit event: teardown of one backend, or its failure (warning level).
pub fn emit_cleanup(backend: &str, error: Option<&dyn std::fmt::Display>) {
    match error {
        None => info!(event = "cleanup.done", backend = %backend),
        Some(error) => tracing::warn!(event = "cleanup.failed", backend = %backend, error = %error),
    }
}

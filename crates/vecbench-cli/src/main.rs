//! vecbench - Qdrant vs S3 Vectors comparison harness
//!
//! ## Commands
//!
//! - `run`: seed both backends, run the selected scenarios, write the report
//! - `list`: print the scenario catalogue
//! - `cleanup`: tear down every backend's collection or index

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use vecbench_backends::{
    MemoryQdrant, MemoryS3Vectors, QdrantAdapter, QdrantApi, QdrantConfig, QdrantHttp,
    S3VectorsAdapter, S3VectorsConfig,
};
use vecbench_core::{
    BackendAdapter, CleanupPolicy, ConsoleSink, HarnessConfig, HarnessContext,
    HarnessOrchestrator, Report, Selection,
};
use vecbench_scenarios::{catalogue, MovieFixture};

#[derive(Parser)]
#[command(name = "vecbench")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Side-by-side comparison of Qdrant and Amazon S3 Vectors", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Use the in-memory Qdrant emulator instead of a server (S3 Vectors is always emulated)
    #[arg(long, global = true, env = "VECBENCH_OFFLINE")]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios against every backend and write the report
    Run {
        /// Scenarios to run: all, 7, 1,4,7 or 3-9
        #[arg(short, long, default_value = "all", env = "VECBENCH_SELECT")]
        select: Selection,

        /// Teardown policy: none, on-success or always
        #[arg(long)]
        cleanup: Option<CleanupPolicy>,

        /// Text report path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Also write the report as JSON
        #[arg(long)]
        json_report: Option<PathBuf>,

        /// Per-scenario timeout in seconds (0 disables it)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// List the scenario catalogue
    List,

    /// Tear down every backend without running anything
    Cleanup,
}

/// Command-line overrides for [`HarnessConfig`].
#[derive(Debug, Default)]
struct RunOverrides {
    cleanup: Option<CleanupPolicy>,
    report: Option<PathBuf>,
    json_report: Option<PathBuf>,
    timeout_secs: Option<u64>,
}

impl RunOverrides {
    fn apply(self, config: &mut HarnessConfig) {
        if let Some(cleanup) = self.cleanup {
            config.cleanup = cleanup;
        }
        if let Some(path) = self.report {
            config.report_path = path;
        }
        if self.json_report.is_some() {
            config.json_report_path = self.json_report;
        }
        if let Some(secs) = self.timeout_secs {
            config.scenario_timeout_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    vecbench_core::telemetry::init_tracing(cli.json, level);

    let mut config = HarnessConfig::from_env().context("Invalid VECBENCH_* configuration")?;

    match cli.command {
        Commands::Run {
            select,
            cleanup,
            report,
            json_report,
            timeout_secs,
        } => {
            RunOverrides {
                cleanup,
                report,
                json_report,
                timeout_secs,
            }
            .apply(&mut config);
            let report = cmd_run(&config, cli.offline, &select).await?;
            if !report.succeeded() {
                anyhow::bail!(
                    "{} scenario(s) failed{}",
                    report.failed,
                    if report.aborted.is_some() { ", run aborted" } else { "" }
                );
            }
            Ok(())
        }
        Commands::List => {
            cmd_list()?;
            Ok(())
        }
        Commands::Cleanup => cmd_cleanup(&config, cli.offline).await,
    }
}

/// Qdrant (server or emulator) and the S3 Vectors emulator, in report order.
fn build_adapters(dimension: usize, offline: bool) -> Result<Vec<Arc<dyn BackendAdapter>>> {
    let qdrant_config = QdrantConfig::from_env();
    let qdrant_api: Arc<dyn QdrantApi> = if offline {
        Arc::new(MemoryQdrant::new())
    } else {
        Arc::new(
            QdrantHttp::new(
                &qdrant_config.url,
                qdrant_config.api_key.clone(),
                qdrant_config.timeout(),
            )
            .context("Failed to build Qdrant client")?,
        )
    };
    let qdrant = QdrantAdapter::from_config(qdrant_api, &qdrant_config, dimension);

    // No S3 Vectors client ships in this workspace; that side is always emulated.
    let s3_config = S3VectorsConfig::from_env();
    warn!(
        bucket = %s3_config.bucket,
        index = %s3_config.index,
        "s3vectors runs on the in-memory emulator; its timings are not service latencies"
    );
    let s3_api = Arc::new(
        MemoryS3Vectors::new()
            .with_visibility_delay(Duration::from_millis(s3_config.visibility_delay_ms)),
    );
    let s3 = S3VectorsAdapter::from_config(s3_api, &s3_config, dimension);

    info!(
        qdrant = %qdrant_config.url,
        offline,
        bucket = %s3_config.bucket,
        index = %s3_config.index,
        "backends configured"
    );
    Ok(vec![
        Arc::new(qdrant) as Arc<dyn BackendAdapter>,
        Arc::new(s3) as Arc<dyn BackendAdapter>,
    ])
}

fn orchestrator(config: &HarnessConfig, offline: bool) -> Result<HarnessOrchestrator> {
    let embeddings = Arc::new(
        config
            .embedding_cache()
            .context("Failed to set up the embedding cache")?,
    );
    let adapters = build_adapters(config.embedding_dimension, offline)?;
    let context = HarnessContext::new(adapters, embeddings, Arc::new(ConsoleSink));
    Ok(HarnessOrchestrator::new(catalogue()?, context)
        .with_fixture(Arc::new(MovieFixture))
        .with_cleanup(config.cleanup)
        .with_timeout(config.scenario_timeout()))
}

async fn cmd_run(config: &HarnessConfig, offline: bool, select: &Selection) -> Result<Report> {
    let orchestrator = orchestrator(config, offline)?;
    let report = orchestrator.run(select).await?;

    println!();
    print!("{}", report.render_text());

    report.write_text(&config.report_path)?;
    println!("Report written to {}", config.report_path.display());
    if let Some(path) = &config.json_report_path {
        report.write_json(path)?;
        println!("JSON report written to {}", path.display());
    }
    info!(
        passed = report.passed,
        failed = report.failed,
        skipped = report.skipped,
        "run complete"
    );
    Ok(report)
}

fn cmd_list() -> Result<()> {
    let registry = catalogue()?;
    println!("{:>3}  {:<12} {:<42} REQUIRES", "ID", "CATEGORY", "TITLE");
    for scenario in registry.all() {
        let required: Vec<&str> = scenario
            .required_capabilities()
            .iter()
            .map(|c| c.as_str())
            .collect();
        println!(
            "{:>3}  {:<12} {:<42} {}",
            scenario.id(),
            scenario.category().to_string(),
            scenario.title(),
            required.join(", ")
        );
    }
    Ok(())
}

async fn cmd_cleanup(config: &HarnessConfig, offline: bool) -> Result<()> {
    orchestrator(config, offline)?
        .cleanup_only()
        .await
        .context("Cleanup failed")?;
    println!("All backends torn down");
    Ok(())
}

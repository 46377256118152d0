//! pulsegated — the Pulsegate daemon.
//!
//! Assembles the export pipeline around a self-observing snapshot
//! source and an HTTP push transport:
//! - Configuration (TOML file + CLI overrides)
//! - Snapshot source (pipeline self-stats)
//! - HTTP push transport
//! - Scheduler + delivery queue + exporter worker
//!
//! # Usage
//!
//! ```text
//! pulsegated run --config pulsegate.toml --endpoint http://gateway:9091
//! ```
//!
//! Runs until ctrl-c, then drains pending batches within the
//! configured drain timeout.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use pulsegate_core::{PipelineConfig, parse_duration};
use pulsegate_pipeline::{Pipeline, PipelineStats, StatsSource};
use pulsegate_transport::HttpPushTransport;

#[derive(Parser)]
#[command(name = "pulsegated", about = "Pulsegate metrics export daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the export pipeline until interrupted.
    Run {
        /// Path to a pulsegate.toml config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Sink endpoint override, e.g. http://gateway:9091.
        #[arg(long)]
        endpoint: Option<String>,

        /// Capture interval override, e.g. "30s".
        #[arg(long)]
        interval: Option<String>,

        /// Job name override for the push URL.
        #[arg(long)]
        job: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pulsegated=debug,pulsegate_pipeline=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            endpoint,
            interval,
            job,
        } => run(config, endpoint, interval, job).await,
    }
}

async fn run(
    config_path: Option<PathBuf>,
    endpoint: Option<String>,
    interval: Option<String>,
    job: Option<String>,
) -> anyhow::Result<()> {
    let mut config = match &config_path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(endpoint) = endpoint {
        config.sink.endpoint = endpoint;
    }
    if let Some(interval) = interval {
        config.interval = parse_duration(&interval)?;
    }
    if let Some(job) = job {
        config.sink.job = job;
    }
    config.validate()?;

    info!(
        endpoint = %config.sink.endpoint,
        job = %config.sink.job,
        interval_ms = config.interval.as_millis() as u64,
        "pulsegated starting"
    );

    // Transport.
    let transport = Arc::new(HttpPushTransport::new(&config.sink)?);

    // The daemon exports the pipeline's own counters; an embedding
    // application would inject its registry-backed source here.
    let stats = Arc::new(PipelineStats::default());
    let source = Arc::new(StatsSource::new(stats.clone()));

    let pipeline = Pipeline::spawn_with_stats(config, source, transport, stats);

    tokio::signal::ctrl_c().await?;
    info!("interrupt received");
    pipeline.shutdown().await;

    Ok(())
}

//! Sea-ice forecast ingester.
//!
//! Loads NetCDF forecast files and incrementally writes their grid cells,
//! forecasts, latest view and metadata into PostGIS.

mod config;
mod ingest;

use anyhow::{bail, Result};
use clap::Parser;
use icenet_common::human_readable;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use storage::{Connector, MemoryStore, PgConnector};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::IngesterConfig;
use ingestion::Pipeline;

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Ingest sea-ice forecast NetCDF files into PostGIS")]
struct Args {
    /// YAML configuration file (default: PSQL_* and ICENET_* environment variables)
    #[arg(short, long, env = "ICENET_CONFIG")]
    config: Option<PathBuf>,

    /// Files processed at the same time
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Run against an in-memory store instead of the database
    #[arg(long)]
    dry_run: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_listen: Option<SocketAddr>,

    /// Forecast files to ingest
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true);
    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    if let Some(addr) = args.metrics_listen {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!(addr = %addr, "Prometheus metrics exporter listening");
    }

    let config = match &args.config {
        Some(path) => IngesterConfig::from_yaml(path)?,
        None => IngesterConfig::from_env()?,
    };
    info!(
        database = %config.database.describe(),
        batch_size = config.ingestion.batch_size,
        max_retries = config.ingestion.retry.max_retries,
        dry_run = args.dry_run,
        "Loaded configuration"
    );

    let connector: Arc<dyn Connector> = if args.dry_run {
        warn!("Dry run: writing to an in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(PgConnector::new(&config.database)?)
    };
    let pipeline = Pipeline::new(connector, config.ingestion)?;

    info!(files = args.files.len(), concurrency = args.concurrency, "Starting ingestion");
    let started = Instant::now();
    let outcomes = ingest::ingest_all(&pipeline, &args.files, args.concurrency).await;

    let failed: Vec<_> = outcomes.iter().filter(|o| o.result.is_err()).collect();
    for outcome in &failed {
        if let Err(e) = &outcome.result {
            error!(path = %outcome.path.display(), error = %e, "File failed");
        }
    }
    info!(
        files = outcomes.len(),
        failed = failed.len(),
        elapsed = %human_readable(started.elapsed()),
        "Ingestion finished"
    );

    if !failed.is_empty() {
        bail!("{} of {} files failed", failed.len(), outcomes.len());
    }
    Ok(())
}

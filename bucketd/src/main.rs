mod config;

use clap::Parser;
use config::{Config, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use registry::config::SnapshotStoreType;
use registry::service::Registry;
use registry::store::{FilesystemSnapshotStore, MemorySnapshotStore, SnapshotStore, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Tracks which bucket each automated test belongs to, per project, and the
/// history of bucket reassignments.
#[derive(Parser)]
#[command(name = "bucketd")]
struct Cli {
    /// Path to the YAML config file. Defaults apply when omitted.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
enum MetricsError {
    #[error("could not build statsd recorder: {0}")]
    Build(#[from] metrics_exporter_statsd::StatsdError),
    #[error("could not install metrics recorder: {0}")]
    Install(String),
}

fn install_metrics(cfg: &MetricsConfig) -> Result<(), MetricsError> {
    let recorder = StatsdBuilder::from(cfg.statsd_host.as_str(), cfg.statsd_port)
        .build(Some("bucketd"))?;
    metrics::set_global_recorder(recorder).map_err(|err| MetricsError::Install(err.to_string()))?;
    registry::metrics_defs::describe_all();
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match &cli.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(error = %err, "failed to load config");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    // Keep the guard alive for the lifetime of the process.
    let _sentry_guard = config.common.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions::default(),
        ))
    });

    if let Some(metrics_cfg) = &config.common.metrics {
        if let Err(err) = install_metrics(metrics_cfg) {
            tracing::error!(error = %err, "failed to set up metrics");
            std::process::exit(1);
        }
    }

    let snapshots: Arc<dyn SnapshotStore> = match &config.registry.snapshot_store.r#type {
        SnapshotStoreType::Memory => Arc::new(MemorySnapshotStore),
        SnapshotStoreType::Filesystem { base_dir, filename } => {
            Arc::new(FilesystemSnapshotStore::new(base_dir, filename))
        }
    };

    let store = match Store::open(snapshots) {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(error = %err, "failed to open record store");
            std::process::exit(1);
        }
    };

    let registry = Registry::new(store);
    if let Err(err) = registry::api::serve(config.registry.listener.clone(), registry).await {
        tracing::error!(error = %err, "server exited");
        std::process::exit(1);
    }
}

//! SalesGate relay - Main entry point
//!
//! Runs the staging relay against in-process collaborators: an object store
//! (on disk when `data_dir` is set, otherwise in memory), a local message bus
//! and an in-memory key-value store filled from the registry seed file.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use salesgate_common::bus::LocalBus;
use salesgate_common::config::{self, LoggingConfig, TomlConfig};
use salesgate_common::kv::InMemoryKeyValueStore;
use salesgate_common::object_store::{FileObjectStore, InMemoryObjectStore, ObjectStore};
use salesgate_relay::resolver::seed_registry;
use salesgate_relay::{Relay, RelayContext};

/// Command-line arguments for salesgate-relay
#[derive(Parser, Debug)]
#[command(name = "salesgate-relay")]
#[command(about = "Staging relay for SalesGate dataset submissions")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "SALESGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory of the filesystem object store
    #[arg(long, env = "SALESGATE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Seconds between republish ticks
    #[arg(long, env = "SALESGATE_REPUBLISH_INTERVAL")]
    republish_interval: Option<u64>,

    /// Objects listed per republish tick
    #[arg(long, env = "SALESGATE_LIST_LIMIT")]
    list_limit: Option<usize>,

    /// TOML file of registry entries applied at startup
    #[arg(long, env = "SALESGATE_REGISTRY_SEED")]
    registry_seed: Option<PathBuf>,

    /// Pipeline passes allowed to run at once
    #[arg(long, env = "SALESGATE_MAX_TASKS")]
    max_tasks: Option<usize>,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "SALESGATE_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    /// Apply command-line and environment overrides on top of the file
    fn apply(&self, config: &mut TomlConfig) {
        let relay = &mut config.relay;
        if let Some(dir) = &self.data_dir {
            relay.data_dir = Some(dir.clone());
        }
        if let Some(secs) = self.republish_interval {
            relay.republish_interval_secs = secs;
        }
        if let Some(limit) = self.list_limit {
            relay.list_limit = limit;
        }
        if let Some(seed) = &self.registry_seed {
            relay.registry_seed = Some(seed.clone());
        }
        if let Some(max) = self.max_tasks {
            relay.max_concurrent_tasks = max;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "salesgate_relay={level},salesgate_common={level}",
            level = logging.level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let config_path = config::resolve_config_path(args.config.as_deref(), config::CONFIG_ENV_VAR);
    let mut toml_config =
        config::load_toml_config(config_path.as_deref()).context("Failed to load config file")?;
    args.apply(&mut toml_config);

    init_logging(&toml_config.logging)?;

    info!("Starting SalesGate relay v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let settings = toml_config.relay;
    settings.validate().context("Invalid relay settings")?;

    let store: Arc<dyn ObjectStore> = match &settings.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
            info!("Object store: {}", dir.display());
            Arc::new(FileObjectStore::new(dir.clone()))
        }
        None => {
            info!("Object store: in memory");
            Arc::new(InMemoryObjectStore::new())
        }
    };

    let seed = settings.registry_seed.clone();
    let ctx = RelayContext::new(
        store,
        Arc::new(LocalBus::default()),
        Arc::new(InMemoryKeyValueStore::new()),
        settings,
    );

    match &seed {
        Some(path) => {
            seed_registry(&ctx.registry, path)
                .await
                .context("Failed to seed registry")?;
        }
        None => warn!("No registry seed configured, every submitter is unknown"),
    }

    let relay = Relay::new(ctx);

    let cancel = relay.cancellation_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel.cancel();
    });

    relay.run().await.context("Relay failed")?;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

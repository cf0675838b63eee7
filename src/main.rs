//! meta-relay binary.
//!
//! ```text
//!   host app ──JSON-RPC──▶ http ──▶ engine ──▶ pipeline stages ──▶ remote node
//!                                                  │
//!                                   approval ─▶ signing ─▶ relayer
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use meta_relay::approval::PolicyGate;
use meta_relay::config::validation::validate_config;
use meta_relay::config::watcher::{apply_updates, ConfigWatcher};
use meta_relay::config::{load_config, ConfigError, RelayConfig};
use meta_relay::engine::EngineBuilder;
use meta_relay::http::RelayServer;
use meta_relay::observability::{logging, metrics};
use meta_relay::signing::LocalKeyHolder;

#[derive(Parser)]
#[command(name = "meta-relay")]
#[command(about = "Signing and relay bridge for meta-transactions", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let config = RelayConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            config
        }
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.observability.log_level);
    logging::init_logging(level)?;

    tracing::info!("meta-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        rpc_url = %config.transport.rpc_url,
        publish_url = %config.relayer.publish_url,
        approval_mode = ?config.approval.mode,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let keys = Arc::new(LocalKeyHolder::from_env()?);
    tracing::info!(accounts = keys.len(), "Key holder ready");

    let gate = PolicyGate::new(config.approval.clone());
    let engine = Arc::new(EngineBuilder::from_config(&config, keys, Arc::new(gate.clone()))?.build()?);

    // Hot reload of the approval policy. The watcher must stay alive.
    let _watcher = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            tokio::spawn(apply_updates(updates, gate));
            Some(watcher.run()?)
        }
        None => None,
    };

    let mut blocks = engine.subscribe_blocks();
    tokio::spawn(async move {
        while let Some(block) = blocks.recv().await {
            tracing::info!(block_number = block.number, block_hash = %block.hash, "BLOCK CHANGED");
        }
    });
    let mut errors = engine.subscribe_errors();
    tokio::spawn(async move {
        while let Some(error) = errors.recv().await {
            tracing::error!(error = %error.message, "Connectivity error");
        }
    });

    let poller = engine.start();

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = RelayServer::new(config.listener.clone(), engine.clone());
    server.run(listener, shutdown_signal()).await?;

    engine.stop();
    if let Some(handle) = poller {
        let _ = handle.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

//! Remote Orchestrator Daemon - Main Entry Point
//! Wires the SSH transport and file stores into the orchestrator and serves the tools

mod config;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use config::Args;
use orchestrator_api_rpc::RpcServer;
use orchestrator_core::application::{Orchestrator, OrchestratorPorts};
use orchestrator_core::port::{ShortUuidProvider, SystemTimeProvider};
use orchestrator_infra_ssh::SshTransport;
use orchestrator_infra_store::{FileSnapshotStore, JsonAuditHistory, JsonServerCatalog};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Logging
    let _log_guard = logging::init(args.log_format, args.log_dir())?;
    info!("Remote orchestrator v{} starting...", VERSION);

    // 2. Data directory
    let data_dir = args.data_dir();
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("Cannot create data directory {}", data_dir.display()))?;
    info!(data_dir = %data_dir.display(), "Using data directory");

    // 3. Adapters (DI wiring)
    let catalog = Arc::new(JsonServerCatalog::new(&data_dir));
    let ports = OrchestratorPorts {
        transport: Arc::new(SshTransport::new()),
        resolver: catalog.clone(),
        catalog,
        snapshots: Arc::new(FileSnapshotStore::new(&data_dir)),
        audit: Arc::new(JsonAuditHistory::new(&data_dir)),
        time_provider: Arc::new(SystemTimeProvider),
        id_provider: Arc::new(ShortUuidProvider),
    };

    // 4. Orchestrator: restore the queue, start maintenance
    let orchestrator = Arc::new(
        Orchestrator::new(args.orchestrator_config(), ports)
            .context("Invalid orchestrator configuration")?,
    );
    let restored = orchestrator.start().await;
    info!(restored, "Job queue ready");

    // 5. JSON-RPC server
    let rpc_handle = RpcServer::new(args.rpc_config(), orchestrator.clone())
        .start()
        .await
        .context("RPC server start failed")?;

    info!("System ready. Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Stop accepting calls, then flush the queue and close connections
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    rpc_handle.stopped().await;
    orchestrator.shutdown().await;

    info!("Shutdown complete.");
    Ok(())
}

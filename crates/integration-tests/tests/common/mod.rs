//! Shared wiring: file-backed stores in a temp dir, scripted transport

#![allow(dead_code)]

use orchestrator_core::application::{Orchestrator, OrchestratorPorts};
use orchestrator_core::domain::ServerConfig;
use orchestrator_core::port::id_provider::mocks::SequentialIdProvider;
use orchestrator_core::port::transport::mocks::MockTransport;
use orchestrator_core::port::{ServerCatalog, SystemTimeProvider};
use orchestrator_core::OrchestratorConfig;
use orchestrator_infra_store::{FileSnapshotStore, JsonAuditHistory, JsonServerCatalog};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub fn fast_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.executor.sync_timeout = Duration::from_secs(2);
    config.pool.acquire_timeout = Duration::from_millis(300);
    config.pool.poll_interval = Duration::from_millis(20);
    config.pool.retry_backoff = Duration::from_millis(10);
    config.shutdown_grace = Duration::from_secs(2);
    config
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub catalog: Arc<JsonServerCatalog>,
    pub history: Arc<JsonAuditHistory>,
}

pub async fn harness(dir: &Path, transport: MockTransport, config: OrchestratorConfig) -> Harness {
    let catalog = Arc::new(JsonServerCatalog::new(dir));
    catalog
        .add("web", ServerConfig::new("10.0.0.5", "deploy").with_password("pw"))
        .await
        .unwrap();
    let history = Arc::new(JsonAuditHistory::new(dir));

    let orchestrator = Orchestrator::new(
        config,
        OrchestratorPorts {
            transport: Arc::new(transport),
            resolver: catalog.clone(),
            catalog: catalog.clone(),
            snapshots: Arc::new(FileSnapshotStore::new(dir)),
            audit: history.clone(),
            time_provider: Arc::new(SystemTimeProvider),
            id_provider: Arc::new(SequentialIdProvider::new()),
        },
    )
    .unwrap();

    Harness {
        orchestrator: Arc::new(orchestrator),
        catalog,
        history,
    }
}

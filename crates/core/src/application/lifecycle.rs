// Orchestrator Lifecycle
// Builds the services once, starts maintenance, runs the shutdown sequence

use crate::application::executor::JobExecutor;
use crate::application::maintenance::{MaintenanceIntervals, MaintenanceScheduler};
use crate::application::pool::ConnectionPool;
use crate::application::queue::JobQueue;
use crate::application::shutdown::{shutdown_channel, ShutdownSender};
use crate::application::submit::TaskService;
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::port::{
    AliasResolver, AuditSink, IdProvider, RemoteTransport, ServerCatalog, SnapshotStore,
    TimeProvider,
};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Adapters the orchestrator is built from
///
/// `resolver` and `catalog` are usually the same store.
pub struct OrchestratorPorts {
    pub transport: Arc<dyn RemoteTransport>,
    pub resolver: Arc<dyn AliasResolver>,
    pub catalog: Arc<dyn ServerCatalog>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub audit: Arc<dyn AuditSink>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub id_provider: Arc<dyn IdProvider>,
}

#[derive(Default)]
struct Running {
    sender: Option<ShutdownSender>,
    loops: Vec<JoinHandle<()>>,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    queue: Arc<JobQueue>,
    pool: Arc<ConnectionPool>,
    executor: Arc<JobExecutor>,
    tasks: Arc<TaskService>,
    catalog: Arc<dyn ServerCatalog>,
    running: Mutex<Running>,
}

impl Orchestrator {
    /// Wire queue, pool, executor and submission service
    ///
    /// # Errors
    /// - AppError::Config if the configuration is inconsistent
    pub fn new(config: OrchestratorConfig, ports: OrchestratorPorts) -> Result<Self> {
        config.validate()?;

        let queue = Arc::new(JobQueue::new(
            config.queue.clone(),
            ports.snapshots,
            ports.time_provider.clone(),
            ports.id_provider,
        ));
        let pool = Arc::new(ConnectionPool::new(
            config.pool.clone(),
            ports.transport.clone(),
            ports.time_provider.clone(),
            queue.log().clone(),
        ));
        let executor = Arc::new(JobExecutor::new(
            queue.clone(),
            pool.clone(),
            ports.resolver,
            ports.transport,
            config.executor.clone(),
        ));
        let tasks = Arc::new(TaskService::new(
            queue.clone(),
            executor.clone(),
            ports.audit,
            ports.time_provider,
        ));

        Ok(Self {
            config,
            queue,
            pool,
            executor,
            tasks,
            catalog: ports.catalog,
            running: Mutex::new(Running::default()),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn executor(&self) -> &Arc<JobExecutor> {
        &self.executor
    }

    pub fn tasks(&self) -> &Arc<TaskService> {
        &self.tasks
    }

    pub fn catalog(&self) -> &Arc<dyn ServerCatalog> {
        &self.catalog
    }

    /// Restore the persisted queue and start the maintenance loops
    ///
    /// Returns the number of restored jobs.
    pub async fn start(&self) -> usize {
        let restored = self.queue.restore().await;
        let crashed = self.queue.crashed_jobs();
        if !crashed.is_empty() {
            warn!(count = crashed.len(), "Jobs interrupted by the last shutdown can be retried");
            self.queue.log().warn(format!(
                "{} interrupted jobs can be retried: {}",
                crashed.len(),
                crashed
                    .iter()
                    .map(|job| job.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        let (sender, token) = shutdown_channel();
        let scheduler = MaintenanceScheduler::new(
            self.queue.clone(),
            self.pool.clone(),
            MaintenanceIntervals {
                autosave: self.config.queue.save_interval,
                cleanup: self.config.queue.cleanup_interval,
                reap: self.config.pool.reap_interval,
            },
        );
        let loops = scheduler.spawn(token);

        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = running.sender.replace(sender) {
            previous.shutdown();
        }
        running.loops.extend(loops);
        drop(running);

        info!(restored, "Orchestrator started");
        restored
    }

    /// Stop the loops, flush the queue and close every connection within the grace period
    pub async fn shutdown(&self) {
        let (sender, loops) = {
            let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            (running.sender.take(), std::mem::take(&mut running.loops))
        };
        if let Some(sender) = sender {
            let listening = sender.shutdown();
            debug!(listening, "Maintenance loops signalled");
        }
        info!(grace_ms = self.config.shutdown_grace.as_millis() as u64, "Orchestrator shutting down");

        let sequence = async {
            for handle in loops {
                let _ = handle.await;
            }
            if let Err(e) = self.queue.flush().await {
                error!(error = %e, "Final queue save failed");
            }
            self.pool.close_all().await;
        };
        if tokio::time::timeout(self.config.shutdown_grace, sequence)
            .await
            .is_err()
        {
            warn!("Shutdown grace period elapsed before cleanup finished");
        }
        info!("Orchestrator stopped");
    }
}

// Maintenance Scheduler
// Periodic queue autosave, old-job cleanup and idle connection reaping

use crate::application::pool::ConnectionPool;
use crate::application::queue::JobQueue;
use crate::application::shutdown::ShutdownToken;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Tick periods of the background loops
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceIntervals {
    pub autosave: Duration,
    pub cleanup: Duration,
    pub reap: Duration,
}

/// Maintenance scheduler
///
/// Each loop runs on its own task until the shutdown token fires.
pub struct MaintenanceScheduler {
    queue: Arc<JobQueue>,
    pool: Arc<ConnectionPool>,
    intervals: MaintenanceIntervals,
}

impl MaintenanceScheduler {
    /// # Arguments
    /// * `queue` - Queue to autosave and clean
    /// * `pool` - Pool to reap
    /// * `intervals` - Loop periods
    pub fn new(queue: Arc<JobQueue>, pool: Arc<ConnectionPool>, intervals: MaintenanceIntervals) -> Self {
        Self {
            queue,
            pool,
            intervals,
        }
    }

    /// Spawn all loops; they end when `shutdown` fires
    pub fn spawn(self, shutdown: ShutdownToken) -> Vec<JoinHandle<()>> {
        info!(
            autosave_ms = self.intervals.autosave.as_millis() as u64,
            cleanup_secs = self.intervals.cleanup.as_secs(),
            reap_secs = self.intervals.reap.as_secs(),
            "Maintenance scheduler started"
        );
        let scheduler = Arc::new(self);

        let autosave = {
            let s = scheduler.clone();
            let token = shutdown.clone();
            tokio::spawn(async move {
                run_every("autosave", s.intervals.autosave, token, || {
                    let s = s.clone();
                    async move { s.autosave().await }
                })
                .await
            })
        };
        let cleanup = {
            let s = scheduler.clone();
            let token = shutdown.clone();
            tokio::spawn(async move {
                run_every("cleanup", s.intervals.cleanup, token, || {
                    let s = s.clone();
                    async move { s.cleanup() }
                })
                .await
            })
        };
        let reap = {
            let s = scheduler;
            tokio::spawn(async move {
                run_every("reap", s.intervals.reap, shutdown, || {
                    let s = s.clone();
                    async move { s.reap().await }
                })
                .await
            })
        };
        vec![autosave, cleanup, reap]
    }

    /// Save the queue if it changed
    pub async fn autosave(&self) {
        match self.queue.save().await {
            Ok(true) => debug!("Queue autosaved"),
            Ok(false) => {}
            Err(e) => error!(error = %e, "Queue autosave failed"),
        }
    }

    pub fn cleanup(&self) {
        let removed = self.queue.clean_old_jobs();
        if removed > 0 {
            info!(removed, "Old jobs cleaned up");
        }
    }

    pub async fn reap(&self) {
        let closed = self.pool.reap_idle().await;
        if closed > 0 {
            info!(closed, "Idle connections reaped");
        }
    }
}

async fn run_every<F, Fut>(name: &'static str, period: Duration, mut shutdown: ShutdownToken, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    tick.tick().await;

    loop {
        tokio::select! {
            _ = tick.tick() => job().await,
            _ = shutdown.wait() => {
                debug!(task = name, "Maintenance loop stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::shutdown::shutdown_channel;
    use crate::config::{PoolConfig, QueueConfig};
    use crate::domain::{CommandSpec, JobSpec, NewJob};
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::snapshot_store::mocks::MemorySnapshotStore;
    use crate::port::time_provider::mocks::ManualClock;
    use crate::port::transport::mocks::MockTransport;

    #[tokio::test]
    async fn test_autosave_loop_persists_and_stops() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(MemorySnapshotStore::new());
        let queue = Arc::new(JobQueue::new(
            QueueConfig::default(),
            store.clone(),
            clock.clone(),
            Arc::new(SequentialIdProvider::new()),
        ));
        let pool = Arc::new(ConnectionPool::new(
            PoolConfig::default(),
            Arc::new(MockTransport::new()),
            clock,
            queue.log().clone(),
        ));
        queue
            .add_job(NewJob::new("web", JobSpec::Ssh(CommandSpec::new("uptime"))))
            .unwrap();

        let scheduler = MaintenanceScheduler::new(
            queue.clone(),
            pool,
            MaintenanceIntervals {
                autosave: Duration::from_millis(20),
                cleanup: Duration::from_secs(3600),
                reap: Duration::from_secs(3600),
            },
        );
        let (sender, token) = shutdown_channel();
        let handles = scheduler.spawn(token);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.primary().unwrap().contains("uptime"));
        assert!(!queue.is_dirty());

        sender.shutdown();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}

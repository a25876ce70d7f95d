// Orchestrator Configuration
// Built once by the daemon, then handed to each service by value

use crate::error::{AppError, Result};
use std::time::Duration;

/// Job queue tuning
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_queue_size: usize,
    /// Debounce between autosave ticks
    pub save_interval: Duration,
    /// Finished jobs older than this leave the snapshot and become evictable
    pub retention: Duration,
    pub cleanup_interval: Duration,
    pub log_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            save_interval: Duration::from_secs(5),
            retention: Duration::from_secs(24 * 3600),
            cleanup_interval: Duration::from_secs(3600),
            log_capacity: 500,
        }
    }
}

/// Connection pool tuning (per alias)
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub min_connections: usize,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
    /// Fallback poll while waiting for a release notification
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
    pub connect_retries: u32,
    /// Linear backoff unit: attempt N waits N times this
    pub retry_backoff: Duration,
    pub reap_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            idle_timeout: Duration::from_secs(300),
            acquire_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(20),
            keepalive_interval: Duration::from_secs(30),
            connect_retries: 3,
            retry_backoff: Duration::from_secs(2),
            reap_interval: Duration::from_secs(60),
        }
    }
}

/// Executor and submission tuning
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// How long a submission waits before handing the job to the background
    pub sync_timeout: Duration,
    pub command_timeout: Duration,
    pub interactive_timeout: Duration,
    /// Output line cap for pooled commands
    pub max_lines: usize,
    /// Line budget injected into rewritten streaming commands, unless the job sets `max_lines`
    pub stream_lines: usize,
    /// Hard timeout injected into rewritten streaming commands
    pub stream_timeout: Duration,
    pub interrupt_grace: Duration,
    pub marker_delay: Duration,
    /// Silence after which an auto-responding shell gets its completion marker unprompted
    pub prompt_quiet: Duration,
    pub max_retries_limit: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            sync_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(300),
            interactive_timeout: Duration::from_secs(120),
            max_lines: 1000,
            stream_lines: 100,
            stream_timeout: Duration::from_secs(10),
            interrupt_grace: Duration::from_millis(500),
            marker_delay: Duration::from_millis(100),
            prompt_quiet: Duration::from_secs(2),
            max_retries_limit: 10,
        }
    }
}

/// Root configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub queue: QueueConfig,
    pub pool: PoolConfig,
    pub executor: ExecutorConfig,
    pub shutdown_grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            pool: PoolConfig::default(),
            executor: ExecutorConfig::default(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl OrchestratorConfig {
    /// Reject settings the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue.max_queue_size == 0 {
            return Err(AppError::Config("max_queue_size must be > 0".into()));
        }
        if self.queue.log_capacity == 0 {
            return Err(AppError::Config("log_capacity must be > 0".into()));
        }
        if self.pool.max_connections == 0 {
            return Err(AppError::Config("max_connections must be > 0".into()));
        }
        if self.pool.min_connections > self.pool.max_connections {
            return Err(AppError::Config(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.pool.min_connections, self.pool.max_connections
            )));
        }
        if self.queue.save_interval.is_zero() || self.pool.reap_interval.is_zero() {
            return Err(AppError::Config("intervals must be non-zero".into()));
        }
        if self.executor.max_lines == 0 {
            return Err(AppError::Config("max_lines must be > 0".into()));
        }
        Ok(())
    }
}

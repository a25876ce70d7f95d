//! Daemon Configuration
//!
//! Command-line flags with environment fallbacks, folded into `OrchestratorConfig`.

use clap::{Parser, ValueEnum};
use orchestrator_api_rpc::RpcServerConfig;
use orchestrator_core::OrchestratorConfig;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DATA_DIR: &str = "~/.orchestrator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "orchestratord")]
#[command(about = "Remote execution orchestrator daemon", long_about = None)]
#[command(version)]
pub struct Args {
    /// Directory holding queue.json, servers.json and history.json
    #[arg(long, env = "ORCHESTRATOR_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    /// How long a submission waits for its result before returning
    #[arg(long, env = "ORCHESTRATOR_SYNC_TIMEOUT_SECS", default_value_t = 10)]
    pub sync_timeout_secs: u64,

    #[arg(long, env = "ORCHESTRATOR_COMMAND_TIMEOUT_MS", default_value_t = 300_000)]
    pub command_timeout_ms: u64,

    #[arg(long, env = "ORCHESTRATOR_INTERACTIVE_TIMEOUT_MS", default_value_t = 120_000)]
    pub interactive_timeout_ms: u64,

    /// Silence before an auto-responding shell is told to finish
    #[arg(long, env = "ORCHESTRATOR_PROMPT_QUIET_MS", default_value_t = 2_000)]
    pub prompt_quiet_ms: u64,

    /// Per-alias connection cap
    #[arg(long, env = "ORCHESTRATOR_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: usize,

    /// Per-alias floor kept through idle reaping
    #[arg(long, env = "ORCHESTRATOR_MIN_CONNECTIONS", default_value_t = 1)]
    pub min_connections: usize,

    #[arg(long, env = "ORCHESTRATOR_IDLE_TIMEOUT_SECS", default_value_t = 300)]
    pub idle_timeout_secs: u64,

    #[arg(long, env = "ORCHESTRATOR_KEEPALIVE_SECS", default_value_t = 30)]
    pub keepalive_secs: u64,

    #[arg(long, env = "ORCHESTRATOR_MAX_QUEUE_SIZE", default_value_t = 1000)]
    pub max_queue_size: usize,

    #[arg(long, env = "ORCHESTRATOR_SAVE_INTERVAL_MS", default_value_t = 5_000)]
    pub save_interval_ms: u64,

    /// Finished jobs older than this are dropped
    #[arg(long, env = "ORCHESTRATOR_HISTORY_RETENTION_HOURS", default_value_t = 24)]
    pub history_retention_hours: u64,

    #[arg(long, env = "ORCHESTRATOR_RPC_HOST", default_value = "127.0.0.1")]
    pub rpc_host: String,

    #[arg(long, env = "ORCHESTRATOR_RPC_PORT", default_value_t = 9527)]
    pub rpc_port: u16,

    #[arg(long, env = "ORCHESTRATOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Also write JSON logs to a daily rolling file in this directory
    #[arg(long, env = "ORCHESTRATOR_LOG_DIR")]
    pub log_dir: Option<String>,
}

impl Args {
    pub fn data_dir(&self) -> PathBuf {
        shellexpand::tilde(&self.data_dir).into_owned().into()
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log_dir
            .as_ref()
            .map(|dir| shellexpand::tilde(dir).into_owned().into())
    }

    /// Defaults overridden by the flags; validated later by `Orchestrator::new`
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();

        config.queue.max_queue_size = self.max_queue_size;
        config.queue.save_interval = Duration::from_millis(self.save_interval_ms);
        config.queue.retention = Duration::from_secs(self.history_retention_hours * 3600);

        config.pool.max_connections = self.max_connections;
        config.pool.min_connections = self.min_connections;
        config.pool.idle_timeout = Duration::from_secs(self.idle_timeout_secs);
        config.pool.keepalive_interval = Duration::from_secs(self.keepalive_secs);

        config.executor.sync_timeout = Duration::from_secs(self.sync_timeout_secs);
        config.executor.command_timeout = Duration::from_millis(self.command_timeout_ms);
        config.executor.interactive_timeout = Duration::from_millis(self.interactive_timeout_ms);
        config.executor.prompt_quiet = Duration::from_millis(self.prompt_quiet_ms);

        config
    }

    pub fn rpc_config(&self) -> RpcServerConfig {
        RpcServerConfig {
            host: self.rpc_host.clone(),
            port: self.rpc_port,
        }
    }
}

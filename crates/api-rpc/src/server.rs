//! JSON-RPC Server
//!
//! Registers every tool on one RpcModule and serves it over HTTP on localhost.

use crate::handler::RpcHandler;
use crate::types::{DiagnosticsRequest, HistoryRequest, LogsRequest, QueueRequest};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use orchestrator_core::application::Orchestrator;
use orchestrator_core::error::{AppError, Result};
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9527;

/// Every method the server exposes
pub const TOOL_NAMES: [&str; 19] = [
    "task_exec",
    "task_exec_interactive",
    "task_exec_sequence",
    "task_transfer",
    "task_transfer_multi",
    "task_status",
    "task_queue",
    "task_history",
    "task_retry",
    "task_logs",
    "queue_stats",
    "pool_stats",
    "system_diagnostics",
    "server_add",
    "server_list",
    "server_remove",
    "get_pm2_logs",
    "get_docker_logs",
    "tail_file",
];

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

fn registration_error(err: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("method registration failed: {}", err))
}

/// Build the module with all tools bound to `handler`
///
/// Tools without required parameters accept `null`, `{}` or no params at all.
pub fn build_module(handler: Arc<RpcHandler>) -> Result<RpcModule<RpcHandler>> {
    let mut module = RpcModule::from_arc(handler);

    module
        .register_async_method("task_exec", |params, handler, _| async move {
            handler.task_exec(params.parse()?).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("task_exec_interactive", |params, handler, _| async move {
            handler.task_exec_interactive(params.parse()?).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("task_exec_sequence", |params, handler, _| async move {
            handler.task_exec_sequence(params.parse()?).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("task_transfer", |params, handler, _| async move {
            handler.task_transfer(params.parse()?).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("task_transfer_multi", |params, handler, _| async move {
            handler.task_transfer_multi(params.parse()?).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("get_pm2_logs", |params, handler, _| async move {
            handler.get_pm2_logs(params.parse()?).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("get_docker_logs", |params, handler, _| async move {
            handler.get_docker_logs(params.parse()?).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("tail_file", |params, handler, _| async move {
            handler.tail_file(params.parse()?).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("task_status", |params, handler, _| async move {
            handler.task_status(params.parse()?).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("task_queue", |params, handler, _| async move {
            let req = params.parse::<Option<QueueRequest>>()?.unwrap_or_default();
            handler.task_queue(req).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("task_history", |params, handler, _| async move {
            let req = params.parse::<Option<HistoryRequest>>()?.unwrap_or_default();
            handler.task_history(req).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("task_retry", |params, handler, _| async move {
            handler.task_retry(params.parse()?).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("task_logs", |params, handler, _| async move {
            let req = params.parse::<Option<LogsRequest>>()?.unwrap_or_default();
            handler.task_logs(req).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("queue_stats", |_, handler, _| async move {
            handler.queue_stats().await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("pool_stats", |_, handler, _| async move {
            handler.pool_stats().await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("system_diagnostics", |params, handler, _| async move {
            let req = params.parse::<Option<DiagnosticsRequest>>()?.unwrap_or_default();
            handler.system_diagnostics(req).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("server_add", |params, handler, _| async move {
            handler.server_add(params.parse()?).await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("server_list", |_, handler, _| async move {
            handler.server_list().await
        })
        .map_err(registration_error)?;
    module
        .register_async_method("server_remove", |params, handler, _| async move {
            handler.server_remove(params.parse()?).await
        })
        .map_err(registration_error)?;

    Ok(module)
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(orchestrator)),
        }
    }

    /// Bind and start serving; the returned handle stops the server
    ///
    /// # Errors
    /// - AppError::Io if the address cannot be bound
    pub async fn start(self) -> Result<ServerHandle> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server"
        );

        let server = Server::builder().build(&addr).await?;
        let module = build_module(self.handler)?;

        info!(addr = %addr, tools = TOOL_NAMES.len(), "JSON-RPC server started");
        Ok(server.start(module))
    }
}

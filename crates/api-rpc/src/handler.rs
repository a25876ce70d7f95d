//! RPC Method Handlers
//!
//! One method per tool; each maps its request onto the orchestrator services.

use crate::error::to_rpc_error;
use crate::types::{
    CrashedJobInfo, DiagnosticsRequest, DiagnosticsResponse, DockerLogsRequest, ExecRequest,
    HistoryRequest, HistoryResponse, InteractiveRequest, JobIdRequest, JobSummary, LogsRequest,
    LogsResponse, Pm2LogsRequest, QueueRequest, QueueResponse, QueueStatsResponse,
    SequenceRequest, ServerAddRequest, ServerAddResponse, ServerListResponse,
    ServerRemoveRequest, ServerRemoveResponse, TailFileRequest, TaskResponse,
    TransferMultiRequest, TransferRequest,
};
use jsonrpsee::types::ErrorObjectOwned;
use orchestrator_core::application::{
    JobView, LogQuery, Orchestrator, PoolStats, Submission, SubmitRequest,
};
use orchestrator_core::error::AppError;
use orchestrator_core::port::CatalogUpdate;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Diagnostic entries included by a verbose `system_diagnostics`
const DIAGNOSTIC_LOG_TAIL: usize = 20;

type RpcResult<T> = Result<T, ErrorObjectOwned>;

/// RPC Handler with the orchestrator injected
pub struct RpcHandler {
    orchestrator: Arc<Orchestrator>,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            start_time: Instant::now(),
        }
    }

    fn fail(tool: &str, err: AppError) -> ErrorObjectOwned {
        warn!(tool, code = err.code(), error = %err, "Tool call failed");
        to_rpc_error(tool, err)
    }

    async fn submit(&self, tool: &str, req: SubmitRequest) -> RpcResult<TaskResponse> {
        let submission = self
            .orchestrator
            .tasks()
            .submit(req)
            .await
            .map_err(|e| Self::fail(tool, e))?;
        Ok(self.task_response(submission))
    }

    fn task_response(&self, submission: Submission) -> TaskResponse {
        let Submission { job, completed } = submission;
        let job_id = job.id.clone();
        let message = if completed {
            format!("Job {} finished with status {}", job.id, job.status)
        } else {
            format!(
                "Job {} is still running in the background; check progress with task_status",
                job.id
            )
        };
        TaskResponse {
            job_id,
            completed,
            message,
            job: self.orchestrator.tasks().to_view(job),
        }
    }

    /// task_exec
    pub async fn task_exec(&self, params: ExecRequest) -> RpcResult<TaskResponse> {
        self.submit("task_exec", params.into()).await
    }

    /// task_exec_interactive
    pub async fn task_exec_interactive(
        &self,
        params: InteractiveRequest,
    ) -> RpcResult<TaskResponse> {
        self.submit("task_exec_interactive", params.into()).await
    }

    /// task_exec_sequence
    pub async fn task_exec_sequence(&self, params: SequenceRequest) -> RpcResult<TaskResponse> {
        self.submit("task_exec_sequence", params.into()).await
    }

    /// task_transfer
    pub async fn task_transfer(&self, params: TransferRequest) -> RpcResult<TaskResponse> {
        self.submit("task_transfer", params.into()).await
    }

    /// task_transfer_multi
    pub async fn task_transfer_multi(
        &self,
        params: TransferMultiRequest,
    ) -> RpcResult<TaskResponse> {
        self.submit("task_transfer_multi", params.into()).await
    }

    /// get_pm2_logs
    pub async fn get_pm2_logs(&self, params: Pm2LogsRequest) -> RpcResult<TaskResponse> {
        self.submit("get_pm2_logs", params.into()).await
    }

    /// get_docker_logs
    pub async fn get_docker_logs(&self, params: DockerLogsRequest) -> RpcResult<TaskResponse> {
        if params.container.trim().is_empty() {
            return Err(Self::fail(
                "get_docker_logs",
                AppError::Validation("container is required".to_string()),
            ));
        }
        self.submit("get_docker_logs", params.into()).await
    }

    /// tail_file
    pub async fn tail_file(&self, params: TailFileRequest) -> RpcResult<TaskResponse> {
        if params.filepath.trim().is_empty() {
            return Err(Self::fail(
                "tail_file",
                AppError::Validation("filepath is required".to_string()),
            ));
        }
        self.submit("tail_file", params.into()).await
    }

    /// task_status
    pub async fn task_status(&self, params: JobIdRequest) -> RpcResult<JobView> {
        self.orchestrator
            .tasks()
            .view(&params.id)
            .map_err(|e| Self::fail("task_status", e))
    }

    /// task_queue: newest first
    pub async fn task_queue(&self, params: QueueRequest) -> RpcResult<QueueResponse> {
        let jobs: Vec<JobSummary> = self
            .orchestrator
            .queue()
            .list_jobs()
            .iter()
            .rev()
            .filter(|job| params.status.map_or(true, |s| job.status == s))
            .filter(|job| params.alias.as_deref().map_or(true, |a| job.alias == a))
            .map(JobSummary::from)
            .collect();
        Ok(QueueResponse {
            total: jobs.len(),
            jobs,
        })
    }

    /// task_history
    pub async fn task_history(&self, params: HistoryRequest) -> RpcResult<HistoryResponse> {
        let entries = self
            .orchestrator
            .tasks()
            .audit()
            .recent(params.alias.as_deref(), params.limit)
            .await
            .map_err(|e| Self::fail("task_history", e))?;
        Ok(HistoryResponse { entries })
    }

    /// task_retry
    pub async fn task_retry(&self, params: JobIdRequest) -> RpcResult<TaskResponse> {
        let submission = self
            .orchestrator
            .tasks()
            .retry(&params.id)
            .await
            .map_err(|e| Self::fail("task_retry", e))?;
        Ok(self.task_response(submission))
    }

    /// task_logs
    pub async fn task_logs(&self, params: LogsRequest) -> RpcResult<LogsResponse> {
        let entries = self.orchestrator.queue().log().query(&LogQuery {
            level: params.level,
            since: params.since,
            search: params.search,
            limit: Some(params.limit),
        });
        Ok(LogsResponse {
            count: entries.len(),
            entries,
        })
    }

    /// queue_stats
    pub async fn queue_stats(&self) -> RpcResult<QueueStatsResponse> {
        let queue = self.orchestrator.queue();
        let crashed = queue.crashed_jobs();
        Ok(QueueStatsResponse {
            stats: queue.stats(),
            crashed_jobs: crashed.len(),
            can_retry: crashed
                .iter()
                .map(|job| CrashedJobInfo {
                    id: job.id.clone(),
                    job_type: job.job_type().to_string(),
                    crashed_at: job.crashed_at,
                })
                .collect(),
        })
    }

    /// pool_stats
    pub async fn pool_stats(&self) -> RpcResult<PoolStats> {
        Ok(self.orchestrator.pool().stats())
    }

    /// system_diagnostics
    pub async fn system_diagnostics(
        &self,
        params: DiagnosticsRequest,
    ) -> RpcResult<DiagnosticsResponse> {
        let servers = self
            .orchestrator
            .catalog()
            .list()
            .await
            .map_err(|e| Self::fail("system_diagnostics", e))?;
        let queue = self.orchestrator.queue();
        let logs = params.verbose.then(|| {
            queue.log().query(&LogQuery {
                limit: Some(DIAGNOSTIC_LOG_TAIL),
                ..Default::default()
            })
        });

        Ok(DiagnosticsResponse {
            version: orchestrator_core::VERSION.to_string(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            queue: queue.stats(),
            pool: self.orchestrator.pool().stats(),
            servers: servers.len(),
            crashed: queue.crashed_jobs().len(),
            logs,
        })
    }

    /// server_add
    pub async fn server_add(&self, params: ServerAddRequest) -> RpcResult<ServerAddResponse> {
        let update = self
            .orchestrator
            .catalog()
            .add(&params.alias, params.server())
            .await
            .map_err(|e| Self::fail("server_add", e))?;
        let status = match update {
            CatalogUpdate::Added => "added",
            CatalogUpdate::Updated => "updated",
        };
        info!(alias = %params.alias, status, "Server catalog entry saved");
        Ok(ServerAddResponse {
            alias: params.alias,
            status: status.to_string(),
        })
    }

    /// server_list: passwords redacted
    pub async fn server_list(&self) -> RpcResult<ServerListResponse> {
        let servers = self
            .orchestrator
            .catalog()
            .list()
            .await
            .map_err(|e| Self::fail("server_list", e))?;
        Ok(ServerListResponse {
            count: servers.len(),
            servers,
        })
    }

    /// server_remove
    pub async fn server_remove(
        &self,
        params: ServerRemoveRequest,
    ) -> RpcResult<ServerRemoveResponse> {
        self.orchestrator
            .catalog()
            .remove(&params.alias)
            .await
            .map_err(|e| Self::fail("server_remove", e))?;
        Ok(ServerRemoveResponse {
            alias: params.alias,
            removed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::application::OrchestratorPorts;
    use orchestrator_core::domain::{JobStatus, ServerConfig, TransferDirection, TransferPair};
    use orchestrator_core::port::alias_resolver::mocks::StaticAliasResolver;
    use orchestrator_core::port::audit::mocks::MemoryAuditSink;
    use orchestrator_core::port::id_provider::mocks::SequentialIdProvider;
    use orchestrator_core::port::snapshot_store::mocks::MemorySnapshotStore;
    use orchestrator_core::port::time_provider::SystemTimeProvider;
    use orchestrator_core::port::transport::mocks::{MockReply, MockTransport};
    use orchestrator_core::OrchestratorConfig;

    fn handler(transport: MockTransport) -> RpcHandler {
        let servers = Arc::new(
            StaticAliasResolver::new()
                .with("web", ServerConfig::new("10.0.0.5", "deploy").with_password("pw")),
        );
        let orchestrator = Orchestrator::new(
            OrchestratorConfig::default(),
            OrchestratorPorts {
                transport: Arc::new(transport),
                resolver: servers.clone(),
                catalog: servers,
                snapshots: Arc::new(MemorySnapshotStore::new()),
                audit: Arc::new(MemoryAuditSink::new()),
                time_provider: Arc::new(SystemTimeProvider),
                id_provider: Arc::new(SequentialIdProvider::new()),
            },
        )
        .unwrap();
        RpcHandler::new(Arc::new(orchestrator))
    }

    fn exec(alias: &str, cmd: &str) -> ExecRequest {
        ExecRequest {
            alias: alias.to_string(),
            cmd: cmd.to_string(),
            timeout: None,
            max_lines: None,
            streaming: false,
            rappel: None,
            max_retries: None,
        }
    }

    fn error_code(err: &ErrorObjectOwned) -> String {
        let data: serde_json::Value = serde_json::from_str(err.data().unwrap().get()).unwrap();
        data["errorCode"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_task_exec_then_status_and_history() {
        let handler = handler(MockTransport::new());

        let response = handler.task_exec(exec("web", "echo hi")).await.unwrap();
        assert!(response.completed);
        assert_eq!(response.job.job.status, JobStatus::Completed);
        assert!(response.job.job.output.as_deref().unwrap().contains("hi"));

        let status = handler
            .task_status(JobIdRequest {
                id: response.job_id.clone(),
            })
            .await
            .unwrap();
        assert_eq!(status.job.id, response.job_id);

        let history = handler.task_history(HistoryRequest::default()).await.unwrap();
        assert_eq!(history.entries.len(), 1);
        assert_eq!(history.entries[0].command, "echo hi");
    }

    #[tokio::test]
    async fn test_failed_command_is_a_result_not_an_error() {
        let transport = MockTransport::new();
        transport.reply("false", MockReply::exit(1, "nope"));
        let handler = handler(transport);

        let response = handler.task_exec(exec("web", "false")).await.unwrap();
        assert!(response.completed);
        assert_eq!(response.job.job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_validation_error_carries_tool_name() {
        let handler = handler(MockTransport::new());

        let err = tokio_test::assert_err!(handler.task_exec(exec("", "uptime")).await);
        assert_eq!(error_code(&err), "VALIDATION_ERROR");
        let data: serde_json::Value = serde_json::from_str(err.data().unwrap().get()).unwrap();
        assert_eq!(data["toolName"], "task_exec");
    }

    #[tokio::test]
    async fn test_remote_log_tools_submit_read_commands() {
        let transport = MockTransport::new();
        transport.reply(
            "docker logs --tail 30 --timestamps redis",
            MockReply::ok("ready to accept connections\n"),
        );
        let handler = handler(transport);

        let docker = handler
            .get_docker_logs(DockerLogsRequest {
                alias: "web".to_string(),
                container: "redis".to_string(),
                lines: 30,
                since: None,
                timestamps: true,
            })
            .await
            .unwrap();
        assert_eq!(docker.job.job.status, JobStatus::Completed);
        assert!(docker
            .job
            .job
            .output
            .as_deref()
            .unwrap()
            .contains("ready to accept connections"));

        handler
            .get_pm2_logs(Pm2LogsRequest {
                alias: "web".to_string(),
                app: Some("api".to_string()),
                lines: 100,
                errors: false,
            })
            .await
            .unwrap();
        handler
            .tail_file(TailFileRequest {
                alias: "web".to_string(),
                filepath: "/var/log/nginx/error.log".to_string(),
                lines: 50,
            })
            .await
            .unwrap();

        let history = handler.task_history(HistoryRequest::default()).await.unwrap();
        let commands: Vec<&str> = history.entries.iter().map(|e| e.command.as_str()).collect();
        assert!(commands.contains(&"docker logs --tail 30 --timestamps redis"));
        assert!(commands.contains(&"pm2 logs api --lines 100 --nostream"));
        assert!(commands.contains(&"tail -n 50 /var/log/nginx/error.log"));

        let err = tokio_test::assert_err!(
            handler
                .tail_file(TailFileRequest {
                    alias: "web".to_string(),
                    filepath: " ".to_string(),
                    lines: 50,
                })
                .await
        );
        assert_eq!(error_code(&err), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unknown_job_status() {
        let handler = handler(MockTransport::new());
        let err = handler
            .task_status(JobIdRequest {
                id: "missing".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(error_code(&err), "JOB_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_retry_of_completed_job_is_rejected() {
        let handler = handler(MockTransport::new());
        let response = handler.task_exec(exec("web", "uptime")).await.unwrap();

        let err = handler
            .task_retry(JobIdRequest {
                id: response.job_id,
            })
            .await
            .unwrap_err();
        assert_eq!(error_code(&err), "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_queue_listing_and_stats() {
        let transport = MockTransport::new();
        transport.reply("false", MockReply::exit(1, ""));
        let handler = handler(transport);
        handler.task_exec(exec("web", "uptime")).await.unwrap();
        handler.task_exec(exec("web", "false")).await.unwrap();

        let all = handler.task_queue(QueueRequest::default()).await.unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.jobs[0].status, JobStatus::Failed);

        let failed = handler
            .task_queue(QueueRequest {
                status: Some(JobStatus::Failed),
                alias: None,
            })
            .await
            .unwrap();
        assert_eq!(failed.total, 1);

        let stats = handler.queue_stats().await.unwrap();
        assert_eq!(stats.stats.total, 2);
        assert_eq!(stats.stats.success_rate, 50);
        assert_eq!(stats.crashed_jobs, 0);
        assert!(stats.can_retry.is_empty());

        let pool = handler.pool_stats().await.unwrap();
        assert_eq!(pool.by_alias["web"].in_use, 0);
    }

    #[tokio::test]
    async fn test_partial_transfer_multi() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        transport.fail_transfer_of("b.txt");
        let handler = handler(transport);

        let files = ["a.txt", "b.txt"]
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                std::fs::write(&path, b"data").unwrap();
                TransferPair {
                    local: path.to_string_lossy().into_owned(),
                    remote: format!("/srv/{}", name),
                }
            })
            .collect();

        let response = handler
            .task_transfer_multi(TransferMultiRequest {
                alias: "web".to_string(),
                direction: TransferDirection::Upload,
                files,
                rappel: None,
                max_retries: None,
            })
            .await
            .unwrap();
        assert_eq!(response.job.job.status, JobStatus::Partial);
        assert!(response.job.job.output.unwrap().contains("1/2"));
    }

    #[tokio::test]
    async fn test_server_catalog_tools() {
        let handler = handler(MockTransport::new());

        let added = handler
            .server_add(ServerAddRequest {
                alias: "db".to_string(),
                host: "10.0.0.7".to_string(),
                port: 22,
                user: "root".to_string(),
                key_path: None,
                password: Some("secret".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(added.status, "added");

        let listed = handler.server_list().await.unwrap();
        assert_eq!(listed.count, 2);
        assert_eq!(listed.servers["db"].password.as_deref(), Some("***"));

        handler
            .server_remove(ServerRemoveRequest {
                alias: "db".to_string(),
            })
            .await
            .unwrap();
        let err = handler
            .server_remove(ServerRemoveRequest {
                alias: "db".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(error_code(&err), "UNKNOWN_ALIAS");
    }

    #[tokio::test]
    async fn test_diagnostics_and_logs() {
        let handler = handler(MockTransport::new());
        handler.task_exec(exec("nowhere", "uptime")).await.unwrap();

        let quiet = handler
            .system_diagnostics(DiagnosticsRequest { verbose: false })
            .await
            .unwrap();
        assert!(quiet.logs.is_none());
        assert_eq!(quiet.servers, 1);
        assert_eq!(quiet.queue.total, 1);

        let verbose = handler
            .system_diagnostics(DiagnosticsRequest { verbose: true })
            .await
            .unwrap();
        assert!(!verbose.logs.unwrap().is_empty());

        let logs = handler.task_logs(LogsRequest::default()).await.unwrap();
        assert_eq!(logs.count, logs.entries.len());
        assert!(logs.count > 0);
    }
}

//! RPC Request/Response Types
//!
//! Parameters are accepted by name, camelCase (snake_case aliases kept for
//! multi-word fields).

use orchestrator_core::application::{JobView, LogEntry, LogLevel, PoolStats, QueueStats};
use orchestrator_core::application::constants::DEFAULT_LOG_TAIL;
use orchestrator_core::application::SubmitRequest;
use orchestrator_core::domain::{
    CommandSpec, Job, JobSpec, JobStatus, SequenceSpec, SequenceStep, ServerConfig,
    TransferDirection, TransferPair, TransferSpec, DEFAULT_SSH_PORT,
};
use orchestrator_core::port::AuditEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_history_limit() -> usize {
    20
}

fn default_logs_limit() -> usize {
    DEFAULT_LOG_TAIL
}

/// task_exec - Run one command on a pooled connection
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecRequest {
    pub alias: String,
    pub cmd: String,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default, alias = "max_lines")]
    pub max_lines: Option<usize>,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub rappel: Option<u64>,
    #[serde(default, alias = "max_retries")]
    pub max_retries: Option<u32>,
}

impl From<ExecRequest> for SubmitRequest {
    fn from(req: ExecRequest) -> Self {
        let spec = CommandSpec {
            timeout_secs: req.timeout,
            max_lines: req.max_lines,
            streaming: req.streaming,
            ..CommandSpec::new(req.cmd)
        };
        SubmitRequest {
            alias: req.alias,
            spec: JobSpec::Ssh(spec),
            max_retries: req.max_retries,
            rappel_secs: req.rappel,
        }
    }
}

/// task_exec_interactive - Run a command on a dedicated shell, answering prompts
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveRequest {
    pub alias: String,
    pub cmd: String,
    #[serde(default = "default_true")]
    pub interactive: bool,
    #[serde(default = "default_true", alias = "auto_respond")]
    pub auto_respond: bool,
    #[serde(default)]
    pub responses: BTreeMap<String, String>,
    #[serde(default)]
    pub pty: bool,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub rappel: Option<u64>,
    #[serde(default, alias = "max_retries")]
    pub max_retries: Option<u32>,
}

impl From<InteractiveRequest> for SubmitRequest {
    fn from(req: InteractiveRequest) -> Self {
        let spec = CommandSpec {
            interactive: req.interactive,
            auto_respond: req.auto_respond,
            responses: req.responses,
            pty: req.pty,
            timeout_secs: req.timeout,
            ..CommandSpec::new(req.cmd)
        };
        SubmitRequest {
            alias: req.alias,
            spec: JobSpec::Ssh(spec),
            max_retries: req.max_retries,
            rappel_secs: req.rappel,
        }
    }
}

/// task_exec_sequence - Run commands in order on one connection
///
/// Each entry of `commands` is a string or `{command, timeout, continueOnError}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceRequest {
    pub alias: String,
    pub commands: Vec<SequenceStep>,
    #[serde(default, alias = "continue_on_error")]
    pub continue_on_error: bool,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub rappel: Option<u64>,
    #[serde(default, alias = "max_retries")]
    pub max_retries: Option<u32>,
}

impl From<SequenceRequest> for SubmitRequest {
    fn from(req: SequenceRequest) -> Self {
        SubmitRequest {
            alias: req.alias,
            spec: JobSpec::SshSequence(SequenceSpec {
                commands: req.commands,
                continue_on_error: req.continue_on_error,
                timeout_secs: req.timeout,
            }),
            max_retries: req.max_retries,
            rappel_secs: req.rappel,
        }
    }
}

/// task_transfer - One upload or download; `local` may be a glob on upload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub alias: String,
    pub direction: TransferDirection,
    pub local: String,
    pub remote: String,
    #[serde(default)]
    pub rappel: Option<u64>,
    #[serde(default, alias = "max_retries")]
    pub max_retries: Option<u32>,
}

impl From<TransferRequest> for SubmitRequest {
    fn from(req: TransferRequest) -> Self {
        SubmitRequest {
            alias: req.alias,
            spec: JobSpec::Sftp(TransferSpec {
                direction: req.direction,
                files: vec![TransferPair {
                    local: req.local,
                    remote: req.remote,
                }],
            }),
            max_retries: req.max_retries,
            rappel_secs: req.rappel,
        }
    }
}

/// task_transfer_multi - Several pairs in one job
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMultiRequest {
    pub alias: String,
    pub direction: TransferDirection,
    pub files: Vec<TransferPair>,
    #[serde(default)]
    pub rappel: Option<u64>,
    #[serde(default, alias = "max_retries")]
    pub max_retries: Option<u32>,
}

impl From<TransferMultiRequest> for SubmitRequest {
    fn from(req: TransferMultiRequest) -> Self {
        SubmitRequest {
            alias: req.alias,
            spec: JobSpec::Sftp(TransferSpec {
                direction: req.direction,
                files: req.files,
            }),
            max_retries: req.max_retries,
            rappel_secs: req.rappel,
        }
    }
}

fn default_remote_log_lines() -> usize {
    100
}

fn default_tail_lines() -> usize {
    50
}

/// Wraps a read-only log command as a non-streaming ssh job
fn log_command(alias: String, cmd: String, lines: usize) -> SubmitRequest {
    let spec = CommandSpec {
        max_lines: Some(lines),
        ..CommandSpec::new(cmd)
    };
    SubmitRequest {
        alias,
        spec: JobSpec::Ssh(spec),
        max_retries: None,
        rappel_secs: None,
    }
}

/// get_pm2_logs - Recent pm2 output for one app or all of them
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pm2LogsRequest {
    pub alias: String,
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default = "default_remote_log_lines")]
    pub lines: usize,
    /// Only the error stream
    #[serde(default)]
    pub errors: bool,
}

impl Pm2LogsRequest {
    pub fn command(&self) -> String {
        let mut cmd = String::from("pm2 logs");
        if let Some(app) = self.app.as_deref().filter(|a| !a.is_empty()) {
            cmd.push(' ');
            cmd.push_str(app);
        }
        if self.errors {
            cmd.push_str(" --err");
        }
        cmd.push_str(&format!(" --lines {} --nostream", self.lines));
        cmd
    }
}

impl From<Pm2LogsRequest> for SubmitRequest {
    fn from(req: Pm2LogsRequest) -> Self {
        let cmd = req.command();
        log_command(req.alias, cmd, req.lines)
    }
}

/// get_docker_logs - Tail of one container's log
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerLogsRequest {
    pub alias: String,
    pub container: String,
    #[serde(default = "default_remote_log_lines")]
    pub lines: usize,
    /// Passed through to `--since` (`10m`, `2024-01-01T00:00:00`)
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub timestamps: bool,
}

impl DockerLogsRequest {
    pub fn command(&self) -> String {
        let mut cmd = format!("docker logs --tail {}", self.lines);
        if let Some(since) = self.since.as_deref().filter(|s| !s.is_empty()) {
            cmd.push_str(&format!(" --since {}", since));
        }
        if self.timestamps {
            cmd.push_str(" --timestamps");
        }
        cmd.push(' ');
        cmd.push_str(&self.container);
        cmd
    }
}

impl From<DockerLogsRequest> for SubmitRequest {
    fn from(req: DockerLogsRequest) -> Self {
        let cmd = req.command();
        log_command(req.alias, cmd, req.lines)
    }
}

/// tail_file - Last lines of a remote file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailFileRequest {
    pub alias: String,
    #[serde(alias = "path")]
    pub filepath: String,
    #[serde(default = "default_tail_lines")]
    pub lines: usize,
}

impl TailFileRequest {
    pub fn command(&self) -> String {
        format!("tail -n {} {}", self.lines, self.filepath)
    }
}

impl From<TailFileRequest> for SubmitRequest {
    fn from(req: TailFileRequest) -> Self {
        let cmd = req.command();
        log_command(req.alias, cmd, req.lines)
    }
}

/// task_status / task_retry
#[derive(Debug, Deserialize)]
pub struct JobIdRequest {
    pub id: String,
}

/// Outcome of a submission or retry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub job_id: String,
    pub completed: bool,
    pub message: String,
    pub job: JobView,
}

/// task_queue
#[derive(Debug, Default, Deserialize)]
pub struct QueueRequest {
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub alias: String,
    pub status: JobStatus,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            job_type: job.job_type().to_string(),
            alias: job.alias.clone(),
            status: job.status,
            created_at: job.created_at,
            duration_ms: job.duration_ms,
            retry_count: job.retry_count,
            error: job.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueResponse {
    pub total: usize,
    pub jobs: Vec<JobSummary>,
}

/// task_history
#[derive(Debug, Deserialize)]
pub struct HistoryRequest {
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

impl Default for HistoryRequest {
    fn default() -> Self {
        Self {
            alias: None,
            limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<AuditEntry>,
}

/// task_logs
#[derive(Debug, Deserialize)]
pub struct LogsRequest {
    #[serde(default)]
    pub level: Option<LogLevel>,
    #[serde(default)]
    pub search: Option<String>,
    /// Minimum timestamp (epoch ms)
    #[serde(default)]
    pub since: Option<i64>,
    #[serde(default = "default_logs_limit")]
    pub limit: usize,
}

impl Default for LogsRequest {
    fn default() -> Self {
        Self {
            level: None,
            search: None,
            since: None,
            limit: default_logs_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsResponse {
    pub count: usize,
    pub entries: Vec<LogEntry>,
}

/// One entry of `queue_stats.canRetry`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashedJobInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub crashed_at: Option<i64>,
}

/// queue_stats
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatsResponse {
    pub stats: QueueStats,
    pub crashed_jobs: usize,
    pub can_retry: Vec<CrashedJobInfo>,
}

/// system_diagnostics
#[derive(Debug, Default, Deserialize)]
pub struct DiagnosticsRequest {
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub queue: QueueStats,
    pub pool: PoolStats,
    pub servers: usize,
    pub crashed: usize,
    /// Last 20 diagnostic entries, only when `verbose`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<LogEntry>>,
}

/// server_add
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAddRequest {
    pub alias: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default, alias = "key_path")]
    pub key_path: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ServerAddRequest {
    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            key_path: self.key_path.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerAddResponse {
    pub alias: String,
    /// "added" or "updated"
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerListResponse {
    pub count: usize,
    pub servers: BTreeMap<String, ServerConfig>,
}

/// server_remove
#[derive(Debug, Deserialize)]
pub struct ServerRemoveRequest {
    pub alias: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerRemoveResponse {
    pub alias: String,
    pub removed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interactive_defaults() {
        let req: InteractiveRequest =
            serde_json::from_value(json!({"alias": "web", "cmd": "sudo apt upgrade"})).unwrap();
        assert!(req.interactive);
        assert!(req.auto_respond);

        let submit = SubmitRequest::from(req);
        match submit.spec {
            JobSpec::Ssh(spec) => {
                assert!(spec.interactive);
                assert!(spec.auto_respond);
            }
            other => panic!("unexpected spec {:?}", other),
        }
    }

    #[test]
    fn test_sequence_accepts_mixed_steps() {
        let req: SequenceRequest = serde_json::from_value(json!({
            "alias": "web",
            "commands": [
                "cd /srv/app",
                {"command": "make test", "timeout": 60, "continueOnError": true}
            ],
            "continueOnError": false,
            "rappel": 30
        }))
        .unwrap();

        let submit = SubmitRequest::from(req);
        assert_eq!(submit.rappel_secs, Some(30));
        match submit.spec {
            JobSpec::SshSequence(seq) => {
                assert_eq!(seq.commands.len(), 2);
                assert!(!seq.commands[0].continue_on_error);
                assert_eq!(seq.commands[1].timeout_secs, Some(60));
                assert!(seq.commands[1].continue_on_error);
            }
            other => panic!("unexpected spec {:?}", other),
        }
    }

    #[test]
    fn test_transfer_is_one_pair() {
        let req: TransferRequest = serde_json::from_value(json!({
            "alias": "web",
            "direction": "upload",
            "local": "./dist/*.js",
            "remote": "/srv/app/static"
        }))
        .unwrap();

        match SubmitRequest::from(req).spec {
            JobSpec::Sftp(spec) => {
                assert_eq!(spec.direction, TransferDirection::Upload);
                assert_eq!(spec.files.len(), 1);
                assert_eq!(spec.files[0].remote, "/srv/app/static");
            }
            other => panic!("unexpected spec {:?}", other),
        }
    }

    #[test]
    fn test_server_add_accepts_both_key_spellings() {
        let camel: ServerAddRequest = serde_json::from_value(json!({
            "alias": "db", "host": "10.0.0.7", "user": "root", "keyPath": "~/.ssh/db"
        }))
        .unwrap();
        let snake: ServerAddRequest = serde_json::from_value(json!({
            "alias": "db", "host": "10.0.0.7", "user": "root", "key_path": "~/.ssh/db"
        }))
        .unwrap();
        assert_eq!(camel.server(), snake.server());
        assert_eq!(camel.port, 22);
    }

    #[test]
    fn test_logs_request_defaults() {
        let req: LogsRequest = serde_json::from_value(json!({"level": "error"})).unwrap();
        assert_eq!(req.level, Some(LogLevel::Error));
        assert_eq!(req.limit, 50);
        assert_eq!(LogsRequest::default().limit, 50);
    }

    #[test]
    fn test_remote_log_commands() {
        let pm2: Pm2LogsRequest = serde_json::from_value(json!({"alias": "web"})).unwrap();
        assert_eq!(pm2.command(), "pm2 logs --lines 100 --nostream");

        let pm2: Pm2LogsRequest = serde_json::from_value(json!({
            "alias": "web", "app": "api", "lines": 20, "errors": true
        }))
        .unwrap();
        assert_eq!(pm2.command(), "pm2 logs api --err --lines 20 --nostream");

        let docker: DockerLogsRequest = serde_json::from_value(json!({
            "alias": "web", "container": "redis", "since": "10m", "timestamps": true
        }))
        .unwrap();
        assert_eq!(
            docker.command(),
            "docker logs --tail 100 --since 10m --timestamps redis"
        );

        let tail: TailFileRequest =
            serde_json::from_value(json!({"alias": "web", "path": "/var/log/syslog"})).unwrap();
        assert_eq!(tail.command(), "tail -n 50 /var/log/syslog");

        match SubmitRequest::from(tail).spec {
            JobSpec::Ssh(spec) => {
                assert_eq!(spec.max_lines, Some(50));
                assert!(!spec.streaming);
            }
            other => panic!("unexpected spec {:?}", other),
        }
    }
}

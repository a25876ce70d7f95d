// Submission Service
// Validates requests, admits jobs, starts executors and waits briefly for a result

use crate::application::constants::COMPLETION_POLL_INTERVAL;
use crate::application::executor::JobExecutor;
use crate::application::queue::JobQueue;
use crate::domain::{Job, JobSpec, NewJob};
use crate::error::{AppError, Result};
use crate::port::{AuditEntry, AuditSink, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// A job submission as received from the tool surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub alias: String,
    pub spec: JobSpec,
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Seconds after which a still-running job carries a reminder
    #[serde(default)]
    pub rappel_secs: Option<u64>,
}

impl SubmitRequest {
    pub fn new(alias: impl Into<String>, spec: JobSpec) -> Self {
        Self {
            alias: alias.into(),
            spec,
            max_retries: None,
            rappel_secs: None,
        }
    }
}

/// Result of `submit`: the job as last seen, and whether it finished within the sync window
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub job: Job,
    pub completed: bool,
}

/// A job plus the reminder shown while it overstays `rappel_secs`
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder: Option<String>,
}

/// Validate a submission before it reaches the queue
///
/// # Errors
/// - AppError::Validation naming the offending field
pub fn validate_request(req: &SubmitRequest, max_retries_limit: u32) -> Result<()> {
    if req.alias.trim().is_empty() {
        return Err(AppError::Validation("alias cannot be empty".to_string()));
    }
    if let Some(max) = req.max_retries {
        if max > max_retries_limit {
            return Err(AppError::Validation(format!(
                "max_retries must be at most {}, got {}",
                max_retries_limit, max
            )));
        }
    }

    match &req.spec {
        JobSpec::Ssh(spec) if spec.cmd.trim().is_empty() => {
            Err(AppError::Validation("command cannot be empty".to_string()))
        }
        JobSpec::SshSequence(spec) if spec.commands.is_empty() => Err(AppError::Validation(
            "sequence needs at least one command".to_string(),
        )),
        JobSpec::SshSequence(spec) => match spec.commands.iter().position(|s| s.command.trim().is_empty()) {
            Some(index) => Err(AppError::Validation(format!(
                "sequence step {} has an empty command",
                index + 1
            ))),
            None => Ok(()),
        },
        JobSpec::Sftp(spec) if spec.files.is_empty() => Err(AppError::Validation(
            "transfer needs at least one file".to_string(),
        )),
        JobSpec::Sftp(spec) => {
            match spec
                .files
                .iter()
                .position(|f| f.local.trim().is_empty() || f.remote.trim().is_empty())
            {
                Some(index) => Err(AppError::Validation(format!(
                    "file {} needs both a local and a remote path",
                    index + 1
                ))),
                None => Ok(()),
            }
        }
        JobSpec::Custom(spec) if spec.kind.trim().is_empty() => {
            Err(AppError::Validation("custom job kind cannot be empty".to_string()))
        }
        _ => Ok(()),
    }
}

pub struct TaskService {
    queue: Arc<JobQueue>,
    executor: Arc<JobExecutor>,
    audit: Arc<dyn AuditSink>,
    time_provider: Arc<dyn TimeProvider>,
}

impl TaskService {
    pub fn new(
        queue: Arc<JobQueue>,
        executor: Arc<JobExecutor>,
        audit: Arc<dyn AuditSink>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            queue,
            executor,
            audit,
            time_provider,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    /// How long `submit` waits before answering "still running"
    pub fn sync_timeout(&self, spec: &JobSpec) -> Duration {
        let config = self.executor.config();
        match spec {
            JobSpec::Ssh(cmd) if cmd.interactive => cmd
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(config.interactive_timeout),
            JobSpec::SshSequence(seq) => config.sync_timeout * seq.commands.len().max(1) as u32,
            _ => config.sync_timeout,
        }
    }

    /// Admit, audit and start a job, then wait up to the sync timeout
    ///
    /// # Errors
    /// - AppError::Validation for malformed requests
    /// - AppError::QueueFull when admission is refused
    pub async fn submit(&self, req: SubmitRequest) -> Result<Submission> {
        validate_request(&req, self.executor.config().max_retries_limit)?;
        let wait = self.sync_timeout(&req.spec);

        let job = self.queue.add_job(NewJob {
            alias: req.alias,
            spec: req.spec,
            max_retries: req.max_retries,
            rappel_secs: req.rappel_secs,
        })?;
        info!(job_id = %job.id, alias = %job.alias, job_type = %job.job_type(), "Job submitted");

        let entry = AuditEntry {
            job_id: job.id.clone(),
            timestamp: job.created_at,
            job_type: job.job_type().to_string(),
            alias: job.alias.clone(),
            command: job.spec.summary(),
        };
        if let Err(e) = self.audit.record(entry).await {
            warn!(job_id = %job.id, error = %e, "Audit entry not recorded");
        }

        self.executor.spawn(job.id.clone());
        self.await_submission(&job.id, wait).await
    }

    /// Retry a failed or crashed job under a new id and start it
    ///
    /// # Errors
    /// - AppError::JobNotFound / AppError::InvalidState / AppError::RetriesExhausted from the queue
    pub async fn retry(&self, id: &str) -> Result<Submission> {
        let job = self.queue.retry_job(id)?;
        info!(job_id = %job.id, retried_from = %id, attempt = job.retry_count, "Job retried");
        let wait = self.sync_timeout(&job.spec);
        self.executor.spawn(job.id.clone());
        self.await_submission(&job.id, wait).await
    }

    async fn await_submission(&self, id: &str, wait: Duration) -> Result<Submission> {
        let job = self
            .wait_for_completion(id, wait)
            .await
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))?;
        let completed = job.status.is_terminal();
        Ok(Submission { job, completed })
    }

    /// Poll until the job is terminal or `timeout` elapses; returns the last state seen
    pub async fn wait_for_completion(&self, id: &str, timeout: Duration) -> Option<Job> {
        let deadline = Instant::now() + timeout;
        loop {
            let job = self.queue.get_job(id)?;
            if job.status.is_terminal() || Instant::now() >= deadline {
                return Some(job);
            }
            sleep(COMPLETION_POLL_INTERVAL).await;
        }
    }

    /// # Errors
    /// - AppError::JobNotFound for an unknown id
    pub fn view(&self, id: &str) -> Result<JobView> {
        let job = self
            .queue
            .get_job(id)
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))?;
        Ok(self.to_view(job))
    }

    pub fn to_view(&self, job: Job) -> JobView {
        let now = self.time_provider.now_millis();
        let reminder = job.reminder_due(now).then(|| {
            let running_for = (now - job.created_at).max(0) / 1000;
            format!(
                "Job {} is still running after {}s; check again with task_status",
                job.id, running_for
            )
        });
        JobView { job, reminder }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pool::ConnectionPool;
    use crate::config::{ExecutorConfig, PoolConfig, QueueConfig};
    use crate::domain::{
        CommandSpec, JobStatus, SequenceSpec, SequenceStep, ServerConfig, TransferDirection,
        TransferSpec,
    };
    use crate::port::alias_resolver::mocks::StaticAliasResolver;
    use crate::port::audit::mocks::MemoryAuditSink;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::snapshot_store::mocks::MemorySnapshotStore;
    use crate::port::time_provider::mocks::ManualClock;
    use crate::port::transport::mocks::{MockReply, MockTransport};

    struct Fixture {
        service: TaskService,
        audit: Arc<MemoryAuditSink>,
        transport: MockTransport,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let queue = Arc::new(JobQueue::new(
            QueueConfig::default(),
            Arc::new(MemorySnapshotStore::new()),
            clock.clone(),
            Arc::new(SequentialIdProvider::new()),
        ));
        let transport = MockTransport::new();
        let pool = Arc::new(ConnectionPool::new(
            PoolConfig::default(),
            Arc::new(transport.clone()),
            clock.clone(),
            queue.log().clone(),
        ));
        let resolver = StaticAliasResolver::new()
            .with("web", ServerConfig::new("10.0.0.5", "deploy").with_password("pw"));
        let config = ExecutorConfig {
            sync_timeout: Duration::from_secs(2),
            interrupt_grace: Duration::from_millis(20),
            ..ExecutorConfig::default()
        };
        let executor = Arc::new(JobExecutor::new(
            queue.clone(),
            pool,
            Arc::new(resolver),
            Arc::new(transport.clone()),
            config,
        ));
        let audit = Arc::new(MemoryAuditSink::new());
        let service = TaskService::new(queue, executor, audit.clone(), clock.clone());
        Fixture {
            service,
            audit,
            transport,
            clock,
        }
    }

    fn echo(alias: &str, cmd: &str) -> SubmitRequest {
        SubmitRequest::new(alias, JobSpec::Ssh(CommandSpec::new(cmd)))
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        assert!(validate_request(&echo("", "ls"), 10)
            .unwrap_err()
            .to_string()
            .contains("alias"));
        assert!(validate_request(&echo("web", "  "), 10)
            .unwrap_err()
            .to_string()
            .contains("command"));

        let empty_sequence = SubmitRequest::new(
            "web",
            JobSpec::SshSequence(SequenceSpec {
                commands: vec![],
                continue_on_error: false,
                timeout_secs: None,
            }),
        );
        assert!(validate_request(&empty_sequence, 10).is_err());

        let empty_transfer = SubmitRequest::new(
            "web",
            JobSpec::Sftp(TransferSpec {
                direction: TransferDirection::Upload,
                files: vec![],
            }),
        );
        assert!(validate_request(&empty_transfer, 10).is_err());
    }

    #[test]
    fn test_validate_retry_limit() {
        let mut req = echo("web", "ls");
        req.max_retries = Some(11);
        let err = validate_request(&req, 10).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        req.max_retries = Some(10);
        assert!(validate_request(&req, 10).is_ok());
    }

    #[tokio::test]
    async fn test_submit_waits_for_fast_job() {
        let f = fixture();
        let submission = f.service.submit(echo("web", "echo hi")).await.unwrap();

        assert!(submission.completed);
        assert_eq!(submission.job.status, JobStatus::Completed);
        assert!(submission.job.output.as_deref().unwrap().contains("hi"));

        let entries = f.audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].command, "echo hi");
        assert_eq!(entries[0].job_type, "ssh");
    }

    #[tokio::test]
    async fn test_submit_returns_running_job_after_sync_window() {
        let f = fixture();
        f.transport.reply("sleep 60", MockReply::hanging(""));
        let submission = f.service.submit(echo("web", "sleep 60")).await.unwrap();

        assert!(!submission.completed);
        assert_eq!(submission.job.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_retry_spawns_new_job() {
        let f = fixture();
        f.transport.reply("flaky", MockReply::exit(1, "first try"));
        let first = f.service.submit(echo("web", "flaky")).await.unwrap();
        assert_eq!(first.job.status, JobStatus::Failed);

        f.transport.reply("flaky", MockReply::ok("worked\n"));
        let second = f.service.retry(&first.job.id).await.unwrap();

        assert_ne!(second.job.id, first.job.id);
        assert_eq!(second.job.retried_from.as_deref(), Some(first.job.id.as_str()));
        assert_eq!(second.job.retry_count, 1);
        assert_eq!(second.job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_retry_unknown_job() {
        let f = fixture();
        let err = f.service.retry("nope").await.unwrap_err();
        assert!(matches!(err, AppError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_sync_timeout_scales() {
        let f = fixture();
        let sequence = JobSpec::SshSequence(SequenceSpec {
            commands: vec![SequenceStep::new("a"), SequenceStep::new("b"), SequenceStep::new("c")],
            continue_on_error: false,
            timeout_secs: None,
        });
        assert_eq!(f.service.sync_timeout(&sequence), Duration::from_secs(6));

        let mut interactive = CommandSpec::new("passwd");
        interactive.interactive = true;
        interactive.timeout_secs = Some(30);
        assert_eq!(
            f.service.sync_timeout(&JobSpec::Ssh(interactive)),
            Duration::from_secs(30)
        );
    }

    #[tokio::test]
    async fn test_view_adds_reminder_when_overdue() {
        let f = fixture();
        f.transport.reply("sleep 60", MockReply::hanging(""));
        let mut req = echo("web", "sleep 60");
        req.rappel_secs = Some(30);
        let submission = f.service.submit(req).await.unwrap();
        let id = submission.job.id;

        assert!(f.service.view(&id).unwrap().reminder.is_none());
        f.clock.advance(31_000);
        let view = f.service.view(&id).unwrap();
        assert!(view.reminder.unwrap().contains("still running after 31s"));
    }
}

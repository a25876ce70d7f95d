// Job Executors
// Drive a pending job to a terminal state; every failure is recorded on the job

pub mod classify;
pub mod command;
pub mod sequence;
pub mod transfer;

pub use classify::{CommandClassifier, StreamLimits, StreamRewrite};

use crate::application::pool::ConnectionPool;
use crate::application::queue::JobQueue;
use crate::config::ExecutorConfig;
use crate::domain::{
    CommandSpec, Job, JobId, JobPatch, JobResult, JobSpec, JobStatus, SequenceSpec, ServerConfig,
    TransferSpec,
};
use crate::error::AppError;
use crate::port::{AliasResolver, ConnectOptions, RemoteTransport};
use command::{CommandOutcome, CommandRequest, InteractiveEnd, InteractiveRequest};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Outcome = (JobStatus, JobPatch);

fn failure(error: AppError) -> Outcome {
    (JobStatus::Failed, JobPatch::error(error.to_string()))
}

/// Panic payload as text
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct JobExecutor {
    queue: Arc<JobQueue>,
    pool: Arc<ConnectionPool>,
    resolver: Arc<dyn AliasResolver>,
    transport: Arc<dyn RemoteTransport>,
    classifier: CommandClassifier,
    config: ExecutorConfig,
}

impl JobExecutor {
    /// # Arguments
    /// * `transport` - Used directly for dedicated interactive sessions
    pub fn new(
        queue: Arc<JobQueue>,
        pool: Arc<ConnectionPool>,
        resolver: Arc<dyn AliasResolver>,
        transport: Arc<dyn RemoteTransport>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            queue,
            pool,
            resolver,
            transport,
            classifier: CommandClassifier::builtin(),
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: CommandClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run a job on its own task; a panic inside marks the job failed
    pub fn spawn(self: &Arc<Self>, job_id: JobId) -> JoinHandle<()> {
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            let inner = Arc::clone(&executor);
            let id = job_id.clone();
            let task = tokio::spawn(async move { inner.execute(&id).await });

            if let Err(e) = task.await {
                if e.is_panic() {
                    let message = panic_message(e.into_panic().as_ref());
                    error!(job_id = %job_id, panic_msg = %message, "Executor panicked");
                    executor.queue.log().error(format!("Job {} executor panicked: {}", job_id, message));
                    executor.queue.update_job_status(
                        &job_id,
                        JobStatus::Failed,
                        JobPatch::error(format!("Executor panicked: {}", message)),
                    );
                } else {
                    warn!(job_id = %job_id, "Executor task cancelled");
                }
            }
        })
    }

    /// Drive one pending job to a terminal state
    pub async fn execute(&self, job_id: &str) {
        let Some(job) = self.queue.get_job(job_id) else {
            warn!(job_id = %job_id, "Cannot execute unknown job");
            return;
        };
        if job.status != JobStatus::Pending {
            debug!(job_id = %job_id, status = %job.status, "Job is not pending, skipped");
            return;
        }

        let server = match self.resolver.resolve(&job.alias).await {
            Ok(server) => server,
            Err(e) => {
                self.finish(&job, failure(e));
                return;
            }
        };
        if !self
            .queue
            .update_job_status(job_id, JobStatus::Running, JobPatch::none())
        {
            return;
        }
        info!(
            job_id = %job_id,
            alias = %job.alias,
            job_type = %job.job_type(),
            "Job started"
        );
        self.queue.log().info(format!(
            "Job {} started on {}: {}",
            job_id,
            job.alias,
            job.spec.summary()
        ));

        let outcome = match &job.spec {
            JobSpec::Ssh(spec) if spec.interactive => self.run_interactive(&job, &server, spec).await,
            JobSpec::Ssh(spec) => self.run_command(&job, &server, spec).await,
            JobSpec::SshSequence(spec) => self.run_sequence(&job, &server, spec).await,
            JobSpec::Sftp(spec) => self.run_transfer(&job, &server, spec).await,
            JobSpec::Custom(spec) => failure(AppError::Validation(format!(
                "no executor for job type '{}'",
                spec.kind
            ))),
        };
        self.finish(&job, outcome);
    }

    fn finish(&self, job: &Job, (status, patch): Outcome) {
        match &patch.error {
            Some(error) => {
                warn!(job_id = %job.id, status = %status, error = %error, "Job finished with error");
                self.queue
                    .log()
                    .error(format!("Job {} {}: {}", job.id, status, error));
            }
            None => {
                info!(job_id = %job.id, status = %status, "Job finished");
                self.queue.log().info(format!("Job {} {}", job.id, status));
            }
        }
        self.queue.update_job_status(&job.id, status, patch);
    }

    async fn run_command(&self, job: &Job, server: &ServerConfig, spec: &CommandSpec) -> Outcome {
        let lease = match self.pool.get_connection(&job.alias, server).await {
            Ok(lease) => lease,
            Err(e) => return failure(e),
        };
        let limits = StreamLimits {
            lines: spec.max_lines.unwrap_or(self.config.stream_lines),
            timeout: spec
                .stream_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(self.config.stream_timeout),
        };
        let command = match self.classifier.rewrite(&spec.cmd, spec.streaming, limits) {
            Some(rewritten) => {
                debug!(job_id = %job.id, original = %spec.cmd, rewritten = %rewritten, "Streaming command bounded");
                rewritten
            }
            None => spec.cmd.clone(),
        };
        let request = CommandRequest {
            command,
            pty: spec.pty,
            auto_respond: spec.auto_respond,
            responses: spec.responses.clone(),
            max_lines: spec.max_lines.unwrap_or(self.config.max_lines),
            timeout: spec
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(self.config.command_timeout),
            interrupt_grace: self.config.interrupt_grace,
        };

        match command::run_pooled(lease.session().as_ref(), &request, &self.classifier).await {
            Ok(outcome) => command_outcome(outcome),
            Err(e) => failure(e),
        }
    }

    async fn run_interactive(&self, job: &Job, server: &ServerConfig, spec: &CommandSpec) -> Outcome {
        if server.auth_method().is_none() {
            return failure(AppError::AuthMissing(job.alias.clone()));
        }
        let pool_config = self.pool.config();
        let options = ConnectOptions {
            connect_timeout: pool_config.connect_timeout,
            keepalive_interval: pool_config.keepalive_interval,
        };
        let session = match tokio::time::timeout(
            options.connect_timeout,
            self.transport.connect(server, &options),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return failure(e.into()),
            Err(_) => {
                return failure(AppError::Connection(format!(
                    "connect to {}:{} timed out",
                    server.host, server.port
                )))
            }
        };

        let timeout = spec
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.config.interactive_timeout);
        let request = InteractiveRequest {
            job_id: job.id.clone(),
            command: spec.cmd.clone(),
            auto_respond: spec.auto_respond,
            responses: spec.responses.clone(),
            timeout,
            marker_delay: self.config.marker_delay,
            quiet_period: self.config.prompt_quiet,
        };
        let result = command::run_interactive(session.as_ref(), &request, &self.classifier).await;
        if let Err(e) = session.close().await {
            debug!(job_id = %job.id, error = %e, "Closing interactive session failed");
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => return failure(e),
        };
        if let Some(pattern) = &outcome.responded_to {
            debug!(job_id = %job.id, pattern = %pattern, "Prompt answered");
        }
        match outcome.end {
            InteractiveEnd::Completed => (JobStatus::Completed, JobPatch::output(outcome.output)),
            InteractiveEnd::Closed => (
                JobStatus::Failed,
                JobPatch::error("Session closed before the command completed").with_output(outcome.output),
            ),
            InteractiveEnd::TimedOut => (
                JobStatus::Failed,
                JobPatch::error(AppError::CommandTimeout(timeout.as_millis() as u64).to_string())
                    .with_output(outcome.output),
            ),
        }
    }

    async fn run_sequence(&self, job: &Job, server: &ServerConfig, spec: &SequenceSpec) -> Outcome {
        let lease = match self.pool.get_connection(&job.alias, server).await {
            Ok(lease) => lease,
            Err(e) => return failure(e),
        };
        let outcome =
            sequence::run_sequence(lease.session().as_ref(), spec, &self.config, &self.classifier).await;
        drop(lease);

        let output = outcome.combined_output();
        let result = JobResult::Sequence {
            steps: outcome.steps,
        };
        match outcome.aborted {
            Some(message) => (
                JobStatus::Failed,
                JobPatch::error(message).with_output(output).with_result(result),
            ),
            None => (
                JobStatus::Completed,
                JobPatch::output(output).with_result(result),
            ),
        }
    }

    async fn run_transfer(&self, job: &Job, server: &ServerConfig, spec: &TransferSpec) -> Outcome {
        let lease = match self.pool.get_connection(&job.alias, server).await {
            Ok(lease) => lease,
            Err(e) => return failure(e),
        };
        let sftp = match lease.session().sftp().await {
            Ok(sftp) => sftp,
            Err(e) => return failure(e.into()),
        };
        let report = transfer::run_transfer(sftp.as_ref(), spec).await;
        if let Err(e) = sftp.close().await {
            debug!(job_id = %job.id, error = %e, "Closing SFTP channel failed");
        }
        drop(lease);

        let total = report.total();
        let succeeded = report.succeeded;
        let output = report.summary(spec.direction);
        info!(job_id = %job.id, succeeded, total, bytes = report.bytes, "Transfer finished");
        let result = JobResult::Transfer {
            succeeded,
            total,
            failed_files: report.failed,
        };

        if total > 0 && succeeded == total {
            (JobStatus::Completed, JobPatch::output(output).with_result(result))
        } else if succeeded > 0 {
            (
                JobStatus::Partial,
                JobPatch::error(AppError::TransferPartialFailure { succeeded, total }.to_string())
                    .with_output(output)
                    .with_result(result),
            )
        } else {
            (
                JobStatus::Failed,
                JobPatch::error(AppError::TransferFailure(format!("0/{} files succeeded", total)).to_string())
                    .with_output(output)
                    .with_result(result),
            )
        }
    }
}

fn command_outcome(outcome: CommandOutcome) -> Outcome {
    let succeeded = outcome.succeeded();
    let patch_error = (!succeeded).then(|| sequence::failure_message(&outcome));
    let result = JobResult::Command {
        exit_code: outcome.exit_code,
        stderr: outcome.stderr,
        line_count: outcome.line_count,
        timed_out: outcome.timed_out,
        truncated: outcome.truncated,
    };
    match patch_error {
        None => (
            JobStatus::Completed,
            JobPatch::output(outcome.output).with_result(result),
        ),
        Some(error) => (
            JobStatus::Failed,
            JobPatch::error(error)
                .with_output(outcome.output)
                .with_result(result),
        ),
    }
}

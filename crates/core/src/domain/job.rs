// Job Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Short job identifier (8 hex characters)
pub type JobId = String;

/// Default retry budget for a new job
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Job Status
///
/// `pending -> running -> {completed, failed, partial}`; `crashed` is only
/// produced by restart detection from `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Partial,
    Crashed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Partial => "partial",
            JobStatus::Crashed => "crashed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Partial
        )
    }

    /// Transitions an executor may request through a status update
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Partial)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single remote command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub cmd: String,

    /// Run on a dedicated shell session instead of a pooled connection
    #[serde(default)]
    pub interactive: bool,

    #[serde(default)]
    pub auto_respond: bool,

    /// Caller prompt table (substring -> response), checked before the built-in one
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub responses: BTreeMap<String, String>,

    /// Force the streaming rewrite even when no pattern matches
    #[serde(default)]
    pub streaming: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lines: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub pty: bool,
}

impl CommandSpec {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            ..Default::default()
        }
    }
}

/// One step of a command sequence
///
/// Accepts either a bare command string or `{command, timeout, continue_on_error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StepInput")]
pub struct SequenceStep {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub continue_on_error: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StepInput {
    Plain(String),
    Detailed {
        command: String,
        #[serde(default, alias = "timeout")]
        timeout_secs: Option<u64>,
        #[serde(default, alias = "continueOnError")]
        continue_on_error: bool,
    },
}

impl From<StepInput> for SequenceStep {
    fn from(input: StepInput) -> Self {
        match input {
            StepInput::Plain(command) => SequenceStep::new(command),
            StepInput::Detailed {
                command,
                timeout_secs,
                continue_on_error,
            } => SequenceStep {
                command,
                timeout_secs,
                continue_on_error,
            },
        }
    }
}

impl SequenceStep {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout_secs: None,
            continue_on_error: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSpec {
    pub commands: Vec<SequenceStep>,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Upload,
    Download,
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferDirection::Upload => write!(f, "upload"),
            TransferDirection::Download => write!(f, "download"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPair {
    pub local: String,
    pub remote: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSpec {
    pub direction: TransferDirection,
    pub files: Vec<TransferPair>,
}

impl TransferSpec {
    /// Human-readable summary used by the audit log
    pub fn summary(&self) -> String {
        self.files
            .iter()
            .map(|f| format!("{} {} -> {}", self.direction, f.local, f.remote))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Caller-defined work, tracked by the queue but not run by a built-in executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomSpec {
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// What a job does, one variant per job type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobSpec {
    Ssh(CommandSpec),
    SshSequence(SequenceSpec),
    Sftp(TransferSpec),
    Custom(CustomSpec),
}

impl JobSpec {
    pub fn job_type(&self) -> &str {
        match self {
            JobSpec::Ssh(_) => "ssh",
            JobSpec::SshSequence(_) => "ssh_sequence",
            JobSpec::Sftp(_) => "sftp",
            JobSpec::Custom(custom) => &custom.kind,
        }
    }

    /// Command line or transfer summary recorded in the audit log
    pub fn summary(&self) -> String {
        match self {
            JobSpec::Ssh(spec) => spec.cmd.clone(),
            JobSpec::SshSequence(spec) => spec
                .commands
                .iter()
                .map(|s| s.command.as_str())
                .collect::<Vec<_>>()
                .join(" && "),
            JobSpec::Sftp(spec) => spec.summary(),
            JobSpec::Custom(custom) => custom.kind.clone(),
        }
    }
}

/// Outcome of one sequence step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: usize,
    pub command: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub file: String,
    pub error: String,
}

/// Typed execution details attached to a finished job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobResult {
    Command {
        exit_code: Option<i32>,
        stderr: String,
        line_count: usize,
        timed_out: bool,
        truncated: bool,
    },
    Sequence {
        steps: Vec<StepResult>,
    },
    Transfer {
        succeeded: usize,
        total: usize,
        failed_files: Vec<FailedFile>,
    },
}

/// Fields an executor may merge into a job alongside a status change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPatch {
    pub output: Option<String>,
    pub error: Option<String>,
    pub result: Option<JobResult>,
}

impl JobPatch {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn output(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Default::default()
        }
    }

    pub fn with_result(mut self, result: JobResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// Admission request for the queue
#[derive(Debug, Clone)]
pub struct NewJob {
    pub alias: String,
    pub spec: JobSpec,
    pub max_retries: Option<u32>,
    /// Reminder delay in seconds
    pub rappel_secs: Option<u64>,
}

impl NewJob {
    pub fn new(alias: impl Into<String>, spec: JobSpec) -> Self {
        Self {
            alias: alias.into(),
            spec,
            max_retries: None,
            rappel_secs: None,
        }
    }
}

/// Job Entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub alias: String,
    pub spec: JobSpec,
    pub status: JobStatus,

    pub created_at: i64, // epoch ms
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub failed_at: Option<i64>,
    #[serde(default)]
    pub crashed_at: Option<i64>,

    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub can_retry: bool,
    #[serde(default)]
    pub retried_from: Option<JobId>,

    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub result: Option<JobResult>,

    #[serde(default)]
    pub reminder_at: Option<i64>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Job {
    /// Create a new pending job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `alias` - Target server alias
    /// * `spec` - What the job does
    pub fn new(id: impl Into<String>, created_at: i64, alias: impl Into<String>, spec: JobSpec) -> Self {
        Self {
            id: id.into(),
            alias: alias.into(),
            spec,
            status: JobStatus::Pending,
            created_at,
            updated_at: None,
            completed_at: None,
            failed_at: None,
            crashed_at: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            can_retry: false,
            retried_from: None,
            error: None,
            output: None,
            duration_ms: None,
            result: None,
            reminder_at: None,
        }
    }

    pub fn job_type(&self) -> &str {
        self.spec.job_type()
    }

    /// Apply a status change and merge the patch
    ///
    /// An `error` in the patch always stamps `failed_at`, whatever the status.
    /// Reaching `completed` stamps `completed_at` and computes `duration_ms`.
    pub fn apply(&mut self, status: JobStatus, patch: JobPatch, now_millis: i64) -> Result<()> {
        if !self.status.can_transition_to(status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }

        self.status = status;
        self.updated_at = Some(now_millis);

        if patch.output.is_some() {
            self.output = patch.output;
        }
        if patch.result.is_some() {
            self.result = patch.result;
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
            self.failed_at = Some(now_millis);
        } else if status == JobStatus::Failed {
            self.failed_at = Some(now_millis);
        }

        if status == JobStatus::Completed {
            self.completed_at = Some(now_millis);
            self.duration_ms = Some((now_millis - self.created_at).max(0));
        }
        Ok(())
    }

    /// Reclassify a job found `running` at startup; returns false if it was not running
    pub fn mark_crashed(&mut self, now_millis: i64) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.status = JobStatus::Crashed;
        self.crashed_at = Some(now_millis);
        self.updated_at = Some(now_millis);
        self.can_retry = true;
        true
    }

    pub fn has_retry_budget(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Build the replacement job created by a retry
    pub fn retried(&self, new_id: impl Into<String>, now_millis: i64) -> Job {
        Job {
            id: new_id.into(),
            status: JobStatus::Pending,
            retry_count: self.retry_count + 1,
            retried_from: Some(self.id.clone()),
            created_at: now_millis,
            updated_at: Some(now_millis),
            completed_at: None,
            failed_at: None,
            crashed_at: None,
            can_retry: false,
            error: None,
            output: None,
            duration_ms: None,
            result: None,
            ..self.clone()
        }
    }

    /// Age in ms, `None` when `created_at` lies in the future
    pub fn age_millis(&self, now_millis: i64) -> Option<i64> {
        let age = now_millis - self.created_at;
        (age >= 0).then_some(age)
    }

    /// Old finished job that cleanup may drop
    pub fn is_evictable(&self, now_millis: i64, retention_ms: i64) -> bool {
        self.status.is_terminal()
            && self
                .age_millis(now_millis)
                .is_some_and(|age| age > retention_ms)
    }

    /// Whether the job belongs in the persisted snapshot
    pub fn should_persist(&self, now_millis: i64, retention_ms: i64) -> bool {
        !self.status.is_terminal() || (now_millis - self.created_at) < retention_ms
    }

    pub fn reminder_due(&self, now_millis: i64) -> bool {
        self.status == JobStatus::Running && self.reminder_at.is_some_and(|at| now_millis > at)
    }
}

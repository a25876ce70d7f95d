// Retry rules
// Job-level retry eligibility and connection-level backoff
use crate::domain::{Job, JobStatus};
use crate::error::{AppError, Result};
use crate::port::TransportError;
use std::time::Duration;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay
    Retry(Duration),
    /// Stop, the error is final
    GiveUp,
}

/// Check that a job may be replaced by a retry
///
/// # Errors
/// - AppError::InvalidState unless the job is `failed` or `crashed`
/// - AppError::RetriesExhausted when `retry_count >= max_retries`
pub fn ensure_retryable(job: &Job) -> Result<()> {
    if !matches!(job.status, JobStatus::Failed | JobStatus::Crashed) {
        return Err(AppError::InvalidState(format!(
            "job {} cannot be retried (status: {})",
            job.id, job.status
        )));
    }
    if !job.has_retry_budget() {
        warn!(
            job_id = %job.id,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            "Max retry attempts reached"
        );
        return Err(AppError::RetriesExhausted {
            id: job.id.clone(),
            max_retries: job.max_retries,
        });
    }
    Ok(())
}

/// Linear backoff for session creation: attempt N waits `N * base_delay`
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Decide what to do after `attempt` (1-based) failed with `error`
    ///
    /// Key loading and authentication failures are final: retrying cannot fix them.
    pub fn should_retry(&self, attempt: u32, error: &TransportError) -> RetryDecision {
        if matches!(error, TransportError::Key(_) | TransportError::Auth(_)) {
            return RetryDecision::GiveUp;
        }
        if attempt > self.max_retries {
            return RetryDecision::GiveUp;
        }
        let delay = self.base_delay * attempt;
        info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling connect retry");
        RetryDecision::Retry(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommandSpec, JobSpec};

    fn job_with(status: JobStatus, retry_count: u32) -> Job {
        let mut job = Job::new("r1", 0, "web1", JobSpec::Ssh(CommandSpec::new("ls")));
        job.status = status;
        job.retry_count = retry_count;
        job
    }

    #[test]
    fn test_only_failed_or_crashed_retryable() {
        assert!(ensure_retryable(&job_with(JobStatus::Failed, 0)).is_ok());
        assert!(ensure_retryable(&job_with(JobStatus::Crashed, 0)).is_ok());
        assert!(matches!(
            ensure_retryable(&job_with(JobStatus::Completed, 0)),
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            ensure_retryable(&job_with(JobStatus::Partial, 0)),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn test_budget_exhausted() {
        let err = ensure_retryable(&job_with(JobStatus::Failed, 3)).unwrap_err();
        assert!(matches!(err, AppError::RetriesExhausted { max_retries: 3, .. }));
    }

    #[test]
    fn test_linear_backoff() {
        let policy = BackoffPolicy::new(3, Duration::from_secs(2));
        let err = TransportError::Connect("refused".into());
        assert_eq!(
            policy.should_retry(1, &err),
            RetryDecision::Retry(Duration::from_secs(2))
        );
        assert_eq!(
            policy.should_retry(3, &err),
            RetryDecision::Retry(Duration::from_secs(6))
        );
        assert_eq!(policy.should_retry(4, &err), RetryDecision::GiveUp);
    }

    #[test]
    fn test_auth_failures_not_retried() {
        let policy = BackoffPolicy::new(3, Duration::from_secs(2));
        assert_eq!(
            policy.should_retry(1, &TransportError::Auth("denied".into())),
            RetryDecision::GiveUp
        );
    }
}

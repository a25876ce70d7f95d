// Crash recovery
// Jobs persisted as `running` were interrupted by a restart: they become `crashed`
use crate::domain::{Job, JobId, JobStatus};
use tracing::warn;

/// Reclassify interrupted jobs; returns the ids that changed
pub fn reclassify_interrupted<'a>(
    jobs: impl IntoIterator<Item = &'a mut Job>,
    now_millis: i64,
) -> Vec<JobId> {
    let mut crashed = Vec::new();
    for job in jobs {
        if job.mark_crashed(now_millis) {
            warn!(job_id = %job.id, alias = %job.alias, "Job was running at shutdown, marked crashed");
            crashed.push(job.id.clone());
        }
    }
    crashed
}

/// Crashed job that a caller may still resubmit; never resumed automatically
pub fn is_resumable(job: &Job) -> bool {
    job.status == JobStatus::Crashed && job.can_retry && job.has_retry_budget()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommandSpec, JobSpec};

    #[test]
    fn test_only_running_jobs_crash() {
        let spec = JobSpec::Ssh(CommandSpec::new("sleep 100"));
        let mut running = Job::new("a", 0, "web1", spec.clone());
        running.status = JobStatus::Running;
        let mut done = Job::new("b", 0, "web1", spec);
        done.status = JobStatus::Completed;

        let mut jobs = vec![running, done];
        let crashed = reclassify_interrupted(jobs.iter_mut(), 9_000);

        assert_eq!(crashed, vec!["a".to_string()]);
        assert!(is_resumable(&jobs[0]));
        assert!(!is_resumable(&jobs[1]));
        assert_eq!(jobs[0].crashed_at, Some(9_000));
    }
}

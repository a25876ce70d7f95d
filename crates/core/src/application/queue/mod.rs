// Job Queue Engine
// In-memory job map with admission limits, retry, eviction and snapshot persistence

pub mod log;
mod persistence;

pub use log::{DiagnosticLog, LogEntry, LogLevel, LogQuery};

use crate::application::constants::MAX_ID_ATTEMPTS;
use crate::application::{recovery, retry};
use crate::config::QueueConfig;
use crate::domain::job::DEFAULT_MAX_RETRIES;
use crate::domain::{Job, JobId, JobPatch, JobStatus, NewJob};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, SnapshotStore, TimeProvider};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct QueueState {
    jobs: HashMap<JobId, Job>,
    dirty: bool,
}

/// Aggregate view for `queue_stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub avg_duration_ms: i64,
    /// Percentage of completed among completed + failed
    pub success_rate: u32,
}

pub struct JobQueue {
    state: Mutex<QueueState>,
    save_lock: tokio::sync::Mutex<()>,
    store: Arc<dyn SnapshotStore>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    log: Arc<DiagnosticLog>,
    config: QueueConfig,
}

impl JobQueue {
    /// Create an empty queue; call `restore` before serving requests
    ///
    /// # Arguments
    /// * `config` - Admission and persistence settings
    /// * `store` - Snapshot storage
    /// * `time_provider` - Clock (injected for tests)
    /// * `id_provider` - Job id source (injected for tests)
    pub fn new(
        config: QueueConfig,
        store: Arc<dyn SnapshotStore>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        let log = Arc::new(DiagnosticLog::new(
            config.log_capacity,
            time_provider.clone(),
        ));
        Self {
            state: Mutex::new(QueueState::default()),
            save_lock: tokio::sync::Mutex::new(()),
            store,
            time_provider,
            id_provider,
            log,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn retention_ms(&self) -> i64 {
        self.config.retention.as_millis() as i64
    }

    /// Shared diagnostic log (also used by the pool and executors)
    pub fn log(&self) -> &Arc<DiagnosticLog> {
        &self.log
    }

    pub fn max_queue_size(&self) -> usize {
        self.config.max_queue_size
    }

    fn unique_id(&self, jobs: &HashMap<JobId, Job>) -> Result<JobId> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.id_provider.generate_id();
            if !jobs.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(AppError::Internal(format!(
            "no free job id after {} attempts",
            MAX_ID_ATTEMPTS
        )))
    }

    /// Admit a new pending job
    ///
    /// # Errors
    /// - AppError::QueueFull when the queue is still at capacity after an eviction sweep
    pub fn add_job(&self, new_job: NewJob) -> Result<Job> {
        let now = self.time_provider.now_millis();
        let max = self.config.max_queue_size;

        let mut state = self.lock();
        let mut sweep = None;
        if state.jobs.len() >= max {
            sweep = Some(evict(&mut state, now, self.retention_ms()));
            if state.jobs.len() >= max {
                drop(state);
                if let Some(sweep) = sweep {
                    self.report_sweep(&sweep);
                }
                self.log
                    .error(format!("Queue full ({} jobs max), job rejected", max));
                return Err(AppError::QueueFull(max));
            }
        }

        let id = self.unique_id(&state.jobs)?;
        let mut job = Job::new(id.clone(), now, new_job.alias, new_job.spec);
        job.max_retries = new_job.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        if let Some(secs) = new_job.rappel_secs.filter(|s| *s > 0) {
            job.reminder_at = Some(now + (secs as i64) * 1000);
        }
        state.jobs.insert(id.clone(), job.clone());
        state.dirty = true;
        drop(state);

        if let Some(sweep) = sweep {
            self.report_sweep(&sweep);
        }
        self.log
            .info(format!("New job {} ({}) added", id, job.job_type()));
        Ok(job)
    }

    /// Move a job to `status`, merging `patch`
    ///
    /// Unknown ids and transitions outside the state machine are ignored;
    /// returns whether the update was applied.
    pub fn update_job_status(&self, id: &str, status: JobStatus, patch: JobPatch) -> bool {
        let now = self.time_provider.now_millis();
        let error = patch.error.clone();

        let mut state = self.lock();
        let outcome = match state.jobs.get_mut(id) {
            None => None,
            Some(job) => {
                let old = job.status;
                Some(job.apply(status, patch, now).map(|_| (old, job.duration_ms)))
            }
        };
        if matches!(outcome, Some(Ok(_))) {
            state.dirty = true;
        }
        drop(state);

        match outcome {
            None => {
                self.log
                    .debug(format!("Status update for unknown job {} ignored", id));
                false
            }
            Some(Err(e)) => {
                self.log
                    .warn(format!("Status update for job {} ignored: {}", id, e));
                false
            }
            Some(Ok((old, duration))) => {
                if let Some(error) = error {
                    self.log.error(format!("Job {} failed: {}", id, error));
                } else if status == JobStatus::Completed {
                    let secs = duration.unwrap_or(0) as f64 / 1000.0;
                    self.log
                        .info(format!("Job {} completed in {:.2}s", id, secs));
                } else {
                    self.log.info(format!("Job {}: {} -> {}", id, old, status));
                }
                true
            }
        }
    }

    pub fn get_job(&self, id: &str) -> Option<Job> {
        self.lock().jobs.get(id).cloned()
    }

    /// All jobs, oldest first
    pub fn list_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.lock().jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// Create a fresh pending job replacing a failed or crashed one
    ///
    /// # Errors
    /// - AppError::JobNotFound for an unknown id
    /// - AppError::InvalidState unless the job is `failed` or `crashed`
    /// - AppError::RetriesExhausted when the retry budget is spent
    pub fn retry_job(&self, id: &str) -> Result<Job> {
        let now = self.time_provider.now_millis();
        let mut state = self.lock();
        let old = state
            .jobs
            .get(id)
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))?;
        retry::ensure_retryable(old)?;

        let new_id = self.unique_id(&state.jobs)?;
        let job = old.retried(new_id.clone(), now);
        state.jobs.insert(new_id.clone(), job.clone());
        state.dirty = true;
        drop(state);

        self.log.info(format!(
            "Job {} retried as {} (attempt {}/{})",
            id, new_id, job.retry_count, job.max_retries
        ));
        Ok(job)
    }

    /// Crashed jobs that still have retry budget
    pub fn crashed_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .lock()
            .jobs
            .values()
            .filter(|job| recovery::is_resumable(job))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Drop finished jobs older than the retention window; returns how many
    pub fn clean_old_jobs(&self) -> usize {
        let now = self.time_provider.now_millis();
        let sweep = {
            let mut state = self.lock();
            evict(&mut state, now, self.retention_ms())
        };
        self.report_sweep(&sweep);
        sweep.removed
    }

    fn report_sweep(&self, sweep: &Sweep) {
        for id in &sweep.future_dated {
            self.log
                .warn(format!("Job {} is dated in the future, kept", id));
        }
        if sweep.removed > 0 {
            self.log
                .info(format!("{} old jobs removed from the queue", sweep.removed));
        }
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_duration = 0i64;
        let mut timed = 0i64;

        for job in state.jobs.values() {
            *by_status.entry(job.status.to_string()).or_default() += 1;
            *by_type.entry(job.job_type().to_string()).or_default() += 1;
            if let Some(duration) = job.duration_ms {
                total_duration += duration;
                timed += 1;
            }
        }

        let avg_duration_ms = if timed > 0 {
            (total_duration as f64 / timed as f64).round() as i64
        } else {
            0
        };
        let completed = by_status.get("completed").copied().unwrap_or(0);
        let failed = by_status.get("failed").copied().unwrap_or(0);
        let success_rate = if completed + failed > 0 {
            (completed as f64 / (completed + failed) as f64 * 100.0).round() as u32
        } else {
            0
        };

        QueueStats {
            total: state.jobs.len(),
            by_status,
            by_type,
            avg_duration_ms,
            success_rate,
        }
    }

    /// Persist if anything changed since the last save
    ///
    /// Returns whether a snapshot was written.
    pub async fn save(&self) -> Result<bool> {
        self.save_inner(false).await
    }

    /// Persist unconditionally (shutdown path)
    pub async fn flush(&self) -> Result<()> {
        self.save_inner(true).await.map(|_| ())
    }

    async fn save_inner(&self, force: bool) -> Result<bool> {
        let _guard = self.save_lock.lock().await;

        let rendered = {
            let mut state = self.lock();
            if !state.dirty && !force {
                return Ok(false);
            }
            state.dirty = false;
            persistence::render(
                state.jobs.values(),
                self.time_provider.now_millis(),
                self.retention_ms(),
            )
        };
        let (contents, count) = match rendered {
            Ok(rendered) => rendered,
            Err(e) => {
                self.lock().dirty = true;
                self.log
                    .error(format!("Cannot serialize queue snapshot: {}", e));
                return Err(e.into());
            }
        };

        if let Err(e) = self.store.backup().await {
            self.log
                .debug(format!("Snapshot backup skipped: {}", e));
        }

        match self.store.write(&contents).await {
            Ok(()) => {
                self.log.debug(format!("Queue saved ({} jobs)", count));
                Ok(true)
            }
            Err(e) => {
                self.lock().dirty = true;
                self.log.error(format!("Queue save failed: {}", e));
                Err(e)
            }
        }
    }

    /// Load the persisted snapshot at startup; never fails
    ///
    /// Falls back to the backup when the primary is missing or unusable, then
    /// to an empty queue. Returns the number of jobs restored.
    pub async fn restore(&self) -> usize {
        let now = self.time_provider.now_millis();

        let parsed = match self.load_from("primary", self.store.read_primary().await) {
            Some(parsed) => Some(parsed),
            None => {
                let backup = self.load_from("backup", self.store.read_backup().await);
                if backup.is_some() {
                    self.log.info("Queue restored from the backup snapshot");
                }
                backup
            }
        };
        let Some(parsed) = parsed else {
            self.log.warn("No usable queue snapshot, starting empty");
            return 0;
        };

        for (key, reason) in &parsed.skipped {
            self.log
                .warn(format!("Skipped malformed job record {}: {}", key, reason));
        }

        let mut jobs = parsed.jobs;
        let crashed = recovery::reclassify_interrupted(jobs.iter_mut(), now);

        let restored = jobs.len();
        {
            let mut state = self.lock();
            for job in jobs {
                state.jobs.insert(job.id.clone(), job);
            }
            if !crashed.is_empty() {
                state.dirty = true;
            }
        }

        for id in &crashed {
            self.log
                .warn(format!("Job {} marked crashed (was running before restart)", id));
        }
        self.log
            .info(format!("{} jobs restored from the snapshot", restored));
        restored
    }

    fn load_from(&self, which: &str, read: Result<Option<String>>) -> Option<persistence::Parsed> {
        match read {
            Ok(Some(raw)) => match persistence::parse(&raw) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    self.log
                        .error(format!("Corrupt {} queue snapshot: {}", which, e));
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.log
                    .error(format!("Cannot read {} queue snapshot: {}", which, e));
                None
            }
        }
    }
}

struct Sweep {
    removed: usize,
    future_dated: Vec<JobId>,
}

fn evict(state: &mut QueueState, now_millis: i64, retention_ms: i64) -> Sweep {
    let future_dated: Vec<JobId> = state
        .jobs
        .values()
        .filter(|job| job.age_millis(now_millis).is_none())
        .map(|job| job.id.clone())
        .collect();

    let before = state.jobs.len();
    state
        .jobs
        .retain(|_, job| !job.is_evictable(now_millis, retention_ms));
    let removed = before - state.jobs.len();
    if removed > 0 {
        state.dirty = true;
    }
    Sweep {
        removed,
        future_dated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommandSpec, JobSpec};
    use crate::port::id_provider::mocks::{ScriptedIdProvider, SequentialIdProvider};
    use crate::port::snapshot_store::mocks::MemorySnapshotStore;
    use crate::port::time_provider::mocks::ManualClock;
    use std::time::Duration;

    const DAY: i64 = 24 * 3600 * 1000;

    struct Fixture {
        queue: JobQueue,
        clock: Arc<ManualClock>,
        store: Arc<MemorySnapshotStore>,
    }

    fn fixture_with(config: QueueConfig, store: MemorySnapshotStore) -> Fixture {
        let clock = Arc::new(ManualClock::new(10 * DAY));
        let store = Arc::new(store);
        let queue = JobQueue::new(
            config,
            store.clone(),
            clock.clone(),
            Arc::new(SequentialIdProvider::new()),
        );
        Fixture {
            queue,
            clock,
            store,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(QueueConfig::default(), MemorySnapshotStore::new())
    }

    fn ssh(cmd: &str) -> NewJob {
        NewJob::new("web1", JobSpec::Ssh(CommandSpec::new(cmd)))
    }

    fn finish(queue: &JobQueue, id: &str, status: JobStatus) {
        assert!(queue.update_job_status(id, JobStatus::Running, JobPatch::none()));
        let patch = match status {
            JobStatus::Failed => JobPatch::error("boom"),
            _ => JobPatch::none(),
        };
        assert!(queue.update_job_status(id, status, patch));
    }

    #[test]
    fn test_add_job_defaults() {
        let f = fixture();
        let mut request = ssh("uptime");
        request.rappel_secs = Some(30);
        let job = f.queue.add_job(request).unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.created_at, 10 * DAY);
        assert_eq!(job.reminder_at, Some(10 * DAY + 30_000));
        assert!(f.queue.is_dirty());
    }

    #[test]
    fn test_colliding_ids_are_regenerated() {
        let clock = Arc::new(ManualClock::new(0));
        let queue = JobQueue::new(
            QueueConfig::default(),
            Arc::new(MemorySnapshotStore::new()),
            clock,
            Arc::new(ScriptedIdProvider::new(&["aaaa0001", "aaaa0001", "bbbb0002"])),
        );
        let first = queue.add_job(ssh("ls")).unwrap();
        let second = queue.add_job(ssh("ls")).unwrap();
        assert_eq!(first.id, "aaaa0001");
        assert_eq!(second.id, "bbbb0002");
    }

    #[test]
    fn test_completed_sets_duration() {
        let f = fixture();
        let job = f.queue.add_job(ssh("echo hi")).unwrap();
        f.queue
            .update_job_status(&job.id, JobStatus::Running, JobPatch::none());
        f.clock.advance(1_500);
        f.queue
            .update_job_status(&job.id, JobStatus::Completed, JobPatch::output("hi"));

        let done = f.queue.get_job(&job.id).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.duration_ms, Some(1_500));
        assert_eq!(done.completed_at, Some(10 * DAY + 1_500));
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let f = fixture();
        assert!(!f
            .queue
            .update_job_status("nope", JobStatus::Running, JobPatch::none()));
        assert!(f.queue.is_empty());
        assert!(!f.queue.is_dirty());
    }

    #[test]
    fn test_terminal_job_not_mutated() {
        let f = fixture();
        let job = f.queue.add_job(ssh("ls")).unwrap();
        finish(&f.queue, &job.id, JobStatus::Failed);

        assert!(!f
            .queue
            .update_job_status(&job.id, JobStatus::Completed, JobPatch::output("late")));
        let stored = f.queue.get_job(&job.id).unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.output.is_none());
    }

    #[test]
    fn test_retry_creates_linked_job() {
        let f = fixture();
        let job = f.queue.add_job(ssh("make")).unwrap();
        finish(&f.queue, &job.id, JobStatus::Failed);

        f.clock.advance(60_000);
        let retry = f.queue.retry_job(&job.id).unwrap();
        assert_ne!(retry.id, job.id);
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.retried_from.as_deref(), Some(job.id.as_str()));
        assert_eq!(retry.status, JobStatus::Pending);
        assert_eq!(retry.created_at, 10 * DAY + 60_000);
        assert!(retry.error.is_none());

        // The superseded job is left untouched
        assert_eq!(f.queue.get_job(&job.id).unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn test_retry_rejections() {
        let f = fixture();
        assert!(matches!(
            f.queue.retry_job("missing"),
            Err(AppError::JobNotFound(_))
        ));

        let pending = f.queue.add_job(ssh("ls")).unwrap();
        assert!(matches!(
            f.queue.retry_job(&pending.id),
            Err(AppError::InvalidState(_))
        ));

        let mut request = ssh("ls");
        request.max_retries = Some(1);
        let job = f.queue.add_job(request).unwrap();
        finish(&f.queue, &job.id, JobStatus::Failed);
        let retry = f.queue.retry_job(&job.id).unwrap();
        finish(&f.queue, &retry.id, JobStatus::Failed);
        assert!(matches!(
            f.queue.retry_job(&retry.id),
            Err(AppError::RetriesExhausted { max_retries: 1, .. })
        ));
    }

    #[test]
    fn test_queue_full_then_eviction_frees_space() {
        let config = QueueConfig {
            max_queue_size: 2,
            ..QueueConfig::default()
        };
        let f = fixture_with(config, MemorySnapshotStore::new());
        let a = f.queue.add_job(ssh("a")).unwrap();
        f.queue.add_job(ssh("b")).unwrap();

        assert!(matches!(
            f.queue.add_job(ssh("c")),
            Err(AppError::QueueFull(2))
        ));

        finish(&f.queue, &a.id, JobStatus::Completed);
        f.clock.advance(DAY + 1);
        let c = f.queue.add_job(ssh("c")).unwrap();
        assert!(f.queue.get_job(&a.id).is_none());
        assert!(f.queue.get_job(&c.id).is_some());
        assert_eq!(f.queue.len(), 2);
    }

    #[test]
    fn test_clean_old_jobs_keeps_active_and_future() {
        let f = fixture();
        let done = f.queue.add_job(ssh("done")).unwrap();
        finish(&f.queue, &done.id, JobStatus::Completed);
        let partial = f.queue.add_job(ssh("partial")).unwrap();
        finish(&f.queue, &partial.id, JobStatus::Partial);
        let pending = f.queue.add_job(ssh("pending")).unwrap();

        f.clock.advance(2 * DAY);
        let future = f.queue.add_job(ssh("future")).unwrap();
        finish(&f.queue, &future.id, JobStatus::Completed);
        f.clock.set(10 * DAY + DAY + 5);

        let removed = f.queue.clean_old_jobs();
        assert_eq!(removed, 2);
        assert!(f.queue.get_job(&pending.id).is_some());
        assert!(f.queue.get_job(&future.id).is_some());
        let warnings = f.queue.log().query(&LogQuery {
            level: Some(LogLevel::Warn),
            search: Some("future".into()),
            ..Default::default()
        });
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_stats() {
        let f = fixture();
        let a = f.queue.add_job(ssh("a")).unwrap();
        let b = f.queue.add_job(ssh("b")).unwrap();
        let c = f.queue.add_job(ssh("c")).unwrap();
        f.queue.add_job(ssh("d")).unwrap();

        f.queue.update_job_status(&a.id, JobStatus::Running, JobPatch::none());
        f.clock.advance(1_000);
        f.queue.update_job_status(&a.id, JobStatus::Completed, JobPatch::none());
        f.queue.update_job_status(&b.id, JobStatus::Running, JobPatch::none());
        f.clock.advance(2_000);
        f.queue.update_job_status(&b.id, JobStatus::Completed, JobPatch::none());
        finish(&f.queue, &c.id, JobStatus::Failed);

        let stats = f.queue.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.by_status["completed"], 2);
        assert_eq!(stats.by_status["pending"], 1);
        assert_eq!(stats.by_type["ssh"], 4);
        assert_eq!(stats.avg_duration_ms, 2_000);
        assert_eq!(stats.success_rate, 67);
    }

    #[test]
    fn test_stats_empty_queue() {
        let stats = fixture().queue.stats();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, 0);
        assert_eq!(stats.avg_duration_ms, 0);
    }

    #[tokio::test]
    async fn test_save_only_when_dirty() {
        let f = fixture();
        assert!(!f.queue.save().await.unwrap());
        f.queue.add_job(ssh("ls")).unwrap();
        assert!(f.queue.save().await.unwrap());
        assert!(!f.queue.is_dirty());
        assert!(!f.queue.save().await.unwrap());
        assert_eq!(f.store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_save_remarks_dirty() {
        let f = fixture();
        f.queue.add_job(ssh("ls")).unwrap();
        f.store.set_fail_writes(true);
        assert!(f.queue.save().await.is_err());
        assert!(f.queue.is_dirty());

        f.store.set_fail_writes(false);
        assert!(f.queue.save().await.unwrap());
        assert!(f.store.primary().is_some());
    }

    #[tokio::test]
    async fn test_save_copies_previous_primary_to_backup() {
        let f = fixture();
        f.queue.add_job(ssh("first")).unwrap();
        f.queue.save().await.unwrap();
        let first = f.store.primary().unwrap();

        f.queue.add_job(ssh("second")).unwrap();
        f.queue.save().await.unwrap();
        assert_eq!(f.store.backup_contents().unwrap(), first);
    }

    #[tokio::test]
    async fn test_restart_marks_running_as_crashed() {
        let f = fixture();
        let job = f.queue.add_job(ssh("sleep 600")).unwrap();
        f.queue.update_job_status(&job.id, JobStatus::Running, JobPatch::none());
        tokio_test::assert_ok!(f.queue.flush().await);
        let snapshot = f.store.primary().unwrap();

        let restarted = fixture_with(
            QueueConfig::default(),
            MemorySnapshotStore::new().with_primary(snapshot),
        );
        assert_eq!(restarted.queue.restore().await, 1);

        let crashed = restarted.queue.get_job(&job.id).unwrap();
        assert_eq!(crashed.status, JobStatus::Crashed);
        assert!(crashed.can_retry);
        assert_eq!(crashed.crashed_at, Some(10 * DAY));
        assert_eq!(restarted.queue.crashed_jobs().len(), 1);
        assert!(restarted.queue.is_dirty());
    }

    #[tokio::test]
    async fn test_restore_falls_back_to_backup() {
        let spec = JobSpec::Ssh(CommandSpec::new("ls"));
        let job = Job::new("b4ck0001", DAY, "web1", spec);
        let backup = serde_json::json!({ "b4ck0001": job }).to_string();

        let f = fixture_with(
            QueueConfig::default(),
            MemorySnapshotStore::new()
                .with_primary("{ truncated")
                .with_backup(backup),
        );
        assert_eq!(f.queue.restore().await, 1);
        assert!(f.queue.get_job("b4ck0001").is_some());
    }

    #[tokio::test]
    async fn test_restore_without_snapshots_starts_empty() {
        let f = fixture_with(
            QueueConfig::default(),
            MemorySnapshotStore::new()
                .with_primary("garbage")
                .with_backup("more garbage"),
        );
        assert_eq!(f.queue.restore().await, 0);
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_skips_evicted() {
        let config = QueueConfig {
            retention: Duration::from_millis(DAY as u64),
            ..QueueConfig::default()
        };
        let f = fixture_with(config.clone(), MemorySnapshotStore::new());
        let old = f.queue.add_job(ssh("old")).unwrap();
        finish(&f.queue, &old.id, JobStatus::Completed);
        f.clock.advance(DAY + 1);
        let kept = f.queue.add_job(ssh("kept")).unwrap();
        tokio_test::assert_ok!(f.queue.flush().await);

        let reloaded = fixture_with(
            config,
            MemorySnapshotStore::new().with_primary(f.store.primary().unwrap()),
        );
        reloaded.queue.restore().await;
        assert!(reloaded.queue.get_job(&old.id).is_none());
        assert_eq!(reloaded.queue.get_job(&kept.id).unwrap(), kept);
    }
}

//! Background job executor
//!
//! Jobs run on a bounded pool; submissions beyond capacity queue in
//! pending. Every state transition is persisted atomically, cancellation is
//! observed at every await, and a wall-clock budget moves runaway jobs to
//! timeout. A periodic cleanup pass times out stale jobs and drops terminal
//! ones past retention.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{JobError, JobResult};
use crate::job::{Job, JobStatus, JobType};
use crate::persistence::JobStore;

/// Job manager tuning
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Concurrent executor slots
    pub max_concurrent: usize,
    /// Wall-clock budget per job
    pub max_duration: Duration,
    /// Period of the cleanup task
    pub cleanup_interval: Duration,
    /// Age at which non-terminal jobs are timed out by cleanup
    pub max_age: Duration,
    /// How long terminal jobs are retained
    pub retention: Duration,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_duration: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(300),
            max_age: Duration::from_secs(86_400),
            retention: Duration::from_secs(86_400),
        }
    }
}

/// Handle given to job bodies for progress and cancellation
#[derive(Clone)]
pub struct JobContext {
    /// Cancelled when the job is cancelled; bodies must observe it at
    /// every suspension point
    pub cancel: CancellationToken,
    manager: JobManager,
    job_id: String,
}

impl JobContext {
    /// Report progress for this job; regressions are ignored
    pub async fn progress(&self, value: f64, message: &str) {
        self.manager
            .update_progress(&self.job_id, value, message)
            .await;
    }
}

enum Outcome {
    Finished(Result<Value, String>),
    Cancelled,
    Timeout,
}

/// The background job manager
#[derive(Clone)]
pub struct JobManager {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
    store: Arc<JobStore>,
    semaphore: Arc<Semaphore>,
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
    config: JobManagerConfig,
}

impl JobManager {
    /// Open a manager over a persistence file, loading any surviving jobs
    pub async fn new(store_path: impl AsRef<Path>, config: JobManagerConfig) -> JobResult<Self> {
        let store = JobStore::new(store_path.as_ref().to_path_buf());
        let existing = store.load().await?;
        let mut jobs = HashMap::with_capacity(existing.len());
        for job in existing {
            jobs.insert(job.id.clone(), job);
        }
        info!(jobs = jobs.len(), "job store loaded");

        Ok(Self {
            jobs: Arc::new(Mutex::new(jobs)),
            store: Arc::new(store),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            tokens: Arc::new(Mutex::new(HashMap::new())),
            config,
        })
    }

    /// Submit a job. The body runs once an executor slot frees up; until
    /// then the job queues in pending. Returns the job id immediately.
    pub async fn submit<F, Fut>(
        &self,
        job_type: JobType,
        parameters: Value,
        work: F,
    ) -> JobResult<String>
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let job = Job::new(job_type, parameters);
        let id = job.id.clone();
        let token = CancellationToken::new();

        {
            let mut jobs = self.jobs.lock().await;
            jobs.insert(id.clone(), job);
            self.persist_locked(&jobs).await;
        }
        self.tokens.lock().await.insert(id.clone(), token.clone());

        let manager = self.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            manager.drive(job_id, token, work).await;
        });

        Ok(id)
    }

    async fn drive<F, Fut>(&self, id: String, token: CancellationToken, work: F)
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, String>> + Send,
    {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        // The job may have been cancelled while queued.
        {
            let mut jobs = self.jobs.lock().await;
            match jobs.get_mut(&id) {
                Some(job) if job.status == JobStatus::Pending => {
                    job.mark_running();
                }
                _ => {
                    drop(permit);
                    return;
                }
            }
            self.persist_locked(&jobs).await;
        }

        let context = JobContext {
            cancel: token.clone(),
            manager: self.clone(),
            job_id: id.clone(),
        };

        let outcome = tokio::select! {
            result = work(context) => Outcome::Finished(result),
            _ = token.cancelled() => Outcome::Cancelled,
            _ = tokio::time::sleep(self.config.max_duration) => Outcome::Timeout,
        };

        self.finish(&id, outcome).await;
        self.tokens.lock().await.remove(&id);
        drop(permit);
    }

    async fn finish(&self, id: &str, outcome: Outcome) {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(id) else { return };
        if job.status.is_terminal() {
            return;
        }

        match outcome {
            Outcome::Finished(Ok(result)) => job.complete(result),
            Outcome::Finished(Err(error)) => job.fail(error),
            Outcome::Cancelled => job.cancel(),
            Outcome::Timeout => {
                warn!(job_id = %id, "job exceeded wall-clock budget");
                job.timeout();
            }
        }
        self.persist_locked(&jobs).await;
    }

    /// Cancel a job. The status is updated and persisted before the body's
    /// cancellation token fires; terminal jobs are left untouched.
    pub async fn cancel(&self, id: &str) -> JobResult<bool> {
        {
            let mut jobs = self.jobs.lock().await;
            let job = jobs.get_mut(id).ok_or_else(|| JobError::NotFound(id.into()))?;
            if job.status.is_terminal() {
                return Ok(false);
            }
            job.cancel();
            self.persist_locked(&jobs).await;
        }

        if let Some(token) = self.tokens.lock().await.remove(id) {
            token.cancel();
        }
        info!(job_id = %id, "job cancelled");
        Ok(true)
    }

    /// Advance a job's progress (in-memory; persisted on the next
    /// transition)
    pub async fn update_progress(&self, id: &str, value: f64, message: &str) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(id) {
            if !job.status.is_terminal() {
                job.update_progress(value, message);
            }
        }
    }

    /// Look up one job
    pub async fn get_job(&self, id: &str) -> Option<Job> {
        self.jobs.lock().await.get(id).cloned()
    }

    /// All jobs, newest first
    pub async fn list_jobs(&self) -> Vec<Job> {
        let jobs = self.jobs.lock().await;
        let mut list: Vec<Job> = jobs.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    /// One cleanup pass: stale non-terminal jobs are timed out, terminal
    /// jobs past retention are dropped, and the store is rewritten.
    pub async fn cleanup_once(&self) {
        let now = chrono::Utc::now();
        let max_age = chrono::Duration::from_std(self.config.max_age).unwrap_or_default();
        let retention = chrono::Duration::from_std(self.config.retention).unwrap_or_default();

        let mut jobs = self.jobs.lock().await;
        let mut timed_out = 0usize;
        for job in jobs.values_mut() {
            if !job.status.is_terminal() && now - job.age_reference() > max_age {
                job.timeout();
                timed_out += 1;
            }
        }

        let before = jobs.len();
        jobs.retain(|_, job| match (job.status.is_terminal(), job.finished_at) {
            (true, Some(finished)) => now - finished <= retention,
            _ => true,
        });
        let removed = before - jobs.len();

        if timed_out > 0 || removed > 0 {
            info!(timed_out, removed, "job cleanup pass");
        }
        self.persist_locked(&jobs).await;
    }

    /// Spawn the periodic cleanup task
    pub fn spawn_cleanup(&self) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.config.cleanup_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                manager.cleanup_once().await;
            }
        })
    }

    async fn persist_locked(&self, jobs: &HashMap<String, Job>) {
        let snapshot: Vec<Job> = jobs.values().cloned().collect();
        if let Err(e) = self.store.save(&snapshot).await {
            warn!(error = %e, "failed to persist job store");
        }
    }
}

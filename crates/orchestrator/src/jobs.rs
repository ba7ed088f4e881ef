//! Tracked background jobs
//!
//! [`JobRegistry`] stores every [`Job`] behind one lock. [`JobExecutor`] runs
//! submitted operations on tokio tasks, at most `concurrency` at a time, and
//! drives each job through `pending -> running -> completed | failed`.
//! A panicking operation is recorded as a failed job; it never leaves the job
//! running or takes a worker down.

use chrono::{DateTime, Utc};
use media_insight_enhancement::EnhancementError;
use media_insight_inference::InferenceError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, error, info, warn};

/// Default number of jobs executing at once
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job is queued
    Pending,
    /// Job is running
    Running,
    /// Job completed successfully
    Completed,
    /// Job failed
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Category of a job failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// Inference backend call failed (including timeouts)
    Backend,
    /// Enhancement filters rejected or failed on the input
    Enhancement,
    Io,
    /// The operation panicked
    Panicked,
    Internal,
}

/// Typed terminal failure of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind:?}: {message}")]
pub struct JobError {
    pub kind: JobErrorKind,
    pub message: String,
}

impl JobError {
    #[must_use]
    pub fn new(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<InferenceError> for JobError {
    fn from(err: InferenceError) -> Self {
        Self::new(JobErrorKind::Backend, err.to_string())
    }
}

impl From<EnhancementError> for JobError {
    fn from(err: EnhancementError) -> Self {
        let kind = match err {
            EnhancementError::Io(_) => JobErrorKind::Io,
            _ => JobErrorKind::Enhancement,
        };
        Self::new(kind, err.to_string())
    }
}

/// Rejected status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone, PartialEq)]
enum JobState {
    Pending,
    Running,
    Completed(serde_json::Value),
    Failed(JobError),
}

impl JobState {
    fn status(&self) -> JobStatus {
        match self {
            Self::Pending => JobStatus::Pending,
            Self::Running => JobStatus::Running,
            Self::Completed(_) => JobStatus::Completed,
            Self::Failed(_) => JobStatus::Failed,
        }
    }
}

/// A tracked unit of asynchronous work
///
/// A result exists only once completed and an error only once failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    id: String,
    label: String,
    state: JobState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Job {
    fn new(label: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            label,
            state: JobState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    #[must_use]
    pub fn result(&self) -> Option<&serde_json::Value> {
        match &self.state {
            JobState::Completed(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&JobError> {
        match &self.state {
            JobState::Failed(err) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn transition(&mut self, next: JobState) -> Result<(), TransitionError> {
        let from = self.status();
        let to = next.status();
        let allowed = matches!(
            (from, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        );
        if !allowed {
            return Err(TransitionError { from, to });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobState::Running)
    }

    fn complete(&mut self, result: serde_json::Value) -> Result<(), TransitionError> {
        self.transition(JobState::Completed(result))
    }

    fn fail(&mut self, error: JobError) -> Result<(), TransitionError> {
        self.transition(JobState::Failed(error))
    }

    /// Short handle describing the job as submitted
    #[must_use]
    pub fn handle(&self) -> JobHandle {
        JobHandle {
            job_id: self.id.clone(),
            label: self.label.clone(),
            status: self.status(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobView<'a> {
    job_id: &'a str,
    label: &'a str,
    status: JobStatus,
    result: Option<&'a serde_json::Value>,
    error: Option<&'a JobError>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Serialize for Job {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        JobView {
            job_id: &self.id,
            label: &self.label,
            status: self.status(),
            result: self.result(),
            error: self.error(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .serialize(serializer)
    }
}

/// Identity and status of a job at submission time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub job_id: String,
    pub label: String,
    pub status: JobStatus,
}

/// In-memory store of jobs keyed by identifier
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::with_capacity(100))),
        }
    }

    async fn create(&self, label: String) -> Job {
        let job = Job::new(label);
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        job
    }

    /// Snapshot of one job
    pub async fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Point-in-time copy of every job
    pub async fn list(&self) -> HashMap<String, Job> {
        self.jobs.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Apply a status change under the write lock
    async fn update<F>(&self, job_id: &str, apply: F)
    where
        F: FnOnce(&mut Job) -> Result<(), TransitionError>,
    {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(job_id) {
            Some(job) => {
                if let Err(e) = apply(job) {
                    error!("Job {} rejected status change: {}", job_id, e);
                } else {
                    debug!("Job {} is now {:?}", job_id, job.status());
                }
            }
            None => warn!("Job {} vanished before its status could be updated", job_id),
        }
    }

    /// Remove terminal jobs last updated more than `retention` ago
    ///
    /// Pending and running jobs are always kept. Returns the number removed.
    pub async fn prune_finished(&self, retention: Duration) -> usize {
        let retention =
            chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = Utc::now() - retention;

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status().is_terminal() && job.updated_at <= cutoff));
        let removed = before - jobs.len();
        if removed > 0 {
            info!("Pruned {} finished jobs", removed);
        }
        removed
    }
}

/// Bounded pool running submitted operations
#[derive(Clone)]
pub struct JobExecutor {
    registry: JobRegistry,
    permits: Arc<Semaphore>,
    concurrency: usize,
}

impl JobExecutor {
    /// Create an executor running at most `concurrency` jobs at once (minimum 1)
    #[must_use]
    pub fn new(registry: JobRegistry, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            registry,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Register a pending job and queue `operation` for execution
    ///
    /// Returns as soon as the job is registered; the operation runs later on
    /// a worker once a permit is free.
    pub async fn submit<F, Fut>(&self, label: impl Into<String>, operation: F) -> JobHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value, JobError>> + Send + 'static,
    {
        let job = self.registry.create(label.into()).await;
        let handle = job.handle();
        info!("Queued job {} ({})", handle.job_id, handle.label);

        let registry = self.registry.clone();
        let permits = self.permits.clone();
        let job_id = handle.job_id.clone();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                registry
                    .update(&job_id, |job| {
                        job.fail(JobError::new(
                            JobErrorKind::Internal,
                            "worker pool shut down",
                        ))
                    })
                    .await;
                return;
            };

            registry.update(&job_id, Job::start).await;
            info!("Starting job {}", job_id);

            // Run on its own task so a panic surfaces as a JoinError here
            let outcome = tokio::spawn(async move { operation().await }).await;
            match outcome {
                Ok(Ok(result)) => {
                    info!("Job {} completed successfully", job_id);
                    registry.update(&job_id, |job| job.complete(result)).await;
                }
                Ok(Err(err)) => {
                    error!("Job {} failed: {}", job_id, err);
                    registry.update(&job_id, |job| job.fail(err)).await;
                }
                Err(join_err) => {
                    let message = if join_err.is_panic() {
                        panic_message(join_err.into_panic())
                    } else {
                        "job task was cancelled".to_string()
                    };
                    error!("Job {} panicked: {}", job_id, message);
                    registry
                        .update(&job_id, |job| {
                            job.fail(JobError::new(JobErrorKind::Panicked, message))
                        })
                        .await;
                }
            }
        });

        handle
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "operation panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::oneshot;

    async fn wait_terminal(registry: &JobRegistry, job_id: &str) -> Job {
        for _ in 0..200 {
            if let Some(job) = registry.get(job_id).await {
                if job.status().is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} did not finish");
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let mut job = Job::new("label".to_string());
        assert_eq!(job.status(), JobStatus::Pending);
        assert!(job.complete(serde_json::json!(1)).is_err());

        job.start().unwrap();
        assert!(job.start().is_err());
        job.complete(serde_json::json!({"ok": true})).unwrap();
        assert_eq!(job.status(), JobStatus::Completed);

        let err = job.fail(JobError::new(JobErrorKind::Internal, "late")).unwrap_err();
        assert_eq!(err.from, JobStatus::Completed);
        assert!(job.start().is_err());
        assert!(job.error().is_none());
        assert!(job.updated_at() >= job.created_at());
    }

    #[test]
    fn test_job_serialization() {
        let mut job = Job::new("generate-subtitles".to_string());
        job.start().unwrap();
        job.fail(JobError::new(JobErrorKind::Backend, "timeout")).unwrap();

        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["jobId"].as_str().unwrap().len(), 32);
        assert_eq!(json["label"], "generate-subtitles");
        assert_eq!(json["status"], "failed");
        assert!(json["result"].is_null());
        assert_eq!(json["error"]["kind"], "backend");
        assert_eq!(json["error"]["message"], "timeout");
        assert!(json["createdAt"].is_string());
    }

    #[tokio::test]
    async fn test_submit_returns_before_operation_runs() {
        let executor = JobExecutor::new(JobRegistry::new(), 1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let handle = executor
            .submit("blocked", move || async move {
                let _ = release_rx.await;
                Ok(serde_json::json!("done"))
            })
            .await;
        assert_eq!(handle.status, JobStatus::Pending);

        let snapshot = executor.registry().get(&handle.job_id).await.unwrap();
        assert!(!snapshot.status().is_terminal());

        release_tx.send(()).unwrap();
        let job = wait_terminal(executor.registry(), &handle.job_id).await;
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.result(), Some(&serde_json::json!("done")));
        assert!(job.error().is_none());
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let executor = JobExecutor::new(JobRegistry::new(), 2);
        let handle = executor
            .submit("fails", || async {
                Err(JobError::new(JobErrorKind::Backend, "backend unreachable"))
            })
            .await;

        let job = wait_terminal(executor.registry(), &handle.job_id).await;
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.result().is_none());
        assert_eq!(job.error().unwrap().message, "backend unreachable");
    }

    #[tokio::test]
    async fn test_panic_is_recorded_and_pool_survives() {
        let executor = JobExecutor::new(JobRegistry::new(), 1);
        let panicking = executor
            .submit("panics", || async {
                panic!("filter exploded");
            })
            .await;
        let next = executor
            .submit("after", || async { Ok(serde_json::json!(2)) })
            .await;

        let job = wait_terminal(executor.registry(), &panicking.job_id).await;
        assert_eq!(job.status(), JobStatus::Failed);
        let err = job.error().unwrap();
        assert_eq!(err.kind, JobErrorKind::Panicked);
        assert!(err.message.contains("filter exploded"));

        let job = wait_terminal(executor.registry(), &next.job_id).await;
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrency_bound_and_exactly_once() {
        let executor = JobExecutor::new(JobRegistry::new(), 3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let executed = Arc::new(StdMutex::new(Vec::new()));

        let mut ids = Vec::new();
        for n in 0..20 {
            let running = running.clone();
            let peak = peak.clone();
            let executed = executed.clone();
            let handle = executor
                .submit(format!("job-{n}"), move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    executed.lock().unwrap().push(n);
                    Ok(serde_json::json!(n))
                })
                .await;
            ids.push(handle.job_id);
        }

        let mut last_len = 0;
        for id in &ids {
            let len = executor.registry().len().await;
            assert!(len >= last_len);
            last_len = len;
            assert_eq!(
                wait_terminal(executor.registry(), id).await.status(),
                JobStatus::Completed
            );
        }

        assert_eq!(executor.registry().len().await, 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        let executed = executed.lock().unwrap();
        assert_eq!(executed.len(), 20);
        assert_eq!(executed.iter().collect::<HashSet<_>>().len(), 20);
    }

    #[tokio::test]
    async fn test_list_is_a_snapshot() {
        let executor = JobExecutor::new(JobRegistry::new(), 1);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let handle = executor
            .submit("snap", move || async move {
                let _ = release_rx.await;
                Ok(serde_json::Value::Null)
            })
            .await;

        let snapshot = executor.registry().list().await;
        release_tx.send(()).unwrap();
        wait_terminal(executor.registry(), &handle.job_id).await;

        assert!(!snapshot[&handle.job_id].status().is_terminal());
    }

    #[tokio::test]
    async fn test_get_unknown_job() {
        let registry = JobRegistry::new();
        assert!(registry.get("does-not-exist").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_prune_keeps_unfinished_jobs() {
        let executor = JobExecutor::new(JobRegistry::new(), 2);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let pending = executor
            .submit("held", move || async move {
                let _ = release_rx.await;
                Ok(serde_json::Value::Null)
            })
            .await;
        let done = executor
            .submit("quick", || async { Ok(serde_json::Value::Null) })
            .await;
        wait_terminal(executor.registry(), &done.job_id).await;

        assert_eq!(executor.registry().prune_finished(Duration::from_secs(3600)).await, 0);
        assert_eq!(executor.registry().prune_finished(Duration::ZERO).await, 1);
        assert!(executor.registry().get(&done.job_id).await.is_none());
        assert!(executor.registry().get(&pending.job_id).await.is_some());

        release_tx.send(()).unwrap();
    }
}

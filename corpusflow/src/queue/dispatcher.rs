//! One background job per fingerprint.

use super::retry::{with_retry, RetryConfig};
use super::{EnqueueRequest, JobRecord, TaskQueue, DEFAULT_JOB_TIMEOUT, FINGERPRINT_METADATA_KEY};
use crate::cache::ArtifactCache;
use crate::core::ModelStatus;
use crate::errors::QueueError;
use crate::fingerprint::Fingerprint;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Result of [`JobDispatcher::enqueue_if_absent`].
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// A job for the fingerprint was already queued or running.
    Existing(JobRecord),
    /// A new job was submitted.
    Enqueued(JobRecord),
    /// The queue could not be reached; no job exists.
    Unavailable,
}

impl EnqueueOutcome {
    /// Returns the job, if there is one.
    #[must_use]
    pub const fn job(&self) -> Option<&JobRecord> {
        match self {
            Self::Existing(job) | Self::Enqueued(job) => Some(job),
            Self::Unavailable => None,
        }
    }

    /// Returns true if this call submitted the job.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        matches!(self, Self::Enqueued(_))
    }
}

/// Wraps a [`TaskQueue`] so that at most one job per fingerprint is queued
/// or running.
///
/// Within one process the check-then-enqueue is serialized per
/// fingerprint. Two processes sharing a queue can still both enqueue in
/// the window between the check and the submit; both jobs compute the same
/// artifact, so the duplicate only costs time.
///
/// Queue outages never surface as errors here: lookups degrade to "no job"
/// and enqueues to [`EnqueueOutcome::Unavailable`].
pub struct JobDispatcher {
    queue: Arc<dyn TaskQueue>,
    cache: ArtifactCache,
    timeout: Duration,
    retry: RetryConfig,
    locks: DashMap<Fingerprint, Arc<Mutex<()>>>,
    known: DashMap<Fingerprint, String>,
}

impl JobDispatcher {
    /// Creates a dispatcher over `queue`, consulting `cache` for status.
    #[must_use]
    pub fn new(queue: Arc<dyn TaskQueue>, cache: ArtifactCache) -> Self {
        Self {
            queue,
            cache,
            timeout: DEFAULT_JOB_TIMEOUT,
            retry: RetryConfig::default(),
            locks: DashMap::new(),
            known: DashMap::new(),
        }
    }

    /// Sets the timeout given to submitted jobs.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy for transient enqueue failures.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the underlying queue.
    #[must_use]
    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    /// Returns the artifact cache.
    #[must_use]
    pub const fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Returns the timeout given to submitted jobs.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Finds a queued or running job for `fingerprint`.
    ///
    /// Running jobs are checked first. An unreachable queue is logged and
    /// reported as no job.
    #[must_use]
    pub fn find_active(&self, fingerprint: &Fingerprint) -> Option<JobRecord> {
        match self.try_find_active(fingerprint) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    queue = %self.queue.name(),
                    error = %e,
                    "Could not list jobs; assuming none is active"
                );
                None
            }
        }
    }

    fn try_find_active(&self, fingerprint: &Fingerprint) -> Result<Option<JobRecord>, QueueError> {
        if let Some(job) = self
            .queue
            .list_started()?
            .into_iter()
            .find(|job| job.is_for(fingerprint))
        {
            return Ok(Some(job));
        }
        Ok(self
            .queue
            .list_queued()?
            .into_iter()
            .find(|job| job.is_for(fingerprint)))
    }

    /// Submits `task(args)` for `fingerprint` unless a job for it is already
    /// queued or running.
    ///
    /// The job carries the fingerprint in its metadata and the dispatcher's
    /// timeout.
    pub fn enqueue_if_absent(
        &self,
        fingerprint: &Fingerprint,
        task: &str,
        args: Vec<Value>,
    ) -> EnqueueOutcome {
        let lock = Arc::clone(self.locks.entry(fingerprint.clone()).or_default().value());
        let outcome = {
            let _guard = lock.lock();
            self.enqueue_locked(fingerprint, task, args)
        };
        drop(lock);
        self.locks
            .remove_if(fingerprint, |_, lock| Arc::strong_count(lock) == 1);
        outcome
    }

    fn enqueue_locked(
        &self,
        fingerprint: &Fingerprint,
        task: &str,
        args: Vec<Value>,
    ) -> EnqueueOutcome {
        let existing = match self.try_find_active(fingerprint) {
            Ok(existing) => existing,
            Err(e) => {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    error = %e,
                    "Task queue unreachable; continuing without a background job"
                );
                return EnqueueOutcome::Unavailable;
            }
        };
        if let Some(job) = existing {
            tracing::debug!(fingerprint = %fingerprint, job_id = %job.id, status = %job.status, "Job already active");
            self.known.insert(fingerprint.clone(), job.id.clone());
            return EnqueueOutcome::Existing(job);
        }

        let request = EnqueueRequest {
            task: task.to_string(),
            args,
            kwargs: serde_json::Map::new(),
            timeout: self.timeout,
            metadata: std::iter::once((
                FINGERPRINT_METADATA_KEY.to_string(),
                fingerprint.to_string(),
            ))
            .collect(),
        };

        match with_retry(
            &self.retry,
            || self.queue.enqueue(request.clone()),
            QueueError::is_transient,
        ) {
            Ok(job) => {
                tracing::info!(fingerprint = %fingerprint, job_id = %job.id, task, "Enqueued background job");
                self.known.insert(fingerprint.clone(), job.id.clone());
                EnqueueOutcome::Enqueued(job)
            }
            Err(e) => {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    task,
                    error = %e,
                    "Could not enqueue background job; continuing without one"
                );
                EnqueueOutcome::Unavailable
            }
        }
    }

    /// Reports the availability of the `kind` artifact for `fingerprint`,
    /// searching every data source directory under the storage root.
    ///
    /// A job that has ended is reported once and then forgotten; later
    /// calls see the artifact or report [`ModelStatus::Unavailable`].
    #[must_use]
    pub fn status(&self, fingerprint: &Fingerprint, kind: &str) -> ModelStatus {
        if self.cache.locate(fingerprint, kind).is_some() {
            self.known.remove(fingerprint);
            return ModelStatus::Ok;
        }
        self.job_status(fingerprint)
    }

    /// Like [`JobDispatcher::status`] when the data source directory is
    /// known.
    #[must_use]
    pub fn status_at(&self, base_path: &Path, fingerprint: &Fingerprint, kind: &str) -> ModelStatus {
        if self.cache.exists(base_path, fingerprint, kind) {
            self.known.remove(fingerprint);
            return ModelStatus::Ok;
        }
        self.job_status(fingerprint)
    }

    fn job_status(&self, fingerprint: &Fingerprint) -> ModelStatus {
        if let Some(job) = self.find_active(fingerprint) {
            return job.status.into();
        }

        let Some(job_id) = self.known.get(fingerprint).map(|id| id.value().clone()) else {
            return ModelStatus::Unavailable;
        };
        match self.queue.fetch(&job_id) {
            Ok(Some(job)) => {
                if !job.status.is_active() {
                    self.known.remove(fingerprint);
                }
                job.status.into()
            }
            Ok(None) => {
                self.known.remove(fingerprint);
                ModelStatus::Unavailable
            }
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, job_id, error = %e, "Could not fetch job");
                ModelStatus::Unavailable
            }
        }
    }
}

impl std::fmt::Debug for JobDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDispatcher")
            .field("queue", &self.queue.name())
            .field("timeout", &self.timeout)
            .field("known_jobs", &self.known.len())
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PHRASE_ARTIFACT_KIND;
    use crate::core::JobStatus;
    use crate::fingerprint::fingerprint;
    use crate::nlp::{LearnerSettings, PhraseModel};
    use crate::queue::{InMemoryTaskQueue, JitterStrategy, Task};
    use mockall::mock;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    mock! {
        pub Queue {}

        impl TaskQueue for Queue {
            fn name(&self) -> &str;
            fn enqueue(&self, request: EnqueueRequest) -> Result<JobRecord, QueueError>;
            fn fetch(&self, job_id: &str) -> Result<Option<JobRecord>, QueueError>;
            fn list_started(&self) -> Result<Vec<JobRecord>, QueueError>;
            fn list_queued(&self) -> Result<Vec<JobRecord>, QueueError>;
        }
    }

    impl std::fmt::Debug for MockQueue {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("MockQueue")
        }
    }

    #[derive(Debug)]
    struct Noop;

    impl Task for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn run(&self, _args: &[Value], _kwargs: &Map<String, Value>) -> anyhow::Result<Value> {
            Ok(Value::Null)
        }
    }

    fn job(id: &str, fp: &Fingerprint, status: JobStatus) -> JobRecord {
        JobRecord {
            id: id.into(),
            task: "noop".into(),
            status,
            metadata: std::iter::once((FINGERPRINT_METADATA_KEY.to_string(), fp.to_string()))
                .collect(),
            result: None,
            error: None,
            enqueued_at: crate::utils::iso_timestamp(),
            started_at: None,
            ended_at: None,
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(3)
            .with_base_delay_ms(1)
            .with_jitter(JitterStrategy::None)
    }

    fn in_memory(dir: &TempDir) -> (Arc<InMemoryTaskQueue>, JobDispatcher) {
        let queue = Arc::new(InMemoryTaskQueue::new("default"));
        queue.register_task(Arc::new(Noop));
        let dispatcher = JobDispatcher::new(queue.clone(), ArtifactCache::new(dir.path()));
        (queue, dispatcher)
    }

    fn fp(source: &str) -> Fingerprint {
        fingerprint(source, "text", &[])
    }

    #[test]
    fn test_enqueue_if_absent_dedups() {
        let dir = TempDir::new().unwrap();
        let (queue, dispatcher) = in_memory(&dir);
        let fp = fp("A");

        let first = dispatcher.enqueue_if_absent(&fp, "noop", vec![json!(1)]);
        let second = dispatcher.enqueue_if_absent(&fp, "noop", vec![json!(1)]);

        assert!(first.is_new());
        assert_eq!(second, EnqueueOutcome::Existing(first.job().unwrap().clone()));
        assert_eq!(queue.len(), 1);

        let submitted = first.job().unwrap();
        assert!(submitted.is_for(&fp));
        assert_eq!(dispatcher.find_active(&fp).map(|j| j.id), Some(submitted.id.clone()));
    }

    #[test]
    fn test_distinct_fingerprints_get_distinct_jobs() {
        let dir = TempDir::new().unwrap();
        let (queue, dispatcher) = in_memory(&dir);

        assert!(dispatcher.enqueue_if_absent(&fp("A"), "noop", vec![]).is_new());
        assert!(dispatcher.enqueue_if_absent(&fp("B"), "noop", vec![]).is_new());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_enqueue_again_after_job_ends() {
        let dir = TempDir::new().unwrap();
        let (queue, dispatcher) = in_memory(&dir);
        let fp = fp("A");

        dispatcher.enqueue_if_absent(&fp, "noop", vec![]);
        queue.run_pending();
        assert_eq!(dispatcher.find_active(&fp), None);

        assert!(dispatcher.enqueue_if_absent(&fp, "noop", vec![]).is_new());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_concurrent_enqueues_create_one_job() {
        let dir = TempDir::new().unwrap();
        let (queue, dispatcher) = in_memory(&dir);
        let dispatcher = Arc::new(dispatcher);
        let fp = fp("A");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                let fp = fp.clone();
                std::thread::spawn(move || dispatcher.enqueue_if_absent(&fp, "noop", vec![]))
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(EnqueueOutcome::is_new)
            .count();

        assert_eq!(created, 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_find_active_prefers_started() {
        let fp = fp("A");
        let started = job("started", &fp, JobStatus::Started);

        let mut queue = MockQueue::new();
        queue.expect_name().return_const("mock".to_string());
        let s = started.clone();
        queue.expect_list_started().returning(move || Ok(vec![s.clone()]));
        queue.expect_list_queued().never();

        let dispatcher = JobDispatcher::new(Arc::new(queue), ArtifactCache::new("/nonexistent"));
        assert_eq!(dispatcher.find_active(&fp), Some(started));
    }

    #[test]
    fn test_find_active_ignores_other_fingerprints() {
        let other = job("other", &fp("B"), JobStatus::Queued);
        let fp = fp("A");

        let mut queue = MockQueue::new();
        queue.expect_name().return_const("mock".to_string());
        queue.expect_list_started().returning(|| Ok(vec![]));
        queue.expect_list_queued().returning(move || Ok(vec![other.clone()]));

        let dispatcher = JobDispatcher::new(Arc::new(queue), ArtifactCache::new("/nonexistent"));
        assert_eq!(dispatcher.find_active(&fp), None);
    }

    #[test]
    fn test_unreachable_queue_degrades() {
        let mut queue = MockQueue::new();
        queue.expect_name().return_const("mock".to_string());
        queue
            .expect_list_started()
            .returning(|| Err(QueueError::Unavailable("connection refused".into())));
        queue.expect_list_queued().never();
        queue.expect_enqueue().never();
        queue.expect_fetch().never();

        let dispatcher = JobDispatcher::new(Arc::new(queue), ArtifactCache::new("/nonexistent"));
        let fp = fp("A");

        assert_eq!(dispatcher.find_active(&fp), None);
        assert_eq!(dispatcher.enqueue_if_absent(&fp, "noop", vec![]), EnqueueOutcome::Unavailable);
        assert_eq!(dispatcher.status(&fp, PHRASE_ARTIFACT_KIND), ModelStatus::Unavailable);
    }

    #[test]
    fn test_transient_enqueue_failure_is_retried() {
        let fp = fp("A");
        let calls = Arc::new(AtomicUsize::new(0));
        let submitted = job("job-1", &fp, JobStatus::Queued);

        let mut queue = MockQueue::new();
        queue.expect_name().return_const("mock".to_string());
        queue.expect_list_started().returning(|| Ok(vec![]));
        queue.expect_list_queued().returning(|| Ok(vec![]));
        let counter = Arc::clone(&calls);
        queue.expect_enqueue().returning(move |request| {
            assert_eq!(request.metadata.get("fingerprint"), Some(&submitted.metadata["fingerprint"]));
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(QueueError::Unavailable("blip".into()))
            } else {
                Ok(submitted.clone())
            }
        });

        let dispatcher = JobDispatcher::new(Arc::new(queue), ArtifactCache::new("/nonexistent"))
            .with_retry(fast_retry());
        assert!(dispatcher.enqueue_if_absent(&fp, "noop", vec![]).is_new());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_rejected_enqueue_is_not_retried() {
        let mut queue = MockQueue::new();
        queue.expect_name().return_const("mock".to_string());
        queue.expect_list_started().returning(|| Ok(vec![]));
        queue.expect_list_queued().returning(|| Ok(vec![]));
        queue
            .expect_enqueue()
            .times(1)
            .returning(|_| Err(QueueError::Rejected("queue full".into())));

        let dispatcher = JobDispatcher::new(Arc::new(queue), ArtifactCache::new("/nonexistent"))
            .with_retry(fast_retry());
        assert_eq!(
            dispatcher.enqueue_if_absent(&fp("A"), "noop", vec![]),
            EnqueueOutcome::Unavailable
        );
    }

    #[test]
    fn test_enqueue_uses_configured_timeout() {
        let fp = fp("A");
        let submitted = job("job-1", &fp, JobStatus::Queued);

        let mut queue = MockQueue::new();
        queue.expect_name().return_const("mock".to_string());
        queue.expect_list_started().returning(|| Ok(vec![]));
        queue.expect_list_queued().returning(|| Ok(vec![]));
        queue
            .expect_enqueue()
            .withf(|request| request.timeout == Duration::from_secs(90) && request.task == "noop")
            .times(1)
            .returning(move |_| Ok(submitted.clone()));

        let dispatcher = JobDispatcher::new(Arc::new(queue), ArtifactCache::new("/nonexistent"))
            .with_timeout(Duration::from_secs(90));
        assert!(dispatcher.enqueue_if_absent(&fp, "noop", vec![]).is_new());
    }

    #[test]
    fn test_status_follows_job_lifecycle() {
        let dir = TempDir::new().unwrap();
        let (queue, dispatcher) = in_memory(&dir);
        let fp = fp("A");

        assert_eq!(dispatcher.status(&fp, PHRASE_ARTIFACT_KIND), ModelStatus::Unavailable);

        dispatcher.enqueue_if_absent(&fp, "noop", vec![]);
        assert_eq!(dispatcher.status(&fp, PHRASE_ARTIFACT_KIND), ModelStatus::Queued);

        // The task ran but wrote nothing.
        queue.run_pending();
        assert_eq!(dispatcher.status(&fp, PHRASE_ARTIFACT_KIND), ModelStatus::Finished);

        // Reported once, then forgotten.
        assert!(dispatcher.known.is_empty());
        assert_eq!(dispatcher.status(&fp, PHRASE_ARTIFACT_KIND), ModelStatus::Unavailable);
    }

    #[test]
    fn test_forgotten_job_is_evicted() {
        let fp = fp("A");
        let submitted = job("job-1", &fp, JobStatus::Queued);

        let mut queue = MockQueue::new();
        queue.expect_name().return_const("mock".to_string());
        queue.expect_list_started().returning(|| Ok(vec![]));
        queue.expect_list_queued().returning(|| Ok(vec![]));
        queue.expect_enqueue().returning(move |_| Ok(submitted.clone()));
        queue.expect_fetch().times(1).returning(|_| Ok(None));

        let dispatcher = JobDispatcher::new(Arc::new(queue), ArtifactCache::new("/nonexistent"));
        dispatcher.enqueue_if_absent(&fp, "noop", vec![]);
        assert_eq!(dispatcher.known.len(), 1);

        assert_eq!(dispatcher.status(&fp, PHRASE_ARTIFACT_KIND), ModelStatus::Unavailable);
        assert!(dispatcher.known.is_empty());
        assert_eq!(dispatcher.status(&fp, PHRASE_ARTIFACT_KIND), ModelStatus::Unavailable);
    }

    #[test]
    fn test_fingerprint_locks_are_released() {
        let dir = TempDir::new().unwrap();
        let (_queue, dispatcher) = in_memory(&dir);
        let dispatcher = Arc::new(dispatcher);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let dispatcher = Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    dispatcher.enqueue_if_absent(&fp(&format!("S{}", i % 4)), "noop", vec![])
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(dispatcher.locks.is_empty());
        assert_eq!(dispatcher.known.len(), 4);
    }

    #[test]
    fn test_status_ok_from_cache_without_any_job() {
        let dir = TempDir::new().unwrap();
        let fp = fp("A");
        let base = dir.path().join("A");
        let cache = ArtifactCache::new(dir.path());
        cache
            .save(&base, &fp, PHRASE_ARTIFACT_KIND, 1, &PhraseModel::new(LearnerSettings::default(), vec![]))
            .unwrap();
        cache.mark_complete(&base, &fp, PHRASE_ARTIFACT_KIND, 1).unwrap();

        let mut queue = MockQueue::new();
        queue.expect_list_started().never();
        queue.expect_list_queued().never();
        let dispatcher = JobDispatcher::new(Arc::new(queue), cache);

        assert_eq!(dispatcher.status(&fp, PHRASE_ARTIFACT_KIND), ModelStatus::Ok);
        assert_eq!(dispatcher.status_at(&base, &fp, PHRASE_ARTIFACT_KIND), ModelStatus::Ok);
    }
}

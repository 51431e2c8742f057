//! In-process task queue.

use super::{EnqueueRequest, JobRecord, Task, TaskQueue};
use crate::core::JobStatus;
use crate::errors::QueueError;
use crate::utils::iso_timestamp;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

struct JobEntry {
    seq: u64,
    record: JobRecord,
    request: EnqueueRequest,
}

struct Worker {
    handle: Handle,
    permits: Arc<Semaphore>,
}

struct QueueState {
    tasks: RwLock<HashMap<String, Arc<dyn Task>>>,
    jobs: DashMap<String, JobEntry>,
    pending: Mutex<VecDeque<String>>,
    next_seq: AtomicU64,
    worker: Option<Worker>,
}

/// A task queue that runs jobs inside the current process.
///
/// Without a runtime, jobs wait until [`InMemoryTaskQueue::run_next`] or
/// [`InMemoryTaskQueue::run_pending`] executes them on the calling thread.
/// With a runtime, each job is spawned on it as soon as it is enqueued,
/// at most `concurrency` at a time, and is failed if it outlives its
/// timeout. A timed-out task body is not interrupted; its result is
/// discarded.
#[derive(Clone)]
pub struct InMemoryTaskQueue {
    name: String,
    state: Arc<QueueState>,
}

impl InMemoryTaskQueue {
    /// Creates a queue whose jobs run only when asked to.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    /// Creates a queue that executes jobs on `handle`.
    #[must_use]
    pub fn with_runtime(name: impl Into<String>, handle: Handle, concurrency: usize) -> Self {
        Self::build(
            name.into(),
            Some(Worker {
                handle,
                permits: Arc::new(Semaphore::new(concurrency.max(1))),
            }),
        )
    }

    fn build(name: String, worker: Option<Worker>) -> Self {
        Self {
            name,
            state: Arc::new(QueueState {
                tasks: RwLock::new(HashMap::new()),
                jobs: DashMap::new(),
                pending: Mutex::new(VecDeque::new()),
                next_seq: AtomicU64::new(0),
                worker,
            }),
        }
    }

    /// Registers a task. Replaces any task with the same name.
    pub fn register_task(&self, task: Arc<dyn Task>) {
        let name = task.name().to_string();
        if self.state.tasks.write().insert(name.clone(), task).is_some() {
            tracing::warn!(task = %name, queue = %self.name, "Replacing registered task");
        }
    }

    /// Returns the registered task names, sorted.
    #[must_use]
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.tasks.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of jobs ever enqueued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.jobs.len()
    }

    /// Returns true if nothing was ever enqueued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.jobs.is_empty()
    }

    /// Returns every job in enqueue order.
    #[must_use]
    pub fn jobs(&self) -> Vec<JobRecord> {
        self.collect(|_| true)
    }

    /// Runs the oldest waiting job on the calling thread and returns its
    /// final record.
    pub fn run_next(&self) -> Option<JobRecord> {
        let job_id = self.state.pending.lock().pop_front()?;
        let (task_name, args, kwargs) = {
            let entry = self.state.jobs.get(&job_id)?;
            (
                entry.request.task.clone(),
                entry.request.args.clone(),
                entry.request.kwargs.clone(),
            )
        };
        let task = self.state.tasks.read().get(&task_name).cloned();

        self.state.mark_started(&job_id);
        let outcome = match task {
            Some(task) => task.run(&args, &kwargs).map_err(|e| format!("{e:#}")),
            None => Err(format!("Task '{task_name}' is no longer registered")),
        };
        self.state.mark_ended(&job_id, outcome);
        self.state.record(&job_id)
    }

    /// Runs waiting jobs until none are left. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next().is_some() {
            ran += 1;
        }
        ran
    }

    /// Polls until `job_id` is no longer queued or started.
    pub async fn wait(&self, job_id: &str) -> Option<JobRecord> {
        loop {
            let record = self.state.record(job_id)?;
            if !record.status.is_active() {
                return Some(record);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn collect(&self, filter: impl Fn(&JobRecord) -> bool) -> Vec<JobRecord> {
        let mut jobs: Vec<(u64, JobRecord)> = self
            .state
            .jobs
            .iter()
            .filter(|entry| filter(&entry.record))
            .map(|entry| (entry.seq, entry.record.clone()))
            .collect();
        jobs.sort_by_key(|(seq, _)| *seq);
        jobs.into_iter().map(|(_, record)| record).collect()
    }

    fn spawn(&self, worker: &Worker, job_id: String, task: Arc<dyn Task>, request: EnqueueRequest) {
        let state = Arc::clone(&self.state);
        let permits = Arc::clone(&worker.permits);
        worker.handle.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                state.mark_ended(&job_id, Err("Worker pool closed".to_string()));
                return;
            };
            state.mark_started(&job_id);

            let timeout = request.timeout;
            let body = tokio::task::spawn_blocking(move || {
                task.run(&request.args, &request.kwargs)
                    .map_err(|e| format!("{e:#}"))
            });
            let outcome = match tokio::time::timeout(timeout, body).await {
                Ok(Ok(result)) => result,
                Ok(Err(join)) => Err(format!("Task panicked: {join}")),
                Err(_) => Err(format!("Job timed out after {}s", timeout.as_secs_f64())),
            };
            state.mark_ended(&job_id, outcome);
        });
    }
}

impl QueueState {
    fn record(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.get(job_id).map(|entry| entry.record.clone())
    }

    fn mark_started(&self, job_id: &str) {
        if let Some(mut entry) = self.jobs.get_mut(job_id) {
            entry.record.status = JobStatus::Started;
            entry.record.started_at = Some(iso_timestamp());
        }
        tracing::debug!(job_id, "Job started");
    }

    fn mark_ended(&self, job_id: &str, outcome: Result<serde_json::Value, String>) {
        let Some(mut entry) = self.jobs.get_mut(job_id) else {
            return;
        };
        entry.record.ended_at = Some(iso_timestamp());
        match outcome {
            Ok(value) => {
                entry.record.status = JobStatus::Finished;
                entry.record.result = Some(value);
                tracing::info!(job_id, task = %entry.record.task, "Job finished");
            }
            Err(message) => {
                entry.record.status = JobStatus::Failed;
                tracing::warn!(job_id, task = %entry.record.task, error = %message, "Job failed");
                entry.record.error = Some(message);
            }
        }
    }
}

impl TaskQueue for InMemoryTaskQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn enqueue(&self, request: EnqueueRequest) -> Result<JobRecord, QueueError> {
        let task = self
            .state
            .tasks
            .read()
            .get(&request.task)
            .cloned()
            .ok_or_else(|| QueueError::UnknownTask(request.task.clone()))?;

        let record = JobRecord {
            id: uuid::Uuid::new_v4().to_string(),
            task: request.task.clone(),
            status: JobStatus::Queued,
            metadata: request.metadata.clone(),
            result: None,
            error: None,
            enqueued_at: iso_timestamp(),
            started_at: None,
            ended_at: None,
        };
        let seq = self.state.next_seq.fetch_add(1, Ordering::SeqCst);
        self.state.jobs.insert(
            record.id.clone(),
            JobEntry {
                seq,
                record: record.clone(),
                request: request.clone(),
            },
        );
        tracing::debug!(job_id = %record.id, task = %record.task, queue = %self.name, "Job enqueued");

        match &self.state.worker {
            Some(worker) => self.spawn(worker, record.id.clone(), task, request),
            None => self.state.pending.lock().push_back(record.id.clone()),
        }
        Ok(record)
    }

    fn fetch(&self, job_id: &str) -> Result<Option<JobRecord>, QueueError> {
        Ok(self.state.record(job_id))
    }

    fn list_started(&self) -> Result<Vec<JobRecord>, QueueError> {
        Ok(self.collect(|record| record.status == JobStatus::Started))
    }

    fn list_queued(&self) -> Result<Vec<JobRecord>, QueueError> {
        Ok(self.collect(|record| record.status == JobStatus::Queued))
    }
}

impl std::fmt::Debug for InMemoryTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTaskQueue")
            .field("name", &self.name)
            .field("jobs", &self.state.jobs.len())
            .field("threaded", &self.state.worker.is_some())
            .finish_non_exhaustive()
    }
}

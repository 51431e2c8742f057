//! Task queue doubles.

use crate::errors::QueueError;
use crate::queue::{EnqueueRequest, JobRecord, TaskQueue};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A queue whose backend can never be reached.
#[derive(Debug, Default)]
pub struct UnreachableQueue {
    attempts: AtomicUsize,
}

impl UnreachableQueue {
    /// Creates the queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many calls were made.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn refuse<T>(&self) -> Result<T, QueueError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(QueueError::Unavailable("connection refused".to_string()))
    }
}

impl TaskQueue for UnreachableQueue {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn enqueue(&self, _request: EnqueueRequest) -> Result<JobRecord, QueueError> {
        self.refuse()
    }

    fn fetch(&self, _job_id: &str) -> Result<Option<JobRecord>, QueueError> {
        self.refuse()
    }

    fn list_started(&self) -> Result<Vec<JobRecord>, QueueError> {
        self.refuse()
    }

    fn list_queued(&self) -> Result<Vec<JobRecord>, QueueError> {
        self.refuse()
    }
}

/// Wraps a queue and records every enqueue request passed through it.
#[derive(Debug)]
pub struct RecordingQueue {
    inner: Arc<dyn TaskQueue>,
    requests: Mutex<Vec<EnqueueRequest>>,
}

impl RecordingQueue {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn TaskQueue>) -> Self {
        Self {
            inner,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the recorded requests.
    #[must_use]
    pub fn requests(&self) -> Vec<EnqueueRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of enqueue calls.
    #[must_use]
    pub fn enqueue_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl TaskQueue for RecordingQueue {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn enqueue(&self, request: EnqueueRequest) -> Result<JobRecord, QueueError> {
        self.requests.lock().push(request.clone());
        self.inner.enqueue(request)
    }

    fn fetch(&self, job_id: &str) -> Result<Option<JobRecord>, QueueError> {
        self.inner.fetch(job_id)
    }

    fn list_started(&self) -> Result<Vec<JobRecord>, QueueError> {
        self.inner.list_started()
    }

    fn list_queued(&self) -> Result<Vec<JobRecord>, QueueError> {
        self.inner.list_queued()
    }
}

//! Background task queue abstraction and the fingerprint dedup dispatcher.
//!
//! The queue itself is an external collaborator: [`TaskQueue`] is the
//! narrow surface corpusflow needs (enqueue, fetch, list started, list
//! queued). [`InMemoryTaskQueue`] is an in-process implementation for
//! single-node hosts and tests. [`JobDispatcher`] layers
//! one-job-per-fingerprint dedup and status lookup on top.

mod dispatcher;
mod memory;
mod retry;

pub use dispatcher::{EnqueueOutcome, JobDispatcher};
pub use memory::InMemoryTaskQueue;
pub use retry::{with_retry, BackoffStrategy, JitterStrategy, RetryConfig};

use crate::core::JobStatus;
use crate::errors::QueueError;
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

/// Job metadata key carrying the fingerprint a job computes.
pub const FINGERPRINT_METADATA_KEY: &str = "fingerprint";

/// Default job timeout: one hour.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// A job as reported by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Queue-assigned job id.
    pub id: String,
    /// Name of the task the job runs.
    pub task: String,
    /// Current status.
    pub status: JobStatus,
    /// Metadata attached at enqueue time.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Task return value once finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure description once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the job was enqueued (ISO 8601).
    pub enqueued_at: String,
    /// When a worker picked the job up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// When the job finished or failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
}

impl JobRecord {
    /// Returns the fingerprint this job was enqueued for, if any.
    #[must_use]
    pub fn fingerprint(&self) -> Option<&str> {
        self.metadata.get(FINGERPRINT_METADATA_KEY).map(String::as_str)
    }

    /// Returns true if the job was enqueued for `fingerprint`.
    #[must_use]
    pub fn is_for(&self, fingerprint: &Fingerprint) -> bool {
        self.fingerprint() == Some(fingerprint.as_str())
    }
}

/// Everything a queue needs to create a job.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueRequest {
    /// Registered task name.
    pub task: String,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Keyword arguments.
    pub kwargs: Map<String, Value>,
    /// Upper bound on the job's run time.
    pub timeout: Duration,
    /// Metadata stored with the job.
    pub metadata: BTreeMap<String, String>,
}

impl EnqueueRequest {
    /// Creates a request with no arguments and the default timeout.
    #[must_use]
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            args: Vec::new(),
            kwargs: Map::new(),
            timeout: DEFAULT_JOB_TIMEOUT,
            metadata: BTreeMap::new(),
        }
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn with_arg(mut self, arg: Value) -> Self {
        self.args.push(arg);
        self
    }

    /// Sets a keyword argument.
    #[must_use]
    pub fn with_kwarg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(key.into(), value);
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A background task queue.
///
/// Every method may fail with [`QueueError::Unavailable`] when the backend
/// cannot be reached; callers on the interactive path degrade instead of
/// failing.
pub trait TaskQueue: Send + Sync + Debug {
    /// Returns the queue name.
    fn name(&self) -> &str;

    /// Submits a job.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or rejects the job.
    fn enqueue(&self, request: EnqueueRequest) -> Result<JobRecord, QueueError>;

    /// Looks up a job by id. Returns `None` if the queue no longer knows it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    fn fetch(&self, job_id: &str) -> Result<Option<JobRecord>, QueueError>;

    /// Lists jobs a worker is currently running.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    fn list_started(&self) -> Result<Vec<JobRecord>, QueueError>;

    /// Lists jobs waiting for a worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    fn list_queued(&self) -> Result<Vec<JobRecord>, QueueError>;
}

/// Code a worker runs for a job.
///
/// Arguments are JSON so jobs can cross process boundaries.
pub trait Task: Send + Sync + Debug {
    /// Returns the name jobs refer to this task by.
    fn name(&self) -> &str;

    /// Runs the task to completion.
    ///
    /// # Errors
    ///
    /// Any error marks the job failed.
    fn run(&self, args: &[Value], kwargs: &Map<String, Value>) -> anyhow::Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use pretty_assertions::assert_eq;

    fn record(metadata: &[(&str, &str)]) -> JobRecord {
        JobRecord {
            id: "job-1".into(),
            task: "build_phrases".into(),
            status: JobStatus::Queued,
            metadata: metadata
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            result: None,
            error: None,
            enqueued_at: crate::utils::iso_timestamp(),
            started_at: None,
            ended_at: None,
        }
    }

    #[test]
    fn test_job_record_fingerprint_match() {
        let fp = fingerprint("A", "text", &[]);
        let other = fingerprint("B", "text", &[]);
        let job = record(&[(FINGERPRINT_METADATA_KEY, fp.as_str())]);

        assert_eq!(job.fingerprint(), Some(fp.as_str()));
        assert!(job.is_for(&fp));
        assert!(!job.is_for(&other));
        assert!(!record(&[]).is_for(&fp));
    }

    #[test]
    fn test_enqueue_request_builder() {
        let request = EnqueueRequest::new("build_phrases")
            .with_arg(serde_json::json!({"a": 1}))
            .with_kwarg("flag", Value::Bool(true))
            .with_timeout(Duration::from_secs(5))
            .with_metadata(FINGERPRINT_METADATA_KEY, "abc");

        assert_eq!(request.task, "build_phrases");
        assert_eq!(request.args.len(), 1);
        assert_eq!(request.kwargs.get("flag"), Some(&Value::Bool(true)));
        assert_eq!(request.timeout, Duration::from_secs(5));
        assert_eq!(request.metadata.get("fingerprint").map(String::as_str), Some("abc"));
        assert_eq!(EnqueueRequest::new("t").timeout, DEFAULT_JOB_TIMEOUT);
    }

    #[test]
    fn test_job_record_serde_skips_empty_fields() {
        let json = serde_json::to_value(record(&[])).unwrap();
        assert_eq!(json["status"], "queued");
        assert!(json.get("result").is_none());
        assert!(json.get("started_at").is_none());
    }
}

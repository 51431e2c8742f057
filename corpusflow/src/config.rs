//! Host configuration.

use crate::observability::{LogConfig, LogFormat};
use crate::phrases::DEFAULT_FANOUT_BUDGET;
use crate::queue::{RetryConfig, DEFAULT_JOB_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration of a [`Corpusflow`](crate::Corpusflow) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusflowConfig {
    /// Directory holding one subdirectory of artifacts per data source.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    /// Name of the background task queue.
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
    /// Upper bound on a background job's run time, in seconds.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// Jobs run at once by the in-process queue.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    /// Documents a phrase training pass may buffer before re-reading its
    /// input instead.
    #[serde(default = "default_fanout_budget")]
    pub fanout_budget: usize,
    /// Retry policy for transient enqueue failures.
    #[serde(default)]
    pub enqueue_retry: RetryConfig,
    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_queue_name() -> String {
    "default".to_string()
}

const fn default_job_timeout_secs() -> u64 {
    DEFAULT_JOB_TIMEOUT.as_secs()
}

const fn default_worker_concurrency() -> usize {
    1
}

const fn default_fanout_budget() -> usize {
    DEFAULT_FANOUT_BUDGET
}

impl Default for CorpusflowConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            queue_name: default_queue_name(),
            job_timeout_secs: default_job_timeout_secs(),
            worker_concurrency: default_worker_concurrency(),
            fanout_budget: default_fanout_budget(),
            enqueue_retry: RetryConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl CorpusflowConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `CORPUSFLOW_*` environment variables over the defaults.
    ///
    /// Recognized: `CORPUSFLOW_STORAGE_ROOT`, `CORPUSFLOW_QUEUE_NAME`,
    /// `CORPUSFLOW_JOB_TIMEOUT_SECS`, `CORPUSFLOW_WORKER_CONCURRENCY`,
    /// `CORPUSFLOW_FANOUT_BUDGET`, `CORPUSFLOW_LOG` and
    /// `CORPUSFLOW_LOG_FORMAT` (`pretty` or `json`). Unparsable numbers
    /// are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(root) = lookup("CORPUSFLOW_STORAGE_ROOT") {
            config.storage_root = PathBuf::from(root);
        }
        if let Some(name) = lookup("CORPUSFLOW_QUEUE_NAME") {
            config.queue_name = name;
        }
        if let Some(secs) = parse_var(&lookup, "CORPUSFLOW_JOB_TIMEOUT_SECS") {
            config.job_timeout_secs = secs;
        }
        if let Some(n) = parse_var(&lookup, "CORPUSFLOW_WORKER_CONCURRENCY") {
            config.worker_concurrency = n;
        }
        if let Some(n) = parse_var(&lookup, "CORPUSFLOW_FANOUT_BUDGET") {
            config.fanout_budget = n;
        }
        if let Some(filter) = lookup("CORPUSFLOW_LOG") {
            config.log.filter = filter;
        }
        if let Some(format) = lookup("CORPUSFLOW_LOG_FORMAT") {
            match format.to_ascii_lowercase().as_str() {
                "json" => config.log.format = LogFormat::Json,
                "pretty" => config.log.format = LogFormat::Pretty,
                other => tracing::warn!(value = other, "Ignoring unknown CORPUSFLOW_LOG_FORMAT"),
            }
        }
        config
    }

    /// Sets the storage root.
    #[must_use]
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    /// Sets the queue name.
    #[must_use]
    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    /// Sets the job timeout.
    #[must_use]
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the worker concurrency.
    #[must_use]
    pub fn with_worker_concurrency(mut self, n: usize) -> Self {
        self.worker_concurrency = n;
        self
    }

    /// Sets the fan-out budget.
    #[must_use]
    pub fn with_fanout_budget(mut self, budget: usize) -> Self {
        self.fanout_budget = budget;
        self
    }

    /// Sets the enqueue retry policy.
    #[must_use]
    pub fn with_enqueue_retry(mut self, retry: RetryConfig) -> Self {
        self.enqueue_retry = retry;
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Returns the job timeout.
    #[must_use]
    pub const fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Returns the artifact directory for a data source.
    #[must_use]
    pub fn data_source_dir(&self, data_source_id: &str) -> PathBuf {
        self.storage_root.join(data_source_id)
    }

    /// Returns the storage root.
    #[must_use]
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}

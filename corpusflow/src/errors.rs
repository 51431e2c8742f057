//! Error types for corpusflow.
//!
//! Errors are split by where they are handled: [`SettingsError`] is raised
//! while a pipeline is being built, [`QueueError`] describes the background
//! task queue (its `Unavailable` variant is recovered locally), and
//! [`ArtifactError`] covers reading and writing derived model files.
//! [`CorpusflowError`] is what a pipeline consumer sees.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for corpusflow operations.
#[derive(Debug, Error)]
pub enum CorpusflowError {
    /// Step settings or pipeline shape were rejected at build time.
    #[error("{0}")]
    Settings(#[from] SettingsError),

    /// A task queue operation failed.
    #[error("{0}")]
    Queue(#[from] QueueError),

    /// An artifact could not be read or written.
    #[error("{0}")]
    Artifact(#[from] ArtifactError),

    /// The pipeline names a step that is not registered.
    #[error("Unknown pipeline step '{0}'")]
    UnknownStep(String),

    /// The pipeline names a data source that is not registered.
    #[error("Unknown data source '{0}'")]
    UnknownDataSource(String),

    /// A fingerprint string did not have the expected shape.
    #[error("Invalid fingerprint '{0}'")]
    InvalidFingerprint(String),

    /// A step failed while documents were being pulled through it.
    #[error("Step '{step_id}' failed: {message}")]
    StepFailed {
        /// The failing step instance.
        step_id: String,
        /// What went wrong.
        message: String,
    },

    /// A fan-out branch fell further behind than its buffer budget allows.
    #[error("Fan-out buffer budget of {budget} documents exceeded")]
    FanOutBudgetExceeded {
        /// The configured budget.
        budget: usize,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CorpusflowError {
    /// Creates a step failure.
    #[must_use]
    pub fn step_failed(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepFailed {
            step_id: step_id.into(),
            message: message.into(),
        }
    }
}

/// Error raised when a pipeline definition or a step's settings are invalid.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct SettingsError {
    /// The error message.
    pub message: String,
    /// The step instance involved, if any.
    pub step_id: Option<String>,
    /// The offending settings key, if known.
    pub key: Option<String>,
}

impl SettingsError {
    /// Creates a new settings error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            step_id: None,
            key: None,
        }
    }

    /// Sets the step instance.
    #[must_use]
    pub fn with_step_id(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    /// Sets the offending key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Errors reported by a task queue backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The backend could not be reached. Callers on the interactive path
    /// recover from this locally.
    #[error("Task queue unavailable: {0}")]
    Unavailable(String),

    /// No task with this name is registered with the queue.
    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    /// The backend refused the request.
    #[error("Task queue rejected request: {0}")]
    Rejected(String),
}

impl QueueError {
    /// Returns true for failures worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Errors reading or writing artifact files.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Filesystem failure on an artifact path.
    #[error("Artifact IO error at {path}: {source}")]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The artifact contents could not be encoded or decoded.
    #[error("Artifact format error at {path}: {message}")]
    Format {
        /// The path being accessed.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The completion marker lists a level file that is not on disk.
    #[error("Artifact {path} is incomplete: missing level {level}")]
    MissingLevel {
        /// The completion marker path.
        path: PathBuf,
        /// The missing level.
        level: u32,
    },

    /// No completed artifact exists for the fingerprint.
    #[error("No artifact '{name}' under {base}")]
    NotFound {
        /// The storage directory searched.
        base: PathBuf,
        /// The marker name looked for.
        name: String,
    },
}

impl ArtifactError {
    /// Wraps an IO error with the path it happened on.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a format error.
    #[must_use]
    pub fn format(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Format {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

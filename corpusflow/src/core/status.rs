//! Run modes and job/model status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a pipeline is being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Interactive evaluation. Never blocks on corpus-wide computation.
    #[default]
    Preview,
    /// Non-interactive evaluation. Computes and persists artifacts inline.
    Batch,
}

impl RunMode {
    /// Returns true in preview mode.
    #[must_use]
    pub const fn is_preview(self) -> bool {
        matches!(self, Self::Preview)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preview => write!(f, "preview"),
            Self::Batch => write!(f, "batch"),
        }
    }
}

/// Lifecycle state of a background job, as reported by the task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker.
    #[default]
    Queued,
    /// A worker is running it.
    Started,
    /// Completed successfully.
    Finished,
    /// Raised an error or timed out.
    Failed,
}

impl JobStatus {
    /// Returns true while the job is queued or running.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Started)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Started => write!(f, "started"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Availability of a derived model, as shown to the UI.
///
/// Serializes to the strings the status endpoint has always returned:
/// `OK`, `preview_queued`, `preview_started`, `preview_finished`,
/// `preview_failed` and `unavailable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelStatus {
    /// The artifact is on disk.
    #[serde(rename = "OK")]
    Ok,
    /// A job is waiting to compute it.
    #[serde(rename = "preview_queued")]
    Queued,
    /// A job is computing it.
    #[serde(rename = "preview_started")]
    Started,
    /// A job finished but the artifact was not discovered on disk.
    #[serde(rename = "preview_finished")]
    Finished,
    /// The job failed.
    #[serde(rename = "preview_failed")]
    Failed,
    /// No artifact and no known job.
    #[serde(rename = "unavailable")]
    Unavailable,
}

impl ModelStatus {
    /// Returns true if the model can be used right now.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl From<JobStatus> for ModelStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => Self::Queued,
            JobStatus::Started => Self::Started,
            JobStatus::Finished => Self::Finished,
            JobStatus::Failed => Self::Failed,
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::Queued => "preview_queued",
            Self::Started => "preview_started",
            Self::Finished => "preview_finished",
            Self::Failed => "preview_failed",
            Self::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

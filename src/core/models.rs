//! Core data models for the download orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Title shown for a job until the engine resolves the real one
pub const PLACEHOLDER_TITLE: &str = "Fetching...";

/// Identity of a single submitted job.
///
/// URLs identify a job only while it is in flight; once a job is cancelled a new
/// job for the same URL may be submitted, so bookkeeping always goes through the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Job status enumeration

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Initializing,

    Downloading,

    /// Transfer finished, engine post-processing (merge, audio extraction, embedding)
    Processing,

    Completed,

    Error,

    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled
        )
    }

    /// Cancellation is only honoured before post-processing starts
    pub fn is_cancellable(self) -> bool {
        matches!(self, JobStatus::Initializing | JobStatus::Downloading)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Initializing => "initializing",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one download job

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]

pub struct JobRecord {
    pub id: JobId,

    pub url: String,

    pub start_time: DateTime<Utc>,

    pub end_time: Option<DateTime<Utc>>,

    pub status: JobStatus,

    /// 0.0 - 100.0
    pub progress_percent: f64,

    pub title: String,

    pub speed_bytes_per_sec: Option<f64>,

    pub output_path: PathBuf,

    pub error_message: Option<String>,

    pub duration_seconds: Option<f64>,
}

impl JobRecord {
    pub fn new(url: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            id: JobId::new(),
            url: url.into(),
            start_time: Utc::now(),
            end_time: None,
            status: JobStatus::Initializing,
            progress_percent: 0.0,
            title: PLACEHOLDER_TITLE.to_string(),
            speed_bytes_per_sec: None,
            output_path: output_path.into(),
            error_message: None,
            duration_seconds: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark the job completed with the metadata the engine resolved
    pub fn complete(&mut self, title: Option<String>, duration_seconds: Option<f64>) {
        if let Some(title) = title {
            self.title = title;
        }
        self.duration_seconds = duration_seconds;
        self.progress_percent = 100.0;
        self.speed_bytes_per_sec = None;
        self.finish(JobStatus::Completed);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
        self.speed_bytes_per_sec = None;
        self.finish(JobStatus::Error);
    }

    pub fn cancel(&mut self) {
        self.speed_bytes_per_sec = None;
        self.finish(JobStatus::Cancelled);
    }

    fn finish(&mut self, status: JobStatus) {
        debug_assert!(status.is_terminal());
        if status != JobStatus::Error {
            self.error_message = None;
        }
        self.status = status;
        self.end_time = Some(Utc::now());
    }
}

/// Download statistics, computed on demand from the job store

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]

pub struct DownloadStats {
    /// In-flight plus history
    pub total: usize,

    pub completed: usize,

    pub failed: usize,

    pub cancelled: usize,

    pub active: usize,
}

/// Application error types

#[derive(Debug, thiserror::Error)]

pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("A download for {0} is already in progress")]
    DuplicateUrl(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("System error: {0}")]
    System(String),
}

/// Result type alias for application operations

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = JobRecord::new("https://example.com/v1", "/tmp/out");
        assert_eq!(record.status, JobStatus::Initializing);
        assert_eq!(record.title, PLACEHOLDER_TITLE);
        assert_eq!(record.progress_percent, 0.0);
        assert!(record.end_time.is_none());
        assert!(record.error_message.is_none());
    }

    #[test]
    fn test_terminal_transitions_set_end_time() {
        let mut completed = JobRecord::new("u", "/tmp");
        completed.complete(Some("Clip".into()), Some(12.0));
        assert_eq!(completed.status, JobStatus::Completed);
        assert!(completed.end_time.is_some());
        assert!(completed.error_message.is_none());

        let mut failed = JobRecord::new("u", "/tmp");
        failed.fail("boom");
        assert_eq!(failed.status, JobStatus::Error);
        assert!(failed.end_time.is_some());
        assert_eq!(failed.error_message.as_deref(), Some("boom"));

        let mut cancelled = JobRecord::new("u", "/tmp");
        cancelled.cancel();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.end_time.is_some());
        assert!(cancelled.error_message.is_none());
    }

    #[test]
    fn test_status_classification() {
        assert!(JobStatus::Initializing.is_cancellable());
        assert!(JobStatus::Downloading.is_cancellable());
        assert!(!JobStatus::Processing.is_cancellable());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert_eq!(JobStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }
}

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::jobs::options::JobOptions;
use crate::session::pipeline::RenderStats;

/// Job identity (UUID v4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct JobId(pub uuid::Uuid);

impl JobId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse the hyphenated string form.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state: `queued -> running -> done | error`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a concurrency slot.
    Queued,
    /// Pipeline in progress.
    Running,
    /// Finished; the artifact is retrievable.
    Done,
    /// Failed; see the recorded error.
    Error,
}

impl JobStatus {
    /// `done` or `error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Scheduler-owned state for one job.
#[derive(Clone, Debug)]
pub struct JobRecord {
    pub(crate) id: JobId,
    pub(crate) status: JobStatus,
    pub(crate) options: JobOptions,
    pub(crate) work_dir: PathBuf,
    pub(crate) output: PathBuf,
    pub(crate) queued_at: DateTime<Utc>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    pub(crate) error: Option<String>,
    pub(crate) stats: Option<RenderStats>,
}

impl JobRecord {
    pub(crate) fn new(id: JobId, options: JobOptions, work_dir: PathBuf) -> Self {
        let output = work_dir.join("out.mp4");
        Self {
            id,
            status: JobStatus::Queued,
            options,
            work_dir,
            output,
            queued_at: Utc::now(),
            started_at: None,
            ended_at: None,
            error: None,
            stats: None,
        }
    }

    pub(crate) fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            status: self.status,
            queued_at: self.queued_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            error: self.error.clone(),
            options: self.options.clone(),
            stats: self.stats,
        }
    }
}

/// Read-only copy of a job's state, as reported by the status API.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    /// Job identity.
    pub id: JobId,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Submission time.
    pub queued_at: DateTime<Utc>,
    /// Admission time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Completion time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Failure cause, for `error` jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Options the job was submitted with.
    pub options: JobOptions,
    /// Render statistics, for `done` jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<RenderStats>,
}

impl JobSnapshot {
    /// Wall-clock run time, once the job has ended.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.ended_at? - self.started_at?)
    }
}

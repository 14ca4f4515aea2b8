//! Lifecycle of one asynchronous aggregator job.
//!
//! A job moves `Pending -> Running -> {Done, Error}` and never moves back.
//! The poller owns a [`JobState`] for the duration of one call and feeds it
//! every status document it reads.

use serde::Deserialize;

use super::CallStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl JobStatus {
    /// Maps a service status label onto the lifecycle.
    ///
    /// Labels the job protocol does not name (`Queued`, `Unknown`, ...) mean
    /// the job exists but has not finished, so they count as `Running`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "Pending" | "pending" => JobStatus::Pending,
            "Done" | "done" => JobStatus::Done,
            "Error" | "error" => JobStatus::Error,
            _ => JobStatus::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Done | JobStatus::Error => 2,
        }
    }
}

/// Body of `GET {base}/messages/{pk}?trace=y`
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusReport {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub merged_version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JobState {
    parent_id: String,
    status: JobStatus,
    label: Option<String>,
    merged_id: Option<String>,
}

impl JobState {
    pub fn submitted(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            status: JobStatus::Pending,
            label: None,
            merged_id: None,
        }
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn merged_id(&self) -> Option<&str> {
        self.merged_id.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Last status label reported by the service, if any poll succeeded
    pub fn last_label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Folds one status report into the state.
    ///
    /// Returns `true` when the lifecycle moved forward. A report that would
    /// move the job backwards still updates the observed label but leaves the
    /// lifecycle where it is; a terminal state absorbs everything.
    pub fn observe(&mut self, report: JobStatusReport) -> bool {
        if self.is_terminal() {
            return false;
        }
        let label = report.status.unwrap_or_default();
        let next = JobStatus::from_label(&label);
        self.label = Some(label);
        if next.is_terminal() {
            self.merged_id = report.merged_version.filter(|id| !id.is_empty());
        }
        if next.rank() > self.status.rank() {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Status recorded when the call ends without a merged result
    pub fn reported_status(&self) -> CallStatus {
        match &self.label {
            Some(label) => CallStatus::label(label.clone()),
            None => CallStatus::timeout(),
        }
    }
}

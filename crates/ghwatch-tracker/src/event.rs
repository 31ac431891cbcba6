//! Decided events: what the tracker hands to a [`Reporter`](crate::Reporter).

use ghwatch_core::{Conclusion, Job, JobId, Run, RunId, Status, Step};
use serde::Serialize;
use time::OffsetDateTime;

/// One reportable change, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run appeared in the queued set.
    RunQueued(RunInfo),
    /// A run was seen in progress for the first time.
    RunStarted(RunInfo),
    RunCompleted(RunInfo),
    /// Pointer line for a run that concluded `action_required`.
    ApprovalRequired(RunInfo),
    JobChanged(JobInfo),
    /// Failure-summary entry of a completed run.
    JobFailed(JobInfo),
    StepChanged(StepInfo),
}

impl Event {
    /// Display timestamp, used for the emitted watermark and resume suppression.
    pub fn timestamp(&self) -> Option<OffsetDateTime> {
        match self {
            Event::RunQueued(r)
            | Event::RunStarted(r)
            | Event::RunCompleted(r)
            | Event::ApprovalRequired(r) => Some(r.timestamp),
            Event::JobChanged(j) | Event::JobFailed(j) => j.timestamp,
            Event::StepChanged(s) => s.timestamp,
        }
    }

    pub fn run_id(&self) -> RunId {
        match self {
            Event::RunQueued(r)
            | Event::RunStarted(r)
            | Event::RunCompleted(r)
            | Event::ApprovalRequired(r) => r.id,
            Event::JobChanged(j) | Event::JobFailed(j) => j.run_id,
            Event::StepChanged(s) => s.run_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunInfo {
    pub id: RunId,
    /// Parent workflow's display name.
    pub workflow: String,
    pub title: String,
    pub run_number: u64,
    pub run_attempt: u32,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub head_sha: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<Conclusion>,
    pub html_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl RunInfo {
    pub fn new(run: &Run, workflow: String) -> Self {
        Self {
            id: run.id,
            workflow,
            title: run.title().to_string(),
            run_number: run.run_number,
            run_attempt: run.run_attempt,
            event: run.event.clone(),
            branch: run.head_branch.clone(),
            head_sha: run.head_sha.clone(),
            status: run.status.clone(),
            conclusion: run.conclusion.clone(),
            html_url: run.html_url.clone(),
            timestamp: run.updated_at,
        }
    }

    pub fn short_sha(&self) -> &str {
        self.head_sha.get(..7).unwrap_or(&self.head_sha)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub run_id: RunId,
    pub id: JobId,
    pub name: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<Conclusion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<OffsetDateTime>,
}

impl From<&Job> for JobInfo {
    fn from(job: &Job) -> Self {
        Self {
            run_id: job.run_id,
            id: job.id,
            name: job.name.clone(),
            status: job.status.clone(),
            conclusion: job.conclusion.clone(),
            html_url: job.html_url.clone(),
            timestamp: job.display_ts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInfo {
    pub run_id: RunId,
    pub job_id: JobId,
    pub job_name: String,
    pub number: u32,
    pub name: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<Conclusion>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<OffsetDateTime>,
}

impl StepInfo {
    pub fn new(job: &Job, step: &Step) -> Self {
        Self {
            run_id: job.run_id,
            job_id: job.id,
            job_name: job.name.clone(),
            number: step.number,
            name: step.name.clone(),
            status: step.status.clone(),
            conclusion: step.conclusion.clone(),
            timestamp: step.display_ts(),
        }
    }
}

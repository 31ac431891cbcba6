use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Workflow run id, assigned by GitHub.
pub type RunId = u64;

/// Job id, assigned by GitHub.
pub type JobId = u64;

/// Workflow id (the parent workflow definition of a run).
pub type WorkflowId = u64;

// ── Status / Conclusion ──

/// Lifecycle status shared by runs, jobs and steps.
///
/// The upstream vocabulary is an open string field; anything we do not know
/// lands in `Other` and is treated as non-actionable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Queued,
    InProgress,
    Completed,
    Waiting,
    Requested,
    Pending,
    Other(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Queued => "queued",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Waiting => "waiting",
            Status::Requested => "requested",
            Status::Pending => "pending",
            Status::Other(raw) => raw,
        }
    }

    /// Only in-progress and completed jobs/steps carry a useful signal.
    pub fn is_reportable(&self) -> bool {
        matches!(self, Status::InProgress | Status::Completed)
    }

    /// Human label, e.g. `in_progress` → `In Progress`.
    pub fn label(&self) -> String {
        self.as_str()
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<&str> for Status {
    fn from(raw: &str) -> Self {
        match raw {
            "queued" => Status::Queued,
            "in_progress" => Status::InProgress,
            "completed" => Status::Completed,
            "waiting" => Status::Waiting,
            "requested" => Status::Requested,
            "pending" => Status::Pending,
            other => Status::Other(other.to_string()),
        }
    }
}

impl From<String> for Status {
    fn from(raw: String) -> Self {
        Status::from(raw.as_str())
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a completed run, job or step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Conclusion {
    Success,
    Failure,
    Neutral,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    Stale,
    StartupFailure,
    Other(String),
}

impl Conclusion {
    pub fn as_str(&self) -> &str {
        match self {
            Conclusion::Success => "success",
            Conclusion::Failure => "failure",
            Conclusion::Neutral => "neutral",
            Conclusion::Cancelled => "cancelled",
            Conclusion::Skipped => "skipped",
            Conclusion::TimedOut => "timed_out",
            Conclusion::ActionRequired => "action_required",
            Conclusion::Stale => "stale",
            Conclusion::StartupFailure => "startup_failure",
            Conclusion::Other(raw) => raw,
        }
    }

    /// Run conclusions that warrant listing the failed jobs.
    pub fn wants_failure_summary(&self) -> bool {
        matches!(self, Conclusion::Failure | Conclusion::TimedOut)
    }

    /// Job conclusions that belong in a failure summary.
    pub fn is_failed_job(&self) -> bool {
        matches!(
            self,
            Conclusion::Failure | Conclusion::TimedOut | Conclusion::StartupFailure
        )
    }
}

impl From<&str> for Conclusion {
    fn from(raw: &str) -> Self {
        match raw {
            "success" => Conclusion::Success,
            "failure" => Conclusion::Failure,
            "neutral" => Conclusion::Neutral,
            "cancelled" => Conclusion::Cancelled,
            "skipped" => Conclusion::Skipped,
            "timed_out" => Conclusion::TimedOut,
            "action_required" => Conclusion::ActionRequired,
            "stale" => Conclusion::Stale,
            "startup_failure" => Conclusion::StartupFailure,
            other => Conclusion::Other(other.to_string()),
        }
    }
}

impl From<String> for Conclusion {
    fn from(raw: String) -> Self {
        Conclusion::from(raw.as_str())
    }
}

impl From<Conclusion> for String {
    fn from(conclusion: Conclusion) -> Self {
        conclusion.as_str().to_string()
    }
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Entities ──

/// A workflow definition, only used to label runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub state: String,
}

/// A single workflow run as returned by the runs listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub workflow_id: WorkflowId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_title: Option<String>,
    #[serde(default)]
    pub head_branch: Option<String>,
    pub head_sha: String,
    #[serde(default)]
    pub run_number: u64,
    #[serde(default = "default_attempt")]
    pub run_attempt: u32,
    #[serde(default)]
    pub event: String,
    pub status: Status,
    #[serde(default)]
    pub conclusion: Option<Conclusion>,
    #[serde(default)]
    pub html_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

fn default_attempt() -> u32 {
    1
}

impl Run {
    pub fn is_completed(&self) -> bool {
        self.status == Status::Completed
    }

    /// Display title, falling back to the run name.
    pub fn title(&self) -> &str {
        self.display_title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("")
    }

    /// First seven characters of the head commit.
    pub fn short_sha(&self) -> &str {
        self.head_sha.get(..7).unwrap_or(&self.head_sha)
    }
}

/// A job of a workflow run, carrying its full step list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub run_id: RunId,
    pub name: String,
    pub status: Status,
    #[serde(default)]
    pub conclusion: Option<Conclusion>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Job {
    /// The timestamp shown next to the job: completion, else start, else creation.
    pub fn display_ts(&self) -> Option<OffsetDateTime> {
        self.completed_at.or(self.started_at).or(self.created_at)
    }
}

/// A step inside a job. Identified by `(job id, number)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub number: u32,
    pub name: String,
    pub status: Status,
    #[serde(default)]
    pub conclusion: Option<Conclusion>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl Step {
    pub fn display_ts(&self) -> Option<OffsetDateTime> {
        self.completed_at.or(self.started_at)
    }
}

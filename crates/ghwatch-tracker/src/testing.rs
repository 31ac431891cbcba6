//! Fakes and builders shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ghwatch_core::{
    Checkpoint, CheckpointStore, Conclusion, DataSource, FetchError, Job, Listing, RepoKey, Run,
    RunId, Status, Step, Workflow,
};
use time::OffsetDateTime;

use crate::event::Event;

pub fn ts(unix: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(unix).unwrap()
}

pub fn run(id: RunId, status: Status, created: i64) -> Run {
    Run {
        id,
        workflow_id: 1,
        name: None,
        display_title: None,
        head_branch: None,
        head_sha: "0123456789abcdef".into(),
        run_number: id,
        run_attempt: 1,
        event: "push".into(),
        status,
        conclusion: None,
        html_url: String::new(),
        created_at: ts(created),
        updated_at: ts(created),
    }
}

pub fn completed_run(id: RunId, conclusion: Conclusion, created: i64) -> Run {
    let mut r = run(id, Status::Completed, created);
    r.conclusion = Some(conclusion);
    r
}

pub fn job(id: u64, run_id: RunId, status: Status) -> Job {
    Job {
        id,
        run_id,
        name: format!("job-{id}"),
        status,
        conclusion: None,
        html_url: None,
        created_at: None,
        started_at: None,
        completed_at: None,
        steps: Vec::new(),
    }
}

pub fn step(number: u32, status: Status) -> Step {
    Step {
        number,
        name: format!("step-{number}"),
        status,
        conclusion: None,
        started_at: None,
        completed_at: None,
    }
}

/// Compact label for asserting on event sequences.
pub fn describe(event: &Event) -> String {
    match event {
        Event::RunQueued(r) => format!("queued:{}", r.id),
        Event::RunStarted(r) => format!("started:{}", r.id),
        Event::RunCompleted(r) => format!("completed:{}", r.id),
        Event::ApprovalRequired(r) => format!("approval:{}", r.id),
        Event::JobChanged(j) => format!("job:{}", j.id),
        Event::JobFailed(j) => format!("failed:{}", j.id),
        Event::StepChanged(s) => format!("step:{}/{}", s.job_id, s.number),
    }
}

// ── FakeSource ──

#[derive(Default)]
struct FakeState {
    workflows: Vec<Workflow>,
    runs: Vec<Run>,
    jobs: HashMap<RunId, Vec<Job>>,
    fail_runs: bool,
    fail_workflows: bool,
    fail_jobs: Vec<RunId>,
    unreadable_runs: Vec<RunId>,
    unreadable_jobs: Vec<u64>,
    since: Vec<OffsetDateTime>,
    job_calls: usize,
}

/// Scripted data source. Clones share the same script.
#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<FakeState>>,
}

fn unavailable(url: String) -> FetchError {
    FetchError::Status { url, status: 502 }
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_workflows(&self, workflows: Vec<Workflow>) {
        self.state.lock().unwrap().workflows = workflows;
    }

    pub fn set_runs(&self, runs: Vec<Run>) {
        self.state.lock().unwrap().runs = runs;
    }

    pub fn set_jobs(&self, run_id: RunId, jobs: Vec<Job>) {
        self.state.lock().unwrap().jobs.insert(run_id, jobs);
    }

    pub fn fail_runs(&self, fail: bool) {
        self.state.lock().unwrap().fail_runs = fail;
    }

    pub fn fail_workflows(&self, fail: bool) {
        self.state.lock().unwrap().fail_workflows = fail;
    }

    pub fn fail_jobs_for(&self, run_id: RunId) {
        self.state.lock().unwrap().fail_jobs.push(run_id);
    }

    /// Report a run as undecodable instead of returning it.
    pub fn unreadable_run(&self, run_id: RunId, unreadable: bool) {
        let mut state = self.state.lock().unwrap();
        state.unreadable_runs.retain(|id| *id != run_id);
        if unreadable {
            state.unreadable_runs.push(run_id);
        }
    }

    /// Report a job as undecodable instead of returning it.
    pub fn unreadable_job(&self, job_id: u64, unreadable: bool) {
        let mut state = self.state.lock().unwrap();
        state.unreadable_jobs.retain(|id| *id != job_id);
        if unreadable {
            state.unreadable_jobs.push(job_id);
        }
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_runs = false;
        state.fail_workflows = false;
        state.fail_jobs.clear();
    }

    /// Every `since` bound the tracker queried with.
    pub fn queried_since(&self) -> Vec<OffsetDateTime> {
        self.state.lock().unwrap().since.clone()
    }

    pub fn job_calls(&self) -> usize {
        self.state.lock().unwrap().job_calls
    }
}

impl DataSource for FakeSource {
    fn list_workflows(&self) -> Result<Vec<Workflow>, FetchError> {
        let state = self.state.lock().unwrap();
        if state.fail_workflows {
            return Err(unavailable("workflows".into()));
        }
        Ok(state.workflows.clone())
    }

    fn list_runs_since(&self, since: OffsetDateTime) -> Result<Listing<Run>, FetchError> {
        let mut state = self.state.lock().unwrap();
        state.since.push(since);
        if state.fail_runs {
            return Err(unavailable("runs".into()));
        }
        let mut listing = Listing::default();
        for run in state.runs.iter().filter(|r| r.created_at >= since) {
            if state.unreadable_runs.contains(&run.id) {
                listing.skipped.push(run.id);
            } else {
                listing.items.push(run.clone());
            }
        }
        Ok(listing)
    }

    fn list_jobs(&self, run_id: RunId) -> Result<Listing<Job>, FetchError> {
        let mut state = self.state.lock().unwrap();
        state.job_calls += 1;
        if state.fail_jobs.contains(&run_id) {
            return Err(unavailable(format!("runs/{run_id}/jobs")));
        }
        let mut listing = Listing::default();
        for job in state.jobs.get(&run_id).into_iter().flatten() {
            if state.unreadable_jobs.contains(&job.id) {
                listing.skipped.push(job.id);
            } else {
                listing.items.push(job.clone());
            }
        }
        Ok(listing)
    }
}

// ── FailingStore ──

/// Checkpoint store whose writes always fail; loads return `loaded`.
#[derive(Clone, Default)]
pub struct FailingStore {
    pub loaded: Option<Checkpoint>,
    pub fail_load: bool,
}

impl CheckpointStore for FailingStore {
    fn load(&self, _repo: &RepoKey) -> anyhow::Result<Option<Checkpoint>> {
        if self.fail_load {
            anyhow::bail!("disk on fire");
        }
        Ok(self.loaded)
    }

    fn save(&self, _repo: &RepoKey, _checkpoint: &Checkpoint) -> anyhow::Result<()> {
        anyhow::bail!("read-only file system")
    }
}

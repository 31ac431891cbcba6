//! Arena of known runs, jobs and steps, and the per-snapshot decision rules.
//!
//! Entities are addressed by flat keys (`RunId`, `JobId`, `(JobId, step
//! number)`) instead of nested maps, so replacing a job or dropping a run is
//! a handful of keyed removals. Cached jobs are stored without their steps;
//! the steps live in their own map.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use ghwatch_core::{Conclusion, Job, JobId, Listing, Run, RunId, Status, Step};

use crate::catalog::Catalog;
use crate::event::{Event, JobInfo, RunInfo, StepInfo};

/// Collapse duplicate run ids (page overlap) keeping the most recently
/// updated record, then order by `(created_at, id)`.
pub fn prepare_snapshot(runs: Vec<Run>) -> Vec<Run> {
    let mut by_id: HashMap<RunId, Run> = HashMap::with_capacity(runs.len());
    for run in runs {
        match by_id.get(&run.id) {
            Some(existing) if existing.updated_at > run.updated_at => {}
            _ => {
                by_id.insert(run.id, run);
            }
        }
    }
    let mut runs: Vec<Run> = by_id.into_values().collect();
    runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    runs
}

#[derive(Debug, Default)]
pub struct TrackerState {
    /// Runs seen in progress and not yet finished. A run that pauses in
    /// another state (waiting, requested) keeps its entry.
    runs: BTreeMap<RunId, Run>,
    run_jobs: BTreeMap<RunId, BTreeSet<JobId>>,
    jobs: BTreeMap<JobId, Job>,
    steps: BTreeMap<(JobId, u32), Step>,
    /// Runs already reported as completed.
    completed: BTreeSet<RunId>,
    /// Runs announced as queued in the latest snapshot.
    queued: BTreeSet<RunId>,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn known_runs(&self) -> usize {
        self.runs.len()
    }

    pub fn is_known(&self, run_id: RunId) -> bool {
        self.runs.contains_key(&run_id)
    }

    pub fn is_completed(&self, run_id: RunId) -> bool {
        self.completed.contains(&run_id)
    }

    pub fn is_queued(&self, run_id: RunId) -> bool {
        self.queued.contains(&run_id)
    }

    pub fn cached_job(&self, job_id: JobId) -> Option<&Job> {
        self.jobs.get(&job_id)
    }

    pub fn cached_step(&self, job_id: JobId, number: u32) -> Option<&Step> {
        self.steps.get(&(job_id, number))
    }

    /// Whether `apply` will need this run's jobs.
    pub fn needs_jobs(&self, run: &Run, seeding: bool) -> bool {
        match run.status {
            Status::InProgress => true,
            Status::Completed => {
                !seeding
                    && !self.completed.contains(&run.id)
                    && run
                        .conclusion
                        .as_ref()
                        .is_some_and(Conclusion::wants_failure_summary)
            }
            _ => false,
        }
    }

    /// Fold one prepared snapshot into the arena and return the events it
    /// produces, in emission order.
    ///
    /// `unreadable` lists runs the source returned but could not decode; their
    /// tracked state is left as it was. `jobs` holds the freshly fetched jobs
    /// of every run for which [`needs_jobs`](Self::needs_jobs) was true. With
    /// `seeding`, completed runs are recorded without being reported.
    pub fn apply(
        &mut self,
        runs: &[Run],
        unreadable: &[RunId],
        mut jobs: HashMap<RunId, Listing<Job>>,
        catalog: &Catalog,
        seeding: bool,
    ) -> Vec<Event> {
        let mut events = Vec::new();
        // Runs whose arena entry survives this snapshot.
        let mut retained: HashSet<RunId> = unreadable.iter().copied().collect();
        let mut queued: BTreeSet<RunId> = unreadable
            .iter()
            .copied()
            .filter(|id| self.queued.contains(id))
            .collect();

        for run in runs {
            match run.status {
                Status::Completed => {
                    let fetched = jobs.remove(&run.id).unwrap_or_default();
                    self.apply_completed(run, fetched, catalog, seeding, &mut events);
                }
                Status::InProgress => {
                    retained.insert(run.id);
                    self.reopen(run.id);
                    let fetched = jobs.remove(&run.id).unwrap_or_default();
                    self.apply_in_progress(run, fetched, catalog, &mut events);
                }
                Status::Queued => {
                    retained.insert(run.id);
                    self.reopen(run.id);
                    if !self.queued.contains(&run.id) {
                        events.push(Event::RunQueued(RunInfo::new(run, catalog.label_for(run))));
                    }
                    queued.insert(run.id);
                }
                _ => {
                    retained.insert(run.id);
                }
            }
        }

        self.queued = queued;

        let dropped: Vec<RunId> = self
            .runs
            .keys()
            .filter(|id| !retained.contains(*id))
            .copied()
            .collect();
        for run_id in dropped {
            tracing::debug!(run_id, "run finished or left the snapshot");
            self.forget_run(run_id);
        }

        let seen: HashSet<RunId> = runs.iter().map(|r| r.id).chain(unreadable.iter().copied()).collect();
        self.completed.retain(|id| seen.contains(id));

        events
    }

    /// A completed run seen active again is a re-run; its next completion
    /// is reported.
    fn reopen(&mut self, run_id: RunId) {
        if self.completed.remove(&run_id) {
            tracing::debug!(run_id, "completed run is active again");
        }
    }

    fn apply_completed(
        &mut self,
        run: &Run,
        fetched: Listing<Job>,
        catalog: &Catalog,
        seeding: bool,
        events: &mut Vec<Event>,
    ) {
        if !self.completed.insert(run.id) {
            return;
        }
        if seeding {
            tracing::debug!(run_id = run.id, "recorded completed run from seed window");
            return;
        }

        let info = RunInfo::new(run, catalog.label_for(run));
        events.push(Event::RunCompleted(info.clone()));
        match &run.conclusion {
            Some(c) if c.wants_failure_summary() => {
                if !fetched.skipped.is_empty() {
                    tracing::warn!(run_id = run.id, jobs = ?fetched.skipped, "failure summary omits undecodable jobs");
                }
                for job in own_jobs(run.id, fetched.items) {
                    if job.conclusion.as_ref().is_some_and(Conclusion::is_failed_job) {
                        events.push(Event::JobFailed(JobInfo::from(&job)));
                    }
                }
            }
            Some(Conclusion::ActionRequired) => events.push(Event::ApprovalRequired(info)),
            _ => {}
        }
    }

    fn apply_in_progress(
        &mut self,
        run: &Run,
        fetched: Listing<Job>,
        catalog: &Catalog,
        events: &mut Vec<Event>,
    ) {
        let known = self.runs.contains_key(&run.id);
        if !known {
            events.push(Event::RunStarted(RunInfo::new(run, catalog.label_for(run))));
        }
        self.runs.insert(run.id, run.clone());

        let Listing { items, skipped } = fetched;
        let previous = self.run_jobs.remove(&run.id).unwrap_or_default();
        let mut current = BTreeSet::new();

        for mut job in own_jobs(run.id, items) {
            let steps = dedup_steps(std::mem::take(&mut job.steps));
            let (header, walk_steps) = match self.jobs.get(&job.id) {
                // Job of a run we just discovered: report it whole.
                None if !known => (job.status.is_reportable(), true),
                // Job created since the last poll.
                None => (job.status.is_reportable(), job.status == Status::InProgress),
                Some(prev) => (prev.status != job.status && job.status.is_reportable(), true),
            };

            if header {
                events.push(Event::JobChanged(JobInfo::from(&job)));
            }
            if walk_steps {
                for step in steps.values() {
                    if !step.status.is_reportable() {
                        continue;
                    }
                    let changed = self
                        .steps
                        .get(&(job.id, step.number))
                        .map_or(true, |prev| prev.status != step.status);
                    if changed {
                        events.push(Event::StepChanged(StepInfo::new(&job, step)));
                    }
                }
            }

            self.forget_steps(job.id);
            for (number, step) in steps {
                self.steps.insert((job.id, number), step);
            }
            current.insert(job.id);
            self.jobs.insert(job.id, job);
        }

        for job_id in previous {
            if current.contains(&job_id) {
                continue;
            }
            if skipped.contains(&job_id) {
                tracing::debug!(run_id = run.id, job_id, "job unreadable, keeping cached state");
                current.insert(job_id);
            } else {
                self.jobs.remove(&job_id);
                self.forget_steps(job_id);
            }
        }
        self.run_jobs.insert(run.id, current);
    }

    fn forget_run(&mut self, run_id: RunId) {
        self.runs.remove(&run_id);
        if let Some(job_ids) = self.run_jobs.remove(&run_id) {
            for job_id in job_ids {
                self.jobs.remove(&job_id);
                self.forget_steps(job_id);
            }
        }
    }

    fn forget_steps(&mut self, job_id: JobId) {
        let keys: Vec<(JobId, u32)> = self
            .steps
            .range((job_id, 0)..=(job_id, u32::MAX))
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            self.steps.remove(&key);
        }
    }
}

/// Drop jobs that claim to belong to another run.
fn own_jobs(run_id: RunId, jobs: Vec<Job>) -> Vec<Job> {
    jobs.into_iter()
        .filter(|job| {
            let ok = job.run_id == run_id;
            if !ok {
                tracing::warn!(run_id, job_id = job.id, job_run_id = job.run_id, "discarding job of another run");
            }
            ok
        })
        .collect()
}

/// Steps keyed by number; a repeated number keeps the last occurrence.
fn dedup_steps(steps: Vec<Step>) -> BTreeMap<u32, Step> {
    steps.into_iter().map(|s| (s.number, s)).collect()
}

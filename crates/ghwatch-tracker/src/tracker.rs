//! One repository's poll cycle: fetch, fold, suppress, report, checkpoint.

use anyhow::Context;
use ghwatch_core::{Checkpoint, CheckpointStore, DataSource, FetchError, RepoKey, RunId};
use time::OffsetDateTime;

use crate::catalog::Catalog;
use crate::event::Event;
use crate::fetch::fetch_jobs;
use crate::report::Reporter;
use crate::state::{prepare_snapshot, TrackerState};
use crate::watermark::Watermarks;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// How far back to look on first contact with a repository.
    pub seed_window: time::Duration,
    /// Upper bound on concurrent job fetches within a cycle.
    pub fetch_concurrency: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            seed_window: time::Duration::hours(72),
            fetch_concurrency: 4,
        }
    }
}

/// How the next cycle treats what it finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No checkpoint yet: look back over the seed window and record
    /// completed runs without reporting them.
    Seed,
    /// Restarted from a checkpoint: drop events already covered by the
    /// stored emitted watermark.
    Resume { until: OffsetDateTime },
    Live,
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("poll cycle panicked: {0}")]
    Panicked(String),
}

/// Outcome of one successful cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub mode: Mode,
    pub runs_seen: usize,
    /// Runs whose jobs were fetched.
    pub job_fetches: usize,
    pub emitted: usize,
    pub suppressed: usize,
    pub watermarks: Watermarks,
    /// False when the checkpoint write failed; it is retried next cycle.
    pub persisted: bool,
}

pub struct Tracker<S, C, R> {
    repo: RepoKey,
    source: S,
    store: C,
    reporter: R,
    catalog: Catalog,
    config: TrackerConfig,
    state: TrackerState,
    watermarks: Option<Watermarks>,
    mode: Mode,
}

impl<S, C, R> Tracker<S, C, R>
where
    S: DataSource + Sync,
    C: CheckpointStore,
    R: Reporter,
{
    /// Load the checkpoint (fatal on error) and the workflow catalog (empty
    /// on error).
    pub fn bootstrap(
        repo: RepoKey,
        source: S,
        store: C,
        reporter: R,
        config: TrackerConfig,
    ) -> anyhow::Result<Self> {
        let checkpoint = store
            .load(&repo)
            .with_context(|| format!("cannot load checkpoint for {repo}"))?;
        let (mode, watermarks) = match checkpoint {
            None => {
                tracing::info!(
                    repo = %repo,
                    seed_hours = config.seed_window.whole_hours(),
                    "no checkpoint, seeding"
                );
                (Mode::Seed, None)
            }
            Some(cp) => {
                tracing::info!(
                    repo = %repo,
                    active = %cp.active_watermark,
                    emitted = %cp.emitted_watermark,
                    "resuming from checkpoint"
                );
                (
                    Mode::Resume {
                        until: cp.emitted_watermark,
                    },
                    Some(Watermarks::from(cp)),
                )
            }
        };

        let catalog = match source.list_workflows() {
            Ok(workflows) => Catalog::from_workflows(workflows),
            Err(e) => {
                tracing::warn!(repo = %repo, error = %e, "cannot load workflow catalog, labelling runs by name");
                Catalog::default()
            }
        };
        tracing::debug!(workflows = catalog.len(), "catalog loaded");

        Ok(Self {
            repo,
            source,
            store,
            reporter,
            catalog,
            config,
            state: TrackerState::new(),
            watermarks,
            mode,
        })
    }

    pub fn repo(&self) -> &RepoKey {
        &self.repo
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn watermarks(&self) -> Option<Watermarks> {
        self.watermarks
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn poll(&mut self) -> Result<CycleReport, CycleError> {
        self.poll_at(OffsetDateTime::now_utc())
    }

    /// Run one cycle as if the clock read `now`.
    ///
    /// A fetch error returns before anything is folded in, leaving state and
    /// watermarks as they were.
    pub fn poll_at(&mut self, now: OffsetDateTime) -> Result<CycleReport, CycleError> {
        let mode = self.mode;
        let seeding = mode == Mode::Seed;
        let since = match (mode, self.watermarks) {
            (Mode::Seed, _) | (_, None) => seed_start(now, self.config.seed_window),
            (_, Some(w)) => w.active,
        };

        let listing = self.source.list_runs_since(since)?;
        if !listing.skipped.is_empty() {
            tracing::warn!(
                repo = %self.repo,
                runs = ?listing.skipped,
                "undecodable runs left untouched this cycle"
            );
        }
        let unreadable = listing.skipped;
        let runs = prepare_snapshot(listing.items);
        let wanted: Vec<RunId> = runs
            .iter()
            .filter(|r| self.state.needs_jobs(r, seeding))
            .map(|r| r.id)
            .collect();
        let jobs = fetch_jobs(&self.source, &wanted, self.config.fetch_concurrency)?;

        let events = self.state.apply(&runs, &unreadable, jobs, &self.catalog, seeding);
        let (events, suppressed) = match mode {
            Mode::Resume { until } => suppress_reported(events, until),
            _ => (events, 0),
        };
        for event in &events {
            self.reporter.report(event);
        }
        self.reporter.flush();

        let base = match self.watermarks {
            Some(w) if !seeding => w,
            _ => Watermarks::seed(&runs, now),
        };
        let mut next = base.advance(&runs, &events);
        if !unreadable.is_empty() {
            // Undecodable runs were created at or after `since`.
            next = next.held_at(since);
        }
        let persisted = match self.store.save(&self.repo, &Checkpoint::from(next)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    repo = %self.repo,
                    error = %format!("{e:#}"),
                    "cannot persist checkpoint, will retry next cycle"
                );
                false
            }
        };
        self.watermarks = Some(next);
        self.mode = Mode::Live;

        let report = CycleReport {
            mode,
            runs_seen: runs.len(),
            job_fetches: wanted.len(),
            emitted: events.len(),
            suppressed,
            watermarks: next,
            persisted,
        };
        tracing::info!(
            repo = %self.repo,
            runs = report.runs_seen,
            emitted = report.emitted,
            suppressed = report.suppressed,
            known = self.state.known_runs(),
            "poll cycle complete"
        );
        Ok(report)
    }
}

/// Start of the seed window, clamped to the earliest representable instant.
fn seed_start(now: OffsetDateTime, window: time::Duration) -> OffsetDateTime {
    now.checked_sub(window).unwrap_or_else(|| {
        tracing::warn!(window_hours = window.whole_hours(), "seed window reaches past the calendar, clamping");
        OffsetDateTime::UNIX_EPOCH
    })
}

/// Drop events whose display timestamp is at or before `until`. Events with
/// no timestamp are kept.
fn suppress_reported(events: Vec<Event>, until: OffsetDateTime) -> (Vec<Event>, usize) {
    let total = events.len();
    let kept: Vec<Event> = events
        .into_iter()
        .filter(|e| e.timestamp().map_or(true, |t| t > until))
        .collect();
    let suppressed = total - kept.len();
    (kept, suppressed)
}

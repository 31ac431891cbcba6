//! Fixed-interval poll loop with cooperative shutdown.
//!
//! The cancellation token is only looked at between cycles and while
//! sleeping; a cycle that has started always runs to completion.

use std::time::Duration;

use ghwatch_core::{CheckpointStore, DataSource};
use tokio_util::sync::CancellationToken;

use crate::report::Reporter;
use crate::tracker::{CycleError, CycleReport, Tracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Bootstrapping,
    Polling,
    Sleeping,
    ShuttingDown,
    Stopped,
}

const VALID_TRANSITIONS: &[(SchedulerState, &[SchedulerState])] = &[
    (
        SchedulerState::Bootstrapping,
        &[SchedulerState::Polling, SchedulerState::ShuttingDown, SchedulerState::Stopped],
    ),
    (
        SchedulerState::Polling,
        &[SchedulerState::Sleeping, SchedulerState::ShuttingDown, SchedulerState::Stopped],
    ),
    (
        SchedulerState::Sleeping,
        &[SchedulerState::Polling, SchedulerState::ShuttingDown],
    ),
    (SchedulerState::ShuttingDown, &[SchedulerState::Stopped]),
    (SchedulerState::Stopped, &[]),
];

impl SchedulerState {
    pub fn can_enter(self, next: SchedulerState) -> bool {
        VALID_TRANSITIONS
            .iter()
            .find(|(from, _)| *from == self)
            .is_some_and(|(_, allowed)| allowed.contains(&next))
    }
}

/// One unit of scheduled work.
pub trait PollCycle: Send + 'static {
    fn poll_cycle(&mut self) -> Result<CycleReport, CycleError>;
}

impl<S, C, R> PollCycle for Tracker<S, C, R>
where
    S: DataSource + Send + Sync + 'static,
    C: CheckpointStore + Send + 'static,
    R: Reporter + Send + 'static,
{
    fn poll_cycle(&mut self) -> Result<CycleReport, CycleError> {
        self.poll()
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    /// Stop after this many cycles (`--once` is 1).
    pub max_cycles: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_cycles: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub failed: u64,
}

struct Machine {
    state: SchedulerState,
}

impl Machine {
    fn enter(&mut self, next: SchedulerState) {
        if !self.state.can_enter(next) {
            tracing::warn!(from = ?self.state, to = ?next, "unexpected scheduler transition");
        }
        tracing::debug!(from = ?self.state, to = ?next, "scheduler state");
        self.state = next;
    }
}

/// Bootstrap on the blocking pool, then poll every `config.interval` until
/// `cancel` fires or `max_cycles` is reached.
///
/// A failed cycle is logged and counted; the loop carries on. Bootstrap
/// failure, or a cycle that panics, ends the loop with an error.
pub async fn run_scheduler<P, F>(
    bootstrap: F,
    config: SchedulerConfig,
    cancel: CancellationToken,
) -> anyhow::Result<SchedulerStats>
where
    P: PollCycle,
    F: FnOnce() -> anyhow::Result<P> + Send + 'static,
{
    let mut machine = Machine {
        state: SchedulerState::Bootstrapping,
    };
    let mut cycle = match tokio::task::spawn_blocking(bootstrap).await {
        Ok(Ok(cycle)) => cycle,
        Ok(Err(e)) => {
            machine.enter(SchedulerState::Stopped);
            return Err(e.context("bootstrap failed"));
        }
        Err(e) => {
            machine.enter(SchedulerState::Stopped);
            anyhow::bail!("bootstrap panicked: {e}");
        }
    };

    let mut stats = SchedulerStats::default();
    loop {
        if cancel.is_cancelled() {
            break;
        }

        machine.enter(SchedulerState::Polling);
        let joined = tokio::task::spawn_blocking(move || {
            let result = cycle.poll_cycle();
            (cycle, result)
        })
        .await;
        let (back, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                machine.enter(SchedulerState::Stopped);
                return Err(CycleError::Panicked(e.to_string()).into());
            }
        };
        cycle = back;
        stats.cycles += 1;
        match result {
            Ok(report) => tracing::debug!(
                cycle = stats.cycles,
                emitted = report.emitted,
                persisted = report.persisted,
                "cycle finished"
            ),
            Err(e) => {
                stats.failed += 1;
                tracing::warn!(cycle = stats.cycles, error = %e, "poll cycle failed, retrying next interval");
            }
        }

        if config.max_cycles.is_some_and(|max| stats.cycles >= max) || cancel.is_cancelled() {
            break;
        }

        machine.enter(SchedulerState::Sleeping);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.interval) => {}
        }
    }

    machine.enter(SchedulerState::ShuttingDown);
    drop(cycle);
    machine.enter(SchedulerState::Stopped);
    tracing::info!(cycles = stats.cycles, failed = stats.failed, "watcher stopped");
    Ok(stats)
}

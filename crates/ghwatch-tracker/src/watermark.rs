//! Checkpoint arithmetic.

use ghwatch_core::{Checkpoint, Run};
use time::OffsetDateTime;

use crate::event::Event;

/// In-memory form of the persisted watermark pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    /// Lower bound for the next "runs since" query.
    pub active: OffsetDateTime,
    /// Latest display timestamp known to have been reported.
    pub emitted: OffsetDateTime,
}

impl Watermarks {
    /// Starting pair for first contact with a repository. `active` falls back
    /// to `now`; `emitted` starts at the newest run of the seed snapshot.
    pub fn seed(runs: &[Run], now: OffsetDateTime) -> Self {
        Self {
            active: now,
            emitted: runs.iter().map(|r| r.updated_at).max().unwrap_or(now),
        }
    }

    /// Pair after a cycle that processed `runs` and emitted `events`.
    ///
    /// `active` is the oldest creation time of any run not yet completed, or
    /// stays put when every run is completed. `emitted` never moves back.
    pub fn advance(&self, runs: &[Run], events: &[Event]) -> Self {
        let active = runs
            .iter()
            .filter(|r| !r.is_completed())
            .map(|r| r.created_at)
            .min()
            .unwrap_or(self.active);
        let emitted = events
            .iter()
            .filter_map(Event::timestamp)
            .fold(self.emitted, |acc, t| acc.max(t));
        Self { active, emitted }
    }

    /// Keep `active` at or below `floor`, for cycles that could not read
    /// every run in range.
    pub fn held_at(self, floor: OffsetDateTime) -> Self {
        Self {
            active: self.active.min(floor),
            ..self
        }
    }
}

impl From<Checkpoint> for Watermarks {
    fn from(cp: Checkpoint) -> Self {
        Self {
            active: cp.active_watermark,
            emitted: cp.emitted_watermark,
        }
    }
}

impl From<Watermarks> for Checkpoint {
    fn from(w: Watermarks) -> Self {
        Checkpoint {
            active_watermark: w.active,
            emitted_watermark: w.emitted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{JobInfo, RunInfo};
    use crate::testing::{completed_run, job, run, ts};
    use ghwatch_core::{Conclusion, Status};

    fn base() -> Watermarks {
        Watermarks {
            active: ts(1_000),
            emitted: ts(2_000),
        }
    }

    #[test]
    fn active_is_oldest_unfinished_run() {
        let runs = vec![
            run(1, Status::InProgress, 1_500),
            run(2, Status::Queued, 1_200),
            completed_run(3, Conclusion::Success, 1_100),
        ];
        assert_eq!(base().advance(&runs, &[]).active, ts(1_200));
    }

    #[test]
    fn waiting_runs_hold_the_active_watermark() {
        let runs = vec![run(1, Status::Waiting, 1_300), run(2, Status::InProgress, 1_600)];
        assert_eq!(base().advance(&runs, &[]).active, ts(1_300));
    }

    #[test]
    fn completed_only_snapshot_keeps_active() {
        let runs = vec![completed_run(3, Conclusion::Failure, 5_000)];
        assert_eq!(base().advance(&runs, &[]).active, ts(1_000));
        assert_eq!(base().advance(&[], &[]).active, ts(1_000));
    }

    #[test]
    fn emitted_only_moves_forward() {
        let old = run(1, Status::Queued, 500);
        let new = run(2, Status::Queued, 3_000);
        let next = base().advance(&[], &[Event::RunQueued(RunInfo::new(&old, "w".into()))]);
        assert_eq!(next.emitted, ts(2_000));
        let next = base().advance(&[], &[Event::RunQueued(RunInfo::new(&new, "w".into()))]);
        assert_eq!(next.emitted, ts(3_000));
    }

    #[test]
    fn untimestamped_events_do_not_move_emitted() {
        let j = job(10, 1, Status::InProgress);
        let next = base().advance(&[], &[Event::JobChanged(JobInfo::from(&j))]);
        assert_eq!(next.emitted, ts(2_000));
    }

    #[test]
    fn seed_uses_latest_update_or_now() {
        let mut r = run(1, Status::InProgress, 100);
        r.updated_at = ts(900);
        let seeded = Watermarks::seed(&[r, run(2, Status::Queued, 400)], ts(5_000));
        assert_eq!(seeded.emitted, ts(900));
        assert_eq!(seeded.active, ts(5_000));
        assert_eq!(Watermarks::seed(&[], ts(5_000)).emitted, ts(5_000));
    }

    #[test]
    fn held_at_never_raises_active() {
        assert_eq!(base().held_at(ts(800)).active, ts(800));
        assert_eq!(base().held_at(ts(1_500)), base());
    }

    #[test]
    fn checkpoint_round_trip() {
        let cp: Checkpoint = base().into();
        assert_eq!(cp.active_watermark, ts(1_000));
        assert_eq!(Watermarks::from(cp), base());
    }
}

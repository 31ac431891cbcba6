use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::repo::RepoKey;

/// The durable watermark pair of one monitored repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Lower bound for the next "runs since" query.
    #[serde(with = "time::serde::rfc3339")]
    pub active_watermark: OffsetDateTime,
    /// Latest timestamp known to have been reported. Only used to suppress
    /// re-emission after a restart.
    #[serde(with = "time::serde::rfc3339")]
    pub emitted_watermark: OffsetDateTime,
}

/// Durable per-repository checkpoint record.
///
/// `save` must replace both watermarks atomically.
pub trait CheckpointStore {
    /// `Ok(None)` means first contact with this repository.
    fn load(&self, repo: &RepoKey) -> anyhow::Result<Option<Checkpoint>>;

    fn save(&self, repo: &RepoKey, checkpoint: &Checkpoint) -> anyhow::Result<()>;
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for Box<T> {
    fn load(&self, repo: &RepoKey) -> anyhow::Result<Option<Checkpoint>> {
        (**self).load(repo)
    }

    fn save(&self, repo: &RepoKey, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        (**self).save(repo, checkpoint)
    }
}

/// Process-local checkpoint store. Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    rows: Arc<Mutex<BTreeMap<RepoKey, Checkpoint>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored row, for inspection.
    pub fn get(&self, repo: &RepoKey) -> Option<Checkpoint> {
        self.rows.lock().ok().and_then(|rows| rows.get(repo).copied())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, repo: &RepoKey) -> anyhow::Result<Option<Checkpoint>> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint store lock poisoned"))?;
        Ok(rows.get(repo).copied())
    }

    fn save(&self, repo: &RepoKey, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint store lock poisoned"))?;
        rows.insert(repo.clone(), *checkpoint);
        Ok(())
    }
}

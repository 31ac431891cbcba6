//! The upstream feed contract: runs since a timestamp, jobs of a run, and the
//! workflow catalog. Transport, pagination and retries stay behind it.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::types::{Job, Run, RunId, Workflow};

/// Failure to obtain a snapshot from the data source. Aborts one poll cycle.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("cannot decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Records returned by one list call.
///
/// `skipped` holds the ids of records that came back but could not be decoded.
/// Their tracked state must be left alone until they read cleanly again.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub skipped: Vec<u64>,
}

impl<T> Listing<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            skipped: Vec::new(),
        }
    }

    pub fn is_skipped(&self, id: u64) -> bool {
        self.skipped.contains(&id)
    }
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> From<Vec<T>> for Listing<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

/// Source of workflow run state for one repository.
pub trait DataSource {
    /// All workflow definitions, used to label runs.
    fn list_workflows(&self) -> Result<Vec<Workflow>, FetchError>;

    /// All runs created at or after `since`. Jobs are fetched separately.
    fn list_runs_since(&self, since: OffsetDateTime) -> Result<Listing<Run>, FetchError>;

    /// Current jobs of a run, each with its full step list.
    fn list_jobs(&self, run_id: RunId) -> Result<Listing<Job>, FetchError>;
}

impl<T: DataSource + ?Sized> DataSource for Arc<T> {
    fn list_workflows(&self) -> Result<Vec<Workflow>, FetchError> {
        (**self).list_workflows()
    }

    fn list_runs_since(&self, since: OffsetDateTime) -> Result<Listing<Run>, FetchError> {
        (**self).list_runs_since(since)
    }

    fn list_jobs(&self, run_id: RunId) -> Result<Listing<Job>, FetchError> {
        (**self).list_jobs(run_id)
    }
}

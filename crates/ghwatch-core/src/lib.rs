pub mod checkpoint;
pub mod repo;
pub mod source;
pub mod types;

pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
pub use repo::{RepoKey, RepoKeyError};
pub use source::{DataSource, FetchError, Listing};
pub use types::*;

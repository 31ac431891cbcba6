use crate::paths::StorePaths;
use fs2::FileExt;
use ghwatch_core::RepoKey;
use std::fs::{File, OpenOptions};

/// Exclusive per-repository watcher lock backed by `locks/<owner>__<name>.lock`.
/// Automatically released when dropped.
pub struct RepoLock {
    _file: File,
}

impl RepoLock {
    /// Try to acquire the lock (non-blocking).
    /// Returns an error if another watcher already holds it.
    pub fn acquire(paths: &StorePaths, repo: &RepoKey) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&paths.locks_dir)?;
        let lock_file = paths.lock_file(repo);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_file)
            .map_err(|e| {
                anyhow::anyhow!("cannot open lock file {}: {}", lock_file.display(), e)
            })?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "{repo} is already being watched by another process ({})",
                lock_file.display()
            )
        })?;

        Ok(Self { _file: file })
    }
}

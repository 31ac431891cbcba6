use std::path::PathBuf;

use ghwatch_core::RepoKey;

/// All well-known paths under the per-user store root.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub root: PathBuf,
    pub db_file: PathBuf,
    pub locks_dir: PathBuf,
    pub config_json: PathBuf,
}

impl StorePaths {
    /// Derive all paths from a store root. Pure computation, no I/O.
    pub fn discover(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            db_file: root.join("checkpoints.db"),
            locks_dir: root.join("locks"),
            config_json: root.join("config.json"),
            root,
        }
    }

    /// Paths under the default store root.
    pub fn user_default() -> Self {
        Self::discover(default_root())
    }

    /// Create all required directories. Idempotent.
    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        for dir in [&self.root, &self.locks_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Lock file guarding the watcher of one repository.
    pub fn lock_file(&self, repo: &RepoKey) -> PathBuf {
        self.locks_dir.join(format!("{}.lock", repo.slug()))
    }
}

/// Return the per-user store root: `<data_dir>/ghwatch/`
/// (falls back to `~/.ghwatch/`, then `./.ghwatch-store`).
pub fn default_root() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("ghwatch")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".ghwatch")
    } else {
        PathBuf::from(".ghwatch-store")
    }
}

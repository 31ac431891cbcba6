use clap::Subcommand;
use std::path::{Path, PathBuf};

use ghwatch_core::{Checkpoint, CheckpointStore, RepoKey};
use ghwatch_store::SqliteCheckpointStore;
use time::format_description::well_known::Rfc3339;

use crate::config::{self, Layer};

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum CheckpointCmd {
    /// Show stored checkpoints
    Show {
        /// Repository (owner/repo). Omit for all.
        repo: Option<String>,
        /// Checkpoint database (default: from config)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Forget a repository's checkpoint so the next watch seeds again
    Reset {
        /// Repository (owner/repo)
        repo: String,
        /// Checkpoint database (default: from config)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

// ── Dispatch ──

pub fn run(cmd: CheckpointCmd, config: Option<&Path>) -> anyhow::Result<()> {
    match cmd {
        CheckpointCmd::Show { repo, db } => {
            let db_path = db_path(config, db)?;
            for line in show(&db_path, repo.as_deref())? {
                println!("{line}");
            }
            Ok(())
        }
        CheckpointCmd::Reset { repo, db } => {
            let db_path = db_path(config, db)?;
            let repo: RepoKey = repo.parse()?;
            if reset(&db_path, &repo)? {
                println!("Forgot {repo}; the next watch starts from a fresh seed.");
            } else {
                println!("No checkpoint for {repo}.");
            }
            Ok(())
        }
    }
}

fn db_path(config: Option<&Path>, db: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let flags = Layer {
        db_path: db,
        ..Layer::default()
    };
    let (_, settings) = config::load(config, flags)?;
    Ok(settings.db_path)
}

// ── Command Implementations ──

/// Report lines for `ghwatch checkpoint show`.
pub fn show(db_path: &Path, repo: Option<&str>) -> anyhow::Result<Vec<String>> {
    if !db_path.exists() {
        return Ok(vec!["(no checkpoints)".to_string()]);
    }
    let store = SqliteCheckpointStore::open(db_path)?;
    match repo {
        Some(raw) => {
            let repo: RepoKey = raw.parse()?;
            Ok(match store.load(&repo)? {
                Some(cp) => vec![format_row(&repo.to_string(), &cp)],
                None => vec![format!("(no checkpoint for {repo})")],
            })
        }
        None => {
            let rows = store.list()?;
            if rows.is_empty() {
                return Ok(vec!["(no checkpoints)".to_string()]);
            }
            Ok(rows
                .iter()
                .map(|row| format!("{}  saved {}", format_row(&row.repo, &row.checkpoint), row.updated_at))
                .collect())
        }
    }
}

/// Returns whether a checkpoint was removed.
pub fn reset(db_path: &Path, repo: &RepoKey) -> anyhow::Result<bool> {
    if !db_path.exists() {
        return Ok(false);
    }
    SqliteCheckpointStore::open(db_path)?.delete(repo)
}

fn format_row(repo: &str, cp: &Checkpoint) -> String {
    let fmt = |t: time::OffsetDateTime| t.format(&Rfc3339).unwrap_or_else(|_| t.to_string());
    format!(
        "{repo}  active {}  emitted {}",
        fmt(cp.active_watermark),
        fmt(cp.emitted_watermark)
    )
}

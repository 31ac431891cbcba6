//! SQLite-backed checkpoint store.
//!
//! One row per monitored repository holding the watermark pair, in a single
//! `checkpoints.db` file using WAL mode.

use ghwatch_core::{Checkpoint, CheckpointStore, RepoKey};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const SCHEMA_SQL: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS checkpoints (
    repo TEXT PRIMARY KEY,
    active_watermark TEXT NOT NULL,
    emitted_watermark TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

const SCHEMA_VERSION: u32 = 1;

/// A row from the `checkpoints` table.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRow {
    pub repo: String,
    pub checkpoint: Checkpoint,
    pub updated_at: String,
}

/// SQLite-backed checkpoint store.
pub struct SqliteCheckpointStore {
    conn: Connection,
}

impl SqliteCheckpointStore {
    /// Open an existing checkpoints.db.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if !db_path.exists() {
            anyhow::bail!("no checkpoint database at {}", db_path.display());
        }
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.apply_pragmas()?;
        Ok(store)
    }

    /// Open or create checkpoints.db with full schema.
    pub fn open_or_create(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.apply_pragmas()?;
        store.apply_schema()?;
        tracing::debug!(path = %db_path.display(), "checkpoint store ready");
        Ok(store)
    }

    fn apply_pragmas(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn apply_schema(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;

        let current = self.schema_version()?;
        if current > SCHEMA_VERSION {
            anyhow::bail!(
                "checkpoint database has schema v{current}, this build understands v{SCHEMA_VERSION}"
            );
        }
        Ok(())
    }

    fn schema_version(&self) -> anyhow::Result<u32> {
        let version_str: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version_str
            .and_then(|v| v.parse().ok())
            .unwrap_or(SCHEMA_VERSION))
    }

    // ── Checkpoints ─────────────────────────────────────────────────

    /// All stored checkpoints, ordered by repository.
    pub fn list(&self) -> anyhow::Result<Vec<CheckpointRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT repo, active_watermark, emitted_watermark, updated_at
             FROM checkpoints ORDER BY repo",
        )?;
        let raw: Vec<(String, String, String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(repo, active, emitted, updated_at)| {
                Ok(CheckpointRow {
                    checkpoint: decode_checkpoint(&repo, &active, &emitted)?,
                    repo,
                    updated_at,
                })
            })
            .collect()
    }

    /// Forget a repository. Returns whether a row existed.
    pub fn delete(&self, repo: &RepoKey) -> anyhow::Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM checkpoints WHERE repo = ?1",
            params![repo.to_string()],
        )?;
        Ok(n > 0)
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn load(&self, repo: &RepoKey) -> anyhow::Result<Option<Checkpoint>> {
        let key = repo.to_string();
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT active_watermark, emitted_watermark FROM checkpoints WHERE repo = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((active, emitted)) => Ok(Some(decode_checkpoint(&key, &active, &emitted)?)),
        }
    }

    /// Both watermarks go out in one statement, so a crash never leaves a
    /// mixed pair behind.
    fn save(&self, repo: &RepoKey, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        let active = checkpoint.active_watermark.format(&Rfc3339)?;
        let emitted = checkpoint.emitted_watermark.format(&Rfc3339)?;
        let now = OffsetDateTime::now_utc().format(&Rfc3339)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO checkpoints
             (repo, active_watermark, emitted_watermark, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![repo.to_string(), active, emitted, now],
        )?;
        Ok(())
    }
}

impl Drop for SqliteCheckpointStore {
    fn drop(&mut self) {
        // Merge WAL back into main DB so users see a single file when idle.
        let _ = self
            .conn
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
    }
}

fn decode_checkpoint(repo: &str, active: &str, emitted: &str) -> anyhow::Result<Checkpoint> {
    let parse = |field: &str, value: &str| {
        OffsetDateTime::parse(value, &Rfc3339).map_err(|e| {
            anyhow::anyhow!("corrupt {field} for {repo}: {value:?} ({e})")
        })
    };
    Ok(Checkpoint {
        active_watermark: parse("active_watermark", active)?,
        emitted_watermark: parse("emitted_watermark", emitted)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_db() -> (tempfile::TempDir, SqliteCheckpointStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteCheckpointStore::open_or_create(&dir.path().join("checkpoints.db"))
            .unwrap();
        (dir, store)
    }

    fn repo(name: &str) -> RepoKey {
        RepoKey::new("octo", name).unwrap()
    }

    fn cp(active: i64, emitted: i64) -> Checkpoint {
        Checkpoint {
            active_watermark: OffsetDateTime::from_unix_timestamp(active).unwrap(),
            emitted_watermark: OffsetDateTime::from_unix_timestamp(emitted).unwrap(),
        }
    }

    #[test]
    fn schema_creation() {
        let (_dir, store) = tmp_db();
        let tables: Vec<String> = store
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert!(tables.contains(&"checkpoints".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn load_missing_is_none() {
        let (_dir, store) = tmp_db();
        assert_eq!(store.load(&repo("a")).unwrap(), None);
    }

    #[test]
    fn save_then_load() {
        let (_dir, store) = tmp_db();
        store.save(&repo("a"), &cp(1_700_000_000, 1_700_000_100)).unwrap();
        assert_eq!(
            store.load(&repo("a")).unwrap(),
            Some(cp(1_700_000_000, 1_700_000_100))
        );
        assert_eq!(store.load(&repo("b")).unwrap(), None);
    }

    #[test]
    fn save_replaces_both_watermarks() {
        let (_dir, store) = tmp_db();
        store.save(&repo("a"), &cp(100, 200)).unwrap();
        store.save(&repo("a"), &cp(300, 400)).unwrap();
        assert_eq!(store.load(&repo("a")).unwrap(), Some(cp(300, 400)));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.db");
        {
            let store = SqliteCheckpointStore::open_or_create(&path).unwrap();
            store.save(&repo("a"), &cp(10, 20)).unwrap();
        }
        let store = SqliteCheckpointStore::open(&path).unwrap();
        assert_eq!(store.load(&repo("a")).unwrap(), Some(cp(10, 20)));
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SqliteCheckpointStore::open(&dir.path().join("nope.db")).is_err());
    }

    #[test]
    fn list_and_delete() {
        let (_dir, store) = tmp_db();
        store.save(&repo("b"), &cp(1, 2)).unwrap();
        store.save(&repo("a"), &cp(3, 4)).unwrap();
        let rows = store.list().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].repo, "octo/a");
        assert_eq!(rows[0].checkpoint, cp(3, 4));

        assert!(store.delete(&repo("a")).unwrap());
        assert!(!store.delete(&repo("a")).unwrap());
        assert_eq!(store.load(&repo("a")).unwrap(), None);
    }

    #[test]
    fn corrupt_timestamp_is_an_error() {
        let (_dir, store) = tmp_db();
        store
            .conn
            .execute(
                "INSERT INTO checkpoints VALUES ('octo/a', 'yesterday', 'today', 'now')",
                [],
            )
            .unwrap();
        let err = store.load(&repo("a")).unwrap_err();
        assert!(err.to_string().contains("active_watermark"));
    }

    #[test]
    fn idempotent_schema_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.db");
        let store = SqliteCheckpointStore::open_or_create(&path).unwrap();
        store.save(&repo("a"), &cp(5, 6)).unwrap();
        drop(store);
        let store = SqliteCheckpointStore::open_or_create(&path).unwrap();
        assert_eq!(store.load(&repo("a")).unwrap(), Some(cp(5, 6)));
    }
}

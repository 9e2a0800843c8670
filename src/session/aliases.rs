//! Per-session alias overlay backed by SQLite.
//!
//! Aliases are display names attached to descriptors. They never touch decompiled
//! or cached text; the store is deleted together with its session.

use crate::error::QueryError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub original_id: String,
    pub entity_kind: String,
    pub alias: String,
}

pub struct AliasStore {
    conn: Mutex<Option<Connection>>,
    path: PathBuf,
}

impl AliasStore {
    /// Open (or create) the store file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, QueryError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                QueryError::Internal(format!("alias dir {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS aliases (
                original_id TEXT PRIMARY KEY,
                entity_kind TEXT NOT NULL,
                alias TEXT NOT NULL
            );",
        )?;
        debug!(path = %path.display(), "Opened alias store");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, QueryError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(QueryError::WorkerClosed)?;
        Ok(f(conn)?)
    }

    /// Insert or replace the alias for `original_id`.
    pub fn upsert(&self, original_id: &str, entity_kind: &str, alias: &str) -> Result<(), QueryError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO aliases (original_id, entity_kind, alias) VALUES (?1, ?2, ?3)
                 ON CONFLICT(original_id) DO UPDATE SET entity_kind = excluded.entity_kind,
                                                        alias = excluded.alias",
                params![original_id, entity_kind, alias],
            )
            .map(|_| ())
        })
    }

    /// Remove an alias; returns whether one existed.
    pub fn remove(&self, original_id: &str) -> Result<bool, QueryError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM aliases WHERE original_id = ?1",
                params![original_id],
            )
            .map(|n| n > 0)
        })
    }

    pub fn get(&self, original_id: &str) -> Result<Option<String>, QueryError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT alias FROM aliases WHERE original_id = ?1",
                params![original_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Every alias, ordered by original id.
    pub fn list_all(&self) -> Result<Vec<AliasEntry>, QueryError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT original_id, entity_kind, alias FROM aliases ORDER BY original_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(AliasEntry {
                    original_id: row.get(0)?,
                    entity_kind: row.get(1)?,
                    alias: row.get(2)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Close the connection and delete the backing file. Safe to call twice.
    pub fn release(&self) {
        let conn = self.lock().take();
        let Some(conn) = conn else {
            return;
        };
        if let Err((_, e)) = conn.close() {
            warn!(path = %self.path.display(), error = %e, "Failed to close alias store");
        }
        for suffix in ["", "-journal", "-wal", "-shm"] {
            let mut name = self.path.clone().into_os_string();
            name.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(name));
        }
        debug!(path = %self.path.display(), "Released alias store");
    }
}

//! `SQLite`-backed implementation of [`IdentityStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rosterline_types::op::{EntityKind, LinkKind};
use rusqlite::Connection;

use crate::backend::{IdentityStore, LinkInsertOutcome};
use crate::error::{self, StoreError};

/// Idempotent DDL for identity tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS id_mappings (
    kind TEXT NOT NULL,
    external_id TEXT NOT NULL,
    internal_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (kind, external_id)
);

CREATE TABLE IF NOT EXISTS link_rows (
    link_kind TEXT NOT NULL,
    owner_internal TEXT NOT NULL,
    child_internal TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (link_kind, owner_internal, child_internal)
);

CREATE INDEX IF NOT EXISTS idx_link_rows_owner ON link_rows (link_kind, owner_internal);
";

/// `SQLite`-backed identity storage.
///
/// Create with [`SqliteIdentityStore::open`] for file-backed persistence
/// or [`SqliteIdentityStore::in_memory`] for tests.
pub struct SqliteIdentityStore {
    conn: Mutex<Connection>,
}

impl SqliteIdentityStore {
    /// Open or create a `SQLite` identity database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory can't be created, or
    /// [`StoreError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory `SQLite` store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the in-memory database can't be
    /// initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    #[cfg(test)]
    fn count_link_rows(&self, link: LinkKind) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        let n = conn.query_row(
            "SELECT COUNT(*) FROM link_rows WHERE link_kind = ?1",
            [link.as_str()],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

impl IdentityStore for SqliteIdentityStore {
    fn lookup(&self, kind: EntityKind, external_id: &str) -> error::Result<Option<String>> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT internal_id FROM id_mappings WHERE kind = ?1 AND external_id = ?2",
            rusqlite::params![kind.as_str(), external_id],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(internal) => Ok(Some(internal)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    fn insert_mapping(
        &self,
        kind: EntityKind,
        external_id: &str,
        internal_id: &str,
    ) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO id_mappings (kind, external_id, internal_id, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![kind.as_str(), external_id, internal_id, now()],
        )?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists {
                kind,
                external_id: external_id.to_string(),
            });
        }
        Ok(())
    }

    fn insert_links(
        &self,
        link: LinkKind,
        owner_internal: &str,
        children_internal: &[String],
    ) -> error::Result<LinkInsertOutcome> {
        if children_internal.is_empty() {
            return Ok(LinkInsertOutcome::default());
        }

        let conn = self.lock_conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut outcome = LinkInsertOutcome::default();
        {
            let created_at = now();
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO link_rows \
                 (link_kind, owner_internal, child_internal, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for child in children_internal {
                let inserted = stmt.execute(rusqlite::params![
                    link.as_str(),
                    owner_internal,
                    child,
                    created_at
                ])?;
                if inserted > 0 {
                    outcome.inserted += 1;
                } else {
                    outcome.already_present += 1;
                }
            }
        }
        tx.commit()?;
        Ok(outcome)
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

//! SQLite-backed persistent store for the talent graph.
//!
//! The database lives at `~/.talentgraph/talentgraph.db` (overridable via
//! `TALENTGRAPH_DB`). WAL mode is enabled for concurrent reads; writers hold
//! the handle behind a `Mutex` and keep lock windows short. Bulk import
//! paths run in per-batch transactions with per-row savepoints, so one bad
//! row never poisons a batch.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};

pub mod companies;
pub mod ecosystems;
pub mod github;
pub mod network;
pub mod people;
pub mod queue;
pub mod types;

pub use types::*;

pub struct TalentDb {
    conn: Connection,
}

impl TalentDb {
    /// Open (or create) the database at the given path and apply migrations.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL for concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Open a throwaway database in a temp-friendly location. Test helper.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        Self::open(&path)
    }

    /// Open in read-only mode for concurrent reporting while a writer owns
    /// the live handle.
    pub fn open_readonly(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a transaction. Commits on Ok, rolls back on
    /// Err. Used by merge groups and queue leasing, where partial effects
    /// must never become visible.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Run a closure inside a named savepoint. On Err the savepoint is
    /// rolled back and released, undoing only this row's writes. Importers
    /// call this once per row inside a batch transaction.
    pub fn with_savepoint<F, T>(&self, name: &str, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch(&format!("SAVEPOINT {}", name))?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch(&format!("RELEASE {}", name))?;
                Ok(val)
            }
            Err(e) => {
                let _ = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", name));
                Err(e)
            }
        }
    }

    /// Append a run record to the append-only migration log.
    #[allow(clippy::too_many_arguments)]
    pub fn log_migration_event(
        &self,
        migration_name: &str,
        phase: &str,
        status: &str,
        records_processed: i64,
        records_created: i64,
        records_updated: i64,
        records_skipped: i64,
        error_message: Option<&str>,
        started_at: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<(), DbError> {
        let metadata_json = match metadata {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };
        self.conn.execute(
            "INSERT INTO migration_log (
                migration_name, migration_phase, status,
                records_processed, records_created, records_updated, records_skipped,
                error_message, started_at, completed_at, metadata
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                migration_name,
                phase,
                status,
                records_processed,
                records_created,
                records_updated,
                records_skipped,
                error_message,
                started_at,
                crate::util::now_rfc3339(),
                metadata_json,
            ],
        )?;
        Ok(())
    }

    /// Overall entity counts for the `status` command.
    pub fn entity_counts(&self) -> Result<Vec<(String, i64)>, DbError> {
        let mut out = Vec::new();
        for table in [
            "person",
            "company",
            "employment",
            "person_email",
            "github_profile",
            "github_repository",
            "github_contribution",
            "crypto_ecosystem",
            "edge_coemployment",
            "enrichment_queue",
        ] {
            let count: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            out.push((table.to_string(), count));
        }
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Open a fresh on-disk database in a tempdir. The tempdir guard must be
    /// held for the lifetime of the test.
    pub fn open_test_db() -> (tempfile::TempDir, TalentDb) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = TalentDb::open(&dir.path().join("test.db")).expect("open test db");
        (dir, db)
    }
}

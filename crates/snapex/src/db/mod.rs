//! SQLite persistence for jobs, templates and execution history.
//!
//! The engine and the HTTP handlers share one connection behind a mutex; a
//! pipeline flushing progress and a status request never interleave
//! statements.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

pub mod error;
pub mod execution_repo;
pub mod job_repo;
pub mod migrations;
pub mod template_repo;

pub use error::DatabaseError;

/// How long a statement waits on a lock held by another process before
/// failing with `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Memory,
}

/// Shared handle to the snapex store. Clones share the connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    location: Location,
}

impl Database {
    /// Opens the store at `path`, creating missing parent directories, and
    /// brings the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| DatabaseError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let db = Self::prepare(Connection::open(path)?, Location::File(path.to_path_buf()))?;
        log::info!(
            "Database at {} ready (schema v{})",
            path.display(),
            db.schema_version()?
        );
        Ok(db)
    }

    /// A private store that disappears with the handle. Used by tests and
    /// throwaway servers.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?, Location::Memory)
    }

    fn prepare(conn: Connection, location: Location) -> Result<Self, DatabaseError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        if let Location::File(path) = &location {
            // Readers of job status must not block behind progress flushes.
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            if !mode.eq_ignore_ascii_case("wal") {
                log::warn!(
                    "{} does not support WAL, staying in {} journal mode",
                    path.display(),
                    mode
                );
            }
        }

        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Highest migration applied to this store.
    pub fn schema_version(&self) -> Result<u32, DatabaseError> {
        self.with_conn(migrations::schema_version)
    }

    /// Runs `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// `~/.snapex/data/snapex.db`, used when the configuration names no path.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".snapex").join("data").join("snapex.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_is_migrated() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.location(), &Location::Memory);
        assert_eq!(db.schema_version().unwrap(), 3);

        let foreign_keys: bool = db
            .with_conn(|conn| Ok(conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0))?))
            .unwrap();
        assert!(foreign_keys);
    }

    #[test]
    fn test_file_store_uses_wal_and_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("jobs.db");
        let db = Database::open(&path).unwrap();

        assert!(path.exists());
        assert_eq!(db.location(), &Location::File(path.clone()));
        let mode: String = db
            .with_conn(|conn| Ok(conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_reopening_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapex.db");

        Database::open(&path)
            .unwrap()
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO extraction_jobs (id, name, backup_id, created_at, updated_at)
                     VALUES ('j-1', 'census', 'b-1', '2026-01-01', '2026-01-01')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let reopened = Database::open(&path).unwrap();
        let names: Vec<String> = reopened
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT name FROM extraction_jobs")?;
                let rows = stmt.query_map([], |r| r.get(0))?;
                Ok(rows.collect::<Result<_, _>>()?)
            })
            .unwrap();
        assert_eq!(names, vec!["census"]);
        assert_eq!(reopened.schema_version().unwrap(), 3);
    }

    #[test]
    fn test_clones_share_the_connection() {
        let db = Database::open_in_memory().unwrap();
        let other = db.clone();
        db.with_conn(|conn| {
            conn.execute_batch("CREATE TABLE scratch (v INTEGER); INSERT INTO scratch VALUES (7);")?;
            Ok(())
        })
        .unwrap();

        let v: i64 = other
            .with_conn(|conn| Ok(conn.query_row("SELECT v FROM scratch", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn test_default_database_path() {
        let path = default_database_path().unwrap();
        assert!(path.ends_with(".snapex/data/snapex.db"));
    }
}

//! Database module for persistent job storage.
//!
//! Uses rusqlite (SQLite) with a thread-safe `Database` handle.
//! All access is serialized through a `Mutex<Connection>`, and every
//! read-modify-write runs inside [`Database::transaction`].

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};

pub mod error;
pub mod job_repo;
pub mod migrations;

pub use error::DatabaseError;

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). WAL mode is enabled for file databases.
/// The handle also issues mutation timestamps: each call to
/// [`Database::next_stamp`] returns a value strictly greater than the last,
/// so `updated_at` orders mutations even within one clock tick.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    last_stamp_micros: Arc<AtomicI64>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;

        migrations::run_all(&mut conn)?;

        log::info!("Database opened at {}", path.display());

        Self::from_connection(conn)
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let mut conn = Connection::open_in_memory()?;
        migrations::run_all(&mut conn)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        let last = job_repo::latest_update(&conn)?
            .map(|ts| ts.timestamp_micros())
            .unwrap_or(0);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            last_stamp_micros: Arc::new(AtomicI64::new(last)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside an immediate transaction.
    ///
    /// Commits when `f` returns `Ok`; any `Err` (or a panic) drops the
    /// transaction, which rolls it back.
    pub fn transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| E::from(DatabaseError::LockPoisoned))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| E::from(DatabaseError::Sqlite(e)))?;

        let value = f(&tx)?;

        tx.commit().map_err(|e| E::from(DatabaseError::Sqlite(e)))?;
        Ok(value)
    }

    /// Returns the next mutation timestamp: `max(now, last + 1µs)`.
    pub fn next_stamp(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let mut current = self.last_stamp_micros.load(Ordering::Acquire);
        loop {
            let next = now.max(current + 1);
            match self.last_stamp_micros.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now),
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let count: u32 =
                conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))?;
            assert!(count > 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_open_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");
        let db = Database::open(&path).unwrap();
        db.with_conn(|conn| {
            let count: u32 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<(), DatabaseError> = db.transaction(|tx| {
            tx.execute(
                "INSERT INTO jobs (id, source_path, content_fingerprint, created_at, updated_at)
                 VALUES ('t1', 'a.txt', 'h', 't', 't')",
                [],
            )?;
            Err(DatabaseError::LockPoisoned)
        });
        assert!(result.is_err());

        let count: u32 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let db = Database::open_in_memory().unwrap();
        db.transaction(|tx| {
            tx.execute(
                "INSERT INTO jobs (id, source_path, content_fingerprint, created_at, updated_at)
                 VALUES ('t1', 'a.txt', 'h', 't', 't')",
                [],
            )?;
            Ok::<_, DatabaseError>(())
        })
        .unwrap();

        let count: u32 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_stamps_strictly_increase() {
        let db = Database::open_in_memory().unwrap();
        let mut previous = db.next_stamp();
        for _ in 0..1000 {
            let next = db.next_stamp();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_database_is_clone() {
        let db = Database::open_in_memory().unwrap();
        let db2 = db.clone();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO jobs (id, source_path, content_fingerprint, created_at, updated_at)
                 VALUES ('t1', 'f.txt', 'h', '2026-01-01', '2026-01-01')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        db2.with_conn(|conn| {
            let count: u32 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?;
            assert_eq!(count, 1);
            Ok(())
        })
        .unwrap();
        assert!(db2.next_stamp() < db.next_stamp());
    }
}

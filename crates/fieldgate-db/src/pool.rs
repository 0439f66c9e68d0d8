//! SQLite connection pool for the gateway store.
//!
//! Every pooled connection runs in WAL mode so readers (the HTTP surface)
//! never block the ingestion writers, and waits `busy_timeout_ms` on a
//! locked database before failing.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use std::time::Duration;
use thiserror::Error;

/// Pool and per-connection tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// SQLite busy timeout applied to every connection, in milliseconds.
    pub busy_timeout_ms: u64,
    pub pool_max_size: u32,
    /// Longest a caller waits for a free connection, in milliseconds.
    pub checkout_timeout_ms: u64,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
            checkout_timeout_ms: 10_000,
        }
    }
}

/// Shared handle to the gateway store.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Error returned when the pool cannot be built.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Prepares a freshly opened connection.
fn init_connection(conn: &mut Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    // `:memory:` databases cannot use WAL and report "memory".
    if !matches!(journal_mode.as_str(), "wal" | "memory") {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("journal_mode stayed {journal_mode}, expected wal")),
        ));
    }
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
}

/// Opens (creating if needed) the database at `db_path` behind a pool.
///
/// `:memory:` gives each pooled connection its own private database, so
/// callers using it should set `pool_max_size` to 1.
///
/// # Errors
///
/// Returns `PoolError::PoolInit` if the first connection cannot be opened
/// or initialised.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_init(move |conn| init_connection(conn, settings.busy_timeout_ms));

    Ok(Pool::builder()
        .max_size(settings.pool_max_size)
        .connection_timeout(Duration::from_millis(settings.checkout_timeout_ms))
        .build(manager)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn single_connection(checkout_timeout_ms: u64) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: 2_500,
            pool_max_size: 1,
            checkout_timeout_ms,
        }
    }

    #[test]
    fn connections_carry_busy_timeout() {
        let pool = create_pool(":memory:", single_connection(1_000)).expect("pool");
        let conn = pool.get().expect("connection");

        let busy_timeout: i64 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .expect("busy_timeout");
        assert_eq!(busy_timeout, 2_500);
        assert_eq!(pool.max_size(), 1);
    }

    #[test]
    fn exhausted_pool_gives_up_after_checkout_timeout() {
        let pool = create_pool(":memory:", single_connection(200)).expect("pool");
        let _held = pool.get().expect("first connection");

        let started = Instant::now();
        assert!(pool.get().is_err(), "second checkout should time out");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn file_database_runs_in_wal_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gateway.db");
        let pool = create_pool(path.to_str().expect("utf-8 path"), DbRuntimeSettings::default())
            .expect("pool");
        let mode: String = pool
            .get()
            .expect("connection")
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .expect("journal_mode");
        assert_eq!(mode, "wal");
    }
}

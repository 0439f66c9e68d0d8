//! Versioned schema migrations, compiled into the binary.
//!
//! Applied migration names are recorded in `_fieldgate_migrations`; on each
//! startup only the names missing from that table are run, in order, each
//! inside its own transaction.

use rusqlite::Connection;
use std::collections::HashSet;
use thiserror::Error;

struct Migration {
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_events",
        sql: include_str!("migrations/000_events.sql"),
    },
    Migration {
        name: "001_rules",
        sql: include_str!("migrations/001_rules.sql"),
    },
];

const TRACKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS _fieldgate_migrations (
    name TEXT PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to prepare migration tracking: {0}")]
    Tracking(#[source] rusqlite::Error),

    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        name: String,
        #[source]
        source: rusqlite::Error,
    },
}

/// Brings the schema up to date and returns how many migrations ran.
///
/// # Errors
///
/// Returns `MigrationError::ExecutionFailed` naming the first migration that
/// failed; its changes are rolled back and later migrations are not tried.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply(conn, MIGRATIONS)
}

fn applied_names(conn: &Connection) -> rusqlite::Result<HashSet<String>> {
    conn.execute_batch(TRACKING_TABLE)?;
    let mut stmt = conn.prepare("SELECT name FROM _fieldgate_migrations")?;
    let names = stmt.query_map([], |row| row.get(0))?;
    names.collect()
}

fn apply(conn: &Connection, migrations: &[Migration]) -> Result<usize, MigrationError> {
    let done = applied_names(conn).map_err(MigrationError::Tracking)?;

    let pending: Vec<&Migration> = migrations
        .iter()
        .filter(|m| !done.contains(m.name))
        .collect();

    for migration in &pending {
        let failed = |source| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source,
        };

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO _fieldgate_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;

        tracing::info!(migration = migration.name, "applied migration");
    }

    Ok(pending.len())
}

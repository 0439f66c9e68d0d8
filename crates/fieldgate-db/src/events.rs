//! The append-only telemetry event log.
//!
//! Rows are written once by [`insert_event`] and never updated. The
//! parameter payload is stored as JSON text in the `data` column.

use fieldgate_types::{StoredEvent, TelemetryEvent};
use rusqlite::{params, Connection};

use crate::error::StoreError;

/// Appends `event` to the log and returns the new row id.
///
/// # Errors
///
/// Returns `StoreError::Serialization` if the payload cannot be encoded or
/// `StoreError::Database` on SQL failure.
pub fn insert_event(conn: &Connection, event: &TelemetryEvent) -> Result<i64, StoreError> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (client_id, type, local_timestamp, event, data)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.client_id,
            event.device_type,
            event.local_timestamp,
            event.kind.as_str(),
            data_json,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Returns up to `limit` of the most recently stored events, newest first.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure or
/// `StoreError::Serialization` if a stored payload is not valid JSON.
pub fn recent_events(conn: &Connection, limit: i64) -> Result<Vec<StoredEvent>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, client_id, type, local_timestamp, event, data
         FROM events
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (id, client_id, device_type, local_timestamp, event, data) = row?;
        events.push(StoredEvent {
            id,
            client_id,
            device_type,
            local_timestamp,
            event,
            data: serde_json::from_str(&data)?,
        });
    }

    Ok(events)
}

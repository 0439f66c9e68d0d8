//! Persistent store for the fieldgate gateway.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! embedded SQL migrations, the append-only telemetry event log, and the
//! read side of the rule table.
//!
//! Callers check out one pooled connection per operation instead of sharing
//! a single handle, so unrelated ingestion tasks never serialize on the
//! store. All functions here are blocking; async callers run them inside
//! `tokio::task::spawn_blocking`.

mod error;
mod events;
mod migrations;
mod pool;
mod rules;

pub use error::StoreError;
pub use events::{insert_event, recent_events};
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
pub use rules::{insert_rule, list_rules, NewRule};

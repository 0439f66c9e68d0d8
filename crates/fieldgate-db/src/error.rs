//! Error types for store operations.

/// Errors that can occur while reading or writing the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No connection could be checked out of the pool.
    #[error("store pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization or deserialization of an event payload failed.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

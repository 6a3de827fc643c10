//! Error types for remedy-state

use thiserror::Error;

/// Errors that can occur while connecting to or preparing a backend
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by the storage traits.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("detected error not found: {id}")]
    ErrorNotFound { id: i64 },

    #[error("patch not found: {id}")]
    PatchNotFound { id: i64 },

    /// A stored row could not be mapped back into a domain record.
    #[error("invalid record in {table}: {reason}")]
    InvalidRecord { table: String, reason: String },

    /// The backend rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// The backend could not be reached at all.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Whether this error means the record simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::ErrorNotFound { .. } | StorageError::PatchNotFound { .. }
        )
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            StorageError::Unavailable(err.to_string())
        } else {
            StorageError::Backend(err.to_string())
        }
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Connection(msg) => StorageError::Unavailable(msg),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

//! Domain-level error taxonomy for Remedy.

use remedy_state::{StateError, StorageError};

/// Errors produced while rendering or delivering an operator alert.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("alert subject error not found: {id}")]
    ErrorNotFound { id: i64 },

    #[error("alert subject patch not found: {id}")]
    PatchNotFound { id: i64 },

    #[error("storage error while building alert: {0}")]
    Storage(StorageError),

    #[error("alert delivery failed: {0}")]
    Delivery(String),
}

impl From<StorageError> for NotifyError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ErrorNotFound { id } => NotifyError::ErrorNotFound { id },
            StorageError::PatchNotFound { id } => NotifyError::PatchNotFound { id },
            other => NotifyError::Storage(other),
        }
    }
}

/// Remedy domain errors.
#[derive(Debug, thiserror::Error)]
pub enum RemedyError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("backend setup error: {0}")]
    State(#[from] StateError),

    #[error("git error: {0}")]
    Git(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid patch state: {0}")]
    InvalidState(String),

    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Remedy domain operations.
pub type Result<T> = std::result::Result<T, RemedyError>;

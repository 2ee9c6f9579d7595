//! Error types for the stepshift state store.

use stepshift_core::RegistryError;
use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid record: {0}")]
    Invalid(String),
}

impl From<StateError> for RegistryError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(what) => RegistryError::NotFound(what),
            StateError::AlreadyExists(what) | StateError::Conflict(what) => {
                RegistryError::Conflict(what)
            }
            StateError::Invalid(why) => RegistryError::Rejected(why),
            other => RegistryError::Backend(other.to_string()),
        }
    }
}

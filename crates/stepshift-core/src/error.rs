//! Errors surfaced by registry and alarm collaborators.

use thiserror::Error;

/// Result type alias for collaborator calls.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Failure of an external registry or alarm-provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }
}

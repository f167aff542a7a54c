//! Catalog error types.

use floedb_commons::EngineError;
use thiserror::Error;

/// Errors surfaced by catalog adapters.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Table not found: {0}")]
    NotFound(String),

    #[error("Table already exists: {0}")]
    AlreadyExists(String),

    #[error("Commit conflict: {0}")]
    CommitConflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Catalog HTTP error: {0}")]
    Http(String),

    #[error("Catalog error: {0}")]
    Other(String),
}

impl CatalogError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True for commit races that the writer should retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::CommitConflict(_))
    }
}

impl From<CatalogError> for EngineError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(msg) => EngineError::NotFound(msg),
            CatalogError::AlreadyExists(msg) => EngineError::AlreadyExists(msg),
            CatalogError::CommitConflict(msg) => EngineError::WriteConflict(msg),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

/// Result type alias using CatalogError.
pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_mapping() {
        let err: EngineError = CatalogError::NotFound("t".into()).into();
        assert_eq!(err.code(), "NotFound");

        let err: EngineError = CatalogError::AlreadyExists("t".into()).into();
        assert_eq!(err.code(), "AlreadyExists");

        let err: EngineError = CatalogError::CommitConflict("raced".into()).into();
        assert_eq!(err.code(), "WriteConflict");

        let err: EngineError = CatalogError::other("boom").into();
        assert_eq!(err.code(), "Internal");
    }

    #[test]
    fn test_is_conflict() {
        assert!(CatalogError::CommitConflict("x".into()).is_conflict());
        assert!(!CatalogError::NotFound("x".into()).is_conflict());
    }
}

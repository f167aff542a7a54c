//! Engine error taxonomy.
//!
//! Every failure surfaced to a client maps to one of the stable error codes
//! carried by [`EngineError::code`]. Crate-internal failures from the
//! columnar stack are folded into these variants at the call site with a
//! summarized cause.

use thiserror::Error;

/// Main error type for FloeDB operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    #[error("Write conflict: {0}")]
    WriteConflict(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable wire code for the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidRequest(_) => "InvalidRequest",
            EngineError::InvalidSchema(_) => "InvalidSchema",
            EngineError::SchemaMismatch(_) => "SchemaMismatch",
            EngineError::NotFound(_) => "NotFound",
            EngineError::AlreadyExists(_) => "AlreadyExists",
            EngineError::TypeMismatch(_) => "TypeMismatch",
            EngineError::ConfirmationRequired(_) => "ConfirmationRequired",
            EngineError::WriteConflict(_) => "WriteConflict",
            EngineError::ResourceExhausted(_) => "ResourceExhausted",
            EngineError::Timeout(_) => "Timeout",
            EngineError::Io(_) | EngineError::Serialization(_) | EngineError::Internal(_) => {
                "Internal"
            }
        }
    }

    /// Creates an InvalidRequest error with a message.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Creates an InvalidSchema error with a message.
    pub fn invalid_schema(msg: impl Into<String>) -> Self {
        Self::InvalidSchema(msg.into())
    }

    /// Creates a SchemaMismatch error with a message.
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    /// Creates a NotFound error with a message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a TypeMismatch error with a message.
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    /// Creates an Internal error with a message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;

//! Error types for the Flowline core
//!
//! This module contains the error types used throughout the core domain.

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// User input failed a precondition
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A flow definition failed structural validation
    #[error("Invalid flow definition: {0}")]
    InvalidDefinition(String),

    /// A contact query failed to parse
    #[error("Query error: {0}")]
    QueryError(String),

    /// Another user saved the flow since the client loaded it
    #[error("{other_user} is currently editing this flow")]
    UserConflict {
        /// The user who last saved the flow
        other_user: String,
    },

    /// The flow's spec version moved forward since the client loaded it
    #[error("Flow has been upgraded to spec version {server_version}")]
    VersionConflict {
        /// The spec version the server now holds
        server_version: String,
    },

    /// The flow already has an unfinished start
    #[error("Flow is already being started")]
    AlreadyStarting,

    /// The owning workspace is suspended
    #[error("Workspace is suspended")]
    WorkspaceSuspended,

    /// The owning workspace is flagged
    #[error("Workspace is flagged")]
    WorkspaceFlagged,

    /// The flow cannot be deleted because other flows depend on it
    #[error("Flow is in use by: {}", .0.join(", "))]
    DependentFlows(Vec<String>),

    /// An illegal state transition was attempted
    #[error("State error: {0}")]
    StateError(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Storage layer failure
    #[error("Storage error: {0}")]
    StorageError(String),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::InvalidDefinition(format!("JSON error: {}", err))
    }
}

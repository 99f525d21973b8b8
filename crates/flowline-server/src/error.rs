//! Error types for the Flowline server
//!
//! This module contains the error types used throughout the server.

use thiserror::Error;

use flowline_core::CoreError;
use flowline_engine::EngineError;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    /// A domain rule rejected the operation
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Talking to the execution engine failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// An unfinished export already exists for the workspace
    #[error("There is already an export in progress, started by {started_by}")]
    ExportInProgress {
        /// Username of the requester of the running export
        started_by: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Core(CoreError::ValidationError(format!("JSON error: {}", err)))
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::InternalError(format!("IO error: {}", err))
    }
}

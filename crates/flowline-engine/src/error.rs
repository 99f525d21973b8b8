//! Error types for engine communication

use thiserror::Error;

/// Errors talking to the flow execution engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// The request could not be sent
    #[error("Engine request failed: {0}")]
    RequestFailed(String),

    /// The engine answered with a non-success status
    #[error("Engine returned {status}: {body}")]
    ResponseError {
        /// HTTP status code
        status: u16,
        /// Response body, as returned
        body: String,
    },

    /// The engine answered with a body we could not interpret
    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),

    /// A translation catalog could not be parsed
    #[error("Invalid PO catalog: {0}")]
    InvalidCatalog(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::RequestFailed(err.to_string())
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

//! Error handling for the Flowline API
//!
//! This module maps server errors onto standardized JSON error responses.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use flowline_core::CoreError;
use flowline_engine::EngineError;

use crate::error::ServerError;

/// API error wrapper for returning standard error responses
#[derive(Debug)]
pub struct ApiError(pub ServerError);

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        ApiError(err)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(ServerError::Core(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code) = match &self.0 {
            ServerError::Core(err) => match err {
                CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND"),
                CoreError::ValidationError(_) => (StatusCode::BAD_REQUEST, "ERR_VALIDATION"),
                CoreError::InvalidDefinition(_) => {
                    (StatusCode::BAD_REQUEST, "ERR_INVALID_DEFINITION")
                }
                CoreError::QueryError(_) => (StatusCode::BAD_REQUEST, "ERR_QUERY"),
                CoreError::DependentFlows(_) => (StatusCode::BAD_REQUEST, "ERR_FLOW_IN_USE"),
                CoreError::UserConflict { .. } => (StatusCode::CONFLICT, "ERR_USER_CONFLICT"),
                CoreError::VersionConflict { .. } => {
                    (StatusCode::CONFLICT, "ERR_VERSION_CONFLICT")
                }
                CoreError::AlreadyStarting => (StatusCode::CONFLICT, "ERR_ALREADY_STARTING"),
                CoreError::WorkspaceSuspended => (StatusCode::FORBIDDEN, "ERR_SUSPENDED"),
                CoreError::WorkspaceFlagged => (StatusCode::FORBIDDEN, "ERR_FLAGGED"),
                CoreError::StateError(_) => (StatusCode::CONFLICT, "ERR_STATE"),
                CoreError::StorageError(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "ERR_STORAGE")
                }
            },
            ServerError::Engine(err) => match err {
                EngineError::InvalidCatalog(_) => (StatusCode::BAD_REQUEST, "ERR_PO_CATALOG"),
                _ => (StatusCode::BAD_GATEWAY, "ERR_ENGINE"),
            },
            ServerError::ExportInProgress { .. } => (StatusCode::CONFLICT, "ERR_EXPORT_IN_PROGRESS"),
            ServerError::ConfigError(_) | ServerError::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ERR_INTERNAL")
            }
        };

        // internal details stay out of responses
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal error handling request");
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };

        let body = Json(json!({
            "error": message,
            "errorDetails": {
                "errorCode": error_code,
                "errorMessage": message,
            }
        }));

        (status, body).into_response()
    }
}

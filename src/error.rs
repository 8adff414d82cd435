use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// A record that cannot be trusted. Fails the whole batch it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataIntegrityError {
    #[error("Malformed record {record}: field {field} {reason}")]
    MalformedRecord {
        record: String,
        field: &'static str,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Data load failed: {0}")]
    DataLoad(String),
}

impl From<DataIntegrityError> for AppError {
    fn from(err: DataIntegrityError) -> Self {
        AppError::DataLoad(err.to_string())
    }
}

impl From<crate::orchestration::refresh::RefreshError> for AppError {
    fn from(err: crate::orchestration::refresh::RefreshError) -> Self {
        use crate::orchestration::refresh::RefreshError;
        match err {
            RefreshError::AlreadyRunning => AppError::Conflict(err.to_string()),
            RefreshError::Integrity(e) => AppError::DataLoad(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::DataLoad(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("data load failed: {}", msg),
            ),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

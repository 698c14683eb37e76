//! Error types for qc-rate
//!
//! [`ApiError`] renders as JSON for `/api/*`. [`PageError`] renders as an
//! HTML page for the rating UI.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::html;
use crate::workflow::WorkflowError;

/// JSON API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. an image already stored at the same key
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Common error: {0}")]
    Common(#[from] qc_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(qc_common::Error::NotFound(msg)) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Common(qc_common::Error::Conflict(msg)) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Common(qc_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => {
                error!("API request failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR", err.to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Rating UI error type
#[derive(Debug, Error)]
pub enum PageError {
    /// No web session for this browser, or one for another step
    #[error("No active session")]
    NoSession,

    #[error("Unknown step '{0}'")]
    UnknownStep(String),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let (status, title, message) = match self {
            PageError::NoSession => return Redirect::to("/").into_response(),
            PageError::UnknownStep(slug) => (
                StatusCode::NOT_FOUND,
                "Unknown step",
                format!("There is no pipeline step called '{}'.", slug),
            ),
            PageError::Workflow(WorkflowError::NotFound(step)) => (
                StatusCode::NOT_FOUND,
                "No content available",
                format!("There are no images left to review for {}.", step),
            ),
            PageError::Workflow(WorkflowError::Timeout(wait)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Still looking",
                format!(
                    "The next image was not ready within {} seconds. Try again in a moment.",
                    wait.as_secs()
                ),
            ),
            PageError::Workflow(WorkflowError::InvalidSubmission(msg)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "Invalid submission", msg)
            }
            PageError::Workflow(err) => {
                error!("Rating page failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong",
                    err.to_string(),
                )
            }
        };

        (status, Html(html::message_page(title, &message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_conflict_maps_to_409() {
        let err = ApiError::from(qc_common::Error::Conflict("image key already exists".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_database_error_maps_to_500() {
        let err = ApiError::from(qc_common::Error::Database(sqlx::Error::RowNotFound));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_missing_session_redirects_home() {
        let response = PageError::NoSession.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }
}

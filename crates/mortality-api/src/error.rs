//! Error types for the HTTP layer.
//!
//! [`ApiError`] converts every failure a handler can hit into a JSON
//! response. Most variants render as `{"error": ..., "status": ...}`;
//! validation failures render as `{"errors": [...], "status": 400}` so the
//! client sees every offending field.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mortality_core::{ArchiveError, QueryError, SourceError, ValidationErrors};
use tracing::error;

/// Errors that can occur while handling a request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Query parameters failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// The request was well-formed but cannot be answered.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Fetching a fresh snapshot failed; the served snapshot is unchanged.
    #[error("fetching data failed: {0}")]
    Fetch(#[from] SourceError),

    /// The snapshot archive could not be read.
    #[error("snapshot archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// The operation needs an archive and none is configured.
    #[error("snapshot archive is not configured")]
    ArchiveUnavailable,
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Invalid(errors) => Self::Validation(errors),
            QueryError::Key(e) => Self::BadRequest(e.to_string()),
        }
    }
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Fetch(_) | Self::Archive(_) => StatusCode::BAD_GATEWAY,
            Self::ArchiveUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            Self::Validation(errors) => serde_json::json!({
                "errors": errors,
                "status": status.as_u16(),
            }),
            other => {
                if status.is_server_error() {
                    error!(error = %other, "Request failed");
                }
                serde_json::json!({
                    "error": other.to_string(),
                    "status": status.as_u16(),
                })
            }
        };

        (status, Json(body)).into_response()
    }
}

//! Caller-visible API errors.
//!
//! Handlers surface a small set of stable failure codes; everything that
//! goes wrong inside a generation worker stays inside the worker and
//! never reaches these.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The referenced conversation or response does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request is structurally valid but unusable.
    #[error("{0}")]
    InvalidRequest(String),

    /// Unexpected internal failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            tracing::error!("Internal error: {:#}", e);
        }
        let body = serde_json::json!({
            "code": self.code(),
            "error": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

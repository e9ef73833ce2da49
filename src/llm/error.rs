//! Typed errors for generation backends.

use thiserror::Error;

/// Error raised by a generation backend.
///
/// Backend failures are terminal for the request they belong to and never
/// propagate past the worker that owns the request; there is no retry at
/// the stream level.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached or the connection dropped.
    #[error("backend network error: {0}")]
    Network(String),

    /// The backend answered with a non-success HTTP status.
    #[error("backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The backend sent a payload we could not decode.
    #[error("failed to decode backend response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn network(message: impl Into<String>) -> Self {
        BackendError::Network(message.into())
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        BackendError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        BackendError::Decode(message.into())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::network(format!("request timeout: {}", e))
        } else if e.is_connect() {
            BackendError::network(format!("connection failed: {}", e))
        } else {
            BackendError::network(format!("request failed: {}", e))
        }
    }
}

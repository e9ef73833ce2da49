//! HTTP API.

mod chat;
mod error;
mod routes;
mod types;

pub use error::ApiError;
pub use routes::{serve, AppState};

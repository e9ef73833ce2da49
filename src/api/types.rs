//! API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /api/chat/stream`.
///
/// Start shape: `conversation_id` + `message`. Resume shape:
/// `response_id` + the highest sequence already rendered.
#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    pub conversation_id: Option<Uuid>,
    pub message: Option<String>,
    pub response_id: Option<Uuid>,
    #[serde(default)]
    pub last_seq: u64,
    #[serde(default = "default_use_retrieval")]
    pub use_retrieval: bool,
    pub temperature: Option<f64>,
}

fn default_use_retrieval() -> bool {
    true
}

/// Body of `POST /api/chat/cancel`.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub response_id: Option<Uuid>,
    /// Fallback: cancel the conversation's most recently started task.
    pub conversation_id: Option<Uuid>,
}

/// Acknowledgment of a cancel request.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub response_id: Uuid,
}

/// Body of `POST /api/chat/conversations`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateConversationResponse {
    pub conversation_id: Uuid,
}

/// Response of `GET /api/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: String,
}

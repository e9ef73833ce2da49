//! Generation backend abstraction.
//!
//! The streaming core treats text generation as an opaque source of
//! incremental text: a backend accepts a fully-assembled chat context and
//! returns a lazy stream of increments, terminated by exhaustion or an
//! error. Ollama is the shipped implementation.

mod error;
mod ollama;

#[cfg(test)]
pub(crate) mod mock;

pub use error::BackendError;
pub use ollama::OllamaClient;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Parse a role stored as lowercase text.
    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    /// The lowercase wire/storage form of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single turn in the chat context sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Fully-assembled context for one generation request.
///
/// Prompt construction is a caller concern; the backend sends this verbatim.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    /// Optional system prompt, sent as the first message.
    pub system_prompt: Option<String>,
    /// Conversation turns, oldest first, ending with the current user
    /// message.
    pub messages: Vec<ChatTurn>,
}

/// Optional sampling parameters for a generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u64>,
}

/// Lazy sequence of text increments produced by a backend.
///
/// The stream ends on exhaustion; a mid-stream `Err` is terminal for the
/// request (the consumer keeps whatever partial output it has).
pub type IncrementStream = BoxStream<'static, Result<String, BackendError>>;

/// Trait for generation backends.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Submit a generation request and obtain its increment stream.
    ///
    /// No contract is assumed about increment size or cadence.
    async fn submit(
        &self,
        context: GenerationContext,
        options: GenerationOptions,
    ) -> Result<IncrementStream, BackendError>;
}

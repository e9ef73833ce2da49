//! Durable conversation and message storage.
//!
//! The store is the single source of truth for generated content: the
//! streaming layer is only a low-latency delivery accelerator on top of it.
//! Assistant replies are written as a placeholder row first, then the
//! owning generation worker repeatedly replaces the row's content as the
//! reply grows.

mod sqlite;

#[cfg(test)]
pub(crate) mod memory;

pub use sqlite::SqliteMessageStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::llm::Role;

/// A message row as stored.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Trait for the durable message store.
///
/// While a generation task is active, its worker is the exclusive writer of
/// the placeholder row it created; nothing else touches that row until the
/// task reaches a terminal state.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Create a new conversation and return its identity.
    async fn create_conversation(&self, title: &str) -> anyhow::Result<Uuid>;

    /// Whether a conversation exists.
    async fn conversation_exists(&self, conversation_id: Uuid) -> anyhow::Result<bool>;

    /// Append a user message to a conversation.
    async fn append_user_message(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> anyhow::Result<Uuid>;

    /// Create an empty assistant message row and return its identity.
    ///
    /// The returned id is the response identity of the generation task that
    /// will fill the row in.
    async fn create_placeholder(&self, conversation_id: Uuid) -> anyhow::Result<Uuid>;

    /// Replace the full content of an assistant message.
    async fn replace_content(&self, response_id: Uuid, content: &str) -> anyhow::Result<()>;

    /// Load the content of a message, if the row exists.
    async fn content(&self, response_id: Uuid) -> anyhow::Result<Option<String>>;

    /// The most recent `limit` messages of a conversation, oldest first.
    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredMessage>>;
}

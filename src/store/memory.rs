//! In-memory message store for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{MessageStore, StoredMessage};
use crate::llm::Role;

/// HashMap-backed store with a switch to make writes fail, for exercising
/// the worker's persistence-failure path.
#[derive(Default)]
pub(crate) struct MemoryMessageStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

#[derive(Default)]
struct Inner {
    conversations: Vec<Uuid>,
    messages: HashMap<Uuid, StoredMessage>,
    order: Vec<Uuid>,
}

impl MemoryMessageStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// When set, `replace_content` returns errors until cleared.
    pub(crate) fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn insert(&self, conversation_id: Uuid, role: Role, content: String) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().unwrap();
        inner.messages.insert(
            id,
            StoredMessage {
                id,
                conversation_id,
                role,
                content,
                created_at: Utc::now(),
            },
        );
        inner.order.push(id);
        id
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn create_conversation(&self, _title: &str) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().conversations.push(id);
        Ok(id)
    }

    async fn conversation_exists(&self, conversation_id: Uuid) -> anyhow::Result<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .conversations
            .contains(&conversation_id))
    }

    async fn append_user_message(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> anyhow::Result<Uuid> {
        Ok(self.insert(conversation_id, Role::User, content.to_string()))
    }

    async fn create_placeholder(&self, conversation_id: Uuid) -> anyhow::Result<Uuid> {
        Ok(self.insert(conversation_id, Role::Assistant, String::new()))
    }

    async fn replace_content(&self, response_id: Uuid, content: &str) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("simulated storage failure");
        }
        let mut inner = self.inner.lock().unwrap();
        let message = inner
            .messages
            .get_mut(&response_id)
            .ok_or_else(|| anyhow::anyhow!("message {} not found", response_id))?;
        message.content = content.to_string();
        Ok(())
    }

    async fn content(&self, response_id: Uuid) -> anyhow::Result<Option<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .messages
            .get(&response_id)
            .map(|m| m.content.clone()))
    }

    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredMessage>> {
        let inner = self.inner.lock().unwrap();
        let mut history: Vec<StoredMessage> = inner
            .order
            .iter()
            .filter_map(|id| inner.messages.get(id))
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        if history.len() > limit {
            history.drain(..history.len() - limit);
        }
        Ok(history)
    }
}

//! SQLite-backed message store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{MessageStore, StoredMessage};
use crate::llm::Role;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    id            TEXT PRIMARY KEY,
    title         TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    last_activity TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    role            TEXT NOT NULL,
    content         TEXT NOT NULL,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON messages (conversation_id, created_at);
";

/// Message store persisting to a SQLite database.
///
/// The connection is shared behind a mutex and every call runs on the
/// blocking pool, so store calls never stall the async runtime. Statements
/// are short single-row operations.
pub struct SqliteMessageStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMessageStore {
    /// Open (and initialize) the database at `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!("Opened message store at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("store mutex poisoned");
            op(&guard)
        })
        .await?;
        Ok(result?)
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn create_conversation(&self, title: &str) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        let title = title.to_string();
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, title, created_at, last_activity)
                 VALUES (?1, ?2, ?3, ?3)",
                params![id.to_string(), title, now],
            )
        })
        .await?;
        Ok(id)
    }

    async fn conversation_exists(&self, conversation_id: Uuid) -> anyhow::Result<bool> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT 1 FROM conversations WHERE id = ?1",
                params![conversation_id.to_string()],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
        })
        .await
    }

    async fn append_user_message(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> anyhow::Result<Uuid> {
        self.insert_message(conversation_id, Role::User, content.to_string())
            .await
    }

    async fn create_placeholder(&self, conversation_id: Uuid) -> anyhow::Result<Uuid> {
        self.insert_message(conversation_id, Role::Assistant, String::new())
            .await
    }

    async fn replace_content(&self, response_id: Uuid, content: &str) -> anyhow::Result<()> {
        let content = content.to_string();
        let updated = self
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE messages SET content = ?2 WHERE id = ?1",
                    params![response_id.to_string(), content],
                )
            })
            .await?;
        anyhow::ensure!(updated == 1, "message {} not found", response_id);
        Ok(())
    }

    async fn content(&self, response_id: Uuid) -> anyhow::Result<Option<String>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT content FROM messages WHERE id = ?1",
                params![response_id.to_string()],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredMessage>> {
        let mut rows: Vec<StoredMessage> = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, conversation_id, role, content, created_at
                     FROM messages
                     WHERE conversation_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(
                    params![conversation_id.to_string(), limit as i64],
                    row_to_message,
                )?;
                rows.collect()
            })
            .await?;
        // Query returns newest-first for the LIMIT; callers want oldest-first.
        rows.reverse();
        Ok(rows)
    }
}

impl SqliteMessageStore {
    async fn insert_message(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: String,
    ) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    conversation_id.to_string(),
                    role.as_str(),
                    content,
                    now
                ],
            )?;
            conn.execute(
                "UPDATE conversations SET last_activity = ?2 WHERE id = ?1",
                params![conversation_id.to_string(), now],
            )
        })
        .await?;
        Ok(id)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let role: String = row.get(2)?;
    let created_at: String = row.get(4)?;
    Ok(StoredMessage {
        id: parse_uuid(&id, 0)?,
        conversation_id: parse_uuid(&conversation_id, 1)?,
        role: Role::parse(&role).unwrap_or(Role::Assistant),
        content: row.get(3)?,
        created_at: parse_timestamp(&created_at, 4)?,
    })
}

fn parse_uuid(raw: &str, column: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

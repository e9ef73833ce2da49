//! # Taskpilot
//!
//! A task and document assistant service with resumable streaming
//! generation.
//!
//! The heart of the crate is the streaming generation task manager: each
//! assistant reply is produced by exactly one background worker, and any
//! number of subscribers can attach, detach, and resume delivery of that
//! reply without ever duplicating the producer.
//!
//! ```text
//!   POST /api/chat/stream
//!            │
//!            ▼
//!   ┌─────────────────┐   create_or_attach   ┌──────────────┐
//!   │ Stream Protocol │─────────────────────▶│ Task Registry│
//!   │    Handler      │                      └──────┬───────┘
//!   └────────┬────────┘                             │ spawns (creator only)
//!            │ subscribe                            ▼
//!            │                              ┌──────────────┐
//!            │◀── snapshot/chunk/done ──────│  Generation  │──▶ Ollama
//!            ▼                              │    Worker    │──▶ SQLite
//!        SSE to caller                      └──────────────┘
//! ```
//!
//! ## Modules
//! - `stream`: registry, worker, broadcast subscription, cleanup
//! - `llm`: generation backend trait and the Ollama client
//! - `store`: durable conversation/message storage
//! - `prompt` / `retrieval`: generation context assembly
//! - `api`: axum HTTP layer

pub mod api;
pub mod config;
pub mod llm;
pub mod prompt;
pub mod retrieval;
pub mod store;
pub mod stream;

pub use config::Config;

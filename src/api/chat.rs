//! Chat endpoints: the request-facing side of the stream protocol.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures::stream::Stream;
use futures::StreamExt;

use crate::llm::GenerationOptions;
use crate::prompt;
use crate::stream::{run_generation, stream_events, ActiveTask, StreamEvent, StreamSource};

use super::error::ApiError;
use super::routes::AppState;
use super::types::*;

/// Start a generation or resume delivery of one, as an SSE stream.
///
/// The stream always opens with a `snapshot` event, forwards `chunk`
/// events above the caller's cursor, and ends with exactly one `done`
/// event.
pub async fn stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StreamRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let read_timeout = state.config.read_timeout;
    let source = resolve_source(&state, req).await?;

    let events = async_stream::stream! {
        let inner = stream_events(source, read_timeout);
        futures::pin_mut!(inner);
        while let Some(event) = inner.next().await {
            yield Ok(sse_event(&event));
        }
    };

    Ok(Sse::new(events))
}

/// Map a stream request to its event source, starting a worker when this
/// request is the creator of a new task.
async fn resolve_source(state: &AppState, req: StreamRequest) -> Result<StreamSource, ApiError> {
    if let Some(message) = req.message {
        let conversation_id = req.conversation_id.ok_or_else(|| {
            ApiError::InvalidRequest("conversation_id is required to start a generation".into())
        })?;
        if message.trim().is_empty() {
            return Err(ApiError::InvalidRequest("message must not be empty".into()));
        }
        if !state.store.conversation_exists(conversation_id).await? {
            return Err(ApiError::NotFound(format!(
                "Conversation {} not found",
                conversation_id
            )));
        }

        // History is read before the new user message lands so the prompt
        // does not contain it twice.
        let history = state
            .store
            .recent_messages(conversation_id, state.config.history_limit)
            .await?;
        let passages = if req.use_retrieval {
            match state
                .retriever
                .search(&message, state.config.retrieval_k)
                .await
            {
                Ok(passages) => passages,
                Err(e) => {
                    tracing::warn!("Document search failed, continuing without context: {}", e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        state
            .store
            .append_user_message(conversation_id, &message)
            .await?;
        let response_id = state.store.create_placeholder(conversation_id).await?;

        let context = prompt::build_context(&message, &history, &passages);
        let options = GenerationOptions {
            temperature: req.temperature,
            ..GenerationOptions::default()
        };

        let (task, created) = state.registry.create_or_attach(response_id, conversation_id);
        if created {
            // Only the creator spawns the worker; concurrent attaches for
            // the same response share it.
            tokio::spawn(run_generation(
                Arc::clone(&task),
                Arc::clone(&state.backend),
                Arc::clone(&state.store),
                context,
                options,
            ));
        }

        Ok(StreamSource::Live { task, last_seq: 0 })
    } else if let Some(response_id) = req.response_id {
        if let Some(task) = state.registry.get(response_id) {
            return Ok(StreamSource::Live {
                task,
                last_seq: req.last_seq,
            });
        }
        // Task already finished and was evicted; the durable store is the
        // fallback source of truth.
        match state.store.content(response_id).await? {
            Some(content) => Ok(StreamSource::Durable {
                content,
                last_seq: req.last_seq,
            }),
            None => Err(ApiError::NotFound(format!(
                "Response {} not found",
                response_id
            ))),
        }
    } else {
        Err(ApiError::InvalidRequest(
            "either message or response_id is required".into(),
        ))
    }
}

fn sse_event(event: &StreamEvent) -> Event {
    let name = match event {
        StreamEvent::Snapshot { .. } => "snapshot",
        StreamEvent::Chunk { .. } => "chunk",
        StreamEvent::Done { .. } => "done",
    };
    Event::default().event(name).json_data(event).unwrap()
}

/// Cancel an active generation.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, ApiError> {
    let response_id = if let Some(response_id) = req.response_id {
        response_id
    } else if let Some(conversation_id) = req.conversation_id {
        state
            .registry
            .latest_active_for_conversation(conversation_id)
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "No active generation in conversation {}",
                    conversation_id
                ))
            })?
            .response_id
    } else {
        return Err(ApiError::InvalidRequest(
            "either response_id or conversation_id is required".into(),
        ));
    };

    let task = state.registry.mark_cancelled(response_id).ok_or_else(|| {
        ApiError::NotFound(format!("No active generation for response {}", response_id))
    })?;

    tracing::info!("Cancellation requested for response {}", response_id);
    Ok(Json(CancelResponse {
        response_id: task.response_id,
    }))
}

/// List the currently live generation tasks.
pub async fn active_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<ActiveTask>> {
    Json(state.registry.active_tasks())
}

/// Create a new conversation.
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<CreateConversationResponse>, ApiError> {
    let title = req.title.unwrap_or_else(|| "New conversation".to_string());
    let conversation_id = state.store.create_conversation(&title).await?;
    Ok(Json(CreateConversationResponse { conversation_id }))
}

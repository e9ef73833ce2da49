//! Ollama chat-streaming client.
//!
//! Ollama's `/api/chat` endpoint streams newline-delimited JSON objects,
//! one per generated fragment, with a final object carrying `done: true`.
//! The client decodes that into the backend increment stream.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    BackendError, ChatTurn, GenerationBackend, GenerationContext, GenerationOptions,
    IncrementStream, Role,
};

/// Client for a local or remote Ollama server.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    /// Create a client for the given server URL and model name.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    fn build_request(
        &self,
        context: &GenerationContext,
        options: &GenerationOptions,
    ) -> ChatRequest {
        let mut messages = Vec::with_capacity(context.messages.len() + 1);
        if let Some(system) = &context.system_prompt {
            messages.push(ChatTurn::new(Role::System, system.clone()));
        }
        messages.extend(context.messages.iter().cloned());

        ChatRequest {
            model: self.model.clone(),
            messages,
            stream: true,
            options: ModelOptions {
                temperature: options.temperature,
                top_p: options.top_p,
                num_predict: options.max_tokens,
            },
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    async fn submit(
        &self,
        context: GenerationContext,
        options: GenerationOptions,
    ) -> Result<IncrementStream, BackendError> {
        let request = self.build_request(&context, &options);
        let url = format!("{}/api/chat", self.base_url);

        tracing::debug!("Submitting chat request to {} (model={})", url, request.model);

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::http(status.as_u16(), body));
        }

        let mut bytes = response.bytes_stream();

        // Decode the NDJSON body incrementally. Lines can straddle network
        // frames (even mid-character), so buffer raw bytes and only decode
        // complete lines.
        let stream = async_stream::stream! {
            let mut buf: Vec<u8> = Vec::new();
            while let Some(frame) = bytes.next().await {
                let frame = match frame {
                    Ok(f) => f,
                    Err(e) => {
                        yield Err(BackendError::from(e));
                        return;
                    }
                };
                buf.extend_from_slice(&frame);

                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = match std::str::from_utf8(&line) {
                        Ok(text) => text.trim(),
                        Err(e) => {
                            yield Err(BackendError::decode(format!(
                                "invalid UTF-8 in stream: {}",
                                e
                            )));
                            return;
                        }
                    };
                    match parse_chat_line(line) {
                        Ok(Some(fragment)) => yield Ok(fragment),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

/// Decode one NDJSON line from the chat stream.
///
/// Returns the text fragment, or `None` for blank lines, fragments with no
/// content, and the final `done` object.
fn parse_chat_line(line: &str) -> Result<Option<String>, BackendError> {
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: ChatStreamChunk = serde_json::from_str(line)
        .map_err(|e| BackendError::decode(format!("bad stream line: {} ({})", line, e)))?;

    if let Some(error) = chunk.error {
        return Err(BackendError::decode(error));
    }

    Ok(chunk.message.map(|m| m.content).filter(|c| !c.is_empty()))
}

/// Ollama chat request body.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatTurn>,
    stream: bool,
    options: ModelOptions,
}

#[derive(Debug, Serialize)]
struct ModelOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u64>,
}

/// One streamed object from `/api/chat`.
#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    content: String,
}

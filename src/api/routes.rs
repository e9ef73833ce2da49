//! HTTP server assembly.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::llm::{GenerationBackend, OllamaClient};
use crate::retrieval::{NoopRetriever, Retriever};
use crate::store::{MessageStore, SqliteMessageStore};
use crate::stream::{CleanupSupervisor, TaskRegistry};

use super::chat;
use super::types::HealthResponse;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Registry of in-flight generation tasks; owned here and injected
    /// into handlers through the state.
    pub registry: Arc<TaskRegistry>,
    pub store: Arc<dyn MessageStore>,
    pub backend: Arc<dyn GenerationBackend>,
    pub retriever: Arc<dyn Retriever>,
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let store: Arc<dyn MessageStore> = Arc::new(SqliteMessageStore::open(&config.database_path)?);
    let backend: Arc<dyn GenerationBackend> = Arc::new(OllamaClient::new(
        config.ollama_url.clone(),
        config.model.clone(),
    ));
    let retriever: Arc<dyn Retriever> = Arc::new(NoopRetriever);
    let registry = Arc::new(TaskRegistry::new(config.channel_capacity));

    CleanupSupervisor::new(
        Arc::clone(&registry),
        config.eviction_grace,
        config.cleanup_interval,
    )
    .spawn();

    let state = Arc::new(AppState {
        config: config.clone(),
        registry,
        store,
        backend,
        retriever,
    });

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/chat/conversations", post(chat::create_conversation))
        .route("/api/chat/stream", post(chat::stream))
        .route("/api/chat/cancel", post(chat::cancel))
        .route("/api/chat/tasks", get(chat::active_tasks))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.config.model.clone(),
    })
}

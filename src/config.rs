//! Runtime configuration.
//!
//! All settings come from environment variables with sensible defaults, so
//! the server can start with no configuration at all against a local Ollama
//! instance and an on-disk SQLite database.

use std::path::PathBuf;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the HTTP server (`HOST`).
    pub host: String,
    /// Bind port for the HTTP server (`PORT`).
    pub port: u16,
    /// Path to the SQLite database file (`DATABASE_PATH`).
    pub database_path: PathBuf,
    /// Base URL of the Ollama server (`OLLAMA_URL`).
    pub ollama_url: String,
    /// Chat model name (`MODEL_NAME`).
    pub model: String,
    /// How many prior messages to include when building the prompt
    /// (`HISTORY_LIMIT`).
    pub history_limit: usize,
    /// How many document passages to request from the retriever
    /// (`RETRIEVAL_K`).
    pub retrieval_k: usize,
    /// Capacity of each per-response broadcast channel
    /// (`STREAM_CHANNEL_CAPACITY`).
    pub channel_capacity: usize,
    /// Bounded wait for a single subscriber read before re-checking
    /// liveness (`STREAM_READ_TIMEOUT_SECS`).
    pub read_timeout: Duration,
    /// How long a finished task stays in the registry so live subscribers
    /// can observe its terminal event (`EVICTION_GRACE_SECS`).
    pub eviction_grace: Duration,
    /// How often the cleanup supervisor sweeps for evictable tasks
    /// (`CLEANUP_INTERVAL_SECS`).
    pub cleanup_interval: Duration,
}

impl Config {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", "127.0.0.1"),
            port: env_parsed("PORT", 8080),
            database_path: PathBuf::from(env_or("DATABASE_PATH", "data/taskpilot.db")),
            ollama_url: env_or("OLLAMA_URL", "http://127.0.0.1:11434"),
            model: env_or("MODEL_NAME", "llama3:8b"),
            history_limit: env_parsed("HISTORY_LIMIT", 10),
            retrieval_k: env_parsed("RETRIEVAL_K", 5),
            channel_capacity: env_parsed("STREAM_CHANNEL_CAPACITY", 256),
            read_timeout: Duration::from_secs(env_parsed("STREAM_READ_TIMEOUT_SECS", 10)),
            eviction_grace: Duration::from_secs(env_parsed("EVICTION_GRACE_SECS", 60)),
            cleanup_interval: Duration::from_secs(env_parsed("CLEANUP_INTERVAL_SECS", 10)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid value for {}: {:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

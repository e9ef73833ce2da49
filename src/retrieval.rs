//! Document retrieval seam.
//!
//! Retrieval supplies document-grounded passages for prompt assembly. The
//! index itself lives outside this crate; deployments plug in their own
//! implementation, and the default retriever returns nothing so the
//! assistant falls back to history-only prompts.

use async_trait::async_trait;
use serde::Serialize;

/// A ranked passage returned by the retriever.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedPassage {
    /// Passage text.
    pub text: String,
    /// Human-readable source label, e.g. a file name.
    pub source: String,
    /// Similarity score, higher is better.
    pub score: f64,
}

/// Trait for document retrieval services.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` passages relevant to `query`, best first.
    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<RetrievedPassage>>;
}

/// Retriever that finds nothing.
pub struct NoopRetriever;

#[async_trait]
impl Retriever for NoopRetriever {
    async fn search(&self, _query: &str, _k: usize) -> anyhow::Result<Vec<RetrievedPassage>> {
        Ok(Vec::new())
    }
}

//! Scripted backend for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;

use super::{
    BackendError, GenerationBackend, GenerationContext, GenerationOptions, IncrementStream,
};

/// A backend that hands out a pre-built increment stream.
///
/// The stream is consumed by the first `submit` call; further calls fail.
/// `submit_count` lets tests assert how many times generation was invoked.
pub(crate) struct ScriptedBackend {
    script: Mutex<Option<IncrementStream>>,
    submits: AtomicUsize,
}

impl ScriptedBackend {
    pub(crate) fn new(stream: IncrementStream) -> Self {
        Self {
            script: Mutex::new(Some(stream)),
            submits: AtomicUsize::new(0),
        }
    }

    /// Backend that yields the given fragments and then ends.
    pub(crate) fn from_texts(texts: &[&str]) -> Self {
        let items: Vec<Result<String, BackendError>> =
            texts.iter().map(|t| Ok(t.to_string())).collect();
        Self::new(futures::stream::iter(items).boxed())
    }

    /// Backend that yields the given fragments and then fails mid-stream.
    pub(crate) fn failing_after(texts: &[&str], error: BackendError) -> Self {
        let mut items: Vec<Result<String, BackendError>> =
            texts.iter().map(|t| Ok(t.to_string())).collect();
        items.push(Err(error));
        Self::new(futures::stream::iter(items).boxed())
    }

    pub(crate) fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn submit(
        &self,
        _context: GenerationContext,
        _options: GenerationOptions,
    ) -> Result<IncrementStream, BackendError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BackendError::network("scripted backend already consumed"))
    }
}

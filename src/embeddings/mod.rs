// Embeddings module
// Text-to-vector backends and the text chunker that feeds them

pub mod chunking;
pub mod hashing;
pub mod ollama;


use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{Config, EmbedderBackend};
use crate::{MemoryError, Result};

pub use chunking::{ChunkingConfig, TextChunk, chunk_text, estimate_token_count, split_text};
pub use hashing::HashingEmbedder;
pub use ollama::OllamaClient;

/// Converts text into a fixed-dimension vector.
///
/// Implementations are deterministic for a fixed model and never chunk:
/// callers split oversized text with [`chunk_text`] first.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier recorded in the store manifest
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Largest input accepted, in estimated tokens
    fn max_input_tokens(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Collapse whitespace and reject input the model cannot take.
#[inline]
pub fn prepare_input(text: &str, max_input_tokens: usize) -> Result<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalized.is_empty() {
        return Err(MemoryError::Embedding(
            "input is empty after normalization".to_string(),
        ));
    }

    let tokens = estimate_token_count(&normalized);
    if tokens > max_input_tokens {
        return Err(MemoryError::Embedding(format!(
            "input of ~{} tokens exceeds the model limit of {}; chunk it first",
            tokens, max_input_tokens
        )));
    }

    Ok(normalized)
}

/// Instantiate the backend selected in the configuration
#[inline]
pub fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.embedder.backend {
        EmbedderBackend::Ollama => Arc::new(
            OllamaClient::new(&config.ollama)
                .map_err(|e| MemoryError::Configuration(format!("{:#}", e)))?,
        ),
        EmbedderBackend::Hashing => Arc::new(HashingEmbedder::new(
            config.embedder.hashing_dimension as usize,
        )),
    };

    info!(
        "Using embedder {} ({} dimensions)",
        embedder.model_id(),
        embedder.dimension()
    );
    Ok(embedder)
}

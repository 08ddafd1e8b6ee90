
use std::sync::Arc;

use tracing::debug;

use crate::Result;
use crate::database::{MemoryStore, RecordFilter, RetrievedResult, Scope};
use crate::embeddings::Embedder;

/// Embeds a query and searches the store with it
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn MemoryStore>,
}

impl Retriever {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn MemoryStore>) -> Self {
        Self { embedder, store }
    }

    /// Embedding failures are returned as errors, never as an empty result
    #[inline]
    pub async fn retrieve(
        &self,
        query: &str,
        scope: Scope,
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<RetrievedResult>> {
        self.retrieve_filtered(query, scope, limit, min_similarity, &RecordFilter::default())
            .await
    }

    /// Like [`Retriever::retrieve`], with conversation records narrowed by `filter`
    #[inline]
    pub async fn retrieve_filtered(
        &self,
        query: &str,
        scope: Scope,
        limit: usize,
        min_similarity: f32,
        filter: &RecordFilter,
    ) -> Result<Vec<RetrievedResult>> {
        let vector = self.embedder.embed(query).await?;
        let results = self
            .store
            .search_filtered(scope, &vector, limit, min_similarity, filter)
            .await?;

        debug!(
            "Retrieved {} results for query of {} characters",
            results.len(),
            query.chars().count()
        );
        Ok(results)
    }
}

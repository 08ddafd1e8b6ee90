// Store doubles shared by unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::database::{
    Collection, CollectionStats, MemoryStore, NewRecord, RecordFilter, RetrievedResult, Scope,
    VectorStore,
};
use crate::embeddings::HashingEmbedder;
use crate::{MemoryError, Result};

pub(crate) const TEST_DIMENSION: usize = 128;

/// A hashing embedder and a fresh store in a temporary directory
pub(crate) async fn hashing_store() -> (Arc<HashingEmbedder>, Arc<VectorStore>, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let embedder = Arc::new(HashingEmbedder::new(TEST_DIMENSION));
    let store = VectorStore::open(
        temp_dir.path(),
        &format!("hashing:fnv1a-{}", TEST_DIMENSION),
        TEST_DIMENSION,
    )
    .await
    .expect("should open store");
    (embedder, Arc::new(store), temp_dir)
}

/// Wraps a store and can be switched into an unavailable or slow state
pub(crate) struct FlakyStore {
    inner: Arc<dyn MemoryStore>,
    unavailable: AtomicBool,
    search_delay: Option<Duration>,
}

impl FlakyStore {
    pub(crate) fn new(inner: Arc<dyn MemoryStore>) -> Self {
        Self {
            inner,
            unavailable: AtomicBool::new(false),
            search_delay: None,
        }
    }

    pub(crate) fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = Some(delay);
        self
    }

    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(MemoryError::StoreUnavailable("store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MemoryStore for FlakyStore {
    async fn insert(&self, collection: Collection, record: NewRecord) -> Result<String> {
        self.check()?;
        self.inner.insert(collection, record).await
    }

    async fn search_filtered(
        &self,
        scope: Scope,
        query: &[f32],
        limit: usize,
        min_similarity: f32,
        filter: &RecordFilter,
    ) -> Result<Vec<RetrievedResult>> {
        self.check()?;
        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner
            .search_filtered(scope, query, limit, min_similarity, filter)
            .await
    }

    async fn find_by_text(&self, collection: Collection, text: &str) -> Result<Option<String>> {
        self.check()?;
        self.inner.find_by_text(collection, text).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        self.check()?;
        self.inner.delete(collection, id).await
    }

    async fn stats(&self, collection: Collection) -> Result<CollectionStats> {
        self.check()?;
        self.inner.stats(collection).await
    }

    async fn purge(&self, collection: Collection) -> Result<u64> {
        self.check()?;
        self.inner.purge(collection).await
    }

    async fn delete_by_parent(&self, collection: Collection, parent_id: &str) -> Result<u64> {
        self.check()?;
        self.inner.delete_by_parent(collection, parent_id).await
    }

    async fn evict_conversation(
        &self,
        author: &str,
        channel: &str,
        capacity: usize,
    ) -> Result<u64> {
        self.check()?;
        self.inner
            .evict_conversation(author, channel, capacity)
            .await
    }
}


use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::Result;
use crate::database::{Collection, MemoryStore, NewRecord, Scope};

#[derive(Debug, Clone, PartialEq)]
pub enum DedupDecision {
    Insert,
    /// An existing record already covers the candidate
    Suppress { existing_id: String, score: f32 },
}

/// Near-neighbour gate in front of store writes
pub struct Deduplicator {
    store: Arc<dyn MemoryStore>,
    threshold: f32,
    suppressed: AtomicU64,
}

impl Deduplicator {
    #[inline]
    pub fn new(store: Arc<dyn MemoryStore>, threshold: f32) -> Self {
        Self {
            store,
            threshold,
            suppressed: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Candidates suppressed since this gate was created
    #[inline]
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    /// Compare a candidate against `collection`.
    ///
    /// Suppresses when a record with byte-identical text exists or the
    /// nearest neighbour scores at least the threshold.
    #[inline]
    pub async fn check(
        &self,
        collection: Collection,
        candidate: &NewRecord,
    ) -> Result<DedupDecision> {
        // exact text is matched on its own, a tie on score would hide it
        if let Some(existing_id) = self.store.find_by_text(collection, &candidate.text).await? {
            return Ok(self.suppress(collection, existing_id, 1.0));
        }

        let nearest = self
            .store
            .search(Scope::One(collection), &candidate.vector, 1, 0.0)
            .await?;

        let Some(top) = nearest.into_iter().next() else {
            return Ok(DedupDecision::Insert);
        };

        if top.score >= self.threshold {
            return Ok(self.suppress(collection, top.record.id, top.score));
        }

        debug!(
            "Nearest neighbour in {} scores {:.3}, below {:.3}",
            collection, top.score, self.threshold
        );
        Ok(DedupDecision::Insert)
    }

    fn suppress(&self, collection: Collection, existing_id: String, score: f32) -> DedupDecision {
        let total = self.suppressed.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "Suppressed near-duplicate in {} (score {:.3}, matches {}, {} suppressed so far)",
            collection, score, existing_id, total
        );
        DedupDecision::Suppress { existing_id, score }
    }

    #[inline]
    pub async fn should_insert(
        &self,
        collection: Collection,
        candidate: &NewRecord,
    ) -> Result<bool> {
        Ok(self.check(collection, candidate).await? == DedupDecision::Insert)
    }
}

// Database module
// Dual storage: LanceDB tables hold the vectors of each collection, SQLite
// holds the manifest, collection state, import log and channel settings.

pub mod lancedb;
pub mod sqlite;


use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use self::lancedb::vector_store::VectorStore;
pub use sqlite::Database;

/// Partition of the store. Ids are unique within one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Conversation,
    Knowledge,
}

impl Collection {
    pub const ALL: [Self; 2] = [Self::Conversation, Self::Knowledge];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Conversation => "conversation",
            Self::Knowledge => "knowledge",
        }
    }
}

impl fmt::Display for Collection {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conversation" => Ok(Self::Conversation),
            "knowledge" => Ok(Self::Knowledge),
            other => Err(format!(
                "unknown collection '{}', expected 'conversation' or 'knowledge'",
                other
            )),
        }
    }
}

/// Collections a search runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    One(Collection),
    All,
}

impl Scope {
    #[inline]
    pub fn collections(&self) -> Vec<Collection> {
        match *self {
            Self::One(collection) => vec![collection],
            Self::All => Collection::ALL.to_vec(),
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            s.parse().map(Self::One)
        }
    }
}

impl From<Collection> for Scope {
    #[inline]
    fn from(collection: Collection) -> Self {
        Self::One(collection)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub author: Option<String>,
    pub channel: Option<String>,
    /// Platform tag of the originating connector
    pub platform: Option<String>,
    /// `user` or `assistant` for conversation turns
    pub role: Option<String>,
    /// Source file for imported knowledge
    pub source: Option<String>,
    pub parent_id: Option<String>,
    pub chunk_index: Option<u32>,
    pub extra: BTreeMap<String, String>,
}

/// An immutable stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub collection: Collection,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: RecordMetadata,
    pub created_at: DateTime<Utc>,
}

/// A record waiting to be inserted. A missing id is assigned on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub id: Option<String>,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: RecordMetadata,
    pub created_at: DateTime<Utc>,
}

impl NewRecord {
    #[inline]
    pub fn new(vector: Vec<f32>, text: impl Into<String>, metadata: RecordMetadata) -> Self {
        Self {
            id: None,
            vector,
            text: text.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedResult {
    pub record: Record,
    /// Cosine similarity to the query vector
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub collection: Collection,
    pub count: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Narrows conversation results to one author, channel or platform.
///
/// Knowledge records carry no conversation metadata and are never filtered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub author: Option<String>,
    pub channel: Option<String>,
    pub platform: Option<String>,
}

impl RecordFilter {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.author.is_none() && self.channel.is_none() && self.platform.is_none()
    }

    /// Whether the filter restricts searches of `collection`
    #[inline]
    pub fn applies_to(&self, collection: Collection) -> bool {
        collection == Collection::Conversation && !self.is_empty()
    }
}

/// Persistent vector store partitioned into collections.
///
/// Writes to one collection are serialized; searches never block on writers.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Store a record and return its id once it is durable
    async fn insert(&self, collection: Collection, record: NewRecord) -> Result<String>;

    /// Exact cosine search. Results below `min_similarity` are dropped, the
    /// rest ordered by [`ranks_before`] and truncated to `limit` after all
    /// collections in `scope` have been merged.
    async fn search(
        &self,
        scope: Scope,
        query: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<RetrievedResult>> {
        self.search_filtered(scope, query, limit, min_similarity, &RecordFilter::default())
            .await
    }

    /// [`MemoryStore::search`] with conversation records outside `filter`
    /// excluded before ranking
    async fn search_filtered(
        &self,
        scope: Scope,
        query: &[f32],
        limit: usize,
        min_similarity: f32,
        filter: &RecordFilter,
    ) -> Result<Vec<RetrievedResult>>;

    /// Id of a record in `collection` whose text is exactly `text`
    async fn find_by_text(&self, collection: Collection, text: &str) -> Result<Option<String>>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool>;

    async fn stats(&self, collection: Collection) -> Result<CollectionStats>;

    /// Remove every record of a collection, returning how many were removed
    async fn purge(&self, collection: Collection) -> Result<u64>;

    /// Remove the chunks of one imported document
    async fn delete_by_parent(&self, collection: Collection, parent_id: &str) -> Result<u64>;

    /// Keep only the newest `capacity` conversation records of one
    /// author/channel pair
    async fn evict_conversation(&self, author: &str, channel: &str, capacity: usize)
    -> Result<u64>;
}

/// Cosine similarity of two vectors, `None` when the dimensions differ.
/// A zero vector has similarity 0 with everything.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (x.mul_add(*y, dot), x.mul_add(*x, na), y.mul_add(*y, nb))
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Result order: higher score first, then the more recent record
#[inline]
pub fn ranks_before(a: &RetrievedResult, b: &RetrievedResult) -> bool {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.record.created_at.cmp(&a.record.created_at))
        .is_lt()
}

/// Merge per-collection candidate lists and keep the best `limit`.
///
/// Every list is ranked on its own first, so the merge sees all candidates
/// before anything is truncated.
#[inline]
pub fn merge_ranked(
    candidates: Vec<Vec<RetrievedResult>>,
    limit: usize,
) -> Vec<RetrievedResult> {
    candidates
        .into_iter()
        .map(|mut list| {
            list.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then_with(|| b.record.created_at.cmp(&a.record.created_at))
            });
            list
        })
        .kmerge_by(ranks_before)
        .take(limit)
        .collect()
}

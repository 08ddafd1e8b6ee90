
use std::path::{Path, PathBuf};

use arrow::array::RecordBatchIterator;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    batch_to_records, filter_predicate, record_schema, records_to_batch, schema_vector_dimension,
    sql_literal, store_error,
};
use crate::config::Config;
use crate::database::sqlite::Database;
use crate::database::{
    Collection, CollectionStats, MemoryStore, NewRecord, Record, RecordFilter, RetrievedResult,
    Scope, cosine_similarity, merge_ranked,
};
use crate::{MemoryError, Result};

pub const VECTOR_DIR_NAME: &str = "vectors";

/// Persistent store of both collections.
///
/// Vectors live in one LanceDB table per collection; the SQLite database
/// next to it pins the embedding model the store was created with.
pub struct VectorStore {
    connection: Connection,
    database: Database,
    model_id: String,
    dimension: usize,
    conversation_lock: Mutex<()>,
    knowledge_lock: Mutex<()>,
}

impl VectorStore {
    /// Open or create the store under `dir`.
    ///
    /// Fails with [`MemoryError::Configuration`] when the store was created
    /// with a different embedding model or dimension.
    #[inline]
    pub async fn open(dir: &Path, model_id: &str, dimension: usize) -> Result<Self> {
        debug!("Opening memory store at {:?}", dir);

        let database = Database::initialize_from_dir(dir)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("{:#}", e)))?;

        match database
            .manifest()
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("{:#}", e)))?
        {
            Some(manifest) if !manifest.matches(model_id, dimension) => {
                return Err(MemoryError::Configuration(format!(
                    "store at {} was created with embedding model {} ({} dimensions) but {} ({} dimensions) is configured",
                    dir.display(),
                    manifest.embedding_model,
                    manifest.embedding_dimension,
                    model_id,
                    dimension
                )));
            }
            Some(_) => {}
            None => {
                info!(
                    "Creating new memory store for model {} ({} dimensions)",
                    model_id, dimension
                );
                database
                    .ensure_manifest(model_id, dimension)
                    .await
                    .map_err(|e| MemoryError::StoreUnavailable(format!("{:#}", e)))?;
            }
        }

        let vector_path = Self::vector_path(dir);
        std::fs::create_dir_all(&vector_path)?;
        let uri = format!("file://{}", vector_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| store_error("Failed to connect to LanceDB", e))?;

        let store = Self {
            connection,
            database,
            model_id: model_id.to_string(),
            dimension,
            conversation_lock: Mutex::new(()),
            knowledge_lock: Mutex::new(()),
        };

        for collection in Collection::ALL {
            store.initialize_table(collection).await?;
        }

        info!("Memory store ready at {:?}", dir);
        Ok(store)
    }

    /// Open the store configured for the active embedder
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::open(
            config.get_base_dir(),
            &config.embedding_model_id(),
            config.embedding_dimension(),
        )
        .await
    }

    #[inline]
    pub fn vector_path(dir: &Path) -> PathBuf {
        dir.join(VECTOR_DIR_NAME)
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Every record of a collection, optionally narrowed by a Lance filter
    #[inline]
    pub async fn records(
        &self,
        collection: Collection,
        filter: Option<String>,
    ) -> Result<Vec<Record>> {
        let table = self.table(collection).await?;
        Self::scan(&table, collection, filter).await
    }

    /// Compact the vector tables and the metadata database
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        debug!("Optimizing memory store");

        for collection in Collection::ALL {
            let _guard = self.write_lock(collection).lock().await;
            let table = self.table(collection).await?;
            table
                .optimize(lancedb::table::OptimizeAction::All)
                .await
                .map_err(|e| store_error("Failed to optimize table", e))?;
        }

        self.database
            .optimize()
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("{:#}", e)))?;

        info!("Memory store optimization completed");
        Ok(())
    }

    async fn initialize_table(&self, collection: Collection) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| store_error("Failed to list tables", e))?;

        if table_names.iter().any(|name| name == collection.as_str()) {
            let table = self.table(collection).await?;
            let schema = table
                .schema()
                .await
                .map_err(|e| store_error("Failed to get table schema", e))?;

            return match schema_vector_dimension(&schema) {
                Some(dim) if dim == self.dimension => Ok(()),
                Some(dim) => Err(MemoryError::Configuration(format!(
                    "collection {} holds {}-dimensional vectors, {} configured",
                    collection, dim, self.dimension
                ))),
                None => Err(MemoryError::StoreUnavailable(format!(
                    "collection {} has no vector column",
                    collection
                ))),
            };
        }

        info!(
            "Creating {} table with {} dimensions",
            collection, self.dimension
        );
        self.create_table(collection).await
    }

    async fn create_table(&self, collection: Collection) -> Result<()> {
        self.connection
            .create_empty_table(collection.as_str(), record_schema(self.dimension))
            .execute()
            .await
            .map_err(|e| store_error("Failed to create table", e))?;
        Ok(())
    }

    async fn table(&self, collection: Collection) -> Result<Table> {
        self.connection
            .open_table(collection.as_str())
            .execute()
            .await
            .map_err(|e| store_error("Failed to open table", e))
    }

    fn write_lock(&self, collection: Collection) -> &Mutex<()> {
        match collection {
            Collection::Conversation => &self.conversation_lock,
            Collection::Knowledge => &self.knowledge_lock,
        }
    }

    async fn scan(
        table: &Table,
        collection: Collection,
        filter: Option<String>,
    ) -> Result<Vec<Record>> {
        let total = table
            .count_rows(filter.clone())
            .await
            .map_err(|e| store_error("Failed to count rows", e))?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut query = table.query().limit(total);
        if let Some(filter) = filter {
            query = query.only_if(filter);
        }

        let mut stream = query
            .execute()
            .await
            .map_err(|e| store_error("Failed to execute scan", e))?;

        let mut records = Vec::with_capacity(total);
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| store_error("Failed to read result stream", e))?
        {
            records.extend(batch_to_records(&batch, collection)?);
        }

        Ok(records)
    }

    async fn touch(&self, collection: Collection) -> Result<()> {
        self.database
            .touch_collection(collection.as_str(), Utc::now())
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("{:#}", e)))
    }

    async fn delete_ids(table: &Table, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let predicate = format!(
            "id IN ({})",
            ids.iter().map(|id| sql_literal(id)).join(", ")
        );
        table
            .delete(&predicate)
            .await
            .map_err(|e| store_error("Failed to delete records", e))?;
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for VectorStore {
    async fn insert(&self, collection: Collection, record: NewRecord) -> Result<String> {
        if record.vector.len() != self.dimension {
            return Err(MemoryError::Configuration(format!(
                "vector has {} dimensions, store expects {}",
                record.vector.len(),
                self.dimension
            )));
        }

        let _guard = self.write_lock(collection).lock().await;
        let table = self.table(collection).await?;

        let id = record
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let existing = table
            .count_rows(Some(format!("id = {}", sql_literal(&id))))
            .await
            .map_err(|e| store_error("Failed to check for existing id", e))?;
        if existing > 0 {
            return Err(MemoryError::DuplicateId {
                collection: collection.to_string(),
                id,
            });
        }

        let stored = Record {
            id: id.clone(),
            collection,
            vector: record.vector,
            text: record.text,
            metadata: record.metadata,
            created_at: record.created_at,
        };
        let batch = records_to_batch(std::slice::from_ref(&stored), self.dimension)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| store_error("Failed to insert record", e))?;

        self.touch(collection).await?;

        debug!("Stored record {} in {}", id, collection);
        Ok(id)
    }

    async fn search_filtered(
        &self,
        scope: Scope,
        query: &[f32],
        limit: usize,
        min_similarity: f32,
        filter: &RecordFilter,
    ) -> Result<Vec<RetrievedResult>> {
        if query.len() != self.dimension {
            return Err(MemoryError::Configuration(format!(
                "query vector has {} dimensions, store expects {}",
                query.len(),
                self.dimension
            )));
        }

        let mut candidates = Vec::new();
        for collection in scope.collections() {
            let table = self.table(collection).await?;
            let predicate = filter_predicate(filter, collection);
            let scored: Vec<RetrievedResult> = Self::scan(&table, collection, predicate)
                .await?
                .into_iter()
                .filter_map(|record| {
                    let score = cosine_similarity(query, &record.vector)?;
                    (score >= min_similarity).then_some(RetrievedResult { record, score })
                })
                .collect();
            debug!(
                "{} candidates above {} in {}",
                scored.len(),
                min_similarity,
                collection
            );
            candidates.push(scored);
        }

        Ok(merge_ranked(candidates, limit))
    }

    async fn find_by_text(&self, collection: Collection, text: &str) -> Result<Option<String>> {
        let table = self.table(collection).await?;
        let filter = format!("text = {}", sql_literal(text));
        let existing = Self::scan(&table, collection, Some(filter)).await?;

        // the oldest copy is the one every later duplicate was suppressed against
        Ok(existing
            .into_iter()
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .map(|record| record.id))
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let _guard = self.write_lock(collection).lock().await;
        let table = self.table(collection).await?;

        let existing = table
            .count_rows(Some(format!("id = {}", sql_literal(id))))
            .await
            .map_err(|e| store_error("Failed to look up record", e))?;
        if existing == 0 {
            debug!("No record {} in {}", id, collection);
            return Ok(false);
        }

        Self::delete_ids(&table, &[id.to_string()]).await?;
        self.touch(collection).await?;

        info!("Deleted record {} from {}", id, collection);
        Ok(true)
    }

    async fn stats(&self, collection: Collection) -> Result<CollectionStats> {
        let table = self.table(collection).await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| store_error("Failed to count rows", e))?;

        let last_updated = self
            .database
            .collection_state(collection.as_str())
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("{:#}", e)))?
            .and_then(|state| state.last_updated);

        Ok(CollectionStats {
            collection,
            count: count as u64,
            last_updated,
        })
    }

    async fn purge(&self, collection: Collection) -> Result<u64> {
        let _guard = self.write_lock(collection).lock().await;
        let table = self.table(collection).await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| store_error("Failed to count rows", e))?;

        // the table must exist at all times, searches take no lock
        table
            .delete("id IS NOT NULL")
            .await
            .map_err(|e| store_error("Failed to purge table", e))?;

        if let Err(e) = self.database.clear_imports(collection.as_str()).await {
            warn!("Failed to clear import log for {}: {:#}", collection, e);
        }
        self.touch(collection).await?;

        info!("Purged {} records from {}", count, collection);
        Ok(count as u64)
    }

    async fn delete_by_parent(&self, collection: Collection, parent_id: &str) -> Result<u64> {
        let _guard = self.write_lock(collection).lock().await;
        let table = self.table(collection).await?;

        let predicate = format!("parent_id = {}", sql_literal(parent_id));
        let count = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| store_error("Failed to count chunks", e))?;
        if count == 0 {
            debug!("No chunks of {} in {}", parent_id, collection);
            return Ok(0);
        }

        table
            .delete(&predicate)
            .await
            .map_err(|e| store_error("Failed to delete chunks", e))?;
        self.touch(collection).await?;

        info!("Deleted {} chunks of {} from {}", count, parent_id, collection);
        Ok(count as u64)
    }

    async fn evict_conversation(
        &self,
        author: &str,
        channel: &str,
        capacity: usize,
    ) -> Result<u64> {
        let collection = Collection::Conversation;
        let _guard = self.write_lock(collection).lock().await;
        let table = self.table(collection).await?;

        let filter = format!(
            "author = {} AND channel = {}",
            sql_literal(author),
            sql_literal(channel)
        );
        let mut records = Self::scan(&table, collection, Some(filter)).await?;
        if records.len() <= capacity {
            return Ok(0);
        }

        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        let evicted: Vec<String> = records
            .into_iter()
            .skip(capacity)
            .map(|record| record.id)
            .collect();

        Self::delete_ids(&table, &evicted).await?;
        self.touch(collection).await?;

        debug!(
            "Evicted {} conversation records for {} in {}",
            evicted.len(),
            author,
            channel
        );
        Ok(evicted.len() as u64)
    }
}

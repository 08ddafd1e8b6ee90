// Memory engine
// Shared entry point for connectors and the CLI: ingestion, recall, knowledge
// imports, per-channel settings and reply context assembly


use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, MemoryConfig};
use crate::database::sqlite::models::{
    ChannelSettings, ChannelSettingsUpdate, ImportRecord, NewImportRecord,
};
use crate::database::{
    Collection, CollectionStats, Database, MemoryStore, NewRecord, RecordFilter, RecordMetadata,
    RetrievedResult, Scope, VectorStore,
};
use crate::embeddings::{ChunkingConfig, Embedder, build_embedder, chunk_text};
use crate::memory::{AssembledContext, ContextAssembler, DedupDecision, Deduplicator, Retriever};
use crate::providers::{MemoryStatusProvider, ProviderRegistry, ProviderResult};
use crate::session::{MessageEvent, Role, SessionHistory};
use crate::{MemoryError, Result};

/// Author name of the bot's own turns in the short-term history
pub const BOT_AUTHOR: &str = "assistant";

/// Consecutive store failures after which the engine reports running memory-less
const FAILURE_ESCALATION: u32 = 3;

const MEMORY_PROVIDER_PRIORITY: i32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RememberOutcome {
    Stored(String),
    Suppressed { existing_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub source: PathBuf,
    pub parent_id: String,
    pub chunks_created: usize,
    pub records_inserted: usize,
    pub records_suppressed: usize,
}

/// Result of one file in a batch import
#[derive(Debug)]
pub struct ImportOutcome {
    pub path: PathBuf,
    pub result: Result<ImportReport>,
}

/// Everything the generation call needs besides the message itself
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseContext {
    pub settings: ChannelSettings,
    pub context: AssembledContext,
    pub capabilities: String,
    pub provider_data: Vec<ProviderResult>,
    /// Retrieval failed or timed out and the context holds no memory
    pub degraded: bool,
}

pub struct MemoryEngine {
    config: MemoryConfig,
    chunking: ChunkingConfig,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn MemoryStore>,
    database: Database,
    deduplicator: Deduplicator,
    retriever: Retriever,
    assembler: ContextAssembler,
    history: SessionHistory,
    providers: ProviderRegistry,
    conversation_ingest: Mutex<()>,
    knowledge_ingest: Mutex<()>,
    store_failures: AtomicU32,
}

impl MemoryEngine {
    #[inline]
    pub fn new(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn MemoryStore>,
        database: Database,
    ) -> Self {
        let memory = config.memory.clone();
        Self {
            deduplicator: Deduplicator::new(Arc::clone(&store), memory.dedup_threshold),
            retriever: Retriever::new(Arc::clone(&embedder), Arc::clone(&store)),
            assembler: ContextAssembler::new(memory.context_budget),
            history: SessionHistory::new(memory.short_term_history, memory.channel_context_size),
            providers: ProviderRegistry::new(),
            chunking: config.chunking.clone(),
            config: memory,
            embedder,
            store,
            database,
            conversation_ingest: Mutex::new(()),
            knowledge_ingest: Mutex::new(()),
            store_failures: AtomicU32::new(0),
        }
    }

    /// Build the configured embedder, open the store and register the
    /// built-in providers
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| MemoryError::Configuration(e.to_string()))?;

        let embedder = build_embedder(config)?;
        let store = Arc::new(VectorStore::from_config(config).await?);
        let database = store.database().clone();

        let mut engine = Self::new(config, embedder, store.clone(), database);
        engine.providers.register(
            MEMORY_PROVIDER_PRIORITY,
            Arc::new(MemoryStatusProvider::new(store)),
        );
        Ok(engine)
    }

    #[inline]
    pub fn providers_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.providers
    }

    #[inline]
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    #[inline]
    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    #[inline]
    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Near-duplicates suppressed since the engine started
    #[inline]
    pub fn suppressed_count(&self) -> u64 {
        self.deduplicator.suppressed_count()
    }

    #[inline]
    pub fn consecutive_store_failures(&self) -> u32 {
        self.store_failures.load(Ordering::Relaxed)
    }

    /// Embed and store `text` unless a near-duplicate already exists
    #[inline]
    pub async fn remember(
        &self,
        text: &str,
        collection: Collection,
        metadata: RecordMetadata,
    ) -> Result<RememberOutcome> {
        let vector = self.embedder.embed(text).await?;
        let candidate = NewRecord::new(vector, text, metadata);
        self.store_candidate(collection, candidate).await
    }

    /// Search memory with the configured similarity threshold.
    ///
    /// An unavailable store or a timeout yields no results; embedding
    /// failures are returned.
    #[inline]
    pub async fn recall(
        &self,
        query: &str,
        scope: Scope,
        limit: usize,
    ) -> Result<Vec<RetrievedResult>> {
        match self
            .retrieve_bounded(query, scope, limit, &RecordFilter::default())
            .await
        {
            Ok(results) => Ok(results),
            Err(e @ (MemoryError::StoreUnavailable(_) | MemoryError::RetrievalTimeout(_))) => {
                warn!("Recall answered without memory: {}", e);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Chunk a text file and store every chunk in `collection`
    #[inline]
    pub async fn import_file(&self, path: &Path, collection: Collection) -> Result<ImportReport> {
        info!("Importing {} into {}", path.display(), collection);

        let content = tokio::fs::read_to_string(path).await?;
        let source = path.display().to_string();
        // stable for the same file content, so re-imports map onto the same ids
        let parent_id = Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            format!("{}\n{}", source, content).as_bytes(),
        );

        let chunks: Vec<_> = chunk_text(&content, &self.chunking)?
            .into_iter()
            .filter(|chunk| !chunk.content.trim().is_empty())
            .collect();

        let mut report = ImportReport {
            source: path.to_path_buf(),
            parent_id: parent_id.to_string(),
            chunks_created: chunks.len(),
            records_inserted: 0,
            records_suppressed: 0,
        };

        for chunk in chunks {
            let vector = self.embedder.embed(&chunk.content).await?;
            let chunk_index = u32::try_from(chunk.chunk_index).map_err(|_| {
                MemoryError::Chunking(format!("{} has too many chunks", path.display()))
            })?;

            let mut candidate = NewRecord::new(
                vector,
                chunk.content,
                RecordMetadata {
                    source: Some(source.clone()),
                    parent_id: Some(report.parent_id.clone()),
                    chunk_index: Some(chunk_index),
                    ..RecordMetadata::default()
                },
            );
            candidate.id = Some(
                Uuid::new_v5(&parent_id, chunk.chunk_index.to_string().as_bytes()).to_string(),
            );

            match self.store_candidate(collection, candidate).await? {
                RememberOutcome::Stored(_) => report.records_inserted += 1,
                RememberOutcome::Suppressed { .. } => report.records_suppressed += 1,
            }
        }

        if let Err(e) = self
            .database
            .record_import(NewImportRecord {
                parent_id: report.parent_id.clone(),
                collection: collection.to_string(),
                source,
                chunks_created: report.chunks_created as i64,
                records_inserted: report.records_inserted as i64,
                records_suppressed: report.records_suppressed as i64,
            })
            .await
        {
            warn!("Failed to record import of {}: {:#}", path.display(), e);
        }

        info!(
            "Imported {}: {} chunks, {} stored, {} suppressed",
            path.display(),
            report.chunks_created,
            report.records_inserted,
            report.records_suppressed
        );
        Ok(report)
    }

    /// Import several files; a failing file does not stop the others
    #[inline]
    pub async fn import_files(&self, paths: &[PathBuf], collection: Collection) -> Vec<ImportOutcome> {
        self.import_files_with_progress(paths, collection, |_| {}).await
    }

    /// [`MemoryEngine::import_files`], calling `on_done` after each file
    #[inline]
    pub async fn import_files_with_progress(
        &self,
        paths: &[PathBuf],
        collection: Collection,
        mut on_done: impl FnMut(&ImportOutcome),
    ) -> Vec<ImportOutcome> {
        let mut outcomes = Vec::with_capacity(paths.len());
        for path in paths {
            let result = self.import_file(path, collection).await;
            if let Err(e) = &result {
                error!("Failed to import {}: {}", path.display(), e);
            }
            let outcome = ImportOutcome {
                path: path.clone(),
                result,
            };
            on_done(&outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Imports into `collection`, most recent first
    #[inline]
    pub async fn imports(&self, collection: Collection) -> Result<Vec<ImportRecord>> {
        self.database
            .list_imports(collection.as_str())
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("{:#}", e)))
    }

    #[inline]
    pub async fn status(&self, collection: Collection) -> Result<CollectionStats> {
        let result = self.store.stats(collection).await;
        self.note_store_result(&result);
        result
    }

    #[inline]
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let _guard = self.ingest_lock(collection).lock().await;
        let result = self.store.delete(collection, id).await;
        self.note_store_result(&result);
        result
    }

    /// Administrative wipe of the knowledge collection
    #[inline]
    pub async fn purge_knowledge(&self) -> Result<u64> {
        let _guard = self.ingest_lock(Collection::Knowledge).lock().await;
        let result = self.store.purge(Collection::Knowledge).await;
        self.note_store_result(&result);
        let removed = result?;
        info!("Knowledge purged, {} records removed", removed);
        Ok(removed)
    }

    /// Remove one imported document: its chunks and its import log entries.
    /// Returns how many chunks were removed.
    #[inline]
    pub async fn forget_import(&self, collection: Collection, parent_id: &str) -> Result<u64> {
        let _guard = self.ingest_lock(collection).lock().await;
        let result = self.store.delete_by_parent(collection, parent_id).await;
        self.note_store_result(&result);
        let removed = result?;

        let entries = self
            .database
            .forget_import(collection.as_str(), parent_id)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("{:#}", e)))?;

        info!(
            "Forgot import {}: {} chunks and {} log entries removed from {}",
            parent_id, removed, entries, collection
        );
        Ok(removed)
    }

    /// Record an inbound message and remember it when it is worth keeping.
    ///
    /// Memory failures are logged and leave the message unremembered.
    #[inline]
    pub async fn observe(&self, event: &MessageEvent) -> Result<Option<RememberOutcome>> {
        self.history.record_message(event);

        if !event.is_memory_worthy(&self.config.command_prefix) {
            debug!("Not remembering message from {}", event.author);
            return Ok(None);
        }

        self.remember_turn(event, &event.text, Role::User).await
    }

    /// Record the bot's reply to `event` in history and memory
    #[inline]
    pub async fn record_reply(
        &self,
        event: &MessageEvent,
        reply: &str,
    ) -> Result<Option<RememberOutcome>> {
        self.history.record_reply(event, BOT_AUTHOR, reply);

        if reply.trim().is_empty() {
            return Ok(None);
        }

        self.remember_turn(event, reply, Role::Assistant).await
    }

    /// Gather settings, memory and history for answering `event`. Never fails:
    /// when memory cannot be reached the context is built without it.
    #[inline]
    pub async fn build_context(&self, event: &MessageEvent) -> ResponseContext {
        let settings = match self.channel_settings(&event.channel).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(
                    "Using default settings for channel {}: {}",
                    event.channel, e
                );
                self.default_settings(&event.channel)
            }
        };

        let mut history = self.history.conversation(&event.author, &event.channel);
        // the message being answered is passed to the generation call on its own
        if history.last().is_some_and(|turn| {
            turn.role == Role::User
                && turn.text == event.text
                && turn.timestamp == event.timestamp
        }) {
            history.pop();
        }
        let channel = self.history.channel_context(&event.channel, &event.author);

        let mut degraded = false;
        let mut retrieved = Vec::new();
        if !event.text.trim().is_empty() {
            // one extra so dropping the message's own record still leaves enough
            // conversation memory only from the person and channel being answered
            let filter = RecordFilter {
                author: Some(event.author.clone()),
                channel: Some(event.channel.clone()),
                platform: Some(event.platform.to_string()),
            };
            match self
                .retrieve_bounded(
                    &event.text,
                    Scope::All,
                    self.config.max_results + 1,
                    &filter,
                )
                .await
            {
                Ok(results) => retrieved = results,
                Err(e) => {
                    warn!("Building reply context without memory: {}", e);
                    degraded = true;
                }
            }
        }

        let recent: HashSet<&str> = history.iter().map(|turn| turn.text.as_str()).collect();
        retrieved.retain(|result| {
            result.record.text != event.text
                && !(result.record.collection == Collection::Conversation
                    && recent.contains(result.record.text.as_str()))
        });
        retrieved.truncate(self.config.max_results);

        let provider_data = if event.is_memory_worthy(&self.config.command_prefix) {
            self.query_providers(&event.text).await
        } else {
            Vec::new()
        };

        ResponseContext {
            settings,
            context: self.assembler.assemble(&retrieved, &history, &channel),
            capabilities: self.providers.capabilities_prompt(),
            provider_data,
            degraded,
        }
    }

    /// Persona and language of `channel`, falling back to the configured defaults
    #[inline]
    pub async fn channel_settings(&self, channel: &str) -> Result<ChannelSettings> {
        let stored = self
            .database
            .channel_settings(channel)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("{:#}", e)))?;

        Ok(stored.unwrap_or_else(|| self.default_settings(channel)))
    }

    #[inline]
    pub async fn update_channel_settings(
        &self,
        channel: &str,
        update: ChannelSettingsUpdate,
    ) -> Result<ChannelSettings> {
        for (field, value) in [("persona", &update.persona), ("language", &update.language)] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(MemoryError::Configuration(format!(
                    "{} cannot be empty",
                    field
                )));
            }
        }

        let current = self.channel_settings(channel).await?;
        let updated = update.apply(&current);
        self.database
            .save_channel_settings(&updated)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("{:#}", e)))?;

        info!(
            "Channel {} now uses persona {} in {}",
            channel, updated.persona, updated.language
        );
        Ok(updated)
    }

    fn default_settings(&self, channel: &str) -> ChannelSettings {
        ChannelSettings::new(
            channel,
            &self.config.default_persona,
            &self.config.default_language,
        )
    }

    async fn remember_turn(
        &self,
        event: &MessageEvent,
        text: &str,
        role: Role,
    ) -> Result<Option<RememberOutcome>> {
        let metadata = RecordMetadata {
            author: Some(event.author.clone()),
            channel: Some(event.channel.clone()),
            platform: Some(event.platform.to_string()),
            role: Some(role.as_str().to_string()),
            ..RecordMetadata::default()
        };

        match self.remember(text, Collection::Conversation, metadata).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) if e.is_degradable() => {
                warn!("Not remembering {} turn: {}", role.as_str(), e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn store_candidate(
        &self,
        collection: Collection,
        candidate: NewRecord,
    ) -> Result<RememberOutcome> {
        let author = candidate.metadata.author.clone();
        let channel = candidate.metadata.channel.clone();

        let outcome = {
            let _guard = self.ingest_lock(collection).lock().await;

            let decision = self.deduplicator.check(collection, &candidate).await;
            self.note_store_result(&decision);
            match decision? {
                DedupDecision::Suppress { existing_id, .. } => {
                    return Ok(RememberOutcome::Suppressed { existing_id });
                }
                DedupDecision::Insert => {}
            }

            let inserted = self.store.insert(collection, candidate).await;
            self.note_store_result(&inserted);
            match inserted {
                Ok(id) => RememberOutcome::Stored(id),
                Err(MemoryError::DuplicateId { id, .. }) => {
                    debug!("Record {} already present in {}", id, collection);
                    return Ok(RememberOutcome::Suppressed { existing_id: id });
                }
                Err(e) => return Err(e),
            }
        };

        if collection == Collection::Conversation {
            if let (Some(author), Some(channel)) = (author, channel) {
                match self
                    .store
                    .evict_conversation(&author, &channel, self.config.history_capacity)
                    .await
                {
                    Ok(0) => {}
                    Ok(removed) => debug!(
                        "Evicted {} old turns of {} in {}",
                        removed, author, channel
                    ),
                    Err(e) => warn!("Conversation eviction failed: {}", e),
                }
            }
        }

        Ok(outcome)
    }

    async fn retrieve_bounded(
        &self,
        query: &str,
        scope: Scope,
        limit: usize,
        filter: &RecordFilter,
    ) -> Result<Vec<RetrievedResult>> {
        let timeout_ms = self.config.retrieval_timeout_ms;
        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.retriever.retrieve_filtered(
                query,
                scope,
                limit,
                self.config.similarity_threshold,
                filter,
            ),
        )
        .await
        .unwrap_or(Err(MemoryError::RetrievalTimeout(timeout_ms)));

        self.note_store_result(&result);
        result
    }

    /// Provider answers within the retrieval timeout, none when it elapses
    async fn query_providers(&self, text: &str) -> Vec<ProviderResult> {
        let timeout_ms = self.config.retrieval_timeout_ms;
        match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.providers.query(text),
        )
        .await
        {
            Ok(results) => results,
            Err(_) => {
                warn!("Data providers did not answer within {}ms", timeout_ms);
                Vec::new()
            }
        }
    }

    fn ingest_lock(&self, collection: Collection) -> &Mutex<()> {
        match collection {
            Collection::Conversation => &self.conversation_ingest,
            Collection::Knowledge => &self.knowledge_ingest,
        }
    }

    fn note_store_result<T>(&self, result: &Result<T>) {
        match result {
            Ok(_) => {
                let previous = self.store_failures.swap(0, Ordering::Relaxed);
                if previous > 0 {
                    info!("Memory store reachable again after {} failures", previous);
                }
            }
            Err(MemoryError::StoreUnavailable(reason)) => {
                let failures = self.store_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= FAILURE_ESCALATION {
                    error!(
                        "Memory store unavailable {} times in a row, running without memory: {}",
                        failures, reason
                    );
                } else {
                    warn!("Memory store unavailable ({}): {}", failures, reason);
                }
            }
            Err(_) => {}
        }
    }
}


use super::models::*;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

pub struct ManifestQueries;

impl ManifestQueries {
    #[inline]
    pub async fn get(pool: &SqlitePool) -> Result<Option<StoreManifest>> {
        let manifest = sqlx::query_as::<_, StoreManifest>(
            "SELECT embedding_model, embedding_dimension, created_at FROM store_manifest WHERE id = 1",
        )
        .fetch_optional(pool)
        .await
        .context("Failed to read store manifest")?;

        Ok(manifest)
    }

    /// Write the manifest unless one already exists, returning the stored one
    #[inline]
    pub async fn create_if_missing(
        pool: &SqlitePool,
        embedding_model: &str,
        embedding_dimension: usize,
    ) -> Result<StoreManifest> {
        let dimension =
            i64::try_from(embedding_dimension).context("Embedding dimension out of range")?;

        sqlx::query(
            "INSERT OR IGNORE INTO store_manifest (id, embedding_model, embedding_dimension, created_at) VALUES (1, ?, ?, ?)",
        )
        .bind(embedding_model)
        .bind(dimension)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to write store manifest")?;

        Self::get(pool)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Store manifest missing after creation"))
    }
}

pub struct CollectionStateQueries;

impl CollectionStateQueries {
    #[inline]
    pub async fn get(pool: &SqlitePool, collection: &str) -> Result<Option<CollectionState>> {
        let state = sqlx::query_as::<_, CollectionState>(
            "SELECT collection, last_updated FROM collection_state WHERE collection = ?",
        )
        .bind(collection)
        .fetch_optional(pool)
        .await
        .context("Failed to read collection state")?;

        Ok(state)
    }

    #[inline]
    pub async fn touch(pool: &SqlitePool, collection: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO collection_state (collection, last_updated) VALUES (?, ?)
             ON CONFLICT(collection) DO UPDATE SET last_updated = excluded.last_updated",
        )
        .bind(collection)
        .bind(at)
        .execute(pool)
        .await
        .context("Failed to update collection state")?;

        debug!("Collection {} updated at {}", collection, at);
        Ok(())
    }
}

pub struct ImportQueries;

impl ImportQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_import: NewImportRecord) -> Result<ImportRecord> {
        let id = sqlx::query(
            "INSERT INTO imports (parent_id, collection, source, chunks_created, records_inserted, records_suppressed, imported_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new_import.parent_id)
        .bind(&new_import.collection)
        .bind(&new_import.source)
        .bind(new_import.chunks_created)
        .bind(new_import.records_inserted)
        .bind(new_import.records_suppressed)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to record import")?
        .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve recorded import"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<ImportRecord>> {
        let record = sqlx::query_as::<_, ImportRecord>(
            "SELECT id, parent_id, collection, source, chunks_created, records_inserted, records_suppressed, imported_at
             FROM imports WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get import by id")?;

        Ok(record)
    }

    /// Most recent imports first
    #[inline]
    pub async fn list_by_collection(
        pool: &SqlitePool,
        collection: &str,
    ) -> Result<Vec<ImportRecord>> {
        let records = sqlx::query_as::<_, ImportRecord>(
            "SELECT id, parent_id, collection, source, chunks_created, records_inserted, records_suppressed, imported_at
             FROM imports WHERE collection = ? ORDER BY imported_at DESC, id DESC",
        )
        .bind(collection)
        .fetch_all(pool)
        .await
        .context("Failed to list imports")?;

        Ok(records)
    }

    #[inline]
    pub async fn delete_by_collection(pool: &SqlitePool, collection: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM imports WHERE collection = ?")
            .bind(collection)
            .execute(pool)
            .await
            .context("Failed to clear import log")?;

        Ok(result.rows_affected())
    }

    #[inline]
    pub async fn delete_by_parent_id(
        pool: &SqlitePool,
        collection: &str,
        parent_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM imports WHERE collection = ? AND parent_id = ?")
            .bind(collection)
            .bind(parent_id)
            .execute(pool)
            .await
            .context("Failed to remove import from log")?;

        Ok(result.rows_affected())
    }
}

pub struct ChannelSettingsQueries;

impl ChannelSettingsQueries {
    #[inline]
    pub async fn get(pool: &SqlitePool, channel: &str) -> Result<Option<ChannelSettings>> {
        let settings = sqlx::query_as::<_, ChannelSettings>(
            "SELECT channel, persona, language, updated_at FROM channel_settings WHERE channel = ?",
        )
        .bind(channel)
        .fetch_optional(pool)
        .await
        .context("Failed to get channel settings")?;

        Ok(settings)
    }

    #[inline]
    pub async fn upsert(pool: &SqlitePool, settings: &ChannelSettings) -> Result<()> {
        sqlx::query(
            "INSERT INTO channel_settings (channel, persona, language, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(channel) DO UPDATE SET
                persona = excluded.persona,
                language = excluded.language,
                updated_at = excluded.updated_at",
        )
        .bind(&settings.channel)
        .bind(&settings.persona)
        .bind(&settings.language)
        .bind(settings.updated_at)
        .execute(pool)
        .await
        .context("Failed to save channel settings")?;

        debug!(
            "Channel {} now uses persona {} in {}",
            settings.channel, settings.persona, settings.language
        );
        Ok(())
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<ChannelSettings>> {
        let settings = sqlx::query_as::<_, ChannelSettings>(
            "SELECT channel, persona, language, updated_at FROM channel_settings ORDER BY channel",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list channel settings")?;

        Ok(settings)
    }
}

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{
    ChannelSettings, CollectionState, ImportRecord, NewImportRecord, StoreManifest,
};
use crate::database::sqlite::queries::{
    ChannelSettingsQueries, CollectionStateQueries, ImportQueries, ManifestQueries,
};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

pub const DATABASE_FILE_NAME: &str = "memory.db";

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_dir(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;

        Self::new(dir.join(DATABASE_FILE_NAME)).await
    }

    // Manifest operations
    #[inline]
    pub async fn manifest(&self) -> Result<Option<StoreManifest>> {
        ManifestQueries::get(&self.pool).await
    }

    #[inline]
    pub async fn ensure_manifest(
        &self,
        embedding_model: &str,
        embedding_dimension: usize,
    ) -> Result<StoreManifest> {
        ManifestQueries::create_if_missing(&self.pool, embedding_model, embedding_dimension).await
    }

    // Collection state operations
    #[inline]
    pub async fn collection_state(&self, collection: &str) -> Result<Option<CollectionState>> {
        CollectionStateQueries::get(&self.pool, collection).await
    }

    #[inline]
    pub async fn touch_collection(
        &self,
        collection: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        CollectionStateQueries::touch(&self.pool, collection, at).await
    }

    // Import log operations
    #[inline]
    pub async fn record_import(&self, import: NewImportRecord) -> Result<ImportRecord> {
        ImportQueries::create(&self.pool, import).await
    }

    #[inline]
    pub async fn list_imports(&self, collection: &str) -> Result<Vec<ImportRecord>> {
        ImportQueries::list_by_collection(&self.pool, collection).await
    }

    #[inline]
    pub async fn clear_imports(&self, collection: &str) -> Result<u64> {
        ImportQueries::delete_by_collection(&self.pool, collection).await
    }

    #[inline]
    pub async fn forget_import(&self, collection: &str, parent_id: &str) -> Result<u64> {
        ImportQueries::delete_by_parent_id(&self.pool, collection, parent_id).await
    }

    // Channel settings operations
    #[inline]
    pub async fn channel_settings(&self, channel: &str) -> Result<Option<ChannelSettings>> {
        ChannelSettingsQueries::get(&self.pool, channel).await
    }

    #[inline]
    pub async fn save_channel_settings(&self, settings: &ChannelSettings) -> Result<()> {
        ChannelSettingsQueries::upsert(&self.pool, settings).await
    }

    /// Optimize database performance by running VACUUM and ANALYZE
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database performance");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        debug!("Database optimization completed");
        Ok(())
    }
}

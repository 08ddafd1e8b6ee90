
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Embedding model a store was created with. Fixed for the life of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StoreManifest {
    pub embedding_model: String,
    pub embedding_dimension: i64,
    pub created_at: DateTime<Utc>,
}

impl StoreManifest {
    /// Whether a store built with this manifest can serve the given embedder
    #[inline]
    pub fn matches(&self, model_id: &str, dimension: usize) -> bool {
        self.embedding_model == model_id
            && usize::try_from(self.embedding_dimension).is_ok_and(|dim| dim == dimension)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CollectionState {
    pub collection: String,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ImportRecord {
    pub id: i64,
    pub parent_id: String,
    pub collection: String,
    pub source: String,
    pub chunks_created: i64,
    pub records_inserted: i64,
    pub records_suppressed: i64,
    pub imported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewImportRecord {
    pub parent_id: String,
    pub collection: String,
    pub source: String,
    pub chunks_created: i64,
    pub records_inserted: i64,
    pub records_suppressed: i64,
}

/// Persona and response language of one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChannelSettings {
    pub channel: String,
    pub persona: String,
    pub language: String,
    pub updated_at: DateTime<Utc>,
}

impl ChannelSettings {
    #[inline]
    pub fn new(channel: &str, persona: &str, language: &str) -> Self {
        Self {
            channel: channel.to_string(),
            persona: persona.to_string(),
            language: language.to_string(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChannelSettingsUpdate {
    pub persona: Option<String>,
    pub language: Option<String>,
}

impl ChannelSettingsUpdate {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.persona.is_none() && self.language.is_none()
    }

    /// Apply the present fields on top of `current`
    #[inline]
    pub fn apply(&self, current: &ChannelSettings) -> ChannelSettings {
        ChannelSettings {
            channel: current.channel.clone(),
            persona: self
                .persona
                .clone()
                .unwrap_or_else(|| current.persona.clone()),
            language: self
                .language
                .clone()
                .unwrap_or_else(|| current.language.clone()),
            updated_at: Utc::now(),
        }
    }
}

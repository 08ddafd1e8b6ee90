// External data providers
// Capability trait for live data sources and a registry that consults them
// in a fixed priority order


use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::Result;
use crate::database::{Collection, MemoryStore};

/// A source of live data the bot can mention in replies
#[async_trait]
pub trait DataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// One line shown in the capabilities prompt
    fn description(&self) -> &str;

    fn can_handle(&self, query: &str) -> bool;

    /// `None` when the provider has nothing for this query
    async fn query(&self, query: &str) -> Result<Option<Value>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider: String,
    pub data: Value,
}

/// Providers ordered by ascending priority; ties keep registration order
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<(i32, Arc<dyn DataProvider>)>,
}

impl ProviderRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn register(&mut self, priority: i32, provider: Arc<dyn DataProvider>) {
        info!(
            "Registered data provider {} with priority {}",
            provider.name(),
            priority
        );
        let position = self
            .providers
            .iter()
            .position(|(existing, _)| *existing > priority)
            .unwrap_or(self.providers.len());
        self.providers.insert(position, (priority, provider));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    #[inline]
    pub fn names(&self) -> Vec<&str> {
        self.providers
            .iter()
            .map(|(_, provider)| provider.name())
            .collect()
    }

    /// Ask every provider that can handle `query`, in priority order.
    /// A failing provider is logged and skipped.
    #[inline]
    pub async fn query(&self, query: &str) -> Vec<ProviderResult> {
        let mut results = Vec::new();

        for (_, provider) in &self.providers {
            if !provider.can_handle(query) {
                continue;
            }

            debug!("Querying data provider {}", provider.name());
            match provider.query(query).await {
                Ok(Some(data)) => results.push(ProviderResult {
                    provider: provider.name().to_string(),
                    data,
                }),
                Ok(None) => debug!("Provider {} had no data", provider.name()),
                Err(e) => warn!("Data provider {} failed: {}", provider.name(), e),
            }
        }

        results
    }

    /// Capability summary for the system prompt, empty without providers
    #[inline]
    pub fn capabilities_prompt(&self) -> String {
        if self.providers.is_empty() {
            return String::new();
        }

        std::iter::once("I have access to the following data sources:".to_string())
            .chain(
                self.providers
                    .iter()
                    .map(|(_, p)| format!("- {}: {}", p.name(), p.description())),
            )
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Reports how much the bot remembers
pub struct MemoryStatusProvider {
    store: Arc<dyn MemoryStore>,
}

impl MemoryStatusProvider {
    #[inline]
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DataProvider for MemoryStatusProvider {
    #[inline]
    fn name(&self) -> &str {
        "memory"
    }

    #[inline]
    fn description(&self) -> &str {
        "record counts and last update times of the bot's memory"
    }

    #[inline]
    fn can_handle(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        (query.contains("memory") || query.contains("remember"))
            && ["how much", "how many", "status", "stats"]
                .iter()
                .any(|phrase| query.contains(phrase))
    }

    async fn query(&self, _query: &str) -> Result<Option<Value>> {
        let mut collections = serde_json::Map::new();
        for collection in Collection::ALL {
            let stats = self.store.stats(collection).await?;
            collections.insert(
                collection.to_string(),
                json!({
                    "count": stats.count,
                    "last_updated": stats.last_updated.map(|t| t.to_rfc3339()),
                }),
            );
        }
        Ok(Some(Value::Object(collections)))
    }
}

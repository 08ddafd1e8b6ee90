
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::ollama::{DEFAULT_EMBEDDING_DIMENSION, DEFAULT_MAX_INPUT_TOKENS};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderBackend {
    #[default]
    Ollama,
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedderConfig {
    pub backend: EmbedderBackend,
    /// Vector size used by the offline hashing embedder
    pub hashing_dimension: u32,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            backend: EmbedderBackend::Ollama,
            hashing_dimension: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub embedding_dimension: u32,
    pub max_input_tokens: usize,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            timeout_seconds: 30,
        }
    }
}

/// Retrieval, deduplication and context-assembly tuning.
///
/// `similarity_threshold` decides what is relevant enough to show,
/// `dedup_threshold` what is similar enough to count as the same memory.
/// Neither constrains the other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub similarity_threshold: f32,
    pub dedup_threshold: f32,
    pub max_results: usize,
    pub retrieval_timeout_ms: u64,
    /// Stored conversation records kept per author/channel pair
    pub history_capacity: usize,
    /// In-process turns kept per author/channel pair
    pub short_term_history: usize,
    /// In-process messages kept per channel
    pub channel_context_size: usize,
    /// Context size in characters handed to the generation call
    pub context_budget: usize,
    pub default_persona: String,
    pub default_language: String,
    /// Messages starting with this prefix are bot commands and never remembered
    pub command_prefix: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.35,
            dedup_threshold: 0.95,
            max_results: 5,
            retrieval_timeout_ms: 2_000,
            history_capacity: 500,
            short_term_history: 20,
            channel_context_size: 5,
            context_budget: 2_000,
            default_persona: "default".to_string(),
            default_language: "english".to_string(),
            command_prefix: "!".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 8 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid max input tokens: {0} (must be between 16 and 131072)")]
    InvalidMaxInputTokens(usize),
    #[error("Invalid timeout: {0} (must be between 1 and 300 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid max chunk size: {0} (must be between 50 and 8192)")]
    InvalidMaxChunkSize(usize),
    #[error("Overlap size ({0}) must be smaller than max chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid {0}: {1} (must be between 0.0 and 1.0)")]
    InvalidThreshold(&'static str, f32),
    #[error("Invalid max results: {0} (must be between 1 and 100)")]
    InvalidMaxResults(usize),
    #[error("Invalid retrieval timeout: {0} ms (must be between 1 and 60000)")]
    InvalidRetrievalTimeout(u64),
    #[error("Invalid {0}: {1} (must be at least 1)")]
    InvalidCapacity(&'static str, usize),
    #[error("Invalid context budget: {0} (must be between 200 and 32000 characters)")]
    InvalidContextBudget(usize),
    #[error("Invalid command prefix: {0:?} (cannot be empty or contain whitespace)")]
    InvalidCommandPrefix(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            embedder: EmbedderConfig::default(),
            ollama: OllamaConfig::default(),
            chunking: ChunkingConfig::default(),
            memory: MemoryConfig::default(),
            base_dir: Self::config_dir().unwrap_or_else(|_| PathBuf::from(".bot-memory")),
        }
    }
}

impl Config {
    /// Directory holding `config.toml` and the memory store
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".bot-memory"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("bot-memory"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load from the default configuration directory
    #[inline]
    pub fn load_default() -> Result<Self> {
        let dir = Self::config_dir().context("Failed to determine config directory")?;
        Self::load(dir)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.validate_embedder_config()?;
        self.validate_chunking_config()?;
        self.memory.validate()?;
        Ok(())
    }

    fn validate_embedder_config(&self) -> Result<(), ConfigError> {
        if !(8..=4096).contains(&self.embedder.hashing_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedder.hashing_dimension,
            ));
        }
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(50..=8192).contains(&config.max_chunk_size) {
            return Err(ConfigError::InvalidMaxChunkSize(config.max_chunk_size));
        }

        if config.overlap_size >= config.max_chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.overlap_size,
                config.max_chunk_size,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// SQLite database holding the store manifest and metadata
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("memory.db")
    }

    /// LanceDB directory holding the vector collections
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }

    /// Identifier recorded in the store manifest for the active embedder
    #[inline]
    pub fn embedding_model_id(&self) -> String {
        match self.embedder.backend {
            EmbedderBackend::Ollama => format!("ollama:{}", self.ollama.model),
            EmbedderBackend::Hashing => {
                format!("hashing:fnv1a-{}", self.embedder.hashing_dimension)
            }
        }
    }

    #[inline]
    pub fn embedding_dimension(&self) -> usize {
        match self.embedder.backend {
            EmbedderBackend::Ollama => self.ollama.embedding_dimension as usize,
            EmbedderBackend::Hashing => self.embedder.hashing_dimension as usize,
        }
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(8..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(16..=131_072).contains(&self.max_input_tokens) {
            return Err(ConfigError::InvalidMaxInputTokens(self.max_input_tokens));
        }

        if !(1..=300).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(8..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_threshold("similarity threshold", self.similarity_threshold)?;
        check_threshold("dedup threshold", self.dedup_threshold)?;

        if !(1..=100).contains(&self.max_results) {
            return Err(ConfigError::InvalidMaxResults(self.max_results));
        }

        if !(1..=60_000).contains(&self.retrieval_timeout_ms) {
            return Err(ConfigError::InvalidRetrievalTimeout(
                self.retrieval_timeout_ms,
            ));
        }

        if self.history_capacity == 0 {
            return Err(ConfigError::InvalidCapacity(
                "history capacity",
                self.history_capacity,
            ));
        }

        if self.short_term_history == 0 {
            return Err(ConfigError::InvalidCapacity(
                "short-term history",
                self.short_term_history,
            ));
        }

        if self.channel_context_size == 0 {
            return Err(ConfigError::InvalidCapacity(
                "channel context size",
                self.channel_context_size,
            ));
        }

        if !(200..=32_000).contains(&self.context_budget) {
            return Err(ConfigError::InvalidContextBudget(self.context_budget));
        }

        if self.command_prefix.is_empty() || self.command_prefix.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidCommandPrefix(self.command_prefix.clone()));
        }

        Ok(())
    }

    pub fn set_similarity_threshold(&mut self, threshold: f32) -> Result<(), ConfigError> {
        check_threshold("similarity threshold", threshold)?;
        self.similarity_threshold = threshold;
        Ok(())
    }

    pub fn set_dedup_threshold(&mut self, threshold: f32) -> Result<(), ConfigError> {
        check_threshold("dedup threshold", threshold)?;
        self.dedup_threshold = threshold;
        Ok(())
    }

    pub fn set_context_budget(&mut self, budget: usize) -> Result<(), ConfigError> {
        if !(200..=32_000).contains(&budget) {
            return Err(ConfigError::InvalidContextBudget(budget));
        }
        self.context_budget = budget;
        Ok(())
    }
}

fn check_threshold(name: &'static str, value: f32) -> Result<(), ConfigError> {
    // NaN fails the range check as well
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold(name, value))
    }
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Error, Debug)]
pub enum MemoryError {
    /// Fatal at startup: invalid settings or an embedding model/dimension
    /// that does not match the one the store was created with.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Retrieval timed out after {0} ms")]
    RetrievalTimeout(u64),

    #[error("Record {id} already exists in collection {collection}")]
    DuplicateId { collection: String, id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl MemoryError {
    /// Errors that leave the engine able to answer without memory.
    #[inline]
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::RetrievalTimeout(_) | Self::Embedding(_)
        )
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod engine;
pub mod memory;
pub mod providers;
pub mod session;

#[cfg(test)]
mod testing;

// Memory module
// Write gate, read path and prompt assembly on top of a MemoryStore

pub mod context;
pub mod dedup;
pub mod retrieval;

pub use context::{AssembledContext, ContextAssembler};
pub use dedup::{DedupDecision, Deduplicator};
pub use retrieval::Retriever;

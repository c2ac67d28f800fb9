pub mod dedup;
pub mod embeddings;
pub mod engine;
mod factory;
#[cfg(feature = "vector-search")]
pub mod lancedb;
pub mod memory_types;
pub mod retention;
mod scope_lock;
pub mod sqlite;
pub mod traits;
pub mod vector;

pub use dedup::{DedupManager, DedupOutcome, DuplicateMatch};
pub use embeddings::{EmbeddingProvider, HashEmbedding, OpenAiEmbedding, create_embedding_provider};
pub use engine::{
    AddDisposition, AddOutcome, AddRequest, EngineConfig, MemoryEngine, MemoryStats,
    RetrievedMemory,
};
pub use factory::create_vector_store;
#[cfg(feature = "vector-search")]
pub use lancedb::LanceDbVectorStore;
pub use memory_types::{
    DistanceMetric, IndexAlgorithm, IndexConfig, Memory, MergePolicy, Metadata, NewMemory,
    ReinforcePolicy, Reinforcement, Scope, ScopeFilter, StoreCapabilities,
    UpdateRetentionPolicy,
};
pub use retention::RetentionManager;
pub use sqlite::SqliteVectorStore;
pub use traits::{StrengthStep, VectorStore};

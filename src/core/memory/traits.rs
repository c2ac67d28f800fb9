use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MemoryResult;

pub use super::memory_types::{
    IndexConfig, Memory, NewMemory, Reinforcement, ScopeFilter, StoreCapabilities,
};

/// Maps the stored record to its new retention strength.
pub type StrengthStep<'a> = &'a (dyn Fn(&Memory) -> f64 + Send + Sync);

/// Persistence contract every backend satisfies with identical filter,
/// ordering, limit and tie-break semantics.
///
/// Errors carry the failing operation and scope via
/// [`MemoryError::Context`](crate::error::MemoryError::Context).
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    /// Embedding length every record in this collection has.
    fn dimensions(&self) -> usize;

    fn capabilities(&self) -> StoreCapabilities;

    async fn health_check(&self) -> bool;

    async fn insert(&self, memory: NewMemory) -> MemoryResult<Memory>;

    async fn get(&self, id: i64) -> MemoryResult<Memory>;

    /// Replace content and embedding; retention fields are untouched.
    async fn update(&self, id: i64, content: &str, embedding: &[f32]) -> MemoryResult<Memory>;

    async fn delete(&self, id: i64) -> MemoryResult<()>;

    /// Rank matching records by cosine similarity to `query`, highest first.
    /// Ties go to the most recently updated record, then the higher id.
    /// `filter.offset` is ignored.
    async fn search(&self, query: &[f32], filter: &ScopeFilter) -> MemoryResult<Vec<Memory>>;

    /// Newest first, paginated by `filter.limit` and `filter.offset`.
    async fn get_all(&self, filter: &ScopeFilter) -> MemoryResult<Vec<Memory>>;

    /// Remove every record matching `filter` (pagination ignored).
    async fn delete_all(&self, filter: &ScopeFilter) -> MemoryResult<usize>;

    /// Number of records matching `filter` (pagination ignored).
    async fn count(&self, filter: &ScopeFilter) -> MemoryResult<usize>;

    /// Persist one reinforcement step.
    async fn record_access(
        &self,
        id: i64,
        retention_strength: f64,
        accessed_at: DateTime<Utc>,
    ) -> MemoryResult<Memory>;

    /// Read-modify-write of one access event: `step` sees the record as
    /// stored, and no other write to it lands in between.
    async fn reinforce(
        &self,
        id: i64,
        accessed_at: DateTime<Utc>,
        step: StrengthStep<'_>,
    ) -> MemoryResult<Reinforcement>;

    async fn create_index(&self, config: &IndexConfig) -> MemoryResult<()>;
}

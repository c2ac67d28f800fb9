use super::memory_types::{
    IndexConfig, Memory, NewMemory, Reinforcement, ScopeFilter, StoreCapabilities,
};
use super::traits::{StrengthStep, VectorStore};
use crate::config::schema::is_valid_collection_name;
use crate::error::{MemoryError, MemoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

mod codec;
mod repository;
mod schema;
mod search;

pub const DB_FILE_NAME: &str = "memoria.db";

/// SQLite-backed vector store.
///
/// Embeddings live in a little-endian f32 BLOB column; similarity is scored
/// in-process over the rows the scope filter selects, so results are exact.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    table: String,
    dimensions: usize,
}

impl SqliteVectorStore {
    /// Open (or create) `<data_dir>/memoria.db`.
    pub async fn open(
        data_dir: &Path,
        collection: &str,
        dimensions: usize,
        max_connections: u32,
    ) -> MemoryResult<Self> {
        tokio::fs::create_dir_all(data_dir).await.map_err(|e| {
            MemoryError::BackendUnavailable(format!(
                "failed to create data directory {}: {e}",
                data_dir.display()
            ))
        })?;

        let db_path = data_dir.join(DB_FILE_NAME);
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(&url)
            .await
            .map_err(|e| {
                MemoryError::BackendUnavailable(format!(
                    "failed to open {}: {e}",
                    db_path.display()
                ))
            })?;

        Self::with_pool(pool, collection, dimensions).await
    }

    /// Private in-memory database; a single connection keeps it alive.
    pub async fn in_memory(collection: &str, dimensions: usize) -> MemoryResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool, collection, dimensions).await
    }

    /// Wrap an existing pool and create the collection table if needed.
    pub async fn with_pool(
        pool: SqlitePool,
        collection: &str,
        dimensions: usize,
    ) -> MemoryResult<Self> {
        if !is_valid_collection_name(collection) {
            return Err(MemoryError::invalid(format!(
                "collection name '{collection}' must match [A-Za-z][A-Za-z0-9_]*"
            )));
        }
        if dimensions == 0 {
            return Err(MemoryError::invalid("dimensions must be > 0"));
        }

        let store = Self {
            pool,
            table: format!("{collection}_{dimensions}"),
            dimensions,
        };
        store
            .init_schema()
            .await
            .map_err(|e| e.during("open", store.table.clone()))?;
        Ok(store)
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn filter_scope(&self, filter: &ScopeFilter) -> String {
        format!("{} {}", self.table, filter.describe())
    }

    fn id_scope(&self, id: i64) -> String {
        format!("{} id={id}", self.table)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            backend: "sqlite",
            native_index: false,
            exact_search: true,
        }
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn insert(&self, memory: NewMemory) -> MemoryResult<Memory> {
        let scope = format!("{} user={}", self.table, memory.user_id);
        self.insert_row(memory)
            .await
            .map_err(|e| e.during("insert", scope))
    }

    async fn get(&self, id: i64) -> MemoryResult<Memory> {
        self.fetch_row(id)
            .await
            .map_err(|e| e.during("get", self.id_scope(id)))
    }

    async fn update(&self, id: i64, content: &str, embedding: &[f32]) -> MemoryResult<Memory> {
        self.update_row(id, content, embedding)
            .await
            .map_err(|e| e.during("update", self.id_scope(id)))
    }

    async fn delete(&self, id: i64) -> MemoryResult<()> {
        self.delete_row(id)
            .await
            .map_err(|e| e.during("delete", self.id_scope(id)))
    }

    async fn search(&self, query: &[f32], filter: &ScopeFilter) -> MemoryResult<Vec<Memory>> {
        self.search_rows(query, filter)
            .await
            .map_err(|e| e.during("search", self.filter_scope(filter)))
    }

    async fn get_all(&self, filter: &ScopeFilter) -> MemoryResult<Vec<Memory>> {
        self.list_rows(filter)
            .await
            .map_err(|e| e.during("get_all", self.filter_scope(filter)))
    }

    async fn delete_all(&self, filter: &ScopeFilter) -> MemoryResult<usize> {
        self.delete_rows(filter)
            .await
            .map_err(|e| e.during("delete_all", self.filter_scope(filter)))
    }

    async fn count(&self, filter: &ScopeFilter) -> MemoryResult<usize> {
        self.count_rows(filter)
            .await
            .map_err(|e| e.during("count", self.filter_scope(filter)))
    }

    async fn record_access(
        &self,
        id: i64,
        retention_strength: f64,
        accessed_at: DateTime<Utc>,
    ) -> MemoryResult<Memory> {
        self.record_access_row(id, retention_strength, accessed_at)
            .await
            .map_err(|e| e.during("record_access", self.id_scope(id)))
    }

    async fn reinforce(
        &self,
        id: i64,
        accessed_at: DateTime<Utc>,
        step: StrengthStep<'_>,
    ) -> MemoryResult<Reinforcement> {
        self.reinforce_row(id, accessed_at, step)
            .await
            .map_err(|e| e.during("reinforce", self.id_scope(id)))
    }

    async fn create_index(&self, config: &IndexConfig) -> MemoryResult<()> {
        tracing::debug!(
            table = %self.table,
            algorithm = ?config.algorithm,
            "sqlite backend scans exactly; create_index is a no-op"
        );
        Ok(())
    }
}

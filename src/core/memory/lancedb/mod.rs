mod batch;
mod conversions;
mod index;
mod query;

use super::memory_types::{
    IndexConfig, Memory, NewMemory, Reinforcement, ScopeFilter, StoreCapabilities,
};
use super::traits::{StrengthStep, VectorStore};
use crate::config::schema::is_valid_collection_name;
use crate::error::{MemoryError, MemoryResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use arrow_schema::SchemaRef;

use lancedb::Table;
use tokio::sync::{Mutex, OnceCell};

use std::path::{Path, PathBuf};
use std::sync::Arc;

struct LanceDbInner {
    db_dir: PathBuf,
    table_name: String,
    dimensions: usize,
    schema: SchemaRef,
    table: OnceCell<Table>,
}

impl LanceDbInner {
    async fn table(&self) -> MemoryResult<&Table> {
        self.table
            .get_or_try_init(|| async {
                let uri = self.db_dir.to_string_lossy().into_owned();
                let conn = lancedb::connect(&uri).execute().await.map_err(|e| {
                    MemoryError::BackendUnavailable(format!(
                        "failed to connect to LanceDB at {uri}: {e}"
                    ))
                })?;

                let table = match conn.open_table(&self.table_name).execute().await {
                    Ok(table) => table,
                    Err(_) => conn
                        .create_empty_table(&self.table_name, self.schema.clone())
                        .execute()
                        .await
                        .map_err(|e| {
                            MemoryError::BackendUnavailable(format!(
                                "failed to create LanceDB table {}: {e}",
                                self.table_name
                            ))
                        })?,
                };

                let existing = table.schema().await?;
                let stored_dims = batch::embedding_dimensions(&existing)?;
                if stored_dims != self.dimensions {
                    return Err(MemoryError::BackendUnavailable(format!(
                        "table {} stores {stored_dims}-dimensional embeddings, expected {}",
                        self.table_name, self.dimensions
                    )));
                }

                Ok(table)
            })
            .await
    }
}

/// LanceDB-backed vector store.
///
/// Nearest-neighbor search is delegated to LanceDB (exact until an index is
/// built, approximate afterwards). LanceDB has no multi-statement
/// transactions, so every read-check-write sequence runs behind `writer`,
/// which also caches the last assigned id.
pub struct LanceDbVectorStore {
    inner: Arc<LanceDbInner>,
    writer: Mutex<Option<i64>>,
}

impl LanceDbVectorStore {
    /// Open `<data_dir>/lancedb`, creating the collection table lazily.
    pub fn open(data_dir: &Path, collection: &str, dimensions: usize) -> MemoryResult<Self> {
        if !is_valid_collection_name(collection) {
            return Err(MemoryError::invalid(format!(
                "collection name '{collection}' must match [A-Za-z][A-Za-z0-9_]*"
            )));
        }
        let dims_i32 = i32::try_from(dimensions)
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| MemoryError::invalid(format!("invalid dimensions: {dimensions}")))?;

        let db_dir = data_dir.join("lancedb");
        std::fs::create_dir_all(&db_dir).map_err(|e| {
            MemoryError::BackendUnavailable(format!(
                "failed to create LanceDB dir {}: {e}",
                db_dir.display()
            ))
        })?;

        let schema = batch::memory_schema(dims_i32);

        Ok(Self {
            inner: Arc::new(LanceDbInner {
                db_dir,
                table_name: format!("{collection}_{dimensions}"),
                dimensions,
                schema,
                table: OnceCell::new(),
            }),
            writer: Mutex::new(None),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.inner.table_name
    }

    fn filter_scope(&self, filter: &ScopeFilter) -> String {
        format!("{} {}", self.inner.table_name, filter.describe())
    }

    fn id_scope(&self, id: i64) -> String {
        format!("{} id={id}", self.inner.table_name)
    }
}

#[async_trait]
impl VectorStore for LanceDbVectorStore {
    fn name(&self) -> &str {
        "lancedb"
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            backend: "lancedb",
            native_index: true,
            exact_search: false,
        }
    }

    async fn health_check(&self) -> bool {
        match self.inner.table().await {
            Ok(table) => table.count_rows(None).await.is_ok(),
            Err(_) => false,
        }
    }

    async fn insert(&self, memory: NewMemory) -> MemoryResult<Memory> {
        let scope = format!("{} user={}", self.inner.table_name, memory.user_id);
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
        self.count_matching(filter)
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
        self.build_vector_index(config)
            .await
            .map_err(|e| e.during("create_index", self.inner.table_name.clone()))
    }
}

use super::batch::{build_memory_batch, parse_memories};
use super::conversions::{id_eq, id_in, scope_predicate};
use super::LanceDbVectorStore;
use crate::core::memory::memory_types::{
    Memory, NewMemory, Reinforcement, ScopeFilter, store_now, validate_embedding,
    validate_strength,
};
use crate::core::memory::traits::StrengthStep;
use crate::core::memory::vector;
use crate::error::{MemoryError, MemoryResult};

use arrow_array::{Array, Int64Array, RecordBatchIterator};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};

const MEMORY_COLUMNS: [&str; 10] = [
    "id",
    "user_id",
    "agent_id",
    "content",
    "embedding",
    "metadata",
    "created_at",
    "updated_at",
    "retention_strength",
    "last_accessed_at",
];

const DELETE_CHUNK: usize = 512;

#[derive(Debug, Clone, Copy)]
enum WriteMode {
    Insert,
    Update,
}

impl LanceDbVectorStore {
    async fn write_rows(&self, rows: &[Memory], mode: WriteMode) -> MemoryResult<()> {
        let table = self.inner.table().await?;
        let batch = build_memory_batch(self.inner.schema.clone(), rows)?;

        let schema = batch.schema();
        let reader = RecordBatchIterator::new([Ok(batch)].into_iter(), schema);

        let mut merge_insert = table.merge_insert(&["id"]);
        match mode {
            WriteMode::Insert => {
                merge_insert.when_not_matched_insert_all();
            }
            WriteMode::Update => {
                merge_insert.when_matched_update_all(None);
            }
        }
        merge_insert.execute(Box::new(reader)).await?;
        Ok(())
    }

    /// Full scan of the rows the scope predicate selects, with metadata
    /// filters applied in-process. Checks cancellation between batches.
    async fn scan(&self, filter: &ScopeFilter, operation: &str) -> MemoryResult<Vec<Memory>> {
        let table = self.inner.table().await?;
        let mut query = table.query().select(Select::columns(&MEMORY_COLUMNS));
        if let Some(predicate) = scope_predicate(filter) {
            query = query.only_if(predicate);
        }

        let mut stream = query.execute().await?;
        let mut rows = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            filter.ensure_not_cancelled(operation)?;
            rows.extend(
                parse_memories(&batch)?
                    .into_iter()
                    .filter(|m| filter.matches_metadata(&m.metadata)),
            );
        }
        Ok(rows)
    }

    async fn max_id(&self) -> MemoryResult<i64> {
        let table = self.inner.table().await?;
        let mut stream = table
            .query()
            .select(Select::columns(&["id"]))
            .execute()
            .await?;

        let mut max = 0_i64;
        while let Some(batch) = stream.try_next().await? {
            let ids = batch
                .column_by_name("id")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| MemoryError::Serialization("missing id column".into()))?;
            for i in 0..ids.len() {
                max = max.max(ids.value(i));
            }
        }
        Ok(max)
    }

    async fn id_exists(&self, id: i64) -> MemoryResult<bool> {
        let table = self.inner.table().await?;
        Ok(table.count_rows(Some(id_eq(id))).await? > 0)
    }

    async fn nearest(
        &self,
        query: &[f32],
        filter: &ScopeFilter,
        k: usize,
    ) -> MemoryResult<Vec<Memory>> {
        let table = self.inner.table().await?;
        let mut vector_query = table
            .query()
            .nearest_to(query)?
            .column("embedding")
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k)
            .select(Select::columns(&MEMORY_COLUMNS));
        if let Some(predicate) = scope_predicate(filter) {
            vector_query = vector_query.only_if(predicate);
        }

        let mut stream = vector_query.execute().await?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            filter.ensure_not_cancelled("search")?;
            hits.extend(
                parse_memories(&batch)?
                    .into_iter()
                    .filter(|m| filter.matches_metadata(&m.metadata)),
            );
        }
        // `_distance` is quantized once an index exists; score from the vectors.
        for hit in &mut hits {
            hit.score = Some(vector::cosine_similarity(query, &hit.embedding));
        }
        hits.sort_by(vector::rank_order);
        Ok(hits)
    }

    pub(super) async fn insert_row(&self, memory: NewMemory) -> MemoryResult<Memory> {
        memory.validate(self.inner.dimensions)?;

        let explicit = memory.id.is_some();
        let mut last_id = self.writer.lock().await;
        let id = match memory.id {
            Some(id) => {
                if self.id_exists(id).await? {
                    return Err(MemoryError::ConflictingId { id });
                }
                id
            }
            None => {
                let current = match *last_id {
                    Some(current) => current,
                    None => self.max_id().await?,
                };
                current
                    .checked_add(1)
                    .ok_or_else(|| MemoryError::BackendUnavailable("id space exhausted".into()))?
            }
        };

        let row = memory.into_memory(id, store_now());
        self.write_rows(std::slice::from_ref(&row), WriteMode::Insert)
            .await?;

        *last_id = match *last_id {
            Some(previous) => Some(previous.max(id)),
            None if !explicit => Some(id),
            None => None,
        };
        tracing::debug!(table = %self.inner.table_name, id, "memory inserted");
        Ok(row)
    }

    pub(super) async fn fetch_row(&self, id: i64) -> MemoryResult<Memory> {
        let table = self.inner.table().await?;
        let mut stream = table
            .query()
            .only_if(id_eq(id))
            .limit(1)
            .select(Select::columns(&MEMORY_COLUMNS))
            .execute()
            .await?;

        while let Some(batch) = stream.try_next().await? {
            if let Some(row) = parse_memories(&batch)?.into_iter().next() {
                return Ok(row);
            }
        }
        Err(MemoryError::NotFound { id })
    }

    pub(super) async fn update_row(
        &self,
        id: i64,
        content: &str,
        embedding: &[f32],
    ) -> MemoryResult<Memory> {
        if content.trim().is_empty() {
            return Err(MemoryError::invalid("content must not be empty"));
        }
        validate_embedding(embedding, self.inner.dimensions)?;

        let _guard = self.writer.lock().await;
        let mut row = self.fetch_row(id).await?;
        row.content = content.to_string();
        row.embedding = embedding.to_vec();
        row.updated_at = store_now();
        self.write_rows(std::slice::from_ref(&row), WriteMode::Update)
            .await?;
        Ok(row)
    }

    pub(super) async fn record_access_row(
        &self,
        id: i64,
        retention_strength: f64,
        accessed_at: DateTime<Utc>,
    ) -> MemoryResult<Memory> {
        validate_strength(retention_strength)?;

        let _guard = self.writer.lock().await;
        let mut row = self.fetch_row(id).await?;
        row.retention_strength = retention_strength;
        row.last_accessed_at = Some(accessed_at);
        self.write_rows(std::slice::from_ref(&row), WriteMode::Update)
            .await?;
        Ok(row)
    }

    pub(super) async fn reinforce_row(
        &self,
        id: i64,
        accessed_at: DateTime<Utc>,
        step: StrengthStep<'_>,
    ) -> MemoryResult<Reinforcement> {
        let _guard = self.writer.lock().await;
        let previous = self.fetch_row(id).await?;
        let strength = step(&previous);
        validate_strength(strength)?;

        let mut row = previous.clone();
        row.retention_strength = strength;
        row.last_accessed_at = Some(accessed_at);
        self.write_rows(std::slice::from_ref(&row), WriteMode::Update)
            .await?;
        Ok(Reinforcement {
            previous,
            memory: row,
        })
    }

    pub(super) async fn delete_row(&self, id: i64) -> MemoryResult<()> {
        let _guard = self.writer.lock().await;
        if !self.id_exists(id).await? {
            return Err(MemoryError::NotFound { id });
        }
        let table = self.inner.table().await?;
        table.delete(&id_eq(id)).await?;
        Ok(())
    }

    pub(super) async fn search_rows(
        &self,
        query: &[f32],
        filter: &ScopeFilter,
    ) -> MemoryResult<Vec<Memory>> {
        validate_embedding(query, self.inner.dimensions)?;
        filter.validate()?;
        filter.ensure_not_cancelled("search")?;
        if filter.limit == 0 {
            return Ok(Vec::new());
        }

        let table = self.inner.table().await?;
        let in_scope = table.count_rows(scope_predicate(filter)).await?;
        if in_scope == 0 {
            return Ok(Vec::new());
        }

        // Metadata filters run after the vector query, so it has to see the
        // whole scope. Otherwise one extra hit tells whether the cut falls
        // inside a run of equal scores.
        let mut hits = if filter.filters.is_empty() {
            let probe = filter.limit.saturating_add(1).min(in_scope);
            let hits = self.nearest(query, filter, probe).await?;
            if hits.len() > filter.limit
                && hits[filter.limit].score == hits[filter.limit - 1].score
            {
                self.nearest(query, filter, in_scope).await?
            } else {
                hits
            }
        } else {
            self.nearest(query, filter, in_scope).await?
        };

        hits.truncate(filter.limit);
        Ok(hits)
    }

    pub(super) async fn list_rows(&self, filter: &ScopeFilter) -> MemoryResult<Vec<Memory>> {
        filter.validate()?;
        filter.ensure_not_cancelled("get_all")?;
        if filter.limit == 0 {
            return Ok(Vec::new());
        }

        let mut rows = self.scan(filter, "get_all").await?;
        rows.sort_by(vector::recency_order);
        Ok(rows
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }

    pub(super) async fn delete_rows(&self, filter: &ScopeFilter) -> MemoryResult<usize> {
        filter.validate()?;
        filter.ensure_not_cancelled("delete_all")?;

        let _guard = self.writer.lock().await;
        let table = self.inner.table().await?;
        let predicate = scope_predicate(filter);

        if filter.filters.is_empty() {
            let matched = table.count_rows(predicate.clone()).await?;
            if matched > 0 {
                table.delete(predicate.as_deref().unwrap_or("true")).await?;
            }
            tracing::debug!(
                table = %self.inner.table_name,
                removed = matched,
                scope = %filter.describe(),
                "memories deleted"
            );
            return Ok(matched);
        }

        let ids: Vec<i64> = self
            .scan(filter, "delete_all")
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();
        for chunk in ids.chunks(DELETE_CHUNK) {
            filter.ensure_not_cancelled("delete_all")?;
            table.delete(&id_in(chunk)).await?;
        }
        tracing::debug!(
            table = %self.inner.table_name,
            removed = ids.len(),
            scope = %filter.describe(),
            "memories deleted"
        );
        Ok(ids.len())
    }

    pub(super) async fn count_matching(&self, filter: &ScopeFilter) -> MemoryResult<usize> {
        filter.validate()?;
        if filter.filters.is_empty() {
            let table = self.inner.table().await?;
            return Ok(table.count_rows(scope_predicate(filter)).await?);
        }
        Ok(self.scan(filter, "count").await?.len())
    }
}

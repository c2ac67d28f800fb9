use super::SqliteVectorStore;
use super::codec::{COLUMNS, map_memory_row};
use crate::core::memory::memory_types::{
    Memory, NewMemory, Reinforcement, encode_metadata, format_timestamp, store_now,
    validate_embedding, validate_strength,
};
use crate::core::memory::traits::StrengthStep;
use crate::core::memory::vector;
use crate::error::{MemoryError, MemoryResult};
use chrono::{DateTime, Utc};

/// Compare-and-set rounds before a contended reinforcement gives up.
const REINFORCE_ATTEMPTS: usize = 32;

impl SqliteVectorStore {
    pub(super) async fn insert_row(&self, memory: NewMemory) -> MemoryResult<Memory> {
        memory.validate(self.dimensions)?;

        let now = store_now();
        let timestamp = format_timestamp(now);
        let metadata = encode_metadata(&memory.metadata)?;
        let blob = vector::vec_to_bytes(&memory.embedding);

        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(&format!(
            "INSERT INTO {} (id, user_id, agent_id, content, embedding, metadata,
                             created_at, updated_at, retention_strength, last_accessed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8, NULL)
             RETURNING id",
            self.table
        ))
        .bind(memory.id)
        .bind(&memory.user_id)
        .bind(memory.agent_id.as_deref())
        .bind(&memory.content)
        .bind(blob)
        .bind(metadata)
        .bind(&timestamp)
        .bind(memory.retention_strength)
        .fetch_one(&self.pool)
        .await;

        let (id,) = match result {
            Ok(row) => row,
            Err(sqlx::Error::Database(db))
                if db.is_unique_violation() || db.message().contains("UNIQUE constraint") =>
            {
                return Err(MemoryError::ConflictingId {
                    id: memory.id.unwrap_or_default(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(table = %self.table, id, "memory inserted");
        Ok(memory.into_memory(id, now))
    }

    pub(super) async fn fetch_row(&self, id: i64) -> MemoryResult<Memory> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM {} WHERE id = $1", self.table))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => map_memory_row(&row),
            None => Err(MemoryError::NotFound { id }),
        }
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
        validate_embedding(embedding, self.dimensions)?;

        let row = sqlx::query(&format!(
            "UPDATE {}
             SET content = $1, embedding = $2, updated_at = $3
             WHERE id = $4
             RETURNING {COLUMNS}",
            self.table
        ))
        .bind(content)
        .bind(vector::vec_to_bytes(embedding))
        .bind(format_timestamp(store_now()))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => map_memory_row(&row),
            None => Err(MemoryError::NotFound { id }),
        }
    }

    pub(super) async fn record_access_row(
        &self,
        id: i64,
        retention_strength: f64,
        accessed_at: DateTime<Utc>,
    ) -> MemoryResult<Memory> {
        validate_strength(retention_strength)?;

        let row = sqlx::query(&format!(
            "UPDATE {}
             SET retention_strength = $1, last_accessed_at = $2
             WHERE id = $3
             RETURNING {COLUMNS}",
            self.table
        ))
        .bind(retention_strength)
        .bind(format_timestamp(accessed_at))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => map_memory_row(&row),
            None => Err(MemoryError::NotFound { id }),
        }
    }

    /// Optimistic read-modify-write: the UPDATE only lands if strength and
    /// last access are still what `step` saw, otherwise re-read and retry.
    pub(super) async fn reinforce_row(
        &self,
        id: i64,
        accessed_at: DateTime<Utc>,
        step: StrengthStep<'_>,
    ) -> MemoryResult<Reinforcement> {
        for _ in 0..REINFORCE_ATTEMPTS {
            let previous = self.fetch_row(id).await?;
            let strength = step(&previous);
            validate_strength(strength)?;

            let row = sqlx::query(&format!(
                "UPDATE {}
                 SET retention_strength = $1, last_accessed_at = $2
                 WHERE id = $3 AND retention_strength = $4 AND last_accessed_at IS $5
                 RETURNING {COLUMNS}",
                self.table
            ))
            .bind(strength)
            .bind(format_timestamp(accessed_at))
            .bind(id)
            .bind(previous.retention_strength)
            .bind(previous.last_accessed_at.map(format_timestamp))
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                return Ok(Reinforcement {
                    previous,
                    memory: map_memory_row(&row)?,
                });
            }
            tracing::debug!(table = %self.table, id, "reinforcement raced another access; retrying");
        }
        Err(MemoryError::BackendUnavailable(format!(
            "memory {id} kept changing during reinforcement"
        )))
    }

    pub(super) async fn delete_row(&self, id: i64) -> MemoryResult<()> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", self.table))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MemoryError::NotFound { id });
        }
        Ok(())
    }
}

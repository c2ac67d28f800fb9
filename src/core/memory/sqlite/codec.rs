use crate::core::memory::memory_types::{Memory, decode_metadata, parse_timestamp};
use crate::core::memory::vector;
use crate::error::MemoryResult;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

pub(super) const COLUMNS: &str = "id, user_id, agent_id, content, embedding, metadata, \
created_at, updated_at, retention_strength, last_accessed_at";

pub(super) fn map_memory_row(row: &SqliteRow) -> MemoryResult<Memory> {
    let blob: Vec<u8> = row.try_get("embedding")?;
    let metadata_raw: String = row.try_get("metadata")?;
    let created_raw: String = row.try_get("created_at")?;
    let updated_raw: String = row.try_get("updated_at")?;
    let accessed_raw: Option<String> = row.try_get("last_accessed_at")?;

    Ok(Memory {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        agent_id: row.try_get("agent_id")?,
        content: row.try_get("content")?,
        embedding: vector::bytes_to_vec(&blob)?,
        metadata: decode_metadata(&metadata_raw)?,
        created_at: parse_timestamp(&created_raw)?,
        updated_at: parse_timestamp(&updated_raw)?,
        retention_strength: row.try_get("retention_strength")?,
        last_accessed_at: accessed_raw.as_deref().map(parse_timestamp).transpose()?,
        score: None,
    })
}

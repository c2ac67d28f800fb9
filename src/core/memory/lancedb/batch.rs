use crate::core::memory::memory_types::{
    Memory, decode_metadata, encode_metadata, format_timestamp, parse_timestamp,
};
use crate::error::{MemoryError, MemoryResult};

use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Float64Array, Int64Array, RecordBatch, StringArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};

use std::sync::Arc;

pub(super) fn memory_schema(dims: i32) -> SchemaRef {
    let embedding_field = Field::new("item", DataType::Float32, true);
    let embedding_dt = DataType::FixedSizeList(Arc::new(embedding_field), dims);
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("user_id", DataType::Utf8, false),
        Field::new("agent_id", DataType::Utf8, true),
        Field::new("content", DataType::Utf8, false),
        Field::new("embedding", embedding_dt, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
        Field::new("updated_at", DataType::Utf8, false),
        Field::new("retention_strength", DataType::Float64, false),
        Field::new("last_accessed_at", DataType::Utf8, true),
    ]))
}

pub(super) fn embedding_dimensions(schema: &Schema) -> MemoryResult<usize> {
    match schema.field_with_name("embedding")?.data_type() {
        DataType::FixedSizeList(_, n) => usize::try_from(*n).map_err(|_| {
            MemoryError::Serialization(format!("invalid embedding dimension in schema: {n}"))
        }),
        other => Err(MemoryError::Serialization(format!(
            "unexpected embedding type in schema: {other:?}"
        ))),
    }
}

pub(super) fn build_memory_batch(schema: SchemaRef, rows: &[Memory]) -> MemoryResult<RecordBatch> {
    let dims = embedding_dimensions(&schema)?;
    let dims_i32 = i32::try_from(dims)
        .map_err(|_| MemoryError::Serialization(format!("invalid embedding dimension: {dims}")))?;

    let mut metadata = Vec::with_capacity(rows.len());
    for row in rows {
        metadata.push(encode_metadata(&row.metadata)?);
    }

    let id = Arc::new(Int64Array::from(
        rows.iter().map(|r| r.id).collect::<Vec<_>>(),
    ));
    let user_id = Arc::new(StringArray::from(
        rows.iter().map(|r| Some(r.user_id.as_str())).collect::<Vec<_>>(),
    ));
    let agent_id = Arc::new(StringArray::from(
        rows.iter().map(|r| r.agent_id.as_deref()).collect::<Vec<_>>(),
    ));
    let content = Arc::new(StringArray::from(
        rows.iter().map(|r| Some(r.content.as_str())).collect::<Vec<_>>(),
    ));
    let metadata = Arc::new(StringArray::from(
        metadata.iter().map(|m| Some(m.as_str())).collect::<Vec<_>>(),
    ));
    let created_at = Arc::new(StringArray::from(
        rows.iter()
            .map(|r| Some(format_timestamp(r.created_at)))
            .collect::<Vec<_>>(),
    ));
    let updated_at = Arc::new(StringArray::from(
        rows.iter()
            .map(|r| Some(format_timestamp(r.updated_at)))
            .collect::<Vec<_>>(),
    ));
    let strength = Arc::new(Float64Array::from(
        rows.iter().map(|r| r.retention_strength).collect::<Vec<_>>(),
    ));
    let last_accessed_at = Arc::new(StringArray::from(
        rows.iter()
            .map(|r| r.last_accessed_at.map(format_timestamp))
            .collect::<Vec<_>>(),
    ));

    let mut emb_builder = FixedSizeListBuilder::new(Float32Builder::new(), dims_i32);
    for row in rows {
        if row.embedding.len() != dims {
            return Err(MemoryError::invalid(format!(
                "embedding dimension mismatch: got {}, expected {dims}",
                row.embedding.len()
            )));
        }
        emb_builder.values().append_slice(&row.embedding);
        emb_builder.append(true);
    }
    let embedding = Arc::new(emb_builder.finish());

    let cols: Vec<Arc<dyn Array>> = vec![
        id,
        user_id,
        agent_id,
        content,
        embedding,
        metadata,
        created_at,
        updated_at,
        strength,
        last_accessed_at,
    ];
    Ok(RecordBatch::try_new(schema, cols)?)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> MemoryResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| MemoryError::Serialization(format!("missing string column '{name}'")))
}

fn optional_string(column: &StringArray, row: usize) -> Option<String> {
    if column.is_null(row) {
        None
    } else {
        Some(column.value(row).to_string())
    }
}

/// Decode every row of `batch`. Search scores are filled in by the caller.
pub(super) fn parse_memories(batch: &RecordBatch) -> MemoryResult<Vec<Memory>> {
    let id = batch
        .column_by_name("id")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| MemoryError::Serialization("missing id column".into()))?;
    let user_id = string_column(batch, "user_id")?;
    let agent_id = string_column(batch, "agent_id")?;
    let content = string_column(batch, "content")?;
    let metadata = string_column(batch, "metadata")?;
    let created_at = string_column(batch, "created_at")?;
    let updated_at = string_column(batch, "updated_at")?;
    let last_accessed_at = string_column(batch, "last_accessed_at")?;
    let strength = batch
        .column_by_name("retention_strength")
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| MemoryError::Serialization("missing retention_strength column".into()))?;
    let embedding = batch
        .column_by_name("embedding")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| MemoryError::Serialization("missing embedding column".into()))?;

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let values = embedding.value(i);
        let vector = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| MemoryError::Serialization("embedding items are not f32".into()))?
            .values()
            .to_vec();

        out.push(Memory {
            id: id.value(i),
            user_id: user_id.value(i).to_string(),
            agent_id: optional_string(agent_id, i),
            content: content.value(i).to_string(),
            embedding: vector,
            metadata: decode_metadata(metadata.value(i))?,
            created_at: parse_timestamp(created_at.value(i))?,
            updated_at: parse_timestamp(updated_at.value(i))?,
            retention_strength: strength.value(i),
            last_accessed_at: optional_string(last_accessed_at, i)
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            score: None,
        });
    }
    Ok(out)
}

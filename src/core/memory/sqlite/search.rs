use super::SqliteVectorStore;
use super::codec::{COLUMNS, map_memory_row};
use crate::core::memory::memory_types::{Memory, ScopeFilter, validate_embedding};
use crate::core::memory::vector;
use crate::error::MemoryResult;
use futures_util::TryStreamExt;
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite};

/// Append `WHERE ...` for the scope and metadata equality filters.
///
/// Metadata keys are validated to `[A-Za-z0-9_-]`, but the JSON path is still
/// bound as a parameter.
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ScopeFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(user) = &filter.user_id {
        qb.push(" AND user_id = ").push_bind(user.clone());
    }
    if let Some(agent) = &filter.agent_id {
        qb.push(" AND agent_id = ").push_bind(agent.clone());
    } else if filter.requires_no_agent() {
        qb.push(" AND agent_id IS NULL");
    }
    for (key, expected) in &filter.filters {
        let path = format!("$.\"{key}\"");
        match expected {
            Value::Null => {
                qb.push(" AND (json_type(metadata, ")
                    .push_bind(path.clone())
                    .push(") IS NULL OR json_type(metadata, ")
                    .push_bind(path)
                    .push(") = 'null')");
            }
            Value::Bool(flag) => {
                qb.push(" AND json_type(metadata, ")
                    .push_bind(path)
                    .push(if *flag { ") = 'true'" } else { ") = 'false'" });
            }
            Value::Number(number) => {
                qb.push(" AND json_type(metadata, ")
                    .push_bind(path.clone())
                    .push(") IN ('integer', 'real') AND json_extract(metadata, ")
                    .push_bind(path)
                    .push(") = ")
                    .push_bind(number.as_f64().unwrap_or(f64::NAN));
            }
            Value::String(text) => {
                qb.push(" AND json_type(metadata, ")
                    .push_bind(path.clone())
                    .push(") = 'text' AND json_extract(metadata, ")
                    .push_bind(path)
                    .push(") = ")
                    .push_bind(text.clone());
            }
            Value::Array(_) | Value::Object(_) => {
                qb.push(" AND 0");
            }
        }
    }
}

fn as_sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl SqliteVectorStore {
    pub(super) async fn search_rows(
        &self,
        query: &[f32],
        filter: &ScopeFilter,
    ) -> MemoryResult<Vec<Memory>> {
        validate_embedding(query, self.dimensions)?;
        filter.validate()?;
        filter.ensure_not_cancelled("search")?;
        if filter.limit == 0 {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM {}", self.table));
        push_filter(&mut qb, filter);

        let mut scored: Vec<Memory> = Vec::new();
        let mut rows = qb.build().fetch(&self.pool);
        while let Some(row) = rows.try_next().await? {
            filter.ensure_not_cancelled("search")?;
            let mut memory = map_memory_row(&row)?;
            memory.score = Some(vector::cosine_similarity(query, &memory.embedding));
            scored.push(memory);
        }

        scored.sort_by(vector::rank_order);
        scored.truncate(filter.limit);
        Ok(scored)
    }

    pub(super) async fn list_rows(&self, filter: &ScopeFilter) -> MemoryResult<Vec<Memory>> {
        filter.validate()?;
        filter.ensure_not_cancelled("get_all")?;
        if filter.limit == 0 {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM {}", self.table));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(as_sql_int(filter.limit))
            .push(" OFFSET ")
            .push_bind(as_sql_int(filter.offset));

        let mut listed = Vec::new();
        let mut rows = qb.build().fetch(&self.pool);
        while let Some(row) = rows.try_next().await? {
            filter.ensure_not_cancelled("get_all")?;
            listed.push(map_memory_row(&row)?);
        }
        Ok(listed)
    }

    pub(super) async fn delete_rows(&self, filter: &ScopeFilter) -> MemoryResult<usize> {
        filter.validate()?;
        filter.ensure_not_cancelled("delete_all")?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {}", self.table));
        push_filter(&mut qb, filter);
        let result = qb.build().execute(&self.pool).await?;

        let removed = usize::try_from(result.rows_affected()).unwrap_or(usize::MAX);
        tracing::debug!(table = %self.table, removed, scope = %filter.describe(), "memories deleted");
        Ok(removed)
    }

    pub(super) async fn count_rows(&self, filter: &ScopeFilter) -> MemoryResult<usize> {
        filter.validate()?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", self.table));
        push_filter(&mut qb, filter);
        let (count,): (i64,) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

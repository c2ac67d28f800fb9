use super::SqliteVectorStore;
use crate::error::{MemoryError, MemoryResult};

const SCHEMA_META_TABLE: &str = "
CREATE TABLE IF NOT EXISTS memoria_schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";
const SCHEMA_VERSION_KEY: &str = "schema_version";
const SCHEMA_VERSION: u32 = 1;

impl SqliteVectorStore {
    pub(super) async fn init_schema(&self) -> MemoryResult<()> {
        self.ensure_schema_version().await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id            TEXT NOT NULL,
                agent_id           TEXT,
                content            TEXT NOT NULL,
                embedding          BLOB NOT NULL,
                metadata           TEXT NOT NULL DEFAULT '{{}}',
                created_at         TEXT NOT NULL,
                updated_at         TEXT NOT NULL,
                retention_strength REAL NOT NULL DEFAULT 1.0,
                last_accessed_at   TEXT
            )",
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_scope
                 ON {table}(user_id, agent_id, created_at DESC)",
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ensure_schema_version(&self) -> MemoryResult<()> {
        sqlx::query(SCHEMA_META_TABLE).execute(&self.pool).await?;

        let stored: Option<(String,)> =
            sqlx::query_as("SELECT value FROM memoria_schema_meta WHERE key = $1")
                .bind(SCHEMA_VERSION_KEY)
                .fetch_optional(&self.pool)
                .await?;

        if let Some((value,)) = stored {
            let parsed = value.parse::<u32>().map_err(|_| {
                MemoryError::Serialization(format!("invalid schema version value: {value}"))
            })?;
            if parsed != SCHEMA_VERSION {
                return Err(MemoryError::BackendUnavailable(format!(
                    "incompatible schema version: stored={parsed}, expected={SCHEMA_VERSION}"
                )));
            }
            return Ok(());
        }

        sqlx::query("INSERT INTO memoria_schema_meta (key, value) VALUES ($1, $2)")
            .bind(SCHEMA_VERSION_KEY)
            .bind(SCHEMA_VERSION.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

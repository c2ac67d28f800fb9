use crate::config::StoreConfig;

#[cfg(feature = "vector-search")]
use super::LanceDbVectorStore;
use super::{SqliteVectorStore, VectorStore};

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

/// Open the backend named by `config.backend` under `data_dir`.
pub async fn create_vector_store(
    config: &StoreConfig,
    data_dir: &Path,
) -> anyhow::Result<Arc<dyn VectorStore>> {
    config.validate()?;

    let store: Arc<dyn VectorStore> = match config.backend.as_str() {
        "sqlite" => Arc::new(
            SqliteVectorStore::open(
                data_dir,
                &config.collection,
                config.dimensions,
                config.max_connections,
            )
            .await
            .context("failed to open sqlite vector store")?,
        ),
        #[cfg(feature = "vector-search")]
        "lancedb" => Arc::new(
            LanceDbVectorStore::open(data_dir, &config.collection, config.dimensions)
                .context("failed to open lancedb vector store")?,
        ),
        #[cfg(not(feature = "vector-search"))]
        "lancedb" => anyhow::bail!("backend 'lancedb' requires the 'vector-search' feature"),
        other => anyhow::bail!("unknown memory backend '{other}' (expected sqlite or lancedb)"),
    };

    tracing::debug!(
        backend = store.name(),
        table = %config.table_name(),
        dir = %data_dir.display(),
        "vector store opened"
    );
    Ok(store)
}

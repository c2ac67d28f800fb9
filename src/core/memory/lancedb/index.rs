use super::LanceDbVectorStore;
use crate::core::memory::memory_types::{DistanceMetric, IndexAlgorithm, IndexConfig};
use crate::error::MemoryResult;

use lancedb::DistanceType;
use lancedb::index::Index;
use lancedb::index::vector::{IvfHnswPqIndexBuilder, IvfHnswSqIndexBuilder, IvfPqIndexBuilder};

fn distance_type(metric: DistanceMetric) -> DistanceType {
    match metric {
        DistanceMetric::Cosine => DistanceType::Cosine,
        DistanceMetric::L2 => DistanceType::L2,
        DistanceMetric::Dot => DistanceType::Dot,
    }
}

fn ivf_pq(config: &IndexConfig) -> IvfPqIndexBuilder {
    let mut builder = IvfPqIndexBuilder::default().distance_type(distance_type(config.metric));
    if let Some(n) = config.num_partitions {
        builder = builder.num_partitions(n);
    }
    if let Some(n) = config.num_sub_vectors {
        builder = builder.num_sub_vectors(n);
    }
    builder
}

fn ivf_hnsw_sq(config: &IndexConfig) -> IvfHnswSqIndexBuilder {
    let mut builder = IvfHnswSqIndexBuilder::default().distance_type(distance_type(config.metric));
    if let Some(n) = config.num_partitions {
        builder = builder.num_partitions(n);
    }
    if let Some(m) = config.num_edges {
        builder = builder.num_edges(m);
    }
    if let Some(ef) = config.ef_construction {
        builder = builder.ef_construction(ef);
    }
    builder
}

fn ivf_hnsw_pq(config: &IndexConfig) -> IvfHnswPqIndexBuilder {
    let mut builder = IvfHnswPqIndexBuilder::default().distance_type(distance_type(config.metric));
    if let Some(n) = config.num_partitions {
        builder = builder.num_partitions(n);
    }
    if let Some(n) = config.num_sub_vectors {
        builder = builder.num_sub_vectors(n);
    }
    if let Some(m) = config.num_edges {
        builder = builder.num_edges(m);
    }
    if let Some(ef) = config.ef_construction {
        builder = builder.ef_construction(ef);
    }
    builder
}

/// `Auto` resolves to IVF-PQ so the requested metric is always honored.
fn vector_index(config: &IndexConfig) -> Index {
    match config.algorithm {
        IndexAlgorithm::Auto | IndexAlgorithm::IvfPq => Index::IvfPq(ivf_pq(config)),
        IndexAlgorithm::IvfHnswSq => Index::IvfHnswSq(ivf_hnsw_sq(config)),
        IndexAlgorithm::IvfHnswPq => Index::IvfHnswPq(ivf_hnsw_pq(config)),
    }
}

impl LanceDbVectorStore {
    pub(super) async fn has_vector_index(&self) -> MemoryResult<bool> {
        let table = self.inner.table().await?;
        let indices = table.list_indices().await?;
        Ok(indices
            .iter()
            .any(|index| index.columns.iter().any(|column| column == "embedding")))
    }

    pub(super) async fn build_vector_index(&self, config: &IndexConfig) -> MemoryResult<()> {
        let _guard = self.writer.lock().await;
        if self.has_vector_index().await? {
            tracing::debug!(table = %self.inner.table_name, "vector index already exists");
            return Ok(());
        }
        if config.metric != DistanceMetric::Cosine {
            tracing::warn!(
                table = %self.inner.table_name,
                metric = ?config.metric,
                "search ranks by cosine similarity; this index will not accelerate it"
            );
        }

        let table = self.inner.table().await?;
        table
            .create_index(&["embedding"], vector_index(config))
            .execute()
            .await?;

        tracing::info!(
            table = %self.inner.table_name,
            algorithm = ?config.algorithm,
            metric = ?config.metric,
            "vector index created"
        );
        Ok(())
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use memoria::config::{DedupConfig, RetentionConfig};
use memoria::core::memory::{
    AddRequest, EmbeddingProvider, EngineConfig, HashEmbedding, IndexConfig, Memory,
    MemoryEngine, NewMemory, ReinforcePolicy, Reinforcement, ScopeFilter, StoreCapabilities,
    StrengthStep, VectorStore, create_vector_store,
};
use memoria::error::{ErrorKind, MemoryResult};

use super::memory_harness::{DIMS, all_backends, axis, store_config};

#[tokio::test]
async fn memories_survive_reopening_the_store() {
    for backend in ["sqlite", "lancedb"] {
        if backend == "lancedb" && !cfg!(feature = "vector-search") {
            continue;
        }
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedding::new(DIMS);

        let id = {
            let store = create_vector_store(&store_config(backend), dir.path())
                .await
                .unwrap();
            let engine = MemoryEngine::new(store, EngineConfig::default()).unwrap();
            let embedding = embedder.embed("walks the dog at seven").await.unwrap();
            engine
                .add(AddRequest::new("alice", "walks the dog at seven", embedding))
                .await
                .unwrap()
                .memory
                .id
        };

        let store = create_vector_store(&store_config(backend), dir.path())
            .await
            .unwrap();
        let engine = MemoryEngine::new(store, EngineConfig::default()).unwrap();
        let query = embedder.embed("walks the dog at seven").await.unwrap();
        let hits = engine
            .search(&query, &ScopeFilter::for_user("alice"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1, "{backend}");
        assert_eq!(hits[0].memory.id, id);
        assert!((hits[0].memory.score.unwrap() - 1.0).abs() < 1e-4);

        let embedding = embedder.embed("owns a red bike").await.unwrap();
        let next = engine
            .add(AddRequest::new("alice", "owns a red bike", embedding))
            .await
            .unwrap();
        assert!(next.memory.id > id, "{backend}");
    }
}

#[tokio::test]
async fn every_read_search_reinforces_hits() {
    for backend in all_backends().await {
        let config = EngineConfig {
            retention: RetentionConfig {
                reinforce_on: ReinforcePolicy::EveryRead,
                ..RetentionConfig::default()
            },
            ..EngineConfig::default()
        };
        let engine = backend.engine(config);
        let added = engine
            .add(AddRequest::new("alice", "likes tea", axis()))
            .await
            .unwrap();
        backend
            .store
            .record_access(added.memory.id, 0.3, Utc::now() - chrono::Duration::hours(2))
            .await
            .unwrap();

        let hits = engine
            .search(&axis(), &ScopeFilter::for_user("alice"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].memory.score.is_some(), "{}", backend.name);
        let stored = backend.store.get(added.memory.id).await.unwrap();
        assert!(stored.retention_strength > 0.3, "{}", backend.name);
    }
}

#[tokio::test]
async fn listing_reports_decayed_strength() {
    for backend in all_backends().await {
        let engine = backend.engine(EngineConfig {
            dedup: DedupConfig {
                enabled: false,
                ..DedupConfig::default()
            },
            ..EngineConfig::default()
        });
        let old = engine
            .add(AddRequest::new("alice", "old", axis()))
            .await
            .unwrap();
        engine
            .add(AddRequest::new("alice", "new", axis()))
            .await
            .unwrap();
        backend
            .store
            .record_access(old.memory.id, 1.0, Utc::now() - chrono::Duration::days(7))
            .await
            .unwrap();

        let listed = engine.get_all(&ScopeFilter::for_user("alice")).await.unwrap();
        assert_eq!(listed[0].memory.content, "new", "{}", backend.name);
        assert!(listed[0].current_strength > 0.99);
        assert!(listed[1].current_strength < 0.5);

        let stale = engine
            .stale_memories(&ScopeFilter::for_user("alice"), 0.5)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].memory.id, old.memory.id);
    }
}

#[tokio::test]
async fn concurrent_marks_each_count_once() {
    for backend in all_backends().await {
        let engine = Arc::new(backend.engine(EngineConfig::default()));
        let added = engine
            .add(AddRequest::new("alice", "likes tea", axis()))
            .await
            .unwrap();
        let id = added.memory.id;
        backend
            .store
            .record_access(id, 0.2, Utc::now())
            .await
            .unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.mark_used(id).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Eight steps of s + 0.2 * (1 - s) from 0.2.
        let expected = 1.0 - 0.8 * 0.8_f64.powi(8);
        let stored = backend.store.get(id).await.unwrap();
        assert!(
            (stored.retention_strength - expected).abs() < 1e-3,
            "{}: {} != {expected}",
            backend.name,
            stored.retention_strength
        );
    }
}

/// Wraps a store and stalls every search.
struct StallingStore {
    inner: Arc<dyn VectorStore>,
    delay: Duration,
}

#[async_trait]
impl VectorStore for StallingStore {
    fn name(&self) -> &str {
        "stalling"
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.inner.capabilities()
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }

    async fn insert(&self, memory: NewMemory) -> MemoryResult<Memory> {
        self.inner.insert(memory).await
    }

    async fn get(&self, id: i64) -> MemoryResult<Memory> {
        self.inner.get(id).await
    }

    async fn update(&self, id: i64, content: &str, embedding: &[f32]) -> MemoryResult<Memory> {
        self.inner.update(id, content, embedding).await
    }

    async fn delete(&self, id: i64) -> MemoryResult<()> {
        self.inner.delete(id).await
    }

    async fn search(&self, query: &[f32], filter: &ScopeFilter) -> MemoryResult<Vec<Memory>> {
        tokio::time::sleep(self.delay).await;
        self.inner.search(query, filter).await
    }

    async fn get_all(&self, filter: &ScopeFilter) -> MemoryResult<Vec<Memory>> {
        self.inner.get_all(filter).await
    }

    async fn delete_all(&self, filter: &ScopeFilter) -> MemoryResult<usize> {
        self.inner.delete_all(filter).await
    }

    async fn count(&self, filter: &ScopeFilter) -> MemoryResult<usize> {
        self.inner.count(filter).await
    }

    async fn record_access(
        &self,
        id: i64,
        retention_strength: f64,
        accessed_at: DateTime<Utc>,
    ) -> MemoryResult<Memory> {
        self.inner
            .record_access(id, retention_strength, accessed_at)
            .await
    }

    async fn reinforce(
        &self,
        id: i64,
        accessed_at: DateTime<Utc>,
        step: StrengthStep<'_>,
    ) -> MemoryResult<Reinforcement> {
        self.inner.reinforce(id, accessed_at, step).await
    }

    async fn create_index(&self, config: &IndexConfig) -> MemoryResult<()> {
        self.inner.create_index(config).await
    }
}

#[tokio::test]
async fn slow_operations_time_out_as_cancelled() {
    let dir = TempDir::new().unwrap();
    let inner = create_vector_store(&store_config("sqlite"), dir.path())
        .await
        .unwrap();
    let store = Arc::new(StallingStore {
        inner,
        delay: Duration::from_millis(500),
    });
    let engine = MemoryEngine::new(
        store,
        EngineConfig {
            operation_timeout: Some(Duration::from_millis(50)),
            ..EngineConfig::default()
        },
    )
    .unwrap();

    let err = engine
        .search(&axis(), &ScopeFilter::for_user("alice"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.operation(), Some("search"));

    let err = engine
        .add(AddRequest::new("alice", "likes tea", axis()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(engine.store().count(&ScopeFilter::all()).await.unwrap(), 0);
}

#[tokio::test]
async fn caller_cancellation_stops_listing() {
    for backend in all_backends().await {
        let engine = backend.engine(EngineConfig::default());
        engine
            .add(AddRequest::new("alice", "likes tea", axis()))
            .await
            .unwrap();

        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let filter = ScopeFilter::for_user("alice").with_cancel(token);
        let err = engine.get_all(&filter).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled, "{}", backend.name);
    }
}

#[tokio::test]
async fn create_index_is_a_no_op_for_exact_backends() {
    let dir = TempDir::new().unwrap();
    let store = create_vector_store(&store_config("sqlite"), dir.path())
        .await
        .unwrap();
    let engine = MemoryEngine::new(store, EngineConfig::default()).unwrap();
    engine.create_index(&IndexConfig::default()).await.unwrap();
    assert!(engine.store().capabilities().exact_search);
    assert!(engine.store().health_check().await);
}

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use memoria::config::StoreConfig;
use memoria::core::memory::{
    EngineConfig, MemoryEngine, NewMemory, VectorStore, create_vector_store,
};

pub const DIMS: usize = 4;

/// A store plus the directory that backs it; dropping it removes the files.
pub struct BackendFixture {
    pub name: &'static str,
    pub store: Arc<dyn VectorStore>,
    pub dir: TempDir,
}

impl BackendFixture {
    pub fn engine(&self, config: EngineConfig) -> MemoryEngine {
        MemoryEngine::new(Arc::clone(&self.store), config).expect("engine config is valid")
    }
}

pub fn store_config(backend: &str) -> StoreConfig {
    StoreConfig {
        backend: backend.into(),
        collection: "harness".into(),
        dimensions: DIMS,
        ..StoreConfig::default()
    }
}

pub async fn open_backend(name: &'static str) -> BackendFixture {
    let dir = TempDir::new().expect("temp dir");
    let store = create_vector_store(&store_config(name), dir.path())
        .await
        .expect("store opens");
    BackendFixture { name, store, dir }
}

/// Every backend compiled into this build.
pub async fn all_backends() -> Vec<BackendFixture> {
    let mut backends = vec![open_backend("sqlite").await];
    #[cfg(feature = "vector-search")]
    backends.push(open_backend("lancedb").await);
    backends
}

/// Unit vector at cosine `cos` to [`axis`].
pub fn at_similarity(cos: f32) -> Vec<f32> {
    vec![cos, (1.0 - cos * cos).sqrt(), 0.0, 0.0]
}

pub fn axis() -> Vec<f32> {
    vec![1.0, 0.0, 0.0, 0.0]
}

pub fn orthogonal() -> Vec<f32> {
    vec![0.0, 0.0, 1.0, 0.0]
}

pub fn memory(user: &str, content: &str, embedding: Vec<f32>) -> NewMemory {
    NewMemory::new(user, content, embedding)
}

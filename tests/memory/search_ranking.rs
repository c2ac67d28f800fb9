use std::time::Duration;

use memoria::core::memory::ScopeFilter;

use super::memory_harness::{all_backends, axis, memory, orthogonal};

#[tokio::test]
async fn equal_scores_rank_latest_update_first() {
    for backend in all_backends().await {
        let mut ids = Vec::new();
        for content in ["first", "second", "third"] {
            let stored = backend
                .store
                .insert(memory("alice", content, axis()))
                .await
                .unwrap();
            ids.push(stored.id);
        }
        backend
            .store
            .insert(memory("alice", "unrelated", orthogonal()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        backend
            .store
            .update(ids[0], "first, revised", &axis())
            .await
            .unwrap();

        let top = backend
            .store
            .search(&axis(), &ScopeFilter::for_user("alice").with_limit(1))
            .await
            .unwrap();
        assert_eq!(top.len(), 1, "{}", backend.name);
        assert_eq!(top[0].id, ids[0], "{}", backend.name);

        let ranked = backend
            .store
            .search(&axis(), &ScopeFilter::for_user("alice").with_limit(3))
            .await
            .unwrap();
        let order: Vec<i64> = ranked.iter().map(|m| m.id).collect();
        assert_eq!(order, vec![ids[0], ids[2], ids[1]], "{}", backend.name);
        assert!(
            ranked.windows(2).all(|w| w[0].score == w[1].score),
            "{}",
            backend.name
        );
    }
}

#[cfg(feature = "vector-search")]
#[tokio::test]
async fn indexed_search_reports_exact_cosine() {
    use memoria::config::StoreConfig;
    use memoria::core::memory::vector::cosine_similarity;
    use memoria::core::memory::{IndexAlgorithm, IndexConfig, create_vector_store};

    const DIMS: usize = 16;

    let dir = tempfile::TempDir::new().unwrap();
    let config = StoreConfig {
        backend: "lancedb".into(),
        collection: "indexed".into(),
        dimensions: DIMS,
        ..StoreConfig::default()
    };
    let store = create_vector_store(&config, dir.path()).await.unwrap();

    let mut target = vec![0.0_f32; DIMS];
    target[0] = 1.0;
    store
        .insert(memory("alice", "target", target.clone()))
        .await
        .unwrap();
    for i in 0..511 {
        let embedding: Vec<f32> = (0..DIMS)
            .map(|d| {
                if d == 0 {
                    0.05
                } else {
                    ((i * 31 + d * 7) as f32).sin()
                }
            })
            .collect();
        store
            .insert(memory("alice", &format!("noise {i}"), embedding))
            .await
            .unwrap();
    }

    store
        .create_index(&IndexConfig {
            algorithm: IndexAlgorithm::IvfPq,
            num_partitions: Some(2),
            num_sub_vectors: Some(2),
            ..IndexConfig::default()
        })
        .await
        .unwrap();

    let hits = store
        .search(&target, &ScopeFilter::for_user("alice").with_limit(10))
        .await
        .unwrap();
    assert_eq!(hits.len(), 10);
    assert_eq!(hits[0].content, "target");
    assert!((hits[0].score.unwrap() - 1.0).abs() < 1e-6);
    for hit in &hits {
        let exact = cosine_similarity(&target, &hit.embedding);
        assert!(
            (hit.score.unwrap() - exact).abs() < 1e-6,
            "{} scored {:?}, exact {exact}",
            hit.content,
            hit.score
        );
    }
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

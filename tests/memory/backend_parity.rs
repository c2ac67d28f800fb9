use memoria::core::memory::ScopeFilter;
use memoria::core::memory::vector::cosine_similarity;

use super::memory_harness::{all_backends, memory};

const TOLERANCE: f32 = 1e-4;

fn corpus() -> Vec<(&'static str, Vec<f32>)> {
    vec![
        ("tea", vec![0.9, 0.1, 0.0, 0.2]),
        ("coffee", vec![0.7, 0.7, 0.1, 0.0]),
        ("hiking", vec![-0.2, 0.1, 0.9, 0.3]),
        ("cycling", vec![0.0, -0.5, 0.5, 0.7]),
        ("reading", vec![0.3, 0.3, 0.3, 0.3]),
        ("opposite", vec![-0.9, -0.1, 0.0, -0.2]),
    ]
}

#[tokio::test]
async fn scores_match_reference_cosine_on_every_backend() {
    let query = [1.0_f32, 0.2, 0.0, 0.1];
    let mut rankings = Vec::new();

    for backend in all_backends().await {
        for (content, embedding) in corpus() {
            backend
                .store
                .insert(memory("alice", content, embedding))
                .await
                .unwrap();
        }

        let hits = backend
            .store
            .search(&query, &ScopeFilter::for_user("alice"))
            .await
            .unwrap();
        assert_eq!(hits.len(), corpus().len(), "{}", backend.name);

        for hit in &hits {
            let expected = cosine_similarity(&query, &hit.embedding);
            let actual = hit.score.unwrap();
            assert!(
                (actual - expected).abs() < TOLERANCE,
                "{}: {} scored {actual}, reference {expected}",
                backend.name,
                hit.content
            );
        }
        let opposite = hits.iter().find(|m| m.content == "opposite").unwrap();
        assert!(opposite.score.unwrap() < 0.0, "{}", backend.name);

        rankings.push(
            hits.iter()
                .map(|m| m.content.clone())
                .collect::<Vec<_>>(),
        );
    }

    for ranking in &rankings[1..] {
        assert_eq!(ranking, &rankings[0]);
    }
}

#[tokio::test]
async fn filtered_search_agrees_across_backends() {
    let mut results = Vec::new();
    for backend in all_backends().await {
        for (i, (content, embedding)) in corpus().into_iter().enumerate() {
            let topic = if i % 2 == 0 { "even" } else { "odd" };
            let metadata = serde_json::json!({ "topic": topic })
                .as_object()
                .cloned()
                .unwrap();
            backend
                .store
                .insert(memory("alice", content, embedding).with_metadata(metadata))
                .await
                .unwrap();
        }

        let filter = ScopeFilter::for_user("alice")
            .with_filter("topic", "even")
            .with_limit(2);
        let hits = backend.store.search(&[1.0, 0.0, 0.0, 0.0], &filter).await.unwrap();
        results.push(hits.into_iter().map(|m| m.content).collect::<Vec<_>>());
    }

    assert_eq!(results[0], vec!["tea".to_string(), "reading".to_string()]);
    for other in &results[1..] {
        assert_eq!(other, &results[0]);
    }
}

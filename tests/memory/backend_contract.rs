use serde_json::json;

use memoria::core::memory::ScopeFilter;
use memoria::error::ErrorKind;

use super::memory_harness::{all_backends, at_similarity, axis, memory, orthogonal};

#[tokio::test]
async fn insert_then_get_round_trips_every_field() {
    for backend in all_backends().await {
        let metadata = json!({"topic": "drinks", "rank": 2, "pinned": true})
            .as_object()
            .cloned()
            .unwrap();
        let inserted = backend
            .store
            .insert(
                memory("alice", "likes green tea", at_similarity(0.6))
                    .with_agent("planner")
                    .with_metadata(metadata.clone()),
            )
            .await
            .unwrap();

        let fetched = backend.store.get(inserted.id).await.unwrap();
        assert_eq!(fetched.content, "likes green tea", "{}", backend.name);
        assert_eq!(fetched.embedding, at_similarity(0.6), "{}", backend.name);
        assert_eq!(fetched.metadata, metadata, "{}", backend.name);
        assert_eq!(fetched.agent_id.as_deref(), Some("planner"));
        assert_eq!(fetched.retention_strength, 1.0);
        assert_eq!(fetched.last_accessed_at, None);
        assert_eq!(fetched.created_at, inserted.created_at);
        assert_eq!(fetched.score, None);
    }
}

#[tokio::test]
async fn delete_is_not_found_the_second_time() {
    for backend in all_backends().await {
        let keep = backend
            .store
            .insert(memory("alice", "keep me", axis()))
            .await
            .unwrap();
        let gone = backend
            .store
            .insert(memory("alice", "delete me", orthogonal()))
            .await
            .unwrap();

        backend.store.delete(gone.id).await.unwrap();
        let err = backend.store.delete(gone.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound, "{}", backend.name);
        assert_eq!(err.operation(), Some("delete"));

        assert!(backend.store.get(gone.id).await.unwrap_err().is_not_found());
        assert_eq!(backend.store.get(keep.id).await.unwrap().content, "keep me");
        assert_eq!(backend.store.count(&ScopeFilter::all()).await.unwrap(), 1);
    }
}

#[tokio::test]
async fn wrong_dimension_is_rejected_without_writing() {
    for backend in all_backends().await {
        let err = backend
            .store
            .insert(memory("alice", "too short", vec![1.0, 0.0]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}", backend.name);

        let err = backend
            .store
            .search(&[1.0, 0.0, 0.0], &ScopeFilter::all())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}", backend.name);
        assert_eq!(backend.store.count(&ScopeFilter::all()).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn search_returns_top_scores_strictly_decreasing() {
    for backend in all_backends().await {
        for (i, cos) in [0.5_f32, 0.9, 0.6, 0.8, 0.7].into_iter().enumerate() {
            backend
                .store
                .insert(memory("alice", &format!("memory {i}"), at_similarity(cos)))
                .await
                .unwrap();
        }

        let hits = backend
            .store
            .search(&axis(), &ScopeFilter::for_user("alice").with_limit(2))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2, "{}", backend.name);
        let scores: Vec<f32> = hits.iter().map(|m| m.score.unwrap()).collect();
        assert!((scores[0] - 0.9).abs() < 1e-4, "{}: {scores:?}", backend.name);
        assert!((scores[1] - 0.8).abs() < 1e-4, "{}: {scores:?}", backend.name);
        assert!(scores[0] > scores[1]);
    }
}

#[tokio::test]
async fn explicit_ids_conflict() {
    for backend in all_backends().await {
        backend
            .store
            .insert(memory("alice", "first", axis()).with_id(42))
            .await
            .unwrap();
        let err = backend
            .store
            .insert(memory("alice", "second", axis()).with_id(42))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictingId, "{}", backend.name);

        let next = backend
            .store
            .insert(memory("alice", "third", axis()))
            .await
            .unwrap();
        assert!(next.id > 42, "{}", backend.name);
    }
}

#[tokio::test]
async fn get_all_pages_newest_first() {
    for backend in all_backends().await {
        let mut ids = Vec::new();
        for i in 0..5 {
            let m = backend
                .store
                .insert(memory("alice", &format!("note {i}"), axis()))
                .await
                .unwrap();
            ids.push(m.id);
        }
        ids.reverse();

        let first = backend
            .store
            .get_all(&ScopeFilter::for_user("alice").with_limit(2))
            .await
            .unwrap();
        let second = backend
            .store
            .get_all(&ScopeFilter::for_user("alice").with_limit(2).with_offset(2))
            .await
            .unwrap();
        let page_ids: Vec<i64> = first.iter().chain(&second).map(|m| m.id).collect();
        assert_eq!(page_ids, ids[..4].to_vec(), "{}", backend.name);
    }
}

#[tokio::test]
async fn update_changes_content_but_not_retention() {
    for backend in all_backends().await {
        let original = backend
            .store
            .insert(memory("alice", "likes tea", axis()))
            .await
            .unwrap();
        let accessed = chrono::Utc::now();
        backend
            .store
            .record_access(original.id, 0.5, accessed)
            .await
            .unwrap();

        let updated = backend
            .store
            .update(original.id, "likes coffee", &orthogonal())
            .await
            .unwrap();
        assert_eq!(updated.content, "likes coffee");
        assert_eq!(updated.embedding, orthogonal());
        assert_eq!(updated.retention_strength, 0.5, "{}", backend.name);
        assert!(updated.updated_at >= original.updated_at);
        assert_eq!(updated.created_at, original.created_at);

        let err = backend
            .store
            .update(original.id + 1000, "missing", &axis())
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{}", backend.name);
    }
}

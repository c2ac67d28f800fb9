use chrono::{Duration, Utc};

use memoria::config::DedupConfig;
use memoria::core::memory::{
    AddDisposition, AddRequest, EngineConfig, MergePolicy, Scope, ScopeFilter,
};

use super::memory_harness::{all_backends, at_similarity, axis, memory};

#[tokio::test]
async fn near_duplicate_collapses_and_strengthens() {
    for backend in all_backends().await {
        let engine = backend.engine(EngineConfig::default());
        let first = engine
            .add(AddRequest::new("alice", "likes green tea", axis()))
            .await
            .unwrap();
        backend
            .store
            .record_access(first.memory.id, 0.6, Utc::now() - Duration::hours(12))
            .await
            .unwrap();
        let before = engine.get(first.memory.id).await.unwrap().current_strength;

        let second = engine
            .add(AddRequest::new("alice", "enjoys green tea", at_similarity(0.97)))
            .await
            .unwrap();

        let AddDisposition::Duplicate {
            similarity,
            previous_strength,
            policy,
        } = second.disposition
        else {
            panic!("{}: expected duplicate, got {:?}", backend.name, second.disposition);
        };
        assert!((similarity - 0.97).abs() < 1e-3, "{}", backend.name);
        assert_eq!(policy, MergePolicy::KeepExisting);
        assert!((previous_strength - before).abs() < 1e-3);
        assert_eq!(second.memory.id, first.memory.id);
        assert_eq!(second.memory.content, "likes green tea");

        let after = engine.get(first.memory.id).await.unwrap().current_strength;
        assert!(after > before, "{}: {after} <= {before}", backend.name);
        assert_eq!(backend.store.count(&ScopeFilter::all()).await.unwrap(), 1);
    }
}

#[tokio::test]
async fn below_threshold_inserts_a_new_record() {
    for backend in all_backends().await {
        let engine = backend.engine(EngineConfig::default());
        engine
            .add(AddRequest::new("alice", "likes green tea", axis()))
            .await
            .unwrap();
        let second = engine
            .add(AddRequest::new("alice", "likes black coffee", at_similarity(0.9)))
            .await
            .unwrap();
        assert_eq!(second.disposition, AddDisposition::Inserted, "{}", backend.name);
        assert_eq!(backend.store.count(&ScopeFilter::all()).await.unwrap(), 2);
    }
}

#[tokio::test]
async fn same_text_in_other_scopes_is_kept_apart() {
    for backend in all_backends().await {
        let engine = backend.engine(EngineConfig::default());
        for request in [
            AddRequest::new("alice", "likes tea", axis()),
            AddRequest::new("bob", "likes tea", axis()),
            AddRequest::new("alice", "likes tea", axis()).with_agent("planner"),
        ] {
            let outcome = engine.add(request).await.unwrap();
            assert_eq!(outcome.disposition, AddDisposition::Inserted, "{}", backend.name);
        }
        assert_eq!(backend.store.count(&ScopeFilter::all()).await.unwrap(), 3);
    }
}

#[tokio::test]
async fn append_policy_accumulates_content() {
    for backend in all_backends().await {
        let config = EngineConfig {
            dedup: DedupConfig {
                merge_policy: MergePolicy::Append,
                ..DedupConfig::default()
            },
            ..EngineConfig::default()
        };
        let engine = backend.engine(config);
        let first = engine
            .add(AddRequest::new("alice", "likes tea", axis()))
            .await
            .unwrap();
        engine
            .add(AddRequest::new("alice", "prefers it hot", at_similarity(0.99)))
            .await
            .unwrap();

        let stored = backend.store.get(first.memory.id).await.unwrap();
        assert_eq!(stored.content, "likes tea\nprefers it hot", "{}", backend.name);
        assert_eq!(stored.embedding, axis());
    }
}

#[tokio::test]
async fn concurrent_adds_for_one_scope_store_one_record() {
    for backend in all_backends().await {
        let engine = std::sync::Arc::new(backend.engine(EngineConfig::default()));
        let mut tasks = Vec::new();
        for i in 0..4 {
            let engine = std::sync::Arc::clone(&engine);
            tasks.push(tokio::spawn(async move {
                engine
                    .add(AddRequest::new("alice", format!("likes tea ({i})"), axis()))
                    .await
                    .map(|outcome| outcome.memory.id)
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1, "{}: {ids:?}", backend.name);
        assert_eq!(backend.store.count(&ScopeFilter::all()).await.unwrap(), 1);
    }
}

#[tokio::test]
async fn agent_records_do_not_hide_a_user_level_duplicate() {
    for backend in all_backends().await {
        let user_level = backend
            .store
            .insert(memory("alice", "likes green tea", at_similarity(0.97)))
            .await
            .unwrap();
        for i in 0..5 {
            backend
                .store
                .insert(memory("alice", &format!("planner note {i}"), axis()).with_agent("planner"))
                .await
                .unwrap();
        }

        let engine = backend.engine(EngineConfig::default());
        let outcome = engine
            .add(AddRequest::new("alice", "enjoys green tea", axis()))
            .await
            .unwrap();
        assert!(outcome.is_duplicate(), "{}: {:?}", backend.name, outcome.disposition);
        assert_eq!(outcome.memory.id, user_level.id, "{}", backend.name);

        let user_only = ScopeFilter::exact(&Scope::new("alice", None));
        assert_eq!(backend.store.count(&user_only).await.unwrap(), 1, "{}", backend.name);
        assert_eq!(backend.store.count(&ScopeFilter::all()).await.unwrap(), 6);
    }
}

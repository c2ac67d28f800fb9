use memoria::core::memory::ScopeFilter;

use super::memory_harness::{BackendFixture, all_backends, at_similarity, memory};

async fn seed(backend: &BackendFixture) {
    let rows = [
        ("alice", None, "alice user note", 0.9),
        ("alice", Some("planner"), "alice planner note", 0.8),
        ("alice", Some("coder"), "alice coder note", 0.7),
        ("bob", None, "bob user note", 0.95),
        ("bob", Some("planner"), "bob planner note", 0.85),
    ];
    for (user, agent, content, cos) in rows {
        let mut new = memory(user, content, at_similarity(cos));
        new.agent_id = agent.map(str::to_string);
        backend.store.insert(new).await.unwrap();
    }
}

#[tokio::test]
async fn get_all_never_crosses_users_or_agents() {
    for backend in all_backends().await {
        seed(&backend).await;

        let alice = backend
            .store
            .get_all(&ScopeFilter::for_user("alice"))
            .await
            .unwrap();
        assert_eq!(alice.len(), 3, "{}", backend.name);
        assert!(alice.iter().all(|m| m.user_id == "alice"));

        let planner = backend
            .store
            .get_all(&ScopeFilter::for_user("alice").with_agent("planner"))
            .await
            .unwrap();
        assert_eq!(planner.len(), 1, "{}", backend.name);
        assert_eq!(planner[0].content, "alice planner note");

        let nobody = backend
            .store
            .get_all(&ScopeFilter::for_user("carol"))
            .await
            .unwrap();
        assert!(nobody.is_empty());
    }
}

#[tokio::test]
async fn search_only_ranks_records_in_scope() {
    for backend in all_backends().await {
        seed(&backend).await;

        let hits = backend
            .store
            .search(&[1.0, 0.0, 0.0, 0.0], &ScopeFilter::for_user("alice"))
            .await
            .unwrap();
        let contents: Vec<&str> = hits.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            ["alice user note", "alice planner note", "alice coder note"],
            "{}",
            backend.name
        );

        let planners = backend
            .store
            .search(&[1.0, 0.0, 0.0, 0.0], &ScopeFilter::all().with_agent("planner"))
            .await
            .unwrap();
        let contents: Vec<&str> = planners.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["bob planner note", "alice planner note"], "{}", backend.name);
    }
}

#[tokio::test]
async fn delete_all_removes_exactly_the_scope() {
    for backend in all_backends().await {
        seed(&backend).await;

        let removed = backend
            .store
            .delete_all(&ScopeFilter::for_user("alice").with_agent("planner"))
            .await
            .unwrap();
        assert_eq!(removed, 1, "{}", backend.name);

        let removed = backend
            .store
            .delete_all(&ScopeFilter::for_user("bob"))
            .await
            .unwrap();
        assert_eq!(removed, 2, "{}", backend.name);

        let left: Vec<String> = backend
            .store
            .get_all(&ScopeFilter::all())
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(left.len(), 2);
        assert!(left.contains(&"alice user note".to_string()));
        assert!(left.contains(&"alice coder note".to_string()));
    }
}

#[tokio::test]
async fn engine_reset_is_scoped() {
    for backend in all_backends().await {
        seed(&backend).await;
        let engine = backend.engine(Default::default());

        assert_eq!(engine.reset("alice", Some("coder")).await.unwrap(), 1);
        assert_eq!(engine.reset("bob", None).await.unwrap(), 2);
        assert_eq!(
            backend.store.count(&ScopeFilter::for_user("alice")).await.unwrap(),
            2,
            "{}",
            backend.name
        );
    }
}

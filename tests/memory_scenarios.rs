//! End-to-end memory scenarios across the authorizer, hot cache and
//! reflection engine.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use memoria::config::{AuthorizerConfig, HotCacheConfig, LockConfig, ReflectionConfig};
use memoria::embedding::EmbeddingProvider;
use memoria::graph::{EdgeStatus, GraphStore, MemoryGraphStore, Node, NodeType};
use memoria::lock::{LockManager, LockOutcome, MemoryLockStore};
use memoria::namespace::{NamespaceAuthorizer, StaticDirectory};
use memoria::reflection::{calculate_traversal_cost, PathEvaluator, Prioritizer, ReflectionEngine};
use memoria::{Error, HotCache, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Maps words onto four concept axes: feline, canine, food, other.
struct ConceptEmbedder;

#[async_trait]
impl EmbeddingProvider for ConceptEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; 4];
        for word in text.to_lowercase().split_whitespace() {
            match word {
                "cat" | "feline" => v[0] += 1.0,
                "dog" => v[1] += 1.0,
                "food" => v[2] += 1.0,
                _ => v[3] += 0.1,
            }
        }
        Ok(v)
    }
}

async fn authorizer() -> NamespaceAuthorizer {
    let directory = Arc::new(StaticDirectory::new());
    directory.set_owner("user_alice", "user1").await;
    NamespaceAuthorizer::new(directory, &AuthorizerConfig::default())
}

#[tokio::test(start_paused = true)]
async fn semantic_search_is_scoped_to_the_namespace() {
    let auth = authorizer().await;
    let cache = HotCache::new(Arc::new(ConceptEmbedder), HotCacheConfig::default());

    assert!(auth.verify_access("user1", "user_alice").await.unwrap());
    for query in ["cat", "dog", "cat food"] {
        cache
            .store("user1", "user_alice", query, "noted", "conv-1")
            .await
            .unwrap();
    }

    let hits = cache.search("user1", "user_alice", "feline", 2, 0.3).await;
    let queries: Vec<&str> = hits.iter().map(|h| h.message.query.as_str()).collect();
    assert_eq!(queries, vec!["cat", "cat food"]);
    assert!(hits[0].similarity >= hits[1].similarity);

    assert!(!auth.verify_access("user1", "user_bob").await.unwrap());
    assert!(cache.search("user1", "user_bob", "feline", 2, 0.3).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn authorizer_answers_take_the_floor() {
    let auth = authorizer().await;
    let floor = AuthorizerConfig::default().timing_floor();

    for (user, ns) in [("user1", "user_alice"), ("user2", "user_alice"), ("user1", "nope")] {
        let started = Instant::now();
        let _ = auth.verify_access(user, ns).await;
        assert!(started.elapsed() >= floor);
    }
    assert!(matches!(
        auth.verify_access("user1", "not a namespace").await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn curation_keeps_the_most_recent_fact() {
    let graph = Arc::new(MemoryGraphStore::new());
    let now = Utc::now();
    graph
        .create_node(Node::new(NodeType::User, "user_alice", "alice").with_id("alice"))
        .await
        .unwrap();
    for (id, days_ago, confidence) in [("a", 2, 0.9), ("b", 1, 0.5)] {
        graph
            .create_node(
                Node::new(NodeType::Entity, "user_alice", id)
                    .with_id(id)
                    .with_created_at(now - ChronoDuration::days(days_ago))
                    .with_confidence(confidence),
            )
            .await
            .unwrap();
        graph
            .create_edge("alice", id, "lives_in", EdgeStatus::Current)
            .await
            .unwrap();
    }

    let engine = ReflectionEngine::new(
        graph.clone(),
        Arc::new(MemoryLockStore::new()),
        Arc::new(PathEvaluator),
        ReflectionConfig::default(),
        LockConfig::default(),
    );
    engine.run_cycle(&CancellationToken::new()).await.unwrap();

    let edges = graph.edges_from("alice").await;
    let status = |to: &str| edges.iter().find(|e| e.to == to).unwrap().status;
    assert_eq!(status("b"), EdgeStatus::Current);
    assert_eq!(status("a"), EdgeStatus::Superseded);

    // Converged: a second cycle finds nothing to resolve
    let second = engine.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(second.curation.unwrap().contradictions_found, 0);
}

struct Fixture {
    graph: Arc<MemoryGraphStore>,
    locks: Arc<LockManager>,
    prioritizer: Prioritizer,
}

fn fixture() -> Fixture {
    let graph = Arc::new(MemoryGraphStore::new());
    let locks = Arc::new(LockManager::new(
        Arc::new(MemoryLockStore::new()),
        LockConfig::default(),
    ));
    let prioritizer = Prioritizer::new(graph.clone(), locks.clone(), ReflectionConfig::default());
    Fixture {
        graph,
        locks,
        prioritizer,
    }
}

async fn activation(graph: &MemoryGraphStore, id: &str) -> f64 {
    graph.get_node(id).await.unwrap().unwrap().activation
}

#[tokio::test]
async fn held_node_lock_skips_the_update() {
    let f = fixture();
    let id = f
        .graph
        .create_node(Node::new(NodeType::Fact, "user_alice", "fact").with_activation(0.5))
        .await
        .unwrap();

    let guard = f.locks.try_acquire(&f.locks.node_key(&id)).await.unwrap().unwrap();
    assert_eq!(f.prioritizer.boost_node(&id).await, LockOutcome::SkippedContended);
    assert_eq!(activation(&f.graph, &id).await, 0.5);

    assert!(guard.release().await.unwrap());
    assert!(f.prioritizer.boost_node(&id).await.is_updated());
    assert!((activation(&f.graph, &id).await - 0.6).abs() < 1e-9);
}

#[tokio::test]
async fn concurrent_boosts_never_lose_bounds() {
    let f = fixture();
    let id = f
        .graph
        .create_node(Node::new(NodeType::Fact, "user_alice", "fact").with_activation(0.5))
        .await
        .unwrap();

    let attempts = (0..8).map(|_| f.prioritizer.boost_node(&id));
    let outcomes = futures::future::join_all(attempts).await;
    let updated = outcomes.iter().filter(|o| o.is_updated()).count();
    assert!(updated >= 1);

    let value = activation(&f.graph, &id).await;
    assert!(value <= 1.0);
    assert!((value - (0.5 + 0.1 * updated as f64).min(1.0)).abs() < 1e-9);
}

#[tokio::test]
async fn activation_stays_within_bounds() {
    let f = fixture();
    let now = Utc::now();
    let id = f
        .graph
        .create_node(
            Node::new(NodeType::Fact, "user_alice", "fact")
                .with_activation(0.95)
                .with_last_accessed(now - ChronoDuration::days(400)),
        )
        .await
        .unwrap();

    for _ in 0..5 {
        f.prioritizer.boost_node(&id).await;
    }
    assert_eq!(activation(&f.graph, &id).await, 1.0);

    for _ in 0..3 {
        f.prioritizer.decay_node(&id, now).await;
    }
    assert_eq!(activation(&f.graph, &id).await, 0.01);
}

#[tokio::test]
async fn decay_within_a_day_is_idempotent() {
    let f = fixture();
    let now = Utc::now();
    let id = f
        .graph
        .create_node(
            Node::new(NodeType::Fact, "user_alice", "fact")
                .with_activation(0.7)
                .with_last_accessed(now - ChronoDuration::hours(20)),
        )
        .await
        .unwrap();

    f.prioritizer.decay_node(&id, now).await;
    f.prioritizer
        .decay_node(&id, now + ChronoDuration::hours(2))
        .await;
    assert_eq!(activation(&f.graph, &id).await, 0.7);
}

#[test]
fn traversal_cost_prefers_active_nodes() {
    assert!(calculate_traversal_cost(0.9) < calculate_traversal_cost(0.1));
    assert_eq!(calculate_traversal_cost(0.5), 2.0);
    assert!(calculate_traversal_cost(0.0) > calculate_traversal_cost(0.01));
}

#[tokio::test(start_paused = true)]
async fn background_engine_stops_on_cancel() {
    let engine = Arc::new(ReflectionEngine::new(
        Arc::new(MemoryGraphStore::new()),
        Arc::new(MemoryLockStore::new()),
        Arc::new(PathEvaluator),
        ReflectionConfig::default(),
        LockConfig::default(),
    ));
    let cancel = CancellationToken::new();
    let handle = engine.clone().spawn(cancel.clone());

    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();
    handle.await.unwrap();
    assert!(engine.stats().await.cycle_count >= 1);
}

//! In-memory graph store
//!
//! Implements `GraphStore` over a `tokio::sync::RwLock`-guarded node map and
//! edge list. Snapshots can be saved to and loaded from JSON so the CLI can
//! run reflection cycles against a file.

use super::store::{GraphQuery, GraphStore, QueryResult};
use super::types::{edge_types, Contradiction, Edge, EdgeStatus, Node, NodeType, PathFacts, Pattern};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// On-disk snapshot format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Default)]
struct GraphState {
    nodes: HashMap<String, Node>,
    edges: Vec<Edge>,
}

/// In-process graph store
#[derive(Default)]
pub struct MemoryGraphStore {
    state: Arc<RwLock<GraphState>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let nodes = snapshot
            .nodes
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        Self {
            state: Arc::new(RwLock::new(GraphState {
                nodes,
                edges: snapshot.edges,
            })),
        }
    }

    /// Load a JSON snapshot
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let snapshot: GraphSnapshot = serde_json::from_str(&content)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write a JSON snapshot (nodes sorted by id)
    pub async fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot().await;
        let content = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub async fn snapshot(&self) -> GraphSnapshot {
        let state = self.state.read().await;
        let mut nodes: Vec<Node> = state.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        GraphSnapshot {
            nodes,
            edges: state.edges.clone(),
        }
    }

    /// Outgoing edges of a node, any status
    pub async fn edges_from(&self, id: &str) -> Vec<Edge> {
        self.state
            .read()
            .await
            .edges
            .iter()
            .filter(|e| e.from == id)
            .cloned()
            .collect()
    }

    pub async fn edge_count(&self) -> usize {
        self.state.read().await.edges.len()
    }

    pub async fn node_count(&self) -> usize {
        self.state.read().await.nodes.len()
    }
}

fn sorted_desc_by<F>(mut nodes: Vec<Node>, limit: usize, key: F) -> Vec<Node>
where
    F: Fn(&Node) -> f64,
{
    nodes.sort_by(|a, b| {
        key(b)
            .partial_cmp(&key(a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    nodes.truncate(limit);
    nodes
}

fn shortest_path(state: &GraphState, from: &str, to: &str, max_depth: usize) -> PathFacts {
    if !state.nodes.contains_key(from) || !state.nodes.contains_key(to) {
        return PathFacts::none();
    }
    if from == to {
        return PathFacts {
            exists: true,
            length: Some(0),
            edge_types: Vec::new(),
        };
    }

    let mut adjacency: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    for edge in state.edges.iter().filter(|e| e.is_current()) {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push((edge.to.as_str(), edge.edge_type.as_str()));
        adjacency
            .entry(edge.to.as_str())
            .or_default()
            .push((edge.from.as_str(), edge.edge_type.as_str()));
    }

    // node → (predecessor, edge type used to reach it)
    let mut came_from: HashMap<&str, (&str, &str)> = HashMap::new();
    let mut visited: HashSet<&str> = HashSet::from([from]);
    let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(from, 0)]);

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for &(next, edge_type) in adjacency.get(current).into_iter().flatten() {
            if !visited.insert(next) {
                continue;
            }
            came_from.insert(next, (current, edge_type));
            if next == to {
                let mut types = Vec::new();
                let mut cursor = to;
                while let Some(&(prev, edge_type)) = came_from.get(cursor) {
                    types.push(edge_type.to_string());
                    cursor = prev;
                }
                types.reverse();
                return PathFacts {
                    exists: true,
                    length: Some(types.len()),
                    edge_types: types,
                };
            }
            queue.push_back((next, depth + 1));
        }
    }
    PathFacts::none()
}

/// Ids of nodes holding a current `synthesized_from` edge to `source`
fn synthesized_into<'a>(state: &'a GraphState, source: &str) -> HashSet<&'a str> {
    state
        .edges
        .iter()
        .filter(|e| e.is_current() && e.edge_type == edge_types::SYNTHESIZED_FROM && e.to == source)
        .map(|e| e.from.as_str())
        .collect()
}

fn contradictions(state: &GraphState, edge_type: &str) -> Vec<Contradiction> {
    let mut targets: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for edge in state
        .edges
        .iter()
        .filter(|e| e.is_current() && e.edge_type == edge_type)
    {
        targets
            .entry(edge.from.as_str())
            .or_default()
            .insert(edge.to.as_str());
    }

    let mut out = Vec::new();
    for (source, targets) in targets.into_iter().filter(|(_, t)| t.len() > 1) {
        let targets: Vec<&str> = targets.into_iter().collect();
        for (i, first) in targets.iter().enumerate() {
            for second in &targets[i + 1..] {
                out.push(Contradiction {
                    source_id: source.to_string(),
                    edge_type: edge_type.to_string(),
                    first: first.to_string(),
                    second: second.to_string(),
                });
            }
        }
    }
    out
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn create_node(&self, node: Node) -> Result<String> {
        if node.types.is_empty() {
            return Err(Error::Graph("node needs at least one type".to_string()));
        }
        let id = node.id.clone();
        self.state.write().await.nodes.insert(id.clone(), node);
        Ok(id)
    }

    async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        Ok(self.state.read().await.nodes.get(id).cloned())
    }

    async fn update_node_activation(&self, id: &str, activation: f64) -> Result<()> {
        let mut state = self.state.write().await;
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::Graph(format!("node not found: {}", id)))?;
        node.activation = activation;
        Ok(())
    }

    async fn record_access(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::Graph(format!("node not found: {}", id)))?;
        node.access_count += 1;
        node.last_accessed = Utc::now();
        Ok(())
    }

    async fn create_edge(
        &self,
        from: &str,
        to: &str,
        edge_type: &str,
        status: EdgeStatus,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        for endpoint in [from, to] {
            if !state.nodes.contains_key(endpoint) {
                return Err(Error::Graph(format!("node not found: {}", endpoint)));
            }
        }
        if let Some(existing) = state
            .edges
            .iter_mut()
            .find(|e| e.from == from && e.to == to && e.edge_type == edge_type)
        {
            existing.status = status;
            return Ok(());
        }
        state.edges.push(Edge::new(from, to, edge_type, status));
        Ok(())
    }

    async fn set_edge_status(
        &self,
        from: &str,
        to: &str,
        edge_type: &str,
        status: EdgeStatus,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let mut matched = false;
        for edge in state
            .edges
            .iter_mut()
            .filter(|e| e.from == from && e.to == to && e.edge_type == edge_type)
        {
            edge.status = status;
            matched = true;
        }
        Ok(matched)
    }

    async fn list_nodes(&self, namespace: Option<&str>) -> Result<Vec<Node>> {
        let state = self.state.read().await;
        let mut nodes: Vec<Node> = state
            .nodes
            .values()
            .filter(|n| namespace.map_or(true, |ns| n.namespace == ns))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn query(&self, query: &GraphQuery) -> Result<QueryResult> {
        let state = self.state.read().await;
        let result = match query {
            GraphQuery::CoreKnowledge {
                min_activation,
                limit,
            } => {
                let nodes = state
                    .nodes
                    .values()
                    .filter(|n| n.activation >= *min_activation && !n.has_type(NodeType::Insight))
                    .cloned()
                    .collect();
                QueryResult::Nodes(sorted_desc_by(nodes, *limit, |n| n.activation))
            }
            GraphQuery::FrequentlyAccessed {
                min_access_count,
                limit,
            } => {
                let nodes = state
                    .nodes
                    .values()
                    .filter(|n| n.access_count > *min_access_count)
                    .cloned()
                    .collect();
                QueryResult::Nodes(sorted_desc_by(nodes, *limit, |n| n.access_count as f64))
            }
            GraphQuery::CoreIdentityCandidates { threshold, ceiling } => {
                let nodes = state
                    .nodes
                    .values()
                    .filter(|n| n.activation >= *threshold && n.activation < *ceiling)
                    .cloned()
                    .collect();
                QueryResult::Nodes(sorted_desc_by(nodes, usize::MAX, |n| n.activation))
            }
            GraphQuery::DecayCandidates {
                above_activation,
                idle_since,
            } => {
                let nodes = state
                    .nodes
                    .values()
                    .filter(|n| n.activation > *above_activation && n.last_accessed <= *idle_since)
                    .cloned()
                    .collect();
                QueryResult::Nodes(sorted_desc_by(nodes, usize::MAX, |n| n.activation))
            }
            GraphQuery::PathBetween {
                from,
                to,
                max_depth,
            } => QueryResult::Path(shortest_path(&state, from, to, *max_depth)),
            GraphQuery::Contradictions { edge_type } => {
                QueryResult::Contradictions(contradictions(&state, edge_type))
            }
            GraphQuery::PatternByName { namespace, name } => QueryResult::Nodes(
                state
                    .nodes
                    .values()
                    .filter(|n| {
                        n.has_type(NodeType::Pattern) && n.namespace == *namespace && n.name == *name
                    })
                    .cloned()
                    .collect(),
            ),
            GraphQuery::ScheduledPatterns {
                day_of_week,
                hour,
                min_confidence,
            } => {
                let nodes = state
                    .nodes
                    .values()
                    .filter(|n| n.confidence >= *min_confidence)
                    .filter(|n| {
                        Pattern::from_node(n).is_some_and(|p| p.matches_slot(*day_of_week, *hour))
                    })
                    .cloned()
                    .collect();
                QueryResult::Nodes(sorted_desc_by(nodes, usize::MAX, |n| n.confidence))
            }
            GraphQuery::InsightForPair { first, second } => {
                let both: HashSet<&str> = synthesized_into(&state, first)
                    .intersection(&synthesized_into(&state, second))
                    .copied()
                    .collect();
                let mut nodes: Vec<Node> = both
                    .into_iter()
                    .filter_map(|id| state.nodes.get(id))
                    .filter(|n| n.has_type(NodeType::Insight))
                    .cloned()
                    .collect();
                nodes.sort_by(|a, b| a.id.cmp(&b.id));
                QueryResult::Nodes(nodes)
            }
            GraphQuery::Orphans => {
                let connected: HashSet<&str> = state
                    .edges
                    .iter()
                    .flat_map(|e| [e.from.as_str(), e.to.as_str()])
                    .collect();
                let mut nodes: Vec<Node> = state
                    .nodes
                    .values()
                    .filter(|n| !n.name.is_empty() && !connected.contains(n.id.as_str()))
                    .cloned()
                    .collect();
                nodes.sort_by(|a, b| a.id.cmp(&b.id));
                QueryResult::Nodes(nodes)
            }
            GraphQuery::DanglingCurrentEdges => {
                let superseded: HashSet<&str> = state
                    .edges
                    .iter()
                    .filter(|e| e.is_current() && e.edge_type == edge_types::SUPERSEDES)
                    .map(|e| e.to.as_str())
                    .collect();
                QueryResult::Edges(
                    state
                        .edges
                        .iter()
                        .filter(|e| {
                            e.is_current()
                                && e.edge_type != edge_types::SUPERSEDES
                                && superseded.contains(e.to.as_str())
                        })
                        .cloned()
                        .collect(),
                )
            }
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::PatternKind;
    use chrono::Duration;

    async fn node(store: &MemoryGraphStore, name: &str) -> String {
        store
            .create_node(Node::new(NodeType::Entity, "user_a", name).with_id(name))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_node_crud() {
        let store = MemoryGraphStore::new();
        let id = node(&store, "alice").await;

        store.update_node_activation(&id, 0.9).await.unwrap();
        store.record_access(&id).await.unwrap();
        let fetched = store.get_node(&id).await.unwrap().unwrap();
        assert_eq!(fetched.activation, 0.9);
        assert_eq!(fetched.access_count, 1);

        assert!(store.get_node("missing").await.unwrap().is_none());
        assert!(store.update_node_activation("missing", 0.1).await.is_err());
    }

    #[tokio::test]
    async fn test_edge_requires_endpoints() {
        let store = MemoryGraphStore::new();
        node(&store, "a").await;
        assert!(store
            .create_edge("a", "ghost", "knows", EdgeStatus::Current)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_duplicate_edge_updates_status() {
        let store = MemoryGraphStore::new();
        node(&store, "a").await;
        node(&store, "b").await;
        store.create_edge("a", "b", "knows", EdgeStatus::Current).await.unwrap();
        store.create_edge("a", "b", "knows", EdgeStatus::Superseded).await.unwrap();
        let edges = store.edges_from("a").await;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].status, EdgeStatus::Superseded);
    }

    #[tokio::test]
    async fn test_core_knowledge_ordering() {
        let store = MemoryGraphStore::new();
        for (name, activation) in [("low", 0.2), ("mid", 0.6), ("high", 0.9)] {
            store
                .create_node(Node::new(NodeType::Fact, "user_a", name).with_activation(activation))
                .await
                .unwrap();
        }
        let nodes = store.core_knowledge_nodes(0.6, 10).await.unwrap();
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["high", "mid"]);
        assert_eq!(store.core_knowledge_nodes(0.0, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_core_knowledge_limit_skips_insights() {
        let store = MemoryGraphStore::new();
        for i in 0..3 {
            store
                .create_node(
                    Node::new(NodeType::Insight, "user_a", format!("insight {}", i))
                        .with_activation(0.8),
                )
                .await
                .unwrap();
        }
        store
            .create_node(Node::new(NodeType::Fact, "user_a", "fact").with_activation(0.7))
            .await
            .unwrap();

        let nodes = store.core_knowledge_nodes(0.6, 2).await.unwrap();
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["fact"]);
    }

    #[tokio::test]
    async fn test_insight_for_pair_needs_both_sources() {
        let store = MemoryGraphStore::new();
        for name in ["a", "b", "c"] {
            node(&store, name).await;
        }
        store
            .create_node(Node::new(NodeType::Insight, "user_a", "ab").with_id("ab"))
            .await
            .unwrap();
        for source in ["a", "b"] {
            store
                .create_edge("ab", source, edge_types::SYNTHESIZED_FROM, EdgeStatus::Current)
                .await
                .unwrap();
        }

        let found = store.insights_for_pair("b", "a").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "ab");
        assert!(store.insights_for_pair("a", "c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_frequently_accessed_is_strict() {
        let store = MemoryGraphStore::new();
        for (name, count) in [("five", 5), ("six", 6), ("nine", 9)] {
            store
                .create_node(Node::new(NodeType::Fact, "user_a", name).with_access_count(count))
                .await
                .unwrap();
        }
        let nodes = store.frequently_accessed_nodes(5, 50).await.unwrap();
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["nine", "six"]);
    }

    #[tokio::test]
    async fn test_core_identity_candidates() {
        let store = MemoryGraphStore::new();
        for (name, activation) in [("near", 0.96), ("pinned", 1.0), ("below", 0.9)] {
            store
                .create_node(Node::new(NodeType::Fact, "user_a", name).with_activation(activation))
                .await
                .unwrap();
        }
        let nodes = store.core_identity_candidates(0.95, 1.0).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name, "near");
    }

    #[tokio::test]
    async fn test_decay_candidates() {
        let store = MemoryGraphStore::new();
        let now = Utc::now();
        store
            .create_node(
                Node::new(NodeType::Fact, "user_a", "stale").with_last_accessed(now - Duration::days(3)),
            )
            .await
            .unwrap();
        store
            .create_node(Node::new(NodeType::Fact, "user_a", "fresh"))
            .await
            .unwrap();
        store
            .create_node(
                Node::new(NodeType::Fact, "user_a", "floor")
                    .with_activation(0.01)
                    .with_last_accessed(now - Duration::days(3)),
            )
            .await
            .unwrap();

        let nodes = store
            .decay_candidates(0.01, now - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name, "stale");
    }

    #[tokio::test]
    async fn test_path_between() {
        let store = MemoryGraphStore::new();
        for name in ["a", "b", "c", "d"] {
            node(&store, name).await;
        }
        store.create_edge("a", "b", "knows", EdgeStatus::Current).await.unwrap();
        store.create_edge("c", "b", "works_with", EdgeStatus::Current).await.unwrap();

        let path = store.path_between("a", "c", 4).await.unwrap();
        assert!(path.exists);
        assert_eq!(path.length, Some(2));
        assert_eq!(path.edge_types, vec!["knows", "works_with"]);

        assert!(!store.path_between("a", "d", 4).await.unwrap().exists);
        assert!(!store.path_between("a", "c", 1).await.unwrap().exists);
    }

    #[tokio::test]
    async fn test_path_ignores_superseded_edges() {
        let store = MemoryGraphStore::new();
        node(&store, "a").await;
        node(&store, "b").await;
        store.create_edge("a", "b", "knows", EdgeStatus::Superseded).await.unwrap();
        assert!(!store.path_between("a", "b", 3).await.unwrap().exists);
    }

    #[tokio::test]
    async fn test_contradictions() {
        let store = MemoryGraphStore::new();
        for name in ["me", "x", "y", "z"] {
            node(&store, name).await;
        }
        store.create_edge("me", "x", "partner_is", EdgeStatus::Current).await.unwrap();
        store.create_edge("me", "y", "partner_is", EdgeStatus::Current).await.unwrap();
        store.create_edge("me", "z", "partner_is", EdgeStatus::Superseded).await.unwrap();
        store.create_edge("x", "y", "knows", EdgeStatus::Current).await.unwrap();

        let found = store.potential_contradictions("partner_is").await.unwrap();
        assert_eq!(
            found,
            vec![Contradiction {
                source_id: "me".to_string(),
                edge_type: "partner_is".to_string(),
                first: "x".to_string(),
                second: "y".to_string(),
            }]
        );
        assert!(store.potential_contradictions("knows").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_orphans_and_dangling_edges() {
        let store = MemoryGraphStore::new();
        for name in ["me", "old", "new", "friend", "lonely"] {
            node(&store, name).await;
        }
        store.create_edge("me", "new", "lives_in", EdgeStatus::Current).await.unwrap();
        store.create_edge("me", "old", "lives_in", EdgeStatus::Superseded).await.unwrap();
        store.create_edge("new", "old", edge_types::SUPERSEDES, EdgeStatus::Current).await.unwrap();
        store.create_edge("friend", "old", "visits", EdgeStatus::Current).await.unwrap();

        let orphans = store.orphan_nodes().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, "lonely");

        let dangling = store.dangling_current_edges().await.unwrap();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].from, "friend");
    }

    #[tokio::test]
    async fn test_pattern_queries() {
        let store = MemoryGraphStore::new();
        let pattern = Pattern {
            name: "temporal:u1:coffee:2:9".to_string(),
            namespace: "user_u1".to_string(),
            user_id: "u1".to_string(),
            kind: PatternKind::Temporal,
            frequency: 8,
            confidence: 0.8,
            predicted_action: "Offer the coffee order".to_string(),
            day_of_week: Some(2),
            hour: Some(9),
        };
        store.create_node(pattern.clone().into_node()).await.unwrap();

        assert!(store
            .find_pattern("user_u1", &pattern.name)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_pattern("user_u2", &pattern.name)
            .await
            .unwrap()
            .is_none());

        assert_eq!(store.scheduled_patterns(2, 9, 0.7).await.unwrap(), vec![pattern]);
        assert!(store.scheduled_patterns(2, 9, 0.9).await.unwrap().is_empty());
        assert!(store.scheduled_patterns(3, 9, 0.7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");

        let store = MemoryGraphStore::new();
        node(&store, "a").await;
        node(&store, "b").await;
        store.create_edge("a", "b", "knows", EdgeStatus::Current).await.unwrap();
        store.save(&path).await.unwrap();

        let loaded = MemoryGraphStore::load(&path).await.unwrap();
        assert_eq!(loaded.node_count().await, 2);
        assert_eq!(loaded.edges_from("a").await.len(), 1);
        assert_eq!(loaded.get_node("a").await.unwrap(), store.get_node("a").await.unwrap());
    }
}

//! Graph store contract
//!
//! Queries are typed (`GraphQuery` → `QueryResult`) rather than raw query
//! strings; each backend translates them into its own query language. The
//! helper methods unwrap the expected result shape.

use super::types::{Contradiction, Edge, EdgeStatus, Node, PathFacts, Pattern};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read queries the reflection engine issues
#[derive(Debug, Clone, PartialEq)]
pub enum GraphQuery {
    /// Non-insight nodes with activation ≥ `min_activation`, highest first
    CoreKnowledge { min_activation: f64, limit: usize },
    /// Nodes with access_count > `min_access_count`, most accessed first
    FrequentlyAccessed { min_access_count: u64, limit: usize },
    /// Nodes at or above `threshold` but not yet pinned at `ceiling`
    CoreIdentityCandidates { threshold: f64, ceiling: f64 },
    /// Nodes above `above_activation` not accessed since `idle_since`
    DecayCandidates {
        above_activation: f64,
        idle_since: DateTime<Utc>,
    },
    /// Shortest path between two nodes, over edges in either direction
    PathBetween {
        from: String,
        to: String,
        max_depth: usize,
    },
    /// Sources holding more than one current edge of `edge_type`
    Contradictions { edge_type: String },
    /// Pattern node with an exact name, within a namespace
    PatternByName { namespace: String, name: String },
    /// Temporal patterns firing at a weekday/hour
    ScheduledPatterns {
        day_of_week: u32,
        hour: u32,
        min_confidence: f64,
    },
    /// Insight nodes with current `synthesized_from` edges to both nodes
    InsightForPair { first: String, second: String },
    /// Named nodes with no edges at all
    Orphans,
    /// Current edges pointing at a node that has been superseded
    DanglingCurrentEdges,
}

/// Result of a [`GraphQuery`]
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Nodes(Vec<Node>),
    Path(PathFacts),
    Contradictions(Vec<Contradiction>),
    Edges(Vec<Edge>),
}

impl QueryResult {
    fn kind(&self) -> &'static str {
        match self {
            QueryResult::Nodes(_) => "nodes",
            QueryResult::Path(_) => "path",
            QueryResult::Contradictions(_) => "contradictions",
            QueryResult::Edges(_) => "edges",
        }
    }

    pub fn into_nodes(self) -> Result<Vec<Node>> {
        match self {
            QueryResult::Nodes(nodes) => Ok(nodes),
            other => Err(unexpected("nodes", &other)),
        }
    }

    pub fn into_path(self) -> Result<PathFacts> {
        match self {
            QueryResult::Path(path) => Ok(path),
            other => Err(unexpected("path", &other)),
        }
    }

    pub fn into_contradictions(self) -> Result<Vec<Contradiction>> {
        match self {
            QueryResult::Contradictions(c) => Ok(c),
            other => Err(unexpected("contradictions", &other)),
        }
    }

    pub fn into_edges(self) -> Result<Vec<Edge>> {
        match self {
            QueryResult::Edges(edges) => Ok(edges),
            other => Err(unexpected("edges", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &QueryResult) -> Error {
    Error::Graph(format!(
        "expected {} result, got {}",
        expected,
        got.kind()
    ))
}

/// Long-term memory graph backend.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Persist a node, returning its id
    async fn create_node(&self, node: Node) -> Result<String>;

    async fn get_node(&self, id: &str) -> Result<Option<Node>>;

    /// Overwrite a node's activation. Callers clamp; stores do not.
    async fn update_node_activation(&self, id: &str, activation: f64) -> Result<()>;

    /// Increment access_count and stamp last_accessed
    async fn record_access(&self, id: &str) -> Result<()>;

    async fn create_edge(
        &self,
        from: &str,
        to: &str,
        edge_type: &str,
        status: EdgeStatus,
    ) -> Result<()>;

    /// Change the status of every `from -[edge_type]-> to` edge. Returns
    /// whether any edge matched.
    async fn set_edge_status(
        &self,
        from: &str,
        to: &str,
        edge_type: &str,
        status: EdgeStatus,
    ) -> Result<bool>;

    /// All nodes, optionally restricted to one namespace
    async fn list_nodes(&self, namespace: Option<&str>) -> Result<Vec<Node>>;

    async fn query(&self, query: &GraphQuery) -> Result<QueryResult>;

    async fn core_knowledge_nodes(&self, min_activation: f64, limit: usize) -> Result<Vec<Node>> {
        self.query(&GraphQuery::CoreKnowledge {
            min_activation,
            limit,
        })
        .await?
        .into_nodes()
    }

    async fn frequently_accessed_nodes(
        &self,
        min_access_count: u64,
        limit: usize,
    ) -> Result<Vec<Node>> {
        self.query(&GraphQuery::FrequentlyAccessed {
            min_access_count,
            limit,
        })
        .await?
        .into_nodes()
    }

    async fn core_identity_candidates(&self, threshold: f64, ceiling: f64) -> Result<Vec<Node>> {
        self.query(&GraphQuery::CoreIdentityCandidates { threshold, ceiling })
            .await?
            .into_nodes()
    }

    async fn decay_candidates(
        &self,
        above_activation: f64,
        idle_since: DateTime<Utc>,
    ) -> Result<Vec<Node>> {
        self.query(&GraphQuery::DecayCandidates {
            above_activation,
            idle_since,
        })
        .await?
        .into_nodes()
    }

    async fn path_between(&self, from: &str, to: &str, max_depth: usize) -> Result<PathFacts> {
        self.query(&GraphQuery::PathBetween {
            from: from.to_string(),
            to: to.to_string(),
            max_depth,
        })
        .await?
        .into_path()
    }

    async fn potential_contradictions(&self, edge_type: &str) -> Result<Vec<Contradiction>> {
        self.query(&GraphQuery::Contradictions {
            edge_type: edge_type.to_string(),
        })
        .await?
        .into_contradictions()
    }

    async fn find_pattern(&self, namespace: &str, name: &str) -> Result<Option<Node>> {
        Ok(self
            .query(&GraphQuery::PatternByName {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
            .await?
            .into_nodes()?
            .into_iter()
            .next())
    }

    async fn scheduled_patterns(
        &self,
        day_of_week: u32,
        hour: u32,
        min_confidence: f64,
    ) -> Result<Vec<Pattern>> {
        let nodes = self
            .query(&GraphQuery::ScheduledPatterns {
                day_of_week,
                hour,
                min_confidence,
            })
            .await?
            .into_nodes()?;
        Ok(nodes.iter().filter_map(Pattern::from_node).collect())
    }

    async fn insights_for_pair(&self, first: &str, second: &str) -> Result<Vec<Node>> {
        self.query(&GraphQuery::InsightForPair {
            first: first.to_string(),
            second: second.to_string(),
        })
        .await?
        .into_nodes()
    }

    async fn orphan_nodes(&self) -> Result<Vec<Node>> {
        self.query(&GraphQuery::Orphans).await?.into_nodes()
    }

    async fn dangling_current_edges(&self) -> Result<Vec<Edge>> {
        self.query(&GraphQuery::DanglingCurrentEdges)
            .await?
            .into_edges()
    }
}

//! Graph node and edge types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Well-known edge types written by the reflection engine
pub mod edge_types {
    /// Insight → each source node it was derived from
    pub const SYNTHESIZED_FROM: &str = "synthesized_from";
    /// Curation winner → loser
    pub const SUPERSEDES: &str = "supersedes";
}

/// Node type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Entity,
    User,
    Pattern,
    Insight,
    Rule,
    Fact,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeType::Entity => "entity",
            NodeType::User => "user",
            NodeType::Pattern => "pattern",
            NodeType::Insight => "insight",
            NodeType::Rule => "rule",
            NodeType::Fact => "fact",
        };
        f.write_str(s)
    }
}

/// A graph entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// At least one type tag
    pub types: Vec<NodeType>,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Relevance score, kept within the configured activation bounds
    pub activation: f64,
    /// 0.0–1.0
    pub confidence: f64,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Node {
    /// Create a node with a fresh id, activation 0.5 and full confidence.
    pub fn new(node_type: NodeType, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            types: vec![node_type],
            namespace: namespace.into(),
            name: name.into(),
            description: String::new(),
            activation: 0.5,
            confidence: 1.0,
            access_count: 0,
            last_accessed: now,
            created_at: now,
            metadata: HashMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_type(mut self, node_type: NodeType) -> Self {
        if !self.types.contains(&node_type) {
            self.types.push(node_type);
        }
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_activation(mut self, activation: f64) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_access_count(mut self, access_count: u64) -> Self {
        self.access_count = access_count;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_last_accessed(mut self, last_accessed: DateTime<Utc>) -> Self {
        self.last_accessed = last_accessed;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn has_type(&self, node_type: NodeType) -> bool {
        self.types.contains(&node_type)
    }

    /// Primary type tag, used when describing the node to evaluators
    pub fn primary_type(&self) -> NodeType {
        self.types.first().copied().unwrap_or(NodeType::Entity)
    }

    /// Fractional idle days since the last access, as of `now`.
    pub fn days_since_access(&self, now: DateTime<Utc>) -> f64 {
        ((now - self.last_accessed).num_seconds() as f64 / 86_400.0).max(0.0)
    }

    fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    fn meta_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(|v| v.as_u64())
    }
}

/// Edge status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStatus {
    Current,
    Superseded,
}

/// Typed, directed relation between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub edge_type: String,
    pub status: EdgeStatus,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        edge_type: impl Into<String>,
        status: EdgeStatus,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            edge_type: edge_type.into(),
            status,
            created_at: Utc::now(),
        }
    }

    pub fn is_current(&self) -> bool {
        self.status == EdgeStatus::Current
    }
}

/// Kind of mined behavior pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Same topic at the same weekday and hour
    Temporal,
    /// Recurring contiguous topic sequence
    Sequence,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::Temporal => f.write_str("temporal"),
            PatternKind::Sequence => f.write_str("sequence"),
        }
    }
}

/// A mined behavior pattern, stored as a `Pattern` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Stable name; rediscovery matches on it
    pub name: String,
    pub namespace: String,
    pub user_id: String,
    pub kind: PatternKind,
    pub frequency: u64,
    pub confidence: f64,
    pub predicted_action: String,
    /// Temporal patterns only. 0 = Monday.
    pub day_of_week: Option<u32>,
    /// Temporal patterns only. 0–23, UTC.
    pub hour: Option<u32>,
}

impl Pattern {
    pub fn into_node(self) -> Node {
        let mut node = Node::new(NodeType::Pattern, self.namespace, self.name)
            .with_description(self.predicted_action.clone())
            .with_confidence(self.confidence)
            .with_metadata("pattern_kind", self.kind.to_string().into())
            .with_metadata("frequency", self.frequency.into())
            .with_metadata("predicted_action", self.predicted_action.into())
            .with_metadata("user_id", self.user_id.into());
        if let Some(day) = self.day_of_week {
            node.metadata.insert("day_of_week".to_string(), day.into());
        }
        if let Some(hour) = self.hour {
            node.metadata.insert("hour".to_string(), hour.into());
        }
        node
    }

    /// Read a pattern back out of a node. `None` for non-pattern nodes.
    pub fn from_node(node: &Node) -> Option<Self> {
        if !node.has_type(NodeType::Pattern) {
            return None;
        }
        let kind = match node.meta_str("pattern_kind")? {
            "temporal" => PatternKind::Temporal,
            "sequence" => PatternKind::Sequence,
            _ => return None,
        };
        Some(Self {
            name: node.name.clone(),
            namespace: node.namespace.clone(),
            user_id: node.meta_str("user_id").unwrap_or_default().to_string(),
            kind,
            frequency: node.meta_u64("frequency").unwrap_or(0),
            confidence: node.confidence,
            predicted_action: node
                .meta_str("predicted_action")
                .unwrap_or(&node.description)
                .to_string(),
            day_of_week: node.meta_u64("day_of_week").map(|d| d as u32),
            hour: node.meta_u64("hour").map(|h| h as u32),
        })
    }

    /// Whether a temporal pattern fires at this weekday/hour
    pub fn matches_slot(&self, day_of_week: u32, hour: u32) -> bool {
        self.kind == PatternKind::Temporal
            && self.day_of_week == Some(day_of_week)
            && self.hour == Some(hour)
    }
}

/// A synthesized insight linking two or more source nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub namespace: String,
    pub source_ids: Vec<String>,
    pub kind: String,
    pub summary: String,
    pub action_suggestion: String,
    pub confidence: f64,
}

impl Insight {
    pub fn into_node(self, initial_activation: f64) -> Node {
        let name: String = self.summary.chars().take(80).collect();
        Node::new(NodeType::Insight, self.namespace, name)
            .with_description(self.summary)
            .with_activation(initial_activation)
            .with_confidence(self.confidence)
            .with_metadata("insight_kind", self.kind.into())
            .with_metadata("action_suggestion", self.action_suggestion.into())
            .with_metadata("source_ids", self.source_ids.into())
    }
}

/// Two current edges of a functional type leaving the same source.
///
/// Produced by a query and consumed immediately by curation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contradiction {
    pub source_id: String,
    pub edge_type: String,
    pub first: String,
    pub second: String,
}

/// What the graph knows about the connection between two nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathFacts {
    pub exists: bool,
    /// Hop count of the shortest path
    pub length: Option<usize>,
    /// Edge types along that path, in order
    pub edge_types: Vec<String>,
}

impl PathFacts {
    pub fn none() -> Self {
        Self::default()
    }
}

//! Insight evaluation service contract
//!
//! Synthesis hands each candidate node pair to an `InsightEvaluator`. The
//! production evaluator is typically an LLM service; `PathEvaluator` is a
//! deterministic rule-based one used offline.

use crate::error::Result;
use crate::graph::{Node, NodeType, PathFacts};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the evaluator is told about one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeBrief {
    pub name: String,
    pub node_type: NodeType,
    pub description: String,
}

impl From<&Node> for NodeBrief {
    fn from(node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            node_type: node.primary_type(),
            description: node.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightRequest {
    pub first: NodeBrief,
    pub second: NodeBrief,
    pub path: PathFacts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightResponse {
    pub has_insight: bool,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub action_suggestion: String,
    #[serde(default)]
    pub confidence: f64,
}

impl InsightResponse {
    pub fn none() -> Self {
        Self {
            has_insight: false,
            kind: String::new(),
            summary: String::new(),
            action_suggestion: String::new(),
            confidence: 0.0,
        }
    }
}

/// Judges whether two nodes combine into something worth remembering.
#[async_trait]
pub trait InsightEvaluator: Send + Sync {
    async fn evaluate(&self, request: &InsightRequest) -> Result<InsightResponse>;
}

/// Rule-based evaluator: two nodes joined only indirectly are an insight
/// candidate, with confidence falling off by hop count. Directly linked or
/// unconnected pairs yield nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathEvaluator;

#[async_trait]
impl InsightEvaluator for PathEvaluator {
    async fn evaluate(&self, request: &InsightRequest) -> Result<InsightResponse> {
        let hops = match request.path.length {
            Some(hops) if request.path.exists && hops >= 2 => hops,
            _ => return Ok(InsightResponse::none()),
        };

        let via = request.path.edge_types.join(" → ");
        Ok(InsightResponse {
            has_insight: true,
            kind: "connection".to_string(),
            summary: format!(
                "{} and {} are related through {}",
                request.first.name, request.second.name, via
            ),
            action_suggestion: format!(
                "Consider {} when {} comes up",
                request.second.name, request.first.name
            ),
            confidence: (0.9 - 0.1 * hops as f64).max(0.0),
        })
    }
}

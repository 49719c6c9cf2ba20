//! Insight discovery over core-knowledge node pairs
//!
//! Pairs are only formed within a namespace. A pair that already has an
//! insight linked to both nodes is not evaluated again.

use super::evaluator::{InsightEvaluator, InsightRequest, NodeBrief};
use crate::config::ReflectionConfig;
use crate::error::{Error, Result};
use crate::graph::{edge_types, EdgeStatus, GraphStore, Insight, Node};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Deepest path looked up between two core nodes
pub const MAX_PATH_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisReport {
    pub core_nodes: usize,
    pub pairs_evaluated: usize,
    pub insights_created: usize,
    pub evaluation_failures: usize,
    pub links_failed: usize,
}

pub struct Synthesizer {
    graph: Arc<dyn GraphStore>,
    evaluator: Arc<dyn InsightEvaluator>,
    config: ReflectionConfig,
}

impl Synthesizer {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        evaluator: Arc<dyn InsightEvaluator>,
        config: ReflectionConfig,
    ) -> Self {
        Self {
            graph,
            evaluator,
            config,
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<SynthesisReport> {
        let core: Vec<Node> = self
            .graph
            .core_knowledge_nodes(
                self.config.core_knowledge_min_activation,
                self.config.core_knowledge_limit,
            )
            .await?;

        let mut report = SynthesisReport {
            core_nodes: core.len(),
            ..Default::default()
        };
        if core.len() < 2 {
            tracing::debug!(core_nodes = core.len(), "Not enough core knowledge to synthesize");
            return Ok(report);
        }

        for (i, first) in core.iter().enumerate() {
            for second in &core[i + 1..] {
                if first.namespace != second.namespace {
                    continue;
                }
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                self.consider_pair(first, second, &mut report).await?;
            }
        }

        tracing::debug!(?report, "Synthesis pass complete");
        Ok(report)
    }

    async fn consider_pair(
        &self,
        first: &Node,
        second: &Node,
        report: &mut SynthesisReport,
    ) -> Result<()> {
        if !self
            .graph
            .insights_for_pair(&first.id, &second.id)
            .await?
            .is_empty()
        {
            tracing::trace!(first = %first.id, second = %second.id, "Pair already synthesized");
            return Ok(());
        }
        let path = self
            .graph
            .path_between(&first.id, &second.id, MAX_PATH_DEPTH)
            .await?;

        let request = InsightRequest {
            first: NodeBrief::from(first),
            second: NodeBrief::from(second),
            path,
        };
        report.pairs_evaluated += 1;
        let response = match self.evaluator.evaluate(&request).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    first = %first.id,
                    second = %second.id,
                    error = %e,
                    "Insight evaluation failed"
                );
                report.evaluation_failures += 1;
                return Ok(());
            }
        };
        if !response.has_insight || response.confidence < self.config.insight_min_confidence {
            return Ok(());
        }

        let insight = Insight {
            namespace: first.namespace.clone(),
            source_ids: vec![first.id.clone(), second.id.clone()],
            kind: response.kind,
            summary: response.summary,
            action_suggestion: response.action_suggestion,
            confidence: response.confidence,
        };
        let sources = insight.source_ids.clone();
        let insight_id = self
            .graph
            .create_node(insight.into_node(self.config.insight_initial_activation))
            .await?;
        report.insights_created += 1;
        tracing::info!(
            insight_id = %insight_id,
            first = %first.name,
            second = %second.name,
            "Synthesized insight"
        );

        for source in &sources {
            if let Err(e) = self
                .graph
                .create_edge(
                    &insight_id,
                    source,
                    edge_types::SYNTHESIZED_FROM,
                    EdgeStatus::Current,
                )
                .await
            {
                tracing::warn!(
                    insight_id = %insight_id,
                    source_id = %source,
                    error = %e,
                    "Failed to link insight to source"
                );
                report.links_failed += 1;
            }
        }
        Ok(())
    }
}

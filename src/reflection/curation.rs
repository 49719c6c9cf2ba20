//! Functional-edge contradiction resolution and integrity diagnostics
//!
//! A functional edge type allows one current edge per source. When a source
//! holds several, the winning target is kept current and every loser is
//! marked superseded on the source's edge and linked from the winner with a
//! `supersedes` edge. Nothing is deleted.

use crate::config::ReflectionConfig;
use crate::error::{Error, Result};
use crate::graph::{edge_types, Edge, EdgeStatus, GraphStore, Node};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurationReport {
    pub contradictions_found: usize,
    pub sources_resolved: usize,
    pub edges_superseded: usize,
    pub failed: usize,
}

/// Diagnostic findings; nothing here is repaired automatically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Named nodes with no edges
    pub orphan_ids: Vec<String>,
    /// Current edges that still point at a superseded node
    pub dangling_edges: Vec<Edge>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.orphan_ids.is_empty() && self.dangling_edges.is_empty()
    }
}

/// Ordering used to pick the surviving target: more recently created wins,
/// then higher confidence, then higher activation. Remaining ties go to the
/// lexically smaller id so the choice is stable.
pub fn precedence(a: &Node, b: &Node) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.confidence.partial_cmp(&b.confidence).unwrap_or(Ordering::Equal))
        .then_with(|| a.activation.partial_cmp(&b.activation).unwrap_or(Ordering::Equal))
        .then_with(|| b.id.cmp(&a.id))
}

pub struct Curator {
    graph: Arc<dyn GraphStore>,
    config: ReflectionConfig,
}

impl Curator {
    pub fn new(graph: Arc<dyn GraphStore>, config: ReflectionConfig) -> Self {
        Self { graph, config }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<CurationReport> {
        let mut report = CurationReport::default();

        for edge_type in &self.config.functional_edge_types {
            let contradictions = self.graph.potential_contradictions(edge_type).await?;
            report.contradictions_found += contradictions.len();

            let mut by_source: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for c in contradictions {
                let targets = by_source.entry(c.source_id).or_default();
                targets.insert(c.first);
                targets.insert(c.second);
            }

            for (source_id, targets) in by_source {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                match self.resolve(&source_id, edge_type, &targets).await {
                    Ok(superseded) => {
                        report.sources_resolved += 1;
                        report.edges_superseded += superseded;
                    }
                    Err(e) => {
                        tracing::error!(
                            source_id = %source_id,
                            edge_type = %edge_type,
                            error = %e,
                            "Failed to resolve contradiction"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        if report.contradictions_found > 0 {
            tracing::info!(?report, "Curation pass complete");
        }
        Ok(report)
    }

    /// Keep one of `targets` current for `source_id`. Returns how many
    /// edges were superseded.
    async fn resolve(
        &self,
        source_id: &str,
        edge_type: &str,
        targets: &BTreeSet<String>,
    ) -> Result<usize> {
        let mut nodes = Vec::with_capacity(targets.len());
        let mut missing = Vec::new();
        for id in targets {
            match self.graph.get_node(id).await? {
                Some(node) => nodes.push(node),
                None => missing.push(id),
            }
        }

        // A target that no longer exists can never win
        let mut superseded = 0;
        for id in missing {
            tracing::warn!(
                source_id = %source_id,
                node_id = %id,
                "Contradiction target missing from graph, superseding its edge"
            );
            if self
                .graph
                .set_edge_status(source_id, id, edge_type, EdgeStatus::Superseded)
                .await?
            {
                superseded += 1;
            }
        }

        let Some(winner) = nodes.iter().max_by(|a, b| precedence(a, b)).cloned() else {
            return Ok(superseded);
        };

        for loser in nodes.iter().filter(|n| n.id != winner.id) {
            self.graph
                .create_edge(&winner.id, &loser.id, edge_types::SUPERSEDES, EdgeStatus::Current)
                .await?;
            if self
                .graph
                .set_edge_status(source_id, &loser.id, edge_type, EdgeStatus::Superseded)
                .await?
            {
                superseded += 1;
            }
            tracing::debug!(
                source_id = %source_id,
                edge_type = %edge_type,
                winner = %winner.id,
                loser = %loser.id,
                "Superseded functional edge"
            );
        }
        Ok(superseded)
    }

    /// Report orphans and current edges into superseded nodes.
    pub async fn validate_graph_integrity(&self) -> Result<IntegrityReport> {
        let orphan_ids = self
            .graph
            .orphan_nodes()
            .await?
            .into_iter()
            .map(|n| n.id)
            .collect();
        let dangling_edges = self.graph.dangling_current_edges().await?;

        let report = IntegrityReport {
            orphan_ids,
            dangling_edges,
        };
        if !report.is_clean() {
            tracing::info!(
                orphans = report.orphan_ids.len(),
                dangling = report.dangling_edges.len(),
                "Graph integrity findings"
            );
        }
        Ok(report)
    }
}

//! Activation maintenance: boost, decay and core-identity promotion
//!
//! Every single-node activation write happens under that node's lock
//! (`LockKey::node_activation`). A contended node is skipped for this pass;
//! the next cycle catches it up.

use crate::config::ReflectionConfig;
use crate::error::{Error, Result};
use crate::graph::GraphStore;
use crate::lock::{LockManager, LockOutcome};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Traversal cost for nodes with no activation
pub const MAX_TRAVERSAL_COST: f64 = 1_000.0;

/// Cost of stepping onto a node: the inverse of its activation.
pub fn calculate_traversal_cost(activation: f64) -> f64 {
    if activation <= 0.0 {
        MAX_TRAVERSAL_COST
    } else {
        1.0 / activation
    }
}

/// `activation * (1 - rate)^days`, floored at `min`.
pub fn decayed_activation(activation: f64, days: f64, rate: f64, min: f64) -> f64 {
    (activation * (1.0 - rate).powf(days)).max(min)
}

/// Tally of one pass over a set of nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub attempted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PassReport {
    fn record(&mut self, outcome: &LockOutcome) {
        self.attempted += 1;
        match outcome {
            LockOutcome::Updated => self.updated += 1,
            LockOutcome::SkippedContended => self.skipped += 1,
            LockOutcome::Failed(_) => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrioritizationReport {
    pub boost: PassReport,
    pub decay: PassReport,
    pub promotion: PassReport,
}

/// Maintains activation scores.
pub struct Prioritizer {
    graph: Arc<dyn GraphStore>,
    locks: Arc<LockManager>,
    config: ReflectionConfig,
}

impl Prioritizer {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        locks: Arc<LockManager>,
        config: ReflectionConfig,
    ) -> Self {
        Self {
            graph,
            locks,
            config,
        }
    }

    /// Boost, then decay, then promote.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<PrioritizationReport> {
        let boost = self.boost_frequently_accessed(cancel).await?;
        let decay = self.apply_decay(Utc::now(), cancel).await?;
        let promotion = self.promote_core_identity(cancel).await?;

        let report = PrioritizationReport {
            boost,
            decay,
            promotion,
        };
        tracing::debug!(?report, "Prioritization pass complete");
        Ok(report)
    }

    /// Boost the most-accessed nodes.
    pub async fn boost_frequently_accessed(&self, cancel: &CancellationToken) -> Result<PassReport> {
        let nodes = self
            .graph
            .frequently_accessed_nodes(self.config.boost_min_access_count, self.config.boost_limit)
            .await?;

        let mut report = PassReport::default();
        for node in &nodes {
            ensure_live(cancel)?;
            report.record(&self.boost_node(&node.id).await);
        }
        Ok(report)
    }

    /// Decay every node idle for at least a day.
    pub async fn apply_decay(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PassReport> {
        let nodes = self
            .graph
            .decay_candidates(self.config.min_activation, now - ChronoDuration::days(1))
            .await?;

        let mut report = PassReport::default();
        for node in &nodes {
            ensure_live(cancel)?;
            report.record(&self.decay_node(&node.id, now).await);
        }
        Ok(report)
    }

    /// Pin nodes at or above the core-identity threshold to the ceiling.
    pub async fn promote_core_identity(&self, cancel: &CancellationToken) -> Result<PassReport> {
        let nodes = self
            .graph
            .core_identity_candidates(
                self.config.core_identity_threshold,
                self.config.max_activation,
            )
            .await?;

        let mut report = PassReport::default();
        for node in &nodes {
            ensure_live(cancel)?;
            let outcome = self
                .write_activation(&node.id, |_, config| config.max_activation)
                .await;
            if outcome.is_updated() {
                tracing::info!(node_id = %node.id, name = %node.name, "Promoted to core identity");
            }
            report.record(&outcome);
        }
        Ok(report)
    }

    /// Add one boost step, clamped to the ceiling.
    pub async fn boost_node(&self, node_id: &str) -> LockOutcome {
        self.write_activation(node_id, |activation, config| {
            config.clamp_activation(activation + config.boost_per_access)
        })
        .await
    }

    /// Count an access and boost, under one lock. Used when a derived node
    /// is rediscovered.
    pub async fn reinforce_node(&self, node_id: &str) -> LockOutcome {
        let key = self.locks.node_key(node_id);
        let graph = self.graph.clone();
        let config = &self.config;
        self.locks
            .with_lock(&key, |lease| async move {
                let node = graph
                    .get_node(node_id)
                    .await?
                    .ok_or_else(|| Error::Graph(format!("node not found: {}", node_id)))?;
                let next = config.clamp_activation(node.activation + config.boost_per_access);
                lease.ensure_fresh().await?;
                graph.record_access(node_id).await?;
                graph.update_node_activation(node_id, next).await
            })
            .await
    }

    /// Apply decay for the node's whole idle days as of `now`. Nodes idle
    /// less than a day are left as they are.
    pub async fn decay_node(&self, node_id: &str, now: DateTime<Utc>) -> LockOutcome {
        let key = self.locks.node_key(node_id);
        let graph = self.graph.clone();
        let config = &self.config;
        self.locks
            .with_lock(&key, |lease| async move {
                let node = graph
                    .get_node(node_id)
                    .await?
                    .ok_or_else(|| Error::Graph(format!("node not found: {}", node_id)))?;
                let days = node.days_since_access(now).floor();
                if days < 1.0 || node.activation <= config.min_activation {
                    return Ok(());
                }
                let next = decayed_activation(
                    node.activation,
                    days,
                    config.decay_rate,
                    config.min_activation,
                )
                .min(config.max_activation);
                lease.ensure_fresh().await?;
                graph.update_node_activation(node_id, next).await
            })
            .await
    }

    async fn write_activation<F>(&self, node_id: &str, next: F) -> LockOutcome
    where
        F: FnOnce(f64, &ReflectionConfig) -> f64 + Send,
    {
        let key = self.locks.node_key(node_id);
        let graph = self.graph.clone();
        let config = &self.config;
        self.locks
            .with_lock(&key, |lease| async move {
                let node = graph
                    .get_node(node_id)
                    .await?
                    .ok_or_else(|| Error::Graph(format!("node not found: {}", node_id)))?;
                let value = next(node.activation, config);
                lease.ensure_fresh().await?;
                graph.update_node_activation(node_id, value).await
            })
            .await
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

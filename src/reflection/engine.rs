//! Reflection cycle orchestration
//!
//! One cycle: curation runs to completion, then prioritization, synthesis
//! and anticipation run concurrently and are joined. Every module runs under
//! the configured timeout and the caller's cancellation token. A module
//! failure never stops its siblings; the first failure is returned to the
//! caller and all of them are logged.

use super::anticipation::{AnticipationReport, Anticipator, ProactiveAlert};
use super::curation::{CurationReport, Curator, IntegrityReport};
use super::evaluator::InsightEvaluator;
use super::prioritization::{PrioritizationReport, Prioritizer};
use super::synthesis::{SynthesisReport, Synthesizer};
use crate::config::{LockConfig, ReflectionConfig};
use crate::error::{with_timeout, Error, Result};
use crate::graph::GraphStore;
use crate::lock::{LockKey, LockManager, LockStats, LockStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Where the engine is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Curating,
    /// Prioritization, synthesis and anticipation in flight
    Reflecting,
}

/// Engine statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub cycle_count: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub state: EngineState,
}

impl Default for EngineStats {
    fn default() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_at: None,
            last_error: None,
            state: EngineState::Idle,
        }
    }
}

/// Per-module results of one cycle. `None` means the module failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Cycle number the lock counters were recorded under
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub curation: Option<CurationReport>,
    pub prioritization: Option<PrioritizationReport>,
    pub synthesis: Option<SynthesisReport>,
    pub anticipation: Option<AnticipationReport>,
    /// Node-activation lock outcomes during this cycle
    pub node_locks: Option<LockStats>,
    /// `module: error` for every failed module, in module order
    pub errors: Vec<String>,
}

/// Periodic consolidation of the long-term graph.
pub struct ReflectionEngine {
    curator: Curator,
    prioritizer: Arc<Prioritizer>,
    synthesizer: Synthesizer,
    anticipator: Anticipator,
    locks: Arc<LockManager>,
    config: ReflectionConfig,
    stats: Arc<RwLock<EngineStats>>,
    last_report: Arc<RwLock<Option<CycleReport>>>,
}

impl ReflectionEngine {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        lock_store: Arc<dyn LockStore>,
        evaluator: Arc<dyn InsightEvaluator>,
        config: ReflectionConfig,
        lock_config: LockConfig,
    ) -> Self {
        let locks = Arc::new(LockManager::new(lock_store, lock_config));
        let prioritizer = Arc::new(Prioritizer::new(
            graph.clone(),
            locks.clone(),
            config.clone(),
        ));
        Self {
            curator: Curator::new(graph.clone(), config.clone()),
            synthesizer: Synthesizer::new(graph.clone(), evaluator, config.clone()),
            anticipator: Anticipator::new(graph, locks.clone(), prioritizer.clone(), config.clone()),
            locks,
            prioritizer,
            config,
            stats: Arc::new(RwLock::new(EngineStats::default())),
            last_report: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    pub fn prioritizer(&self) -> &Arc<Prioritizer> {
        &self.prioritizer
    }

    async fn set_state(&self, state: EngineState) {
        self.stats.write().await.state = state;
    }

    async fn guarded<T>(
        &self,
        module: &str,
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = with_timeout(module, self.config.module_timeout(), fut) => result,
        }
    }

    /// Run one full cycle.
    ///
    /// Returns the first module error, if any; the cycle report (also for
    /// failed cycles) is available from [`ReflectionEngine::last_report`].
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let started_at = Utc::now();
        let cycle = self.locks.begin_cycle();
        let mut failures: Vec<(&'static str, Error)> = Vec::new();

        self.set_state(EngineState::Curating).await;
        let curation = match self
            .guarded("curation", cancel, self.curator.run(cancel))
            .await
        {
            Ok(report) => Some(report),
            Err(Error::Cancelled) => return self.cancelled().await,
            Err(e) => {
                failures.push(("curation", e));
                None
            }
        };

        self.set_state(EngineState::Reflecting).await;
        let (prioritization, synthesis, anticipation) = tokio::join!(
            self.guarded("prioritization", cancel, self.prioritizer.run(cancel)),
            self.guarded("synthesis", cancel, self.synthesizer.run(cancel)),
            self.guarded("anticipation", cancel, self.anticipator.run(cancel)),
        );
        if cancel.is_cancelled() {
            return self.cancelled().await;
        }

        let prioritization = keep("prioritization", prioritization, &mut failures);
        let synthesis = keep("synthesis", synthesis, &mut failures);
        let anticipation = keep("anticipation", anticipation, &mut failures);

        for (module, e) in &failures {
            tracing::error!(module = %module, error = %e, "Reflection module failed");
        }

        let node_locks = match self.locks.stats(cycle, LockKey::NODE_COMPONENT).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(cycle, error = %e, "Failed to read lock counters");
                None
            }
        };

        let report = CycleReport {
            cycle,
            started_at,
            finished_at: Utc::now(),
            curation,
            prioritization,
            synthesis,
            anticipation,
            node_locks,
            errors: failures
                .iter()
                .map(|(module, e)| format!("{}: {}", module, e))
                .collect(),
        };

        {
            let mut stats = self.stats.write().await;
            stats.cycle_count += 1;
            stats.last_cycle_at = Some(report.finished_at);
            stats.last_error = report.errors.first().cloned();
            stats.state = EngineState::Idle;
        }
        *self.last_report.write().await = Some(report.clone());

        tracing::info!(
            cycle,
            duration_ms = (report.finished_at - started_at).num_milliseconds(),
            failed_modules = failures.len(),
            "Reflection cycle complete"
        );

        match failures.into_iter().next() {
            Some((_, first)) => Err(first),
            None => Ok(report),
        }
    }

    async fn cancelled(&self) -> Result<CycleReport> {
        tracing::info!("Reflection cycle cancelled");
        self.set_state(EngineState::Idle).await;
        Err(Error::Cancelled)
    }

    /// Run cycles every `interval_secs` until `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                // Module failures are already logged by run_cycle
                if let Err(Error::Cancelled) = self.run_cycle(&cancel).await {
                    break;
                }
            }
            tracing::info!("Reflection engine stopped");
        })
    }

    /// Proactive alerts for patterns firing at `now`
    pub async fn check_scheduled_patterns(&self, now: DateTime<Utc>) -> Result<Vec<ProactiveAlert>> {
        self.anticipator.check_scheduled_patterns(now).await
    }

    pub async fn validate_graph_integrity(&self) -> Result<IntegrityReport> {
        self.curator.validate_graph_integrity().await
    }
}

fn keep<T>(
    module: &'static str,
    result: Result<T>,
    failures: &mut Vec<(&'static str, Error)>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            failures.push((module, e));
            None
        }
    }
}

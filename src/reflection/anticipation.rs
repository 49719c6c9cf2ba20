//! Behavior pattern mining and proactive alerts
//!
//! Reads recent transcripts, mines temporal (topic × weekday × hour) and
//! sequence (topic 2/3-gram) patterns per (user, namespace), and upserts
//! them as `Pattern` nodes. Rediscovered patterns are reinforced through
//! the prioritizer's locked activation path instead of being duplicated.

use super::prioritization::Prioritizer;
use super::transcript::{load_transcripts, TranscriptEntry};
use crate::config::ReflectionConfig;
use crate::error::{Error, Result};
use crate::graph::{GraphStore, Pattern, PatternKind};
use crate::lock::{LockManager, LockOutcome};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnticipationReport {
    pub entries_scanned: usize,
    pub candidates: usize,
    pub created: usize,
    pub reinforced: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// A pattern that fires now, surfaced to the live conversation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProactiveAlert {
    pub user_id: String,
    pub namespace: String,
    pub pattern: String,
    pub predicted_action: String,
    pub confidence: f64,
}

fn predicted_action_for(topic: &str, sentiment: Option<&str>) -> String {
    match sentiment {
        Some("positive") => format!("Proactively bring up {}", topic),
        Some("negative") => format!("Offer help with {}", topic),
        _ => format!("Prepare context about {}", topic),
    }
}

fn dominant<'a>(sentiments: &[&'a str]) -> Option<&'a str> {
    let mut counts: BTreeMap<&'a str, usize> = BTreeMap::new();
    for s in sentiments {
        *counts.entry(*s).or_default() += 1;
    }
    // Highest count; BTreeMap order breaks ties
    let mut best: Option<(&'a str, usize)> = None;
    for (s, c) in counts {
        if best.map_or(true, |(_, bc)| c > bc) {
            best = Some((s, c));
        }
    }
    best.map(|(s, _)| s)
}

/// Mine candidate patterns from transcript entries. Output is sorted by
/// pattern name.
pub fn mine_patterns(entries: &[TranscriptEntry], config: &ReflectionConfig) -> Vec<Pattern> {
    let mut per_scope: BTreeMap<(&str, &str), Vec<&TranscriptEntry>> = BTreeMap::new();
    for entry in entries {
        per_scope
            .entry((entry.user_id.as_str(), entry.namespace.as_str()))
            .or_default()
            .push(entry);
    }

    let mut patterns = Vec::new();
    for ((user_id, namespace), mut scoped) in per_scope {
        scoped.sort_by_key(|e| e.timestamp);
        let topical: Vec<(String, &TranscriptEntry)> = scoped
            .into_iter()
            .filter_map(|e| e.topic().map(|t| (t, e)))
            .collect();

        patterns.extend(temporal_patterns(user_id, namespace, &topical, config));
        patterns.extend(sequence_patterns(user_id, namespace, &topical, config));
    }
    patterns.sort_by(|a, b| a.name.cmp(&b.name));
    patterns
}

fn temporal_patterns(
    user_id: &str,
    namespace: &str,
    topical: &[(String, &TranscriptEntry)],
    config: &ReflectionConfig,
) -> Vec<Pattern> {
    let mut slots: HashMap<(&str, u32, u32), Vec<&str>> = HashMap::new();
    for (topic, entry) in topical {
        let key = (
            topic.as_str(),
            entry.timestamp.weekday().num_days_from_monday(),
            entry.timestamp.hour(),
        );
        slots
            .entry(key)
            .or_default()
            .push(entry.sentiment.as_deref().unwrap_or("neutral"));
    }

    slots
        .into_iter()
        .filter(|(_, sentiments)| sentiments.len() >= config.temporal_min_occurrences)
        .map(|((topic, day, hour), sentiments)| {
            let count = sentiments.len();
            Pattern {
                name: format!("temporal:{}:{}:{}:{}", user_id, topic, day, hour),
                namespace: namespace.to_string(),
                user_id: user_id.to_string(),
                kind: PatternKind::Temporal,
                frequency: count as u64,
                confidence: (count as f64 / 10.0).min(1.0),
                predicted_action: predicted_action_for(topic, dominant(&sentiments)),
                day_of_week: Some(day),
                hour: Some(hour),
            }
        })
        .collect()
}

fn sequence_patterns(
    user_id: &str,
    namespace: &str,
    topical: &[(String, &TranscriptEntry)],
    config: &ReflectionConfig,
) -> Vec<Pattern> {
    let mut topics: Vec<&str> = topical.iter().map(|(t, _)| t.as_str()).collect();
    // Repeating a topic is not a transition
    topics.dedup();
    let mut counts: HashMap<&[&str], usize> = HashMap::new();
    for n in 2..=3 {
        for gram in topics.windows(n) {
            *counts.entry(gram).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .filter(|(_, count)| *count >= config.sequence_min_occurrences)
        .filter_map(|(gram, count)| {
            let (last, before) = gram.split_last()?;
            Some(Pattern {
                name: format!("sequence:{}:{}", user_id, gram.join(">")),
                namespace: namespace.to_string(),
                user_id: user_id.to_string(),
                kind: PatternKind::Sequence,
                frequency: count as u64,
                confidence: (count as f64 / 5.0).min(1.0),
                predicted_action: format!(
                    "After {}, user usually asks about {}",
                    before.join(" then "),
                    last
                ),
                day_of_week: None,
                hour: None,
            })
        })
        .collect()
}

/// Pattern mining module.
pub struct Anticipator {
    graph: Arc<dyn GraphStore>,
    locks: Arc<LockManager>,
    prioritizer: Arc<Prioritizer>,
    config: ReflectionConfig,
}

impl Anticipator {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        locks: Arc<LockManager>,
        prioritizer: Arc<Prioritizer>,
        config: ReflectionConfig,
    ) -> Self {
        Self {
            graph,
            locks,
            prioritizer,
            config,
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<AnticipationReport> {
        let entries =
            load_transcripts(self.locks.store().as_ref(), self.config.transcript_scan_limit)
                .await?;
        let candidates = mine_patterns(&entries, &self.config);

        let mut report = AnticipationReport {
            entries_scanned: entries.len(),
            candidates: candidates.len(),
            ..Default::default()
        };
        for pattern in candidates {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.upsert(pattern, &mut report).await?;
        }

        tracing::debug!(?report, "Anticipation pass complete");
        Ok(report)
    }

    async fn upsert(&self, pattern: Pattern, report: &mut AnticipationReport) -> Result<()> {
        if let Some(existing) = self.graph.find_pattern(&pattern.namespace, &pattern.name).await? {
            match self.prioritizer.reinforce_node(&existing.id).await {
                LockOutcome::Updated => report.reinforced += 1,
                LockOutcome::SkippedContended => report.skipped += 1,
                LockOutcome::Failed(_) => report.failed += 1,
            }
            return Ok(());
        }

        // Creation is locked by name so concurrent cycles cannot both insert
        let key = self.locks.key("anticipation", "create_pattern", &pattern.name);
        let graph = self.graph.clone();
        let mut created = false;
        let created_flag = &mut created;
        let outcome = self
            .locks
            .with_lock(&key, |lease| async move {
                if graph.find_pattern(&pattern.namespace, &pattern.name).await?.is_some() {
                    return Ok(());
                }
                lease.ensure_fresh().await?;
                let name = pattern.name.clone();
                let id = graph.create_node(pattern.into_node()).await?;
                tracing::info!(pattern = %name, node_id = %id, "Discovered pattern");
                *created_flag = true;
                Ok(())
            })
            .await;

        match outcome {
            LockOutcome::Updated if created => report.created += 1,
            LockOutcome::Updated => {}
            LockOutcome::SkippedContended => report.skipped += 1,
            LockOutcome::Failed(_) => report.failed += 1,
        }
        Ok(())
    }

    /// Temporal patterns firing at `now`'s weekday and hour, as alerts.
    pub async fn check_scheduled_patterns(&self, now: DateTime<Utc>) -> Result<Vec<ProactiveAlert>> {
        let patterns = self
            .graph
            .scheduled_patterns(
                now.weekday().num_days_from_monday(),
                now.hour(),
                self.config.scheduled_min_confidence,
            )
            .await?;
        Ok(patterns
            .into_iter()
            .map(|p| ProactiveAlert {
                user_id: p.user_id,
                namespace: p.namespace,
                pattern: p.name,
                predicted_action: p.predicted_action,
                confidence: p.confidence,
            })
            .collect())
    }
}

//! Transcript log entries read by pattern mining
//!
//! Each conversation is a list at `transcript:{user_id}:{conversation_id}`
//! whose elements are JSON-encoded [`TranscriptEntry`] values.

use crate::error::Result;
use crate::lock::LockStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const TRANSCRIPT_PREFIX: &str = "transcript";

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "also", "been", "before", "being", "could", "does", "doing",
    "from", "have", "having", "here", "into", "just", "like", "make", "more", "most", "much",
    "need", "please", "should", "some", "than", "that", "their", "them", "then", "there",
    "these", "they", "this", "those", "very", "want", "were", "what", "when", "where", "which",
    "while", "will", "with", "would", "your",
];

/// One logged exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub user_id: String,
    pub namespace: String,
    pub conversation_id: String,
    pub query: String,
    #[serde(default)]
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// "positive", "negative" or "neutral"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn key(&self) -> String {
        transcript_key(&self.user_id, &self.conversation_id)
    }

    /// Explicit topic, or one extracted from the query
    pub fn topic(&self) -> Option<String> {
        match &self.topic {
            Some(t) if !t.trim().is_empty() => Some(t.trim().to_lowercase()),
            _ => extract_topic(&self.query),
        }
    }
}

pub fn transcript_key(user_id: &str, conversation_id: &str) -> String {
    format!("{}:{}:{}", TRANSCRIPT_PREFIX, user_id, conversation_id)
}

/// Most frequent non-stopword token of at least four characters. Ties go
/// to the earliest token.
pub fn extract_topic(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 4 && !STOPWORDS.contains(t))
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in &tokens {
        *counts.entry(*token).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for token in tokens {
        let count = counts[token];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((token, count));
        }
    }
    best.map(|(t, _)| t.to_string())
}

/// Read up to `key_limit` transcript lists from the store.
///
/// Unparseable entries are skipped.
pub async fn load_transcripts(
    store: &dyn LockStore,
    key_limit: usize,
) -> Result<Vec<TranscriptEntry>> {
    let pattern = format!("{}:*", TRANSCRIPT_PREFIX);
    let keys = store.scan_keys(&pattern, key_limit).await?;

    let mut entries = Vec::new();
    for key in &keys {
        for raw in store.list_range(key, 0, -1).await? {
            match serde_json::from_str::<TranscriptEntry>(&raw) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::debug!(key = %key, error = %e, "Skipping bad transcript entry"),
            }
        }
    }
    tracing::debug!(keys = keys.len(), entries = entries.len(), "Loaded transcripts");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::MemoryLockStore;

    fn entry(user: &str, query: &str, at: &str) -> TranscriptEntry {
        TranscriptEntry {
            user_id: user.to_string(),
            namespace: format!("user_{user}"),
            conversation_id: "c1".to_string(),
            query: query.to_string(),
            response: String::new(),
            topic: None,
            sentiment: None,
            timestamp: at.parse().unwrap(),
        }
    }

    #[test]
    fn test_extract_topic() {
        assert_eq!(
            extract_topic("What is the weather like? Weather looks grim").as_deref(),
            Some("weather")
        );
        assert_eq!(extract_topic("book a flight then a hotel").as_deref(), Some("book"));
        assert_eq!(extract_topic("hi, is it ok?"), None);
    }

    #[test]
    fn test_explicit_topic_wins() {
        let mut e = entry("u1", "check the weather", "2026-01-05T09:00:00Z");
        e.topic = Some(" Travel ".to_string());
        assert_eq!(e.topic().as_deref(), Some("travel"));
        e.topic = Some("  ".to_string());
        assert_eq!(e.topic().as_deref(), Some("check"));
    }

    #[test]
    fn test_entry_json_shape() {
        let e = entry("u1", "coffee order", "2026-01-05T09:00:00Z");
        let json = serde_json::to_value(&e).unwrap();
        assert!(json.get("topic").is_none());
        assert_eq!(json["conversation_id"], "c1");
        assert_eq!(e.key(), "transcript:u1:c1");
    }

    #[tokio::test]
    async fn test_load_transcripts() {
        let store = MemoryLockStore::new();
        let e = entry("u1", "coffee order", "2026-01-05T09:00:00Z");
        store
            .push_list(&e.key(), serde_json::to_string(&e).unwrap())
            .await;
        store.push_list(&e.key(), "not json").await;
        store.push_list("unrelated", "{}").await;

        let loaded = load_transcripts(&store, 1000).await.unwrap();
        assert_eq!(loaded, vec![e]);
    }
}

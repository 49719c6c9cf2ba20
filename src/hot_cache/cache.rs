//! Per-user, per-namespace ring-buffer memory with similarity search

use super::ring::RingBuffer;
use super::similarity::cosine_similarity;
use super::summarize::Summarizer;
use crate::config::HotCacheConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{with_timeout, Result};
use crate::namespace::TimingFloor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use zeroize::Zeroize;

/// One conversational turn held in the hot cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedMessage {
    pub user_id: String,
    pub namespace: String,
    pub query: String,
    pub response: String,
    /// `None` when the embedding call failed
    pub embedding: Option<Vec<f32>>,
    pub timestamp: DateTime<Utc>,
    pub conversation_id: String,
    /// Insertion order across the whole cache, breaks timestamp ties
    pub sequence: u64,
}

impl CachedMessage {
    /// Zeroize conversation text before the message is dropped.
    fn erase(&mut self) {
        self.query.zeroize();
        self.response.zeroize();
        if let Some(embedding) = self.embedding.as_mut() {
            embedding.zeroize();
        }
    }
}

/// A search hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub message: CachedMessage,
    pub similarity: f32,
}

/// Hot cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotCacheStats {
    pub total_users: usize,
    pub total_namespaces: usize,
    pub total_messages: usize,
}

type UserBuffers = HashMap<String, RingBuffer<CachedMessage>>;

/// Short-term conversational memory.
pub struct HotCache {
    /// user_id → namespace → ring buffer
    buffers: Arc<RwLock<HashMap<String, UserBuffers>>>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: HotCacheConfig,
    floor: TimingFloor,
    sequence: AtomicU64,
}

impl HotCache {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: HotCacheConfig) -> Self {
        let floor = TimingFloor::new(config.search_floor());
        Self {
            buffers: Arc::new(RwLock::new(HashMap::new())),
            embedder,
            config,
            floor,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &HotCacheConfig {
        &self.config
    }

    /// Record one exchange.
    ///
    /// Writes without a namespace are dropped silently: an unscoped message
    /// could surface in another tenant's reads. A failed embedding still
    /// stores the message, just without a vector.
    pub async fn store(
        &self,
        user_id: &str,
        namespace: &str,
        query: &str,
        response: &str,
        conversation_id: &str,
    ) -> Result<()> {
        if user_id.is_empty() || namespace.is_empty() {
            tracing::warn!(user_id = %user_id, "Dropping hot cache write without user or namespace");
            return Ok(());
        }

        let embedding = match with_timeout(
            "query embedding",
            self.config.embed_timeout(),
            self.embedder.embed(query),
        )
        .await
        {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    namespace = %namespace,
                    error = %e,
                    "Embedding failed, storing message without vector"
                );
                None
            }
        };

        let message = CachedMessage {
            user_id: user_id.to_string(),
            namespace: namespace.to_string(),
            query: query.to_string(),
            response: response.to_string(),
            embedding,
            timestamp: Utc::now(),
            conversation_id: conversation_id.to_string(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };

        let capacity = self.config.capacity;
        let overwritten = {
            let mut buffers = self.buffers.write().await;
            buffers
                .entry(user_id.to_string())
                .or_default()
                .entry(namespace.to_string())
                .or_insert_with(|| RingBuffer::new(capacity))
                .push(message)
        };
        if let Some(mut old) = overwritten {
            old.erase();
        }

        tracing::debug!(user_id = %user_id, namespace = %namespace, "Stored hot cache message");
        Ok(())
    }

    /// Semantic search within exactly one (user, namespace) buffer.
    ///
    /// Results are sorted by descending similarity, all at or above
    /// `threshold`, at most `top_k`. Every outcome (bad input, embedding
    /// failure, empty buffer, hits) takes at least the configured floor.
    pub async fn search(
        &self,
        user_id: &str,
        namespace: &str,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Vec<SearchResult> {
        let started = Instant::now();
        let results = self.search_unpadded(user_id, namespace, query, top_k, threshold).await;
        self.floor.pad(started).await;
        results
    }

    /// [`search`](Self::search) with the configured `default_top_k` and
    /// `default_threshold`.
    pub async fn search_with_defaults(
        &self,
        user_id: &str,
        namespace: &str,
        query: &str,
    ) -> Vec<SearchResult> {
        self.search(
            user_id,
            namespace,
            query,
            self.config.default_top_k,
            self.config.default_threshold,
        )
        .await
    }

    async fn search_unpadded(
        &self,
        user_id: &str,
        namespace: &str,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Vec<SearchResult> {
        if user_id.is_empty() || namespace.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let query_embedding = match with_timeout(
            "search embedding",
            self.config.embed_timeout(),
            self.embedder.embed(query),
        )
        .await
        {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    namespace = %namespace,
                    error = %e,
                    "Search embedding failed, returning no results"
                );
                return Vec::new();
            }
        };

        // Snapshot under the read lock; score outside it.
        let candidates: Vec<CachedMessage> = {
            let buffers = self.buffers.read().await;
            match buffers.get(user_id).and_then(|b| b.get(namespace)) {
                Some(ring) => ring
                    .iter_newest_first()
                    .filter(|m| m.embedding.is_some())
                    .cloned()
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut results: Vec<SearchResult> = candidates
            .into_iter()
            .filter_map(|message| {
                let similarity =
                    cosine_similarity(&query_embedding, message.embedding.as_deref()?)?;
                (similarity >= threshold).then_some(SearchResult {
                    message,
                    similarity,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);
        results
    }

    /// Most recent `n` messages across all of a user's namespaces.
    ///
    /// Diagnostics only: this read is not namespace-isolated.
    pub async fn get_recent(&self, user_id: &str, n: usize) -> Vec<CachedMessage> {
        let mut messages: Vec<CachedMessage> = {
            let buffers = self.buffers.read().await;
            match buffers.get(user_id) {
                Some(user) => user.values().flat_map(|ring| ring.newest(n)).collect(),
                None => Vec::new(),
            }
        };
        messages.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.sequence.cmp(&a.sequence))
        });
        messages.truncate(n);
        messages
    }

    /// Most recent `n` messages of one namespace, newest first.
    pub async fn recent_in_namespace(
        &self,
        user_id: &str,
        namespace: &str,
        n: usize,
    ) -> Vec<CachedMessage> {
        if namespace.is_empty() {
            return Vec::new();
        }
        self.buffers
            .read()
            .await
            .get(user_id)
            .and_then(|b| b.get(namespace))
            .map(|ring| ring.newest(n))
            .unwrap_or_default()
    }

    /// Drop (and erase) one namespace's buffer. Returns the number of
    /// messages removed.
    pub async fn clear_namespace(&self, user_id: &str, namespace: &str) -> usize {
        let removed = {
            let mut buffers = self.buffers.write().await;
            let Some(user) = buffers.get_mut(user_id) else {
                return 0;
            };
            let ring = user.remove(namespace);
            if user.is_empty() {
                buffers.remove(user_id);
            }
            ring
        };

        let mut count = 0;
        if let Some(mut ring) = removed {
            ring.drain_with(|mut m| {
                m.erase();
                count += 1;
            });
        }
        count
    }

    /// Hand a namespace's accumulated turns (oldest first) to a summarizer.
    /// Returns `None` when there is nothing to summarize.
    pub async fn summarize_namespace(
        &self,
        user_id: &str,
        namespace: &str,
        summarizer: &dyn Summarizer,
    ) -> Result<Option<String>> {
        let mut turns = self
            .recent_in_namespace(user_id, namespace, self.config.capacity)
            .await;
        if turns.is_empty() {
            return Ok(None);
        }
        turns.reverse();
        let summary = summarizer.summarize(&turns).await?;
        Ok(Some(summary))
    }

    pub async fn stats(&self) -> HotCacheStats {
        let buffers = self.buffers.read().await;
        let mut stats = HotCacheStats {
            total_users: buffers.len(),
            ..Default::default()
        };
        for user in buffers.values() {
            stats.total_namespaces += user.len();
            stats.total_messages += user.values().map(|r| r.len()).sum::<usize>();
        }
        stats
    }
}

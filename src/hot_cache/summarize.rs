//! Summarization collaborator
//!
//! An external (usually LLM-backed) service that condenses a namespace's
//! accumulated turns into a text summary. See `HotCache::summarize_namespace`.

use super::cache::CachedMessage;
use crate::error::Result;
use async_trait::async_trait;

/// Condenses conversation turns (oldest first) into a summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, turns: &[CachedMessage]) -> Result<String>;
}

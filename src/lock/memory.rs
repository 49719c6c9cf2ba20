//! In-process lock store
//!
//! Single-node stand-in for the shared store. Expiry is measured with
//! `tokio::time::Instant`, so tests can drive it with paused time.

use super::store::LockStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Default)]
struct StoreState {
    values: HashMap<String, Entry>,
    lists: HashMap<String, Vec<String>>,
}

impl StoreState {
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.values.get(key).is_some_and(|e| !e.is_live(now)) {
            self.values.remove(key);
        }
        self.values.get_mut(key)
    }
}

/// In-memory `LockStore`
#[derive(Default, Clone)]
pub struct MemoryLockStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to a list (right push). Returns the new length.
    pub async fn push_list(&self, key: &str, value: impl Into<String>) -> usize {
        let mut state = self.state.write().await;
        let list = state.lists.entry(key.to_string()).or_default();
        list.push(value.into());
        list.len()
    }
}

/// Match `key` against a glob where `*` matches any run of characters.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !key.starts_with(first) || key.len() < first.len() + last.len() {
        return false;
    }
    let mut rest = &key[first.len()..];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

fn normalize_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_if_absent_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.live(key).is_some() {
            return Ok(false);
        }
        state.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.state.write().await;
        Ok(state.live(key).map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let live = state.live(key).is_some();
        state.values.remove(key);
        let list = state.lists.remove(key).is_some();
        Ok(live || list)
    }

    async fn delete_if_value(&self, key: &str, value: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.live(key).is_some_and(|e| e.value == value) {
            state.values.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.live(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut state = self.state.write().await;
        let current = match state.live(key) {
            Some(entry) => entry.value.parse::<i64>().map_err(|_| {
                Error::LockStore(format!("value at {} is not an integer", key))
            })?,
            None => 0,
        };
        let next = current + 1;
        match state.values.get_mut(key) {
            Some(entry) => entry.value = next.to_string(),
            None => {
                state.values.insert(
                    key.to_string(),
                    Entry {
                        value: next.to_string(),
                        expires_at: None,
                    },
                );
            }
        }
        Ok(next)
    }

    async fn scan_keys(&self, pattern: &str, limit: usize) -> Result<Vec<String>> {
        let now = Instant::now();
        let state = self.state.read().await;
        let mut keys: Vec<String> = state
            .values
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k)
            .chain(state.lists.keys())
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        keys.truncate(limit);
        Ok(keys)
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let Some(list) = state.lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match normalize_range(list.len(), start, stop) {
            Some((start, stop)) => list[start..=stop].to_vec(),
            None => Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("transcript:*", "transcript:u1:c1"));
        assert!(glob_match("transcript:*:c1", "transcript:u1:c1"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
        assert!(!glob_match("transcript:*", "lock:x"));
        assert!(!glob_match("a*a", "a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent_and_expiry() {
        let store = MemoryLockStore::new();
        let ttl = Duration::from_secs(30);
        assert!(store.set_if_absent_with_expiry("k", "one", ttl).await.unwrap());
        assert!(!store.set_if_absent_with_expiry("k", "two", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("one"));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.set_if_absent_with_expiry("k", "two", ttl).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_extends() {
        let store = MemoryLockStore::new();
        store
            .set_if_absent_with_expiry("k", "v", Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.expire("k", Duration::from_secs(10)).await.unwrap());
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.get("k").await.unwrap().is_some());
        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_if_value() {
        let store = MemoryLockStore::new();
        store
            .set_if_absent_with_expiry("k", "mine", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(!store.delete_if_value("k", "theirs").await.unwrap());
        assert!(store.delete_if_value("k", "mine").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_incr() {
        let store = MemoryLockStore::new();
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.incr("c").await.unwrap(), 2);
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("2"));

        store
            .set_if_absent_with_expiry("text", "abc", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(store.incr("text").await.is_err());
    }

    #[tokio::test]
    async fn test_lists_and_scan() {
        let store = MemoryLockStore::new();
        for i in 0..5 {
            store.push_list("transcript:u1:c1", format!("e{i}")).await;
        }
        store.push_list("transcript:u2:c1", "x").await;
        store.push_list("other", "y").await;

        assert_eq!(
            store.list_range("transcript:u1:c1", 0, -1).await.unwrap(),
            vec!["e0", "e1", "e2", "e3", "e4"]
        );
        assert_eq!(
            store.list_range("transcript:u1:c1", -2, -1).await.unwrap(),
            vec!["e3", "e4"]
        );
        assert!(store.list_range("transcript:u1:c1", 7, 9).await.unwrap().is_empty());
        assert!(store.list_range("missing", 0, -1).await.unwrap().is_empty());

        let keys = store.scan_keys("transcript:*", 10).await.unwrap();
        assert_eq!(keys, vec!["transcript:u1:c1", "transcript:u2:c1"]);
        assert_eq!(store.scan_keys("transcript:*", 1).await.unwrap().len(), 1);
    }
}

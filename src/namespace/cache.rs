//! Bounded LRU cache of authorization decisions
//!
//! Holds both positive and negative decisions for a fixed TTL so a burst of
//! checks for the same `(user, namespace)` costs a single directory lookup.
//! When full, the least-recently-used decision is evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Default capacity for the decision cache.
pub const DEFAULT_CAPACITY: usize = 500;

/// Cache key: one decision per (user, namespace) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessKey {
    pub user_id: String,
    pub namespace: String,
}

impl AccessKey {
    pub fn new(user_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.user_id, self.namespace)
    }
}

/// A cached decision and when it stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedAccessResult {
    pub allowed: bool,
    pub expires_at: Instant,
}

impl CachedAccessResult {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// LRU + TTL cache for authorization decisions.
///
/// Hits take the shared lock and bump an atomic recency stamp; only inserts,
/// expiry removal and invalidation take the exclusive lock. Eviction scans
/// for the oldest stamp.
pub struct AccessCache {
    inner: Arc<RwLock<CacheInner>>,
    ttl: Duration,
    clock: AtomicU64,
}

struct CacheEntry {
    result: CachedAccessResult,
    last_used: AtomicU64,
}

struct CacheInner {
    map: HashMap<AccessKey, CacheEntry>,
    capacity: usize,
}

impl CacheInner {
    fn retain(&mut self, mut keep: impl FnMut(&AccessKey) -> bool) -> usize {
        let before = self.map.len();
        self.map.retain(|k, _| keep(k));
        before - self.map.len()
    }

    fn evict_lru(&mut self) -> Option<AccessKey> {
        let lru = self
            .map
            .iter()
            .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
            .map(|(k, _)| k.clone())?;
        self.map.remove(&lru);
        Some(lru)
    }
}

impl AccessCache {
    /// Create a cache with the given capacity and decision lifetime.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                map: HashMap::with_capacity(capacity.min(1024)),
                capacity: capacity.max(1),
            })),
            ttl,
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up a live decision, promoting it to most-recently-used.
    /// Expired entries are dropped on the way.
    pub async fn get(&self, key: &AccessKey) -> Option<bool> {
        let now = Instant::now();
        {
            let inner = self.inner.read().await;
            let entry = inner.map.get(key)?;
            if !entry.result.is_expired(now) {
                entry.last_used.store(self.tick(), Ordering::Relaxed);
                return Some(entry.result.allowed);
            }
        }

        let mut inner = self.inner.write().await;
        if inner
            .map
            .get(key)
            .is_some_and(|e| e.result.is_expired(now))
        {
            inner.map.remove(key);
        }
        None
    }

    /// Store a decision, evicting the LRU entry if at capacity.
    /// Returns the evicted key if eviction occurred.
    pub async fn put(&self, key: AccessKey, allowed: bool) -> Option<AccessKey> {
        let mut inner = self.inner.write().await;
        let evicted = if !inner.map.contains_key(&key) && inner.map.len() >= inner.capacity {
            inner.evict_lru()
        } else {
            None
        };

        inner.map.insert(
            key,
            CacheEntry {
                result: CachedAccessResult {
                    allowed,
                    expires_at: Instant::now() + self.ttl,
                },
                last_used: AtomicU64::new(self.tick()),
            },
        );
        evicted
    }

    /// Drop the decision for one (user, namespace) pair.
    pub async fn invalidate(&self, key: &AccessKey) -> bool {
        self.inner.write().await.map.remove(key).is_some()
    }

    /// Drop every decision for a namespace (e.g. group deletion).
    pub async fn invalidate_namespace(&self, namespace: &str) -> usize {
        self.inner.write().await.retain(|k| k.namespace != namespace)
    }

    /// Drop every decision for a user (e.g. account removal).
    pub async fn invalidate_user(&self, user_id: &str) -> usize {
        self.inner.write().await.retain(|k| k.user_id != user_id)
    }

    /// Drop everything.
    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(user: &str, ns: &str) -> AccessKey {
        AccessKey::new(user, ns)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = AccessCache::new(10, Duration::from_secs(300));
        cache.put(key("u1", "user_u1"), true).await;
        cache.put(key("u1", "group_x"), false).await;

        assert_eq!(cache.get(&key("u1", "user_u1")).await, Some(true));
        assert_eq!(cache.get(&key("u1", "group_x")).await, Some(false));
        assert_eq!(cache.get(&key("u2", "user_u1")).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = AccessCache::new(10, Duration::from_secs(300));
        cache.put(key("u1", "user_u1"), true).await;

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(&key("u1", "user_u1")).await, Some(true));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&key("u1", "user_u1")).await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_capacity_eviction() {
        let cache = AccessCache::new(3, Duration::from_secs(300));
        cache.put(key("u1", "user_a"), true).await;
        cache.put(key("u2", "user_b"), true).await;
        cache.put(key("u3", "user_c"), true).await;

        let evicted = cache.put(key("u4", "user_d"), true).await;
        assert_eq!(evicted, Some(key("u1", "user_a")));
        assert_eq!(cache.len().await, 3);
        assert_eq!(cache.get(&key("u1", "user_a")).await, None);
    }

    #[tokio::test]
    async fn test_get_promotes_to_mru() {
        let cache = AccessCache::new(3, Duration::from_secs(300));
        cache.put(key("u1", "user_a"), true).await;
        cache.put(key("u2", "user_b"), true).await;
        cache.put(key("u3", "user_c"), true).await;

        cache.get(&key("u1", "user_a")).await;

        let evicted = cache.put(key("u4", "user_d"), true).await;
        assert_eq!(evicted, Some(key("u2", "user_b")));
        assert_eq!(cache.get(&key("u1", "user_a")).await, Some(true));
    }

    #[tokio::test]
    async fn test_hit_shares_the_lock() {
        let cache = AccessCache::new(10, Duration::from_secs(300));
        cache.put(key("u1", "user_u1"), true).await;

        let _reader = cache.inner.read().await;
        let hit = tokio::time::timeout(Duration::from_secs(1), cache.get(&key("u1", "user_u1")))
            .await
            .expect("hit should not wait for the reader");
        assert_eq!(hit, Some(true));
    }

    #[tokio::test]
    async fn test_put_same_key_overwrites() {
        let cache = AccessCache::new(3, Duration::from_secs(300));
        cache.put(key("u1", "group_x"), true).await;
        let evicted = cache.put(key("u1", "group_x"), false).await;

        assert!(evicted.is_none());
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&key("u1", "group_x")).await, Some(false));
    }

    #[tokio::test]
    async fn test_invalidate_single() {
        let cache = AccessCache::new(10, Duration::from_secs(300));
        cache.put(key("u1", "group_x"), true).await;
        cache.put(key("u2", "group_x"), true).await;

        assert!(cache.invalidate(&key("u1", "group_x")).await);
        assert!(!cache.invalidate(&key("u1", "group_x")).await);
        assert_eq!(cache.get(&key("u1", "group_x")).await, None);
        assert_eq!(cache.get(&key("u2", "group_x")).await, Some(true));
    }

    #[tokio::test]
    async fn test_invalidate_namespace_and_user() {
        let cache = AccessCache::new(10, Duration::from_secs(300));
        cache.put(key("u1", "group_x"), true).await;
        cache.put(key("u2", "group_x"), true).await;
        cache.put(key("u1", "user_u1"), true).await;
        cache.put(key("u3", "user_u3"), true).await;

        assert_eq!(cache.invalidate_namespace("group_x").await, 2);
        assert_eq!(cache.len().await, 2);

        assert_eq!(cache.invalidate_user("u1").await, 1);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&key("u3", "user_u3")).await, Some(true));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = AccessCache::new(10, Duration::from_secs(300));
        cache.put(key("u1", "group_x"), true).await;
        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(key("u1", "user_u1").to_string(), "u1:user_u1");
    }
}

//! Lock acquisition, renewal and release

use super::key::LockKey;
use super::store::LockStore;
use crate::config::LockConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

/// Result of one guarded mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// The lock was taken and the mutation succeeded
    Updated,
    /// Someone else holds the lock; nothing was attempted
    SkippedContended,
    /// Acquisition or the mutation itself failed
    Failed(String),
}

impl LockOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, LockOutcome::Updated)
    }
}

/// Outcome counters for one component within one reflection cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Handle given to the code running under a lock.
///
/// Call [`LockLease::ensure_fresh`] right before each write: once more than
/// half the TTL has elapsed since acquisition (or the last renewal) the
/// lease is extended by a full TTL, and if the lock has been lost the write
/// must not happen.
#[derive(Clone)]
pub struct LockLease {
    store: Arc<dyn LockStore>,
    key: String,
    token: String,
    ttl: Duration,
    renewed_at: Arc<Mutex<Instant>>,
}

impl LockLease {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn ensure_fresh(&self) -> Result<()> {
        let mut renewed_at = self.renewed_at.lock().await;
        if renewed_at.elapsed() <= self.ttl / 2 {
            return Ok(());
        }

        let holder = self.store.get(&self.key).await?;
        if holder.as_deref() != Some(self.token.as_str()) {
            return Err(Error::LockStore(format!("lock lost: {}", self.key)));
        }
        if !self.store.expire(&self.key, self.ttl).await? {
            return Err(Error::LockStore(format!("lock expired: {}", self.key)));
        }
        *renewed_at = Instant::now();
        tracing::debug!(key = %self.key, "Renewed lock");
        Ok(())
    }
}

/// An acquired lock.
///
/// Prefer [`LockGuard::release`]. If a guard is dropped unreleased (for
/// example when its task is cancelled) the release is spawned onto the
/// current runtime.
pub struct LockGuard {
    lease: LockLease,
    released: bool,
}

impl LockGuard {
    pub fn lease(&self) -> LockLease {
        self.lease.clone()
    }

    /// Delete the key if this guard still owns it
    pub async fn release(mut self) -> Result<bool> {
        self.released = true;
        self.lease
            .store
            .delete_if_value(&self.lease.key, &self.lease.token)
            .await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = self.lease.store.clone();
        let key = self.lease.key.clone();
        let token = self.lease.token.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.delete_if_value(&key, &token).await {
                        tracing::warn!(key = %key, error = %e, "Deferred lock release failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(key = %key, "Lock dropped outside a runtime, left to expire");
            }
        }
    }
}

/// Issues locks against a shared store.
pub struct LockManager {
    store: Arc<dyn LockStore>,
    config: LockConfig,
    /// Cycle the outcome counters are currently attributed to
    cycle: AtomicU64,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>, config: LockConfig) -> Self {
        Self {
            store,
            config,
            cycle: AtomicU64::new(0),
        }
    }

    /// Start attributing outcome counters to a new cycle and return its
    /// number. Outcomes before the first cycle count under cycle 0.
    pub fn begin_cycle(&self) -> u64 {
        self.cycle.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_cycle(&self) -> u64 {
        self.cycle.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl()
    }

    pub fn key(&self, component: &str, operation: &str, resource: &str) -> LockKey {
        LockKey::new(&self.config.key_prefix, component, operation, resource)
    }

    pub fn node_key(&self, node_id: &str) -> LockKey {
        LockKey::node_activation(&self.config.key_prefix, node_id)
    }

    /// Try once to take `key`. `Ok(None)` when it is already held.
    pub async fn try_acquire(&self, key: &LockKey) -> Result<Option<LockGuard>> {
        let key = key.to_string();
        let token = Uuid::new_v4().to_string();
        let ttl = self.config.ttl();
        if !self
            .store
            .set_if_absent_with_expiry(&key, &token, ttl)
            .await?
        {
            return Ok(None);
        }
        Ok(Some(LockGuard {
            lease: LockLease {
                store: self.store.clone(),
                key,
                token,
                ttl,
                renewed_at: Arc::new(Mutex::new(Instant::now())),
            },
            released: false,
        }))
    }

    /// Run `f` while holding `key`.
    ///
    /// Contention skips `f` entirely. The lock is released whether `f`
    /// succeeds or fails.
    pub async fn with_lock<F, Fut>(&self, key: &LockKey, f: F) -> LockOutcome
    where
        F: FnOnce(LockLease) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let guard = match self.try_acquire(key).await {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                tracing::debug!(key = %key, "Lock contended, skipping");
                self.count(key.component(), "skipped").await;
                return LockOutcome::SkippedContended;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Lock acquisition failed");
                self.count(key.component(), "failed").await;
                return LockOutcome::Failed(e.to_string());
            }
        };

        let result = f(guard.lease()).await;

        if let Err(e) = guard.release().await {
            tracing::warn!(key = %key, error = %e, "Lock release failed, left to expire");
        }

        match result {
            Ok(()) => {
                self.count(key.component(), "updated").await;
                LockOutcome::Updated
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Guarded update failed");
                self.count(key.component(), "failed").await;
                LockOutcome::Failed(e.to_string())
            }
        }
    }

    fn stats_key(&self, cycle: u64, component: &str, outcome: &str) -> String {
        format!(
            "{}:stats:{}:{}:{}",
            self.config.key_prefix, cycle, component, outcome
        )
    }

    async fn count(&self, component: &str, outcome: &str) {
        let key = self.stats_key(self.current_cycle(), component, outcome);
        match self.store.incr(&key).await {
            Ok(1) => {
                if let Err(e) = self.store.expire(&key, self.config.stats_ttl()).await {
                    tracing::debug!(key = %key, error = %e, "Failed to set lock counter expiry");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(key = %key, error = %e, "Failed to bump lock counter"),
        }
    }

    /// Outcome counters for one lock component during `cycle`
    pub async fn stats(&self, cycle: u64, component: &str) -> Result<LockStats> {
        let read = |outcome: &'static str| {
            let key = self.stats_key(cycle, component, outcome);
            async move {
                Ok::<u64, Error>(
                    self.store
                        .get(&key)
                        .await?
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0),
                )
            }
        };
        Ok(LockStats {
            updated: read("updated").await?,
            skipped: read("skipped").await?,
            failed: read("failed").await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::MemoryLockStore;

    fn manager() -> (LockManager, MemoryLockStore) {
        let store = MemoryLockStore::new();
        let manager = LockManager::new(Arc::new(store.clone()), LockConfig::default());
        (manager, store)
    }

    #[tokio::test]
    async fn test_with_lock_updates_and_releases() {
        let (locks, store) = manager();
        let key = locks.node_key("n1");

        let outcome = locks.with_lock(&key, |_| async { Ok(()) }).await;
        assert_eq!(outcome, LockOutcome::Updated);
        assert!(store.get(&key.to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_contended_is_skipped() {
        let (locks, _store) = manager();
        let key = locks.node_key("n1");
        let held = locks.try_acquire(&key).await.unwrap().unwrap();

        let mut ran = false;
        let outcome = locks
            .with_lock(&key, |_| {
                ran = true;
                async { Ok(()) }
            })
            .await;
        assert_eq!(outcome, LockOutcome::SkippedContended);
        assert!(!ran);

        assert!(held.release().await.unwrap());
        assert!(locks.with_lock(&key, |_| async { Ok(()) }).await.is_updated());
    }

    #[tokio::test]
    async fn test_failure_still_releases() {
        let (locks, store) = manager();
        let key = locks.node_key("n1");

        let outcome = locks
            .with_lock(&key, |_| async { Err(Error::Graph("boom".to_string())) })
            .await;
        assert!(matches!(outcome, LockOutcome::Failed(msg) if msg.contains("boom")));
        assert!(store.get(&key.to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_does_not_steal() {
        let (locks, store) = manager();
        let key = locks.node_key("n1");
        let guard = locks.try_acquire(&key).await.unwrap().unwrap();

        // Expired and retaken by someone else
        store.delete(&key.to_string()).await.unwrap();
        store
            .set_if_absent_with_expiry(&key.to_string(), "other", Duration::from_secs(30))
            .await
            .unwrap();

        assert!(!guard.release().await.unwrap());
        assert_eq!(
            store.get(&key.to_string()).await.unwrap().as_deref(),
            Some("other")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_attempts_one_wins() {
        let (locks, _store) = manager();
        let key = locks.node_key("n1");

        let slow = || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        };
        let (a, b) = tokio::join!(
            locks.with_lock(&key, |_| slow()),
            locks.with_lock(&key, |_| slow())
        );
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|o| o.is_updated()).count(), 1);
        assert!(outcomes.contains(&LockOutcome::SkippedContended));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_renews_after_half_ttl() {
        let (locks, store) = manager();
        let key = locks.node_key("n1");
        let ttl = locks.ttl();

        let outcome = locks
            .with_lock(&key, |lease| async move {
                tokio::time::sleep(ttl / 2 + Duration::from_secs(1)).await;
                lease.ensure_fresh().await?;
                // Past the original expiry, still held
                tokio::time::sleep(ttl / 2).await;
                assert!(store.get(lease.key()).await?.is_some());
                lease.ensure_fresh().await
            })
            .await;
        assert_eq!(outcome, LockOutcome::Updated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_refuses_write_after_loss() {
        let (locks, store) = manager();
        let key = locks.node_key("n1");
        let ttl = locks.ttl();

        let outcome = locks
            .with_lock(&key, |lease| async move {
                tokio::time::sleep(ttl + Duration::from_secs(1)).await;
                store
                    .set_if_absent_with_expiry(lease.key(), "thief", ttl)
                    .await?;
                lease.ensure_fresh().await
            })
            .await;
        assert!(matches!(outcome, LockOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_dropped_guard_is_released() {
        let (locks, store) = manager();
        let key = locks.node_key("n1");
        drop(locks.try_acquire(&key).await.unwrap().unwrap());

        // Let the spawned release run
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(store.get(&key.to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_counters() {
        let (locks, _store) = manager();
        let key = locks.node_key("n1");
        let held = locks.try_acquire(&key).await.unwrap().unwrap();
        locks.with_lock(&key, |_| async { Ok(()) }).await;
        held.release().await.unwrap();
        locks.with_lock(&key, |_| async { Ok(()) }).await;
        locks
            .with_lock(&key, |_| async { Err(Error::Graph("x".to_string())) })
            .await;

        assert_eq!(
            locks.stats(0, "graph").await.unwrap(),
            LockStats {
                updated: 1,
                skipped: 1,
                failed: 1,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_are_per_cycle_and_expire() {
        let (locks, _store) = manager();
        let key = locks.node_key("n1");
        locks.with_lock(&key, |_| async { Ok(()) }).await;

        let cycle = locks.begin_cycle();
        assert_eq!(cycle, 1);
        let held = locks.try_acquire(&key).await.unwrap().unwrap();
        locks.with_lock(&key, |_| async { Ok(()) }).await;
        held.release().await.unwrap();

        assert_eq!(
            locks.stats(cycle, "graph").await.unwrap(),
            LockStats {
                updated: 0,
                skipped: 1,
                failed: 0,
            }
        );
        assert_eq!(locks.stats(0, "graph").await.unwrap().updated, 1);

        tokio::time::advance(LockConfig::default().stats_ttl() + Duration::from_secs(1)).await;
        assert_eq!(locks.stats(cycle, "graph").await.unwrap(), LockStats::default());
    }
}

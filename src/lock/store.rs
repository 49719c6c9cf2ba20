//! Lock/cache store contract

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Shared key/value store backing distributed locks, counters and the
/// transcript logs read by pattern mining.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key` only if absent, expiring after `ttl`. Returns whether the
    /// value was written.
    async fn set_if_absent_with_expiry(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Returns whether a key was removed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete `key` only while it still holds `value`
    async fn delete_if_value(&self, key: &str, value: &str) -> Result<bool>;

    /// Reset the expiry of an existing key. Returns false if it is gone.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Atomically increment a counter, returning the new value
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Keys matching a `*` glob, at most `limit`
    async fn scan_keys(&self, pattern: &str, limit: usize) -> Result<Vec<String>>;

    /// Elements `start..=stop` of a list; negative indexes count from the end
    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;
}

//! Namespace authorizer
//!
//! Decides whether a user may read/write a namespace. Decisions are cached
//! (LRU + TTL), directory failures collapse to deny, and every return path
//! is padded to the same minimum latency.

use super::cache::{AccessCache, AccessKey};
use super::directory::NamespaceDirectory;
use super::timing::TimingFloor;
use super::validate::{validate_namespace, validate_user_id, NamespaceKind};
use crate::config::AuthorizerConfig;
use crate::error::{with_timeout, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Which question is being asked about a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    Access,
    GroupAdmin,
}

/// Gatekeeper for every namespace-scoped memory operation.
pub struct NamespaceAuthorizer {
    directory: Arc<dyn NamespaceDirectory>,
    access_cache: AccessCache,
    admin_cache: AccessCache,
    floor: TimingFloor,
    lookup_timeout: Duration,
}

impl NamespaceAuthorizer {
    /// Create an authorizer backed by the given directory.
    pub fn new(directory: Arc<dyn NamespaceDirectory>, config: &AuthorizerConfig) -> Self {
        Self {
            directory,
            access_cache: AccessCache::new(config.cache_capacity, config.cache_ttl()),
            admin_cache: AccessCache::new(config.cache_capacity, config.cache_ttl()),
            floor: TimingFloor::new(config.timing_floor()),
            lookup_timeout: config.lookup_timeout(),
        }
    }

    /// Whether `user_id` may read/write `namespace`.
    ///
    /// Returns `Err(Error::Validation)` for empty or malformed input, and
    /// `Ok(false)` both for a real denial and for a failed lookup.
    pub async fn verify_access(&self, user_id: &str, namespace: &str) -> Result<bool> {
        let started = Instant::now();
        let result = self.decide(user_id, namespace, Check::Access).await;
        self.floor.pad(started).await;
        result
    }

    /// Whether `user_id` administers the group `namespace`.
    ///
    /// Non-group namespaces are rejected as a validation error.
    pub async fn verify_group_admin(&self, user_id: &str, namespace: &str) -> Result<bool> {
        let started = Instant::now();
        let result = self.decide(user_id, namespace, Check::GroupAdmin).await;
        self.floor.pad(started).await;
        result
    }

    /// Forget the cached decisions for one (user, namespace) pair.
    /// Must be called when membership or ownership is revoked.
    pub async fn invalidate(&self, user_id: &str, namespace: &str) {
        let key = AccessKey::new(user_id, namespace);
        self.access_cache.invalidate(&key).await;
        self.admin_cache.invalidate(&key).await;
        tracing::debug!(user_id = %user_id, namespace = %namespace, "Invalidated access decision");
    }

    /// Forget every cached decision for a namespace.
    pub async fn invalidate_namespace(&self, namespace: &str) {
        let removed = self.access_cache.invalidate_namespace(namespace).await
            + self.admin_cache.invalidate_namespace(namespace).await;
        tracing::debug!(namespace = %namespace, removed, "Invalidated namespace decisions");
    }

    /// Forget every cached decision for a user.
    pub async fn invalidate_user(&self, user_id: &str) {
        let removed = self.access_cache.invalidate_user(user_id).await
            + self.admin_cache.invalidate_user(user_id).await;
        tracing::debug!(user_id = %user_id, removed, "Invalidated user decisions");
    }

    /// Forget every cached decision.
    pub async fn invalidate_all(&self) {
        self.access_cache.clear().await;
        self.admin_cache.clear().await;
        tracing::debug!("Invalidated all access decisions");
    }

    async fn decide(&self, user_id: &str, namespace: &str, check: Check) -> Result<bool> {
        validate_user_id(user_id)?;
        let kind = validate_namespace(namespace)?;
        if check == Check::GroupAdmin && kind != NamespaceKind::Group {
            return Err(Error::Validation(
                "admin checks require a group namespace".to_string(),
            ));
        }

        let cache = match check {
            Check::Access => &self.access_cache,
            Check::GroupAdmin => &self.admin_cache,
        };
        let key = AccessKey::new(user_id, namespace);
        if let Some(allowed) = cache.get(&key).await {
            return Ok(allowed);
        }

        let lookup = async {
            match (check, kind) {
                (Check::Access, NamespaceKind::User) => {
                    self.directory.owns_namespace(user_id, namespace).await
                }
                (Check::Access, NamespaceKind::Group) => {
                    self.directory.is_group_member(user_id, namespace).await
                }
                (Check::GroupAdmin, _) => self.directory.is_group_admin(user_id, namespace).await,
            }
        };

        match with_timeout("namespace lookup", self.lookup_timeout, lookup).await {
            Ok(allowed) => {
                cache.put(key, allowed).await;
                if !allowed {
                    tracing::debug!(user_id = %user_id, namespace = %namespace, "Namespace access denied");
                }
                Ok(allowed)
            }
            Err(e) => {
                // Fail secure: a failed lookup is a denial, and is not cached.
                tracing::warn!(
                    user_id = %user_id,
                    namespace = %namespace,
                    error = %e,
                    "Namespace lookup failed, denying access"
                );
                Ok(false)
            }
        }
    }
}

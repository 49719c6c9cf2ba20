//! Namespace ownership and group membership lookups
//!
//! The directory is an external collaborator (user/group database). The
//! authorizer only asks it yes/no questions; `StaticDirectory` is an
//! in-process implementation for tests and single-node deployments.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Source of truth for who owns or belongs to a namespace.
#[async_trait]
pub trait NamespaceDirectory: Send + Sync {
    /// Whether `user_id` owns the `user_*` namespace.
    async fn owns_namespace(&self, user_id: &str, namespace: &str) -> Result<bool>;

    /// Whether `user_id` is an active member of the `group_*` namespace.
    async fn is_group_member(&self, user_id: &str, namespace: &str) -> Result<bool>;

    /// Whether `user_id` administers the `group_*` namespace.
    async fn is_group_admin(&self, user_id: &str, namespace: &str) -> Result<bool>;
}

#[derive(Default)]
struct DirectoryState {
    owners: HashMap<String, String>,
    members: HashMap<String, HashSet<String>>,
    admins: HashMap<String, HashSet<String>>,
}

/// In-memory directory.
#[derive(Default)]
pub struct StaticDirectory {
    state: Arc<RwLock<DirectoryState>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a `user_*` namespace to its owner
    pub async fn set_owner(&self, namespace: &str, user_id: &str) {
        self.state
            .write()
            .await
            .owners
            .insert(namespace.to_string(), user_id.to_string());
    }

    /// Add an active member to a group
    pub async fn add_member(&self, namespace: &str, user_id: &str) {
        self.state
            .write()
            .await
            .members
            .entry(namespace.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    /// Remove a member (and any admin role) from a group
    pub async fn remove_member(&self, namespace: &str, user_id: &str) {
        let mut state = self.state.write().await;
        if let Some(members) = state.members.get_mut(namespace) {
            members.remove(user_id);
        }
        if let Some(admins) = state.admins.get_mut(namespace) {
            admins.remove(user_id);
        }
    }

    /// Make a user a group admin (admins are also members)
    pub async fn add_admin(&self, namespace: &str, user_id: &str) {
        let mut state = self.state.write().await;
        state
            .members
            .entry(namespace.to_string())
            .or_default()
            .insert(user_id.to_string());
        state
            .admins
            .entry(namespace.to_string())
            .or_default()
            .insert(user_id.to_string());
    }
}

#[async_trait]
impl NamespaceDirectory for StaticDirectory {
    async fn owns_namespace(&self, user_id: &str, namespace: &str) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .owners
            .get(namespace)
            .is_some_and(|owner| owner == user_id))
    }

    async fn is_group_member(&self, user_id: &str, namespace: &str) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .members
            .get(namespace)
            .is_some_and(|m| m.contains(user_id)))
    }

    async fn is_group_admin(&self, user_id: &str, namespace: &str) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .admins
            .get(namespace)
            .is_some_and(|a| a.contains(user_id)))
    }
}

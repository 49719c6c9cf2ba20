//! Namespace and user id format validation

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Accepted namespace shape
const NAMESPACE_PATTERN: &str = r"^(user|group)_[A-Za-z0-9_-]+$";

fn namespace_regex() -> Result<&'static Regex> {
    static RE: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = RE.get() {
        return Ok(re);
    }
    let re = Regex::new(NAMESPACE_PATTERN).map_err(|e| Error::Internal(e.to_string()))?;
    Ok(RE.get_or_init(|| re))
}

/// Which access rule a namespace falls under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceKind {
    /// `user_*`: owned by exactly one user
    User,
    /// `group_*`: shared by active members
    Group,
}

/// Validate a namespace string and classify it by prefix.
pub fn validate_namespace(namespace: &str) -> Result<NamespaceKind> {
    if namespace.is_empty() {
        return Err(Error::Validation("namespace is required".to_string()));
    }
    if !namespace_regex()?.is_match(namespace) {
        return Err(Error::Validation("namespace format is invalid".to_string()));
    }
    if namespace.starts_with("user_") {
        Ok(NamespaceKind::User)
    } else {
        Ok(NamespaceKind::Group)
    }
}

/// Validate a user id (non-empty, no surrounding whitespace).
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(Error::Validation("user id is required".to_string()));
    }
    if user_id.trim() != user_id {
        return Err(Error::Validation("user id format is invalid".to_string()));
    }
    Ok(())
}

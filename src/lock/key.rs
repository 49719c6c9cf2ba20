//! Typed lock keys

use std::fmt;

/// A lock key: `{prefix}:lock:{component}:{operation}:{resource}`.
///
/// `:` inside the prefix, component or operation is replaced so two
/// different (component, operation) pairs can never render the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    prefix: String,
    component: String,
    operation: String,
    resource: String,
}

fn segment(s: &str) -> String {
    s.replace(':', "_")
}

impl LockKey {
    /// Component of every node-activation lock
    pub const NODE_COMPONENT: &'static str = "graph";

    pub fn new(prefix: &str, component: &str, operation: &str, resource: &str) -> Self {
        Self {
            prefix: segment(prefix),
            component: segment(component),
            operation: segment(operation),
            resource: resource.to_string(),
        }
    }

    /// The key guarding a node's activation score. Every subsystem that
    /// mutates activation shares it.
    pub fn node_activation(prefix: &str, node_id: &str) -> Self {
        Self::new(prefix, Self::NODE_COMPONENT, "activation", node_id)
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:lock:{}:{}:{}",
            self.prefix, self.component, self.operation, self.resource
        )
    }
}

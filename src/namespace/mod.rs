//! Namespace authorization
//!
//! Every memory operation is scoped to a namespace (`user_*` or `group_*`).
//! The [`NamespaceAuthorizer`] decides whether a caller may touch a namespace
//! without letting response latency reveal why, or whether, it was refused.
//!
//! ```text
//! verify_access(user, ns)
//!     │
//!     ├─ validate format ──── invalid ──┐
//!     ├─ AccessCache hit ───────────────┤
//!     └─ NamespaceDirectory lookup ─────┤
//!                                        ▼
//!                             TimingFloor::pad (≥ floor)
//! ```

pub mod authorizer;
pub mod cache;
pub mod directory;
pub mod timing;
pub mod validate;

pub use authorizer::NamespaceAuthorizer;
pub use cache::{AccessCache, AccessKey, CachedAccessResult};
pub use directory::{NamespaceDirectory, StaticDirectory};
pub use timing::TimingFloor;
pub use validate::{validate_namespace, validate_user_id, NamespaceKind};

//! Memoria - Two-tier associative memory for conversational agents
//!
//! Memoria keeps a per-user, per-namespace short-term cache of recent
//! conversation turns and a long-term knowledge graph that a background
//! reflection engine consolidates.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Namespace Authorizer                        │
//! │  - user_{id} owned by that user, group_{id} by membership       │
//! │  - TTL access cache, constant-time responses                    │
//! └──────────────┬──────────────────────────────────┬───────────────┘
//!                │                                  │
//! ┌──────────────▼──────────────┐   ┌───────────────▼───────────────┐
//! │          Hot Cache          │   │        Knowledge Graph        │
//! │  - ring buffer per user+ns  │   │  - typed nodes, activation    │
//! │  - cosine similarity search │   │  - current/superseded edges   │
//! └─────────────────────────────┘   └───────────────▲───────────────┘
//!                                                   │
//!                                   ┌───────────────┴───────────────┐
//!                                   │       Reflection Engine       │
//!                                   │  curation, then in parallel:  │
//!                                   │  prioritization, synthesis,   │
//!                                   │  anticipation                 │
//!                                   └───────────────┬───────────────┘
//!                                                   │ locks, transcripts
//!                                   ┌───────────────▼───────────────┐
//!                                   │   Lock store (memory/Redis)   │
//!                                   └───────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`namespace`]: namespace validation and access control
//! - [`hot_cache`]: short-term conversational memory
//! - [`graph`]: long-term knowledge graph model and stores
//! - [`lock`]: distributed locks for graph mutations
//! - [`reflection`]: the reflection engine and its modules
//! - [`embedding`]: embedding providers
//! - [`config`]: configuration management

pub mod config;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod hot_cache;
pub mod lock;
pub mod namespace;
pub mod reflection;

pub use config::MemoryConfig;
pub use error::{Error, Result};
pub use graph::{GraphStore, MemoryGraphStore};
pub use hot_cache::HotCache;
pub use lock::{LockManager, LockStore, MemoryLockStore};
pub use namespace::NamespaceAuthorizer;
pub use reflection::ReflectionEngine;

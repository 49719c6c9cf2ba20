//! Long-term associative memory graph
//!
//! The graph itself lives in an external store. This module defines the
//! node/edge model, the `GraphStore` contract the reflection engine consumes,
//! and `MemoryGraphStore`, an in-process store used for tests, the CLI and
//! single-node deployments.

pub mod memory;
pub mod store;
pub mod types;

pub use memory::MemoryGraphStore;
pub use store::{GraphQuery, GraphStore, QueryResult};
pub use types::{
    edge_types, Contradiction, Edge, EdgeStatus, Insight, Node, NodeType, PathFacts, Pattern,
    PatternKind,
};

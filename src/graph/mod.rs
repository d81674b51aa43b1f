//! Core hypergraph implementation
//!
//! This module implements the typed element model:
//! - Domain-qualified identities
//! - Entity, relationship and property records with persistent adjacency
//! - Transactional memory stores
//! - The per-domain [`HyperGraph`] and the [`GraphProvider`] trait it shares
//!   with extension overlays

pub mod edge;
pub mod element;
pub mod event;
pub mod node;
pub mod property;
pub mod provider;
pub mod statistics;
pub mod storage;
pub mod store;
pub mod types;

// Re-export main types
pub use edge::{EdgeInfo, EdgeList};
pub use element::{Element, Entity, Relationship};
pub use event::IndexEvent;
pub use node::GraphNode;
pub use property::{PropertyValue, Value, ValueKind};
pub use provider::{ElementIter, GraphProvider, NodeIter};
pub use statistics::{GraphStatistics, StatisticsSnapshot};
pub use store::HyperGraph;
pub use types::{Direction, Identity, NodeType};

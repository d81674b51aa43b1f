//! Persistence adapter interface
//!
//! A domain may be backed by an external store. The graph only reads from
//! it through this narrow, non-transactional interface and hands it the
//! committed changes of each session.

use crate::graph::{Direction, GraphNode, Identity, NodeType, PropertyValue};
use crate::session::{PropertyChange, SessionId, TrackedElement, TrackingData};
use serde::Serialize;

/// A record loaded from an adapter, optionally with its property values
#[derive(Debug, Clone)]
pub struct NodeResult {
    /// Adjacency lists are ignored; edges come from `get_edges`
    pub node: GraphNode,
    pub properties: Vec<(String, PropertyValue)>,
}

impl NodeResult {
    pub fn new(node: GraphNode) -> Self {
        NodeResult {
            node,
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.push((name.into(), value));
        self
    }
}

/// Changes of one domain committed by one session
#[derive(Debug, Clone, Serialize)]
pub struct ChangeSet {
    pub session_id: SessionId,
    pub domain_name: String,
    pub elements: Vec<TrackedElement>,
    pub properties: Vec<PropertyChange>,
}

impl ChangeSet {
    pub fn from_tracking(session_id: SessionId, domain_name: &str, tracking: &TrackingData) -> Self {
        ChangeSet {
            session_id,
            domain_name: domain_name.to_string(),
            elements: tracking
                .involved()
                .filter(|e| e.id.belongs_to(domain_name))
                .cloned()
                .collect(),
            properties: tracking
                .property_changes()
                .filter(|c| c.owner_id.belongs_to(domain_name))
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.properties.is_empty()
    }
}

pub trait PersistenceAdapter: Send + Sync {
    fn get_node(&self, id: &Identity, schema_id: Option<&Identity>) -> anyhow::Result<Option<NodeResult>>;

    /// Every record of `kind`, optionally restricted to one schema
    fn get_nodes(&self, kind: NodeType, schema_id: Option<&Identity>) -> anyhow::Result<Vec<NodeResult>>;

    /// Edge records incident to `id`
    fn get_edges(
        &self,
        id: &Identity,
        direction: Direction,
        schema_id: Option<&Identity>,
        include_properties: bool,
    ) -> anyhow::Result<Vec<NodeResult>>;

    fn get_property(
        &self,
        owner_id: &Identity,
        owner_schema_id: &Identity,
        property: &str,
    ) -> anyhow::Result<Option<PropertyValue>>;

    /// Called once per session that committed changes in the domain
    fn persist(&self, _changes: &ChangeSet) -> anyhow::Result<()> {
        Ok(())
    }
}

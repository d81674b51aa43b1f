//! Stored element records
//!
//! A [`GraphNode`] is the storage record behind every entity, relationship
//! and property value. Records are immutable: every change produces a new
//! record, and readers keep whatever snapshot they were handed.

use super::edge::{EdgeInfo, EdgeList};
use super::property::Value;
use super::types::{Direction, Identity, NodeType};

/// A record in the hypergraph
///
/// Edges always carry `start_id`/`end_id`. An edge present in a node's
/// adjacency list points back to that node through its own start or end.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: Identity,
    pub schema_id: Identity,
    pub kind: NodeType,

    pub start_id: Option<Identity>,
    pub start_schema_id: Option<Identity>,
    pub end_id: Option<Identity>,
    pub end_schema_id: Option<Identity>,

    pub incoming: EdgeList,
    pub outgoing: EdgeList,

    /// Payload of a property record
    pub value: Value,
    /// Version of a property record, 0 for entities and relationships
    pub version: i64,
}

impl GraphNode {
    /// Record for an entity
    pub fn new_entity(id: Identity, schema_id: Identity) -> Self {
        GraphNode {
            id,
            schema_id,
            kind: NodeType::Node,
            start_id: None,
            start_schema_id: None,
            end_id: None,
            end_schema_id: None,
            incoming: EdgeList::new(),
            outgoing: EdgeList::new(),
            value: Value::Null,
            version: 0,
        }
    }

    /// Record for a relationship
    pub fn new_edge(
        id: Identity,
        schema_id: Identity,
        start_id: Identity,
        start_schema_id: Identity,
        end_id: Identity,
        end_schema_id: Identity,
    ) -> Self {
        GraphNode {
            id,
            schema_id,
            kind: NodeType::Edge,
            start_id: Some(start_id),
            start_schema_id: Some(start_schema_id),
            end_id: Some(end_id),
            end_schema_id: Some(end_schema_id),
            incoming: EdgeList::new(),
            outgoing: EdgeList::new(),
            value: Value::Null,
            version: 0,
        }
    }

    /// Record for a property value, keyed by the owner's attribute identity
    pub fn new_property(id: Identity, schema_id: Identity, value: Value, version: i64) -> Self {
        GraphNode {
            id,
            schema_id,
            kind: NodeType::Property,
            start_id: None,
            start_schema_id: None,
            end_id: None,
            end_schema_id: None,
            incoming: EdgeList::new(),
            outgoing: EdgeList::new(),
            value,
            version,
        }
    }

    /// Minimal stub remembering an identity, used by tombstone sets
    pub fn stub(&self) -> GraphNode {
        GraphNode {
            incoming: EdgeList::new(),
            outgoing: EdgeList::new(),
            value: Value::Null,
            ..self.clone()
        }
    }

    pub fn is_edge(&self) -> bool {
        self.kind == NodeType::Edge
    }

    /// Copy of this record with an extra incident edge
    pub fn add_edge(&self, info: EdgeInfo, direction: Direction) -> GraphNode {
        let mut node = self.clone();
        if direction.includes_incoming() {
            node.incoming = node.incoming.insert(info.clone());
        }
        if direction.includes_outgoing() {
            node.outgoing = node.outgoing.insert(info);
        }
        node
    }

    /// Copy of this record without the incident edge `edge_id`
    pub fn remove_edge(&self, edge_id: &Identity, direction: Direction) -> GraphNode {
        let mut node = self.clone();
        if direction.includes_incoming() {
            node.incoming = node.incoming.remove(edge_id);
        }
        if direction.includes_outgoing() {
            node.outgoing = node.outgoing.remove(edge_id);
        }
        node
    }

    /// Incident edges, incoming first
    pub fn edges(&self, direction: Direction) -> impl Iterator<Item = &EdgeInfo> + '_ {
        let incoming = direction
            .includes_incoming()
            .then(|| self.incoming.iter())
            .into_iter()
            .flatten();
        let outgoing = direction
            .includes_outgoing()
            .then(|| self.outgoing.iter())
            .into_iter()
            .flatten();
        incoming.chain(outgoing)
    }

    /// The endpoint opposite to `node_id` for an edge record
    pub fn opposite(&self, node_id: &Identity) -> Option<&Identity> {
        match (&self.start_id, &self.end_id) {
            (Some(start), Some(end)) if start == node_id => Some(end),
            (Some(start), Some(end)) if end == node_id => Some(start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(key: &str) -> Identity {
        Identity::new("lib", key)
    }

    #[test]
    fn test_create_entity_record() {
        let node = GraphNode::new_entity(id("1"), id("Library"));
        assert_eq!(node.kind, NodeType::Node);
        assert!(node.start_id.is_none());
        assert!(node.incoming.is_empty());
        assert!(node.outgoing.is_empty());
    }

    #[test]
    fn test_create_edge_record() {
        let edge = GraphNode::new_edge(id("e"), id("Has"), id("1"), id("Library"), id("2"), id("Book"));
        assert!(edge.is_edge());
        assert_eq!(edge.opposite(&id("1")), Some(&id("2")));
        assert_eq!(edge.opposite(&id("2")), Some(&id("1")));
        assert_eq!(edge.opposite(&id("3")), None);
    }

    #[test]
    fn test_adjacency_is_copy_on_write() {
        let node = GraphNode::new_entity(id("1"), id("Library"));
        let info = EdgeInfo::new(id("e"), id("Has"), id("2"), id("Book"));

        let updated = node.add_edge(info, Direction::Outgoing);
        assert_eq!(updated.outgoing.len(), 1);
        assert!(updated.incoming.is_empty());
        // original record unchanged
        assert!(node.outgoing.is_empty());

        let removed = updated.remove_edge(&id("e"), Direction::Outgoing);
        assert!(removed.outgoing.is_empty());
        assert_eq!(updated.outgoing.len(), 1);
    }

    #[test]
    fn test_edges_by_direction() {
        let node = GraphNode::new_entity(id("1"), id("Library"))
            .add_edge(EdgeInfo::new(id("in"), id("R"), id("0"), id("X")), Direction::Incoming)
            .add_edge(EdgeInfo::new(id("out"), id("R"), id("2"), id("X")), Direction::Outgoing);

        assert_eq!(node.edges(Direction::Incoming).count(), 1);
        assert_eq!(node.edges(Direction::Outgoing).count(), 1);
        assert_eq!(node.edges(Direction::Both).count(), 2);
    }

    #[test]
    fn test_stub_drops_adjacency() {
        let node = GraphNode::new_entity(id("1"), id("Library"))
            .add_edge(EdgeInfo::new(id("out"), id("R"), id("2"), id("X")), Direction::Outgoing);
        let stub = node.stub();
        assert_eq!(stub.id, node.id);
        assert_eq!(stub.schema_id, node.schema_id);
        assert!(stub.outgoing.is_empty());
    }
}

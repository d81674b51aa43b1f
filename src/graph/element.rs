//! Typed views over stored records
//!
//! Enumerations hand out [`Element`] values. Each schema can register its own
//! factory; the default maps entity records to [`Element::Entity`] and edge
//! records to [`Element::Relationship`].

use super::node::GraphNode;
use super::types::{Identity, NodeType};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub id: Identity,
    pub schema_id: Identity,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Identity,
    pub schema_id: Identity,
    pub start_id: Identity,
    pub start_schema_id: Identity,
    pub end_id: Identity,
    pub end_schema_id: Identity,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Element {
    Entity(Entity),
    Relationship(Relationship),
}

impl Element {
    /// Default mapping of a record; `None` for property records
    pub fn from_node(node: &GraphNode) -> Option<Element> {
        match node.kind {
            NodeType::Node => Some(Element::Entity(Entity {
                id: node.id.clone(),
                schema_id: node.schema_id.clone(),
            })),
            NodeType::Edge => Some(Element::Relationship(Relationship {
                id: node.id.clone(),
                schema_id: node.schema_id.clone(),
                start_id: node.start_id.clone()?,
                start_schema_id: node.start_schema_id.clone()?,
                end_id: node.end_id.clone()?,
                end_schema_id: node.end_schema_id.clone()?,
            })),
            NodeType::Property => None,
        }
    }

    pub fn id(&self) -> &Identity {
        match self {
            Element::Entity(e) => &e.id,
            Element::Relationship(r) => &r.id,
        }
    }

    pub fn schema_id(&self) -> &Identity {
        match self {
            Element::Entity(e) => &e.schema_id,
            Element::Relationship(r) => &r.schema_id,
        }
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self, Element::Relationship(_))
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Element::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Element::Relationship(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Entity(e) => write!(f, "{} ({})", e.id, e.schema_id.key()),
            Element::Relationship(r) => write!(
                f,
                "{} ({}) {} -> {}",
                r.id,
                r.schema_id.key(),
                r.start_id,
                r.end_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mapping() {
        let id = |k: &str| Identity::new("lib", k);
        let entity = GraphNode::new_entity(id("1"), id("Book"));
        let edge = GraphNode::new_edge(id("e"), id("Has"), id("0"), id("Library"), id("1"), id("Book"));
        let prop = GraphNode::new_property(id("1+Title"), id("string"), "x".into(), 1);

        let e = Element::from_node(&entity).unwrap();
        assert!(!e.is_relationship());
        assert_eq!(e.id(), &id("1"));

        let r = Element::from_node(&edge).unwrap();
        assert_eq!(r.as_relationship().unwrap().end_id, id("1"));

        assert!(Element::from_node(&prop).is_none());
    }
}

//! Map-backed persistence adapter
//!
//! Keeps records in memory behind the [`PersistenceAdapter`] interface.
//! Useful as a stand-in backing store and for seeding a domain.

use super::adapter::{ChangeSet, NodeResult, PersistenceAdapter};
use crate::graph::{Direction, GraphNode, Identity, NodeType, PropertyValue, Value};
use crate::session::TrackingState;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

struct StoredProperty {
    owner_id: Identity,
    name: String,
    value: PropertyValue,
}

#[derive(Default)]
pub struct InMemoryAdapter {
    records: RwLock<IndexMap<Identity, GraphNode>>,
    properties: RwLock<IndexMap<Identity, StoredProperty>>,
    reads: AtomicUsize,
    persisted: AtomicUsize,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_entity(&self, id: Identity, schema_id: Identity) {
        self.records
            .write()
            .insert(id.clone(), GraphNode::new_entity(id, schema_id));
    }

    pub fn insert_relationship(
        &self,
        id: Identity,
        schema_id: Identity,
        start: (Identity, Identity),
        end: (Identity, Identity),
    ) {
        let edge = GraphNode::new_edge(id.clone(), schema_id, start.0, start.1, end.0, end.1);
        self.records.write().insert(id, edge);
    }

    pub fn set_property(&self, owner_id: &Identity, name: &str, value: Value, version: i64) {
        self.properties.write().insert(
            owner_id.create_attribute_identity(name),
            StoredProperty {
                owner_id: owner_id.clone(),
                name: name.to_string(),
                value: PropertyValue::new(value, version),
            },
        );
    }

    pub fn contains(&self, id: &Identity) -> bool {
        self.records.read().contains_key(id)
    }

    /// Number of `get_*` calls served
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of change sets received
    pub fn persisted_count(&self) -> usize {
        self.persisted.load(Ordering::Relaxed)
    }

    fn properties_of(&self, owner_id: &Identity) -> Vec<(String, PropertyValue)> {
        self.properties
            .read()
            .values()
            .filter(|p| &p.owner_id == owner_id)
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }

    fn result(&self, node: &GraphNode, include_properties: bool) -> NodeResult {
        let mut result = NodeResult::new(node.clone());
        if include_properties {
            result.properties = self.properties_of(&node.id);
        }
        result
    }
}

impl PersistenceAdapter for InMemoryAdapter {
    fn get_node(&self, id: &Identity, _schema_id: Option<&Identity>) -> anyhow::Result<Option<NodeResult>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let records = self.records.read();
        Ok(records.get(id).map(|node| self.result(node, true)))
    }

    /// The schema hint is ignored; the graph filters by inheritance itself
    fn get_nodes(&self, kind: NodeType, _schema_id: Option<&Identity>) -> anyhow::Result<Vec<NodeResult>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|node| node.kind == kind)
            .map(|node| self.result(node, true))
            .collect())
    }

    fn get_edges(
        &self,
        id: &Identity,
        direction: Direction,
        schema_id: Option<&Identity>,
        include_properties: bool,
    ) -> anyhow::Result<Vec<NodeResult>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|node| node.is_edge())
            .filter(|edge| schema_id.map_or(true, |s| &edge.schema_id == s))
            .filter(|edge| {
                (direction.includes_outgoing() && edge.start_id.as_ref() == Some(id))
                    || (direction.includes_incoming() && edge.end_id.as_ref() == Some(id))
            })
            .map(|edge| self.result(edge, include_properties))
            .collect())
    }

    fn get_property(
        &self,
        owner_id: &Identity,
        _owner_schema_id: &Identity,
        property: &str,
    ) -> anyhow::Result<Option<PropertyValue>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let attribute = owner_id.create_attribute_identity(property);
        Ok(self.properties.read().get(&attribute).map(|p| p.value.clone()))
    }

    fn persist(&self, changes: &ChangeSet) -> anyhow::Result<()> {
        self.persisted.fetch_add(1, Ordering::Relaxed);
        {
            let mut records = self.records.write();
            let mut properties = self.properties.write();
            for element in &changes.elements {
                match element.state {
                    TrackingState::Added | TrackingState::Updated => {
                        if records.contains_key(&element.id) {
                            continue;
                        }
                        let node = match (element.kind, &element.start_id, &element.end_id) {
                            (NodeType::Edge, Some(start), Some(end)) => {
                                let start_schema = records.get(start).map(|n| n.schema_id.clone());
                                let end_schema = records.get(end).map(|n| n.schema_id.clone());
                                GraphNode::new_edge(
                                    element.id.clone(),
                                    element.schema_id.clone(),
                                    start.clone(),
                                    start_schema.unwrap_or_else(Identity::empty),
                                    end.clone(),
                                    end_schema.unwrap_or_else(Identity::empty),
                                )
                            }
                            _ => GraphNode::new_entity(element.id.clone(), element.schema_id.clone()),
                        };
                        records.insert(element.id.clone(), node);
                    }
                    TrackingState::Removed => {
                        records.shift_remove(&element.id);
                        properties.retain(|_, p| p.owner_id != element.id);
                    }
                    TrackingState::Unknown => {}
                }
            }
            for change in &changes.properties {
                let attribute = change.owner_id.create_attribute_identity(&change.property);
                match &change.value {
                    Some(value) => {
                        properties.insert(
                            attribute,
                            StoredProperty {
                                owner_id: change.owner_id.clone(),
                                name: change.property.clone(),
                                value: PropertyValue::new(value.clone(), change.version),
                            },
                        );
                    }
                    None => {
                        properties.shift_remove(&attribute);
                    }
                }
            }
        }
        Ok(())
    }
}

//! Read-through cache over a persistence adapter
//!
//! Misses in a domain's memory stores are resolved by asking the adapter and
//! inserting the answer as committed data. Two readers can miss on the same
//! identity at once; the first insert wins and the second quietly uses it.
//! Adapter failures are logged and treated as misses.

use super::adapter::{ChangeSet, NodeResult, PersistenceAdapter};
use crate::domain::schema::primitive_schema_id;
use crate::graph::storage::MemoryStore;
use crate::graph::{Direction, EdgeInfo, EdgeList, GraphNode, Identity, NodeType, PropertyValue};
use crate::session::TrackingState;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct CacheAdapter {
    domain_name: String,
    adapter: Arc<dyn PersistenceAdapter>,
    nodes: Arc<MemoryStore<GraphNode>>,
    properties: Arc<MemoryStore<GraphNode>>,
    loaded_extents: Mutex<FxHashSet<(NodeType, Option<Identity>)>>,
    /// Identities removed through the graph; the adapter may still know them
    forgotten: RwLock<FxHashSet<Identity>>,
}

impl CacheAdapter {
    pub fn new(
        domain_name: impl Into<String>,
        adapter: Arc<dyn PersistenceAdapter>,
        nodes: Arc<MemoryStore<GraphNode>>,
        properties: Arc<MemoryStore<GraphNode>>,
    ) -> Self {
        Self {
            domain_name: domain_name.into(),
            adapter,
            nodes,
            properties,
            loaded_extents: Mutex::new(FxHashSet::default()),
            forgotten: RwLock::new(FxHashSet::default()),
        }
    }

    pub fn adapter(&self) -> &Arc<dyn PersistenceAdapter> {
        &self.adapter
    }

    pub fn is_forgotten(&self, id: &Identity) -> bool {
        self.forgotten.read().contains(id)
    }

    /// Stop resolving `id` through the adapter
    pub fn forget(&self, id: Identity) {
        self.forgotten.write().insert(id);
    }

    /// Resolve `id` through the adapter again
    pub fn remember(&self, id: &Identity) {
        self.forgotten.write().remove(id);
    }

    /// Load an entity or relationship together with its adjacency
    pub fn load_node(&self, id: &Identity, schema_id: Option<&Identity>) -> Option<Arc<GraphNode>> {
        if self.is_forgotten(id) {
            return None;
        }
        match self.adapter.get_node(id, schema_id) {
            Ok(Some(result)) => self.fill(result),
            Ok(None) => None,
            Err(err) => {
                warn!("Adapter for {} failed to load {}: {:#}", self.domain_name, id, err);
                None
            }
        }
    }

    /// Load every record of `kind` (and schema) the first time it is asked for
    pub fn load_extent(&self, kind: NodeType, schema_id: Option<&Identity>) {
        let key = (kind, schema_id.cloned());
        if !self.loaded_extents.lock().insert(key.clone()) {
            return;
        }

        match self.adapter.get_nodes(kind, schema_id) {
            Ok(results) => {
                let mut loaded = 0usize;
                for result in results {
                    if self.is_forgotten(&result.node.id) || self.nodes.contains(None, &result.node.id) {
                        continue;
                    }
                    if self.fill(result).is_some() {
                        loaded += 1;
                    }
                }
                debug!("Loaded {} {} records into {}", loaded, kind, self.domain_name);
            }
            Err(err) => {
                warn!("Adapter for {} failed to enumerate {}: {:#}", self.domain_name, kind, err);
                self.loaded_extents.lock().remove(&key);
            }
        }
    }

    /// Load one property record
    pub fn load_property(
        &self,
        owner_id: &Identity,
        owner_schema_id: &Identity,
        property: &str,
    ) -> Option<Arc<GraphNode>> {
        let attribute = owner_id.create_attribute_identity(property);
        if self.is_forgotten(owner_id) || self.is_forgotten(&attribute) {
            return None;
        }
        match self.adapter.get_property(owner_id, owner_schema_id, property) {
            Ok(Some(value)) => self.fill_property(attribute, value),
            Ok(None) => None,
            Err(err) => {
                warn!("Adapter for {} failed to load {}: {:#}", self.domain_name, attribute, err);
                None
            }
        }
    }

    /// Write-through of the changes a session committed
    pub fn on_session_completed(&self, changes: &ChangeSet) {
        {
            let mut forgotten = self.forgotten.write();
            for element in &changes.elements {
                match element.state {
                    TrackingState::Removed => {
                        forgotten.insert(element.id.clone());
                    }
                    TrackingState::Added | TrackingState::Updated => {
                        forgotten.remove(&element.id);
                    }
                    TrackingState::Unknown => {}
                }
            }
            for change in &changes.properties {
                let attribute = change.owner_id.create_attribute_identity(&change.property);
                match change.value {
                    None => forgotten.insert(attribute),
                    Some(_) => forgotten.remove(&attribute),
                };
            }
        }

        if let Err(err) = self.adapter.persist(changes) {
            warn!(
                "Adapter for {} failed to persist session {}: {:#}",
                self.domain_name, changes.session_id, err
            );
        }
    }

    fn fill(&self, result: NodeResult) -> Option<Arc<GraphNode>> {
        let NodeResult { node, properties } = result;
        if node.kind == NodeType::Property {
            return None;
        }
        let id = node.id.clone();
        let mut record = GraphNode {
            incoming: EdgeList::new(),
            outgoing: EdgeList::new(),
            ..node
        };

        match self.adapter.get_edges(&id, Direction::Both, None, true) {
            Ok(edges) => {
                for edge in edges {
                    let edge_node = &edge.node;
                    if self.is_forgotten(&edge_node.id) {
                        continue;
                    }
                    let (Some(start), Some(start_schema), Some(end), Some(end_schema)) = (
                        &edge_node.start_id,
                        &edge_node.start_schema_id,
                        &edge_node.end_id,
                        &edge_node.end_schema_id,
                    ) else {
                        continue;
                    };
                    if end == &id {
                        record.incoming = record.incoming.insert(EdgeInfo::new(
                            edge_node.id.clone(),
                            edge_node.schema_id.clone(),
                            start.clone(),
                            start_schema.clone(),
                        ));
                    }
                    if start == &id {
                        record.outgoing = record.outgoing.insert(EdgeInfo::new(
                            edge_node.id.clone(),
                            edge_node.schema_id.clone(),
                            end.clone(),
                            end_schema.clone(),
                        ));
                    }
                    self.fill_properties(&edge_node.id, edge.properties);
                }
            }
            Err(err) => {
                warn!("Adapter for {} failed to load edges of {}: {:#}", self.domain_name, id, err);
            }
        }

        self.fill_properties(&id, properties);

        match self.nodes.try_insert_committed(id.clone(), record) {
            Ok(node) => {
                debug!("Loaded {} from adapter", id);
                Some(node)
            }
            Err(_) => {
                debug!("{} was loaded concurrently, keeping the first copy", id);
                self.nodes.get(None, &id)
            }
        }
    }

    fn fill_properties(&self, owner_id: &Identity, properties: Vec<(String, PropertyValue)>) {
        for (name, value) in properties {
            let attribute = owner_id.create_attribute_identity(&name);
            if self.is_forgotten(&attribute) || self.properties.contains(None, &attribute) {
                continue;
            }
            self.fill_property(attribute, value);
        }
    }

    fn fill_property(&self, attribute: Identity, value: PropertyValue) -> Option<Arc<GraphNode>> {
        let record = GraphNode::new_property(
            attribute.clone(),
            primitive_schema_id(value.value.kind()),
            value.value,
            value.current_version,
        );
        match self.properties.try_insert_committed(attribute.clone(), record) {
            Ok(node) => Some(node),
            Err(_) => self.properties.get(None, &attribute),
        }
    }
}

impl fmt::Debug for CacheAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheAdapter")
            .field("domain_name", &self.domain_name)
            .field("loaded_extents", &self.loaded_extents.lock().len())
            .field("forgotten", &self.forgotten.read().len())
            .finish()
    }
}

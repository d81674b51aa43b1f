//! In-memory hypergraph of one domain
//!
//! [`HyperGraph`] turns element-level operations into writes against two
//! transactional memory stores: one for entity and relationship records, one
//! for property records. Every mutation runs inside the session transaction,
//! takes exclusive locks on the identities it touches and records what it did
//! in the session tracking data. Index maintenance and statistics are queued
//! on the transaction and only happen once it commits.
//!
//! A graph may be backed by a persistence adapter, in which case misses are
//! resolved through a [`CacheAdapter`].

use super::edge::EdgeInfo;
use super::event::IndexEvent;
use super::node::GraphNode;
use super::property::{PropertyValue, Value};
use super::provider::{GraphProvider, NodeIter};
use super::statistics::GraphStatistics;
use super::storage::{IndexAction, Lookup, MemoryStore, Transaction, TransactionId};
use super::types::{Direction, Identity, NodeType};
use crate::config::StoreConfig;
use crate::domain::schema::{primitive_schema_id, PropertyDefinition, SchemaProvider};
use crate::error::{HyperGraphError, HyperGraphResult};
use crate::index::{IndexDefinition, IndexManager, PropertyIndex};
use crate::persistence::{CacheAdapter, PersistenceAdapter};
use crate::session::{DomainCommand, LockMode, PropertyChange, Session};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct HyperGraph {
    domain_name: String,
    schema: Arc<dyn SchemaProvider>,
    nodes: Arc<MemoryStore<GraphNode>>,
    properties: Arc<MemoryStore<GraphNode>>,
    indexes: Arc<IndexManager>,
    statistics: Arc<GraphStatistics>,
    statistics_enabled: bool,
    cache: Option<Arc<CacheAdapter>>,
    disposed: AtomicBool,
}

impl HyperGraph {
    pub fn new(domain_name: impl Into<String>, schema: Arc<dyn SchemaProvider>, config: &StoreConfig) -> Self {
        let domain_name = domain_name.into();
        HyperGraph {
            nodes: Arc::new(MemoryStore::new(format!("{}/nodes", domain_name))),
            properties: Arc::new(MemoryStore::new(format!("{}/properties", domain_name))),
            domain_name,
            schema,
            indexes: Arc::new(IndexManager::new()),
            statistics: Arc::new(GraphStatistics::new()),
            statistics_enabled: config.statistics_enabled,
            cache: None,
            disposed: AtomicBool::new(false),
        }
    }

    /// Graph whose misses are resolved through `adapter`
    pub fn with_adapter(
        domain_name: impl Into<String>,
        schema: Arc<dyn SchemaProvider>,
        config: &StoreConfig,
        adapter: Arc<dyn PersistenceAdapter>,
    ) -> Self {
        let mut graph = Self::new(domain_name, schema, config);
        graph.cache = Some(Arc::new(CacheAdapter::new(
            graph.domain_name.clone(),
            adapter,
            graph.nodes.clone(),
            graph.properties.clone(),
        )));
        graph
    }

    pub fn indexes(&self) -> &Arc<IndexManager> {
        &self.indexes
    }

    pub fn statistics(&self) -> &Arc<GraphStatistics> {
        &self.statistics
    }

    pub fn cache(&self) -> Option<&Arc<CacheAdapter>> {
        self.cache.as_ref()
    }

    /// Create an index over the committed content. Creating an index that
    /// already exists returns it unchanged.
    pub fn create_index(&self, definition: IndexDefinition) -> HyperGraphResult<Arc<PropertyIndex>> {
        if let Some(existing) = self.indexes.get_index(&definition.name) {
            return Ok(existing);
        }
        let schema = self.schema.try_get_schema_element(&definition.schema_id)?;
        let kind = if schema.is_relationship() {
            NodeType::Edge
        } else {
            NodeType::Node
        };
        if let Some(cache) = &self.cache {
            cache.load_extent(kind, None);
        }

        let index = self.indexes.create_index(definition);
        let definition = index.definition().clone();
        let mut events = Vec::new();
        let mut seen: FxHashMap<Value, Identity> = FxHashMap::default();
        for node in self.nodes.values(None) {
            if node.kind != kind || !self.schema.is_a(&node.schema_id, &definition.schema_id) {
                continue;
            }
            let Some(record) = self.find_property(None, &node.id, &node.schema_id, &definition.property, false)
            else {
                continue;
            };
            if record.value.is_null() {
                continue;
            }
            if definition.unique && seen.insert(record.value.clone(), node.id.clone()).is_some() {
                self.indexes.drop_index(&definition.name);
                return Err(HyperGraphError::UniqueConstraint {
                    index: definition.name.clone(),
                    value: record.value.clone(),
                });
            }
            events.push(IndexEvent::added(node.id.clone(), record.value.clone()));
        }
        index.apply(&events);
        debug!("Index {} filled with {} entries", definition.name, events.len());
        Ok(index)
    }

    /// Drop every record. Operations on a disposed graph fail.
    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.nodes.clear();
        self.properties.clear();
        self.indexes.clear();
        info!("Graph {} disposed", self.domain_name);
    }

    pub(crate) fn tx_id(session: &Session) -> HyperGraphResult<TransactionId> {
        session.transaction_id().ok_or(HyperGraphError::SessionClosed)
    }

    fn ensure_live(&self, id: &Identity) -> HyperGraphResult<()> {
        if self.is_disposed() {
            Err(HyperGraphError::InvalidElement(id.clone()))
        } else {
            Ok(())
        }
    }

    fn missing(id: &Identity, throw_if_missing: bool) -> HyperGraphResult<bool> {
        if throw_if_missing {
            Err(HyperGraphError::InvalidElement(id.clone()))
        } else {
            Ok(false)
        }
    }

    /// Entity or relationship record visible to `tx`, without locking
    pub(crate) fn find_node(&self, tx: TransactionId, id: &Identity, local_only: bool) -> Option<Arc<GraphNode>> {
        match self.nodes.lookup(Some(tx), id) {
            Lookup::Found(node) => Some(node),
            Lookup::Removed => None,
            Lookup::Missing if local_only => None,
            Lookup::Missing => self.cache.as_ref().and_then(|cache| cache.load_node(id, None)),
        }
    }

    /// Identities of every committed entity and relationship record
    pub(crate) fn committed_identities(&self) -> Vec<Identity> {
        self.nodes.keys(None)
    }

    /// Whether the record of `id` lives in this graph's own store
    pub(crate) fn contains_local(&self, tx: TransactionId, id: &Identity) -> bool {
        self.nodes.contains(Some(tx), id)
    }

    pub(crate) fn find_property(
        &self,
        tx: Option<TransactionId>,
        owner_id: &Identity,
        owner_schema_id: &Identity,
        property: &str,
        local_only: bool,
    ) -> Option<Arc<GraphNode>> {
        let attribute = owner_id.create_attribute_identity(property);
        match self.properties.lookup(tx, &attribute) {
            Lookup::Found(record) => Some(record),
            Lookup::Removed => None,
            Lookup::Missing if local_only => None,
            Lookup::Missing => self
                .cache
                .as_ref()
                .and_then(|cache| cache.load_property(owner_id, owner_schema_id, property)),
        }
    }

    /// Place a copy of `node` without adjacency in this graph, so local
    /// writes have an owner to hang on. Not tracked.
    pub(crate) fn insert_shadow(&self, session: &Session, node: &GraphNode) -> HyperGraphResult<Arc<GraphNode>> {
        let tx = Self::tx_id(session)?;
        if let Some(existing) = self.nodes.get(Some(tx), &node.id) {
            return Ok(existing);
        }
        let shadow = node.stub();
        debug!("Shadowing {} in {}", node.id, self.domain_name);
        session.with_transaction(|tx| self.nodes.put(tx, shadow.id.clone(), shadow))
    }

    fn defer_statistics(&self, tx: &mut Transaction, update: fn(&GraphStatistics)) {
        if self.statistics_enabled {
            let statistics = self.statistics.clone();
            tx.defer(move || update(&statistics));
        }
    }

    fn defer_forget(&self, tx: &mut Transaction, id: &Identity) {
        if let Some(cache) = &self.cache {
            let cache = cache.clone();
            let id = id.clone();
            tx.defer(move || cache.forget(id));
        }
    }

    fn property_removals(&self, node: &GraphNode) -> impl Iterator<Item = DomainCommand> + '_ {
        let owner_id = node.id.clone();
        let owner_schema_id = node.schema_id.clone();
        self.schema
            .get_properties(&node.schema_id)
            .into_iter()
            .map(move |definition| DomainCommand::RemoveProperty {
                owner_id: owner_id.clone(),
                owner_schema_id: owner_schema_id.clone(),
                property: definition.name,
            })
    }

    /// Current value of a property as stored, or never written
    pub(crate) fn current_property(
        &self,
        tx: TransactionId,
        owner: &GraphNode,
        property: &str,
        local_only: bool,
    ) -> PropertyValue {
        match self.find_property(Some(tx), &owner.id, &owner.schema_id, property, local_only) {
            Some(record) => PropertyValue::new(record.value.clone(), record.version),
            None => PropertyValue::missing(),
        }
    }

    /// Store a new version of a property whose owner is locked and resolved.
    /// `current` is the value being replaced.
    pub(crate) fn write_property(
        &self,
        session: &Session,
        owner: &GraphNode,
        definition: &PropertyDefinition,
        value: Value,
        current: PropertyValue,
    ) -> HyperGraphResult<PropertyValue> {
        if !definition.value_kind.accepts(&value) {
            return Err(HyperGraphError::InvalidValue {
                id: owner.id.clone(),
                property: definition.name.clone(),
                value,
            });
        }

        let attribute = owner.id.create_attribute_identity(&definition.name);
        let version = current.current_version + 1;
        let impacted = self
            .indexes
            .impacted(self.schema.as_ref(), &owner.schema_id, &definition.name);

        session.with_transaction(|tx| {
            for index in &impacted {
                if index.conflicts(&owner.id, &value, tx.pending_index_actions()) {
                    return Err(HyperGraphError::UniqueConstraint {
                        index: index.name().to_string(),
                        value: value.clone(),
                    });
                }
            }

            let record = GraphNode::new_property(
                attribute.clone(),
                primitive_schema_id(value.kind()),
                value.clone(),
                version,
            );
            self.properties.put(tx, attribute.clone(), record);

            for index in impacted {
                if current.has_value() && !current.value.is_null() {
                    tx.defer_index_action(IndexAction {
                        index: index.clone(),
                        event: IndexEvent::removed(owner.id.clone(), current.value.clone()),
                    });
                }
                if !value.is_null() {
                    tx.defer_index_action(IndexAction {
                        index,
                        event: IndexEvent::added(owner.id.clone(), value.clone()),
                    });
                }
            }
            self.defer_statistics(tx, GraphStatistics::property_written);
            Ok(())
        })??;

        session.track(|tracking| {
            tracking.on_property_changed(
                owner,
                PropertyChange {
                    owner_id: owner.id.clone(),
                    owner_schema_id: owner.schema_id.clone(),
                    property: definition.name.clone(),
                    value: Some(value.clone()),
                    version,
                },
            )
        });
        debug!("Set {} to {} (v{})", attribute, value, version);

        Ok(PropertyValue {
            value,
            current_version: version,
            old_value: current.value,
        })
    }
}

impl GraphProvider for HyperGraph {
    fn domain_name(&self) -> &str {
        &self.domain_name
    }

    fn schema(&self) -> Arc<dyn SchemaProvider> {
        self.schema.clone()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn as_provider(&self) -> &dyn GraphProvider {
        self
    }

    fn create_entity(&self, session: &Session, id: Identity, schema_id: &Identity) -> HyperGraphResult<Arc<GraphNode>> {
        self.ensure_live(&id)?;
        session.ensure_writable(&id)?;
        if !id.belongs_to(&self.domain_name) {
            return Err(HyperGraphError::InvalidElement(id));
        }
        let schema = self.schema.try_get_schema_element(schema_id)?;
        if !schema.is_entity() {
            return Err(HyperGraphError::InvalidSchema(schema_id.clone()));
        }

        session.acquire_lock(LockMode::Exclusive, &id)?;
        let tx = Self::tx_id(session)?;
        if self.find_node(tx, &id, false).is_some() {
            return Err(HyperGraphError::DuplicateElement(id));
        }

        let node = GraphNode::new_entity(id.clone(), schema_id.clone());
        let stored = session.with_transaction(|tx| {
            let stored = self.nodes.put(tx, id.clone(), node);
            self.defer_statistics(tx, GraphStatistics::entity_created);
            stored
        })?;
        session.track(|tracking| tracking.on_added(&stored));
        debug!("Created entity {} ({})", id, schema_id);
        Ok(stored)
    }

    fn create_relationship(
        &self,
        session: &Session,
        id: Identity,
        schema_id: &Identity,
        start_id: &Identity,
        start_schema_id: &Identity,
        end_id: &Identity,
        end_schema_id: &Identity,
    ) -> HyperGraphResult<Arc<GraphNode>> {
        self.ensure_live(&id)?;
        session.ensure_writable(&id)?;
        if !id.belongs_to(&self.domain_name) {
            return Err(HyperGraphError::InvalidElement(id));
        }
        if !start_id.belongs_to(&self.domain_name) {
            return Err(HyperGraphError::InvalidElement(start_id.clone()));
        }
        let schema = self.schema.try_get_schema_element(schema_id)?;
        if !schema.is_relationship() {
            return Err(HyperGraphError::InvalidSchema(schema_id.clone()));
        }

        let end_is_local = end_id.belongs_to(&self.domain_name);
        session.acquire_lock(LockMode::Exclusive, &id)?;
        session.acquire_lock(LockMode::Exclusive, start_id)?;
        if end_is_local {
            session.acquire_lock(LockMode::Exclusive, end_id)?;
        }

        let tx = Self::tx_id(session)?;
        if self.find_node(tx, &id, false).is_some() {
            return Err(HyperGraphError::DuplicateElement(id));
        }
        let start = self
            .find_node(tx, start_id, false)
            .ok_or_else(|| HyperGraphError::InvalidElement(start_id.clone()))?;
        let end_exists = if end_is_local {
            self.find_node(tx, end_id, false).is_some()
        } else {
            session
                .store()
                .domain_graph(end_id.domain_name())?
                .get_graph_node(session, end_id, false)?
                .is_some()
        };
        if !end_exists {
            return Err(HyperGraphError::InvalidElement(end_id.clone()));
        }

        let edge = GraphNode::new_edge(
            id.clone(),
            schema_id.clone(),
            start_id.clone(),
            start_schema_id.clone(),
            end_id.clone(),
            end_schema_id.clone(),
        );
        let stored = session.with_transaction(|tx| {
            let stored = self.nodes.put(tx, id.clone(), edge);
            let outgoing = EdgeInfo::new(id.clone(), schema_id.clone(), end_id.clone(), end_schema_id.clone());
            self.nodes
                .put(tx, start_id.clone(), start.add_edge(outgoing, Direction::Outgoing));

            // read back after the start write so a self loop keeps both sides
            if end_is_local {
                if let Some(end) = self.nodes.get(Some(tx.id()), end_id) {
                    let incoming =
                        EdgeInfo::new(id.clone(), schema_id.clone(), start_id.clone(), start_schema_id.clone());
                    self.nodes
                        .put(tx, end_id.clone(), end.add_edge(incoming, Direction::Incoming));
                }
            }
            self.defer_statistics(tx, GraphStatistics::relationship_created);
            stored
        })?;
        session.track(|tracking| tracking.on_added(&stored));
        debug!("Created relationship {} ({} -> {})", id, start_id, end_id);
        Ok(stored)
    }

    fn remove_entity(
        &self,
        session: &Session,
        id: &Identity,
        schema_id: &Identity,
        throw_if_missing: bool,
    ) -> HyperGraphResult<bool> {
        self.ensure_live(id)?;
        session.ensure_writable(id)?;
        session.acquire_lock(LockMode::Exclusive, id)?;
        let tx = Self::tx_id(session)?;

        let Some(node) = self.find_node(tx, id, false) else {
            return Self::missing(id, throw_if_missing);
        };
        if node.kind != NodeType::Node {
            return Err(HyperGraphError::InvalidElement(id.clone()));
        }
        if !self.schema.is_a(&node.schema_id, schema_id) {
            return Err(HyperGraphError::InvalidSchema(schema_id.clone()));
        }

        let mut commands: Vec<DomainCommand> = Vec::new();
        for edge in node.edges(Direction::Both) {
            if commands.iter().any(|c| c.target() == &edge.id) {
                continue;
            }
            commands.push(DomainCommand::RemoveRelationship {
                id: edge.id.clone(),
                schema_id: edge.schema_id.clone(),
                throw_if_missing: false,
            });
        }
        commands.extend(self.property_removals(&node));
        session.execute(self, commands)?;

        let removed = session.with_transaction(|tx| {
            let removed = self.nodes.remove(tx, id);
            if removed.is_some() {
                self.defer_statistics(tx, GraphStatistics::entity_removed);
                self.defer_forget(tx, id);
            }
            removed
        })?;
        // an incoming embedded relationship cascades back into this entity;
        // the exclusive lock means only this session could have removed it
        let Some(removed) = removed else {
            debug!("Entity {} already removed by its cascade", id);
            return Ok(true);
        };
        session.track(|tracking| tracking.on_removed(&removed));
        debug!("Removed entity {}", id);
        Ok(true)
    }

    fn remove_relationship(
        &self,
        session: &Session,
        id: &Identity,
        schema_id: &Identity,
        throw_if_missing: bool,
    ) -> HyperGraphResult<bool> {
        self.ensure_live(id)?;
        session.ensure_writable(id)?;
        session.acquire_lock(LockMode::Exclusive, id)?;
        let tx = Self::tx_id(session)?;

        let Some(edge) = self.find_node(tx, id, false) else {
            return Self::missing(id, throw_if_missing);
        };
        if !edge.is_edge() {
            return Err(HyperGraphError::InvalidElement(id.clone()));
        }
        if !self.schema.is_a(&edge.schema_id, schema_id) {
            return Err(HyperGraphError::InvalidSchema(schema_id.clone()));
        }
        let (Some(start_id), Some(end_id)) = (edge.start_id.clone(), edge.end_id.clone()) else {
            return Err(HyperGraphError::InvalidElement(id.clone()));
        };

        // relationships attached to this one go first
        let mut commands: Vec<DomainCommand> = Vec::new();
        for attached in edge.edges(Direction::Both) {
            if attached.id == *id || commands.iter().any(|c| c.target() == &attached.id) {
                continue;
            }
            commands.push(DomainCommand::RemoveRelationship {
                id: attached.id.clone(),
                schema_id: attached.schema_id.clone(),
                throw_if_missing: false,
            });
        }
        commands.extend(self.property_removals(&edge));
        session.execute(self, commands)?;

        let end_is_local = end_id.belongs_to(&self.domain_name);
        session.acquire_lock(LockMode::Exclusive, &start_id)?;
        if end_is_local {
            session.acquire_lock(LockMode::Exclusive, &end_id)?;
        }
        // make sure both ends are resident before detaching
        self.find_node(tx, &start_id, false);
        if end_is_local {
            self.find_node(tx, &end_id, false);
        }

        session.with_transaction(|tx| {
            if let Some(start) = self.nodes.get(Some(tx.id()), &start_id) {
                self.nodes
                    .put(tx, start_id.clone(), start.remove_edge(id, Direction::Outgoing));
            }
            if end_is_local {
                if let Some(end) = self.nodes.get(Some(tx.id()), &end_id) {
                    self.nodes
                        .put(tx, end_id.clone(), end.remove_edge(id, Direction::Incoming));
                }
            }
            self.nodes.remove(tx, id);
            self.defer_statistics(tx, GraphStatistics::relationship_removed);
            self.defer_forget(tx, id);
        })?;
        session.track(|tracking| tracking.on_removed(&edge));
        debug!("Removed relationship {}", id);

        let embedded = self
            .schema
            .get_schema_element(&edge.schema_id)
            .is_some_and(|schema| schema.is_embedded());
        if embedded {
            if let Some(end_schema_id) = edge.end_schema_id.clone() {
                session.execute(
                    self,
                    [DomainCommand::RemoveEntity {
                        id: end_id,
                        schema_id: end_schema_id,
                        throw_if_missing: false,
                    }],
                )?;
            }
        }
        Ok(true)
    }

    fn get_graph_node(
        &self,
        session: &Session,
        id: &Identity,
        local_only: bool,
    ) -> HyperGraphResult<Option<Arc<GraphNode>>> {
        self.ensure_live(id)?;
        session.acquire_read_lock(id)?;
        let tx = Self::tx_id(session)?;
        Ok(self.find_node(tx, id, local_only))
    }

    fn get_graph_nodes<'a>(
        &'a self,
        session: &'a Session,
        kind: NodeType,
        schema_id: Option<&Identity>,
        local_only: bool,
    ) -> NodeIter<'a> {
        let Some(tx) = session.transaction_id() else {
            return Box::new(std::iter::empty());
        };
        if self.is_disposed() {
            return Box::new(std::iter::empty());
        }
        if !local_only {
            if let Some(cache) = &self.cache {
                cache.load_extent(kind, schema_id);
            }
        }
        let store = match kind {
            NodeType::Property => &self.properties,
            NodeType::Node | NodeType::Edge => &self.nodes,
        };
        Box::new(store.values(Some(tx)).filter(move |node| node.kind == kind))
    }

    fn get_edges(
        &self,
        session: &Session,
        id: &Identity,
        direction: Direction,
        schema_id: Option<&Identity>,
    ) -> HyperGraphResult<Vec<EdgeInfo>> {
        let node = self
            .get_graph_node(session, id, false)?
            .ok_or_else(|| HyperGraphError::InvalidElement(id.clone()))?;
        Ok(node
            .edges(direction)
            .filter(|edge| schema_id.map_or(true, |s| self.schema.is_a(&edge.schema_id, s)))
            .cloned()
            .collect())
    }

    fn get_property_value(
        &self,
        session: &Session,
        owner_id: &Identity,
        owner_schema_id: &Identity,
        property: &str,
    ) -> HyperGraphResult<PropertyValue> {
        let owner = self
            .get_graph_node(session, owner_id, false)?
            .ok_or_else(|| HyperGraphError::InvalidElement(owner_id.clone()))?;
        let definition = self
            .schema
            .get_property(&owner.schema_id, property)
            .ok_or_else(|| HyperGraphError::SchemaNotFound(owner_schema_id.create_attribute_identity(property)))?;

        let tx = Self::tx_id(session)?;
        let current = self.current_property(tx, &owner, &definition.name, false);
        if current.has_value() {
            Ok(current)
        } else {
            Ok(PropertyValue::new(definition.default, 0))
        }
    }

    fn set_property_value(
        &self,
        session: &Session,
        owner_id: &Identity,
        owner_schema_id: &Identity,
        property: &str,
        value: Value,
        expected_version: Option<i64>,
    ) -> HyperGraphResult<PropertyValue> {
        self.ensure_live(owner_id)?;
        session.ensure_writable(owner_id)?;
        session.acquire_lock(LockMode::Exclusive, owner_id)?;
        let tx = Self::tx_id(session)?;

        let owner = self
            .find_node(tx, owner_id, false)
            .ok_or_else(|| HyperGraphError::InvalidElement(owner_id.clone()))?;
        let definition = self
            .schema
            .get_property(&owner.schema_id, property)
            .ok_or_else(|| HyperGraphError::SchemaNotFound(owner_schema_id.create_attribute_identity(property)))?;

        let current = self.current_property(tx, &owner, &definition.name, false);
        if let Some(expected) = expected_version {
            if expected != current.current_version {
                return Err(HyperGraphError::VersionConflict {
                    id: owner_id.clone(),
                    expected,
                    actual: current.current_version,
                });
            }
        }
        self.write_property(session, &owner, &definition, value, current)
    }

    fn remove_property_value(
        &self,
        session: &Session,
        owner_id: &Identity,
        owner_schema_id: &Identity,
        property: &str,
    ) -> HyperGraphResult<bool> {
        self.ensure_live(owner_id)?;
        session.ensure_writable(owner_id)?;
        session.acquire_lock(LockMode::Exclusive, owner_id)?;
        let tx = Self::tx_id(session)?;

        let Some(owner) = self.find_node(tx, owner_id, false) else {
            return Ok(false);
        };
        let Some(record) = self.find_property(Some(tx), owner_id, owner_schema_id, property, false) else {
            return Ok(false);
        };
        let name = self
            .schema
            .get_property(&owner.schema_id, property)
            .map_or_else(|| property.to_string(), |d| d.name);
        let impacted = self.indexes.impacted(self.schema.as_ref(), &owner.schema_id, &name);

        session.with_transaction(|tx| {
            self.properties.remove(tx, &record.id);
            if !record.value.is_null() {
                for index in impacted {
                    tx.defer_index_action(IndexAction {
                        index,
                        event: IndexEvent::removed(owner_id.clone(), record.value.clone()),
                    });
                }
            }
            self.defer_forget(tx, &record.id);
        })?;
        session.track(|tracking| {
            tracking.on_property_changed(
                &owner,
                PropertyChange {
                    owner_id: owner_id.clone(),
                    owner_schema_id: owner.schema_id.clone(),
                    property: name.clone(),
                    value: None,
                    version: record.version,
                },
            )
        });
        debug!("Removed property {}", record.id);
        Ok(true)
    }
}

impl fmt::Debug for HyperGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperGraph")
            .field("domain_name", &self.domain_name)
            .field("nodes", &self.nodes)
            .field("properties", &self.properties)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{DomainSchema, SchemaElement};
    use crate::domain::Store;
    use crate::graph::{Element, ValueKind};
    use crate::session::SessionConfiguration;

    fn id(key: &str) -> Identity {
        Identity::new("lib", key)
    }

    fn graph(store: &Store) -> HyperGraph {
        let schema = DomainSchema::new("lib");
        schema
            .register(SchemaElement::entity(id("Library")).with_property("Name", ValueKind::String))
            .unwrap();
        schema
            .register(
                SchemaElement::entity(id("Book"))
                    .with_property("Title", ValueKind::String)
                    .with_property_default("Copies", ValueKind::Integer, Value::Integer(1)),
            )
            .unwrap();
        schema
            .register(SchemaElement::relationship(id("LibraryHasBooks"), id("Library"), id("Book")).embedded())
            .unwrap();
        schema
            .register(SchemaElement::relationship(id("Cites"), id("Book"), id("Book")))
            .unwrap();
        HyperGraph::new("lib", Arc::new(schema), store.config())
    }

    fn has_book(graph: &HyperGraph, session: &Session, library: &str, book: &str) {
        graph.create_entity(session, id(book), &id("Book")).unwrap();
        graph
            .create_relationship(
                session,
                id(&format!("{}-{}", library, book)),
                &id("LibraryHasBooks"),
                &id(library),
                &id("Library"),
                &id(book),
                &id("Book"),
            )
            .unwrap();
    }

    #[test]
    fn test_create_and_get_entity() {
        let store = Store::default();
        let graph = graph(&store);
        let session = store.begin_session(SessionConfiguration::new());

        graph.create_entity(&session, id("1"), &id("Library")).unwrap();
        let element = graph.get_element(&session, &id("1")).unwrap().unwrap();
        assert!(matches!(element, Element::Entity(_)));

        let err = graph.create_entity(&session, id("1"), &id("Library")).unwrap_err();
        assert!(matches!(err, HyperGraphError::DuplicateElement(_)));
        assert!(session.commit().is_committed());
    }

    #[test]
    fn test_create_requires_entity_schema() {
        let store = Store::default();
        let graph = graph(&store);
        let session = store.begin_session(SessionConfiguration::new());

        let err = graph.create_entity(&session, id("1"), &id("Cites")).unwrap_err();
        assert!(matches!(err, HyperGraphError::InvalidSchema(_)));
        let err = graph.create_entity(&session, id("1"), &id("Nope")).unwrap_err();
        assert!(matches!(err, HyperGraphError::SchemaNotFound(_)));
        let err = graph
            .create_entity(&session, Identity::new("other", "1"), &id("Book"))
            .unwrap_err();
        assert!(matches!(err, HyperGraphError::InvalidElement(_)));
    }

    #[test]
    fn test_relationship_updates_adjacency() {
        let store = Store::default();
        let graph = graph(&store);
        let session = store.begin_session(SessionConfiguration::new());

        graph.create_entity(&session, id("lib1"), &id("Library")).unwrap();
        has_book(&graph, &session, "lib1", "b1");

        let out = graph.get_edges(&session, &id("lib1"), Direction::Outgoing, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].end_id, id("b1"));
        let incoming = graph.get_edges(&session, &id("b1"), Direction::Incoming, None).unwrap();
        assert_eq!(incoming[0].end_id, id("lib1"));

        let err = graph
            .create_relationship(
                &session,
                id("bad"),
                &id("LibraryHasBooks"),
                &id("lib1"),
                &id("Library"),
                &id("ghost"),
                &id("Book"),
            )
            .unwrap_err();
        assert!(matches!(err, HyperGraphError::InvalidElement(ref i) if i == &id("ghost")));
    }

    #[test]
    fn test_self_loop_keeps_both_sides() {
        let store = Store::default();
        let graph = graph(&store);
        let session = store.begin_session(SessionConfiguration::new());

        graph.create_entity(&session, id("b1"), &id("Book")).unwrap();
        graph
            .create_relationship(&session, id("loop"), &id("Cites"), &id("b1"), &id("Book"), &id("b1"), &id("Book"))
            .unwrap();
        let both = graph.get_edges(&session, &id("b1"), Direction::Both, None).unwrap();
        assert_eq!(both.len(), 2);

        assert!(graph.remove_entity(&session, &id("b1"), &id("Book"), true).unwrap());
        assert!(graph.get_graph_node(&session, &id("loop"), false).unwrap().is_none());
    }

    #[test]
    fn test_remove_cascades_embedded() {
        let store = Store::default();
        let graph = graph(&store);
        let session = store.begin_session(SessionConfiguration::new());

        graph.create_entity(&session, id("lib1"), &id("Library")).unwrap();
        has_book(&graph, &session, "lib1", "b1");
        has_book(&graph, &session, "lib1", "b2");
        graph
            .create_relationship(&session, id("c"), &id("Cites"), &id("b1"), &id("Book"), &id("b2"), &id("Book"))
            .unwrap();
        graph
            .set_property_value(&session, &id("b1"), &id("Book"), "Title", "Dune".into(), None)
            .unwrap();

        assert!(graph.remove_entity(&session, &id("lib1"), &id("Library"), true).unwrap());
        for key in ["lib1", "b1", "b2", "c", "lib1-b1", "lib1-b2"] {
            assert!(graph.get_graph_node(&session, &id(key), false).unwrap().is_none(), "{}", key);
        }
        assert_eq!(graph.get_entities(&session, None, 0, false).count(), 0);
        assert!(session.commit().is_committed());
    }

    #[test]
    fn test_remove_embedded_child() {
        let store = Store::default();
        let graph = graph(&store);
        let session = store.begin_session(SessionConfiguration::new());

        graph.create_entity(&session, id("lib1"), &id("Library")).unwrap();
        has_book(&graph, &session, "lib1", "b1");
        has_book(&graph, &session, "lib1", "b2");
        assert!(session.commit().is_committed());

        let session = store.begin_session(SessionConfiguration::new());
        assert!(graph.remove_entity(&session, &id("b1"), &id("Book"), true).unwrap());
        assert!(graph.remove_entity(&session, &id("b2"), &id("Book"), false).unwrap());
        assert!(graph.get_graph_node(&session, &id("lib1-b1"), false).unwrap().is_none());
        assert!(graph
            .get_edges(&session, &id("lib1"), Direction::Outgoing, None)
            .unwrap()
            .is_empty());
        assert!(graph.get_graph_node(&session, &id("lib1"), false).unwrap().is_some());
        assert!(session.commit().is_committed());
        assert_eq!(graph.statistics().snapshot().entity_count(), 1);
    }

    #[test]
    fn test_remove_missing() {
        let store = Store::default();
        let graph = graph(&store);
        let session = store.begin_session(SessionConfiguration::new());

        assert!(!graph.remove_entity(&session, &id("x"), &id("Book"), false).unwrap());
        let err = graph.remove_entity(&session, &id("x"), &id("Book"), true).unwrap_err();
        assert!(matches!(err, HyperGraphError::InvalidElement(_)));
    }

    #[test]
    fn test_property_versions() {
        let store = Store::default();
        let graph = graph(&store);
        let session = store.begin_session(SessionConfiguration::new());
        graph.create_entity(&session, id("b1"), &id("Book")).unwrap();

        let initial = graph.get_property_value(&session, &id("b1"), &id("Book"), "Copies").unwrap();
        assert_eq!(initial.value, Value::Integer(1));
        assert!(!initial.has_value());

        let first = graph
            .set_property_value(&session, &id("b1"), &id("Book"), "Title", "Dune".into(), Some(0))
            .unwrap();
        assert_eq!(first.current_version, 1);
        let second = graph
            .set_property_value(&session, &id("b1"), &id("Book"), "title", "Emma".into(), None)
            .unwrap();
        assert_eq!(second.current_version, 2);
        assert_eq!(second.old_value, Value::from("Dune"));

        let err = graph
            .set_property_value(&session, &id("b1"), &id("Book"), "Title", "X".into(), Some(1))
            .unwrap_err();
        assert!(matches!(err, HyperGraphError::VersionConflict { expected: 1, actual: 2, .. }));

        let err = graph
            .set_property_value(&session, &id("b1"), &id("Book"), "Copies", "many".into(), None)
            .unwrap_err();
        assert!(matches!(err, HyperGraphError::InvalidValue { .. }));

        let err = graph
            .set_property_value(&session, &id("b1"), &id("Book"), "Author", "X".into(), None)
            .unwrap_err();
        assert!(matches!(err, HyperGraphError::SchemaNotFound(_)));
    }

    #[test]
    fn test_unique_index() {
        let store = Store::default();
        let graph = graph(&store);
        let index = graph
            .create_index(IndexDefinition::new("book_title", id("Book"), "Title", true))
            .unwrap();

        let session = store.begin_session(SessionConfiguration::new());
        graph.create_entity(&session, id("b1"), &id("Book")).unwrap();
        graph.create_entity(&session, id("b2"), &id("Book")).unwrap();
        graph
            .set_property_value(&session, &id("b1"), &id("Book"), "Title", "Dune".into(), None)
            .unwrap();
        let err = graph
            .set_property_value(&session, &id("b2"), &id("Book"), "Title", "Dune".into(), None)
            .unwrap_err();
        assert!(matches!(err, HyperGraphError::UniqueConstraint { .. }));
        assert!(index.is_empty());

        assert!(session.commit().is_committed());
        assert_eq!(index.get(&Value::from("Dune")), vec![id("b1")]);
    }

    #[test]
    fn test_statistics_follow_commits() {
        let store = Store::default();
        let graph = graph(&store);

        let session = store.begin_session(SessionConfiguration::new());
        graph.create_entity(&session, id("b1"), &id("Book")).unwrap();
        session.abort();
        assert_eq!(graph.statistics().snapshot().entity_count(), 0);

        let session = store.begin_session(SessionConfiguration::new());
        graph.create_entity(&session, id("b1"), &id("Book")).unwrap();
        session.commit();
        assert_eq!(graph.statistics().snapshot().entity_count(), 1);
    }

    #[test]
    fn test_disposed_graph_rejects_operations() {
        let store = Store::default();
        let graph = graph(&store);
        let session = store.begin_session(SessionConfiguration::new());
        graph.create_entity(&session, id("b1"), &id("Book")).unwrap();
        session.commit();

        graph.dispose();
        let session = store.begin_session(SessionConfiguration::new());
        let err = graph.get_graph_node(&session, &id("b1"), false).unwrap_err();
        assert!(matches!(err, HyperGraphError::InvalidElement(_)));
    }
}

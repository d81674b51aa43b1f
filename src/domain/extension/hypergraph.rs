//! Extension overlay graph
//!
//! Reads resolve through three layers: a tombstoned identity is gone, a
//! record in the extension's own graph comes next, the base graph last.
//! Records present in both layers are merged so the adjacency seen by callers
//! holds the edges of both, minus tombstoned ones.
//!
//! Writes land in the extension's own graph. Owners living in the base are
//! shadowed locally first so local edges and properties have something to
//! hang on. In `Updatable` mode removals and property writes on base
//! elements pass through to the base as well.

use super::ExtendedMode;
use crate::domain::schema::{primitive_schema_id, SchemaProvider};
use crate::error::{HyperGraphError, HyperGraphResult};
use crate::graph::storage::{MemoryStore, TransactionId};
use crate::graph::{
    Direction, EdgeInfo, GraphNode, GraphProvider, HyperGraph, Identity, NodeIter, NodeType, PropertyValue, Value,
};
use crate::session::{DomainCommand, LockMode, PropertyChange, Session};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct DomainExtensionHyperGraph {
    base: Arc<dyn GraphProvider>,
    local: HyperGraph,
    tombstones: Arc<MemoryStore<GraphNode>>,
    mode: ExtendedMode,
    /// Locked `Shared` by every session working through the overlay;
    /// detaching takes it `ExclusiveWait`
    sentinel: Identity,
    disposed: AtomicBool,
}

impl DomainExtensionHyperGraph {
    pub fn new(
        base: Arc<dyn GraphProvider>,
        local: HyperGraph,
        tombstones: Arc<MemoryStore<GraphNode>>,
        mode: ExtendedMode,
        sentinel: Identity,
    ) -> Self {
        DomainExtensionHyperGraph {
            base,
            local,
            tombstones,
            mode,
            sentinel,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> ExtendedMode {
        self.mode
    }

    pub fn base(&self) -> &Arc<dyn GraphProvider> {
        &self.base
    }

    /// The extension's own layer
    pub fn local(&self) -> &HyperGraph {
        &self.local
    }

    /// Number of committed tombstones
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len(None)
    }

    /// Identities whose visibility depends on this overlay
    pub(crate) fn overlay_identities(&self) -> Vec<Identity> {
        let mut ids = self.local.committed_identities();
        ids.extend(self.tombstones.keys(None));
        ids
    }

    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.local.dispose();
        self.tombstones.clear();
        info!("Extension of {} disposed", self.base.domain_name());
    }

    pub(crate) fn sentinel(&self) -> &Identity {
        &self.sentinel
    }

    /// Join the sessions working through this overlay, then check it is
    /// still attached
    fn enter(&self, session: &Session, id: &Identity, write: bool) -> HyperGraphResult<()> {
        if write {
            session.acquire_lock(LockMode::Shared, &self.sentinel)?;
        } else {
            session.acquire_read_lock(&self.sentinel)?;
        }
        self.ensure_live(id)
    }

    fn ensure_live(&self, id: &Identity) -> HyperGraphResult<()> {
        if self.is_disposed() {
            Err(HyperGraphError::InvalidElement(id.clone()))
        } else {
            Ok(())
        }
    }

    fn is_tombstoned(&self, tx: TransactionId, id: &Identity) -> bool {
        self.tombstones.contains(Some(tx), id)
    }

    fn tombstone(&self, session: &Session, node: &GraphNode) -> HyperGraphResult<()> {
        debug!("Tombstoned {}", node.id);
        session.with_transaction(|tx| {
            self.tombstones.put(tx, node.id.clone(), node.stub());
        })
    }

    fn clear_tombstone(&self, session: &Session, id: &Identity) -> HyperGraphResult<()> {
        session.with_transaction(|tx| {
            if self.tombstones.remove(tx, id).is_some() {
                debug!("Resurrected {}", id);
            }
        })
    }

    fn in_base(&self, session: &Session, id: &Identity) -> HyperGraphResult<bool> {
        Ok(self.base.get_graph_node(session, id, false)?.is_some())
    }

    /// Drop tombstoned edges from a record's adjacency
    fn visible(&self, tx: TransactionId, node: Arc<GraphNode>) -> Arc<GraphNode> {
        let hidden: Vec<Identity> = node
            .edges(Direction::Both)
            .filter(|edge| self.is_tombstoned(tx, &edge.id))
            .map(|edge| edge.id.clone())
            .collect();
        if hidden.is_empty() {
            return node;
        }
        let mut copy = node.as_ref().clone();
        for id in &hidden {
            copy = copy.remove_edge(id, Direction::Both);
        }
        Arc::new(copy)
    }

    /// Local record with the base adjacency folded in
    fn merge(&self, tx: TransactionId, local: &GraphNode, base: &GraphNode) -> GraphNode {
        let mut node = local.clone();
        for edge in base.incoming.iter() {
            if !node.incoming.contains(&edge.id) && !self.is_tombstoned(tx, &edge.id) {
                node.incoming = node.incoming.insert(edge.clone());
            }
        }
        for edge in base.outgoing.iter() {
            if !node.outgoing.contains(&edge.id) && !self.is_tombstoned(tx, &edge.id) {
                node.outgoing = node.outgoing.insert(edge.clone());
            }
        }
        node
    }

    /// Record of `id` as the overlay sees it, without taking a lock of its own
    fn resolve(
        &self,
        session: &Session,
        tx: TransactionId,
        id: &Identity,
        local_only: bool,
    ) -> HyperGraphResult<Option<Arc<GraphNode>>> {
        if self.is_tombstoned(tx, id) {
            return Ok(None);
        }
        let local = self.local.find_node(tx, id, false);
        if local_only {
            return Ok(local.map(|node| self.visible(tx, node)));
        }
        let base = self.base.get_graph_node(session, id, false)?;
        Ok(match (local, base) {
            (Some(local), Some(base)) => Some(Arc::new(self.merge(tx, &local, &base))),
            (Some(local), None) => Some(self.visible(tx, local)),
            (None, Some(base)) => Some(self.visible(tx, base)),
            (None, None) => None,
        })
    }

    /// Property value across the layers, or never written
    fn current_property(
        &self,
        session: &Session,
        tx: TransactionId,
        owner: &GraphNode,
        property: &str,
    ) -> HyperGraphResult<PropertyValue> {
        if self.is_tombstoned(tx, &owner.id.create_attribute_identity(property)) {
            return Ok(PropertyValue::missing());
        }
        let local = self.local.current_property(tx, owner, property, false);
        if local.has_value() {
            return Ok(local);
        }
        match self
            .base
            .get_property_value(session, &owner.id, &owner.schema_id, property)
        {
            Ok(value) if value.has_value() => Ok(value),
            Ok(_) | Err(HyperGraphError::InvalidElement(_)) | Err(HyperGraphError::SchemaNotFound(_)) => {
                Ok(PropertyValue::missing())
            }
            Err(err) => Err(err),
        }
    }

    fn shadow_endpoint(&self, session: &Session, tx: TransactionId, id: &Identity) -> HyperGraphResult<()> {
        session.acquire_lock(LockMode::Exclusive, id)?;
        let node = self
            .resolve(session, tx, id, false)?
            .ok_or_else(|| HyperGraphError::InvalidElement(id.clone()))?;
        self.local.insert_shadow(session, &node)?;
        Ok(())
    }

    fn missing(id: &Identity, throw_if_missing: bool) -> HyperGraphResult<bool> {
        if throw_if_missing {
            Err(HyperGraphError::InvalidElement(id.clone()))
        } else {
            Ok(false)
        }
    }

    fn property_removals(&self, node: &GraphNode) -> Vec<DomainCommand> {
        self.schema()
            .get_properties(&node.schema_id)
            .into_iter()
            .map(|definition| DomainCommand::RemoveProperty {
                owner_id: node.id.clone(),
                owner_schema_id: node.schema_id.clone(),
                property: definition.name,
            })
            .collect()
    }
}

impl GraphProvider for DomainExtensionHyperGraph {
    fn domain_name(&self) -> &str {
        self.local.domain_name()
    }

    fn schema(&self) -> Arc<dyn SchemaProvider> {
        self.local.schema()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire) || self.base.is_disposed()
    }

    fn as_provider(&self) -> &dyn GraphProvider {
        self
    }

    fn create_entity(&self, session: &Session, id: Identity, schema_id: &Identity) -> HyperGraphResult<Arc<GraphNode>> {
        self.enter(session, &id, true)?;
        session.ensure_writable(&id)?;
        session.acquire_lock(LockMode::Exclusive, &id)?;
        let tx = HyperGraph::tx_id(session)?;
        if self.resolve(session, tx, &id, false)?.is_some() {
            return Err(HyperGraphError::DuplicateElement(id));
        }
        self.clear_tombstone(session, &id)?;
        self.local.create_entity(session, id, schema_id)
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
        self.enter(session, &id, true)?;
        session.ensure_writable(&id)?;
        session.acquire_lock(LockMode::Exclusive, &id)?;
        let tx = HyperGraph::tx_id(session)?;
        if self.resolve(session, tx, &id, false)?.is_some() {
            return Err(HyperGraphError::DuplicateElement(id));
        }

        if start_id.belongs_to(self.domain_name()) {
            self.shadow_endpoint(session, tx, start_id)?;
        }
        if end_id.belongs_to(self.domain_name()) {
            self.shadow_endpoint(session, tx, end_id)?;
        }
        self.clear_tombstone(session, &id)?;
        self.local.create_relationship(
            session,
            id,
            schema_id,
            start_id,
            start_schema_id,
            end_id,
            end_schema_id,
        )
    }

    fn remove_entity(
        &self,
        session: &Session,
        id: &Identity,
        schema_id: &Identity,
        throw_if_missing: bool,
    ) -> HyperGraphResult<bool> {
        self.enter(session, id, true)?;
        session.ensure_writable(id)?;
        session.acquire_lock(LockMode::Exclusive, id)?;
        let tx = HyperGraph::tx_id(session)?;

        let Some(node) = self.resolve(session, tx, id, false)? else {
            return Self::missing(id, throw_if_missing);
        };
        if node.kind != NodeType::Node {
            return Err(HyperGraphError::InvalidElement(id.clone()));
        }
        if !self.schema().is_a(&node.schema_id, schema_id) {
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

        self.tombstone(session, &node)?;
        let removed_locally = self.local.remove_entity(session, id, schema_id, false)?;
        let removed_in_base = match self.mode {
            ExtendedMode::Updatable if self.in_base(session, id)? => {
                self.base.remove_entity(session, id, schema_id, false)?
            }
            _ => false,
        };
        if !removed_locally && !removed_in_base {
            session.track(|tracking| tracking.on_removed(&node));
        }
        debug!("Removed entity {} through extension", id);
        Ok(true)
    }

    fn remove_relationship(
        &self,
        session: &Session,
        id: &Identity,
        schema_id: &Identity,
        throw_if_missing: bool,
    ) -> HyperGraphResult<bool> {
        self.enter(session, id, true)?;
        session.ensure_writable(id)?;
        session.acquire_lock(LockMode::Exclusive, id)?;
        let tx = HyperGraph::tx_id(session)?;

        let Some(edge) = self.resolve(session, tx, id, false)? else {
            return Self::missing(id, throw_if_missing);
        };
        if !edge.is_edge() {
            return Err(HyperGraphError::InvalidElement(id.clone()));
        }
        if !self.schema().is_a(&edge.schema_id, schema_id) {
            return Err(HyperGraphError::InvalidSchema(schema_id.clone()));
        }

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

        self.tombstone(session, &edge)?;
        let removed_locally = self.local.remove_relationship(session, id, schema_id, false)?;
        let removed_in_base = match self.mode {
            ExtendedMode::Updatable if self.in_base(session, id)? => {
                self.base.remove_relationship(session, id, schema_id, false)?
            }
            _ => false,
        };
        if !removed_locally && !removed_in_base {
            session.track(|tracking| tracking.on_removed(&edge));
        }
        debug!("Removed relationship {} through extension", id);

        let embedded = self
            .schema()
            .get_schema_element(&edge.schema_id)
            .is_some_and(|schema| schema.is_embedded());
        if let (true, Some(end_id), Some(end_schema_id)) = (embedded, &edge.end_id, &edge.end_schema_id) {
            session.execute(
                self,
                [DomainCommand::RemoveEntity {
                    id: end_id.clone(),
                    schema_id: end_schema_id.clone(),
                    throw_if_missing: false,
                }],
            )?;
        }
        Ok(true)
    }

    fn get_graph_node(
        &self,
        session: &Session,
        id: &Identity,
        local_only: bool,
    ) -> HyperGraphResult<Option<Arc<GraphNode>>> {
        self.enter(session, id, false)?;
        session.acquire_read_lock(id)?;
        let tx = HyperGraph::tx_id(session)?;
        self.resolve(session, tx, id, local_only)
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
        if let Err(err) = session.acquire_read_lock(&self.sentinel) {
            warn!("Enumeration of {} skipped: {}", self.domain_name(), err);
            return Box::new(std::iter::empty());
        }

        let local = self
            .local
            .get_graph_nodes(session, kind, schema_id, false)
            .filter(move |node| !self.is_tombstoned(tx, &node.id));
        if local_only {
            return Box::new(local);
        }
        let base = self
            .base
            .get_graph_nodes(session, kind, schema_id, false)
            .filter(move |node| !self.is_tombstoned(tx, &node.id) && !self.local.contains_local(tx, &node.id));
        Box::new(local.chain(base))
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
        let schema = self.schema();
        Ok(node
            .edges(direction)
            .filter(|edge| schema_id.map_or(true, |s| schema.is_a(&edge.schema_id, s)))
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
            .schema()
            .get_property(&owner.schema_id, property)
            .ok_or_else(|| HyperGraphError::SchemaNotFound(owner_schema_id.create_attribute_identity(property)))?;

        let tx = HyperGraph::tx_id(session)?;
        let current = self.current_property(session, tx, &owner, &definition.name)?;
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
        self.enter(session, owner_id, true)?;
        session.ensure_writable(owner_id)?;
        session.acquire_lock(LockMode::Exclusive, owner_id)?;
        let tx = HyperGraph::tx_id(session)?;

        let owner = self
            .resolve(session, tx, owner_id, false)?
            .ok_or_else(|| HyperGraphError::InvalidElement(owner_id.clone()))?;
        let definition = self
            .schema()
            .get_property(&owner.schema_id, property)
            .ok_or_else(|| HyperGraphError::SchemaNotFound(owner_schema_id.create_attribute_identity(property)))?;
        let attribute = owner_id.create_attribute_identity(&definition.name);

        if self.mode == ExtendedMode::Updatable && self.in_base(session, owner_id)? {
            self.clear_tombstone(session, &attribute)?;
            return self
                .base
                .set_property_value(session, owner_id, owner_schema_id, property, value, expected_version);
        }

        let current = self.current_property(session, tx, &owner, &definition.name)?;
        if let Some(expected) = expected_version {
            if expected != current.current_version {
                return Err(HyperGraphError::VersionConflict {
                    id: owner_id.clone(),
                    expected,
                    actual: current.current_version,
                });
            }
        }
        self.clear_tombstone(session, &attribute)?;
        self.local.insert_shadow(session, &owner)?;
        self.local
            .write_property(session, &owner, &definition, value, current)
    }

    fn remove_property_value(
        &self,
        session: &Session,
        owner_id: &Identity,
        owner_schema_id: &Identity,
        property: &str,
    ) -> HyperGraphResult<bool> {
        self.enter(session, owner_id, true)?;
        session.ensure_writable(owner_id)?;
        session.acquire_lock(LockMode::Exclusive, owner_id)?;
        let tx = HyperGraph::tx_id(session)?;

        let Some(owner) = self.resolve(session, tx, owner_id, false)? else {
            return Ok(false);
        };
        let name = self
            .schema()
            .get_property(&owner.schema_id, property)
            .map_or_else(|| property.to_string(), |d| d.name);
        let current = self.current_property(session, tx, &owner, &name)?;
        if !current.has_value() {
            return Ok(false);
        }

        let attribute = owner_id.create_attribute_identity(&name);
        let stub = GraphNode::new_property(
            attribute,
            primitive_schema_id(current.value.kind()),
            Value::Null,
            current.current_version,
        );
        self.tombstone(session, &stub)?;

        let removed_locally = self
            .local
            .remove_property_value(session, owner_id, owner_schema_id, &name)?;
        let removed_in_base = match self.mode {
            ExtendedMode::Updatable => self
                .base
                .remove_property_value(session, owner_id, owner_schema_id, &name)?,
            ExtendedMode::ReadOnly => false,
        };
        if !removed_locally && !removed_in_base {
            session.track(|tracking| {
                tracking.on_property_changed(
                    &owner,
                    PropertyChange {
                        owner_id: owner_id.clone(),
                        owner_schema_id: owner.schema_id.clone(),
                        property: name.clone(),
                        value: None,
                        version: current.current_version,
                    },
                )
            });
        }
        Ok(true)
    }
}

impl fmt::Debug for DomainExtensionHyperGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainExtensionHyperGraph")
            .field("domain_name", &self.domain_name())
            .field("mode", &self.mode)
            .field("local", &self.local)
            .field("tombstones", &self.tombstones)
            .finish()
    }
}

//! Persistence view of an extension
//!
//! Answers adapter queries the way the extension graph resolves reads:
//! committed tombstones hide a record, the extension's own adapter comes
//! next, the base domain's adapter last. Change sets only reach the
//! extension's own adapter.

use crate::graph::storage::MemoryStore;
use crate::graph::{Direction, GraphNode, Identity, NodeType, PropertyValue};
use crate::persistence::{ChangeSet, NodeResult, PersistenceAdapter};
use rustc_hash::FxHashSet;
use std::sync::Arc;

pub struct DomainExtensionAdapter {
    tombstones: Arc<MemoryStore<GraphNode>>,
    local: Option<Arc<dyn PersistenceAdapter>>,
    base: Option<Arc<dyn PersistenceAdapter>>,
}

impl DomainExtensionAdapter {
    pub fn new(
        tombstones: Arc<MemoryStore<GraphNode>>,
        local: Option<Arc<dyn PersistenceAdapter>>,
        base: Option<Arc<dyn PersistenceAdapter>>,
    ) -> Self {
        DomainExtensionAdapter {
            tombstones,
            local,
            base,
        }
    }

    fn is_tombstoned(&self, id: &Identity) -> bool {
        self.tombstones.contains(None, id)
    }

    /// Local results first, base results not shadowed by them after
    fn merge(
        &self,
        local: anyhow::Result<Vec<NodeResult>>,
        base: anyhow::Result<Vec<NodeResult>>,
    ) -> anyhow::Result<Vec<NodeResult>> {
        let mut results: Vec<NodeResult> = local?
            .into_iter()
            .filter(|r| !self.is_tombstoned(&r.node.id))
            .collect();
        let seen: FxHashSet<Identity> = results.iter().map(|r| r.node.id.clone()).collect();
        results.extend(
            base?
                .into_iter()
                .filter(|r| !seen.contains(&r.node.id) && !self.is_tombstoned(&r.node.id)),
        );
        Ok(results)
    }
}

impl PersistenceAdapter for DomainExtensionAdapter {
    fn get_node(&self, id: &Identity, schema_id: Option<&Identity>) -> anyhow::Result<Option<NodeResult>> {
        if self.is_tombstoned(id) {
            return Ok(None);
        }
        if let Some(local) = &self.local {
            if let Some(result) = local.get_node(id, schema_id)? {
                return Ok(Some(result));
            }
        }
        match &self.base {
            Some(base) => base.get_node(id, schema_id),
            None => Ok(None),
        }
    }

    fn get_nodes(&self, kind: NodeType, schema_id: Option<&Identity>) -> anyhow::Result<Vec<NodeResult>> {
        let local = match &self.local {
            Some(local) => local.get_nodes(kind, schema_id),
            None => Ok(Vec::new()),
        };
        let base = match &self.base {
            Some(base) => base.get_nodes(kind, schema_id),
            None => Ok(Vec::new()),
        };
        self.merge(local, base)
    }

    fn get_edges(
        &self,
        id: &Identity,
        direction: Direction,
        schema_id: Option<&Identity>,
        include_properties: bool,
    ) -> anyhow::Result<Vec<NodeResult>> {
        if self.is_tombstoned(id) {
            return Ok(Vec::new());
        }
        let local = match &self.local {
            Some(local) => local.get_edges(id, direction, schema_id, include_properties),
            None => Ok(Vec::new()),
        };
        let base = match &self.base {
            Some(base) => base.get_edges(id, direction, schema_id, include_properties),
            None => Ok(Vec::new()),
        };
        self.merge(local, base)
    }

    fn get_property(
        &self,
        owner_id: &Identity,
        owner_schema_id: &Identity,
        property: &str,
    ) -> anyhow::Result<Option<PropertyValue>> {
        if self.is_tombstoned(owner_id) || self.is_tombstoned(&owner_id.create_attribute_identity(property)) {
            return Ok(None);
        }
        if let Some(local) = &self.local {
            if let Some(value) = local.get_property(owner_id, owner_schema_id, property)? {
                return Ok(Some(value));
            }
        }
        match &self.base {
            Some(base) => base.get_property(owner_id, owner_schema_id, property),
            None => Ok(None),
        }
    }

    fn persist(&self, changes: &ChangeSet) -> anyhow::Result<()> {
        match &self.local {
            Some(local) => local.persist(changes),
            None => Ok(()),
        }
    }
}

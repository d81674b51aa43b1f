//! Committed property values mapped back to their owners
//!
//! An index only moves when a transaction commits: writes queue
//! [`IndexEvent`]s that are replayed here in order.

use crate::graph::event::IndexEvent;
use crate::graph::storage::transaction::IndexAction;
use crate::graph::{Identity, Value};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// What an index covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    /// Elements whose schema is-a this schema are indexed
    pub schema_id: Identity,
    pub property: String,
    pub unique: bool,
}

impl IndexDefinition {
    pub fn new(
        name: impl Into<String>,
        schema_id: Identity,
        property: impl Into<String>,
        unique: bool,
    ) -> Self {
        Self {
            name: name.into(),
            schema_id,
            property: property.into(),
            unique,
        }
    }
}

/// Index for one property of one schema
#[derive(Debug)]
pub struct PropertyIndex {
    definition: IndexDefinition,
    /// Value -> owners holding that value
    index: RwLock<BTreeMap<Value, BTreeSet<Identity>>>,
}

impl PropertyIndex {
    pub fn new(definition: IndexDefinition) -> Self {
        Self {
            definition,
            index: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn is_unique(&self) -> bool {
        self.definition.unique
    }

    /// Replay committed events in order
    pub fn apply(&self, events: &[IndexEvent]) {
        let mut index = self.index.write();
        for event in events {
            match event {
                IndexEvent::Added { id, value } => {
                    index.entry(value.clone()).or_default().insert(id.clone());
                }
                IndexEvent::Removed { id, value } => {
                    if let Some(owners) = index.get_mut(value) {
                        owners.remove(id);
                        if owners.is_empty() {
                            index.remove(value);
                        }
                    }
                }
            }
        }
    }

    pub fn get(&self, value: &Value) -> Vec<Identity> {
        self.index
            .read()
            .get(value)
            .map(|owners| owners.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct values
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    pub fn clear(&self) {
        self.index.write().clear();
    }

    /// Whether `owner` writing `value` would break uniqueness, given the
    /// committed content and the writer's own queued actions.
    pub fn conflicts(self: &Arc<Self>, owner: &Identity, value: &Value, pending: &[IndexAction]) -> bool {
        if !self.definition.unique || value.is_null() {
            return false;
        }

        let mut holders: BTreeSet<Identity> = self
            .index
            .read()
            .get(value)
            .cloned()
            .unwrap_or_default();

        for action in pending.iter().filter(|a| Arc::ptr_eq(&a.index, self)) {
            match &action.event {
                IndexEvent::Added { id, value: v } if v == value => {
                    holders.insert(id.clone());
                }
                IndexEvent::Removed { id, value: v } if v == value => {
                    holders.remove(id);
                }
                _ => {}
            }
        }

        holders.iter().any(|holder| holder != owner)
    }
}

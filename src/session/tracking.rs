//! Change tracking for a session
//!
//! Records which elements a session touched and how. Constraint validation
//! runs over the tracked elements and the write-through change sets are
//! built from them.

use crate::graph::{GraphNode, Identity, NodeType, Value};
use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrackingState {
    Unknown,
    Added,
    Updated,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedElement {
    pub id: Identity,
    pub schema_id: Identity,
    pub kind: NodeType,
    pub start_id: Option<Identity>,
    pub end_id: Option<Identity>,
    pub state: TrackingState,
}

impl TrackedElement {
    pub fn from_node(node: &GraphNode, state: TrackingState) -> Self {
        TrackedElement {
            id: node.id.clone(),
            schema_id: node.schema_id.clone(),
            kind: node.kind,
            start_id: node.start_id.clone(),
            end_id: node.end_id.clone(),
            state,
        }
    }
}

/// A property write or removal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyChange {
    pub owner_id: Identity,
    pub owner_schema_id: Identity,
    pub property: String,
    /// `None` when the property was removed
    pub value: Option<Value>,
    pub version: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TrackingData {
    elements: IndexMap<Identity, TrackedElement>,
    properties: IndexMap<Identity, PropertyChange>,
}

impl TrackingData {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `id` as far as this session is concerned
    pub fn get_state(&self, id: &Identity) -> TrackingState {
        self.elements
            .get(id)
            .map_or(TrackingState::Unknown, |e| e.state)
    }

    pub fn on_added(&mut self, node: &GraphNode) {
        let state = match self.get_state(&node.id) {
            // removed then re-created in the same session
            TrackingState::Removed => TrackingState::Updated,
            _ => TrackingState::Added,
        };
        self.elements
            .insert(node.id.clone(), TrackedElement::from_node(node, state));
    }

    pub fn on_removed(&mut self, node: &GraphNode) {
        let state = match self.get_state(&node.id) {
            TrackingState::Added => TrackingState::Unknown,
            _ => TrackingState::Removed,
        };
        self.elements
            .insert(node.id.clone(), TrackedElement::from_node(node, state));

        let owner = node.id.clone();
        if state == TrackingState::Unknown {
            self.properties.retain(|_, change| change.owner_id != owner);
        }
    }

    /// Record a property change; the owner becomes `Updated` unless it is
    /// already tracked with a stronger state.
    pub fn on_property_changed(&mut self, owner: &GraphNode, change: PropertyChange) {
        let key = owner.id.create_attribute_identity(&change.property);
        self.properties.insert(key, change);

        if self.get_state(&owner.id) == TrackingState::Unknown {
            self.elements.insert(
                owner.id.clone(),
                TrackedElement::from_node(owner, TrackingState::Updated),
            );
        }
    }

    /// Elements with a state other than `Unknown`
    pub fn involved(&self) -> impl Iterator<Item = &TrackedElement> {
        self.elements
            .values()
            .filter(|e| e.state != TrackingState::Unknown)
    }

    pub fn property_changes(&self) -> impl Iterator<Item = &PropertyChange> {
        self.properties.values()
    }

    pub fn is_empty(&self) -> bool {
        self.involved().next().is_none() && self.properties.is_empty()
    }

    /// Domains touched by this session
    pub fn domains(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for element in self.involved() {
            let name = element.id.domain_name();
            if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name.to_string());
            }
        }
        for change in self.properties.values() {
            let name = change.owner_id.domain_name();
            if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name.to_string());
            }
        }
        names
    }
}

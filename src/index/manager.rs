//! Manager for property indices
//!
//! Handles creation, deletion, and access to the indices of one domain.

use super::property_index::{IndexDefinition, PropertyIndex};
use crate::domain::schema::SchemaProvider;
use crate::graph::Identity;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Manager for all property indices of a domain
#[derive(Debug, Default)]
pub struct IndexManager {
    indices: RwLock<IndexMap<String, Arc<PropertyIndex>>>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index; an index with the same name is returned as is
    pub fn create_index(&self, definition: IndexDefinition) -> Arc<PropertyIndex> {
        let mut indices = self.indices.write();
        indices
            .entry(definition.name.to_lowercase())
            .or_insert_with(|| {
                debug!(
                    "Created index {} on {}.{}",
                    definition.name, definition.schema_id, definition.property
                );
                Arc::new(PropertyIndex::new(definition))
            })
            .clone()
    }

    /// Drop an index
    pub fn drop_index(&self, name: &str) -> bool {
        self.indices
            .write()
            .shift_remove(&name.to_lowercase())
            .is_some()
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indices.read().contains_key(&name.to_lowercase())
    }

    /// Get index for querying
    pub fn get_index(&self, name: &str) -> Option<Arc<PropertyIndex>> {
        self.indices.read().get(&name.to_lowercase()).cloned()
    }

    pub fn indexes(&self) -> Vec<Arc<PropertyIndex>> {
        self.indices.read().values().cloned().collect()
    }

    /// Indices covering `property` for an owner of schema `owner_schema`
    pub fn impacted(
        &self,
        schema: &dyn SchemaProvider,
        owner_schema: &Identity,
        property: &str,
    ) -> Vec<Arc<PropertyIndex>> {
        let indices = self.indices.read();
        if indices.is_empty() {
            return Vec::new();
        }
        indices
            .values()
            .filter(|index| {
                let definition = index.definition();
                definition.property.eq_ignore_ascii_case(property)
                    && schema.is_a(owner_schema, &definition.schema_id)
            })
            .cloned()
            .collect()
    }

    /// Drop every index
    pub fn clear(&self) {
        self.indices.write().clear();
    }
}

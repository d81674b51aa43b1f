//! Schema of an extension
//!
//! Lookups try the extension's own definitions first, then the base domain.
//! Schema elements are never tombstoned.

use crate::domain::schema::{DomainSchema, SchemaElement, SchemaProvider};
use crate::error::HyperGraphResult;
use crate::graph::Identity;
use std::sync::Arc;

pub struct DomainExtensionSchema {
    local: Arc<DomainSchema>,
    base: Arc<dyn SchemaProvider>,
}

impl DomainExtensionSchema {
    pub fn new(local: Arc<DomainSchema>, base: Arc<dyn SchemaProvider>) -> Self {
        DomainExtensionSchema { local, base }
    }

    pub fn base(&self) -> &Arc<dyn SchemaProvider> {
        &self.base
    }

    /// Add an element to the extension. It may inherit from or point to
    /// base schemas but cannot redefine one.
    pub fn register(&self, element: SchemaElement) -> HyperGraphResult<Arc<SchemaElement>> {
        self.local.register_with(element, self)
    }
}

impl SchemaProvider for DomainExtensionSchema {
    fn domain_name(&self) -> &str {
        self.local.domain_name()
    }

    fn get_schema_element(&self, id: &Identity) -> Option<Arc<SchemaElement>> {
        self.local
            .get_schema_element(id)
            .or_else(|| self.base.get_schema_element(id))
    }

    fn schema_elements(&self) -> Vec<Arc<SchemaElement>> {
        let mut elements = self.local.schema_elements();
        for element in self.base.schema_elements() {
            if !elements.iter().any(|e| e.id() == element.id()) {
                elements.push(element);
            }
        }
        elements
    }
}

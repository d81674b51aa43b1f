//! Domain schemas
//!
//! A schema element describes an entity or relationship type: its single
//! super type, its properties and, for relationships, the endpoint schemas
//! and whether the end is embedded (owned) by the start. Primitive value
//! schemas are shared by every domain.

use crate::error::{HyperGraphError, HyperGraphResult};
use crate::graph::{Element, GraphNode, Identity, Value, ValueKind};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Domain holding the built-in primitive schemas
pub const PRIMITIVES_DOMAIN: &str = "$primitives";

/// Super type chains longer than this are treated as cyclic
const MAX_INHERITANCE_DEPTH: usize = 64;

/// Schema id of a primitive value kind
pub fn primitive_schema_id(kind: ValueKind) -> Identity {
    Identity::new(PRIMITIVES_DOMAIN, kind.schema_key())
}

fn primitives() -> &'static [Arc<SchemaElement>] {
    static PRIMITIVES: OnceLock<Vec<Arc<SchemaElement>>> = OnceLock::new();
    PRIMITIVES.get_or_init(|| {
        ValueKind::all()
            .into_iter()
            .map(|kind| Arc::new(SchemaElement::primitive(kind)))
            .collect()
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaKind {
    Primitive(ValueKind),
    Entity,
    Relationship {
        start: Identity,
        end: Identity,
        /// Removing the start removes the end
        embedded: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    pub name: String,
    pub value_kind: ValueKind,
    pub default: Value,
}

/// Maps a stored record to the element handed to callers
pub type ElementFactory = Arc<dyn Fn(&GraphNode) -> Option<Element> + Send + Sync>;

#[derive(Clone)]
pub struct SchemaElement {
    id: Identity,
    kind: SchemaKind,
    super_type: Option<Identity>,
    properties: IndexMap<String, PropertyDefinition>,
    factory: Option<ElementFactory>,
}

impl SchemaElement {
    fn primitive(kind: ValueKind) -> Self {
        Self::with_kind(primitive_schema_id(kind), SchemaKind::Primitive(kind))
    }

    fn with_kind(id: Identity, kind: SchemaKind) -> Self {
        SchemaElement {
            id,
            kind,
            super_type: None,
            properties: IndexMap::new(),
            factory: None,
        }
    }

    pub fn entity(id: Identity) -> Self {
        Self::with_kind(id, SchemaKind::Entity)
    }

    pub fn relationship(id: Identity, start: Identity, end: Identity) -> Self {
        Self::with_kind(
            id,
            SchemaKind::Relationship {
                start,
                end,
                embedded: false,
            },
        )
    }

    /// Mark a relationship schema as embedding its end
    pub fn embedded(mut self) -> Self {
        if let SchemaKind::Relationship { embedded, .. } = &mut self.kind {
            *embedded = true;
        }
        self
    }

    pub fn with_super_type(mut self, super_type: Identity) -> Self {
        self.super_type = Some(super_type);
        self
    }

    pub fn with_property(self, name: impl Into<String>, value_kind: ValueKind) -> Self {
        self.with_property_default(name, value_kind, Value::Null)
    }

    pub fn with_property_default(
        mut self,
        name: impl Into<String>,
        value_kind: ValueKind,
        default: Value,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.to_lowercase(),
            PropertyDefinition {
                name,
                value_kind,
                default,
            },
        );
        self
    }

    /// Register the mapping used when this schema's records are enumerated
    pub fn with_factory(
        mut self,
        factory: impl Fn(&GraphNode) -> Option<Element> + Send + Sync + 'static,
    ) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn id(&self) -> &Identity {
        &self.id
    }

    pub fn kind(&self) -> &SchemaKind {
        &self.kind
    }

    pub fn super_type(&self) -> Option<&Identity> {
        self.super_type.as_ref()
    }

    pub fn is_entity(&self) -> bool {
        self.kind == SchemaKind::Entity
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self.kind, SchemaKind::Relationship { .. })
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, SchemaKind::Primitive(_))
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.kind, SchemaKind::Relationship { embedded: true, .. })
    }

    /// Properties declared on this element, without inherited ones
    pub fn own_properties(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties.values()
    }

    pub fn own_property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.get(&name.to_lowercase())
    }

    pub fn deserialize(&self, node: &GraphNode) -> Option<Element> {
        match &self.factory {
            Some(factory) => factory(node),
            None => Element::from_node(node),
        }
    }
}

impl fmt::Debug for SchemaElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaElement")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("super_type", &self.super_type)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

/// Read access to the schema of a domain
pub trait SchemaProvider: Send + Sync {
    fn domain_name(&self) -> &str;

    fn get_schema_element(&self, id: &Identity) -> Option<Arc<SchemaElement>>;

    /// Every element visible through this provider, primitives excluded
    fn schema_elements(&self) -> Vec<Arc<SchemaElement>>;

    fn try_get_schema_element(&self, id: &Identity) -> HyperGraphResult<Arc<SchemaElement>> {
        self.get_schema_element(id)
            .ok_or_else(|| HyperGraphError::SchemaNotFound(id.clone()))
    }

    /// Whether `schema_id` is `ancestor` or inherits from it
    fn is_a(&self, schema_id: &Identity, ancestor: &Identity) -> bool {
        let mut current = schema_id.clone();
        for _ in 0..MAX_INHERITANCE_DEPTH {
            if &current == ancestor {
                return true;
            }
            match self
                .get_schema_element(&current)
                .and_then(|e| e.super_type().cloned())
            {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }

    /// Property definition, looked up through the super type chain
    fn get_property(&self, schema_id: &Identity, name: &str) -> Option<PropertyDefinition> {
        let mut current = self.get_schema_element(schema_id);
        for _ in 0..MAX_INHERITANCE_DEPTH {
            let element = current?;
            if let Some(definition) = element.own_property(name) {
                return Some(definition.clone());
            }
            current = element
                .super_type()
                .and_then(|parent| self.get_schema_element(parent));
        }
        None
    }

    /// All properties including inherited ones, most derived first
    fn get_properties(&self, schema_id: &Identity) -> Vec<PropertyDefinition> {
        let mut result: Vec<PropertyDefinition> = Vec::new();
        let mut current = self.get_schema_element(schema_id);
        for _ in 0..MAX_INHERITANCE_DEPTH {
            let Some(element) = current else {
                break;
            };
            for definition in element.own_properties() {
                if !result.iter().any(|d| d.name.eq_ignore_ascii_case(&definition.name)) {
                    result.push(definition.clone());
                }
            }
            current = element
                .super_type()
                .and_then(|parent| self.get_schema_element(parent));
        }
        result
    }
}

/// Schema of a loaded domain
#[derive(Debug)]
pub struct DomainSchema {
    domain_name: String,
    elements: RwLock<IndexMap<Identity, Arc<SchemaElement>>>,
}

impl DomainSchema {
    pub fn new(domain_name: impl Into<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            elements: RwLock::new(IndexMap::new()),
        }
    }

    /// Identity of `key` in this domain
    pub fn identity(&self, key: impl Into<String>) -> Identity {
        Identity::new(self.domain_name.clone(), key)
    }

    /// Add an element. The super type and same-domain endpoints must already
    /// be registered.
    pub fn register(&self, element: SchemaElement) -> HyperGraphResult<Arc<SchemaElement>> {
        self.register_with(element, self)
    }

    /// Add an element, resolving references through `resolver`
    pub(crate) fn register_with(
        &self,
        element: SchemaElement,
        resolver: &dyn SchemaProvider,
    ) -> HyperGraphResult<Arc<SchemaElement>> {
        if !element.id().belongs_to(&self.domain_name) || element.is_primitive() {
            return Err(HyperGraphError::InvalidSchema(element.id().clone()));
        }
        if resolver.get_schema_element(element.id()).is_some() {
            return Err(HyperGraphError::DuplicateElement(element.id().clone()));
        }

        if let Some(parent_id) = element.super_type() {
            let parent = resolver.try_get_schema_element(parent_id)?;
            if parent.is_relationship() != element.is_relationship() || parent.is_primitive() {
                return Err(HyperGraphError::InvalidSchema(element.id().clone()));
            }
        }

        if let SchemaKind::Relationship { start, end, .. } = element.kind() {
            for endpoint in [start, end] {
                if endpoint.belongs_to(&self.domain_name)
                    && endpoint != element.id()
                    && resolver.get_schema_element(endpoint).is_none()
                {
                    return Err(HyperGraphError::SchemaNotFound(endpoint.clone()));
                }
            }
        }

        debug!("Registered schema {} in {}", element.id(), self.domain_name);
        let element = Arc::new(element);
        self.elements
            .write()
            .insert(element.id().clone(), element.clone());
        Ok(element)
    }
}

impl SchemaProvider for DomainSchema {
    fn domain_name(&self) -> &str {
        &self.domain_name
    }

    fn get_schema_element(&self, id: &Identity) -> Option<Arc<SchemaElement>> {
        if id.belongs_to(PRIMITIVES_DOMAIN) {
            return primitives().iter().find(|p| p.id() == id).cloned();
        }
        self.elements.read().get(id).cloned()
    }

    fn schema_elements(&self) -> Vec<Arc<SchemaElement>> {
        self.elements.read().values().cloned().collect()
    }
}

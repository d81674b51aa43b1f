//! Domains
//!
//! A [`DomainModel`] bundles what a loaded domain is made of: its schema,
//! its graph, its indexes and counters and an optional persistence adapter.
//! Extensions are domain models too; they carry the same name as their base
//! and stack on top of it in the [`Store`] registry.

pub mod extension;
pub mod registry;
pub mod schema;

pub use extension::{
    DomainExtensionAdapter, DomainExtensionHyperGraph, DomainExtensionSchema, ExtendedMode, ExtensionInfo,
};
pub use registry::Store;
pub use schema::{DomainSchema, PropertyDefinition, SchemaElement, SchemaKind, SchemaProvider};

use crate::config::StoreConfig;
use crate::error::HyperGraphResult;
use crate::graph::storage::MemoryStore;
use crate::graph::{GraphProvider, GraphStatistics, HyperGraph, Identity};
use crate::index::{IndexDefinition, IndexManager, PropertyIndex};
use crate::persistence::{CacheAdapter, ChangeSet, PersistenceAdapter};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

enum DomainGraph {
    Base(Arc<HyperGraph>),
    Extension(Arc<DomainExtensionHyperGraph>),
}

enum DomainDefinitions {
    Base(Arc<DomainSchema>),
    Extension(Arc<DomainExtensionSchema>),
}

pub struct DomainModel {
    name: String,
    instance_id: Uuid,
    loaded_at: DateTime<Utc>,
    definitions: DomainDefinitions,
    graph: DomainGraph,
    adapter: Option<Arc<dyn PersistenceAdapter>>,
    extension: Option<ExtensionInfo>,
}

impl DomainModel {
    pub(crate) fn new(
        name: impl Into<String>,
        config: &StoreConfig,
        adapter: Option<Arc<dyn PersistenceAdapter>>,
    ) -> Self {
        let name = name.into();
        let definitions = Arc::new(DomainSchema::new(name.clone()));
        let schema: Arc<dyn SchemaProvider> = definitions.clone();
        let graph = match &adapter {
            Some(adapter) => HyperGraph::with_adapter(name.clone(), schema, config, adapter.clone()),
            None => HyperGraph::new(name.clone(), schema, config),
        };
        DomainModel {
            name,
            instance_id: Uuid::new_v4(),
            loaded_at: Utc::now(),
            definitions: DomainDefinitions::Base(definitions),
            graph: DomainGraph::Base(Arc::new(graph)),
            adapter,
            extension: None,
        }
    }

    pub(crate) fn new_extension(
        extension_name: impl Into<String>,
        base: &DomainModel,
        mode: ExtendedMode,
        config: &StoreConfig,
        local_adapter: Option<Arc<dyn PersistenceAdapter>>,
    ) -> Self {
        let name = base.name().to_string();
        let info = ExtensionInfo {
            name: extension_name.into(),
            base_name: name.clone(),
            mode,
            created_at: Utc::now(),
        };

        let definitions = Arc::new(DomainExtensionSchema::new(
            Arc::new(DomainSchema::new(name.clone())),
            base.schema(),
        ));
        let schema: Arc<dyn SchemaProvider> = definitions.clone();
        let local = match &local_adapter {
            Some(adapter) => HyperGraph::with_adapter(name.clone(), schema, config, adapter.clone()),
            None => HyperGraph::new(name.clone(), schema, config),
        };
        let tombstones = Arc::new(MemoryStore::new(format!("{}/tombstones", info.name)));
        let adapter: Arc<dyn PersistenceAdapter> = Arc::new(DomainExtensionAdapter::new(
            tombstones.clone(),
            local_adapter,
            base.adapter(),
        ));
        let sentinel = Identity::new(info.name.clone(), "overlay");
        let graph = DomainExtensionHyperGraph::new(base.graph(), local, tombstones, mode, sentinel);

        DomainModel {
            name,
            instance_id: Uuid::new_v4(),
            loaded_at: Utc::now(),
            definitions: DomainDefinitions::Extension(definitions),
            graph: DomainGraph::Extension(Arc::new(graph)),
            adapter: Some(adapter),
            extension: Some(info),
        }
    }

    /// Domain name, shared by a domain and its extensions
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extension name, or the domain name for a base domain
    pub fn extension_name(&self) -> &str {
        self.extension.as_ref().map_or(&self.name, |info| &info.name)
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn graph(&self) -> Arc<dyn GraphProvider> {
        match &self.graph {
            DomainGraph::Base(graph) => graph.clone(),
            DomainGraph::Extension(graph) => graph.clone(),
        }
    }

    /// The graph holding this model's own records
    pub fn hypergraph(&self) -> &HyperGraph {
        match &self.graph {
            DomainGraph::Base(graph) => graph,
            DomainGraph::Extension(graph) => graph.local(),
        }
    }

    pub fn extension_graph(&self) -> Option<&Arc<DomainExtensionHyperGraph>> {
        match &self.graph {
            DomainGraph::Base(_) => None,
            DomainGraph::Extension(graph) => Some(graph),
        }
    }

    pub fn schema(&self) -> Arc<dyn SchemaProvider> {
        match &self.definitions {
            DomainDefinitions::Base(schema) => schema.clone(),
            DomainDefinitions::Extension(schema) => schema.clone(),
        }
    }

    /// Add a schema element to this domain or extension
    pub fn register_schema(&self, element: SchemaElement) -> HyperGraphResult<Arc<SchemaElement>> {
        match &self.definitions {
            DomainDefinitions::Base(schema) => schema.register(element),
            DomainDefinitions::Extension(schema) => schema.register(element),
        }
    }

    /// Indexes over this model's own records
    pub fn indexes(&self) -> &Arc<IndexManager> {
        self.hypergraph().indexes()
    }

    pub fn create_index(&self, definition: IndexDefinition) -> HyperGraphResult<Arc<PropertyIndex>> {
        self.hypergraph().create_index(definition)
    }

    pub fn statistics(&self) -> &Arc<GraphStatistics> {
        self.hypergraph().statistics()
    }

    pub fn adapter(&self) -> Option<Arc<dyn PersistenceAdapter>> {
        self.adapter.clone()
    }

    pub fn cache(&self) -> Option<&Arc<CacheAdapter>> {
        self.hypergraph().cache()
    }

    pub fn extension_info(&self) -> Option<&ExtensionInfo> {
        self.extension.as_ref()
    }

    pub fn is_extension(&self) -> bool {
        self.extension.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.graph().is_disposed()
    }

    /// Write-through of a committed session's changes
    pub fn on_session_completed(&self, changes: &ChangeSet) {
        if let Some(cache) = self.cache() {
            cache.on_session_completed(changes);
        }
    }

    pub(crate) fn dispose(&self) {
        match &self.graph {
            DomainGraph::Base(graph) => graph.dispose(),
            DomainGraph::Extension(graph) => graph.dispose(),
        }
    }
}

impl fmt::Debug for DomainModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainModel")
            .field("name", &self.name)
            .field("extension", &self.extension)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

/// Service bound to a single domain
///
/// The first `set_domain` wins; later calls leave the binding unchanged.
#[derive(Debug, Default)]
pub struct DomainService {
    domain: OnceLock<Arc<DomainModel>>,
}

impl DomainService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the service was already bound
    pub fn set_domain(&self, domain: Arc<DomainModel>) -> bool {
        self.domain.set(domain).is_ok()
    }

    pub fn domain(&self) -> Option<&Arc<DomainModel>> {
        self.domain.get()
    }
}

//! Store: registry of loaded domains
//!
//! The store owns everything sessions share: the domain registry, the lock
//! table, the registered constraint validators and the configuration. Each
//! registry entry is a stack; the base domain sits at the bottom and every
//! extension loaded over it is pushed on top. Lookups by name return the top.

use super::{DomainModel, ExtendedMode};
use crate::config::StoreConfig;
use crate::error::{HyperGraphError, HyperGraphResult};
use crate::graph::GraphProvider;
use crate::persistence::PersistenceAdapter;
use crate::session::{ConstraintValidator, LockManager, LockMode, Session, SessionConfiguration};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

struct StoreInner {
    config: StoreConfig,
    domains: RwLock<IndexMap<String, Vec<Arc<DomainModel>>>>,
    locks: LockManager,
    constraints: RwLock<Vec<Arc<dyn ConstraintValidator>>>,
}

/// Shared handle to a store; clones refer to the same store
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn new(config: StoreConfig) -> HyperGraphResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: StoreConfig) -> Self {
        info!("Store initialized");
        Store {
            inner: Arc::new(StoreInner {
                config,
                domains: RwLock::new(IndexMap::new()),
                locks: LockManager::new(),
                constraints: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn locks(&self) -> &LockManager {
        &self.inner.locks
    }

    pub fn begin_session(&self, configuration: SessionConfiguration) -> Session {
        Session::begin(self.clone(), configuration)
    }

    /// Load an empty domain
    pub fn load_domain(&self, name: &str) -> HyperGraphResult<Arc<DomainModel>> {
        self.register(DomainModel::new(name, &self.inner.config, None))
    }

    /// Load a domain whose records come from `adapter`
    pub fn load_domain_with_adapter(
        &self,
        name: &str,
        adapter: Arc<dyn PersistenceAdapter>,
    ) -> HyperGraphResult<Arc<DomainModel>> {
        self.register(DomainModel::new(name, &self.inner.config, Some(adapter)))
    }

    fn register(&self, domain: DomainModel) -> HyperGraphResult<Arc<DomainModel>> {
        let key = domain.name().to_lowercase();
        let mut domains = self.inner.domains.write();
        if domains.contains_key(&key) {
            return Err(HyperGraphError::DomainAlreadyExists(domain.name().to_string()));
        }
        let domain = Arc::new(domain);
        domains.insert(key, vec![domain.clone()]);
        info!("Loaded domain {}", domain.name());
        Ok(domain)
    }

    /// Topmost model loaded under `name`
    pub fn get_domain(&self, name: &str) -> HyperGraphResult<Arc<DomainModel>> {
        self.inner
            .domains
            .read()
            .get(&name.to_lowercase())
            .and_then(|stack| stack.last().cloned())
            .ok_or_else(|| HyperGraphError::DomainNotFound(name.to_string()))
    }

    /// Graph that identities of `name` currently resolve to
    pub fn domain_graph(&self, name: &str) -> HyperGraphResult<Arc<dyn GraphProvider>> {
        Ok(self.get_domain(name)?.graph())
    }

    pub fn has_domain(&self, name: &str) -> bool {
        self.inner.domains.read().contains_key(&name.to_lowercase())
    }

    /// Names of the loaded domains
    pub fn domains(&self) -> Vec<String> {
        self.inner
            .domains
            .read()
            .values()
            .filter_map(|stack| stack.first().map(|d| d.name().to_string()))
            .collect()
    }

    /// Unload a domain and every extension stacked on it
    pub fn unload_domain(&self, name: &str) -> HyperGraphResult<()> {
        let stack = self
            .inner
            .domains
            .write()
            .shift_remove(&name.to_lowercase())
            .ok_or_else(|| HyperGraphError::DomainNotFound(name.to_string()))?;
        for domain in stack.iter().rev() {
            domain.dispose();
        }
        info!("Unloaded domain {}", name);
        Ok(())
    }

    /// Stack a new extension on the current top of `base_name`
    pub fn create_extension(&self, base_name: &str, mode: ExtendedMode) -> HyperGraphResult<Arc<DomainModel>> {
        self.push_extension(base_name, mode, None)
    }

    /// Extension whose own records come from `adapter`
    pub fn create_extension_with_adapter(
        &self,
        base_name: &str,
        mode: ExtendedMode,
        adapter: Arc<dyn PersistenceAdapter>,
    ) -> HyperGraphResult<Arc<DomainModel>> {
        self.push_extension(base_name, mode, Some(adapter))
    }

    fn push_extension(
        &self,
        base_name: &str,
        mode: ExtendedMode,
        adapter: Option<Arc<dyn PersistenceAdapter>>,
    ) -> HyperGraphResult<Arc<DomainModel>> {
        let mut domains = self.inner.domains.write();
        let stack = domains
            .get_mut(&base_name.to_lowercase())
            .ok_or_else(|| HyperGraphError::DomainNotFound(base_name.to_string()))?;
        let base = stack
            .last()
            .cloned()
            .ok_or_else(|| HyperGraphError::DomainNotFound(base_name.to_string()))?;

        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}", base.name(), &suffix[..8]);
        let extension = Arc::new(DomainModel::new_extension(
            name,
            &base,
            mode,
            &self.inner.config,
            adapter,
        ));
        stack.push(extension.clone());
        info!(
            "Extension {} attached to {} ({:?})",
            extension.extension_name(),
            base.extension_name(),
            mode
        );
        Ok(extension)
    }

    /// Detach `extension` and any extension stacked above it.
    ///
    /// Waits until no other session is working through the extension and
    /// none holds a lock on an identity it overlays, so readers see the
    /// domain either with the extension or without it.
    pub fn unload_extension(&self, extension: &DomainModel) -> HyperGraphResult<()> {
        let Some(info) = extension.extension_info() else {
            return Err(HyperGraphError::DomainNotFound(extension.name().to_string()));
        };
        let key = extension.name().to_lowercase();
        let detached: Vec<Arc<DomainModel>> = {
            let domains = self.inner.domains.read();
            let stack = domains
                .get(&key)
                .ok_or_else(|| HyperGraphError::DomainNotFound(info.name.clone()))?;
            let position = stack
                .iter()
                .position(|d| d.instance_id() == extension.instance_id())
                .ok_or_else(|| HyperGraphError::DomainNotFound(info.name.clone()))?;
            stack[position..].to_vec()
        };

        let session = self.begin_session(SessionConfiguration::new());
        // sessions still working through an overlay, committed or not
        for domain in detached.iter().rev() {
            if let Some(graph) = domain.extension_graph() {
                session.acquire_lock(LockMode::ExclusiveWait, graph.sentinel())?;
            }
        }
        for domain in detached.iter().rev() {
            if let Some(graph) = domain.extension_graph() {
                for id in graph.overlay_identities() {
                    session.acquire_lock(LockMode::ExclusiveWait, &id)?;
                }
            }
        }
        debug!("Extension {} quiesced", info.name);

        {
            let mut domains = self.inner.domains.write();
            if let Some(stack) = domains.get_mut(&key) {
                stack.retain(|d| !detached.iter().any(|x| x.instance_id() == d.instance_id()));
            }
        }
        for domain in detached.iter().rev() {
            domain.dispose();
            info!("Extension {} detached", domain.extension_name());
        }
        session.abort();
        Ok(())
    }

    pub fn register_constraint(&self, validator: Arc<dyn ConstraintValidator>) {
        debug!("Registered constraint {}", validator.name());
        self.inner.constraints.write().push(validator);
    }

    pub fn constraints(&self) -> Vec<Arc<dyn ConstraintValidator>> {
        self.inner.constraints.read().clone()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::build(StoreConfig::default())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("domains", &self.domains())
            .field("locks", &self.inner.locks.len())
            .finish()
    }
}

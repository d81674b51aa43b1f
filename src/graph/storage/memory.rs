//! Transactional in-memory record store
//!
//! Committed records live in one map shared by every reader. Each active
//! transaction keeps its own overlay of pending writes (`Some`) and deletes
//! (`None`); readers see their own overlay first, then the committed map.
//! The overlay is folded into the committed map when the transaction commits
//! and thrown away when it aborts.

use super::transaction::{Transaction, TransactionId, TransactionParticipant};
use crate::error::{HyperGraphError, HyperGraphResult};
use crate::graph::types::Identity;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type Overlay<V> = IndexMap<Identity, Option<Arc<V>>, FxBuildHasher>;

/// Result of resolving an identity against a store
#[derive(Debug)]
pub enum Lookup<V> {
    Found(Arc<V>),
    /// Deleted by the reading transaction
    Removed,
    /// Never seen
    Missing,
}

impl<V> Lookup<V> {
    pub fn found(self) -> Option<Arc<V>> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }
}

pub struct MemoryStore<V> {
    name: String,
    committed: RwLock<IndexMap<Identity, Arc<V>, FxBuildHasher>>,
    pending: Mutex<FxHashMap<TransactionId, Overlay<V>>>,
}

impl<V: Send + Sync + 'static> MemoryStore<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            committed: RwLock::new(IndexMap::default()),
            pending: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lookup(&self, tx: Option<TransactionId>, id: &Identity) -> Lookup<V> {
        if let Some(tx) = tx {
            let pending = self.pending.lock();
            if let Some(entry) = pending.get(&tx).and_then(|overlay| overlay.get(id)) {
                return match entry {
                    Some(value) => Lookup::Found(value.clone()),
                    None => Lookup::Removed,
                };
            }
        }
        match self.committed.read().get(id) {
            Some(value) => Lookup::Found(value.clone()),
            None => Lookup::Missing,
        }
    }

    pub fn get(&self, tx: Option<TransactionId>, id: &Identity) -> Option<Arc<V>> {
        self.lookup(tx, id).found()
    }

    pub fn contains(&self, tx: Option<TransactionId>, id: &Identity) -> bool {
        self.get(tx, id).is_some()
    }

    /// Write `value` in the scope of `tx`
    pub fn put(self: &Arc<Self>, tx: &mut Transaction, id: Identity, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.enlist(tx);
        self.pending
            .lock()
            .entry(tx.id())
            .or_default()
            .insert(id, Some(value.clone()));
        value
    }

    /// Delete `id` in the scope of `tx`, returning the record it hid
    pub fn remove(self: &Arc<Self>, tx: &mut Transaction, id: &Identity) -> Option<Arc<V>> {
        let previous = self.get(Some(tx.id()), id)?;
        self.enlist(tx);
        self.pending
            .lock()
            .entry(tx.id())
            .or_default()
            .insert(id.clone(), None);
        Some(previous)
    }

    /// Insert straight into the committed map, outside any transaction.
    /// Used to fill the store from a backing adapter.
    pub fn try_insert_committed(&self, id: Identity, value: V) -> HyperGraphResult<Arc<V>> {
        let mut committed = self.committed.write();
        if committed.contains_key(&id) {
            return Err(HyperGraphError::DuplicateElement(id));
        }
        let value = Arc::new(value);
        committed.insert(id, value.clone());
        Ok(value)
    }

    /// Snapshot of the identities visible to `tx`
    pub fn keys(&self, tx: Option<TransactionId>) -> Vec<Identity> {
        let committed = self.committed.read();
        let pending = self.pending.lock();
        let overlay = tx.and_then(|tx| pending.get(&tx));

        let mut keys: Vec<Identity> = match overlay {
            Some(overlay) => committed
                .keys()
                .filter(|id| !matches!(overlay.get(*id), Some(None)))
                .cloned()
                .collect(),
            None => committed.keys().cloned().collect(),
        };
        if let Some(overlay) = overlay {
            keys.extend(
                overlay
                    .iter()
                    .filter(|(id, value)| value.is_some() && !committed.contains_key(*id))
                    .map(|(id, _)| id.clone()),
            );
        }
        keys
    }

    /// Records visible to `tx`. Identities are captured up front and records
    /// resolved one at a time, so writers are never blocked by the iteration.
    pub fn values(&self, tx: Option<TransactionId>) -> impl Iterator<Item = Arc<V>> + '_ {
        self.keys(tx)
            .into_iter()
            .filter_map(move |id| self.get(tx, &id))
    }

    pub fn len(&self, tx: Option<TransactionId>) -> usize {
        self.keys(tx).len()
    }

    pub fn is_empty(&self, tx: Option<TransactionId>) -> bool {
        self.len(tx) == 0
    }

    /// Drop every committed record
    pub fn clear(&self) {
        self.committed.write().clear();
    }

    fn enlist(self: &Arc<Self>, tx: &mut Transaction) {
        let participant: Arc<dyn TransactionParticipant> = self.clone();
        tx.enlist(participant);
    }
}

impl<V: Send + Sync + 'static> TransactionParticipant for MemoryStore<V> {
    fn participant_id(&self) -> usize {
        self as *const Self as usize
    }

    fn commit(&self, tx: TransactionId) {
        let Some(overlay) = self.pending.lock().remove(&tx) else {
            return;
        };
        let changes = overlay.len();
        let mut committed = self.committed.write();
        for (id, value) in overlay {
            match value {
                Some(value) => {
                    committed.insert(id, value);
                }
                None => {
                    committed.swap_remove(&id);
                }
            }
        }
        debug!("Store {} committed {} changes for tx {}", self.name, changes, tx);
    }

    fn rollback(&self, tx: TransactionId) {
        if let Some(overlay) = self.pending.lock().remove(&tx) {
            debug!("Store {} discarded {} changes for tx {}", self.name, overlay.len(), tx);
        }
    }
}

impl<V> fmt::Debug for MemoryStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.name)
            .field("committed", &self.committed.read().len())
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

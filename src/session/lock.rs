//! Per-identity locks
//!
//! Locks are cooperative and session scoped: a session acquires them while it
//! works and releases all of them together when it completes. `Shared` locks
//! are compatible with each other; `Exclusive` and `ExclusiveWait` need the
//! identity to themselves. A session may upgrade when it is the only holder.
//!
//! `Shared` and `Exclusive` give up after the time-before-deadlock elapses.
//! `ExclusiveWait` waits until every other holder is gone.

use super::SessionId;
use crate::error::{HyperGraphError, HyperGraphResult};
use crate::graph::Identity;
use parking_lot::{Condvar, Mutex};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    Shared,
    Exclusive,
    /// Exclusive without a deadlock timeout
    ExclusiveWait,
}

impl LockMode {
    fn is_exclusive(self) -> bool {
        self != LockMode::Shared
    }
}

#[derive(Debug, Default)]
struct LockEntry {
    exclusive: Option<SessionId>,
    shared: FxHashSet<SessionId>,
}

impl LockEntry {
    fn can_grant(&self, session: SessionId, mode: LockMode) -> bool {
        let writer_ok = self.exclusive.map_or(true, |owner| owner == session);
        if mode.is_exclusive() {
            writer_ok && self.shared.iter().all(|holder| *holder == session)
        } else {
            writer_ok
        }
    }

    fn grant(&mut self, session: SessionId, mode: LockMode) {
        if mode.is_exclusive() {
            self.exclusive = Some(session);
        } else if self.exclusive != Some(session) {
            self.shared.insert(session);
        }
    }

    fn release(&mut self, session: SessionId) {
        if self.exclusive == Some(session) {
            self.exclusive = None;
        }
        self.shared.remove(&session);
    }

    fn is_free(&self) -> bool {
        self.exclusive.is_none() && self.shared.is_empty()
    }
}

/// Lock table shared by every session of a store
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<FxHashMap<Identity, LockEntry>>,
    released: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `session` holds `id` in `mode`.
    /// Returns `true` when the lock is newly recorded for the session.
    pub fn acquire(
        &self,
        session: SessionId,
        mode: LockMode,
        id: &Identity,
        timeout: Duration,
    ) -> HyperGraphResult<bool> {
        let deadline = Instant::now() + timeout;
        let mut table = self.table.lock();
        let mut waited = false;

        loop {
            let entry = table.entry(id.clone()).or_default();
            if entry.can_grant(session, mode) {
                let was_free = entry.exclusive != Some(session) && !entry.shared.contains(&session);
                entry.grant(session, mode);
                if waited {
                    debug!("Session {} acquired {:?} lock on {} after waiting", session, mode, id);
                }
                return Ok(was_free);
            }

            waited = true;
            debug!("Session {} waiting for {:?} lock on {}", session, mode, id);
            if mode == LockMode::ExclusiveWait {
                self.released.wait(&mut table);
                continue;
            }

            if self.released.wait_until(&mut table, deadline).timed_out() {
                let granted = table
                    .get(id)
                    .map_or(true, |entry| entry.can_grant(session, mode));
                if granted {
                    continue;
                }
                warn!("Session {} timed out waiting for {:?} lock on {}", session, mode, id);
                if table.get(id).is_some_and(LockEntry::is_free) {
                    table.remove(id);
                }
                return Err(HyperGraphError::LockTimeout {
                    id: id.clone(),
                    mode,
                });
            }
        }
    }

    /// Release every lock `session` holds on `ids`
    pub fn release_all<'a>(&self, session: SessionId, ids: impl IntoIterator<Item = &'a Identity>) {
        let mut table = self.table.lock();
        for id in ids {
            if let Some(entry) = table.get_mut(id) {
                entry.release(session);
                if entry.is_free() {
                    table.remove(id);
                }
            }
        }
        drop(table);
        self.released.notify_all();
    }

    /// Whether any session holds `id`
    pub fn is_locked(&self, id: &Identity) -> bool {
        self.table.lock().get(id).is_some_and(|entry| !entry.is_free())
    }

    /// Number of identities with at least one holder
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn id(key: &str) -> Identity {
        Identity::new("d", key)
    }

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn test_shared_locks_are_compatible() {
        let locks = LockManager::new();
        assert!(locks.acquire(1, LockMode::Shared, &id("a"), SHORT).unwrap());
        assert!(locks.acquire(2, LockMode::Shared, &id("a"), SHORT).unwrap());
        assert!(!locks.acquire(1, LockMode::Shared, &id("a"), SHORT).unwrap());
    }

    #[test]
    fn test_exclusive_times_out() {
        let locks = LockManager::new();
        locks.acquire(1, LockMode::Shared, &id("a"), SHORT).unwrap();
        let err = locks.acquire(2, LockMode::Exclusive, &id("a"), SHORT).unwrap_err();
        assert!(matches!(err, HyperGraphError::LockTimeout { mode: LockMode::Exclusive, .. }));

        locks.acquire(3, LockMode::Exclusive, &id("b"), SHORT).unwrap();
        let err = locks.acquire(1, LockMode::Shared, &id("b"), SHORT).unwrap_err();
        assert!(matches!(err, HyperGraphError::LockTimeout { mode: LockMode::Shared, .. }));
    }

    #[test]
    fn test_upgrade_when_sole_holder() {
        let locks = LockManager::new();
        locks.acquire(1, LockMode::Shared, &id("a"), SHORT).unwrap();
        assert!(!locks.acquire(1, LockMode::Exclusive, &id("a"), SHORT).unwrap());
        // re-entrant
        locks.acquire(1, LockMode::Exclusive, &id("a"), SHORT).unwrap();
        locks.acquire(1, LockMode::Shared, &id("a"), SHORT).unwrap();
    }

    #[test]
    fn test_release_wakes_waiters() {
        let locks = Arc::new(LockManager::new());
        locks.acquire(1, LockMode::Exclusive, &id("a"), SHORT).unwrap();

        let waiter = {
            let locks = locks.clone();
            thread::spawn(move || locks.acquire(2, LockMode::ExclusiveWait, &id("a"), SHORT))
        };
        thread::sleep(Duration::from_millis(100));
        locks.release_all(1, [&id("a")]);

        assert!(waiter.join().unwrap().is_ok());
        locks.release_all(2, [&id("a")]);
        assert!(locks.is_empty());
    }
}

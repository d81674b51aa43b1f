//! Sessions
//!
//! A [`Session`] is the unit of work. It owns the transaction every graph
//! operation writes into, the locks taken along the way and the tracking of
//! touched elements. Graph operations receive the session explicitly.
//!
//! Completing a session runs the registered constraint validators over the
//! touched elements, commits (or rolls back) the transaction, pushes the
//! change sets to the persistence adapters and releases every lock.
//! Dropping a session that was never completed aborts it.

pub mod command;
pub mod diagnostics;
pub mod lock;
pub mod tracking;

pub use command::DomainCommand;
pub use diagnostics::{ConstraintValidator, DiagnosticMessage, MessageKind, SessionResult};
pub use lock::{LockManager, LockMode};
pub use tracking::{PropertyChange, TrackedElement, TrackingData, TrackingState};

use crate::domain::Store;
use crate::error::{HyperGraphError, HyperGraphResult};
use crate::graph::storage::{Transaction, TransactionId};
use crate::graph::{GraphProvider, Identity};
use crate::persistence::ChangeSet;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionIsolationLevel {
    /// Reads take shared locks and wait for in-flight writers
    #[default]
    Serializable,
    /// Reads see committed values without locking
    ReadCommitted,
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfiguration {
    /// Falls back to the store default
    pub isolation: Option<SessionIsolationLevel>,
    pub read_only: bool,
    /// Falls back to the store lock timeout
    pub lock_timeout: Option<Duration>,
}

impl SessionConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_isolation(mut self, isolation: SessionIsolationLevel) -> Self {
        self.isolation = Some(isolation);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }
}

/// Cancellation flag shared with other threads
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

struct SessionState {
    transaction: Transaction,
    locks: FxHashSet<Identity>,
    tracking: TrackingData,
    messages: Vec<DiagnosticMessage>,
    completed: bool,
}

pub struct Session {
    id: SessionId,
    store: Store,
    isolation: SessionIsolationLevel,
    read_only: bool,
    lock_timeout: Duration,
    cancellation: CancellationToken,
    state: Mutex<SessionState>,
}

impl Session {
    pub(crate) fn begin(store: Store, configuration: SessionConfiguration) -> Session {
        let config = store.config();
        let transaction = Transaction::begin(config.max_nesting_depth, config.parallel_index_updates);
        let isolation = configuration.isolation.unwrap_or(config.default_isolation);
        let lock_timeout = configuration.lock_timeout.unwrap_or_else(|| config.lock_timeout());

        let session = Session {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            isolation,
            read_only: configuration.read_only,
            lock_timeout,
            cancellation: CancellationToken::new(),
            state: Mutex::new(SessionState {
                transaction,
                locks: FxHashSet::default(),
                tracking: TrackingData::new(),
                messages: Vec::new(),
                completed: false,
            }),
            store,
        };
        debug!("Session {} started ({:?})", session.id, session.isolation);
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn isolation(&self) -> SessionIsolationLevel {
        self.isolation
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    /// Transaction used to resolve reads, `None` once completed
    pub fn transaction_id(&self) -> Option<TransactionId> {
        let state = self.state.lock();
        (!state.completed).then(|| state.transaction.id())
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn check_cancelled(&self) -> HyperGraphResult<()> {
        if self.is_cancelled() {
            Err(HyperGraphError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Fail unless the session can still do work
    pub fn ensure_active(&self) -> HyperGraphResult<()> {
        self.check_cancelled()?;
        let state = self.state.lock();
        if state.completed {
            return Err(HyperGraphError::SessionClosed);
        }
        state.transaction.ensure_active()
    }

    /// Fail unless the session may modify `id`
    pub fn ensure_writable(&self, id: &Identity) -> HyperGraphResult<()> {
        self.ensure_active()?;
        if self.read_only {
            return Err(HyperGraphError::ReadOnlyViolation(id.clone()));
        }
        Ok(())
    }

    /// Run `f` against the session transaction
    pub fn with_transaction<T>(&self, f: impl FnOnce(&mut Transaction) -> T) -> HyperGraphResult<T> {
        let mut state = self.state.lock();
        if state.completed {
            return Err(HyperGraphError::SessionClosed);
        }
        state.transaction.ensure_active()?;
        Ok(f(&mut state.transaction))
    }

    pub fn acquire_lock(&self, mode: LockMode, id: &Identity) -> HyperGraphResult<()> {
        self.ensure_active()?;
        if self.state.lock().locks.contains(id) && mode == LockMode::Shared {
            return Ok(());
        }
        self.store
            .locks()
            .acquire(self.id, mode, id, self.lock_timeout)?;
        self.state.lock().locks.insert(id.clone());
        Ok(())
    }

    /// Shared lock for a read, only under `Serializable`
    pub fn acquire_read_lock(&self, id: &Identity) -> HyperGraphResult<()> {
        match self.isolation {
            SessionIsolationLevel::Serializable => self.acquire_lock(LockMode::Shared, id),
            SessionIsolationLevel::ReadCommitted => Ok(()),
        }
    }

    pub(crate) fn track(&self, f: impl FnOnce(&mut TrackingData)) {
        f(&mut self.state.lock().tracking);
    }

    /// Copy of the tracking data gathered so far
    pub fn tracking(&self) -> TrackingData {
        self.state.lock().tracking.clone()
    }

    pub fn add_message(&self, message: DiagnosticMessage) {
        self.state.lock().messages.push(message);
    }

    /// Run commands, routing each to the graph owning its target.
    /// A failing command poisons the session so it can no longer commit.
    pub fn execute(
        &self,
        local: &dyn GraphProvider,
        commands: impl IntoIterator<Item = DomainCommand>,
    ) -> HyperGraphResult<()> {
        for command in commands {
            let result = self.check_cancelled().and_then(|_| {
                if command.target().belongs_to(local.domain_name()) {
                    command.apply(local, self)
                } else {
                    debug!("Routing {} to domain {}", command, command.domain_name());
                    let remote = self.store.domain_graph(command.domain_name())?;
                    command.apply(remote.as_ref(), self)
                }
            });
            if let Err(err) = result {
                warn!("Session {}: {} failed: {}", self.id, command, err);
                let mut state = self.state.lock();
                state.messages.push(DiagnosticMessage::from(&err));
                state.transaction.poison();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Run `f` in a nested scope. An error aborts the scope, which makes
    /// the whole session roll back.
    pub fn nested<T>(&self, f: impl FnOnce(&Session) -> HyperGraphResult<T>) -> HyperGraphResult<T> {
        self.with_transaction(|tx| tx.begin_nested())??;
        match f(self) {
            Ok(value) => {
                self.with_transaction(|tx| tx.commit())??;
                Ok(value)
            }
            Err(err) => {
                self.with_transaction(|tx| tx.abort())?;
                Err(err)
            }
        }
    }

    /// Validate, commit and release everything
    pub fn commit(self) -> SessionResult {
        self.complete(true)
    }

    /// Roll back and release everything
    pub fn abort(self) -> SessionResult {
        self.complete(false)
    }

    fn validate(&self) -> Vec<DiagnosticMessage> {
        let validators = self.store.constraints();
        if validators.is_empty() {
            return Vec::new();
        }
        let involved: Vec<TrackedElement> = self
            .tracking()
            .involved()
            .filter(|e| matches!(e.state, TrackingState::Added | TrackingState::Updated))
            .cloned()
            .collect();

        let mut messages = Vec::new();
        for validator in &validators {
            for element in &involved {
                messages.extend(validator.implicit_validate(self, element));
            }
        }
        messages
    }

    fn complete(&self, mut commit: bool) -> SessionResult {
        let mut messages = Vec::new();
        if commit {
            if self.is_cancelled() {
                messages.push(DiagnosticMessage::from(&HyperGraphError::Cancelled));
                commit = false;
            } else {
                messages = self.validate();
                if messages.iter().any(DiagnosticMessage::is_error) {
                    commit = false;
                }
            }
        }

        let (locks, tracking, aborted, mut recorded) = {
            let mut state = self.state.lock();
            if state.completed {
                return SessionResult {
                    session_id: self.id,
                    aborted: true,
                    messages: vec![DiagnosticMessage::from(&HyperGraphError::SessionClosed)],
                    involved: Vec::new(),
                };
            }
            state.completed = true;

            let committed = if commit {
                match state.transaction.commit() {
                    Ok(true) => true,
                    Ok(false) => {
                        // unbalanced nested scope, treat as abort
                        while state.transaction.is_active() {
                            state.transaction.abort();
                        }
                        false
                    }
                    Err(err) => {
                        state.messages.push(DiagnosticMessage::from(&err));
                        false
                    }
                }
            } else {
                while state.transaction.is_active() {
                    state.transaction.abort();
                }
                false
            };

            (
                std::mem::take(&mut state.locks),
                std::mem::take(&mut state.tracking),
                !committed,
                std::mem::take(&mut state.messages),
            )
        };

        if !aborted {
            self.write_through(&tracking);
        }
        self.store.locks().release_all(self.id, locks.iter());

        recorded.extend(messages);
        if aborted {
            info!("Session {} aborted", self.id);
        } else {
            info!("Session {} committed", self.id);
        }
        SessionResult {
            session_id: self.id,
            aborted,
            messages: recorded,
            involved: tracking.involved().cloned().collect(),
        }
    }

    fn write_through(&self, tracking: &TrackingData) {
        for domain_name in tracking.domains() {
            let Ok(domain) = self.store.get_domain(&domain_name) else {
                continue;
            };
            let changes = ChangeSet::from_tracking(self.id, &domain_name, tracking);
            if !changes.is_empty() {
                domain.on_session_completed(&changes);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let completed = self.state.lock().completed;
        if !completed {
            self.complete(false);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("isolation", &self.isolation)
            .field("read_only", &self.read_only)
            .finish()
    }
}

//! Transactions over the memory stores
//!
//! A [`Transaction`] is `Active` until its outermost scope commits or aborts.
//! Nested `begin`s only push a marker: committing an inner scope pops it,
//! aborting an inner scope pops it and poisons the whole stack so the outer
//! commit turns into a rollback.
//!
//! Stores enlist on first write and keep their pending changes keyed by the
//! transaction id. Statistics updates and index maintenance are queued here
//! and run only after every enlisted store has committed, so an aborted
//! transaction never leaves a trace in an index.

use crate::error::{HyperGraphError, HyperGraphResult};
use crate::graph::event::IndexEvent;
use crate::index::PropertyIndex;
use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub type TransactionId = u64;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    Aborted,
}

/// A store holding changes on behalf of transactions
pub trait TransactionParticipant: Send + Sync {
    /// Stable id used to enlist a participant only once
    fn participant_id(&self) -> usize;

    fn commit(&self, tx: TransactionId);

    fn rollback(&self, tx: TransactionId);
}

/// Index maintenance queued until commit
#[derive(Clone)]
pub struct IndexAction {
    pub index: Arc<PropertyIndex>,
    pub event: IndexEvent,
}

impl fmt::Debug for IndexAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexAction")
            .field("index", &self.index.name())
            .field("event", &self.event)
            .finish()
    }
}

type DeferredAction = Box<dyn FnOnce() + Send>;

pub struct Transaction {
    id: TransactionId,
    status: TransactionStatus,
    depth: usize,
    max_depth: usize,
    poisoned: bool,
    parallel_index_updates: bool,
    participants: Vec<Arc<dyn TransactionParticipant>>,
    deferred_actions: Vec<DeferredAction>,
    index_actions: Vec<IndexAction>,
}

impl Transaction {
    /// Begin the outermost scope
    pub fn begin(max_depth: usize, parallel_index_updates: bool) -> Self {
        let id = NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Transaction {} started", id);
        Transaction {
            id,
            status: TransactionStatus::Active,
            depth: 1,
            max_depth: max_depth.max(1),
            poisoned: false,
            parallel_index_updates,
            participants: Vec::new(),
            deferred_actions: Vec::new(),
            index_actions: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// An inner scope aborted; the outer commit will roll back
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Make the outermost commit roll back
    pub fn poison(&mut self) {
        self.poisoned = true;
    }

    pub fn begin_nested(&mut self) -> HyperGraphResult<()> {
        self.ensure_active()?;
        if self.depth >= self.max_depth {
            return Err(HyperGraphError::TransactionAborted);
        }
        self.depth += 1;
        Ok(())
    }

    pub fn ensure_active(&self) -> HyperGraphResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(HyperGraphError::TransactionAborted)
        }
    }

    pub fn enlist(&mut self, participant: Arc<dyn TransactionParticipant>) {
        let id = participant.participant_id();
        if !self.participants.iter().any(|p| p.participant_id() == id) {
            self.participants.push(participant);
        }
    }

    /// Queue an action to run once the outermost scope has committed
    pub fn defer(&mut self, action: impl FnOnce() + Send + 'static) {
        self.deferred_actions.push(Box::new(action));
    }

    pub fn defer_index_action(&mut self, action: IndexAction) {
        self.index_actions.push(action);
    }

    /// Index actions queued so far, oldest first
    pub fn pending_index_actions(&self) -> &[IndexAction] {
        &self.index_actions
    }

    /// Commit the current scope. Returns `true` when the outermost scope
    /// committed and the changes are now visible.
    pub fn commit(&mut self) -> HyperGraphResult<bool> {
        self.ensure_active()?;
        self.depth -= 1;
        if self.depth > 0 {
            return Ok(false);
        }

        if self.poisoned {
            self.rollback_all();
            return Err(HyperGraphError::TransactionAborted);
        }

        for participant in &self.participants {
            participant.commit(self.id);
        }
        self.status = TransactionStatus::Committed;

        self.run_index_actions();
        for action in self.deferred_actions.drain(..) {
            action();
        }
        debug!("Transaction {} committed", self.id);
        Ok(true)
    }

    /// Abort the current scope. An inner abort only poisons the stack.
    pub fn abort(&mut self) {
        if !self.is_active() {
            return;
        }
        if self.depth > 1 {
            self.depth -= 1;
            self.poisoned = true;
            return;
        }
        self.depth = 0;
        self.rollback_all();
    }

    fn rollback_all(&mut self) {
        for participant in &self.participants {
            participant.rollback(self.id);
        }
        self.index_actions.clear();
        self.deferred_actions.clear();
        self.status = TransactionStatus::Aborted;
        debug!("Transaction {} aborted", self.id);
    }

    /// Indexes are independent of each other, so each index replays its own
    /// events in order while distinct indexes update in parallel.
    fn run_index_actions(&mut self) {
        if self.index_actions.is_empty() {
            return;
        }

        let mut groups: Vec<(Arc<PropertyIndex>, Vec<IndexEvent>)> = Vec::new();
        for action in self.index_actions.drain(..) {
            match groups.iter_mut().find(|(index, _)| Arc::ptr_eq(index, &action.index)) {
                Some((_, events)) => events.push(action.event),
                None => groups.push((action.index, vec![action.event])),
            }
        }

        if self.parallel_index_updates {
            groups
                .into_par_iter()
                .for_each(|(index, events)| index.apply(&events));
        } else {
            for (index, events) in groups {
                index.apply(&events);
            }
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_active() {
            self.depth = 1;
            self.abort();
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("depth", &self.depth)
            .field("poisoned", &self.poisoned)
            .field("participants", &self.participants.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Identity, Value};
    use crate::index::IndexDefinition;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl TransactionParticipant for Recorder {
        fn participant_id(&self) -> usize {
            self as *const Recorder as usize
        }

        fn commit(&self, tx: TransactionId) {
            self.events.lock().push(format!("commit {}", tx));
        }

        fn rollback(&self, tx: TransactionId) {
            self.events.lock().push(format!("rollback {}", tx));
        }
    }

    fn index() -> Arc<PropertyIndex> {
        Arc::new(PropertyIndex::new(IndexDefinition::new(
            "by_name",
            Identity::new("d", "Person"),
            "Name",
            false,
        )))
    }

    #[test]
    fn test_commit_outermost() {
        let recorder = Arc::new(Recorder::default());
        let mut tx = Transaction::begin(8, true);
        tx.enlist(recorder.clone());
        tx.enlist(recorder.clone());

        assert!(tx.commit().unwrap());
        assert_eq!(tx.status(), TransactionStatus::Committed);
        assert_eq!(recorder.events.lock().len(), 1);
    }

    #[test]
    fn test_nested_commit_collapses() {
        let recorder = Arc::new(Recorder::default());
        let mut tx = Transaction::begin(8, true);
        tx.begin_nested().unwrap();
        tx.begin_nested().unwrap();
        tx.enlist(recorder.clone());

        assert!(!tx.commit().unwrap());
        assert!(!tx.commit().unwrap());
        assert!(recorder.events.lock().is_empty());
        assert!(tx.commit().unwrap());
        assert_eq!(recorder.events.lock().len(), 1);
    }

    #[test]
    fn test_inner_abort_poisons() {
        let recorder = Arc::new(Recorder::default());
        let mut tx = Transaction::begin(8, true);
        tx.enlist(recorder.clone());
        tx.begin_nested().unwrap();
        tx.abort();
        assert!(tx.is_poisoned());
        assert!(tx.is_active());

        assert!(matches!(tx.commit(), Err(HyperGraphError::TransactionAborted)));
        assert_eq!(tx.status(), TransactionStatus::Aborted);
        assert!(recorder.events.lock()[0].starts_with("rollback"));
    }

    #[test]
    fn test_nesting_limit() {
        let mut tx = Transaction::begin(2, true);
        tx.begin_nested().unwrap();
        assert!(tx.begin_nested().is_err());
    }

    #[test]
    fn test_deferred_actions_run_only_on_commit() {
        let index = index();
        let id = Identity::new("d", "1");

        let mut aborted = Transaction::begin(8, true);
        aborted.defer_index_action(IndexAction {
            index: index.clone(),
            event: IndexEvent::added(id.clone(), Value::from("Alice")),
        });
        aborted.abort();
        assert!(index.get(&Value::from("Alice")).is_empty());

        let counter = Arc::new(AtomicU64::new(0));
        let mut committed = Transaction::begin(8, false);
        committed.defer_index_action(IndexAction {
            index: index.clone(),
            event: IndexEvent::added(id.clone(), Value::from("Alice")),
        });
        let c = counter.clone();
        committed.defer(move || {
            c.fetch_add(1, Ordering::Relaxed);
        });
        committed.commit().unwrap();

        assert_eq!(index.get(&Value::from("Alice")), vec![id]);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_drop_aborts() {
        let recorder = Arc::new(Recorder::default());
        {
            let mut tx = Transaction::begin(8, true);
            tx.enlist(recorder.clone());
            tx.begin_nested().unwrap();
        }
        assert!(recorder.events.lock()[0].starts_with("rollback"));
    }
}

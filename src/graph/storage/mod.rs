//! Transactional storage for graph records

pub mod memory;
pub mod transaction;

pub use memory::{Lookup, MemoryStore};
pub use transaction::{
    IndexAction, Transaction, TransactionId, TransactionParticipant, TransactionStatus,
};

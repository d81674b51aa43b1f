//! Persistence layer
//!
//! The graph itself is purely in memory. A domain can be backed by an
//! external store through [`PersistenceAdapter`]; the [`CacheAdapter`] turns
//! that store into a lazy, read-through source for the domain's memory
//! stores and forwards committed changes to it.

pub mod adapter;
pub mod cache;
pub mod memory;

pub use adapter::{ChangeSet, NodeResult, PersistenceAdapter};
pub use cache::CacheAdapter;
pub use memory::InMemoryAdapter;

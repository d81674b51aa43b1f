//! Property indexing
//!
//! Provides B-Tree indices over (schema, property) pairs. Index content only
//! changes when a transaction commits.

pub mod manager;
pub mod property_index;

pub use manager::IndexManager;
pub use property_index::{IndexDefinition, PropertyIndex};

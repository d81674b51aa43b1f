//! Hyperstore
//!
//! An embeddable, in-memory hypergraph store. Elements are entities and
//! relationships identified by a domain-qualified [`Identity`]; relationships
//! are elements too, so they can carry properties and be the endpoints of
//! other relationships.
//!
//! # Architecture
//!
//! - [`graph`]: identities, records, persistent adjacency lists and the
//!   [`HyperGraph`] holding a domain's records
//! - [`graph::storage`]: transactional memory stores with nested scopes and
//!   deferred post-commit actions
//! - [`session`]: units of work, identity locks, tracking, constraint
//!   validation and diagnostics
//! - [`domain`]: schemas, loaded domains, the [`Store`] registry and domain
//!   extensions layered over a base domain
//! - [`index`]: property indexes maintained at commit
//! - [`persistence`]: the adapter contract, a read-through cache and an
//!   in-memory adapter
//!
//! ## Example Usage
//!
//! ```rust
//! use hyperstore::{GraphProvider, Identity, SchemaElement, SessionConfiguration, Store, ValueKind};
//!
//! let store = Store::default();
//! let library = store.load_domain("lib").unwrap();
//! library
//!     .register_schema(SchemaElement::entity(Identity::new("lib", "Book")).with_property("Title", ValueKind::String))
//!     .unwrap();
//!
//! let graph = library.graph();
//! let session = store.begin_session(SessionConfiguration::new());
//! let book = Identity::new("lib", "dune");
//! graph.create_entity(&session, book.clone(), &Identity::new("lib", "Book")).unwrap();
//! graph
//!     .set_property_value(&session, &book, &Identity::new("lib", "Book"), "Title", "Dune".into(), None)
//!     .unwrap();
//! assert!(session.commit().is_committed());
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod index;
pub mod persistence;
pub mod session;

// Re-export main types for convenience
pub use config::{ConfigError, StoreConfig};

pub use domain::{
    DomainModel, DomainSchema, DomainService, ExtendedMode, ExtensionInfo, PropertyDefinition,
    SchemaElement, SchemaKind, SchemaProvider, Store,
};

pub use error::{HyperGraphError, HyperGraphResult};

pub use graph::{
    Direction, EdgeInfo, Element, Entity, GraphProvider, HyperGraph, Identity, NodeType,
    PropertyValue, Relationship, StatisticsSnapshot, Value, ValueKind,
};

pub use index::{IndexDefinition, PropertyIndex};

pub use persistence::{CacheAdapter, ChangeSet, InMemoryAdapter, NodeResult, PersistenceAdapter};

pub use session::{
    ConstraintValidator, DiagnosticMessage, DomainCommand, LockMode, Session,
    SessionConfiguration, SessionIsolationLevel, SessionResult, TrackedElement, TrackingState,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

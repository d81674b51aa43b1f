//! Error types for the hypergraph engine

use crate::config::ConfigError;
use crate::graph::property::Value;
use crate::graph::types::Identity;
use crate::session::lock::LockMode;
use thiserror::Error;

/// Errors raised by hypergraph operations
///
/// Every element-level error carries the offending [`Identity`].
#[derive(Error, Debug)]
pub enum HyperGraphError {
    /// The identity does not resolve to a live element
    #[error("Invalid element {0}")]
    InvalidElement(Identity),

    /// An element with this identity already exists
    #[error("Duplicate element {0}")]
    DuplicateElement(Identity),

    /// Mutation attempted through a read-only session or domain
    #[error("Read-only violation on {0}")]
    ReadOnlyViolation(Identity),

    /// Conditional property write with a stale version
    #[error("Version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict {
        id: Identity,
        expected: i64,
        actual: i64,
    },

    #[error("Schema {0} not found")]
    SchemaNotFound(Identity),

    /// The schema exists but is the wrong kind for the operation
    #[error("Invalid schema {0}")]
    InvalidSchema(Identity),

    /// Value does not match the declared property kind
    #[error("Invalid value {value} for property {property} of {id}")]
    InvalidValue {
        id: Identity,
        property: String,
        value: Value,
    },

    #[error("Unique index {index} already contains {value}")]
    UniqueConstraint { index: String, value: Value },

    /// Lock not granted before the time-before-deadlock elapsed
    #[error("Lock timeout ({mode:?}) on {id}")]
    LockTimeout { id: Identity, mode: LockMode },

    #[error("Session is closed")]
    SessionClosed,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Transaction aborted")]
    TransactionAborted,

    #[error("Domain {0} not found")]
    DomainNotFound(String),

    #[error("Domain {0} already exists")]
    DomainAlreadyExists(String),

    #[error("Domain {0} has been unloaded")]
    DomainUnloaded(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl HyperGraphError {
    /// Identity the error is about, when there is one
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            HyperGraphError::InvalidElement(id)
            | HyperGraphError::DuplicateElement(id)
            | HyperGraphError::ReadOnlyViolation(id)
            | HyperGraphError::SchemaNotFound(id)
            | HyperGraphError::InvalidSchema(id) => Some(id),
            HyperGraphError::VersionConflict { id, .. }
            | HyperGraphError::InvalidValue { id, .. }
            | HyperGraphError::LockTimeout { id, .. } => Some(id),
            _ => None,
        }
    }
}

pub type HyperGraphResult<T> = Result<T, HyperGraphError>;

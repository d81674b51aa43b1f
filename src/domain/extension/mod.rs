//! Domain extensions
//!
//! An extension is a scope layered over a loaded domain. It shares the base
//! domain's name, so identities resolve to it while it is loaded, and keeps
//! its own records, schema additions and tombstones. Unloading it leaves the
//! base as it was, apart from edits an `Updatable` extension passed through.

pub mod adapter;
pub mod hypergraph;
pub mod schema;

pub use adapter::DomainExtensionAdapter;
pub use hypergraph::DomainExtensionHyperGraph;
pub use schema::DomainExtensionSchema;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtendedMode {
    /// Every edit stays in the extension
    ReadOnly,
    /// Removals and property writes on base elements reach the base
    Updatable,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtensionInfo {
    /// Unique name of this extension
    pub name: String,
    pub base_name: String,
    pub mode: ExtendedMode,
    pub created_at: DateTime<Utc>,
}

//! Index maintenance events
//!
//! Property writes produce events that are queued on the transaction and
//! replayed against the affected indexes once the transaction commits.

use super::property::Value;
use super::types::Identity;

#[derive(Debug, Clone, PartialEq)]
pub enum IndexEvent {
    /// `id` now holds `value`
    Added { id: Identity, value: Value },
    /// `id` no longer holds `value`
    Removed { id: Identity, value: Value },
}

impl IndexEvent {
    pub fn added(id: Identity, value: Value) -> Self {
        IndexEvent::Added { id, value }
    }

    pub fn removed(id: Identity, value: Value) -> Self {
        IndexEvent::Removed { id, value }
    }

    pub fn id(&self) -> &Identity {
        match self {
            IndexEvent::Added { id, .. } | IndexEvent::Removed { id, .. } => id,
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            IndexEvent::Added { value, .. } | IndexEvent::Removed { value, .. } => value,
        }
    }
}

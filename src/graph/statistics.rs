//! Per-domain counters
//!
//! Counters only move when a transaction commits; the graph queues the
//! increments as deferred actions.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct GraphStatistics {
    entities_created: AtomicU64,
    entities_removed: AtomicU64,
    relationships_created: AtomicU64,
    relationships_removed: AtomicU64,
    property_writes: AtomicU64,
}

/// Point-in-time copy of [`GraphStatistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub entities_created: u64,
    pub entities_removed: u64,
    pub relationships_created: u64,
    pub relationships_removed: u64,
    pub property_writes: u64,
}

impl StatisticsSnapshot {
    pub fn entity_count(&self) -> u64 {
        self.entities_created.saturating_sub(self.entities_removed)
    }

    pub fn relationship_count(&self) -> u64 {
        self.relationships_created
            .saturating_sub(self.relationships_removed)
    }
}

impl GraphStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_created(&self) {
        self.entities_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn entity_removed(&self) {
        self.entities_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relationship_created(&self) {
        self.relationships_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relationship_removed(&self) {
        self.relationships_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn property_written(&self) {
        self.property_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            entities_created: self.entities_created.load(Ordering::Relaxed),
            entities_removed: self.entities_removed.load(Ordering::Relaxed),
            relationships_created: self.relationships_created.load(Ordering::Relaxed),
            relationships_removed: self.relationships_removed.load(Ordering::Relaxed),
            property_writes: self.property_writes.load(Ordering::Relaxed),
        }
    }
}

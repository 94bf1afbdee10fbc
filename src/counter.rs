//! Process-wide security event counter.
//!
//! Grounded on the host stack's `UsageStats`/`ResponseCache` pattern: a
//! `DashMap` of atomics gives lock-free, sharded increments without requiring
//! callers to pre-register every `(category, event_type)` pair.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::error::{SecurityEventCategory, ValidationEventType};

/// Sparse, monotonically-increasing `(category, event_type) -> count` map.
///
/// Never decremented. Safe to share behind an `Arc` across every validator,
/// loader, and pipeline invocation in a process.
#[derive(Default)]
pub struct SecurityEventCounter {
    counts: DashMap<(SecurityEventCategory, ValidationEventType), AtomicU64>,
}

impl SecurityEventCounter {
    /// Create an empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `event_type`.
    ///
    /// The category is derived from the event type itself, so callers cannot
    /// record an event under the wrong category.
    pub fn increment(&self, event_type: ValidationEventType) {
        let key = (event_type.category(), event_type);
        self.counts
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Read the current count for a specific `(category, event_type)` pair.
    ///
    /// Returns `0` if no event of this type has ever been recorded.
    #[must_use]
    pub fn get(&self, category: SecurityEventCategory, event_type: ValidationEventType) -> u64 {
        self.counts
            .get(&(category, event_type))
            .map_or(0, |entry| entry.load(Ordering::Relaxed))
    }

    /// Materialize a point-in-time snapshot of every non-zero counter.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<(SecurityEventCategory, ValidationEventType), u64> {
        self.counts
            .iter()
            .map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }
}

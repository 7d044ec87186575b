//! Bounded history of classified failures.
//!
//! Records are appended to a fixed-capacity ring buffer and evicted oldest
//! first. The history answers "how many failures of this category happened
//! recently", which drives retry dampening and error statistics.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::classify::{ErrorCategory, Severity};
use super::error::Failure;
use crate::util::clock::now_ms;

/// One classified failure.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    /// Monotonic capture time, used for window queries.
    pub at: Instant,
    /// Wall-clock capture time in milliseconds since the epoch.
    pub created_at_ms: u128,
    /// Assigned category.
    pub category: ErrorCategory,
    /// Assigned severity.
    pub severity: Severity,
    /// Name of the operation that failed.
    pub operation_name: String,
    /// Declared failure type name.
    pub kind: String,
    /// Failure message.
    pub message: String,
}

impl ErrorRecord {
    /// Build a record stamped with the current time.
    pub fn new(
        operation_name: impl Into<String>,
        failure: &Failure,
        category: ErrorCategory,
        severity: Severity,
    ) -> Self {
        Self {
            at: Instant::now(),
            created_at_ms: now_ms(),
            category,
            severity,
            operation_name: operation_name.into(),
            kind: failure.kind.clone(),
            message: failure.message.clone(),
        }
    }
}

/// Per-category failure counts over a window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorStatistics {
    /// Failures per category inside the window.
    pub by_category: BTreeMap<ErrorCategory, u64>,
    /// Sum of `by_category`.
    pub total: u64,
    /// Lifetime failures per category since the last counter reset.
    pub lifetime: BTreeMap<ErrorCategory, u64>,
}

/// Fixed-capacity FIFO of error records.
#[derive(Debug)]
pub struct ErrorLog {
    records: VecDeque<ErrorRecord>,
    capacity: usize,
}

impl ErrorLog {
    /// Create an empty log holding at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest when full.
    pub fn record(&mut self, record: ErrorRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Records of `category` captured within `window` of now.
    #[must_use]
    pub fn count_recent(&self, category: ErrorCategory, window: Duration) -> usize {
        let now = Instant::now();
        self.records
            .iter()
            .filter(|r| r.category == category && now.saturating_duration_since(r.at) <= window)
            .count()
    }

    /// Per-category counts within `window` of now.
    #[must_use]
    pub fn counts_within(&self, window: Duration) -> BTreeMap<ErrorCategory, u64> {
        let now = Instant::now();
        let mut counts = BTreeMap::new();
        for record in self
            .records
            .iter()
            .filter(|r| now.saturating_duration_since(r.at) <= window)
        {
            *counts.entry(record.category).or_insert(0) += 1;
        }
        counts
    }

    /// Snapshot of stored records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records.iter().cloned().collect()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

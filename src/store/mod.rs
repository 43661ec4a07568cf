//! Temporal event storage
//!
//! The store keeps every flushed event in one global order, `(timestamp,
//! insertion sequence)`, and serves range, correlation and source-node
//! queries as subsets of that order.
//!
//! # Concurrency
//!
//! The drain coordinator is the only writer. Each appended batch becomes
//! visible atomically, so readers observe a monotonically growing view and
//! never a partially applied batch. Pruning runs on the same writer.
//!
//! # Components
//!
//! - [`EventStore`] - The append seam used by the drain coordinator
//! - [`TemporalStore`] - In-memory ordered index with secondary indexes
//! - [`RetentionPolicy`] - Age and count limits applied by pruning

pub mod retention;
pub mod temporal;

pub use retention::{AgeAnchor, RetentionPolicy};
pub use temporal::{StoreStats, TemporalStore};

use crate::error::Result;
use crate::types::{SequencedEvent, Timestamp};
use serde::{Deserialize, Serialize};

/// Write side of an event store, as seen by the drain coordinator
#[cfg_attr(test, mockall::automock)]
pub trait EventStore: Send + Sync {
    /// Insert a batch in time order; the batch becomes visible atomically
    fn append_batch(&self, batch: &[SequencedEvent]) -> Result<()>;

    /// Evict events that violate the retention policy, returning how many went
    fn prune(&self, now: Timestamp) -> Result<usize>;
}

/// Inclusive timestamp interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub fn new(start: impl Into<Timestamp>, end: impl Into<Timestamp>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// The unbounded range
    pub fn all() -> Self {
        Self {
            start: Timestamp::MIN,
            end: Timestamp::MAX,
        }
    }

    pub fn contains(&self, timestamp: Timestamp) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_is_inclusive() {
        let range = TimeRange::new(1000, 2000);
        assert!(range.contains(Timestamp(1000)));
        assert!(range.contains(Timestamp(2000)));
        assert!(!range.contains(Timestamp(2001)));
        assert!(!range.is_empty());
        assert!(TimeRange::new(5, 4).is_empty());
        assert!(TimeRange::all().contains(Timestamp::MIN));
    }
}

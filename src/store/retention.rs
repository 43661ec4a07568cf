//! Retention limits for the temporal store

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Clock that event age is measured against
///
/// Event timestamps come from whatever clock the instrumentation uses, which
/// need not be the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeAnchor {
    /// Age relative to the newest stored event
    #[default]
    NewestEvent,
    /// Age relative to the wall clock at prune time (epoch nanoseconds)
    WallClock,
}

/// Age and count limits; `None` means unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionPolicy {
    /// Keep at most this many events (oldest evicted first)
    pub max_events: Option<usize>,
    /// Evict events older than this relative to the anchor
    pub max_age: Option<Duration>,
    pub anchor: AgeAnchor,
}

impl RetentionPolicy {
    /// No limits at all
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = Some(max_events);
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_anchor(mut self, anchor: AgeAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    /// Events stamped strictly before the returned value are too old
    ///
    /// `now` is the wall clock at prune time and `newest` the latest stored
    /// timestamp; which one counts depends on the anchor.
    pub fn age_cutoff(&self, now: Timestamp, newest: Option<Timestamp>) -> Option<Timestamp> {
        let max_age = self.max_age?;
        let reference = match self.anchor {
            AgeAnchor::NewestEvent => newest?,
            AgeAnchor::WallClock => now,
        };
        Some(reference.saturating_sub(max_age))
    }

    /// Number of oldest events to evict to respect the count limit
    pub fn excess(&self, len: usize) -> usize {
        self.max_events
            .map(|max| len.saturating_sub(max))
            .unwrap_or(0)
    }
}

//! Core data types for ChronoTrace
//!
//! This module contains the fundamental data structures used throughout
//! the pipeline: events produced by instrumentation, the identifiers that
//! correlate them, and the statistics reported by the capture layer.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Nanosecond-resolution clock value
///
/// Timestamps are comparable but not unique: several producers may stamp
/// events with the same value, and ordering ties are broken by the store's
/// insertion sequence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Smallest representable timestamp (open lower bound for range queries)
    pub const MIN: Timestamp = Timestamp(i64::MIN);
    /// Largest representable timestamp (open upper bound for range queries)
    pub const MAX: Timestamp = Timestamp(i64::MAX);

    /// Create a timestamp from raw nanoseconds
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Current wall clock time in nanoseconds since the Unix epoch
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos().min(i64::MAX as u128) as i64)
            .unwrap_or(0);
        Self(nanos)
    }

    /// Raw nanosecond value
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Subtract a duration, saturating at [`Timestamp::MIN`]
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        let nanos = duration.as_nanos().min(i64::MAX as u128) as i64;
        Self(self.0.saturating_sub(nanos))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

impl From<i64> for Timestamp {
    fn from(nanos: i64) -> Self {
        Self(nanos)
    }
}

// Unsuffixed integer literals default to i32
impl From<i32> for Timestamp {
    fn from(nanos: i32) -> Self {
        Self(i64::from(nanos))
    }
}

/// Identifier of a concurrent producer (one capture buffer each)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProducerId(pub u32);

impl std::fmt::Display for ProducerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of traced occurrence
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A function was entered
    FunctionEntry,
    /// A function returned
    FunctionExit,
    /// A message was sent to another execution context
    MessageSend,
    /// A message was received from another execution context
    MessageReceive,
    /// Program state changed (variable assignment, field update)
    StateChange,
    /// Instrumentation-defined kind with no effect on reconstructed state
    Custom(String),
}

impl EventKind {
    /// Display name for the kind
    pub fn display_name(&self) -> &str {
        match self {
            EventKind::FunctionEntry => "function_entry",
            EventKind::FunctionExit => "function_exit",
            EventKind::MessageSend => "message_send",
            EventKind::MessageReceive => "message_receive",
            EventKind::StateChange => "state_change",
            EventKind::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// An immutable record of a traced occurrence
///
/// Fields are private: an event is assembled with the builder methods and is
/// never mutated once it has been submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_node_id: Option<String>,
    kind: EventKind,
    #[serde(default)]
    payload: serde_json::Value,
}

impl Event {
    /// Create a new event with an empty payload
    pub fn new(timestamp: impl Into<Timestamp>, kind: EventKind) -> Self {
        Self {
            timestamp: timestamp.into(),
            correlation_id: None,
            source_node_id: None,
            kind,
            payload: serde_json::Value::Null,
        }
    }

    /// Create a new event stamped with the current clock
    pub fn now(kind: EventKind) -> Self {
        Self::new(Timestamp::now(), kind)
    }

    /// Function entry event; `function` becomes the pushed frame id
    pub fn function_entry(timestamp: impl Into<Timestamp>, function: impl Into<String>) -> Self {
        Self::new(timestamp, EventKind::FunctionEntry)
            .with_payload(serde_json::json!({ "function": function.into() }))
    }

    /// Function exit event
    pub fn function_exit(timestamp: impl Into<Timestamp>) -> Self {
        Self::new(timestamp, EventKind::FunctionExit)
    }

    /// State change binding a single variable
    pub fn state_change(
        timestamp: impl Into<Timestamp>,
        variable: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self::new(timestamp, EventKind::StateChange)
            .with_payload(serde_json::json!({ "variable": variable.into(), "value": value }))
    }

    /// Set the correlation id
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set the source node id
    pub fn with_source_node(mut self, source_node_id: impl Into<String>) -> Self {
        self.source_node_id = Some(source_node_id.into());
        self
    }

    /// Replace the payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn source_node_id(&self) -> Option<&str> {
        self.source_node_id.as_deref()
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}

/// An event together with the insertion sequence assigned at flush time
#[derive(Debug, Clone)]
pub struct SequencedEvent {
    /// Monotonic insertion sequence, used only to break timestamp ties
    pub seq: u64,
    /// The shared, immutable event
    pub event: Arc<Event>,
}

impl SequencedEvent {
    pub fn new(seq: u64, event: Arc<Event>) -> Self {
        Self { seq, event }
    }

    /// Total-order key: `(timestamp, seq)`
    #[inline]
    pub fn key(&self) -> (Timestamp, u64) {
        (self.event.timestamp(), self.seq)
    }
}

/// Outcome of submitting an event to a capture buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Stored without displacing anything
    Accepted,
    /// Stored over the oldest unread event, or refused because the producer is gone
    Dropped,
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted)
    }
}

/// Statistics about event capture and draining
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Submissions stored without displacing an older event
    ///
    /// A submission that overwrote the oldest unread event is stored too, but
    /// it is counted in `buffer_dropped` instead. Once everything is drained,
    /// `accepted == flushed_events + lost_events`.
    pub accepted: u64,
    /// Submissions that overwrote an older event (drop-oldest), plus
    /// submissions to unknown or closed producers
    pub buffer_dropped: u64,
    /// Events discarded by the coordinator after failed appends or backlog overflow
    pub lost_events: u64,
    /// Events discarded because the buffer backlog exceeded `max_queue_size`
    pub queue_dropped_events: u64,
    /// Events successfully appended to the store
    pub flushed_events: u64,
    /// Append attempts that failed (including retried ones)
    pub flush_failures: u64,
    /// Completed flush cycles
    pub flush_cycles: u64,
    /// Events currently sitting in capture buffers
    pub pending: u64,
    /// Registered producers
    pub producers: usize,
}

impl CaptureStats {
    /// Fraction of submitted events that reached the store, as a percentage
    pub fn delivery_rate(&self) -> f64 {
        let submitted = self.accepted + self.buffer_dropped;
        if submitted == 0 {
            100.0
        } else {
            (self.flushed_events as f64 / submitted as f64) * 100.0
        }
    }
}

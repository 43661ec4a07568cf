//! Session data types

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::state::ReconstructedState;
use crate::error::{Result, ResultExt};
use crate::store::TimeRange;
use crate::types::{Event, Timestamp};

/// Playback state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Rewound to the start, not advancing
    Stopped,
    /// Holding the current position
    #[default]
    Paused,
    /// Advancing one event per tick
    Playing,
}

impl PlaybackState {
    /// Check if currently playing
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }

    /// Check if paused
    pub fn is_paused(&self) -> bool {
        matches!(self, PlaybackState::Paused)
    }

    /// Check if stopped
    pub fn is_stopped(&self) -> bool {
        matches!(self, PlaybackState::Stopped)
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            PlaybackState::Stopped => "Stopped",
            PlaybackState::Paused => "Paused",
            PlaybackState::Playing => "Playing",
        }
    }
}

/// Point-in-time view of a playback session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub session_id: String,
    pub state: PlaybackState,
    /// Number of events folded into `reconstructed_state`
    pub current_index: usize,
    pub total_events: usize,
    pub is_playing: bool,
    pub playback_speed: f64,
    /// Base interval divided by the playback speed
    pub tick_interval: Duration,
    pub reconstructed_state: ReconstructedState,
    /// Event under the cursor, next to be applied
    pub current_event: Option<Arc<Event>>,
}

impl StateSnapshot {
    /// True once the cursor sits on the last event or past it
    pub fn at_end(&self) -> bool {
        self.current_index + 1 >= self.total_events
    }
}

/// Notification pushed from a session while it runs
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackUpdate {
    /// The cursor moved forward after applying `event`
    Advanced { index: usize, event: Arc<Event> },
    /// The playback state changed
    StateChanged(PlaybackState),
    /// Playback reached the last event and paused
    Finished,
}

/// Persistable session: an event sequence plus opaque navigation maps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub events: Vec<Event>,
    /// Source artifact mapping carried alongside the events
    #[serde(default)]
    pub source_map: serde_json::Value,
    /// Node graph carried alongside the events
    #[serde(default)]
    pub node_map: serde_json::Value,
}

impl SessionRecord {
    /// Create a record with empty navigation maps
    pub fn new(id: impl Into<String>, events: Vec<Event>) -> Self {
        Self {
            id: id.into(),
            created_at: chrono::Utc::now(),
            events,
            source_map: serde_json::Value::Null,
            node_map: serde_json::Value::Null,
        }
    }

    pub fn with_source_map(mut self, source_map: serde_json::Value) -> Self {
        self.source_map = source_map;
        self
    }

    pub fn with_node_map(mut self, node_map: serde_json::Value) -> Self {
        self.node_map = node_map;
        self
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Time between the first and last event
    pub fn duration(&self) -> Duration {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => {
                let nanos = last
                    .timestamp()
                    .as_nanos()
                    .saturating_sub(first.timestamp().as_nanos());
                Duration::from_nanos(nanos.max(0) as u64)
            }
            _ => Duration::ZERO,
        }
    }

    /// Save record to a file (JSON format)
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write session record {}", path.display()))
    }

    /// Load record from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session record {}", path.display()))?;
        let mut record: Self = serde_json::from_str(&json)?;
        record.events.sort_by_key(|event| event.timestamp());
        Ok(record)
    }
}

/// Where a new session takes its events from
#[derive(Debug, Clone)]
pub enum EventSource {
    /// Every event currently in the store
    All,
    /// Store events inside an inclusive time range
    Range(TimeRange),
    /// Store events sharing a correlation id
    Correlation(String),
    /// Store events linked to a source node
    SourceNode {
        id: String,
        range: Option<TimeRange>,
    },
    /// An explicit, already ordered event list
    Events(Vec<Event>),
    /// A previously saved session record
    Record(SessionRecord),
}

impl EventSource {
    pub fn range(start: impl Into<Timestamp>, end: impl Into<Timestamp>) -> Self {
        EventSource::Range(TimeRange::new(start, end))
    }

    pub fn correlation(correlation_id: impl Into<String>) -> Self {
        EventSource::Correlation(correlation_id.into())
    }

    pub fn source_node(id: impl Into<String>, range: Option<TimeRange>) -> Self {
        EventSource::SourceNode {
            id: id.into(),
            range,
        }
    }

    /// Short label used in log output
    pub fn describe(&self) -> String {
        match self {
            EventSource::All => "all".to_string(),
            EventSource::Range(range) => format!("range {}..={}", range.start, range.end),
            EventSource::Correlation(id) => format!("correlation {id}"),
            EventSource::SourceNode { id, .. } => format!("source node {id}"),
            EventSource::Events(events) => format!("{} explicit events", events.len()),
            EventSource::Record(record) => format!("record {}", record.id),
        }
    }
}

//! Test data builders for creating test objects

use chronotrace_rs::{Event, EventKind, Timestamp};
use serde_json::json;

/// Builder for creating test Events
pub struct EventBuilder {
    timestamp: i64,
    kind: EventKind,
    correlation: Option<String>,
    source_node: Option<String>,
    payload: serde_json::Value,
}

impl EventBuilder {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            kind: EventKind::Custom("test".to_string()),
            correlation: None,
            source_node: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn correlation(mut self, correlation: &str) -> Self {
        self.correlation = Some(correlation.to_string());
        self
    }

    pub fn source_node(mut self, source_node: &str) -> Self {
        self.source_node = Some(source_node.to_string());
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Event {
        let mut event = Event::new(Timestamp(self.timestamp), self.kind).with_payload(self.payload);
        if let Some(correlation) = self.correlation {
            event = event.with_correlation(correlation);
        }
        if let Some(source_node) = self.source_node {
            event = event.with_source_node(source_node);
        }
        event
    }
}

/// `count` state changes of `x` at timestamps 0, 10, 20, ...
pub fn counter_events(count: usize) -> Vec<Event> {
    (0..count)
        .map(|i| Event::state_change(i as i64 * 10, "x", json!(i)))
        .collect()
}

/// A small call trace: main calls work, which updates `total` twice
pub fn call_trace() -> Vec<Event> {
    vec![
        Event::function_entry(100, "main"),
        EventBuilder::new(200)
            .kind(EventKind::FunctionEntry)
            .payload(json!({ "function": "work", "args": { "n": 2 } }))
            .build(),
        Event::state_change(300, "total", json!(1)),
        Event::state_change(400, "total", json!(2)),
        EventBuilder::new(500)
            .kind(EventKind::FunctionExit)
            .payload(json!({ "return": 2 }))
            .build(),
        Event::function_exit(600),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builder() {
        let event = EventBuilder::new(42)
            .kind(EventKind::MessageSend)
            .correlation("c")
            .source_node("n")
            .build();

        assert_eq!(event.timestamp(), Timestamp(42));
        assert_eq!(event.kind(), &EventKind::MessageSend);
        assert_eq!(event.correlation_id(), Some("c"));
        assert_eq!(event.source_node_id(), Some("n"));
    }
}

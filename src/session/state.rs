//! Reconstructed program state
//!
//! The playback engine's view of the traced program is a pure left fold
//! over the event slice: a call stack of frame ids and a table of variable
//! bindings. Folding is not invertible, so moving backwards replays from
//! the empty state.

use crate::types::{Event, EventKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Frame id used when an entry event names no function or source node
pub const ANONYMOUS_FRAME: &str = "<anonymous>";

/// Binding that holds the value of the most recent function return
pub const RETURN_BINDING: &str = "<return>";

/// Binding that holds the payload of the most recent sent message
pub const LAST_SENT_BINDING: &str = "<last_sent>";

/// Binding that holds the payload of the most recent received message
pub const LAST_RECEIVED_BINDING: &str = "<last_received>";

/// Call stack and variable bindings derived from applied events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedState {
    /// Frame ids, outermost first
    pub call_stack: Vec<String>,
    /// Variable name to last assigned value
    pub bindings: BTreeMap<String, serde_json::Value>,
}

impl ReconstructedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `events` in order from the empty state
    pub fn replay(events: &[Arc<Event>]) -> Self {
        let mut state = Self::new();
        for event in events {
            state.apply(event);
        }
        state
    }

    /// Apply a single event
    pub fn apply(&mut self, event: &Event) {
        let payload = event.payload();
        match event.kind() {
            EventKind::FunctionEntry => {
                let frame = payload
                    .get("function")
                    .and_then(|f| f.as_str())
                    .or(event.source_node_id())
                    .unwrap_or(ANONYMOUS_FRAME);
                self.call_stack.push(frame.to_string());

                if let Some(args) = payload.get("args").and_then(|a| a.as_object()) {
                    for (name, value) in args {
                        self.bindings.insert(name.clone(), value.clone());
                    }
                }
            }
            EventKind::FunctionExit => {
                self.call_stack.pop();
                if let Some(value) = payload.get("return") {
                    self.bindings
                        .insert(RETURN_BINDING.to_string(), value.clone());
                }
            }
            EventKind::StateChange => {
                if let Some(name) = payload.get("variable").and_then(|v| v.as_str()) {
                    let value = payload
                        .get("value")
                        .cloned()
                        .unwrap_or(serde_json::Value::Null);
                    self.bindings.insert(name.to_string(), value);
                } else if let Some(changes) = payload.as_object() {
                    for (name, value) in changes {
                        self.bindings.insert(name.clone(), value.clone());
                    }
                }
            }
            EventKind::MessageSend => {
                self.bindings
                    .insert(LAST_SENT_BINDING.to_string(), payload.clone());
            }
            EventKind::MessageReceive => {
                self.bindings
                    .insert(LAST_RECEIVED_BINDING.to_string(), payload.clone());
            }
            EventKind::Custom(_) => {}
        }
    }

    /// Innermost frame
    pub fn current_frame(&self) -> Option<&str> {
        self.call_stack.last().map(String::as_str)
    }

    pub fn depth(&self) -> usize {
        self.call_stack.len()
    }

    pub fn binding(&self, name: &str) -> Option<&serde_json::Value> {
        self.bindings.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.call_stack.is_empty() && self.bindings.is_empty()
    }
}

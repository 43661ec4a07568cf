//! Session registry
//!
//! Maps session ids to running playback engines. Starting a session
//! materializes its events from the temporal store (or from an explicit
//! list or saved record) once; later store activity does not change an
//! existing session.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::engine::{PlaybackEngine, SessionHandle, SessionMaps};
use super::types::EventSource;
use crate::config::PlaybackConfig;
use crate::error::{Result, TraceError};
use crate::store::TemporalStore;
use crate::types::Event;

/// Owner of every live playback session
pub struct SessionManager {
    store: Arc<TemporalStore>,
    config: PlaybackConfig,
    sessions: Mutex<HashMap<String, PlaybackEngine>>,
}

impl SessionManager {
    pub fn new(store: Arc<TemporalStore>, config: PlaybackConfig) -> Self {
        Self {
            store,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start a paused session at index 0
    pub fn start_session(
        &self,
        session_id: impl Into<String>,
        source: EventSource,
    ) -> Result<SessionHandle> {
        let session_id = session_id.into();
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&session_id) {
            return Err(TraceError::InvalidCommand(format!(
                "session {session_id} already exists"
            )));
        }

        tracing::debug!(
            session = %session_id,
            source = %source.describe(),
            "Materializing session"
        );
        let (events, maps) = self.materialize(source)?;
        let engine = PlaybackEngine::spawn(session_id.clone(), events, maps, &self.config)?;
        let handle = engine.handle();
        sessions.insert(session_id, engine);
        Ok(handle)
    }

    /// Stop a session and release its events
    pub fn end_session(&self, session_id: &str) -> Result<()> {
        let engine = self.sessions.lock().remove(session_id);
        match engine {
            Some(mut engine) => {
                engine.shutdown();
                Ok(())
            }
            None => Err(TraceError::SessionNotFound(session_id.to_string())),
        }
    }

    /// Handle for a live session
    pub fn get(&self, session_id: &str) -> Result<SessionHandle> {
        self.sessions
            .lock()
            .get(session_id)
            .map(PlaybackEngine::handle)
            .ok_or_else(|| TraceError::SessionNotFound(session_id.to_string()))
    }

    /// Ids of live sessions, sorted
    pub fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Stop every session
    pub fn end_all(&self) {
        let engines: Vec<PlaybackEngine> =
            self.sessions.lock().drain().map(|(_, engine)| engine).collect();
        for mut engine in engines {
            engine.shutdown();
        }
    }

    fn materialize(&self, source: EventSource) -> Result<(Vec<Arc<Event>>, SessionMaps)> {
        let events = match source {
            EventSource::All => self.store.all()?,
            EventSource::Range(range) => self.store.range(range.start, range.end)?,
            EventSource::Correlation(id) => self.store.by_correlation(&id)?,
            EventSource::SourceNode { id, range } => self.store.by_source_node(&id, range)?,
            EventSource::Events(events) => events.into_iter().map(Arc::new).collect(),
            EventSource::Record(record) => {
                let maps = SessionMaps {
                    source_map: record.source_map,
                    node_map: record.node_map,
                };
                let events = record.events.into_iter().map(Arc::new).collect();
                return Ok((events, maps));
            }
        };
        Ok((events, SessionMaps::default()))
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.end_all();
    }
}

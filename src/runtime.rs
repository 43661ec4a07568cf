//! Tracing runtime
//!
//! Wires the capture hub, drain coordinator, temporal store and session
//! manager into one object owned by the embedding application.

use std::sync::Arc;

use crate::capture::{CaptureHub, DrainCoordinator, Producer};
use crate::config::TraceConfig;
use crate::error::Result;
use crate::session::{EventSource, SessionHandle, SessionManager};
use crate::store::{EventStore, StoreStats, TemporalStore, TimeRange};
use crate::types::{CaptureStats, Event, ProducerId, SubmitOutcome, Timestamp};

/// Capture pipeline plus playback, ready to use
pub struct TraceRuntime {
    config: TraceConfig,
    hub: Arc<CaptureHub>,
    store: Arc<TemporalStore>,
    coordinator: DrainCoordinator,
    sessions: SessionManager,
}

impl TraceRuntime {
    /// Validate `config` and start the drain coordinator
    pub fn new(config: TraceConfig) -> Result<Self> {
        config.validate()?;

        let hub = Arc::new(CaptureHub::new(&config.capture));
        let store = Arc::new(TemporalStore::new(config.store.retention()));
        let coordinator = DrainCoordinator::spawn(
            hub.clone(),
            store.clone() as Arc<dyn EventStore>,
            config.capture.clone(),
            config.store.prune_interval(),
        )?;
        let sessions = SessionManager::new(store.clone(), config.playback.clone());

        tracing::info!(
            buffer_capacity = hub.buffer_capacity(),
            batch_size = hub.batch_size(),
            "Trace runtime started"
        );

        Ok(Self {
            config,
            hub,
            store,
            coordinator,
            sessions,
        })
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    // ==================== Capture ====================

    /// Register a producer with its own capture buffer
    pub fn register_producer(&self, name: impl Into<String>) -> Producer {
        self.hub.register(name)
    }

    /// Submit on behalf of a producer id; never blocks or fails
    pub fn submit(&self, producer: ProducerId, event: Event) -> SubmitOutcome {
        self.hub.submit(producer, event)
    }

    /// Events overwritten in one producer's buffer
    pub fn producer_dropped(&self, producer: ProducerId) -> Result<u64> {
        Ok(self.hub.lookup(producer)?.dropped())
    }

    /// Block until one flush cycle has run
    pub fn flush_now(&self) -> Result<()> {
        self.coordinator.flush_now()
    }

    /// Apply retention now, returning the number of evicted events
    pub fn prune_now(&self) -> Result<usize> {
        self.coordinator.prune_now()
    }

    pub fn capture_stats(&self) -> CaptureStats {
        self.coordinator.stats()
    }

    // ==================== Store ====================

    pub fn store(&self) -> &Arc<TemporalStore> {
        &self.store
    }

    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn range(
        &self,
        start: impl Into<Timestamp>,
        end: impl Into<Timestamp>,
    ) -> Result<Vec<Arc<Event>>> {
        self.store.range(start, end)
    }

    pub fn by_correlation(&self, correlation_id: &str) -> Result<Vec<Arc<Event>>> {
        self.store.by_correlation(correlation_id)
    }

    pub fn by_source_node(
        &self,
        source_node_id: &str,
        range: Option<TimeRange>,
    ) -> Result<Vec<Arc<Event>>> {
        self.store.by_source_node(source_node_id, range)
    }

    // ==================== Playback ====================

    pub fn start_session(
        &self,
        session_id: impl Into<String>,
        source: EventSource,
    ) -> Result<SessionHandle> {
        self.sessions.start_session(session_id, source)
    }

    pub fn end_session(&self, session_id: &str) -> Result<()> {
        self.sessions.end_session(session_id)
    }

    pub fn session(&self, session_id: &str) -> Result<SessionHandle> {
        self.sessions.get(session_id)
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// End all sessions, flush remaining events and stop the coordinator
    pub fn shutdown(&mut self) {
        if !self.coordinator.is_running() {
            return;
        }
        self.sessions.end_all();
        self.coordinator.shutdown();

        let stats = self.coordinator.stats();
        tracing::info!(
            accepted = stats.accepted,
            flushed = stats.flushed_events,
            dropped = stats.buffer_dropped,
            lost = stats.lost_events,
            "Trace runtime stopped"
        );
    }
}

impl Drop for TraceRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

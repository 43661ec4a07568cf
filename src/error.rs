//! Error handling for ChronoTrace
//!
//! This module defines the error taxonomy shared by the capture, storage and
//! playback layers, and a Result alias for use throughout the crate.
//!
//! Capture-path failures (`BufferOverflow`, `FlushFailure`, `LostEvents`) are
//! normally absorbed into counters and only surface through statistics. Query
//! and control-path failures are returned to the caller synchronously.

use crate::types::ProducerId;
use thiserror::Error;

/// Main error type for ChronoTrace operations
#[derive(Error, Debug)]
pub enum TraceError {
    /// A capture buffer overwrote unread events
    #[error("Buffer overflow on producer {producer}: {dropped} event(s) dropped")]
    BufferOverflow { producer: ProducerId, dropped: u64 },

    /// Appending a drained batch to the store failed
    #[error("Flush failed after {attempts} attempt(s): {message}")]
    FlushFailure { attempts: u32, message: String },

    /// Events were discarded by the drain coordinator
    #[error("{0} event(s) lost")]
    LostEvents(u64),

    /// The temporal store cannot serve the request
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A playback command was rejected without mutating session state
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Control command addressed to an unknown or ended session
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// No capture buffer is registered for this producer
    #[error("Unknown producer: {0}")]
    UnknownProducer(ProducerId),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TraceError>,
    },
}

impl TraceError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TraceError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context wrappers
    pub fn root(&self) -> &TraceError {
        match self {
            TraceError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the error was produced on the capture path and is only ever counted
    pub fn is_capture_signal(&self) -> bool {
        matches!(
            self.root(),
            TraceError::BufferOverflow { .. }
                | TraceError::FlushFailure { .. }
                | TraceError::LostEvents(_)
        )
    }
}

impl From<serde_json::Error> for TraceError {
    fn from(err: serde_json::Error) -> Self {
        TraceError::Serialization(err.to_string())
    }
}

/// Result type alias for ChronoTrace operations
pub type Result<T> = std::result::Result<T, TraceError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| TraceError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| TraceError::Io(e).with_context(f()))
    }
}

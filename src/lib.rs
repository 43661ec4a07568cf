//! # ChronoTrace-RS: Runtime Tracing and Time-Travel Playback
//!
//! Captures events from concurrent producers without blocking them, stores
//! them in one global time order, and replays any slice of that history
//! with a reconstructed view of the traced program's state.
//!
//! ## Architecture
//!
//! - **Capture**: Per-producer ring buffers that drop the oldest event on overflow
//! - **Coordinator**: A single thread that drains buffers in batches into the store
//! - **Store**: Ordered index by `(timestamp, sequence)` with correlation and
//!   source-node indexes and retention pruning
//! - **Playback**: One actor thread per session that steps, seeks and plays
//!   through a materialized event slice
//! - **Communication**: Crossbeam channels between every thread
//!
//! ## Configuration
//!
//! Settings are read from `config.toml` in the platform configuration
//! directory under `chronotrace-rs`:
//!
//! - **Linux**: `~/.config/chronotrace-rs/`
//! - **macOS**: `~/Library/Application Support/chronotrace-rs/`
//! - **Windows**: `%APPDATA%\chronotrace-rs\`
//!
//! ## Example
//!
//! ```no_run
//! use chronotrace_rs::{Event, EventSource, TraceConfig, TraceRuntime};
//!
//! fn main() -> chronotrace_rs::Result<()> {
//!     let runtime = TraceRuntime::new(TraceConfig::default())?;
//!
//!     let producer = runtime.register_producer("worker");
//!     producer.submit(Event::function_entry(1_000, "handle").with_correlation("req-1"));
//!     producer.submit(Event::function_exit(2_000).with_correlation("req-1"));
//!     runtime.flush_now()?;
//!
//!     let session = runtime.start_session("debug", EventSource::correlation("req-1"))?;
//!     let snapshot = session.step_forward()?;
//!     println!("{:?}", snapshot.reconstructed_state.call_stack);
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod runtime;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use capture::{CaptureHub, DrainCoordinator, Producer};
pub use config::TraceConfig;
pub use error::{Result, TraceError};
pub use runtime::TraceRuntime;
pub use session::{
    EventSource, PlaybackState, PlaybackUpdate, ReconstructedState, SessionHandle,
    SessionRecord, StateSnapshot,
};
pub use store::{AgeAnchor, EventStore, RetentionPolicy, TemporalStore, TimeRange};
pub use types::{CaptureStats, Event, EventKind, ProducerId, SubmitOutcome, Timestamp};

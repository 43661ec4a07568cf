//! Time-travel playback
//!
//! A session is an immutable event sequence taken from the temporal store,
//! a cursor into it, and the program state reconstructed by folding every
//! event before the cursor. Sessions can be played at an adjustable speed,
//! stepped in both directions and seeked to any position.
//!
//! # Components
//!
//! - [`ReconstructedState`] - Call stack and bindings folded from events
//! - [`SessionPlayer`] - Synchronous Stopped/Paused/Playing state machine
//! - [`PlaybackEngine`] - Actor thread that owns a player and drives ticks
//! - [`SessionHandle`] - Cloneable command interface to one session
//! - [`SessionManager`] - Registry of live sessions keyed by id
//! - [`SessionRecord`] - Saved session with its navigation maps

pub mod engine;
pub mod manager;
pub mod player;
pub mod state;
pub mod types;

pub use engine::{PlaybackEngine, SessionHandle, SessionMaps};
pub use manager::SessionManager;
pub use player::{SessionPlayer, TickOutcome};
pub use state::ReconstructedState;
pub use types::{EventSource, PlaybackState, PlaybackUpdate, SessionRecord, StateSnapshot};

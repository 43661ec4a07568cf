//! Event capture layer
//!
//! Producers write into their own fixed-capacity buffer; a single drain
//! coordinator moves batches from all buffers into the temporal store.
//!
//! # Components
//!
//! - [`CaptureBuffer`] - Per-producer ring with drop-oldest overflow
//! - [`CaptureHub`] / [`Producer`] - Buffer arena and exclusive write handles
//! - [`DrainCoordinator`] - Periodic single-writer flush into the store
//!
//! # Ordering
//!
//! Within one producer, submission order is preserved end to end. Across
//! producers the store imposes a total order by `(timestamp, insertion
//! sequence)`, which approximates but does not guarantee causal order.

pub mod buffer;
pub mod coordinator;
pub mod hub;

pub use buffer::CaptureBuffer;
pub use coordinator::DrainCoordinator;
pub use hub::{CaptureHub, Producer};

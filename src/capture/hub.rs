//! Producer registry: one capture buffer per producer, indexed by id
//!
//! The hub is the ingestion boundary. Producers write only to their own
//! buffer, so submissions from different producers never contend; the
//! only shared state touched on the hot path is a read lock on the arena
//! (when submitting by id) and a non-blocking wake signal.

use super::buffer::CaptureBuffer;
use crate::config::CaptureConfig;
use crate::error::{Result, TraceError};
use crate::types::{Event, ProducerId, SubmitOutcome};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Arena of per-producer capture buffers
#[derive(Debug)]
pub struct CaptureHub {
    /// Slot `i` holds the buffer of `ProducerId(i)`; removed producers leave `None`
    buffers: RwLock<Vec<Option<Arc<CaptureBuffer>>>>,
    next_id: AtomicU32,
    capacity: usize,
    batch_size: usize,
    /// Submissions addressed to unknown or closed producers
    orphaned: AtomicU64,
    /// Counters carried over from removed buffers
    retired_accepted: AtomicU64,
    retired_dropped: AtomicU64,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl CaptureHub {
    /// Create a hub whose buffers follow `config`
    pub fn new(config: &CaptureConfig) -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            buffers: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(0),
            capacity: config.buffer_capacity(),
            batch_size: config.batch_size.max(1),
            orphaned: AtomicU64::new(0),
            retired_accepted: AtomicU64::new(0),
            retired_dropped: AtomicU64::new(0),
            wake_tx,
            wake_rx,
        }
    }

    /// Register a producer and hand back its exclusive write handle
    pub fn register(self: &Arc<Self>, name: impl Into<String>) -> Producer {
        let id = ProducerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name = name.into();
        let buffer = Arc::new(CaptureBuffer::new(id, name.clone(), self.capacity));

        {
            let mut buffers = self.buffers.write();
            let slot = id.0 as usize;
            if buffers.len() <= slot {
                buffers.resize_with(slot + 1, || None);
            }
            buffers[slot] = Some(buffer.clone());
        }

        tracing::debug!(producer = %id, name = %name, capacity = self.capacity, "Registered producer");

        Producer {
            buffer,
            hub: self.clone(),
        }
    }

    /// Submit on behalf of `producer`
    ///
    /// Unknown or closed producers get `Dropped`; this is counted, never an error.
    pub fn submit(&self, producer: ProducerId, event: Event) -> SubmitOutcome {
        match self.buffer(producer) {
            Some(buffer) => self.submit_to(&buffer, event),
            None => self.orphan(),
        }
    }

    fn submit_to(&self, buffer: &CaptureBuffer, event: Event) -> SubmitOutcome {
        // Closed is checked under the ring lock; a retired buffer stays empty
        match buffer.try_submit(event) {
            Some((outcome, pending)) => {
                if pending >= self.batch_size {
                    self.wake();
                }
                outcome
            }
            None => self.orphan(),
        }
    }

    fn orphan(&self) -> SubmitOutcome {
        self.orphaned.fetch_add(1, Ordering::Relaxed);
        SubmitOutcome::Dropped
    }

    /// Nudge the coordinator without ever blocking
    pub(crate) fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    /// Receiver side of the early-flush signal
    pub(crate) fn wake_receiver(&self) -> Receiver<()> {
        self.wake_rx.clone()
    }

    /// Look up a producer's buffer
    pub fn buffer(&self, producer: ProducerId) -> Option<Arc<CaptureBuffer>> {
        self.buffers
            .read()
            .get(producer.0 as usize)
            .and_then(|slot| slot.clone())
    }

    /// Like [`CaptureHub::buffer`], failing with `UnknownProducer`
    pub fn lookup(&self, producer: ProducerId) -> Result<Arc<CaptureBuffer>> {
        self.buffer(producer).ok_or(TraceError::UnknownProducer(producer))
    }

    /// All live buffers in producer id order
    pub fn buffers(&self) -> Vec<Arc<CaptureBuffer>> {
        self.buffers.read().iter().flatten().cloned().collect()
    }

    /// Drop a closed, fully drained buffer from the arena
    ///
    /// Returns false, leaving the buffer in place, if it still holds events.
    pub(crate) fn remove(&self, producer: ProducerId) -> bool {
        let mut buffers = self.buffers.write();
        let Some(slot) = buffers.get_mut(producer.0 as usize) else {
            return false;
        };
        if !slot.as_ref().is_some_and(|buffer| buffer.is_retired()) {
            return false;
        }
        if let Some(buffer) = slot.take() {
            self.retired_accepted
                .fetch_add(buffer.accepted(), Ordering::Relaxed);
            self.retired_dropped
                .fetch_add(buffer.dropped(), Ordering::Relaxed);
            tracing::debug!(producer = %producer, "Removed drained producer buffer");
        }
        true
    }

    /// Number of registered producers
    pub fn producer_count(&self) -> usize {
        self.buffers.read().iter().flatten().count()
    }

    /// Events waiting in all buffers
    pub fn pending(&self) -> u64 {
        self.buffers().iter().map(|b| b.len() as u64).sum()
    }

    /// Events accepted by all buffers, including removed ones
    pub fn accepted(&self) -> u64 {
        let live: u64 = self.buffers().iter().map(|b| b.accepted()).sum();
        live + self.retired_accepted.load(Ordering::Relaxed)
    }

    /// Events overwritten in all buffers plus orphaned submissions
    pub fn dropped(&self) -> u64 {
        let live: u64 = self.buffers().iter().map(|b| b.dropped()).sum();
        live + self.retired_dropped.load(Ordering::Relaxed) + self.orphaned.load(Ordering::Relaxed)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn buffer_capacity(&self) -> usize {
        self.capacity
    }
}

/// Exclusive write handle for one producer's buffer
///
/// Dropping the handle closes the buffer; the coordinator drains what is
/// left and then releases it.
#[derive(Debug)]
pub struct Producer {
    buffer: Arc<CaptureBuffer>,
    hub: Arc<CaptureHub>,
}

impl Producer {
    pub fn id(&self) -> ProducerId {
        self.buffer.producer()
    }

    pub fn name(&self) -> &str {
        self.buffer.name()
    }

    /// Record an event; never blocks
    pub fn submit(&self, event: Event) -> SubmitOutcome {
        self.hub.submit_to(&self.buffer, event)
    }

    /// Events overwritten in this producer's buffer so far
    pub fn dropped(&self) -> u64 {
        self.buffer.dropped()
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.buffer.close();
        self.hub.wake();
    }
}

//! Fixed-capacity capture buffer for a single producer
//!
//! Each producer owns one buffer for writing; the drain coordinator is the
//! only reader. When the buffer is full the oldest unread event is
//! overwritten, so `submit` never blocks and never fails.

use crate::types::{Event, ProducerId, SubmitOutcome, Timestamp};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Circular slot array with a read head and a length
#[derive(Debug)]
struct Ring {
    slots: Vec<Option<Event>>,
    head: usize,
    len: usize,
    /// Checked by every write
    closed: bool,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            closed: false,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Write at the cursor; returns true if an unread event was overwritten
    fn push(&mut self, event: Event) -> bool {
        let idx = (self.head + self.len) % self.slots.len();
        self.slots[idx] = Some(event);

        if self.len < self.slots.len() {
            self.len += 1;
            false
        } else {
            self.head = (self.head + 1) % self.slots.len();
            true
        }
    }

    fn pop(&mut self) -> Option<Event> {
        if self.len == 0 {
            return None;
        }
        let event = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        event
    }

    fn front(&self) -> Option<&Event> {
        if self.len == 0 {
            return None;
        }
        self.slots[self.head].as_ref()
    }

    fn iter(&self) -> impl Iterator<Item = &Event> {
        (0..self.len).filter_map(move |i| {
            let idx = (self.head + i) % self.slots.len();
            self.slots[idx].as_ref()
        })
    }
}

/// Per-producer event buffer with drop-oldest overflow
#[derive(Debug)]
pub struct CaptureBuffer {
    producer: ProducerId,
    name: String,
    ring: Mutex<Ring>,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl CaptureBuffer {
    /// Create a buffer holding at most `capacity` unread events
    pub fn new(producer: ProducerId, name: impl Into<String>, capacity: usize) -> Self {
        Self {
            producer,
            name: name.into(),
            ring: Mutex::new(Ring::new(capacity)),
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn producer(&self) -> ProducerId {
        self.producer
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }

    /// Unread events currently held
    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events overwritten because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Submissions stored without displacing anything
    ///
    /// A submission that overwrote an older event is counted in
    /// [`dropped`](Self::dropped) instead, so `accepted` equals the number of
    /// events that can still leave the buffer through [`drain`](Self::drain).
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Whether the owning producer has shut down
    pub fn is_closed(&self) -> bool {
        self.ring.lock().closed
    }

    pub(crate) fn close(&self) {
        self.ring.lock().closed = true;
    }

    /// Closed and fully drained; nothing can be written to it any more
    pub(crate) fn is_retired(&self) -> bool {
        let ring = self.ring.lock();
        ring.closed && ring.len == 0
    }

    /// Store an event, overwriting the oldest unread one if full
    ///
    /// A closed buffer refuses the event and reports `Dropped`.
    pub fn submit(&self, event: Event) -> SubmitOutcome {
        self.try_submit(event)
            .map(|(outcome, _)| outcome)
            .unwrap_or(SubmitOutcome::Dropped)
    }

    /// Store an event unless the buffer is closed, returning the outcome and
    /// the pending count after the write
    pub(crate) fn try_submit(&self, event: Event) -> Option<(SubmitOutcome, usize)> {
        let mut ring = self.ring.lock();
        if ring.closed {
            return None;
        }
        // Counters move under the lock so a retired buffer's totals are final
        if ring.push(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            Some((SubmitOutcome::Dropped, ring.len))
        } else {
            self.accepted.fetch_add(1, Ordering::Relaxed);
            Some((SubmitOutcome::Accepted, ring.len))
        }
    }

    /// Timestamp of the oldest unread event
    pub fn oldest_timestamp(&self) -> Option<Timestamp> {
        self.ring.lock().front().map(Event::timestamp)
    }

    /// Remove up to `batch_size` events in insertion order
    pub fn drain(&self, batch_size: usize) -> Vec<Event> {
        let mut ring = self.ring.lock();
        let count = batch_size.min(ring.len);
        let mut batch = Vec::with_capacity(count);
        for _ in 0..count {
            if let Some(event) = ring.pop() {
                batch.push(event);
            }
        }
        batch
    }

    /// Copy of the unread events, oldest first
    pub fn snapshot(&self) -> Vec<Event> {
        self.ring.lock().iter().cloned().collect()
    }
}

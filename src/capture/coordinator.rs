//! Drain/flush coordinator
//!
//! This module contains the single writer of the temporal store. It runs
//! in its own thread and moves batches out of the per-producer capture
//! buffers into the store.
//!
//! # Responsibilities
//!
//! - **Draining**: every `flush_interval`, or as soon as a buffer reaches
//!   `batch_size` pending events, drain up to `batch_size` events per buffer
//! - **Sequencing**: stamp each drained event with a monotonically increasing
//!   insertion sequence used to break timestamp ties
//! - **Backpressure**: bound the events still waiting in buffers after a
//!   cycle by `max_queue_size`, dropping the oldest undrained batches beyond it
//! - **Retries**: retry a failed append with exponential backoff, then drop
//!   the batch and count it as lost
//! - **Retention**: periodically prune the store
//!
//! Nothing here ever blocks a producer or propagates an error back to one.

use super::buffer::CaptureBuffer;
use super::hub::CaptureHub;
use crate::config::CaptureConfig;
use crate::error::{Result, TraceError};
use crate::store::EventStore;
use crate::types::{CaptureStats, ProducerId, SequencedEvent, Timestamp};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Upper bound on flush cycles run during shutdown
const MAX_FINAL_FLUSH_CYCLES: usize = 1024;

/// Commands sent to the coordinator thread
#[derive(Debug)]
enum CoordinatorCommand {
    /// Run one flush cycle now and acknowledge
    FlushNow(Sender<()>),
    /// Prune the store now and acknowledge with the evicted count
    PruneNow(Sender<usize>),
    /// Flush what is left and stop
    Shutdown,
}

#[derive(Debug, Default)]
struct Counters {
    lost_events: AtomicU64,
    queue_dropped_events: AtomicU64,
    flushed_events: AtomicU64,
    flush_failures: AtomicU64,
    flush_cycles: AtomicU64,
}

/// Handle to the running coordinator thread
pub struct DrainCoordinator {
    command_tx: Sender<CoordinatorCommand>,
    handle: Option<JoinHandle<()>>,
    hub: Arc<CaptureHub>,
    counters: Arc<Counters>,
}

impl DrainCoordinator {
    /// Spawn the coordinator thread
    pub fn spawn(
        hub: Arc<CaptureHub>,
        store: Arc<dyn EventStore>,
        config: CaptureConfig,
        prune_interval: Duration,
    ) -> Result<Self> {
        let (command_tx, command_rx) = bounded(16);
        let counters = Arc::new(Counters::default());

        let worker = DrainWorker {
            hub: hub.clone(),
            store,
            config,
            counters: counters.clone(),
            next_seq: 0,
            reported_drops: HashMap::new(),
        };

        let handle = std::thread::Builder::new()
            .name("chronotrace-drain".to_string())
            .spawn(move || worker.run(command_rx, prune_interval))?;

        Ok(Self {
            command_tx,
            handle: Some(handle),
            hub,
            counters,
        })
    }

    /// Run a flush cycle synchronously
    pub fn flush_now(&self) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        self.command_tx
            .send(CoordinatorCommand::FlushNow(ack_tx))
            .map_err(|_| TraceError::Channel("drain coordinator has stopped".to_string()))?;
        ack_rx
            .recv()
            .map_err(|_| TraceError::Channel("drain coordinator has stopped".to_string()))
    }

    /// Prune the store synchronously, returning the evicted count
    pub fn prune_now(&self) -> Result<usize> {
        let (ack_tx, ack_rx) = bounded(1);
        self.command_tx
            .send(CoordinatorCommand::PruneNow(ack_tx))
            .map_err(|_| TraceError::Channel("drain coordinator has stopped".to_string()))?;
        ack_rx
            .recv()
            .map_err(|_| TraceError::Channel("drain coordinator has stopped".to_string()))
    }

    /// Snapshot of capture and flush counters
    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            accepted: self.hub.accepted(),
            buffer_dropped: self.hub.dropped(),
            lost_events: self.counters.lost_events.load(Ordering::Relaxed),
            queue_dropped_events: self.counters.queue_dropped_events.load(Ordering::Relaxed),
            flushed_events: self.counters.flushed_events.load(Ordering::Relaxed),
            flush_failures: self.counters.flush_failures.load(Ordering::Relaxed),
            flush_cycles: self.counters.flush_cycles.load(Ordering::Relaxed),
            pending: self.hub.pending(),
            producers: self.hub.producer_count(),
        }
    }

    /// Flush remaining events and stop the thread
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.command_tx.send(CoordinatorCommand::Shutdown);
        if handle.join().is_err() {
            tracing::error!("Drain coordinator thread panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for DrainCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the coordinator thread
struct DrainWorker {
    hub: Arc<CaptureHub>,
    store: Arc<dyn EventStore>,
    config: CaptureConfig,
    counters: Arc<Counters>,
    next_seq: u64,
    /// Per-producer drop count already logged
    reported_drops: HashMap<ProducerId, u64>,
}

impl DrainWorker {
    fn run(mut self, command_rx: Receiver<CoordinatorCommand>, prune_interval: Duration) {
        tracing::info!(
            flush_interval_ms = self.config.flush_interval_ms,
            batch_size = self.config.batch_size,
            "Drain coordinator started"
        );

        let flush_ticker = tick(self.config.flush_interval());
        let prune_ticker = tick(prune_interval);
        let wake_rx = self.hub.wake_receiver();

        loop {
            select! {
                recv(command_rx) -> cmd => match cmd {
                    Ok(CoordinatorCommand::FlushNow(ack)) => {
                        self.flush_cycle();
                        let _ = ack.send(());
                    }
                    Ok(CoordinatorCommand::PruneNow(ack)) => {
                        let _ = ack.send(self.prune());
                    }
                    Ok(CoordinatorCommand::Shutdown) | Err(_) => break,
                },
                recv(flush_ticker) -> _ => self.flush_cycle(),
                recv(wake_rx) -> _ => self.flush_cycle(),
                recv(prune_ticker) -> _ => {
                    self.prune();
                }
            }
        }

        self.final_flush();
        tracing::info!(
            flushed = self.counters.flushed_events.load(Ordering::Relaxed),
            lost = self.counters.lost_events.load(Ordering::Relaxed),
            "Drain coordinator stopped"
        );
    }

    /// Drain every buffer once, appending each batch as it is drained
    fn flush_cycle(&mut self) {
        let batch_size = self.config.batch_size.max(1);
        let mut backlog = false;

        let buffers = self.hub.buffers();
        self.report_drops(&buffers);

        for buffer in &buffers {
            let drained = buffer.drain(batch_size);
            if !drained.is_empty() {
                let batch: Vec<SequencedEvent> = drained
                    .into_iter()
                    .map(|event| {
                        let seq = self.next_seq;
                        self.next_seq += 1;
                        SequencedEvent::new(seq, Arc::new(event))
                    })
                    .collect();
                self.append_with_retry(&batch);
            }

            if buffer.is_retired() && self.hub.remove(buffer.producer()) {
                self.reported_drops.remove(&buffer.producer());
            } else if buffer.len() >= batch_size {
                backlog = true;
            }
        }

        self.shed_backlog(&buffers);
        self.counters.flush_cycles.fetch_add(1, Ordering::Relaxed);

        if backlog {
            self.hub.wake();
        }
    }

    /// Drop the oldest undrained batches while the backlog exceeds the bound
    fn shed_backlog(&self, buffers: &[Arc<CaptureBuffer>]) {
        let limit = self.config.max_queue_size as u64;
        let mut backlog: u64 = buffers.iter().map(|b| b.len() as u64).sum();
        let mut shed = 0u64;

        while backlog > limit {
            let oldest = buffers
                .iter()
                .filter_map(|b| b.oldest_timestamp().map(|ts| (ts, b)))
                .min_by_key(|(ts, _)| *ts);
            let Some((_, buffer)) = oldest else {
                break;
            };
            let dropped = buffer.drain(self.config.batch_size.max(1)).len() as u64;
            if dropped == 0 {
                break;
            }
            backlog = backlog.saturating_sub(dropped);
            shed += dropped;
        }

        if shed > 0 {
            self.counters
                .queue_dropped_events
                .fetch_add(shed, Ordering::Relaxed);
            self.counters.lost_events.fetch_add(shed, Ordering::Relaxed);
            let lost = TraceError::LostEvents(shed);
            tracing::warn!(
                max_queue_size = self.config.max_queue_size,
                error = %lost,
                "Capture backlog over limit, dropped oldest batches"
            );
        }
    }

    fn append_with_retry(&self, batch: &[SequencedEvent]) {
        let attempts = self.config.flush_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.store.append_batch(batch) {
                Ok(()) => {
                    self.counters
                        .flushed_events
                        .fetch_add(batch.len() as u64, Ordering::Relaxed);
                    if attempt > 1 {
                        tracing::debug!(attempt, "Append succeeded after retry");
                    }
                    return;
                }
                Err(e) => {
                    self.counters.flush_failures.fetch_add(1, Ordering::Relaxed);
                    last_error = e.to_string();
                    if attempt < attempts {
                        std::thread::sleep(self.config.retry_backoff(attempt));
                    }
                }
            }
        }

        self.counters
            .lost_events
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        let failure = TraceError::FlushFailure {
            attempts,
            message: last_error,
        };
        tracing::warn!(lost = batch.len(), error = %failure, "Dropping batch");
    }

    fn prune(&self) -> usize {
        match self.store.prune(Timestamp::now()) {
            Ok(evicted) => {
                if evicted > 0 {
                    tracing::debug!(evicted, "Retention prune");
                }
                evicted
            }
            Err(e) => {
                tracing::warn!(error = %e, "Retention prune failed");
                0
            }
        }
    }

    /// Log overflow since the previous cycle, once per cycle
    fn report_drops(&mut self, buffers: &[Arc<CaptureBuffer>]) {
        let mut new_drops = 0;
        for buffer in buffers {
            let total = buffer.dropped();
            let reported = self.reported_drops.entry(buffer.producer()).or_insert(0);
            if total > *reported {
                let overflow = TraceError::BufferOverflow {
                    producer: buffer.producer(),
                    dropped: total - *reported,
                };
                tracing::debug!(name = %buffer.name(), error = %overflow, "Producer overflow");
                new_drops += total - *reported;
                *reported = total;
            }
        }
        if new_drops > 0 {
            tracing::warn!(
                dropped = new_drops,
                total = self.hub.dropped(),
                "Capture buffers overflowed"
            );
        }
    }

    fn final_flush(&mut self) {
        for _ in 0..MAX_FINAL_FLUSH_CYCLES {
            if self.hub.pending() == 0 {
                break;
            }
            self.flush_cycle();
        }
    }
}

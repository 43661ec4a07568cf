//! In-memory temporal index
//!
//! Events are keyed by `(timestamp, seq)` in a B-tree, so every insert is an
//! ordered merge and range scans come out sorted without a post-hoc sort.
//! Secondary indexes map correlation and source-node ids to sets of the same
//! keys, which keeps filtered queries consistent with the global order.

use super::{EventStore, RetentionPolicy, TimeRange};
use crate::error::{Result, TraceError};
use crate::types::{Event, SequencedEvent, Timestamp};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Key = (Timestamp, u64);

#[derive(Debug, Default)]
struct StoreInner {
    by_time: BTreeMap<Key, Arc<Event>>,
    by_correlation: HashMap<String, BTreeSet<Key>>,
    by_source_node: HashMap<String, BTreeSet<Key>>,
    evicted: u64,
    last_seq: Option<u64>,
}

impl StoreInner {
    fn insert(&mut self, key: Key, event: Arc<Event>) {
        if let Some(id) = event.correlation_id() {
            self.by_correlation
                .entry(id.to_string())
                .or_default()
                .insert(key);
        }
        if let Some(id) = event.source_node_id() {
            self.by_source_node
                .entry(id.to_string())
                .or_default()
                .insert(key);
        }
        self.by_time.insert(key, event);
        self.last_seq = Some(self.last_seq.map_or(key.1, |seq| seq.max(key.1)));
    }

    fn remove(&mut self, key: &Key) -> bool {
        let Some(event) = self.by_time.remove(key) else {
            return false;
        };
        if let Some(id) = event.correlation_id() {
            unindex(&mut self.by_correlation, id, key);
        }
        if let Some(id) = event.source_node_id() {
            unindex(&mut self.by_source_node, id, key);
        }
        self.evicted += 1;
        true
    }

    fn collect<'a>(&self, keys: impl Iterator<Item = &'a Key>) -> Vec<Arc<Event>> {
        keys.filter_map(|key| self.by_time.get(key).cloned()).collect()
    }
}

fn unindex(index: &mut HashMap<String, BTreeSet<Key>>, id: &str, key: &Key) {
    if let Some(keys) = index.get_mut(id) {
        keys.remove(key);
        if keys.is_empty() {
            index.remove(id);
        }
    }
}

fn key_range(range: TimeRange) -> std::ops::RangeInclusive<Key> {
    (range.start, 0)..=(range.end, u64::MAX)
}

/// Summary of the store contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Events currently stored
    pub len: usize,
    /// Events evicted by pruning over the store's lifetime
    pub evicted: u64,
    /// Oldest stored timestamp
    pub oldest: Option<Timestamp>,
    /// Newest stored timestamp
    pub newest: Option<Timestamp>,
    /// Distinct correlation ids indexed
    pub correlations: usize,
    /// Distinct source node ids indexed
    pub source_nodes: usize,
    /// Highest insertion sequence seen
    pub last_seq: Option<u64>,
}

/// Ordered, queryable event index shared read-many / write-one
#[derive(Debug)]
pub struct TemporalStore {
    inner: RwLock<StoreInner>,
    retention: RetentionPolicy,
    closed: AtomicBool,
}

impl Default for TemporalStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::unlimited())
    }
}

impl TemporalStore {
    /// Create an empty store with the given retention policy
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            retention,
            closed: AtomicBool::new(false),
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(TraceError::StoreUnavailable("store is closed".to_string()))
        } else {
            Ok(())
        }
    }

    /// Insert one event at its place in the global order
    pub fn append(&self, event: Arc<Event>, seq: u64) -> Result<()> {
        self.ensure_open()?;
        let key = (event.timestamp(), seq);
        let mut inner = self.inner.write();
        if inner.by_time.contains_key(&key) {
            return Err(TraceError::InvalidCommand(format!(
                "duplicate insertion sequence {}",
                seq
            )));
        }
        inner.insert(key, event);
        Ok(())
    }

    /// All events with `start <= timestamp <= end`, ascending
    pub fn range(
        &self,
        start: impl Into<Timestamp>,
        end: impl Into<Timestamp>,
    ) -> Result<Vec<Arc<Event>>> {
        self.ensure_open()?;
        let range = TimeRange::new(start, end);
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.inner.read();
        Ok(inner
            .by_time
            .range(key_range(range))
            .map(|(_, event)| event.clone())
            .collect())
    }

    /// Every stored event, ascending
    pub fn all(&self) -> Result<Vec<Arc<Event>>> {
        self.range(Timestamp::MIN, Timestamp::MAX)
    }

    /// Events sharing a correlation id, ascending
    pub fn by_correlation(&self, correlation_id: &str) -> Result<Vec<Arc<Event>>> {
        self.ensure_open()?;
        let inner = self.inner.read();
        Ok(inner
            .by_correlation
            .get(correlation_id)
            .map(|keys| inner.collect(keys.iter()))
            .unwrap_or_default())
    }

    /// Events linked to a source node, optionally limited to a time range
    pub fn by_source_node(
        &self,
        source_node_id: &str,
        range: Option<TimeRange>,
    ) -> Result<Vec<Arc<Event>>> {
        self.ensure_open()?;
        let range = range.unwrap_or_default();
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.inner.read();
        Ok(inner
            .by_source_node
            .get(source_node_id)
            .map(|keys| inner.collect(keys.range(key_range(range))))
            .unwrap_or_default())
    }

    /// Apply the retention policy, oldest first
    ///
    /// `now` is only consulted when ages are anchored to the wall clock.
    pub fn prune_at(&self, now: Timestamp) -> Result<usize> {
        self.ensure_open()?;
        let mut inner = self.inner.write();
        let mut doomed: Vec<Key> = Vec::new();

        let newest = inner.by_time.keys().next_back().map(|(ts, _)| *ts);
        if let Some(cutoff) = self.retention.age_cutoff(now, newest) {
            doomed.extend(inner.by_time.range(..(cutoff, 0)).map(|(key, _)| *key));
        }

        let excess = self
            .retention
            .excess(inner.by_time.len() - doomed.len());
        if excess > 0 {
            let skip = doomed.len();
            let extra: Vec<Key> = inner
                .by_time
                .keys()
                .skip(skip)
                .take(excess)
                .copied()
                .collect();
            doomed.extend(extra);
        }

        let removed = doomed.iter().filter(|key| inner.remove(key)).count();
        if removed > 0 {
            tracing::debug!(removed, remaining = inner.by_time.len(), "Pruned temporal store");
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        StoreStats {
            len: inner.by_time.len(),
            evicted: inner.evicted,
            oldest: inner.by_time.keys().next().map(|(ts, _)| *ts),
            newest: inner.by_time.keys().next_back().map(|(ts, _)| *ts),
            correlations: inner.by_correlation.len(),
            source_nodes: inner.by_source_node.len(),
            last_seq: inner.last_seq,
        }
    }

    /// Remove every event
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let evicted = inner.evicted + inner.by_time.len() as u64;
        let last_seq = inner.last_seq;
        *inner = StoreInner {
            evicted,
            last_seq,
            ..Default::default()
        };
    }

    /// Refuse all further appends and queries
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        tracing::info!("Temporal store closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl EventStore for TemporalStore {
    fn append_batch(&self, batch: &[SequencedEvent]) -> Result<()> {
        self.ensure_open()?;
        let mut inner = self.inner.write();
        if let Some(dup) = batch.iter().find(|e| inner.by_time.contains_key(&e.key())) {
            return Err(TraceError::InvalidCommand(format!(
                "duplicate insertion sequence {}",
                dup.seq
            )));
        }
        for sequenced in batch {
            inner.insert(sequenced.key(), sequenced.event.clone());
        }
        Ok(())
    }

    fn prune(&self, now: Timestamp) -> Result<usize> {
        self.prune_at(now)
    }
}

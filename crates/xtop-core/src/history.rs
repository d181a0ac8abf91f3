//! Bounded in-memory history of (snapshot, rates) pairs.
//!
//! The ticker is the sole writer. Entries are immutable once pushed and are
//! handed out behind `Arc`, so readers can hold them across ticks without
//! blocking eviction.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::model::Snapshot;
use crate::rates::RateSnapshot;

/// One tick's worth of data.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub snapshot: Snapshot,
    pub rates: RateSnapshot,
}

/// Fixed-capacity insertion-ordered ring of history entries.
#[derive(Debug)]
pub struct HistoryRing {
    entries: VecDeque<Arc<HistoryEntry>>,
    capacity: usize,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry, evicting the oldest when full. O(1).
    pub fn push(&mut self, entry: HistoryEntry) -> Arc<HistoryEntry> {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let entry = Arc::new(entry);
        self.entries.push_back(Arc::clone(&entry));
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indexed read; index 0 is the oldest entry.
    pub fn get(&self, i: usize) -> Option<&Arc<HistoryEntry>> {
        self.entries.get(i)
    }

    pub fn latest(&self) -> Option<&Arc<HistoryEntry>> {
        self.entries.back()
    }

    /// Rates at index `i` (0 = oldest).
    pub fn get_rate(&self, i: usize) -> Option<&RateSnapshot> {
        self.entries.get(i).map(|e| &e.rates)
    }

    /// Oldest-to-newest iteration.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<HistoryEntry>> {
        self.entries.iter()
    }

    /// The last `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &Arc<HistoryEntry>> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts_ms: i64) -> HistoryEntry {
        HistoryEntry {
            snapshot: Snapshot {
                timestamp_ms: ts_ms,
                ..Default::default()
            },
            rates: RateSnapshot {
                timestamp_ms: ts_ms,
                ..Default::default()
            },
        }
    }

    #[test]
    fn push_and_indexed_read() {
        let mut ring = HistoryRing::new(3);
        for ts in [1, 2, 3] {
            ring.push(entry(ts));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.get(0).unwrap().snapshot.timestamp_ms, 1);
        assert_eq!(ring.latest().unwrap().snapshot.timestamp_ms, 3);
        assert_eq!(ring.get_rate(1).unwrap().timestamp_ms, 2);
    }

    #[test]
    fn eviction_keeps_newest() {
        let mut ring = HistoryRing::new(2);
        for ts in [1, 2, 3, 4] {
            ring.push(entry(ts));
        }
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.get(0).unwrap().snapshot.timestamp_ms, 3);
        assert_eq!(ring.latest().unwrap().snapshot.timestamp_ms, 4);
    }

    #[test]
    fn entries_survive_eviction_for_holders() {
        let mut ring = HistoryRing::new(1);
        let held = ring.push(entry(1));
        ring.push(entry(2));
        // The evicted entry is still readable through the held Arc.
        assert_eq!(held.snapshot.timestamp_ms, 1);
    }

    #[test]
    fn tail_returns_last_n() {
        let mut ring = HistoryRing::new(10);
        for ts in 0..5 {
            ring.push(entry(ts));
        }
        let tail: Vec<i64> = ring.tail(2).map(|e| e.snapshot.timestamp_ms).collect();
        assert_eq!(tail, vec![3, 4]);
    }
}

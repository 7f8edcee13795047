//! Read-timestamp cache.
//!
//! Records, per key span, the highest timestamp at which a read has been
//! served. Before a write is submitted, the range consults the cache and
//! forwards the write's timestamp past any conflicting read, which is what
//! keeps a write from ever committing at or before a timestamp at which an
//! overlapping read already observed the prior value.
//!
//! The cache is bounded by its high-water mark: clearing it (on leadership
//! change) drops every entry and raises the floor returned for all
//! subsequent queries, so dropped entries can never weaken the invariant.
//!
//! Not internally synchronized; callers serialize access through the range
//! lock.

use olivine_types::{KeySpan, Timestamp};

#[derive(Debug, Clone)]
struct Entry {
    span: KeySpan,
    timestamp: Timestamp,
}

/// Highest read timestamps per key span, floored at a high-water mark.
#[derive(Debug)]
pub struct TimestampCache {
    entries: Vec<Entry>,
    low_water: Timestamp,
}

impl TimestampCache {
    /// Creates a cache whose queries never return less than `low_water`.
    pub fn new(low_water: Timestamp) -> Self {
        Self {
            entries: Vec::new(),
            low_water,
        }
    }

    /// Records a read over `span` at `timestamp`.
    ///
    /// Entries at or below the high-water mark carry no information and are
    /// not stored. A new entry absorbs any existing entry whose span it
    /// covers at an equal or later timestamp.
    pub fn add(&mut self, span: KeySpan, timestamp: Timestamp) {
        if timestamp <= self.low_water {
            return;
        }
        self.entries
            .retain(|entry| !(span.contains_span(&entry.span) && entry.timestamp <= timestamp));
        self.entries.push(Entry { span, timestamp });
    }

    /// Returns the maximum read timestamp overlapping `span`.
    ///
    /// Conservative: any partial overlap counts. Returns the high-water
    /// mark when nothing overlaps.
    pub fn get_max(&self, span: &KeySpan) -> Timestamp {
        self.entries
            .iter()
            .filter(|entry| entry.span.overlaps(span))
            .map(|entry| entry.timestamp)
            .max()
            .map_or(self.low_water, |max| max.max(self.low_water))
    }

    /// Drops every entry and raises the high-water mark to `low_water`.
    ///
    /// Invoked when this replica gains leadership: reads served by prior
    /// leaders are summarized by the new floor rather than tracked
    /// individually.
    pub fn clear(&mut self, low_water: Timestamp) {
        self.entries.clear();
        self.low_water = low_water;
    }

    /// Number of tracked spans.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no spans are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Pending read/write queue.
//!
//! Writes announce themselves here for the duration of their trip through
//! consensus; reads over an overlapping span must wait until those writes
//! drain before touching the engine, otherwise a read could observe state
//! missing a write that was already ordered ahead of it.
//!
//! Not internally synchronized; callers serialize access through the range
//! lock. Overlap detection is a linear scan over pending writes, which is
//! fine at the pending-set sizes a single range sees.

use std::collections::HashMap;
use std::sync::Arc;

use olivine_types::KeySpan;

use crate::sync::Latch;

/// Opaque handle for a pending write, returned by [`ReadQueue::add_write`]
/// and consumed by [`ReadQueue::remove_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriteHandle(u64);

#[derive(Debug)]
struct WriteEntry {
    span: KeySpan,
    /// Latches of reads waiting on this write.
    waiters: Vec<Arc<Latch>>,
}

/// Tracks in-flight writes and the reads queued behind them.
#[derive(Debug, Default)]
pub struct ReadQueue {
    writes: HashMap<u64, WriteEntry>,
    next_id: u64,
}

impl ReadQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending read over `span`.
    ///
    /// For every pending write overlapping `span`, one count is added to
    /// `latch` and the latch is registered with the write entry. With no
    /// overlapping writes the latch is left at zero and passes immediately.
    /// The caller must wait on the latch only after releasing the lock
    /// serializing this queue.
    pub fn add_read(&mut self, span: &KeySpan, latch: &Arc<Latch>) {
        for entry in self.writes.values_mut() {
            if entry.span.overlaps(span) {
                latch.add(1);
                entry.waiters.push(Arc::clone(latch));
            }
        }
    }

    /// Registers a pending write over `span`, visible to all subsequent
    /// reads until removed.
    pub fn add_write(&mut self, span: KeySpan) -> WriteHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.writes.insert(
            id,
            WriteEntry {
                span,
                waiters: Vec::new(),
            },
        );
        WriteHandle(id)
    }

    /// Removes a pending write, counting down every read latch that was
    /// waiting on it. Removing an already-removed handle is a no-op.
    pub fn remove_write(&mut self, handle: WriteHandle) {
        if let Some(entry) = self.writes.remove(&handle.0) {
            for latch in entry.waiters {
                latch.count_down();
            }
        }
    }

    /// Number of pending writes.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Returns true if no writes are pending.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use olivine_types::Key;

    use super::*;

    fn span(start: &'static str, end: &'static str) -> KeySpan {
        KeySpan::new(Key::from(start), Key::from(end))
    }

    #[test]
    fn read_with_no_pending_writes_passes_immediately() {
        let mut queue = ReadQueue::new();
        let latch = Arc::new(Latch::new());
        queue.add_read(&span("a", "z"), &latch);
        latch.wait();
    }

    #[test]
    fn read_waits_for_each_overlapping_write() {
        let mut queue = ReadQueue::new();
        let w1 = queue.add_write(span("a", "c"));
        let w2 = queue.add_write(span("b", "d"));
        let w3 = queue.add_write(span("x", "z"));

        let latch = Arc::new(Latch::new());
        queue.add_read(&span("b", "c"), &latch);
        assert_eq!(latch.count(), 2);

        queue.remove_write(w1);
        assert_eq!(latch.count(), 1);
        queue.remove_write(w2);
        assert_eq!(latch.count(), 0);
        latch.wait();

        queue.remove_write(w3);
        assert!(queue.is_empty());
    }

    #[test]
    fn non_overlapping_write_does_not_block_read() {
        let mut queue = ReadQueue::new();
        let _w = queue.add_write(span("x", "z"));
        let latch = Arc::new(Latch::new());
        queue.add_read(&span("a", "b"), &latch);
        latch.wait();
    }

    #[test]
    fn removed_write_no_longer_blocks_new_reads() {
        let mut queue = ReadQueue::new();
        let w = queue.add_write(span("a", "z"));
        queue.remove_write(w);

        let latch = Arc::new(Latch::new());
        queue.add_read(&span("a", "z"), &latch);
        latch.wait();
    }

    #[test]
    fn remove_write_is_idempotent() {
        let mut queue = ReadQueue::new();
        let w = queue.add_write(span("a", "b"));
        let latch = Arc::new(Latch::new());
        queue.add_read(&span("a", "b"), &latch);
        queue.remove_write(w);
        queue.remove_write(w);
        assert_eq!(latch.count(), 0);
    }

    #[test]
    fn point_write_blocks_point_read_on_same_key() {
        let mut queue = ReadQueue::new();
        let w = queue.add_write(KeySpan::point(Key::from("k")));

        let same = Arc::new(Latch::new());
        queue.add_read(&KeySpan::point(Key::from("k")), &same);
        assert_eq!(same.count(), 1);

        let other = Arc::new(Latch::new());
        queue.add_read(&KeySpan::point(Key::from("l")), &other);
        assert_eq!(other.count(), 0);

        queue.remove_write(w);
        same.wait();
    }

    #[test]
    fn one_latch_can_wait_on_writes_from_multiple_reads() {
        let mut queue = ReadQueue::new();
        let w1 = queue.add_write(span("a", "b"));
        let w2 = queue.add_write(span("c", "d"));

        let latch = Arc::new(Latch::new());
        queue.add_read(&span("a", "b"), &latch);
        queue.add_read(&span("c", "d"), &latch);
        assert_eq!(latch.count(), 2);

        queue.remove_write(w1);
        queue.remove_write(w2);
        assert_eq!(latch.count(), 0);
    }
}

//! Countdown latch for sequencing reads behind pending writes.
//!
//! A read registering with the read queue receives one count per
//! overlapping pending write; each write counts the latch down once when it
//! completes. The reader blocks on [`Latch::wait`] without holding the
//! range lock.

use std::sync::{Condvar, Mutex, PoisonError};

/// A one-shot countdown latch.
///
/// Counts may only be added before the owning thread calls [`wait`];
/// the read queue does so while the caller still holds the range lock, so
/// a waiter can never miss a count.
///
/// [`wait`]: Latch::wait
#[derive(Debug, Default)]
pub struct Latch {
    count: Mutex<usize>,
    zero: Condvar,
}

impl Latch {
    /// Creates a latch with a count of zero; `wait` returns immediately
    /// until counts are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` to the count.
    pub fn add(&self, n: usize) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count += n;
    }

    /// Counts down once, waking waiters when the count reaches zero.
    pub fn count_down(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    /// Blocks until the count reaches zero. Returns immediately if it
    /// already is.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .zero
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// The current count; test observability only.
    #[cfg(test)]
    pub(crate) fn count(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn wait_on_zero_returns_immediately() {
        let latch = Latch::new();
        latch.wait();
    }

    #[test]
    fn wait_blocks_until_counted_down() {
        let latch = Arc::new(Latch::new());
        latch.add(2);

        let waiter = {
            let latch = Arc::clone(&latch);
            thread::spawn(move || latch.wait())
        };

        // The waiter should still be parked with counts outstanding.
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        latch.count_down();
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        latch.count_down();
        waiter.join().unwrap();
        assert_eq!(latch.count(), 0);
    }

    #[test]
    fn count_down_below_zero_saturates() {
        let latch = Latch::new();
        latch.count_down();
        latch.wait();
        assert_eq!(latch.count(), 0);
    }
}

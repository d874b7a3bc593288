//! Counted capacity for live threads and tracked handle records.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub(crate) struct SlotCounter {
    in_use: AtomicUsize,
}

impl SlotCounter {
    pub(crate) fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Take one slot, or `None` if `limit` slots are already held.
    pub(crate) fn try_acquire(self: &Arc<Self>, limit: Option<usize>) -> Option<Slot> {
        let mut current = self.in_use.load(Ordering::Acquire);
        loop {
            if limit.is_some_and(|limit| current >= limit) {
                return None;
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(Slot {
                        counter: Arc::clone(self),
                    });
                }
                Err(actual) => current = actual,
            }
        }
    }
}

/// Releases its slot on drop.
#[derive(Debug)]
pub(crate) struct Slot {
    counter: Arc<SlotCounter>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.counter.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

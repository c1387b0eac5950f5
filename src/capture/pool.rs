//! Lock-free frame-buffer pool shared by every consumer of one camera

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use crossbeam::utils::CachePadded;

/// Fixed number of frame slots, like a camera driver's `fb_count`.
///
/// Checking out more slots than the pool holds is rejected, never queued.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    /// Indices of the slots nobody holds
    free: ArrayQueue<usize>,
    capacity: usize,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    checkouts: AtomicUsize,
    releases: AtomicUsize,
    rejected: AtomicUsize,
}

/// A checked-out slot. Dropping it puts the slot back.
pub struct PoolSlot {
    index: usize,
    pool: Arc<PoolInner>,
}

impl FramePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let free = ArrayQueue::new(capacity);
        for index in 0..capacity {
            let _ = free.push(index);
        }

        Self {
            inner: Arc::new(PoolInner {
                free,
                capacity,
                stats: CachePadded::new(Stats::default()),
            }),
        }
    }

    /// Take a free slot, or `None` when every slot is in flight.
    pub fn checkout(&self) -> Option<PoolSlot> {
        match self.inner.free.pop() {
            Some(index) => {
                self.inner.stats.checkouts.fetch_add(1, Ordering::Relaxed);
                Some(PoolSlot {
                    index,
                    pool: Arc::clone(&self.inner),
                })
            }
            None => {
                self.inner.stats.rejected.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots currently held by someone.
    pub fn outstanding(&self) -> usize {
        self.inner.capacity - self.inner.free.len()
    }

    /// (checkouts, releases, rejected)
    pub fn stats(&self) -> (usize, usize, usize) {
        let stats = &self.inner.stats;
        (
            stats.checkouts.load(Ordering::Relaxed),
            stats.releases.load(Ordering::Relaxed),
            stats.rejected.load(Ordering::Relaxed),
        )
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePool")
            .field("capacity", &self.inner.capacity)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl PoolSlot {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for PoolSlot {
    fn drop(&mut self) {
        // Cannot overflow: only indices that were popped come back.
        let _ = self.pool.free.push(self.index);
        self.pool.stats.releases.fetch_add(1, Ordering::Relaxed);
    }
}

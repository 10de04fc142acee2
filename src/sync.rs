//! Locking primitives selectable at configuration time.
//!
//! Two back-ends implement the same [`Lock`] trait: a classical mutex and a
//! queue-based (MCS) lock. Both take a `lane` index identifying the calling
//! worker; the classical back-end ignores it, the queue-based back-end uses
//! it to locate the caller's queue node. Every `acquire` must be paired with
//! a `release` on the same lane before the lane acquires again.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A lock abstraction generic over back-end, addressed by lane.
pub trait Lock: Send + Sync {
    fn acquire(&self, lane: usize);
    fn release(&self, lane: usize);
}

/// Guard that releases its lock on drop, regardless of back-end.
pub struct LockGuard<'a> {
    lock: &'a dyn Lock,
    lane: usize,
}

impl<'a> LockGuard<'a> {
    pub fn new(lock: &'a dyn Lock, lane: usize) -> Self {
        lock.acquire(lane);
        Self { lock, lane }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(self.lane);
    }
}

/// Queue-based (MCS) lock: one slot per lane, FIFO handoff.
///
/// Mirrors the source's spin-then-park handoff: a lane that fails to
/// acquire immediately publishes itself at the tail of a singly linked
/// list of waiters and spins on its own cache-line-padded node until the
/// prior holder clears it.
pub struct QueueLock {
    tail: AtomicUsize,
    nodes: Vec<QueueNode>,
}

const NO_TAIL: usize = usize::MAX;

#[repr(align(64))]
struct QueueNode {
    locked: AtomicBool,
    next: AtomicUsize,
}

impl QueueLock {
    pub fn new(lane_count: usize) -> Self {
        let nodes = (0..lane_count)
            .map(|_| QueueNode {
                locked: AtomicBool::new(false),
                next: AtomicUsize::new(NO_TAIL),
            })
            .collect();
        Self {
            tail: AtomicUsize::new(NO_TAIL),
            nodes,
        }
    }
}

impl Lock for QueueLock {
    fn acquire(&self, lane: usize) {
        let node = &self.nodes[lane];
        node.next.store(NO_TAIL, Ordering::Relaxed);
        node.locked.store(true, Ordering::Relaxed);

        let prior = self.tail.swap(lane, Ordering::AcqRel);
        if prior != NO_TAIL {
            self.nodes[prior].next.store(lane, Ordering::Release);
            while node.locked.load(Ordering::Acquire) {
                std::hint::spin_loop();
            }
        } else {
            node.locked.store(false, Ordering::Release);
        }
    }

    fn release(&self, lane: usize) {
        let node = &self.nodes[lane];
        let next = node.next.load(Ordering::Acquire);
        if next == NO_TAIL {
            if self
                .tail
                .compare_exchange(lane, NO_TAIL, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
            // A successor is mid-registration; spin until it links in.
            while node.next.load(Ordering::Acquire) == NO_TAIL {
                std::hint::spin_loop();
            }
        }
        let next = node.next.load(Ordering::Acquire);
        self.nodes[next].locked.store(false, Ordering::Release);
    }
}

/// Classical mutex back-end, selected by [`crate::config::LockKind::Mutex`].
///
/// A spinlock rather than a wrapped `std::sync::Mutex`: that guard type
/// can't be "released from a different call" the way `acquire`/`release`
/// requires, since `Lock::release` takes no guard to drop.
pub struct MutexLock {
    locked: AtomicBool,
    _data: UnsafeCell<()>,
}

// SAFETY: the only shared state is the `locked` flag; no data is exposed
// through `_data`, it exists purely to keep the type's shape honest about
// "a mutex guards something."
unsafe impl Sync for MutexLock {}

impl Default for MutexLock {
    fn default() -> Self {
        Self {
            locked: AtomicBool::new(false),
            _data: UnsafeCell::new(()),
        }
    }
}

impl MutexLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Lock for MutexLock {
    fn acquire(&self, _lane: usize) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    fn release(&self, _lane: usize) {
        self.locked.store(false, Ordering::Release);
    }
}

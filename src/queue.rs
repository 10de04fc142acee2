//! Per-locality-group task queue with enqueue routing and work stealing.
//!
//! One sub-queue per worker lane. `dequeue` always tries the caller's own
//! (home) sub-queue first, FIFO from the front; only when that is empty
//! does it scan the remaining sub-queues cyclically, stealing LIFO from
//! the back, to preserve temporal locality for the original owner's
//! remaining work.

use std::cell::UnsafeCell;
use std::collections::VecDeque;

use crate::config::{Config, LockKind};
use crate::rng::LaneRng;
use crate::sync::{Lock, LockGuard, MutexLock, QueueLock};

/// An immutable task descriptor, consumed once by exactly one worker.
pub struct Task<T> {
    pub id: usize,
    pub payload: T,
}

impl<T> Task<T> {
    pub fn new(id: usize, payload: T) -> Self {
        Self { id, payload }
    }
}

struct SubQueue<T> {
    lock: Box<dyn Lock>,
    deque: UnsafeCell<VecDeque<Task<T>>>,
}

// SAFETY: all access to `deque` goes through `with_locked` (guarded by
// `lock`) or `push_unlocked`, which `enqueue_seq` promises is only ever
// called from a single thread.
unsafe impl<T: Send> Sync for SubQueue<T> {}

impl<T> SubQueue<T> {
    fn new(lock_kind: LockKind, lane_count: usize) -> Self {
        let lock: Box<dyn Lock> = match lock_kind {
            LockKind::Mutex => Box::new(MutexLock::new()),
            LockKind::QueueLock => Box::new(QueueLock::new(lane_count)),
        };
        Self {
            lock,
            deque: UnsafeCell::new(VecDeque::new()),
        }
    }

    fn with_locked<R>(&self, caller_lane: usize, f: impl FnOnce(&mut VecDeque<Task<T>>) -> R) -> R {
        let _guard = LockGuard::new(self.lock.as_ref(), caller_lane);
        // SAFETY: guarded by `_guard` above.
        f(unsafe { &mut *self.deque.get() })
    }

    fn push_unlocked(&self, task: Task<T>) {
        // SAFETY: `enqueue_seq`'s contract restricts this to single-threaded use.
        unsafe { (*self.deque.get()).push_back(task) };
    }
}

/// The task queue: `worker_count` sub-queues, one per lane.
pub struct TaskQueue<T> {
    sub_queues: Vec<SubQueue<T>>,
}

impl<T> TaskQueue<T> {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let n = config.worker_count;
        let sub_queues = (0..n).map(|_| SubQueue::new(config.lock_kind, n)).collect();
        Self { sub_queues }
    }

    #[must_use]
    pub fn sub_queue_count(&self) -> usize {
        self.sub_queues.len()
    }

    /// Locked insert, routed by `locality_hint` when present, else spread
    /// across the phase by `task.id`, else (no phase total known) a
    /// caller-seeded random choice.
    pub fn enqueue(
        &self,
        task: Task<T>,
        submitter_lane: usize,
        total_in_phase: usize,
        locality_hint: Option<usize>,
        rng: &mut LaneRng,
    ) {
        let idx = self.route(&task, total_in_phase, locality_hint, rng);
        self.sub_queues[idx].with_locked(submitter_lane, |q| q.push_back(task));
    }

    /// Identical routing to [`Self::enqueue`] but without locking. Only
    /// safe when a single thread (the driver) is the sole submitter.
    pub fn enqueue_seq(
        &self,
        task: Task<T>,
        total_in_phase: usize,
        locality_hint: Option<usize>,
        rng: &mut LaneRng,
    ) {
        let idx = self.route(&task, total_in_phase, locality_hint, rng);
        self.sub_queues[idx].push_unlocked(task);
    }

    fn route(
        &self,
        task: &Task<T>,
        total_in_phase: usize,
        locality_hint: Option<usize>,
        rng: &mut LaneRng,
    ) -> usize {
        let n = self.sub_queues.len().max(1);
        match locality_hint {
            Some(hint) => hint % n,
            None if total_in_phase > 0 => (task.id * n) / total_in_phase,
            None => rng.next_below(n),
        }
    }

    /// Caller's home sub-queue first (FIFO front), then cyclic stealing
    /// from the back (LIFO) of every other sub-queue. `None` once every
    /// sub-queue is empty.
    pub fn dequeue(&self, caller_lane: usize) -> Option<Task<T>> {
        let n = self.sub_queues.len();
        if n == 0 {
            return None;
        }
        if let Some(t) = self.sub_queues[caller_lane].with_locked(caller_lane, VecDeque::pop_front) {
            return Some(t);
        }
        for offset in 1..n {
            let idx = (caller_lane + offset) % n;
            if let Some(t) = self.sub_queues[idx].with_locked(caller_lane, VecDeque::pop_back) {
                return Some(t);
            }
        }
        None
    }
}

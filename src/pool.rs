//! The worker pool: fixed-size, pinned worker threads, released against
//! one callback per round via a `set`/`begin`/`wait` barrier.
//!
//! Rounds are strictly sequential — `set` then `begin` then `wait`, never
//! overlapping — and a worker only ever processes a round whose active
//! lane set it was included in. Per-round signalling uses one
//! `Condvar`/`Mutex` pair per lane (the run signal) plus one shared pair
//! for the completion count, since the standard library has no
//! semaphore primitive.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::config::Config;
use crate::error::MrError;
use crate::platform;
use crate::scheduler;

/// One worker's static identity: lane index, pinned CPU, and locality
/// group. Padded to a cache line to prevent false sharing across lanes.
#[repr(align(64))]
#[derive(Debug, Clone, Copy)]
pub struct WorkerLocation {
    pub lane_index: usize,
    pub cpu_id: usize,
    pub locality_group_id: usize,
}

type RoundFn = dyn Fn(usize) -> anyhow::Result<()> + Send + Sync;

struct LaneSignal {
    released: Mutex<bool>,
    condvar: Condvar,
}

impl LaneSignal {
    fn new() -> Self {
        Self {
            released: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn release(&self) {
        let mut flag = self.released.lock().expect("lane signal mutex poisoned");
        *flag = true;
        self.condvar.notify_one();
    }

    /// Blocks until released, then clears the flag and returns.
    fn wait(&self) {
        let mut flag = self.released.lock().expect("lane signal mutex poisoned");
        while !*flag {
            flag = self.condvar.wait(flag).expect("lane signal mutex poisoned");
        }
        *flag = false;
    }
}

struct Completion {
    remaining: Mutex<usize>,
    condvar: Condvar,
}

impl Completion {
    fn new() -> Self {
        Self {
            remaining: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    fn arm(&self, count: usize) {
        *self.remaining.lock().expect("completion mutex poisoned") = count;
    }

    fn mark_one_done(&self) {
        let mut remaining = self.remaining.lock().expect("completion mutex poisoned");
        *remaining -= 1;
        if *remaining == 0 {
            self.condvar.notify_all();
        }
    }

    fn wait_for_all(&self) {
        let mut remaining = self.remaining.lock().expect("completion mutex poisoned");
        while *remaining > 0 {
            remaining = self.condvar.wait(remaining).expect("completion mutex poisoned");
        }
    }
}

/// `active_count` lane indices, uniformly spaced across `[0, worker_count)`.
fn spaced_lanes(worker_count: usize, active_count: usize) -> Vec<usize> {
    if active_count >= worker_count {
        return (0..worker_count).collect();
    }
    if active_count == 0 {
        return Vec::new();
    }
    (0..active_count)
        .map(|i| (i * worker_count) / active_count)
        .collect()
}

/// Fixed-size pool of pinned worker threads, released one round at a time.
pub struct WorkerPool {
    worker_count: usize,
    locations: Vec<WorkerLocation>,
    signals: Vec<Arc<LaneSignal>>,
    round_fn: Arc<Mutex<Option<Arc<RoundFn>>>>,
    die: Arc<AtomicBool>,
    completion: Arc<Completion>,
    error_slot: Arc<Mutex<Option<MrError>>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spin up `config.worker_count` pinned worker threads, idle until
    /// the first `set`/`begin`.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let worker_count = config.worker_count;
        let locations: Vec<WorkerLocation> = (0..worker_count)
            .map(|lane| WorkerLocation {
                lane_index: lane,
                cpu_id: scheduler::lane_to_cpu(config.scheduling_policy, lane, config.thread_offset),
                locality_group_id: platform::locality_group_of_current_thread(),
            })
            .collect();
        let signals: Vec<Arc<LaneSignal>> = (0..worker_count).map(|_| Arc::new(LaneSignal::new())).collect();
        let round_fn: Arc<Mutex<Option<Arc<RoundFn>>>> = Arc::new(Mutex::new(None));
        let die = Arc::new(AtomicBool::new(false));
        let completion = Arc::new(Completion::new());
        let error_slot = Arc::new(Mutex::new(None));

        let mut handles = Vec::with_capacity(worker_count);
        for location in &locations {
            let signal = Arc::clone(&signals[location.lane_index]);
            let round_fn = Arc::clone(&round_fn);
            let die = Arc::clone(&die);
            let completion = Arc::clone(&completion);
            let error_slot = Arc::clone(&error_slot);
            let location = *location;
            let handle = std::thread::Builder::new()
                .name(format!("mr-worker-{}", location.lane_index))
                .spawn(move || worker_loop(location, signal, round_fn, die, completion, error_slot))
                .map_err(|e| MrError::resource_exhausted(format!("failed to spawn worker thread: {e}")))?;
            handles.push(handle);
        }

        Ok(Self {
            worker_count,
            locations,
            signals,
            round_fn,
            die,
            completion,
            error_slot,
            handles,
        })
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    #[must_use]
    pub fn locations(&self) -> &[WorkerLocation] {
        &self.locations
    }

    /// Bind this round's function and fan-out. Must be followed by
    /// exactly one `begin`/`wait` pair before the next `set`.
    pub fn set(&self, task_fn: impl Fn(usize) -> anyhow::Result<()> + Send + Sync + 'static, active_count: usize) {
        assert!(
            active_count <= self.worker_count,
            "active_count {active_count} exceeds worker_count {}",
            self.worker_count
        );
        *self.round_fn.lock().expect("round_fn mutex poisoned") = Some(Arc::new(task_fn));
        self.completion.arm(active_count);
        *self.error_slot.lock().expect("error slot poisoned") = None;
    }

    /// Release the workers chosen for this round (uniformly spaced across
    /// the lane range when `active_count < worker_count`).
    pub fn begin(&self, active_count: usize) {
        for lane in spaced_lanes(self.worker_count, active_count) {
            self.signals[lane].release();
        }
    }

    /// Block until every active worker has finished this round. Returns
    /// the first error any worker reported, if any.
    pub fn wait(&self) -> anyhow::Result<()> {
        self.completion.wait_for_all();
        if let Some(err) = self.error_slot.lock().expect("error slot poisoned").take() {
            return Err(err.into());
        }
        Ok(())
    }
}

fn worker_loop(
    location: WorkerLocation,
    signal: Arc<LaneSignal>,
    round_fn: Arc<Mutex<Option<Arc<RoundFn>>>>,
    die: Arc<AtomicBool>,
    completion: Arc<Completion>,
    error_slot: Arc<Mutex<Option<MrError>>>,
) {
    let _ = platform::bind_current_thread_to_cpu(location.cpu_id);
    loop {
        signal.wait();
        if die.load(Ordering::Acquire) {
            return;
        }
        let f = round_fn.lock().expect("round_fn mutex poisoned").clone();
        if let Some(f) = f {
            if let Err(e) = f(location.lane_index) {
                let mut slot = error_slot.lock().expect("error slot poisoned");
                if slot.is_none() {
                    *slot = Some(MrError::user_code(e));
                }
            }
        }
        completion.mark_one_done();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.die.store(true, Ordering::Release);
        for signal in &self.signals {
            signal.release();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn test_config(worker_count: usize) -> Config {
        Config::builder().worker_count(worker_count).build().unwrap()
    }

    #[test]
    fn spaced_lanes_covers_full_range_when_active_equals_total() {
        assert_eq!(spaced_lanes(4, 4), vec![0, 1, 2, 3]);
    }

    #[test]
    fn spaced_lanes_spreads_uniformly_when_fewer_active() {
        assert_eq!(spaced_lanes(8, 2), vec![0, 4]);
        assert_eq!(spaced_lanes(8, 4), vec![0, 2, 4, 6]);
    }

    #[test]
    fn every_active_lane_runs_exactly_once_per_round() {
        let cfg = test_config(8);
        let pool = WorkerPool::new(&cfg).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        pool.set(move |_lane| {
            c.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }, 8);
        pool.begin(8);
        pool.wait().unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 8);
    }

    #[test]
    fn rounds_are_sequential_and_repeatable() {
        let cfg = test_config(4);
        let pool = WorkerPool::new(&cfg).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = Arc::clone(&counter);
            pool.set(move |_lane| {
                c.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }, 4);
            pool.begin(4);
            pool.wait().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 12);
    }

    #[test]
    fn a_worker_error_surfaces_from_wait() {
        let cfg = test_config(4);
        let pool = WorkerPool::new(&cfg).unwrap();
        pool.set(|lane| {
            if lane == 2 {
                anyhow::bail!("boom on lane 2");
            }
            Ok(())
        }, 4);
        pool.begin(4);
        let result = pool.wait();
        assert!(result.is_err());
    }

    #[test]
    fn fewer_active_than_workers_only_runs_chosen_lanes() {
        let cfg = test_config(8);
        let pool = WorkerPool::new(&cfg).unwrap();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&ran);
        pool.set(move |lane| {
            r.lock().unwrap().push(lane);
            Ok(())
        }, 2);
        pool.begin(2);
        pool.wait().unwrap();
        let mut ran = ran.lock().unwrap().clone();
        ran.sort_unstable();
        assert_eq!(ran, vec![0, 4]);
    }
}

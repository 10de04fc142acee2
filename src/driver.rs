//! The MapReduce driver: phase sequencer for map → reduce → merge,
//! fan-out sizing, and final materialisation.
//!
//! `MapReduce<T, K, V, Cnt>` owns an immutable [`Config`] and a factory for
//! building a fresh container each run; nothing about the pool, queues, or
//! container survives past the return of [`MapReduce::run`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::combiners::{Combined, CombinerValue};
use crate::config::Config;
use crate::container::{Container, ContainerKey, WriteHandle};
use crate::error::MrError;
use crate::metrics::MetricsCollector;
pub use crate::metrics::RunReport;
use crate::platform;
use crate::pool::WorkerPool;
use crate::queue::{Task, TaskQueue};
use crate::rng::LaneRng;

type MapFn<T, K, V> = dyn Fn(&T, &mut dyn FnMut(K, V)) -> anyhow::Result<()> + Send + Sync;
type ReduceFn<K, V, C> = dyn Fn(&K, C, &mut dyn FnMut(K, V)) -> anyhow::Result<()> + Send + Sync;
type LocatorFn<T> = dyn Fn(&T) -> usize + Send + Sync;
type ContainerFactory<Cnt> = dyn Fn(usize, usize) -> Cnt + Send + Sync;
type CmpFn<K, V> = dyn Fn(&(K, V), &(K, V)) -> std::cmp::Ordering + Send + Sync;
/// Called repeatedly to grow the input sequence one chunk at a time;
/// `None` signals exhaustion. Stateful (it must remember how much of the
/// source it has already handed out), so it is held behind a `Mutex`
/// rather than the plain `Arc<dyn Fn>` the other callbacks use.
type SplitterFn<T> = dyn FnMut() -> Option<Vec<T>> + Send;

/// One invocation's pipeline: a map function (required), an optional
/// reduce function (default: emit every combined value as `(key, value)`),
/// an optional locality locator, and the container factory that shapes
/// the intermediate grid.
///
/// `Cnt::Handle` must implement [`WriteHandle`] so the generic map round
/// can write through the uniform `Fn(&T, &mut dyn FnMut(K, V))` closure
/// protocol; [`crate::container::CommonArrayContainer`]'s handle is `()`
/// and deliberately does not satisfy this bound; its single-writer-per-key
/// contract is meant for a host-built map loop driving [`WorkerPool`] and
/// the container directly (see its module docs), not this generic driver.
pub struct MapReduce<T, K, V, Cnt>
where
    K: ContainerKey,
    V: CombinerValue,
    Cnt: Container<K, V>,
{
    config: Config,
    map_fn: Option<Arc<MapFn<T, K, V>>>,
    reduce_fn: Option<Arc<ReduceFn<K, V, Cnt::Combined>>>,
    locator_fn: Option<Arc<LocatorFn<T>>>,
    splitter_fn: Option<Arc<Mutex<SplitterFn<T>>>>,
    container_factory: Option<Arc<ContainerFactory<Cnt>>>,
}

impl<T, K, V, Cnt> MapReduce<T, K, V, Cnt>
where
    T: Send + Sync,
    K: ContainerKey,
    V: CombinerValue,
    Cnt: Container<K, V> + 'static,
    Cnt::Handle: WriteHandle<K, V>,
{
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            map_fn: None,
            reduce_fn: None,
            locator_fn: None,
            splitter_fn: None,
            container_factory: None,
        }
    }

    #[must_use]
    pub fn with_map(mut self, f: impl Fn(&T, &mut dyn FnMut(K, V)) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        self.map_fn = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_reduce(mut self, f: impl Fn(&K, Cnt::Combined, &mut dyn FnMut(K, V)) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        self.reduce_fn = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_locator(mut self, f: impl Fn(&T) -> usize + Send + Sync + 'static) -> Self {
        self.locator_fn = Some(Arc::new(f));
        self
    }

    /// Supply a splitter in place of a caller-owned input slice: `f` is
    /// called repeatedly, each call growing the input by the chunk of `T`
    /// it returns, until it returns `None`. Drives [`Self::run_from_splitter`]
    /// and its `_sorted`/`_with_report` siblings instead of [`Self::run`].
    #[must_use]
    pub fn with_splitter(mut self, f: impl FnMut() -> Option<Vec<T>> + Send + 'static) -> Self {
        self.splitter_fn = Some(Arc::new(Mutex::new(f)));
        self
    }

    /// `(map_lanes, reduce_partitions) -> Cnt`, called once per `run`.
    #[must_use]
    pub fn with_container_factory(mut self, f: impl Fn(usize, usize) -> Cnt + Send + Sync + 'static) -> Self {
        self.container_factory = Some(Arc::new(f));
        self
    }

    /// Replace this driver's configuration. The Phoenix++ source mutates
    /// its pool in place (`set_threads`); Rust ownership makes "replace the
    /// pool a driver already owns" just "rebuild the driver; a fresh pool
    /// is spun up on the next `run` anyway, so this is a plain field swap.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Run the pipeline, discarding emission order beyond what the
    /// container/combiner variant already guarantees.
    pub fn run(&self, input: &[T]) -> anyhow::Result<Vec<(K, V)>> {
        self.run_internal(input, None, None).map(|(out, _)| out)
    }

    /// Run the pipeline, then sort the final sequence with `cmp` via a
    /// stable per-lane sort and a balanced 2-way merge tree.
    pub fn run_sorted(&self, input: &[T], cmp: impl Fn(&(K, V), &(K, V)) -> std::cmp::Ordering + Send + Sync + 'static) -> anyhow::Result<Vec<(K, V)>> {
        self.run_internal(input, Some(Arc::new(cmp)), None).map(|(out, _)| out)
    }

    /// Like [`Self::run`], additionally returning a per-phase [`RunReport`].
    #[cfg(feature = "metrics")]
    pub fn run_with_report(&self, input: &[T]) -> anyhow::Result<(Vec<(K, V)>, RunReport)> {
        let metrics = MetricsCollector::new();
        let (out, _) = self.run_internal(input, None, Some(&metrics))?;
        Ok((out, metrics.into_report()))
    }

    /// Like [`Self::run_sorted`], additionally returning a per-phase [`RunReport`].
    #[cfg(feature = "metrics")]
    pub fn run_sorted_with_report(
        &self,
        input: &[T],
        cmp: impl Fn(&(K, V), &(K, V)) -> std::cmp::Ordering + Send + Sync + 'static,
    ) -> anyhow::Result<(Vec<(K, V)>, RunReport)> {
        let metrics = MetricsCollector::new();
        let (out, _) = self.run_internal(input, Some(Arc::new(cmp)), Some(&metrics))?;
        Ok((out, metrics.into_report()))
    }

    /// Run the pipeline against a splitter supplied via [`Self::with_splitter`]
    /// instead of a caller-owned slice: the splitter is drained to exhaustion
    /// first (each call's chunk appended to the materialised input), then the
    /// ordinary map/reduce/merge pipeline runs over the result exactly as
    /// [`Self::run`] would. Fails with [`MrError::invariant`] if no splitter
    /// was supplied.
    pub fn run_from_splitter(&self) -> anyhow::Result<Vec<(K, V)>> {
        let input = self.drain_splitter(None)?;
        self.run(&input)
    }

    /// Like [`Self::run_from_splitter`], additionally sorting the result.
    pub fn run_from_splitter_sorted(&self, cmp: impl Fn(&(K, V), &(K, V)) -> std::cmp::Ordering + Send + Sync + 'static) -> anyhow::Result<Vec<(K, V)>> {
        let input = self.drain_splitter(None)?;
        self.run_sorted(&input, cmp)
    }

    /// Like [`Self::run_from_splitter`], additionally returning a per-phase [`RunReport`].
    #[cfg(feature = "metrics")]
    pub fn run_from_splitter_with_report(&self) -> anyhow::Result<(Vec<(K, V)>, RunReport)> {
        let metrics = MetricsCollector::new();
        let input = self.drain_splitter(Some(&metrics))?;
        let (out, _) = self.run_internal(&input, None, Some(&metrics))?;
        Ok((out, metrics.into_report()))
    }

    /// Drain [`Self::with_splitter`]'s callback to exhaustion, concatenating
    /// every chunk it returns into one materialised input sequence. This is
    /// the Rust re-expression of §4.H's splitter phase: the source grows its
    /// chunk sequence in place because task dispatch there operates directly
    /// on splitter-owned chunks, but this driver's map phase already slices
    /// its input by computed chunk size (§4.H fan-out sizing), so collecting
    /// the whole sequence up front keeps a single chunking strategy rather
    /// than two.
    fn drain_splitter(&self, metrics: Option<&MetricsCollector>) -> anyhow::Result<Vec<T>> {
        let splitter = self
            .splitter_fn
            .clone()
            .ok_or_else(|| anyhow::Error::from(MrError::invariant("a splitter is required to call run_from_splitter")))?;
        if let Some(m) = metrics {
            m.record_phase_start("splitter");
        }
        let mut input = Vec::new();
        let mut chunks = 0usize;
        {
            let mut f = splitter.lock().expect("splitter mutex poisoned");
            while let Some(chunk) = f() {
                input.extend(chunk);
                chunks += 1;
            }
        }
        if let Some(m) = metrics {
            m.record_phase_end("splitter", chunks);
        }
        Ok(input)
    }

    fn run_internal(
        &self,
        input: &[T],
        cmp: Option<Arc<CmpFn<K, V>>>,
        metrics: Option<&MetricsCollector>,
    ) -> anyhow::Result<(Vec<(K, V)>, ())> {
        let map_fn = self
            .map_fn
            .clone()
            .ok_or_else(|| anyhow::Error::from(MrError::invariant("a map function is required")))?;
        let container_factory = self
            .container_factory
            .clone()
            .ok_or_else(|| anyhow::Error::from(MrError::invariant("a container factory is required")))?;

        let worker_count = self.config.worker_count;
        let reduce_partitions = worker_count;
        let count = input.len();
        let map_task_count = count.min(worker_count) * 16;
        let chunk_size = if map_task_count > 0 { count.div_ceil(map_task_count) } else { 0 };

        let pool = WorkerPool::new(&self.config)?;
        let container: Arc<Cnt> = Arc::new(container_factory(worker_count, reduce_partitions));

        // --- Map phase ---
        if let Some(m) = metrics {
            m.record_phase_start("map");
        }
        let map_queue: Arc<TaskQueue<(usize, usize)>> = Arc::new(TaskQueue::new(&self.config));
        let mut rng = LaneRng::seeded_from_lane(worker_count);
        let mut chunk_id = 0usize;
        let mut start = 0usize;
        while start < count && chunk_id < map_task_count {
            let end = (start + chunk_size).min(count);
            let locality_hint = self
                .locator_fn
                .as_ref()
                .map(|f| f(&input[start]))
                .or_else(|| Some(platform::locality_group_of_address(input[start..].as_ptr().cast())));
            map_queue.enqueue_seq(Task::new(chunk_id, (start, end)), map_task_count, locality_hint, &mut rng);
            start = end;
            chunk_id += 1;
        }
        let map_task_completed = Arc::new(AtomicUsize::new(0));

        {
            let map_queue = Arc::clone(&map_queue);
            let container = Arc::clone(&container);
            let map_fn = Arc::clone(&map_fn);
            let task_count = Arc::clone(&map_task_completed);
            // SAFETY: `input` outlives this call -- `run_internal` borrows
            // it for its entire body, and the pool's round finishes (via
            // `wait`, below) before `run_internal` returns.
            let input_ref = InputRef(input as *const [T]);
            pool.set(
                move |lane| {
                    let input: &[T] = unsafe { input_ref.as_slice() };
                    let mut handle = container.get(lane);
                    while let Some(task) = map_queue.dequeue(lane) {
                        let (s, e) = task.payload;
                        for item in &input[s..e] {
                            map_fn(item, &mut |k, v| handle.add(k, v)).map_err(MrError::user_code)?;
                        }
                        task_count.fetch_add(1, Ordering::Relaxed);
                    }
                    container.add(lane, handle);
                    Ok(())
                },
                worker_count,
            );
        }
        pool.begin(worker_count);
        pool.wait()?;
        if let Some(m) = metrics {
            m.record_phase_end("map", map_task_completed.load(Ordering::Relaxed));
        }

        // --- Reduce phase ---
        if let Some(m) = metrics {
            m.record_phase_start("reduce");
        }
        let reduce_queue: Arc<TaskQueue<usize>> = Arc::new(TaskQueue::new(&self.config));
        let mut rng = LaneRng::seeded_from_lane(worker_count + 1);
        for r in 0..reduce_partitions {
            reduce_queue.enqueue_seq(Task::new(r, r), reduce_partitions, None, &mut rng);
        }
        let lane_outputs: Arc<Vec<Mutex<Vec<(K, V)>>>> = Arc::new((0..worker_count).map(|_| Mutex::new(Vec::new())).collect());
        let reduce_fn = self.reduce_fn.clone();
        let reduce_task_completed = Arc::new(AtomicUsize::new(0));
        {
            let reduce_queue = Arc::clone(&reduce_queue);
            let container = Arc::clone(&container);
            let lane_outputs = Arc::clone(&lane_outputs);
            let reduce_task_count = Arc::clone(&reduce_task_completed);
            pool.set(
                move |lane| {
                    let mut out = lane_outputs[lane].lock().expect("lane output mutex poisoned");
                    out.reserve(16);
                    while let Some(task) = reduce_queue.dequeue(lane) {
                        let partition = task.payload;
                        for (key, combined) in container.begin(partition) {
                            match &reduce_fn {
                                Some(f) => f(&key, combined, &mut |k, v| out.push((k, v))).map_err(MrError::user_code)?,
                                None => default_reduce(key, combined, &mut out),
                            }
                        }
                        reduce_task_count.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(())
                },
                worker_count,
            );
        }
        pool.begin(worker_count);
        pool.wait()?;
        if let Some(m) = metrics {
            m.record_phase_end("reduce", reduce_task_completed.load(Ordering::Relaxed));
        }
        // Dropping the pool here frees the reduce round's closure along
        // with its captured `Arc<Cnt>`/`Arc<Vec<Mutex<...>>>` clones, so
        // the `try_unwrap` below is guaranteed to be the sole owner.
        drop(pool);
        drop(container);

        // --- Merge phase ---
        if let Some(m) = metrics {
            m.record_phase_start("merge");
        }
        let buffers: Vec<Vec<(K, V)>> = Arc::try_unwrap(lane_outputs)
            .unwrap_or_else(|_| unreachable!("pool teardown released every other handle"))
            .into_iter()
            .map(|m| m.into_inner().expect("lane output mutex poisoned"))
            .collect();
        let result = match cmp {
            Some(cmp) => sorted_merge(buffers, cmp.as_ref()),
            None => buffers.into_iter().flatten().collect(),
        };
        if let Some(m) = metrics {
            m.record_phase_end("merge", result.len());
        }
        Ok((result, ()))
    }
}

/// A `*const [T]` wrapper that is `Send`/`Sync` when `T: Sync`, so the map
/// round's closure (which must satisfy `WorkerPool::set`'s `Send + Sync`
/// bound) can carry a borrow of the caller's input slice across worker
/// threads. Sound because the map-phase barrier (`pool.begin`/`pool.wait`)
/// guarantees every worker's access happens while `run_internal`'s `input:
/// &[T]` borrow is still live, and `T: Sync` rules out a racing mutation
/// through that borrow.
struct InputRef<T>(*const [T]);

unsafe impl<T: Sync> Send for InputRef<T> {}
unsafe impl<T: Sync> Sync for InputRef<T> {}

impl<T> InputRef<T> {
    /// # Safety
    /// The pointee must still be alive and not mutably aliased for the
    /// lifetime `'a` of the returned borrow.
    unsafe fn as_slice<'a>(&self) -> &'a [T] {
        unsafe { &*self.0 }
    }
}

fn default_reduce<K: Clone, V, C: Combined<V>>(key: K, mut combined: C, out: &mut Vec<(K, V)>) {
    while let Some(v) = combined.next() {
        out.push((key.clone(), v));
    }
}

/// Stable per-lane sort followed by a balanced binary-tree pairwise merge.
/// Only 2-way merges are ever performed, one level of the tree at a time;
/// per §4.H/§7, a request for a wider fan-in would be an internal
/// invariant violation, which is why this helper is written so it can
/// only ever perform 2-way merges regardless of `buffers.len()`.
fn sorted_merge<K, V>(mut buffers: Vec<Vec<(K, V)>>, cmp: &(dyn Fn(&(K, V), &(K, V)) -> std::cmp::Ordering)) -> Vec<(K, V)> {
    for buf in &mut buffers {
        buf.sort_by(|a, b| cmp(a, b));
    }
    while buffers.len() > 1 {
        let mut next_level = Vec::with_capacity(buffers.len().div_ceil(2));
        let mut it = buffers.into_iter();
        while let Some(a) = it.next() {
            match it.next() {
                Some(b) => next_level.push(merge_two(a, b, cmp)),
                None => next_level.push(a),
            }
        }
        buffers = next_level;
    }
    buffers.into_iter().next().unwrap_or_default()
}

fn merge_two<K, V>(a: Vec<(K, V)>, b: Vec<(K, V)>, cmp: &(dyn Fn(&(K, V), &(K, V)) -> std::cmp::Ordering)) -> Vec<(K, V)> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut a = a.into_iter().peekable();
    let mut b = b.into_iter().peekable();
    loop {
        match (a.peek(), b.peek()) {
            (Some(x), Some(y)) => {
                if cmp(x, y) != std::cmp::Ordering::Greater {
                    out.push(a.next().unwrap());
                } else {
                    out.push(b.next().unwrap());
                }
            }
            (Some(_), None) => out.push(a.next().unwrap()),
            (None, Some(_)) => out.push(b.next().unwrap()),
            (None, None) => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiners::Associative;
    use crate::container::{ArrayContainer, HashContainer};

    fn sum_factory() -> impl Fn() -> Associative<i64, fn(i64, i64) -> i64> + Clone + Send + Sync + 'static {
        || Associative::new(|a, b| a + b, 0)
    }

    fn config(workers: usize) -> Config {
        Config::builder().worker_count(workers).build().unwrap()
    }

    #[test]
    fn word_count_seed_scenario() {
        // "a a b" -> {("A", 2), ("B", 1)}
        let words = vec!["a".to_string(), "a".to_string(), "b".to_string()];
        let mr: MapReduce<String, String, i64, HashContainer<String, i64, _, _>> = MapReduce::new(config(4))
            .with_map(|w: &String, emit: &mut dyn FnMut(String, i64)| {
                emit(w.to_uppercase(), 1);
                Ok(())
            })
            .with_container_factory(move |m, r| HashContainer::with_factory(m, r, sum_factory()));
        let mut result = mr.run(&words).unwrap();
        result.sort();
        assert_eq!(result, vec![("A".to_string(), 2), ("B".to_string(), 1)]);
    }

    #[test]
    fn histogram_seed_scenario() {
        // pixels (b=0,g=1,r=2), (b=0,g=2,r=2): key = b + g*1 + r*257 (per
        // the original histogram's packing: b in [0,256), g in [256,512),
        // r in [512,768)); expressed here directly as the 4 non-zero keys.
        #[derive(Clone, Copy)]
        struct Pixel {
            b: usize,
            g: usize,
            r: usize,
        }
        let pixels = vec![Pixel { b: 0, g: 1, r: 2 }, Pixel { b: 0, g: 2, r: 2 }];
        let mr: MapReduce<Pixel, usize, i64, ArrayContainer<i64, _, _>> = MapReduce::new(config(2))
            .with_map(|p: &Pixel, emit: &mut dyn FnMut(usize, i64)| {
                emit(p.b, 1);
                emit(256 + p.g, 1);
                emit(512 + p.r, 1);
                Ok(())
            })
            .with_container_factory(move |m, r| ArrayContainer::with_factory(768, m, r, sum_factory()));
        let mut result = mr.run(&pixels).unwrap();
        result.retain(|(_, v)| *v != 0);
        result.sort_by_key(|(k, _)| *k);
        assert_eq!(result, vec![(0, 2), (257, 1), (258, 1), (514, 2)]);
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let mr: MapReduce<i64, i64, i64, HashContainer<i64, i64, _, _>> = MapReduce::new(config(4))
            .with_map(|_: &i64, _emit: &mut dyn FnMut(i64, i64)| Ok(()))
            .with_container_factory(move |m, r| HashContainer::with_factory(m, r, sum_factory()));
        let result = mr.run(&[]).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn fewer_items_than_workers_still_completes() {
        let mr: MapReduce<i64, i64, i64, HashContainer<i64, i64, _, _>> = MapReduce::new(config(8))
            .with_map(|x: &i64, emit: &mut dyn FnMut(i64, i64)| {
                emit(*x, *x);
                Ok(())
            })
            .with_container_factory(move |m, r| HashContainer::with_factory(m, r, sum_factory()));
        let mut result = mr.run(&[1, 2]).unwrap();
        result.sort();
        assert_eq!(result, vec![(1, 1), (2, 2)]);
    }

    #[test]
    fn worker_count_one_degenerates_to_sequential() {
        let mr: MapReduce<i64, i64, i64, HashContainer<i64, i64, _, _>> = MapReduce::new(config(1))
            .with_map(|x: &i64, emit: &mut dyn FnMut(i64, i64)| {
                emit(*x % 3, *x);
                Ok(())
            })
            .with_container_factory(move |m, r| HashContainer::with_factory(m, r, sum_factory()));
        let mut result = mr.run(&(0..30).collect::<Vec<i64>>()).unwrap();
        result.sort();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn sorted_merge_is_stable_and_sorted() {
        let mr: MapReduce<i64, i64, i64, HashContainer<i64, i64, _, _>> = MapReduce::new(config(4))
            .with_map(|x: &i64, emit: &mut dyn FnMut(i64, i64)| {
                emit(*x % 5, *x);
                Ok(())
            })
            .with_container_factory(move |m, r| HashContainer::with_factory(m, r, sum_factory()));
        let input: Vec<i64> = (0..200).collect();
        let result = mr.run_sorted(&input, |a, b| a.0.cmp(&b.0)).unwrap();
        for w in result.windows(2) {
            assert!(w[0].0 <= w[1].0);
        }
    }

    #[test]
    fn user_map_error_surfaces_and_driver_is_reusable() {
        let cfg = config(4);
        let mr: MapReduce<i64, i64, i64, HashContainer<i64, i64, _, _>> = MapReduce::new(cfg.clone())
            .with_map(|x: &i64, emit: &mut dyn FnMut(i64, i64)| {
                if *x == 3 {
                    anyhow::bail!("refusing to map the value 3");
                }
                emit(*x, *x);
                Ok(())
            })
            .with_container_factory(move |m, r| HashContainer::with_factory(m, r, sum_factory()));
        let err = mr.run(&[1, 2, 3, 4]).unwrap_err();
        assert!(err.downcast_ref::<MrError>().is_some(), "expected an MrError::UserCode, got {err:?}");

        // The same config drives an independent, working instance.
        let again: MapReduce<i64, i64, i64, HashContainer<i64, i64, _, _>> = MapReduce::new(cfg)
            .with_map(|x: &i64, emit: &mut dyn FnMut(i64, i64)| {
                emit(*x, *x);
                Ok(())
            })
            .with_container_factory(move |m, r| HashContainer::with_factory(m, r, sum_factory()));
        let result = again.run(&[1, 2]).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn report_has_one_entry_per_phase_actually_run() {
        let mr: MapReduce<i64, i64, i64, HashContainer<i64, i64, _, _>> = MapReduce::new(config(4))
            .with_map(|x: &i64, emit: &mut dyn FnMut(i64, i64)| {
                emit(*x, *x);
                Ok(())
            })
            .with_container_factory(move |m, r| HashContainer::with_factory(m, r, sum_factory()));
        let (_result, report) = mr.run_with_report(&[1, 2, 3]).unwrap();
        assert_eq!(report.phases.len(), 3);
        assert!(report.task_count("map").is_some());
        assert!(report.task_count("reduce").is_some());
        assert!(report.task_count("merge").is_some());
    }

    #[test]
    fn splitter_drives_the_pipeline_when_no_slice_is_supplied() {
        // Splitter hands out chunks of 3 numbers at a time, 3 calls deep,
        // then signals exhaustion.
        let mut next = 0i64;
        let mr: MapReduce<i64, i64, i64, HashContainer<i64, i64, _, _>> = MapReduce::new(config(4))
            .with_splitter(move || {
                if next >= 9 {
                    return None;
                }
                let chunk: Vec<i64> = (next..next + 3).collect();
                next += 3;
                Some(chunk)
            })
            .with_map(|x: &i64, emit: &mut dyn FnMut(i64, i64)| {
                emit(*x, *x);
                Ok(())
            })
            .with_container_factory(move |m, r| HashContainer::with_factory(m, r, sum_factory()));

        let mut result = mr.run_from_splitter().unwrap();
        result.sort();
        assert_eq!(result, (0..9).map(|x| (x, x)).collect::<Vec<_>>());
    }

    #[test]
    fn run_from_splitter_without_a_splitter_is_an_invariant_violation() {
        let mr: MapReduce<i64, i64, i64, HashContainer<i64, i64, _, _>> = MapReduce::new(config(4))
            .with_map(|x: &i64, emit: &mut dyn FnMut(i64, i64)| {
                emit(*x, *x);
                Ok(())
            })
            .with_container_factory(move |m, r| HashContainer::with_factory(m, r, sum_factory()));
        let err = mr.run_from_splitter().unwrap_err();
        assert!(matches!(err.downcast_ref::<MrError>(), Some(MrError::InvariantViolation { .. })));
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn splitter_phase_is_reported_when_present() {
        let mut done = false;
        let mr: MapReduce<i64, i64, i64, HashContainer<i64, i64, _, _>> = MapReduce::new(config(4))
            .with_splitter(move || {
                if done {
                    return None;
                }
                done = true;
                Some(vec![1, 2, 3])
            })
            .with_map(|x: &i64, emit: &mut dyn FnMut(i64, i64)| {
                emit(*x, *x);
                Ok(())
            })
            .with_container_factory(move |m, r| HashContainer::with_factory(m, r, sum_factory()));
        let (_result, report) = mr.run_from_splitter_with_report().unwrap();
        assert_eq!(report.phases.len(), 4);
        assert_eq!(report.task_count("splitter"), Some(1));
    }
}

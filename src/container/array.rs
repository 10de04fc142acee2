//! The array container: fixed cardinality `N`, contention-free writes.
//!
//! Each map lane gets a private `N`-cell combiner array. At commit, lane
//! ownership transfers into column `lane` of the `(N × M)` grid. During
//! reduce, partition `r`'s iterator walks keys `k ∈ [r, r+M, r+2M, …) ∩
//! [0, N)` and folds column `k` across every lane.

use std::cell::UnsafeCell;

use super::{Container, ContainerKey, WriteHandle};
use crate::combiners::{Combined, Combiner, CombinerValue};

/// A map lane's private write view: one combiner per key in `[0, N)`,
/// built lazily via the container's factory on first `add`.
pub struct ArrayWriteView<C, F> {
    n: usize,
    cells: Vec<Option<C>>,
    factory: F,
}

impl<V: CombinerValue, C: Combiner<V>, F: Fn() -> C> ArrayWriteView<C, F> {
    pub fn add(&mut self, key: usize, value: V) {
        debug_assert!(key < self.n, "key {key} out of range [0, {})", self.n);
        self.cells[key].get_or_insert_with(&self.factory).add(value);
    }
}

impl<V: CombinerValue, C: Combiner<V>, F: Fn() -> C> WriteHandle<usize, V> for ArrayWriteView<C, F> {
    fn add(&mut self, key: usize, value: V) {
        ArrayWriteView::add(self, key, value)
    }
}

/// Fixed-cardinality container keyed by `usize` in `[0, N)`.
pub struct ArrayContainer<V, C: Combiner<V>, F> {
    n: usize,
    map_lanes: usize,
    reduce_partitions: usize,
    factory: F,
    // grid[key * map_lanes + lane]: lane `lane`'s combiner for `key`,
    // committed once at that lane's commit.
    grid: Vec<UnsafeCell<Option<C::Combined>>>,
    _value: std::marker::PhantomData<V>,
}

// SAFETY: grid[key * map_lanes + lane] is written only by lane `lane`
// during its own commit, and read only after the map-phase barrier.
unsafe impl<V: Send, C: Combiner<V> + Send, F: Send> Sync for ArrayContainer<V, C, F> {}

impl<V, C, F> ArrayContainer<V, C, F>
where
    V: CombinerValue,
    C: Combiner<V>,
    F: Fn() -> C + Send + Sync + Clone,
{
    #[must_use]
    pub fn with_factory(n: usize, map_lanes: usize, reduce_partitions: usize, factory: F) -> Self {
        let map_lanes = map_lanes.max(1);
        let reduce_partitions = reduce_partitions.max(1);
        let grid = (0..n * map_lanes).map(|_| UnsafeCell::new(None)).collect();
        Self {
            n,
            map_lanes,
            reduce_partitions,
            factory,
            grid,
            _value: std::marker::PhantomData,
        }
    }

    fn cell(&self, key: usize, lane: usize) -> &UnsafeCell<Option<C::Combined>> {
        &self.grid[key * self.map_lanes + lane]
    }
}

impl<V, C, F> Container<usize, V> for ArrayContainer<V, C, F>
where
    V: CombinerValue,
    C: Combiner<V> + 'static,
    F: Fn() -> C + Send + Sync + Clone + 'static,
{
    type Handle = ArrayWriteView<C, F>;
    type Combined = C::Combined;

    fn get(&self, _lane: usize) -> Self::Handle {
        ArrayWriteView {
            n: self.n,
            cells: (0..self.n).map(|_| None).collect(),
            factory: self.factory.clone(),
        }
    }

    fn add(&self, lane: usize, handle: Self::Handle) {
        for (key, cell) in handle.cells.into_iter().enumerate() {
            if let Some(combiner) = cell {
                // SAFETY: lane `lane` is the sole writer of column `lane`.
                unsafe { *self.cell(key, lane).get() = Some(combiner.into_combined()) };
            }
        }
    }

    fn begin(&self, partition: usize) -> Vec<(usize, Self::Combined)> {
        let mut out = Vec::new();
        let mut key = partition;
        while key < self.n {
            let mut slot: Option<C::Combined> = None;
            for lane in 0..self.map_lanes {
                // SAFETY: called after every lane's commit for this round.
                if let Some(combined) = std::mem::take(unsafe { &mut *self.cell(key, lane).get() }) {
                    match &mut slot {
                        Some(existing) => existing.merge(combined),
                        None => slot = Some(combined),
                    }
                }
            }
            if let Some(combined) = slot {
                out.push((key, combined));
            }
            key += self.reduce_partitions;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiners::Associative;

    fn sum_factory() -> impl Fn() -> Associative<i64, fn(i64, i64) -> i64> + Clone {
        || Associative::new(|a, b| a + b, 0)
    }

    #[test]
    fn histogram_style_accumulation() {
        // 768-key histogram, single lane/partition for this unit test;
        // full fan-out is exercised by the driver-level scenario tests.
        let c = ArrayContainer::<i64, _, _>::with_factory(768, 1, 1, sum_factory());
        let mut h = c.get(0);
        h.add(0, 1);
        h.add(0, 1);
        h.add(257, 1);
        c.add(0, h);
        let mut results = c.begin(0);
        results.sort_by_key(|(k, _)| *k);
        let values: Vec<_> = results
            .into_iter()
            .map(|(k, mut combined)| (k, combined.next().unwrap()))
            .collect();
        assert_eq!(values, vec![(0, 2), (257, 1)]);
    }

    #[test]
    fn partition_stride_matches_lane_count() {
        let c = ArrayContainer::<i64, _, _>::with_factory(6, 1, 2, sum_factory());
        let mut h = c.get(0);
        h.add(0, 1);
        h.add(1, 1);
        h.add(2, 1);
        h.add(3, 1);
        h.add(4, 1);
        h.add(5, 1);
        c.add(0, h);
        let p0: Vec<usize> = c.begin(0).into_iter().map(|(k, _)| k).collect();
        let p1: Vec<usize> = c.begin(1).into_iter().map(|(k, _)| k).collect();
        assert_eq!(p0, vec![0, 2, 4]);
        assert_eq!(p1, vec![1, 3, 5]);
    }
}

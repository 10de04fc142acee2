//! The hash container: arbitrary hashable keys, flexible cardinality.
//!
//! Each map lane owns a private open-addressing hash table (K → combiner).
//! At commit, every entry is converted to its combined snapshot and
//! scattered into the (R × M) grid by `hash(key) mod R`. During reduce,
//! partition `r`'s iterator walks the `M` per-lane vectors routed to it
//! and folds same-key snapshots together.

use std::cell::UnsafeCell;
use std::collections::HashMap;

use super::open_hash::OpenHashTable;
use super::{hash_partition, Container, ContainerKey, WriteHandle};
use crate::combiners::{Combined, Combiner, CombinerValue};

/// A map lane's private write view: an open-addressing table keyed by `K`.
pub struct HashWriteView<K, C, F> {
    table: OpenHashTable<K, C>,
    factory: F,
}

impl<K: ContainerKey, V: CombinerValue, C: Combiner<V>, F: Fn() -> C> HashWriteView<K, C, F> {
    /// Incorporate `value` under `key`, creating a fresh combiner for
    /// previously unseen keys via the container's factory.
    pub fn add(&mut self, key: K, value: V) {
        let factory = &self.factory;
        self.table.entry_or_insert_with(key, || factory()).add(value);
    }
}

impl<K: ContainerKey, V: CombinerValue, C: Combiner<V>, F: Fn() -> C> WriteHandle<K, V> for HashWriteView<K, C, F> {
    fn add(&mut self, key: K, value: V) {
        HashWriteView::add(self, key, value)
    }
}

/// Flexible-cardinality container keyed by arbitrary hashable `K`.
///
/// Generic over the combiner type `C` and its factory `F` so the same
/// container works with sum-combiners, buffers, or any other
/// [`Combiner`] implementation the host supplies.
pub struct HashContainer<K, V, C: Combiner<V>, F> {
    map_lanes: usize,
    reduce_partitions: usize,
    factory: F,
    // grid[r * map_lanes + l]: lane `l`'s entries routed to partition `r`.
    // Written exactly once, by lane `l`, across a commit; read only after
    // every lane's commit has happened-before the reduce phase begins.
    grid: Vec<UnsafeCell<Vec<(K, C::Combined)>>>,
    _value: std::marker::PhantomData<V>,
}

// SAFETY: each grid cell (r, l) is written by exactly one lane (l) during
// that lane's commit, and only read back after the worker pool barrier
// that separates map from reduce, so there is never a concurrent writer
// and reader of the same cell.
unsafe impl<K: Send, V: Send, C: Combiner<V> + Send, F: Send> Sync for HashContainer<K, V, C, F> {}

impl<K, V, C, F> HashContainer<K, V, C, F>
where
    K: ContainerKey,
    V: CombinerValue,
    C: Combiner<V>,
    F: Fn() -> C + Send + Sync + Clone,
{
    /// Build a container whose per-lane tables create new combiners via
    /// `factory`. Use this instead of [`Container::new`] when the
    /// combiner needs a non-`Default` factory (most of them do).
    #[must_use]
    pub fn with_factory(map_lanes: usize, reduce_partitions: usize, factory: F) -> Self {
        let cells = reduce_partitions.max(1) * map_lanes.max(1);
        let grid = (0..cells).map(|_| UnsafeCell::new(Vec::new())).collect();
        Self {
            map_lanes: map_lanes.max(1),
            reduce_partitions: reduce_partitions.max(1),
            factory,
            grid,
            _value: std::marker::PhantomData,
        }
    }

    fn cell(&self, partition: usize, lane: usize) -> &UnsafeCell<Vec<(K, C::Combined)>> {
        &self.grid[partition * self.map_lanes + lane]
    }
}

impl<K, V, C, F> Container<K, V> for HashContainer<K, V, C, F>
where
    K: ContainerKey,
    V: CombinerValue,
    C: Combiner<V> + 'static,
    F: Fn() -> C + Send + Sync + Clone + 'static,
{
    type Handle = HashWriteView<K, C, F>;
    type Combined = C::Combined;

    fn get(&self, _lane: usize) -> Self::Handle {
        HashWriteView {
            table: OpenHashTable::new(),
            factory: self.factory.clone(),
        }
    }

    fn add(&self, lane: usize, handle: Self::Handle) {
        for (key, combiner) in handle.table.into_entries() {
            let r = hash_partition(&key, self.reduce_partitions);
            let combined = combiner.into_combined();
            // SAFETY: lane `lane` is the sole writer of every cell in its
            // column for this commit.
            unsafe { (*self.cell(r, lane).get()).push((key, combined)) };
        }
    }

    fn begin(&self, partition: usize) -> Vec<(K, Self::Combined)> {
        let mut merged: HashMap<K, C::Combined> = HashMap::new();
        for lane in 0..self.map_lanes {
            // SAFETY: called only after every lane's `add` has returned,
            // which happens-before the reduce phase in the pool barrier;
            // draining by value (not just reading) is safe since nothing
            // else touches this cell again once the partition is read.
            let entries = std::mem::take(unsafe { &mut *self.cell(partition, lane).get() });
            for (key, combined) in entries {
                use std::collections::hash_map::Entry;
                match merged.entry(key) {
                    Entry::Occupied(mut e) => e.get_mut().merge(combined),
                    Entry::Vacant(e) => {
                        e.insert(combined);
                    }
                }
            }
        }
        merged.into_iter().collect()
    }
}

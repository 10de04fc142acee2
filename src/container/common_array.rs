//! The common-array container: fixed cardinality `N`, one process-wide
//! array shared by every lane.
//!
//! `get(lane)` hands every lane a handle into the *same* shared cells —
//! there is no per-lane isolation, so this variant is only correct when
//! the host guarantees at most one lane ever writes a given key (e.g.
//! matrix-multiply, where each output row is produced by exactly one
//! task). The runtime does not and cannot check that guarantee.

use std::cell::UnsafeCell;

use super::{Container, ContainerKey};
use crate::combiners::{Combined, Combiner, CombinerValue};

/// A handle into the container's single shared array. Every lane's
/// `get(lane)` returns an equivalent handle pointing at the same cells;
/// `add` is a no-op beyond dropping the handle, since writes already
/// happened in place through [`SharedWriteView::add`].
pub struct SharedWriteView<'a, V, C: Combiner<V>> {
    cells: &'a [UnsafeCell<Option<C>>],
    factory: &'a (dyn Fn() -> C + Send + Sync),
    _value: std::marker::PhantomData<V>,
}

impl<'a, V: CombinerValue, C: Combiner<V>> SharedWriteView<'a, V, C> {
    /// Incorporate `value` under `key` directly into the shared cell.
    ///
    /// # Safety contract
    /// The host must guarantee no two lanes call `add` for the same `key`
    /// concurrently; the runtime performs no locking on this hot path.
    pub fn add(&self, key: usize, value: V) {
        // SAFETY: per the type's documented single-writer-per-key
        // contract, no other lane is concurrently mutating this cell.
        let slot = unsafe { &mut *self.cells[key].get() };
        slot.get_or_insert_with(|| (self.factory)()).add(value);
    }
}

/// Fixed-cardinality, single-writer-per-key container keyed by `usize`.
pub struct CommonArrayContainer<V, C: Combiner<V>, F> {
    n: usize,
    reduce_partitions: usize,
    factory: F,
    cells: Vec<UnsafeCell<Option<C>>>,
    _value: std::marker::PhantomData<V>,
}

// SAFETY: safety rests on the documented host-side disjoint-writer
// invariant, not on anything this type enforces.
unsafe impl<V: Send, C: Combiner<V> + Send, F: Send> Sync for CommonArrayContainer<V, C, F> {}

impl<V, C, F> CommonArrayContainer<V, C, F>
where
    V: CombinerValue,
    C: Combiner<V>,
    F: Fn() -> C + Send + Sync,
{
    #[must_use]
    pub fn with_factory(n: usize, reduce_partitions: usize, factory: F) -> Self {
        let cells = (0..n).map(|_| UnsafeCell::new(None)).collect();
        Self {
            n,
            reduce_partitions: reduce_partitions.max(1),
            factory,
            cells,
            _value: std::marker::PhantomData,
        }
    }
}

impl<V, C, F> Container<usize, V> for CommonArrayContainer<V, C, F>
where
    V: CombinerValue,
    C: Combiner<V> + 'static,
    F: Fn() -> C + Send + Sync + 'static,
{
    type Handle = ();
    type Combined = C::Combined;

    fn get(&self, _lane: usize) -> Self::Handle {
        // Writes happen directly through `shared_view`, not through a
        // per-lane handle; `get`/`add` exist only to satisfy the uniform
        // protocol every container variant presents to the driver.
    }

    fn add(&self, _lane: usize, (): Self::Handle) {}

    fn begin(&self, partition: usize) -> Vec<(usize, Self::Combined)> {
        let mut out = Vec::new();
        let mut key = partition;
        while key < self.n {
            // SAFETY: called only after the map phase's barrier, once no
            // lane can still be writing.
            if let Some(combiner) = std::mem::take(unsafe { &mut *self.cells[key].get() }) {
                out.push((key, combiner.into_combined()));
            }
            key += self.reduce_partitions;
        }
        out
    }
}

impl<V, C, F> CommonArrayContainer<V, C, F>
where
    V: CombinerValue,
    C: Combiner<V>,
    F: Fn() -> C + Send + Sync,
{
    /// The write view every lane shares; unlike [`Container::get`] (which
    /// exists to satisfy the uniform protocol) this is what map workers
    /// actually call through.
    #[must_use]
    pub fn shared_view(&self) -> SharedWriteView<'_, V, C> {
        SharedWriteView {
            cells: &self.cells,
            factory: &self.factory,
            _value: std::marker::PhantomData,
        }
    }
}

//! The must-reduce buffer: identical to [`super::buffer::Buffer`] at the
//! lane level, but its combined form defers folding `F` to iteration time
//! instead of applying it incrementally as values are `add`ed.
//!
//! Select this variant over [`super::associative::Associative`] when `F` is
//! not associative/commutative and the host needs exactly one final value
//! per key, folded in a single, fixed, reduce-time pass.

use super::{Combined, Combiner, CombinerValue};

/// Per-lane buffer carrying the fold function it will apply at reduce
/// time. Lane-side `add` only appends; `F` runs once, lazily, on the
/// combined side's first `next()`.
pub struct MustReduceBuffer<V, F> {
    values: Vec<V>,
    fold: F,
}

impl<V, F: Fn(V, V) -> V> MustReduceBuffer<V, F> {
    #[must_use]
    pub fn new(fold: F) -> Self {
        Self {
            values: Vec::new(),
            fold,
        }
    }
}

impl<V: CombinerValue, F: Fn(V, V) -> V + Send + Clone + 'static> Combiner<V> for MustReduceBuffer<V, F> {
    type Combined = MustReduced<V, F>;

    fn add(&mut self, v: V) {
        self.values.push(v);
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn into_combined(self) -> MustReduced<V, F> {
        MustReduced {
            buffered: self.values,
            fold: self.fold,
            result: None,
            yielded: false,
        }
    }
}

/// Reduce-side snapshot for [`MustReduceBuffer`]: buffers every lane's
/// values verbatim, folds them all with `F` the first time `next` is
/// called, and yields exactly one value. The fold reads `buffered` by
/// clone rather than draining it, so the memoized `result` -- and the raw
/// values behind it -- survive a `reset()`, letting iteration genuinely
/// rewind instead of finding nothing left to yield.
pub struct MustReduced<V, F> {
    buffered: Vec<V>,
    fold: F,
    result: Option<V>,
    yielded: bool,
}

impl<V: CombinerValue, F: Fn(V, V) -> V> MustReduced<V, F> {
    fn reduce_if_needed(&mut self) {
        if self.result.is_some() || self.buffered.is_empty() {
            return;
        }
        let mut values = self.buffered.iter().cloned();
        let mut acc = values.next().expect("checked non-empty above");
        for v in values {
            acc = (self.fold)(acc, v);
        }
        self.result = Some(acc);
    }
}

impl<V: CombinerValue, F: Fn(V, V) -> V + Send + Clone + 'static> Combined<V> for MustReduced<V, F> {
    fn merge(&mut self, other: Self) {
        self.buffered.extend(other.buffered);
        self.result = None;
        self.yielded = false;
    }

    fn next(&mut self) -> Option<V> {
        self.reduce_if_needed();
        if self.yielded {
            return None;
        }
        self.yielded = true;
        self.result.clone()
    }

    fn reset(&mut self) {
        self.yielded = false;
    }

    fn size(&self) -> usize {
        if self.yielded || self.buffered.is_empty() {
            0
        } else {
            1
        }
    }

    fn clear(&mut self) {
        self.buffered.clear();
        self.result = None;
        self.yielded = false;
    }
}

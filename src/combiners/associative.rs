//! The associative combiner: a single folded value plus an empty bit.
//!
//! `add(v)` applies a user-supplied, associative-and-commutative `F` to the
//! running value, starting from `Init`. Folding at map time is only correct
//! when `F` is associative and commutative, since the order values arrive
//! in (within a key, within a partition) is unspecified; see
//! [`crate::combiners::must_reduce`] for the non-associative escape hatch.

use super::{Combined, Combiner, CombinerValue};

/// Per-lane associative accumulator: `Init` folded through `F` over every
/// `add`ed value.
pub struct Associative<V, F> {
    fold: F,
    value: V,
    init: V,
    empty: bool,
}

impl<V: CombinerValue, F: Fn(V, V) -> V + Send + Clone + 'static> Associative<V, F> {
    /// Build a combiner from a fold function and its identity element.
    #[must_use]
    pub fn new(fold: F, init: V) -> Self {
        Self {
            fold,
            value: init.clone(),
            init,
            empty: true,
        }
    }
}

impl<V: CombinerValue, F: Fn(V, V) -> V + Send + Clone + 'static> Combiner<V> for Associative<V, F> {
    type Combined = AssociativeCombined<V, F>;

    fn add(&mut self, v: V) {
        let current = std::mem::replace(&mut self.value, self.init.clone());
        self.value = (self.fold)(current, v);
        self.empty = false;
    }

    fn is_empty(&self) -> bool {
        self.empty
    }

    fn into_combined(self) -> AssociativeCombined<V, F> {
        AssociativeCombined {
            fold: self.fold,
            init: self.init,
            value: self.value,
            empty: self.empty,
            yielded: false,
        }
    }
}

/// Reduce-side snapshot for [`Associative`]: folds every merged lane's
/// value through the same `F`, then yields the single result exactly once.
pub struct AssociativeCombined<V, F> {
    fold: F,
    init: V,
    value: V,
    empty: bool,
    yielded: bool,
}

impl<V: CombinerValue, F: Fn(V, V) -> V + Send + Clone + 'static> Combined<V> for AssociativeCombined<V, F> {
    fn merge(&mut self, other: Self) {
        if other.empty {
            return;
        }
        if self.empty {
            self.value = other.value;
            self.empty = false;
            return;
        }
        let current = std::mem::replace(&mut self.value, self.init.clone());
        self.value = (self.fold)(current, other.value);
    }

    fn next(&mut self) -> Option<V> {
        if self.empty || self.yielded {
            return None;
        }
        self.yielded = true;
        Some(self.value.clone())
    }

    fn reset(&mut self) {
        self.yielded = false;
    }

    fn size(&self) -> usize {
        if self.empty || self.yielded {
            0
        } else {
            1
        }
    }

    fn clear(&mut self) {
        self.value = self.init.clone();
        self.empty = true;
        self.yielded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiners::drain;

    fn sum_combiner() -> Associative<i64, fn(i64, i64) -> i64> {
        Associative::new(|a, b| a + b, 0)
    }

    #[test]
    fn folds_values_with_identity() {
        let mut c = sum_combiner();
        c.add(1);
        c.add(2);
        c.add(3);
        assert_eq!(drain(c.into_combined()), vec![6]);
    }

    #[test]
    fn merging_two_lanes_sums_both() {
        let mut a = sum_combiner();
        a.add(10);
        let mut b = sum_combiner();
        b.add(5);
        b.add(5);
        let mut combined = a.into_combined();
        combined.merge(b.into_combined());
        assert_eq!(drain(combined), vec![20]);
    }

    #[test]
    fn merging_an_empty_lane_is_a_no_op() {
        let mut a = sum_combiner();
        a.add(7);
        let empty: Associative<i64, fn(i64, i64) -> i64> = sum_combiner();
        let mut combined = a.into_combined();
        combined.merge(empty.into_combined());
        assert_eq!(drain(combined), vec![7]);
    }

    #[test]
    fn empty_combiner_yields_nothing() {
        let c: Associative<i64, fn(i64, i64) -> i64> = sum_combiner();
        assert!(c.is_empty());
        assert_eq!(drain(c.into_combined()), Vec::<i64>::new());
    }

    #[test]
    fn min_combiner_via_same_type() {
        let mut c = Associative::new(i64::min, i64::MAX);
        c.add(5);
        c.add(2);
        c.add(9);
        assert_eq!(drain(c.into_combined()), vec![2]);
    }
}

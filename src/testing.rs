//! Testing utilities for `numamr` users.
//!
//! This module gives host crates the assertions, data builders, and debug
//! wrapper needed to write idiomatic tests against a [`crate::MapReduce`]
//! run without hand-rolling multiset comparisons or fan-out introspection
//! every time:
//!
//! - **Assertions**: compare `(K, V)` results as multisets or check sort order
//! - **Test data builders**: generate literal input chunks fluently
//! - **Debug wrapper**: inspect task counts and phase durations without
//!   depending on wall-clock values
//!
//! # Quick Start
//!
//! ```
//! use numamr::testing::{assert_kv_multisets_equal, TestDataBuilder};
//!
//! let input = TestDataBuilder::<i32>::new().add_range(1..=5).build();
//! assert_eq!(input, vec![1, 2, 3, 4, 5]);
//!
//! assert_kv_multisets_equal(vec![("b", 2), ("a", 1)], vec![("a", 1), ("b", 2)]);
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::{Add, RangeInclusive};

/// Assert that two `(K, V)` collections contain the same entries, ignoring
/// order and ignoring repeated identical entries' positions -- a true
/// multiset comparison, matching §8's "produces the expected (key, value)
/// multiset" phrasing rather than sequence equality.
///
/// # Panics
///
/// Panics if the two multisets differ.
///
/// # Example
///
/// ```
/// use numamr::testing::assert_kv_multisets_equal;
///
/// assert_kv_multisets_equal(vec![("a", 1), ("a", 1), ("b", 2)], vec![("b", 2), ("a", 1), ("a", 1)]);
/// ```
pub fn assert_kv_multisets_equal<K, V>(actual: Vec<(K, V)>, expected: Vec<(K, V)>)
where
    K: Debug + Eq + Hash + Clone,
    V: Debug + Eq + Hash + Clone,
{
    let actual_counts = count_multiset(&actual);
    let expected_counts = count_multiset(&expected);

    if actual_counts != expected_counts {
        let missing: Vec<_> = expected_counts
            .iter()
            .filter(|(k, n)| actual_counts.get(*k).copied().unwrap_or(0) < **n)
            .collect();
        let extra: Vec<_> = actual_counts
            .iter()
            .filter(|(k, n)| expected_counts.get(*k).copied().unwrap_or(0) < **n)
            .collect();
        panic!(
            "kv multiset mismatch:\n  missing from actual: {missing:?}\n  extra in actual: {extra:?}\n  expected: {expected:?}\n  actual: {actual:?}"
        );
    }
}

fn count_multiset<K: Eq + Hash + Clone, V: Eq + Hash + Clone>(items: &[(K, V)]) -> HashMap<(K, V), usize> {
    let mut counts = HashMap::new();
    for item in items {
        *counts.entry(item.clone()).or_insert(0) += 1;
    }
    counts
}

/// Assert that `actual` is non-decreasing under `cmp`, reporting the index
/// and values of the first inversion found.
///
/// # Panics
///
/// Panics if any adjacent pair is out of order under `cmp`.
///
/// # Example
///
/// ```
/// use numamr::testing::assert_sorted_by;
///
/// let result = vec![(1, "a"), (1, "b"), (3, "c")];
/// assert_sorted_by(&result, |a, b| a.0.cmp(&b.0));
/// ```
pub fn assert_sorted_by<T: Debug>(actual: &[T], cmp: impl Fn(&T, &T) -> std::cmp::Ordering) {
    for (i, w) in actual.windows(2).enumerate() {
        if cmp(&w[0], &w[1]) == std::cmp::Ordering::Greater {
            panic!("sort order violated at index {i}:\n  {:?}\n  followed by\n  {:?}", w[0], w[1]);
        }
    }
}

/// A fluent builder for constructing literal test input, mirroring the
/// teacher's range/repeat builder.
///
/// # Example
///
/// ```
/// use numamr::testing::TestDataBuilder;
///
/// let data = TestDataBuilder::new()
///     .add_range(1..=10)
///     .add_value(100)
///     .add_repeated(42, 3)
///     .build();
///
/// assert_eq!(data.len(), 14); // 10 + 1 + 3
/// ```
#[derive(Default)]
pub struct TestDataBuilder<T> {
    data: Vec<T>,
}

impl<T> TestDataBuilder<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self { data: Vec::new() }
    }

    #[must_use]
    pub fn add_value(mut self, value: T) -> Self {
        self.data.push(value);
        self
    }

    #[must_use]
    pub fn add_values(mut self, values: Vec<T>) -> Self {
        self.data.extend(values);
        self
    }

    #[must_use]
    pub fn add_repeated(mut self, value: T, count: usize) -> Self
    where
        T: Clone,
    {
        for _ in 0..count {
            self.data.push(value.clone());
        }
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<T> {
        self.data
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> TestDataBuilder<T>
where
    T: Copy + From<i32> + Add<Output = T> + PartialOrd,
{
    #[must_use]
    pub fn add_range(mut self, range: RangeInclusive<i32>) -> Self {
        for i in range {
            self.data.push(T::from(i));
        }
        self
    }
}

#[cfg(feature = "metrics")]
mod debug_driver {
    use crate::combiners::CombinerValue;
    use crate::container::{Container, ContainerKey, WriteHandle};
    use crate::driver::MapReduce;
    use crate::metrics::RunReport;
    use std::time::Duration;

    /// A thin wrapper around [`MapReduce`] -- the testing counterpart of the
    /// teacher's `TestPipeline` -- that keeps the last run's [`RunReport`]
    /// around so a test can assert on fan-out sizing and which phases ran
    /// without depending on wall-clock duration values.
    pub struct DebugMapReduce<T, K, V, Cnt>
    where
        K: ContainerKey,
        V: CombinerValue,
        Cnt: Container<K, V>,
    {
        inner: MapReduce<T, K, V, Cnt>,
        last_report: Option<RunReport>,
    }

    impl<T, K, V, Cnt> DebugMapReduce<T, K, V, Cnt>
    where
        T: Send + Sync,
        K: ContainerKey,
        V: CombinerValue,
        Cnt: Container<K, V> + 'static,
        Cnt::Handle: WriteHandle<K, V>,
    {
        #[must_use]
        pub fn new(inner: MapReduce<T, K, V, Cnt>) -> Self {
            Self { inner, last_report: None }
        }

        /// Run the wrapped driver, recording its report for later inspection.
        pub fn run(&mut self, input: &[T]) -> anyhow::Result<Vec<(K, V)>> {
            let (out, report) = self.inner.run_with_report(input)?;
            self.last_report = Some(report);
            Ok(out)
        }

        /// The number of tasks `phase` completed in the last run, if it ran.
        #[must_use]
        pub fn task_count(&self, phase: &str) -> Option<u64> {
            self.last_report.as_ref().and_then(|r| r.task_count(phase))
        }

        /// Every phase's `(name, duration)` from the last run, in execution order.
        #[must_use]
        pub fn phase_durations(&self) -> Vec<(String, Duration)> {
            self.last_report
                .as_ref()
                .map(|r| r.phases.iter().map(|p| (p.name.clone(), p.duration)).collect())
                .unwrap_or_default()
        }
    }
}

#[cfg(feature = "metrics")]
pub use debug_driver::DebugMapReduce;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_multisets_equal_ignores_order() {
        assert_kv_multisets_equal(vec![("b", 2), ("a", 1), ("a", 1)], vec![("a", 1), ("a", 1), ("b", 2)]);
    }

    #[test]
    #[should_panic(expected = "kv multiset mismatch")]
    fn kv_multisets_equal_catches_a_wrong_count() {
        assert_kv_multisets_equal(vec![("a", 1)], vec![("a", 1), ("a", 1)]);
    }

    #[test]
    fn sorted_by_accepts_nondecreasing_input() {
        assert_sorted_by(&[1, 1, 2, 3], |a, b| a.cmp(b));
    }

    #[test]
    #[should_panic(expected = "sort order violated")]
    fn sorted_by_catches_an_inversion() {
        assert_sorted_by(&[1, 3, 2], |a, b| a.cmp(b));
    }

    #[test]
    fn builder_composes_ranges_values_and_repeats() {
        let data = TestDataBuilder::new().add_range(1..=3).add_value(100).add_repeated(7, 2).build();
        assert_eq!(data, vec![1, 2, 3, 100, 7, 7]);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn debug_map_reduce_exposes_task_counts_after_run() {
        use crate::combiners::Associative;
        use crate::config::Config;
        use crate::container::HashContainer;
        use crate::driver::MapReduce;

        let cfg = Config::builder().worker_count(4).build().unwrap();
        let mr: MapReduce<i64, i64, i64, HashContainer<i64, i64, _, _>> = MapReduce::new(cfg)
            .with_map(|x: &i64, emit: &mut dyn FnMut(i64, i64)| {
                emit(*x % 2, *x);
                Ok(())
            })
            .with_container_factory(|m, r| HashContainer::with_factory(m, r, || Associative::new(|a, b| a + b, 0)));

        let mut debug = DebugMapReduce::new(mr);
        let result = debug.run(&(0..10).collect::<Vec<i64>>()).unwrap();
        assert_eq!(result.len(), 2);
        assert!(debug.task_count("map").unwrap() > 0);
        assert!(debug.task_count("reduce").unwrap() > 0);
        assert!(!debug.phase_durations().is_empty());
    }
}

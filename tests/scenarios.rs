//! End-to-end scenario tests against the literal seeds this crate is
//! expected to reproduce: word-count, linear regression, matrix-multiply,
//! and k-means-one-step.

use numamr::combiners::{Associative, Combined, Combiner, CombinerValue};
use numamr::config::Config;
use numamr::container::{ArrayContainer, Container, HashContainer};
use numamr::testing::{assert_kv_multisets_equal, assert_sorted_by};
use numamr::{MapReduce, WorkerPool};

fn config(workers: usize) -> Config {
    Config::builder().worker_count(workers).build().unwrap()
}

fn sum_factory() -> impl Fn() -> Associative<i64, fn(i64, i64) -> i64> + Clone + Send + Sync + 'static {
    || Associative::new(|a, b| a + b, 0)
}

#[test]
fn word_count_over_a_sentence() {
    let words: Vec<String> = "a a b".split_whitespace().map(str::to_string).collect();

    let mr: MapReduce<String, String, i64, HashContainer<String, i64, _, _>> = MapReduce::new(config(4))
        .with_map(|w: &String, emit: &mut dyn FnMut(String, i64)| {
            emit(w.to_uppercase(), 1);
            Ok(())
        })
        .with_container_factory(move |m, r| HashContainer::with_factory(m, r, sum_factory()));

    let result = mr.run(&words).unwrap();
    assert_kv_multisets_equal(result, vec![("A".to_string(), 2), ("B".to_string(), 1)]);

    let sorted = mr.run_sorted(&words, |a, b| a.1.cmp(&b.1)).unwrap();
    assert_eq!(sorted, vec![("B".to_string(), 1), ("A".to_string(), 2)]);
}

#[test]
fn linear_regression_accumulators_over_three_points() {
    // keys: SX=0, SY=1, SXX=2, SYY=3, SXY=4
    let points = vec![(1i64, 1i64), (2, 2), (3, 3)];

    let mr: MapReduce<(i64, i64), usize, i64, ArrayContainer<i64, _, _>> = MapReduce::new(config(2))
        .with_map(|&(x, y): &(i64, i64), emit: &mut dyn FnMut(usize, i64)| {
            emit(0, x);
            emit(1, y);
            emit(2, x * x);
            emit(3, y * y);
            emit(4, x * y);
            Ok(())
        })
        .with_container_factory(move |m, r| ArrayContainer::with_factory(5, m, r, sum_factory()));

    let result = mr.run(&points).unwrap();
    assert_kv_multisets_equal(result, vec![(0, 6), (1, 6), (2, 14), (3, 14), (4, 14)]);
}

/// A per-cluster `(count, sum)` accumulator for one step of 1-D k-means.
#[derive(Clone, Copy)]
struct ClusterStats {
    count: i64,
    sum: i64,
}

impl Combiner<ClusterStats> for ClusterStats {
    type Combined = Self;

    fn add(&mut self, v: ClusterStats) {
        self.count += v.count;
        self.sum += v.sum;
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn into_combined(self) -> Self {
        self
    }
}

impl Combined<ClusterStats> for ClusterStats {
    fn merge(&mut self, other: Self) {
        self.count += other.count;
        self.sum += other.sum;
    }

    fn next(&mut self) -> Option<ClusterStats> {
        if self.count == 0 && self.sum == 0 {
            return None;
        }
        let out = *self;
        self.count = 0;
        self.sum = 0;
        Some(out)
    }

    fn reset(&mut self) {}

    fn size(&self) -> usize {
        usize::from(self.count != 0 || self.sum != 0)
    }

    fn clear(&mut self) {
        self.count = 0;
        self.sum = 0;
    }
}

impl CombinerValue for ClusterStats {}

#[test]
fn k_means_one_step_assigns_points_to_nearest_mean() {
    let points = vec![1i64, 2, 10];
    let means = [1i64, 10];

    let mr: MapReduce<i64, usize, ClusterStats, ArrayContainer<ClusterStats, ClusterStats, _>> = MapReduce::new(config(2))
        .with_map(move |&p: &i64, emit: &mut dyn FnMut(usize, ClusterStats)| {
            let cluster = if (p - means[0]).abs() <= (p - means[1]).abs() { 0 } else { 1 };
            emit(cluster, ClusterStats { count: 1, sum: p });
            Ok(())
        })
        .with_container_factory(move |m, r| ArrayContainer::with_factory(2, m, r, || ClusterStats { count: 0, sum: 0 }));

    let mut result: Vec<(usize, ClusterStats)> =
        mr.run(&points).unwrap().into_iter().fold(Vec::new(), |mut acc: Vec<(usize, ClusterStats)>, (k, v)| {
            if let Some(existing) = acc.iter_mut().find(|(ek, _)| *ek == k) {
                existing.1.add(v);
            } else {
                acc.push((k, v));
            }
            acc
        });
    result.sort_by_key(|(k, _)| *k);

    assert_eq!(result.len(), 2);
    assert_eq!((result[0].1.count, result[0].1.sum), (2, 3));
    assert_eq!((result[1].1.count, result[1].1.sum), (1, 10));

    let new_means: Vec<i64> = result.iter().map(|(_, s)| s.sum / s.count).collect();
    assert_eq!(new_means, vec![1, 10]);
}

#[test]
fn matrix_multiply_via_shared_container() {
    use numamr::container::CommonArrayContainer;
    use std::sync::Arc;

    let a = [[1i64, 2], [3, 4]];
    let b = [[5i64, 6], [7, 8]];

    let cfg = config(2);
    let pool = WorkerPool::new(&cfg).unwrap();
    let container: Arc<CommonArrayContainer<i64, _, _>> = Arc::new(CommonArrayContainer::with_factory(4, 1, || Associative::new(|x, y| x + y, 0)));

    {
        let container = Arc::clone(&container);
        pool.set(
            move |lane| {
                let view = container.shared_view();
                let row = lane;
                for col in 0..2 {
                    let mut acc = 0i64;
                    for k in 0..2 {
                        acc += a[row][k] * b[k][col];
                    }
                    view.add(row * 2 + col, acc);
                }
                Ok(())
            },
            2,
        );
    }
    pool.begin(2);
    pool.wait().unwrap();

    let mut results: Vec<(usize, i64)> = (0..1)
        .flat_map(|r| container.begin(r))
        .map(|(k, mut combined)| (k, combined.next().unwrap()))
        .collect();
    results.sort_by_key(|(k, _)| *k);
    let values: Vec<i64> = results.into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec![19, 22, 43, 50]);
}

#[test]
fn work_stealing_drains_every_task_on_an_eight_worker_pool() {
    let cfg = config(8);
    let input: Vec<i64> = (0..100).collect();

    let mr: MapReduce<i64, i64, i64, HashContainer<i64, i64, _, _>> = MapReduce::new(cfg)
        .with_locator(|_| 0) // every item lands on lane 0's home queue
        .with_map(|x: &i64, emit: &mut dyn FnMut(i64, i64)| {
            emit(*x, 1);
            Ok(())
        })
        .with_container_factory(move |m, r| HashContainer::with_factory(m, r, sum_factory()));

    let result = mr.run(&input).unwrap();
    assert_eq!(result.len(), 100);
    assert_sorted_by(&{
        let mut r = result.clone();
        r.sort();
        r
    }, |a, b| a.0.cmp(&b.0));
}

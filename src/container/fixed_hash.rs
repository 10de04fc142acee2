//! The fixed-hash container: `N` hash buckets, bucket-chains of `(K,
//! combiner)`, each lane owning its own bucketed table.
//!
//! On commit, a lane's bucket-chain vectors transfer into its grid slot.
//! Reduce partition `r` owns a contiguous bucket range — buckets divided
//! evenly across `R`, remainder to the low indices — and for each bucket
//! in range walks every lane's chain, folding entries by key.

use std::cell::UnsafeCell;

use super::{Container, ContainerKey, WriteHandle};
use crate::combiners::{Combined, Combiner, CombinerValue};

fn bucket_of<K: std::hash::Hash>(key: &K, n_buckets: usize) -> usize {
    use std::hash::Hasher;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % n_buckets.max(1)
}

/// `[begin_idx(r), end_idx(r))`: `n_buckets` divided evenly across `r`
/// partitions, with the remainder going to the lowest-indexed partitions.
fn bucket_range(partition: usize, reduce_partitions: usize, n_buckets: usize) -> (usize, usize) {
    let base = n_buckets / reduce_partitions;
    let remainder = n_buckets % reduce_partitions;
    let begin = partition * base + partition.min(remainder);
    let extra = usize::from(partition < remainder);
    (begin, begin + base + extra)
}

/// A map lane's private write view: `N` bucket-chains of `(K, combiner)`.
pub struct FixedHashWriteView<K, C, F> {
    n_buckets: usize,
    buckets: Vec<Vec<(K, C)>>,
    factory: F,
}

impl<K: ContainerKey, V: CombinerValue, C: Combiner<V>, F: Fn() -> C> FixedHashWriteView<K, C, F> {
    pub fn add(&mut self, key: K, value: V) {
        let b = bucket_of(&key, self.n_buckets);
        let chain = &mut self.buckets[b];
        if let Some((_, combiner)) = chain.iter_mut().find(|(k, _)| *k == key) {
            combiner.add(value);
        } else {
            let mut combiner = (self.factory)();
            combiner.add(value);
            chain.push((key, combiner));
        }
    }
}

impl<K: ContainerKey, V: CombinerValue, C: Combiner<V>, F: Fn() -> C> WriteHandle<K, V> for FixedHashWriteView<K, C, F> {
    fn add(&mut self, key: K, value: V) {
        FixedHashWriteView::add(self, key, value)
    }
}

/// Arbitrary-key container bucketed into `N` fixed chains, partitioned by
/// bucket range rather than by individual key hash.
pub struct FixedHashContainer<K, V, C: Combiner<V>, F> {
    n_buckets: usize,
    map_lanes: usize,
    reduce_partitions: usize,
    factory: F,
    // grid[lane * n_buckets + bucket]: lane's chain for that bucket,
    // committed once at that lane's commit.
    grid: Vec<UnsafeCell<Vec<(K, C::Combined)>>>,
    _value: std::marker::PhantomData<V>,
}

// SAFETY: grid[lane * n_buckets + bucket] is written only by `lane`
// during its commit, and read only after the map-phase barrier, per
// bucket range, once per partition's `begin`.
unsafe impl<K: Send, V: Send, C: Combiner<V> + Send, F: Send> Sync for FixedHashContainer<K, V, C, F> {}

impl<K, V, C, F> FixedHashContainer<K, V, C, F>
where
    K: ContainerKey,
    V: CombinerValue,
    C: Combiner<V>,
    F: Fn() -> C + Send + Sync + Clone,
{
    #[must_use]
    pub fn with_factory(n_buckets: usize, map_lanes: usize, reduce_partitions: usize, factory: F) -> Self {
        let map_lanes = map_lanes.max(1);
        let grid = (0..n_buckets * map_lanes).map(|_| UnsafeCell::new(Vec::new())).collect();
        Self {
            n_buckets,
            map_lanes,
            reduce_partitions: reduce_partitions.max(1),
            factory,
            grid,
            _value: std::marker::PhantomData,
        }
    }

    fn cell(&self, lane: usize, bucket: usize) -> &UnsafeCell<Vec<(K, C::Combined)>> {
        &self.grid[lane * self.n_buckets + bucket]
    }
}

impl<K, V, C, F> Container<K, V> for FixedHashContainer<K, V, C, F>
where
    K: ContainerKey,
    V: CombinerValue,
    C: Combiner<V> + 'static,
    F: Fn() -> C + Send + Sync + Clone + 'static,
{
    type Handle = FixedHashWriteView<K, C, F>;
    type Combined = C::Combined;

    fn get(&self, _lane: usize) -> Self::Handle {
        FixedHashWriteView {
            n_buckets: self.n_buckets,
            buckets: (0..self.n_buckets).map(|_| Vec::new()).collect(),
            factory: self.factory.clone(),
        }
    }

    fn add(&self, lane: usize, handle: Self::Handle) {
        for (bucket, chain) in handle.buckets.into_iter().enumerate() {
            if chain.is_empty() {
                continue;
            }
            let combined_chain = chain.into_iter().map(|(k, c)| (k, c.into_combined())).collect();
            // SAFETY: lane `lane` is the sole writer of its grid row.
            unsafe { *self.cell(lane, bucket).get() = combined_chain };
        }
    }

    fn begin(&self, partition: usize) -> Vec<(K, Self::Combined)> {
        let (begin, end) = bucket_range(partition, self.reduce_partitions, self.n_buckets);
        let mut merged: std::collections::HashMap<K, C::Combined> = std::collections::HashMap::new();
        for bucket in begin..end {
            for lane in 0..self.map_lanes {
                // SAFETY: called only after every lane's commit; each
                // bucket belongs to exactly one partition's range, so no
                // other `begin` call touches this cell concurrently.
                let chain = std::mem::take(unsafe { &mut *self.cell(lane, bucket).get() });
                for (key, combined) in chain {
                    use std::collections::hash_map::Entry;
                    match merged.entry(key) {
                        Entry::Occupied(mut e) => e.get_mut().merge(combined),
                        Entry::Vacant(e) => {
                            e.insert(combined);
                        }
                    }
                }
            }
        }
        merged.into_iter().collect()
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
    fn bucket_ranges_partition_evenly_with_remainder_low() {
        assert_eq!(bucket_range(0, 3, 10), (0, 4));
        assert_eq!(bucket_range(1, 3, 10), (4, 7));
        assert_eq!(bucket_range(2, 3, 10), (7, 10));
    }

    #[test]
    fn keys_are_grouped_and_summed_within_a_partition() {
        let c = FixedHashContainer::<&str, i64, _, _>::with_factory(8, 1, 2, sum_factory());
        let mut h = c.get(0);
        h.add("a", 1);
        h.add("a", 1);
        h.add("b", 1);
        c.add(0, h);
        let total: i64 = (0..2)
            .flat_map(|r| c.begin(r))
            .map(|(_, mut combined)| combined.next().unwrap())
            .sum();
        assert_eq!(total, 3);
    }
}

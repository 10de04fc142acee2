//! The container family: the (R × M) grid of per-lane partial states that
//! bridges the map and reduce phases.
//!
//! Every variant implements the same protocol: a map lane gets a private
//! write view with [`Container::get`], drains it into the grid with
//! [`Container::add`] (which consumes the handle — the lane may not reuse
//! it), and a reduce lane walks a partition's merged entries with
//! [`Container::begin`]. No two map lanes ever write the same grid cell;
//! `begin(r)` returns every key routed to partition `r`, with per-key
//! combiners already folded across lanes.

pub mod array;
pub mod common_array;
pub mod fixed_hash;
pub mod hash;
mod open_hash;

pub use array::ArrayContainer;
pub use common_array::CommonArrayContainer;
pub use fixed_hash::FixedHashContainer;
pub use hash::HashContainer;

use crate::combiners::{Combined, CombinerValue};

/// A type usable as an intermediate key: hashable, comparable, and cheap
/// enough to move between lanes.
pub trait ContainerKey: CombinerValue + Eq + std::hash::Hash {}
impl<T: CombinerValue + Eq + std::hash::Hash> ContainerKey for T {}

/// The shared container protocol (§4.G). `K` is the intermediate key type,
/// `V` the value type flowing through the combiner; `Self::Combined` is
/// the reduce-side snapshot type reduce workers iterate.
///
/// `begin` returns a materialised `Vec` rather than a streaming iterator:
/// every variant's reduce-side fold already has to visit every lane's
/// contribution to a partition before it can yield a complete combined
/// entry for a key (the last lane folded in might hold the only value for
/// some key), so nothing is lost by collecting eagerly, and it keeps the
/// per-variant code free of lifetime-threading for an iterator type.
///
/// `init(M, R)` (§4.G's pseudocode) is deliberately not a trait method:
/// the array and common-array variants also need a fixed key-space size
/// `N` that the hash/fixed-hash variants don't, so each variant exposes
/// its own constructor (`with_factory`, `with_factory_and_size`, ...)
/// instead of forcing one signature on every shape. The driver is built
/// against an already-constructed container value, not against a
/// `Container::new`.
pub trait Container<K, V>: Send + Sync
where
    K: ContainerKey,
    V: CombinerValue,
{
    /// A lane's private write view, returned by `get` and consumed by `add`.
    type Handle: Send;
    /// The reduce-side snapshot type yielded by `begin`.
    type Combined: Combined<V>;

    /// Borrow `lane`'s private write view for this map round.
    fn get(&self, lane: usize) -> Self::Handle;

    /// Commit `lane`'s drained write view into the grid. `handle` is
    /// consumed; the write view it came from may not be used again.
    fn add(&self, lane: usize, handle: Self::Handle);

    /// All `(key, combined)` entries routed to reduce partition `r`,
    /// folded across every lane that wrote to it.
    fn begin(&self, partition: usize) -> Vec<(K, Self::Combined)>;
}

/// Uniform map-phase write surface over a container's per-lane handle.
///
/// Kept separate from [`Container::Handle`] itself (rather than as a
/// supertrait bound on `Handle`) because [`CommonArrayContainer`]'s handle
/// is `()` -- its writes go through `shared_view()` instead, outside the
/// generic driver's `Fn(&T, &mut dyn FnMut(K, V))` map-closure protocol.
pub trait WriteHandle<K, V> {
    fn add(&mut self, key: K, value: V);
}

/// `partition(k) = hash(k) mod R`, the routing function for hashed-key
/// container variants.
pub(crate) fn hash_partition<K: std::hash::Hash>(key: &K, reduce_partitions: usize) -> usize {
    use std::hash::Hasher;
    // `DefaultHasher::new()` is SipHash with a fixed, documented seed, so
    // routing the same key twice in one run (or across runs) lands on the
    // same partition -- unlike `RandomState`, which reseeds per instance.
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % reduce_partitions.max(1)
}

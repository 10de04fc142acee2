//! # numamr
//!
//! A **shared-memory, NUMA-aware MapReduce runtime** for single-machine data
//! parallelism, in the spirit of Phoenix/Phoenix++. `numamr` drives a
//! user-supplied (map, combine, reduce) computation over an in-memory input
//! slice, fanning it out across every CPU core of one multi-socket machine
//! while respecting NUMA locality, then hands back a materialized sequence
//! of key/value pairs.
//!
//! ## Key Features
//!
//! - **Phase-sequenced driver** - map -> reduce -> merge, with fan-out sized
//!   to the input and worker count
//! - **Pinned worker pool** - fixed-size, CPU-affine threads released one
//!   round at a time via a barrier, no dynamic growth
//! - **Locality-aware task queue** - per-lane sub-queues, locality-hinted
//!   enqueue, work stealing on dequeue
//! - **A container family** - hash, array, common-array, and fixed-hash
//!   intermediate storage, trading memory, contention, and key cardinality
//!   differently
//! - **A combiner family** - buffer, associative, and must-reduce
//!   accumulation strategies, chosen independently of container shape
//! - **Optional metrics** - per-phase timing and task counts, folded into a
//!   [`RunReport`] (feature: `metrics`, default-on)
//!
//! ## Quick Start
//!
//! ```
//! use numamr::{Config, MapReduce};
//! use numamr::combiners::Associative;
//! use numamr::container::HashContainer;
//!
//! # fn main() -> anyhow::Result<()> {
//! let words = vec!["a".to_string(), "a".to_string(), "b".to_string()];
//!
//! let mr: MapReduce<String, String, i64, HashContainer<String, i64, _, _>> =
//!     MapReduce::new(Config::builder().worker_count(4).build()?)
//!         .with_map(|w: &String, emit: &mut dyn FnMut(String, i64)| {
//!             emit(w.clone(), 1);
//!             Ok(())
//!         })
//!         .with_container_factory(|lanes, partitions| {
//!             HashContainer::with_factory(lanes, partitions, || Associative::new(|a, b| a + b, 0))
//!         });
//!
//! let mut counts = mr.run(&words)?;
//! counts.sort();
//! assert_eq!(counts, vec![("a".to_string(), 2), ("b".to_string(), 1)]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### `MapReduce<T, K, V, Cnt>`
//!
//! A [`MapReduce`] driver owns an immutable [`Config`] and a container
//! factory; a single `run` call spins up a fresh [`WorkerPool`], task
//! queues, and intermediate container, and tears all three down again
//! before returning. Nothing about a run survives past its own `run` call
//! -- a driver is reusable across any number of invocations, including
//! after a prior run returned an error.
//!
//! ### The container family
//!
//! The [`container`] module is the intermediate (R x M) grid bridging the
//! map and reduce phases:
//! - [`container::HashContainer`] - arbitrary hashable keys, flexible cardinality
//! - [`container::ArrayContainer`] - fixed-cardinality `usize` keys, contention-free
//! - [`container::CommonArrayContainer`] - fixed-cardinality, shared-writer, for
//!   computations (e.g. matrix multiply) where the host already partitions writes
//! - [`container::FixedHashContainer`] - N fixed hash buckets, partitioned by bucket range
//!
//! ### The combiner family
//!
//! The [`combiners`] module supplies per-key accumulation strategies
//! independent of container shape:
//! - [`combiners::Associative`] - fold with an associative, commutative function (sum, min, max)
//! - [`combiners::Buffer`] - retain every value, unmerged, for later iteration
//! - [`combiners::MustReduceBuffer`] - buffer until first read, then lazily fold once
//!
//! ### Worker pool and task queue
//!
//! [`WorkerPool`] pins one thread per lane to a CPU chosen by
//! [`config::SchedulingPolicy`], and releases them one round at a time.
//! [`queue::TaskQueue`] gives each lane a home sub-queue (locality-hinted
//! enqueue, FIFO dequeue) with cyclic LIFO stealing from other lanes when a
//! lane's own queue runs dry.
//!
//! ### Execution
//!
//! - [`MapReduce::run`] - map, reduce, merge; unordered result
//! - [`MapReduce::run_sorted`] - additionally sorts the result with a
//!   caller-supplied comparator via a stable per-lane sort and balanced
//!   2-way merge tree
//! - [`MapReduce::run_with_report`] / [`MapReduce::run_sorted_with_report`]
//!   (feature: `metrics`) - same, plus a [`RunReport`] of per-phase timing
//!   and task counts
//! - [`MapReduce::run_from_splitter`] / `_sorted` / `_with_report` - like the
//!   above, but the input is drained from a [`MapReduce::with_splitter`]
//!   callback instead of a caller-owned slice
//!
//! ## Environment Variables
//!
//! `MR_NUMTHREADS` - default worker count when [`Config`] doesn't specify
//! one explicitly. Unset or non-positive falls back to the host's CPU count.
//!
//! ## Feature Flags
//!
//! - `metrics` - per-phase timing, task counts, and `RunReport` (enabled by default)
//!
//! ## Testing Your Pipelines
//!
//! The [`testing`] module provides assertions, test data builders, and a
//! debug wrapper tailored to key/value multisets:
//!
//! ```
//! use numamr::testing::assert_kv_multisets_equal;
//!
//! assert_kv_multisets_equal(
//!     vec![("b".to_string(), 1), ("a".to_string(), 2)],
//!     vec![("a".to_string(), 2), ("b".to_string(), 1)],
//! );
//! ```
//!
//! ## Module Overview
//!
//! - [`driver`] - the `MapReduce` phase sequencer
//! - [`config`] - process-scoped configuration and its builder
//! - [`container`] - the intermediate key/value container family
//! - [`combiners`] - the per-key accumulation strategy family
//! - [`pool`] - the pinned worker pool and its run/wait barrier
//! - [`queue`] - the per-lane task queue with locality routing and stealing
//! - [`scheduler`] - thread-index to CPU mapping policies
//! - [`platform`] - CPU count, CPU affinity, and NUMA-locality queries
//! - [`sync`] - lock primitives selectable via `config::LockKind`
//! - [`rng`] - the per-lane RNG used for unhinted task routing
//! - [`error`] - the crate-wide error type
//! - [`metrics`] - metrics collection and per-phase reporting (feature: `metrics`)
//! - [`testing`] - assertions, data builders, and debug helpers for tests

pub mod combiners;
pub mod config;
pub mod container;
pub mod driver;
pub mod error;
pub mod platform;
pub mod pool;
pub mod queue;
pub mod rng;
pub mod scheduler;
pub mod sync;
pub mod testing;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use config::{Config, ConfigBuilder, LockKind, SchedulingPolicy};
pub use driver::MapReduce;
pub use error::MrError;
pub use pool::WorkerPool;

#[cfg(feature = "metrics")]
pub use metrics::RunReport;

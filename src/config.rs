//! Process-scoped configuration for a [`crate::driver::MapReduce`] run.
//!
//! Mirrors the shape of the source's `MapReduce()` constructor: worker
//! count defaults from the `MR_NUMTHREADS` environment variable, falling
//! back to the host's CPU count, and every other knob has a sensible
//! default. A `Config` is immutable once built.

use crate::error::MrError;
use crate::platform;

/// Thread-index → CPU mapping strategy. See [`crate::scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingPolicy {
    /// `(lane + offset) mod cpus`. The default.
    StrandFill,
    /// Spread across physical cores before sibling threads.
    CoreFill,
    /// Spread across sockets (locality groups) before cores.
    ChipFill,
}

/// Lock back-end used by the task queue and lane-partitioned containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// Classical mutex. The default.
    Mutex,
    /// Queue-based (MCS) lock, for very-high-contention paths.
    QueueLock,
}

/// Immutable, validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub worker_count: usize,
    pub scheduling_policy: SchedulingPolicy,
    pub thread_offset: usize,
    pub lock_kind: LockKind,
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::default().build().expect("default config is always valid")
    }
}

impl Config {
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Fluent builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    worker_count: Option<usize>,
    scheduling_policy: SchedulingPolicy,
    thread_offset: usize,
    lock_kind: LockKind,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            worker_count: None,
            scheduling_policy: SchedulingPolicy::StrandFill,
            thread_offset: 0,
            lock_kind: LockKind::Mutex,
        }
    }
}

impl ConfigBuilder {
    #[must_use]
    pub fn worker_count(mut self, n: usize) -> Self {
        self.worker_count = Some(n);
        self
    }

    #[must_use]
    pub fn scheduling_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.scheduling_policy = policy;
        self
    }

    #[must_use]
    pub fn thread_offset(mut self, offset: usize) -> Self {
        self.thread_offset = offset;
        self
    }

    #[must_use]
    pub fn lock_kind(mut self, kind: LockKind) -> Self {
        self.lock_kind = kind;
        self
    }

    /// Validate and build the final `Config`.
    ///
    /// Falls back to `MR_NUMTHREADS`, then CPU count, if no explicit
    /// `worker_count` was set. Rejects `worker_count == 0`: a zero-worker
    /// pool can never drain its own queue.
    pub fn build(self) -> anyhow::Result<Config> {
        let worker_count = self.worker_count.unwrap_or_else(worker_count_from_env_or_cpus);
        if worker_count == 0 {
            return Err(MrError::invariant("worker_count must be at least 1").into());
        }
        Ok(Config {
            worker_count,
            scheduling_policy: self.scheduling_policy,
            thread_offset: self.thread_offset,
            lock_kind: self.lock_kind,
        })
    }
}

fn worker_count_from_env_or_cpus() -> usize {
    std::env::var("MR_NUMTHREADS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| n as usize)
        .unwrap_or_else(platform::cpu_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_at_least_one_worker() {
        let cfg = Config::default();
        assert!(cfg.worker_count >= 1);
        assert_eq!(cfg.scheduling_policy, SchedulingPolicy::StrandFill);
        assert_eq!(cfg.lock_kind, LockKind::Mutex);
        assert_eq!(cfg.thread_offset, 0);
    }

    #[test]
    fn builder_overrides_worker_count() {
        let cfg = Config::builder().worker_count(4).build().unwrap();
        assert_eq!(cfg.worker_count, 4);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = Config::builder().worker_count(0).build();
        assert!(err.is_err());
    }

    #[test]
    fn env_override_wins_over_cpu_count() {
        // This test mutates process-global env state; safe here because
        // the test harness runs each test file's tests in one process but
        // this module doesn't run concurrently with others touching
        // MR_NUMTHREADS.
        unsafe {
            std::env::set_var("MR_NUMTHREADS", "3");
        }
        let n = worker_count_from_env_or_cpus();
        unsafe {
            std::env::remove_var("MR_NUMTHREADS");
        }
        assert_eq!(n, 3);
    }

    #[test]
    fn non_positive_env_falls_back_to_cpu_count() {
        unsafe {
            std::env::set_var("MR_NUMTHREADS", "0");
        }
        let n = worker_count_from_env_or_cpus();
        unsafe {
            std::env::remove_var("MR_NUMTHREADS");
        }
        assert_eq!(n, platform::cpu_count());
    }
}

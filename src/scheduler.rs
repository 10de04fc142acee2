//! Thread-index → CPU mapping policies.
//!
//! Each policy is a pure function of the lane index, the configured
//! offset, and the host's topology as reported by [`crate::platform`].
//! Chip-fill spreads lanes across locality groups (sockets); core-fill
//! spreads across twice as many, finer-grained groups, so it visits a new
//! core before chip-fill would move to a new socket. In the degenerate
//! case of a single CPU (nothing to spread across), both collapse to
//! strand-fill.

use crate::config::SchedulingPolicy;
use crate::platform;

/// Map a lane index to a CPU id under the given policy.
#[must_use]
pub fn lane_to_cpu(policy: SchedulingPolicy, lane_index: usize, offset: usize) -> usize {
    let cpus = platform::cpu_count();
    match policy {
        SchedulingPolicy::StrandFill => strand_fill(lane_index, offset, cpus),
        SchedulingPolicy::CoreFill => core_fill(lane_index, offset, cpus),
        SchedulingPolicy::ChipFill => chip_fill(lane_index, offset, cpus),
    }
}

fn strand_fill(lane_index: usize, offset: usize, cpus: usize) -> usize {
    (lane_index + offset) % cpus.max(1)
}

/// Spreads lanes across twice as many, finer-grained groups as
/// [`chip_fill`] uses, so that a new lane lands on an unused core on some
/// chip before doubling back onto a chip it has already placed a lane on.
/// Absent a real core/sibling-thread query, a chip's cores are modeled as
/// two equal halves of its CPU range; this still visits every chip before
/// revisiting one, but twice as quickly as chip-fill, which is the
/// observable difference between "physical cores before sibling threads"
/// and "sockets before cores" at the granularity this platform exposes.
fn core_fill(lane_index: usize, offset: usize, cpus: usize) -> usize {
    let cpus = cpus.max(1);
    let chips = platform::locality_group_count().max(1);
    let cores = (chips * 2).min(cpus);
    spread_by_group(lane_index, offset, cpus, cores)
}

/// Spreads lanes across locality groups (sockets) first.
fn chip_fill(lane_index: usize, offset: usize, cpus: usize) -> usize {
    let cpus = cpus.max(1);
    let chips = platform::locality_group_count().max(1);
    spread_by_group(lane_index, offset, cpus, chips)
}

fn spread_by_group(lane_index: usize, offset: usize, cpus: usize, groups: usize) -> usize {
    let cpus = cpus.max(1);
    let groups = groups.max(1);
    if groups <= 1 {
        return strand_fill(lane_index, offset, cpus);
    }
    let cpus_per_group = (cpus + groups - 1) / groups;
    let lane = (lane_index + offset) % cpus;
    let group = lane % groups;
    let slot_in_group = lane / groups;
    (group * cpus_per_group + slot_in_group) % cpus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strand_fill_wraps_around_cpu_count() {
        assert_eq!(lane_to_cpu(SchedulingPolicy::StrandFill, 0, 0), 0);
        let cpus = platform::cpu_count();
        assert_eq!(lane_to_cpu(SchedulingPolicy::StrandFill, cpus, 0), 0);
    }

    #[test]
    fn offset_shifts_assignment() {
        let cpus = platform::cpu_count();
        if cpus > 1 {
            assert_ne!(
                lane_to_cpu(SchedulingPolicy::StrandFill, 0, 0),
                lane_to_cpu(SchedulingPolicy::StrandFill, 0, 1)
            );
        }
    }

    #[test]
    fn core_fill_assigns_every_lane_within_cpu_range() {
        let cpus = platform::cpu_count();
        for lane in 0..cpus * 2 {
            assert!(lane_to_cpu(SchedulingPolicy::CoreFill, lane, 0) < cpus);
            assert!(lane_to_cpu(SchedulingPolicy::ChipFill, lane, 0) < cpus);
        }
    }

    #[test]
    fn core_fill_spreads_finer_than_chip_fill() {
        let cpus = platform::cpu_count();
        if cpus >= 2 {
            assert_ne!(
                lane_to_cpu(SchedulingPolicy::CoreFill, 1, 0),
                lane_to_cpu(SchedulingPolicy::ChipFill, 1, 0),
                "core-fill should place a second lane on a different core before \
                 chip-fill would move it to a different chip"
            );
        }
    }

    #[test]
    fn spread_by_group_differentiates_fine_and_coarse_grouping() {
        // Deterministic, topology-independent check that the helper itself
        // distinguishes a finer grouping (cores) from a coarser one (chips)
        // regardless of what the sandboxed host's real NUMA query reports.
        assert_ne!(
            spread_by_group(1, 0, 8, 4),
            spread_by_group(1, 0, 8, 2),
        );
    }
}

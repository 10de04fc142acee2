//! Platform adapter: CPU count, CPU affinity, and NUMA-locality queries.
//!
//! Every function here degrades to a sensible single-group, no-binding
//! default when the host platform lacks NUMA facilities or isn't Linux.
//! Placement is an optimization hint, never a correctness dependency: the
//! driver's ordering guarantees hold regardless of what these functions
//! report.

use std::sync::OnceLock;

/// Number of logical CPUs visible to this process.
#[must_use]
pub fn cpu_count() -> usize {
    num_cpus::get().max(1)
}

/// Attempt to pin the calling thread to the given logical CPU.
///
/// Returns `Ok(())` on platforms without affinity support (there is
/// nothing to fail); only a genuine syscall failure on a supported
/// platform is surfaced as an error.
pub fn bind_current_thread_to_cpu(cpu_id: usize) -> anyhow::Result<()> {
    imp::bind_current_thread_to_cpu(cpu_id)
}

/// Number of distinct NUMA locality groups on this host (at least 1).
#[must_use]
pub fn locality_group_count() -> usize {
    *LOCALITY_GROUPS.get_or_init(imp::discover_locality_groups)
}

/// The locality group the calling thread is presently running on.
///
/// With no NUMA facilities (or off Linux) this is always group 0.
#[must_use]
pub fn locality_group_of_current_thread() -> usize {
    imp::locality_group_of_current_thread()
}

/// The locality group that owns the memory behind `ptr`.
///
/// Without a real NUMA query this falls back to hashing the address across
/// the known locality-group count, which is enough to give map tasks a
/// stable, evenly-spread locality hint even on a single-group host.
#[must_use]
pub fn locality_group_of_address(ptr: *const u8) -> usize {
    let groups = locality_group_count();
    if groups <= 1 {
        return 0;
    }
    (ptr as usize / 4096) % groups
}

static LOCALITY_GROUPS: OnceLock<usize> = OnceLock::new();

#[cfg(target_os = "linux")]
mod imp {
    use std::fs;

    pub fn bind_current_thread_to_cpu(cpu_id: usize) -> anyhow::Result<()> {
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            libc::CPU_SET(cpu_id, &mut set);
            let rc = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
            if rc != 0 {
                anyhow::bail!(
                    "sched_setaffinity(cpu={cpu_id}) failed: {}",
                    std::io::Error::last_os_error()
                );
            }
        }
        Ok(())
    }

    pub fn discover_locality_groups() -> usize {
        let Ok(entries) = fs::read_dir("/sys/devices/system/node") else {
            return 1;
        };
        let count = entries
            .filter_map(Result::ok)
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|n| n.starts_with("node") && n[4..].parse::<u32>().is_ok())
            })
            .count();
        count.max(1)
    }

    pub fn locality_group_of_current_thread() -> usize {
        // getcpu(2) reports the NUMA node alongside the running CPU; fall
        // back to group 0 if the syscall is unavailable.
        unsafe {
            let mut cpu: libc::c_uint = 0;
            let mut node: libc::c_uint = 0;
            let rc = libc::syscall(libc::SYS_getcpu, &mut cpu, &mut node, std::ptr::null_mut::<()>());
            if rc == 0 { node as usize } else { 0 }
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    pub fn bind_current_thread_to_cpu(_cpu_id: usize) -> anyhow::Result<()> {
        Ok(())
    }

    pub fn discover_locality_groups() -> usize {
        1
    }

    pub fn locality_group_of_current_thread() -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_count_is_at_least_one() {
        assert!(cpu_count() >= 1);
    }

    #[test]
    fn locality_group_count_is_at_least_one() {
        assert!(locality_group_count() >= 1);
    }

    #[test]
    fn bind_to_cpu_zero_never_errors_out_of_range() {
        // CPU 0 always exists.
        assert!(bind_current_thread_to_cpu(0).is_ok());
    }
}

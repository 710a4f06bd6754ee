//! Worker-count and memory-cap policy
//!
//! The effective worker count is the user's request clamped, in order, by the
//! interactive-session hardware caps, the scheduler CPU allocation, and the
//! number of files, with a floor of one. The memory cap starts from the
//! explicit request (or the governor's derived optimum) and yields to 95% of
//! the scheduler allocation, clamped into the safe range.

use super::JobAllocation;
use crate::util::memory::{optimal_cap_mb, MAX_MEMORY_MB, MIN_MEMORY_MB};

/// Hardware concurrency with the conventional fallback of 4.
pub fn hardware_cores() -> usize {
    let cores = num_cpus::get();
    if cores == 0 {
        4
    } else {
        cores
    }
}

/// Effective worker count for a batch of `file_count` files.
pub fn safe_worker_count(requested: usize, file_count: usize, alloc: &JobAllocation) -> usize {
    safe_worker_count_on(requested, file_count, alloc, hardware_cores())
}

/// Policy body with the core count injected.
pub fn safe_worker_count_on(
    requested: usize,
    file_count: usize,
    alloc: &JobAllocation,
    cores: usize,
) -> usize {
    let mut max_safe = requested;

    let has_job_cpu_limit = alloc.in_job() && alloc.cpus.is_some();
    if !has_job_cpu_limit {
        // Interactive session or head node: cap by hardware class
        let reasonable = if cores >= 32 {
            (cores / 2).min(32)
        } else if cores >= 16 {
            (cores / 2).min(16)
        } else {
            cores.min(8)
        };
        if requested > reasonable {
            max_safe = reasonable;
        }
    }

    if let Some(cpus) = alloc.cpus {
        if cpus > 0 {
            max_safe = max_safe.min(cpus as usize);
        }
    }

    max_safe = max_safe.min(file_count);
    max_safe.max(1)
}

/// Effective memory cap in MB.
pub fn safe_memory_limit_mb(requested_mb: u64, workers: usize, alloc: &JobAllocation) -> u64 {
    let mut calculated = if requested_mb == 0 {
        optimal_cap_mb(workers, 0)
    } else {
        requested_mb
    };

    if let Some(job_mb) = alloc.memory_mb {
        if job_mb > 0 {
            // 5% headroom for system processes inside the allocation
            calculated = calculated.min(job_mb * 95 / 100);
        }
    }

    calculated.clamp(MIN_MEMORY_MB, MAX_MEMORY_MB)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerKind;

    fn slurm_alloc(cpus: Option<u32>, memory_mb: Option<u64>) -> JobAllocation {
        JobAllocation {
            kind: SchedulerKind::Slurm,
            job_id: "42".into(),
            cpus,
            memory_mb,
            ..JobAllocation::default()
        }
    }

    #[test]
    fn test_scheduler_clamp_scenario() {
        // SLURM job with 4 CPUs and 2048 MB; user asks for 16 workers / 8000 MB
        let alloc = slurm_alloc(Some(4), Some(2048));
        let workers = safe_worker_count_on(16, 100, &alloc, 32);
        assert_eq!(workers, 4);
        let memory = safe_memory_limit_mb(8000, workers, &alloc);
        assert_eq!(memory, 2048 * 95 / 100);
    }

    #[test]
    fn test_interactive_hardware_caps() {
        let none = JobAllocation::default();
        // 64 cores: half, capped at 32
        assert_eq!(safe_worker_count_on(64, 1000, &none, 64), 32);
        // 24 cores: half, capped at 16
        assert_eq!(safe_worker_count_on(24, 1000, &none, 24), 12);
        // 8 cores: capped at 8
        assert_eq!(safe_worker_count_on(16, 1000, &none, 8), 8);
        // Modest requests pass through untouched
        assert_eq!(safe_worker_count_on(2, 1000, &none, 8), 2);
    }

    #[test]
    fn test_never_more_workers_than_files() {
        let none = JobAllocation::default();
        assert_eq!(safe_worker_count_on(8, 3, &none, 16), 3);
        assert_eq!(safe_worker_count_on(8, 0, &none, 16), 1);
    }

    #[test]
    fn test_memory_clamps() {
        let none = JobAllocation::default();
        assert_eq!(safe_memory_limit_mb(100, 4, &none), MIN_MEMORY_MB);
        assert_eq!(safe_memory_limit_mb(1 << 20, 4, &none), MAX_MEMORY_MB);
        // Auto mode derives something inside the range
        let auto = safe_memory_limit_mb(0, 4, &none);
        assert!(auto >= MIN_MEMORY_MB && auto <= MAX_MEMORY_MB);
    }
}

//! Byte-budget memory governor
//!
//! Processing a file reserves an estimate of its working-set bytes up front
//! and releases them when the file is finished. The governor keeps the
//! process-wide total under a cap so that a large batch on a shared login
//! node or inside a scheduler allocation cannot exhaust the machine.
//!
//! The cap is advisory: `set_cap_mb` does not synchronize against in-flight
//! reservations, it only changes the bound future `can_reserve` calls see.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default memory limit when detection fails: 4 GB
pub const DEFAULT_MEMORY_MB: u64 = 4096;
/// Minimum safe memory limit: 1 GB
pub const MIN_MEMORY_MB: u64 = 1024;
/// Maximum memory limit: 32 GB
pub const MAX_MEMORY_MB: u64 = 32768;

/// Thread-safe tracker of reserved processing bytes with peak recording.
#[derive(Debug)]
pub struct MemoryGovernor {
    current_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    cap_bytes: AtomicUsize,
}

impl MemoryGovernor {
    pub fn new(cap_mb: u64) -> Self {
        Self {
            current_bytes: AtomicUsize::new(0),
            peak_bytes: AtomicUsize::new(0),
            cap_bytes: AtomicUsize::new((cap_mb as usize) * 1024 * 1024),
        }
    }

    /// Whether reserving `bytes` more would stay under the cap.
    pub fn can_reserve(&self, bytes: usize) -> bool {
        self.current_bytes.load(Ordering::Relaxed) + bytes < self.cap_bytes.load(Ordering::Relaxed)
    }

    /// Record a reservation and update the peak.
    ///
    /// The peak update loops on compare-exchange so concurrent maxima from
    /// different workers are never lost.
    pub fn reserve(self: &Arc<Self>, bytes: usize) -> Reservation {
        let new_usage = self.current_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let mut current_peak = self.peak_bytes.load(Ordering::Relaxed);
        while new_usage > current_peak {
            match self.peak_bytes.compare_exchange_weak(
                current_peak,
                new_usage,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current_peak = observed,
            }
        }
        Reservation {
            governor: Arc::clone(self),
            bytes,
        }
    }

    fn release(&self, bytes: usize) {
        self.current_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    pub fn current_usage(&self) -> usize {
        self.current_bytes.load(Ordering::Relaxed)
    }

    pub fn peak_usage(&self) -> usize {
        self.peak_bytes.load(Ordering::Relaxed)
    }

    pub fn cap(&self) -> usize {
        self.cap_bytes.load(Ordering::Relaxed)
    }

    /// Advisory cap update; not synchronized against in-flight reservations.
    pub fn set_cap_mb(&self, cap_mb: u64) {
        self.cap_bytes
            .store((cap_mb as usize) * 1024 * 1024, Ordering::Relaxed);
    }
}

/// RAII reservation returned by [`MemoryGovernor::reserve`]; releases on drop.
#[derive(Debug)]
pub struct Reservation {
    governor: Arc<MemoryGovernor>,
    bytes: usize,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.governor.release(self.bytes);
    }
}

/// Total physical memory in MB.
///
/// Asks `sysconf` first and falls back to `/proc/meminfo`; if both fail the
/// default limit is returned so callers never see zero.
pub fn system_memory_mb() -> u64 {
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) };
    if pages > 0 && page_size > 0 {
        return (pages as u64 * page_size as u64) / (1024 * 1024);
    }

    if let Ok(meminfo) = fs::read_to_string("/proc/meminfo") {
        for line in meminfo.lines() {
            if let Some(rest) = line.strip_prefix("MemTotal:") {
                let kb: u64 = rest
                    .split_whitespace()
                    .next()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(0);
                if kb > 0 {
                    return kb / 1024;
                }
            }
        }
    }

    DEFAULT_MEMORY_MB
}

/// Derive a memory cap from the worker count and available RAM.
///
/// More workers justify a larger share of the machine; inside a batch job
/// the share is scaled down to leave room for the co-scheduled workload.
pub fn optimal_cap_mb(workers: usize, system_mb: u64) -> u64 {
    let system_mb = if system_mb == 0 {
        system_memory_mb()
    } else {
        system_mb
    };

    let percentage = if workers <= 4 {
        0.3
    } else if workers <= 8 {
        0.4
    } else if workers <= 16 {
        0.5
    } else {
        0.6
    };

    let in_cluster = ["SLURM_JOB_ID", "PBS_JOBID", "SGE_JOB_ID", "LSB_JOBID"]
        .iter()
        .any(|var| std::env::var_os(var).is_some());

    let mut calculated = (system_mb as f64 * percentage) as u64;
    if in_cluster {
        calculated = (calculated as f64 * 0.7) as u64;
    }

    calculated.clamp(MIN_MEMORY_MB, MAX_MEMORY_MB)
}

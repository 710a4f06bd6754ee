//! Batch-scheduler detection
//!
//! When the process runs inside a scheduler allocation the batch system, not
//! the hardware, decides how many CPUs and how much memory we may use. This
//! module identifies the scheduler from its environment variables and
//! normalizes the allocation into a single [`JobAllocation`] record.
//!
//! Detection is a pure function of the environment: the same variables always
//! produce the same record, and every accessor is routed through an injected
//! getter so tests can supply a synthetic environment.

pub mod policy;

use crate::util::numeric::{parse_f64, parse_memory_mb};

/// The batch system controlling this process, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    None,
    Slurm,
    Pbs,
    Sge,
    Lsf,
    UnknownCluster,
}

impl SchedulerKind {
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerKind::None => "None",
            SchedulerKind::Slurm => "SLURM",
            SchedulerKind::Pbs => "PBS/Torque",
            SchedulerKind::Sge => "SGE/OGS",
            SchedulerKind::Lsf => "LSF",
            SchedulerKind::UnknownCluster => "Unknown cluster",
        }
    }
}

/// Normalized description of the current batch job's allocation.
#[derive(Debug, Clone)]
pub struct JobAllocation {
    pub kind: SchedulerKind,
    pub job_id: String,
    /// Allocated CPUs; `None` when the scheduler exposed no explicit limit.
    pub cpus: Option<u32>,
    /// Allocated memory in MB; `None` when no explicit limit was found.
    pub memory_mb: Option<u64>,
    pub nodes: u32,
    pub tasks_per_node: Option<u32>,
    pub partition: String,
    pub account: String,
}

impl Default for JobAllocation {
    fn default() -> Self {
        Self {
            kind: SchedulerKind::None,
            job_id: String::new(),
            cpus: None,
            memory_mb: None,
            nodes: 1,
            tasks_per_node: None,
            partition: String::new(),
            account: String::new(),
        }
    }
}

impl JobAllocation {
    pub fn in_job(&self) -> bool {
        self.kind != SchedulerKind::None
    }
}

/// Detect the current job allocation from the process environment.
pub fn detect() -> JobAllocation {
    detect_with(&|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
}

/// Detect using an arbitrary environment getter.
pub fn detect_with(env: &dyn Fn(&str) -> Option<String>) -> JobAllocation {
    match scheduler_kind(env) {
        SchedulerKind::Slurm => detect_slurm(env),
        SchedulerKind::Pbs => detect_pbs(env),
        SchedulerKind::Sge => detect_sge(env),
        SchedulerKind::Lsf => detect_lsf(env),
        kind => JobAllocation {
            kind,
            ..JobAllocation::default()
        },
    }
}

fn scheduler_kind(env: &dyn Fn(&str) -> Option<String>) -> SchedulerKind {
    if env("SLURM_JOB_ID").is_some() {
        return SchedulerKind::Slurm;
    }
    if env("PBS_JOBID").is_some() || env("PBS_JOB_ID").is_some() {
        return SchedulerKind::Pbs;
    }
    if env("JOB_ID").is_some() || env("SGE_JOB_ID").is_some() {
        return SchedulerKind::Sge;
    }
    if env("LSB_JOBID").is_some() || env("LSF_JOB_ID").is_some() {
        return SchedulerKind::Lsf;
    }
    if env("BATCH_JOB_ID").is_some() || env("QUEUE").is_some() || env("CLUSTER_NAME").is_some() {
        return SchedulerKind::UnknownCluster;
    }
    SchedulerKind::None
}

fn env_u64(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    env(key).and_then(|v| v.trim().parse().ok())
}

fn detect_slurm(env: &dyn Fn(&str) -> Option<String>) -> JobAllocation {
    let mut alloc = JobAllocation {
        kind: SchedulerKind::Slurm,
        job_id: env("SLURM_JOB_ID").unwrap_or_default(),
        ..JobAllocation::default()
    };

    let cpus_per_task = env_u64(env, "SLURM_CPUS_PER_TASK").unwrap_or(0);
    let ntasks = env_u64(env, "SLURM_NTASKS").unwrap_or(1);
    if cpus_per_task > 0 {
        alloc.cpus = Some((cpus_per_task * ntasks) as u32);
    } else if let Some(list) = env("SLURM_JOB_CPUS_PER_NODE") {
        let total = parse_cpu_list(&list);
        if total > 0 {
            alloc.cpus = Some(total);
        }
    }

    if let Some(mem) = env("SLURM_MEM_PER_NODE") {
        alloc.memory_mb = parse_memory_mb(&mem, false);
    } else if let Some(mem) = env("SLURM_MEM_PER_CPU") {
        if let Some(per_cpu) = parse_memory_mb(&mem, false) {
            let multiplier = alloc.cpus.map(u64::from).unwrap_or(ntasks);
            alloc.memory_mb = Some(per_cpu * multiplier);
        }
    }

    alloc.nodes = env_u64(env, "SLURM_JOB_NUM_NODES").unwrap_or(1) as u32;
    alloc.tasks_per_node = env_u64(env, "SLURM_NTASKS_PER_NODE").map(|n| n as u32);
    alloc.partition = env("SLURM_JOB_PARTITION").unwrap_or_default();
    alloc.account = env("SLURM_JOB_ACCOUNT").unwrap_or_default();
    alloc
}

fn detect_pbs(env: &dyn Fn(&str) -> Option<String>) -> JobAllocation {
    let mut alloc = JobAllocation {
        kind: SchedulerKind::Pbs,
        job_id: env("PBS_JOBID").or_else(|| env("PBS_JOB_ID")).unwrap_or_default(),
        ..JobAllocation::default()
    };

    let ncpus = env_u64(env, "PBS_NUM_PPN")
        .or_else(|| env_u64(env, "PBS_NCPUS"))
        .or_else(|| env_u64(env, "NCPUS"))
        .unwrap_or(0);
    if ncpus > 0 {
        alloc.cpus = Some(ncpus as u32);
    }

    if let Some(list) = env("PBS_RESOURCE_LIST") {
        if let Some(n) = extract_assignment(&list, "ncpus=").and_then(|v| v.parse::<u32>().ok()) {
            alloc.cpus = Some(n);
        }
        if let Some(mem) = extract_assignment(&list, "mem=") {
            alloc.memory_mb = parse_memory_mb(&mem, true);
        }
    }

    if alloc.memory_mb.is_none() {
        if let Some(mem) = env("PBS_RESOURCE_MEM").or_else(|| env("PBS_MEM")) {
            alloc.memory_mb = parse_memory_mb(&mem, true);
        }
    }

    alloc.nodes = env_u64(env, "PBS_NUM_NODES").unwrap_or(1) as u32;
    alloc.partition = env("PBS_QUEUE").unwrap_or_default();
    alloc.account = env("PBS_ACCOUNT").unwrap_or_default();
    alloc
}

fn detect_sge(env: &dyn Fn(&str) -> Option<String>) -> JobAllocation {
    let mut alloc = JobAllocation {
        kind: SchedulerKind::Sge,
        job_id: env("JOB_ID").or_else(|| env("SGE_JOB_ID")).unwrap_or_default(),
        ..JobAllocation::default()
    };

    let nslots = env_u64(env, "NSLOTS")
        .or_else(|| env_u64(env, "SGE_NSLOTS"))
        .unwrap_or(0);
    if nslots > 0 {
        alloc.cpus = Some(nslots as u32);
    }

    if let Some(mem) = env("SGE_MEM").or_else(|| env("MEMORY")) {
        alloc.memory_mb = parse_memory_mb(&mem, false);
    }

    alloc.partition = env("QUEUE").or_else(|| env("PE")).unwrap_or_default();
    alloc.account = env("SGE_ACCOUNT").unwrap_or_default();
    alloc
}

fn detect_lsf(env: &dyn Fn(&str) -> Option<String>) -> JobAllocation {
    let mut alloc = JobAllocation {
        kind: SchedulerKind::Lsf,
        job_id: env("LSB_JOBID").or_else(|| env("LSF_JOB_ID")).unwrap_or_default(),
        ..JobAllocation::default()
    };

    if let Some(n) = env_u64(env, "LSB_MAX_NUM_PROCESSORS") {
        if n > 0 {
            alloc.cpus = Some(n as u32);
        }
    }

    if let Some(mem) = env("LSB_MEM") {
        alloc.memory_mb = parse_memory_mb(&mem, false);
    }

    alloc.partition = env("LSB_QUEUE").unwrap_or_default();
    alloc.account = env("LSB_PROJECT_NAME").unwrap_or_default();
    alloc
}

/// Pull the value of a `key=value` assignment out of a resource-list string.
fn extract_assignment(list: &str, key: &str) -> Option<String> {
    let start = list.find(key)? + key.len();
    let rest = &list[start..];
    let end = rest.find([',', ':']).unwrap_or(rest.len());
    let value = rest[..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Sum a scheduler CPU list such as `"4"`, `"2,2"` or `"0-3,5"`.
///
/// Parentheses and `x` markers are stripped before splitting on commas;
/// a range `a-b` contributes `b - a + 1`.
pub fn parse_cpu_list(list: &str) -> u32 {
    let cleaned: String = list.chars().filter(|c| !matches!(c, '(' | ')' | 'x')).collect();

    let mut total = 0u32;
    for token in cleaned.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if token.contains('-') {
            total += parse_cpu_range(token);
        } else if let Some(n) = parse_f64(token) {
            total += n as u32;
        }
    }
    total
}

fn parse_cpu_range(range: &str) -> u32 {
    let Some((start, end)) = range.split_once('-') else {
        return range.trim().parse().unwrap_or(0);
    };
    let start: u32 = match start.trim().parse() {
        Ok(v) => v,
        Err(_) => return 0,
    };
    let end: u32 = match end.trim().parse() {
        Ok(v) => v,
        Err(_) => return 0,
    };
    if end >= start {
        end - start + 1
    } else {
        0
    }
}

//! QCHarvest - Parallel batch extractor for quantum-chemistry output files
//!
//! QCHarvest walks a directory of calculation output files, extracts
//! thermodynamic and electronic-structure quantities from each one, classifies
//! the termination state of every job, relocates finished and failed jobs into
//! status directories, and combines two-tier energies against a parent
//! directory of thermal data.
//!
//! # Architecture
//!
//! - **Single-file parser**: one forward scan per file plus a tail-window
//!   verification of true completion
//! - **Batch coordinator**: OS-thread worker pool pulling file indices from an
//!   atomic counter
//! - **Resource governance**: byte-budget memory governor and a counting
//!   descriptor pool shared by all workers
//! - **Scheduler awareness**: SLURM/PBS/SGE/LSF allocations clamp worker count
//!   and memory
//! - **Reports**: fixed-width text or CSV with a metadata header

pub mod checker;
pub mod config;
pub mod coordinator;
pub mod coords;
pub mod discover;
pub mod extract;
pub mod highlevel;
pub mod output;
pub mod scheduler;
pub mod util;

/// Result type used throughout QCHarvest
pub type Result<T> = anyhow::Result<T>;

//! Two-tier energy combination
//!
//! A common workflow computes geometries and thermal corrections at a cheap
//! level of theory, then recomputes single-point energies in a subdirectory
//! at a better one. This module pairs each file in the working directory
//! with the same-named file in the parent directory and combines the
//! high-level electronic energy with the low-level corrections.
//!
//! The correction space is relative: each low-level sum minus the low-level
//! SCF energy gives the correction added to the high-level energy, so
//! `G = E_high + (E+G_low − SCF_low)`, and likewise for the enthalpy. The
//! entropy column is the H−G gap before phase correction.

use crate::config::Config;
use crate::coordinator::{self, directory_name};
use crate::extract::{
    phase_correction_hartree, scan_file, termination_status, ParseContext, Status, EV_PER_HARTREE,
    KJ_PER_HARTREE,
};
use crate::output::{OutputFormat, ReportMeta};
use crate::scheduler::{self, policy};
use crate::util::cancel::CancelFlag;
use crate::Result;
use anyhow::Context as _;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::Instant;

/// One combined high/low energy pair.
#[derive(Debug, Clone)]
pub struct HighLevelRecord {
    pub file_name: String,
    /// High-level electronic energy (PCM over TD over last SCF).
    pub e_high: f64,
    /// Low-level SCF energy the corrections are taken against.
    pub e_low: f64,
    /// E_high + zero-point correction.
    pub e_plus_zpe: f64,
    /// E_high + thermal correction to energy.
    pub e_plus_tc: f64,
    /// E_high + enthalpy correction.
    pub enthalpy: f64,
    /// Combined Gibbs energy, phase-corrected when flagged.
    pub gibbs: f64,
    /// H − G before phase correction.
    pub ts: f64,
    pub gibbs_kj: f64,
    pub gibbs_ev: f64,
    pub low_freq: f64,
    pub status: Status,
    pub phase_corrected: bool,
}

/// Pairs working-directory files with their parent-directory partners.
pub struct Combiner<'a> {
    ctx: &'a ParseContext,
    dir: PathBuf,
    parent: PathBuf,
    quiet: bool,
}

/// The combiner refuses to run outside a high-level directory: there must
/// be at least one matching file here AND a parent directory to pair with.
pub fn is_valid_high_level_directory(dir: &Path, config: &Config) -> bool {
    let Ok(canonical) = dir.canonicalize() else {
        return false;
    };
    if canonical.parent().is_none() {
        return false;
    }

    let cancel = CancelFlag::new();
    let extensions = crate::discover::effective_extensions(&config.extension);
    match crate::discover::find_output_files(
        dir,
        &extensions,
        config.max_file_size_mb,
        &cancel,
        None,
    ) {
        Ok(files) => !files.is_empty(),
        Err(_) => false,
    }
}

impl<'a> Combiner<'a> {
    pub fn new(ctx: &'a ParseContext, dir: &Path) -> Result<Self> {
        let canonical = dir
            .canonicalize()
            .with_context(|| format!("Cannot resolve directory {}", dir.display()))?;
        let parent = canonical
            .parent()
            .context("Working directory has no parent directory")?
            .to_path_buf();
        Ok(Self {
            ctx,
            dir: canonical,
            parent,
            quiet: false,
        })
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Combine every file, in parallel, skipping files without partners.
    pub fn process(&self, files: &[String], workers: usize) -> Vec<HighLevelRecord> {
        let records: Mutex<Vec<HighLevelRecord>> = Mutex::new(Vec::new());
        let next_index = AtomicUsize::new(0);
        let completed = AtomicUsize::new(0);
        let progress_interval = (files.len() / 10).clamp(1, 100);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if self.ctx.cancel.is_cancelled() {
                        break;
                    }
                    let index = next_index.fetch_add(1, AtomicOrdering::Relaxed);
                    if index >= files.len() {
                        break;
                    }
                    let file = &files[index];

                    if let Some(record) = self.combine(file) {
                        records
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .push(record);
                    }

                    let done = completed.fetch_add(1, AtomicOrdering::Relaxed) + 1;
                    if !self.quiet && done % progress_interval == 0 {
                        println!("Processed {}/{} files", done, files.len());
                    }
                });
            }
        });

        records
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Combine one file with its parent-directory partner.
    pub fn combine(&self, file: &str) -> Option<HighLevelRecord> {
        let high = match scan_file(&self.dir, file, self.ctx) {
            Ok(scan) => scan,
            Err(e) => {
                self.ctx
                    .sink
                    .add_error(format!("Error processing file '{}': {}", file, e));
                return None;
            }
        };

        if !self.parent.join(file).exists() {
            self.ctx.sink.add_warning(format!(
                "Skipping {}: no matching file in parent directory",
                file
            ));
            return None;
        }

        let low = match scan_file(&self.parent, file, self.ctx) {
            Ok(scan) => scan,
            Err(e) => {
                self.ctx
                    .sink
                    .add_error(format!("Error processing partner of '{}': {}", file, e));
                return None;
            }
        };

        let temp = if self.ctx.fixed_temperature {
            self.ctx.base_temp
        } else {
            low.temperature.unwrap_or(self.ctx.base_temp)
        };

        let e_high = high.electronic_energy();
        let e_low = low.last_scf();
        let zpe_corr = low.zpe_correction.unwrap_or(0.0);
        let tc_energy = low.thermal_energy_correction.unwrap_or(0.0);

        // Correction-space deltas; the sums are preferred, the printed
        // correction lines are the fallback when a sum is absent.
        let gibbs_corr = low
            .electronic_plus_gibbs
            .map(|sum| sum - e_low)
            .or(low.thermal_gibbs_correction);
        let enthalpy_corr = low
            .electronic_plus_enthalpy
            .map(|sum| sum - e_low)
            .or(low.thermal_enthalpy_correction);

        let gibbs_nophase = e_high + gibbs_corr.unwrap_or(0.0);
        let phase_corrected = high.has_scrf;
        let gibbs = if phase_corrected && gibbs_corr.is_some() {
            gibbs_nophase + phase_correction_hartree(temp, self.ctx.concentration)
        } else {
            gibbs_nophase
        };
        let enthalpy = e_high + enthalpy_corr.unwrap_or(0.0);

        let high_has_freqs = !high.negative_freqs.is_empty() || !high.positive_freqs.is_empty();
        let low_freq = if high_has_freqs {
            high.low_frequency()
        } else {
            low.low_frequency()
        };

        let status = termination_status(&self.dir.join(file), &high, self.ctx, file);

        Some(HighLevelRecord {
            file_name: crate::extract::truncate_display_name(file),
            e_high,
            e_low,
            e_plus_zpe: e_high + zpe_corr,
            e_plus_tc: e_high + tc_energy,
            enthalpy,
            gibbs,
            ts: enthalpy - gibbs_nophase,
            gibbs_kj: gibbs * KJ_PER_HARTREE,
            gibbs_ev: gibbs * EV_PER_HARTREE,
            low_freq,
            status,
            phase_corrected,
        })
    }
}

/// Ordering under the report sort column. Column 2 sorts by the shape's
/// leading energy; unknown columns preserve input order.
pub fn compare_high_level(
    a: &HighLevelRecord,
    b: &HighLevelRecord,
    column: u32,
    detailed: bool,
) -> Ordering {
    let by = |x: f64, y: f64| x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    match column {
        1 => a.file_name.cmp(&b.file_name),
        2 if detailed => by(a.e_high, b.e_high),
        2 => by(a.gibbs_kj, b.gibbs_kj),
        3 => by(a.low_freq, b.low_freq),
        4 => by(a.gibbs, b.gibbs),
        _ => Ordering::Equal,
    }
}

/// Compact shape: combined Gibbs energy in three units plus status.
pub fn render_compact(records: &[HighLevelRecord], format: OutputFormat) -> String {
    let mut out = String::new();
    match format {
        OutputFormat::Text => {
            writeln!(
                out,
                "{:<53}{:>18}{:>18}{:>15}{:>10}{:>8}{:>6}",
                "Output name", "G kJ/mol", "G a.u", "G eV", "Low FC", "Status", "PCorr"
            )
            .unwrap();
            writeln!(
                out,
                "{:<53}{:>18}{:>18}{:>15}{:>10}{:>8}{:>6}",
                "-".repeat(53),
                "-".repeat(18),
                "-".repeat(18),
                "-".repeat(15),
                "-".repeat(10),
                "-".repeat(8),
                "-".repeat(6)
            )
            .unwrap();
            for r in records {
                writeln!(
                    out,
                    "{:<53}{:>18.6}{:>18.6}{:>15.6}{:>10.2}{:>8}{:>6}",
                    r.file_name,
                    r.gibbs_kj,
                    r.gibbs,
                    r.gibbs_ev,
                    r.low_freq,
                    r.status.as_str(),
                    if r.phase_corrected { "YES" } else { "NO" }
                )
                .unwrap();
            }
        }
        OutputFormat::Csv => {
            writeln!(out, "Output name,G kJ/mol,G a.u,G eV,Low FC,Status,PCorr").unwrap();
            for r in records {
                writeln!(
                    out,
                    "\"{}\",{:.6},{:.6},{:.6},{:.2},{},{}",
                    r.file_name,
                    r.gibbs_kj,
                    r.gibbs,
                    r.gibbs_ev,
                    r.low_freq,
                    r.status.as_str(),
                    if r.phase_corrected { "YES" } else { "NO" }
                )
                .unwrap();
            }
        }
    }
    out
}

/// Detailed shape: the atomic-unit components the combination is built from.
pub fn render_detailed(records: &[HighLevelRecord], format: OutputFormat) -> String {
    let mut out = String::new();
    match format {
        OutputFormat::Text => {
            writeln!(
                out,
                "{:<53}{:>18}{:>18}{:>15}{:>15}{:>15}{:>18}{:>12}{:>10}{:>6}",
                "Output name",
                "E high au",
                "E low au",
                "E+ZPE au",
                "E+TC au",
                "H au",
                "G au",
                "TS au",
                "Low FC",
                "PCorr"
            )
            .unwrap();
            writeln!(
                out,
                "{:<53}{:>18}{:>18}{:>15}{:>15}{:>15}{:>18}{:>12}{:>10}{:>6}",
                "-".repeat(53),
                "-".repeat(18),
                "-".repeat(18),
                "-".repeat(15),
                "-".repeat(15),
                "-".repeat(15),
                "-".repeat(18),
                "-".repeat(12),
                "-".repeat(10),
                "-".repeat(6)
            )
            .unwrap();
            for r in records {
                writeln!(
                    out,
                    "{:<53}{:>18.6}{:>18.6}{:>15.6}{:>15.6}{:>15.6}{:>18.6}{:>12.6}{:>10.2}{:>6}",
                    r.file_name,
                    r.e_high,
                    r.e_low,
                    r.e_plus_zpe,
                    r.e_plus_tc,
                    r.enthalpy,
                    r.gibbs,
                    r.ts,
                    r.low_freq,
                    if r.phase_corrected { "YES" } else { "NO" }
                )
                .unwrap();
            }
        }
        OutputFormat::Csv => {
            writeln!(
                out,
                "Output name,E high au,E low au,E+ZPE au,E+TC au,H au,G au,TS au,Low FC,PCorr"
            )
            .unwrap();
            for r in records {
                writeln!(
                    out,
                    "\"{}\",{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.2},{}",
                    r.file_name,
                    r.e_high,
                    r.e_low,
                    r.e_plus_zpe,
                    r.e_plus_tc,
                    r.enthalpy,
                    r.gibbs,
                    r.ts,
                    r.low_freq,
                    if r.phase_corrected { "YES" } else { "NO" }
                )
                .unwrap();
            }
        }
    }
    out
}

/// Run the `high-kj` (compact) or `high-au` (detailed) command.
pub fn run_high_level(
    dir: &Path,
    config: &Config,
    cancel: &CancelFlag,
    detailed: bool,
) -> Result<u8> {
    let start_time = Instant::now();

    if !is_valid_high_level_directory(dir, config) {
        eprintln!(
            "Error: This command must be run from a directory containing high-level output files"
        );
        eprintln!("       with a parent directory containing low-level thermal data.");
        return Ok(1);
    }

    let alloc = scheduler::detect();
    coordinator::print_job_info(&alloc, config.quiet);

    let ctx = coordinator::build_context(config, cancel.clone());
    let files = coordinator::discover_files(dir, config, &ctx)?;

    let workers = policy::safe_worker_count(config.requested_threads, files.len(), &alloc);
    let memory_cap = policy::safe_memory_limit_mb(config.memory_limit_mb, workers, &alloc);
    ctx.memory.set_cap_mb(memory_cap);

    if !config.quiet {
        println!("Found {} {} files", files.len(), config.extension);
        println!("Using: {} threads", workers);
        println!(
            "Memory limit: {}",
            crate::util::format_memory_size(memory_cap * 1024 * 1024)
        );
    }

    let combiner = Combiner::new(&ctx, dir)?.quiet(config.quiet);
    let mut records = combiner.process(&files, workers);
    records.sort_by(|a, b| compare_high_level(a, b, config.sort_column, detailed));

    if records.is_empty() {
        if !config.quiet {
            println!("No valid {} files processed.", config.extension);
        }
        return Ok(if ctx.sink.has_errors() { 1 } else { 0 });
    }

    if !config.quiet {
        println!(
            "Successfully processed {}/{} files.",
            records.len(),
            files.len()
        );
    }

    let mut warnings = config.startup_warnings.clone();
    warnings.extend(ctx.sink.warnings());
    let meta = ReportMeta {
        fixed_temperature: config.fixed_temperature,
        base_temp: config.temperature,
        concentration: config.concentration,
        threads: workers,
        processed: records.len(),
        total: files.len(),
        peak_memory_bytes: ctx.memory.peak_usage() as u64,
        warnings,
        errors: ctx.sink.errors(),
    };

    let table = if detailed {
        render_detailed(&records, config.format)
    } else {
        render_compact(&records, config.format)
    };
    let report = format!("{}{}", meta.render(), table);

    let shape = if detailed { "au" } else { "kJ" };
    let output_name = format!(
        "{}-highLevel-{}{}",
        directory_name(dir),
        shape,
        config.format.extension()
    );
    std::fs::write(dir.join(&output_name), &report)
        .with_context(|| format!("Could not open output file: {}", output_name))?;

    if !config.quiet {
        print!("{}", report);
        println!("\nResults saved to: {}", output_name);
        println!(
            "Peak memory usage: {}",
            crate::util::format_memory_size(ctx.memory.peak_usage() as u64)
        );
        println!(
            "Total execution time: {:.3} seconds",
            start_time.elapsed().as_secs_f64()
        );
    }

    Ok(0)
}

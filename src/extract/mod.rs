//! Single-file extraction
//!
//! [`extract`] reads one output file under a descriptor permit and a memory
//! reservation, scans it line by line, and derives the [`Record`] the report
//! writer consumes.
//!
//! Termination status uses a two-gate check. Multi-step calculations emit one
//! banner per step and one "Normal termination" per completed step, and some
//! aborted runs still carry per-step terminations; a file is only DONE when
//! the termination counts line up AND the phrase occurs in the true tail
//! window of the file.

pub mod scan;

use crate::util::cancel::CancelFlag;
use crate::util::diag::DiagnosticSink;
use crate::util::handles::HandlePool;
use crate::util::memory::MemoryGovernor;
use scan::LineScan;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Universal gas constant in J/(K·mol), 2018 CODATA value
pub const GAS_CONSTANT: f64 = 8.314462618;
/// Standard atmospheric pressure in N/m²
pub const STANDARD_PRESSURE: f64 = 101_325.0;
/// kJ/mol per Hartree
pub const KJ_PER_HARTREE: f64 = 2625.5002;
/// eV per Hartree
pub const EV_PER_HARTREE: f64 = 27.211386245988;
/// Hartree per J/mol
pub const HARTREE_PER_J_MOL: f64 = 3.808_798_033_989_866e-7;

/// Trailing window, in bytes, re-read to confirm true completion.
const COMPLETION_WINDOW_BYTES: u64 = 2048;
/// Display names keep at most this many trailing characters.
const DISPLAY_NAME_WIDTH: usize = 53;
/// Floor for the per-file memory estimate.
const MIN_FILE_ESTIMATE_BYTES: usize = 100 * 1024;

/// Termination status of a single calculation file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Done,
    Undone,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Done => "DONE",
            Status::Undone => "UNDONE",
            Status::Error => "ERROR",
        }
    }
}

/// Quantities extracted from one output file.
#[derive(Debug, Clone)]
pub struct Record {
    /// Display name (relative, last 53 characters kept when longer).
    pub file_name: String,
    /// Gibbs free energy in kJ/mol.
    pub gibbs_kj: f64,
    /// Low frequency: last negative, else minimum positive, else zero.
    pub low_freq: f64,
    /// Gibbs free energy in Hartree, phase-corrected when flagged.
    pub gibbs_hartree: f64,
    /// Nuclear repulsion energy in Hartree.
    pub nuclear_repulsion: f64,
    /// Electronic energy in Hartree (PCM over TD over last SCF).
    pub electronic_energy: f64,
    /// Zero-point correction in Hartree.
    pub zpe: f64,
    pub status: Status,
    /// A reaction-field directive was present.
    pub phase_corrected: bool,
    /// Banner count, used as a job-step count.
    pub round_count: u32,
}

/// Immutable per-run context shared read-only by all workers.
///
/// The governors and the sink inside are interior-mutable and synchronized;
/// everything else is fixed before fan-out.
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Base temperature in K.
    pub base_temp: f64,
    /// Concentration for the phase correction, mol/m³.
    pub concentration: f64,
    /// Use `base_temp` for every file instead of each file's reported value.
    pub fixed_temperature: bool,
    /// Input (deck) extensions used for sibling-artifact discovery.
    pub input_extensions: Vec<String>,
    pub max_file_size_mb: u64,
    pub memory: Arc<MemoryGovernor>,
    pub handles: Arc<HandlePool>,
    pub sink: Arc<DiagnosticSink>,
    pub cancel: CancelFlag,
}

impl ParseContext {
    pub fn new(base_temp: f64, concentration: f64, fixed_temperature: bool) -> Self {
        Self {
            base_temp,
            concentration,
            fixed_temperature,
            input_extensions: vec![".com".into(), ".gjf".into(), ".gau".into()],
            max_file_size_mb: 100,
            memory: Arc::new(MemoryGovernor::new(crate::util::memory::DEFAULT_MEMORY_MB)),
            handles: Arc::new(HandlePool::default()),
            sink: Arc::new(DiagnosticSink::new()),
            cancel: CancelFlag::new(),
        }
    }
}

/// Per-file failure taxonomy; these never escape a worker.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("could not open file: {0}")]
    Open(String),
    #[error("insufficient memory budget to process file: {0}")]
    MemoryBudget(String),
    #[error("processing interrupted by shutdown signal")]
    Cancelled,
    #[error("I/O error reading file '{file}': {source}")]
    Io {
        file: String,
        source: std::io::Error,
    },
}

/// RT·ln(cRT/P₀) in Hartree: the solution-phase standard-state correction.
pub fn phase_correction_hartree(temp: f64, concentration: f64) -> f64 {
    GAS_CONSTANT
        * temp
        * (concentration * GAS_CONSTANT * temp / STANDARD_PRESSURE).ln()
        * HARTREE_PER_J_MOL
}

/// Scan one file into a [`LineScan`] under a descriptor permit and a memory
/// reservation. Shared by the extractor and the two-tier combiner.
pub fn scan_file(dir: &Path, file_name: &str, ctx: &ParseContext) -> Result<LineScan, FileError> {
    if ctx.cancel.is_cancelled() {
        return Err(FileError::Cancelled);
    }

    let _permit = ctx.handles.acquire();

    let path = dir.join(file_name);
    let estimated = match std::fs::metadata(&path) {
        Ok(meta) => ((meta.len() / 10) as usize).max(MIN_FILE_ESTIMATE_BYTES),
        Err(_) => MIN_FILE_ESTIMATE_BYTES,
    };

    if !ctx.memory.can_reserve(estimated) {
        return Err(FileError::MemoryBudget(file_name.to_string()));
    }
    let _reservation = ctx.memory.reserve(estimated);

    let file = File::open(&path).map_err(|_| FileError::Open(file_name.to_string()))?;
    let mut reader = BufReader::new(file);

    let mut scan = LineScan::new();
    let read_temperature = !ctx.fixed_temperature;
    let mut line_count: u64 = 0;
    let mut raw_line: Vec<u8> = Vec::new();

    loop {
        raw_line.clear();
        let bytes = reader
            .read_until(b'\n', &mut raw_line)
            .map_err(|source| FileError::Io {
                file: file_name.to_string(),
                source,
            })?;
        if bytes == 0 {
            break;
        }
        line_count += 1;

        let line = String::from_utf8_lossy(&raw_line);
        scan.feed(&line, read_temperature);

        if line_count % 1000 == 0 && ctx.cancel.is_cancelled() {
            return Err(FileError::Cancelled);
        }
    }

    Ok(scan)
}

/// Extract a [`Record`] from `file_name` inside `dir`.
pub fn extract(dir: &Path, file_name: &str, ctx: &ParseContext) -> Result<Record, FileError> {
    let display_name = file_name.strip_prefix("./").unwrap_or(file_name);

    let scan = scan_file(dir, file_name, ctx)?;
    for warning in &scan.warnings {
        ctx.sink
            .add_warning(format!("{} in file '{}'", warning, display_name));
    }

    let path = dir.join(file_name);
    let temp = if ctx.fixed_temperature {
        ctx.base_temp
    } else {
        scan.temperature.unwrap_or(ctx.base_temp)
    };

    let electronic_energy = scan.electronic_energy();
    let low_freq = scan.low_frequency();
    let thermal_gibbs = scan.electronic_plus_gibbs.unwrap_or(0.0);
    let phase_corrected = scan.has_scrf;

    let gibbs_hartree = if phase_corrected && thermal_gibbs != 0.0 {
        thermal_gibbs + phase_correction_hartree(temp, ctx.concentration)
    } else {
        thermal_gibbs
    };
    let gibbs_kj = gibbs_hartree * KJ_PER_HARTREE;

    let status = termination_status(&path, &scan, ctx, display_name);

    Ok(Record {
        file_name: truncate_display_name(display_name),
        gibbs_kj,
        low_freq,
        gibbs_hartree,
        nuclear_repulsion: scan.nuclear_repulsion.unwrap_or(0.0),
        electronic_energy,
        zpe: scan.zpe_correction.unwrap_or(0.0),
        status,
        phase_corrected,
        round_count: scan.copyright_count,
    })
}

/// Termination status from the scan counters plus the tail-window gate.
pub fn termination_status(
    path: &Path,
    scan: &LineScan,
    ctx: &ParseContext,
    display_name: &str,
) -> Status {
    if scan.error_count > 0 {
        Status::Error
    } else if scan.normal_count >= scan.copyright_count && scan.copyright_count > 0 {
        confirm_completion(path, display_name, ctx)
    } else {
        Status::Undone
    }
}

/// Re-read the trailing window and demand "Normal termination" in it.
///
/// The counters alone cannot distinguish a genuinely finished run from one
/// whose final step aborted after several completed intermediate steps.
fn confirm_completion(path: &Path, display_name: &str, ctx: &ParseContext) -> Status {
    let _permit = ctx.handles.acquire();
    let tail = match read_tail_bytes(path, COMPLETION_WINDOW_BYTES) {
        Ok(tail) => tail,
        Err(_) => {
            ctx.sink.add_error(format!(
                "Could not reopen file for tail check: {}",
                display_name
            ));
            return Status::Undone;
        }
    };

    if tail.contains("Normal termination") {
        Status::Done
    } else {
        Status::Undone
    }
}

fn read_tail_bytes(path: &Path, window: u64) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let size = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(size.saturating_sub(window)))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Keep the trailing characters of an over-long display name; filesystem
/// operations always use the full path.
pub(crate) fn truncate_display_name(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() > DISPLAY_NAME_WIDTH {
        chars[chars.len() - DISPLAY_NAME_WIDTH..].iter().collect()
    } else {
        name.to_string()
    }
}

/// Ordering of two records under the requested report column.
///
/// Unknown column numbers compare equal, leaving the input order untouched;
/// the argument layer validates the column before the batch runs.
pub fn compare_records(a: &Record, b: &Record, column: u32) -> Ordering {
    let by = |x: f64, y: f64| x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    match column {
        1 => a.file_name.cmp(&b.file_name),
        2 => by(a.gibbs_kj, b.gibbs_kj),
        3 => by(a.low_freq, b.low_freq),
        4 => by(a.gibbs_hartree, b.gibbs_hartree),
        5 => by(a.nuclear_repulsion, b.nuclear_repulsion),
        6 => by(a.electronic_energy, b.electronic_energy),
        7 => by(a.zpe, b.zpe),
        10 => a.round_count.cmp(&b.round_count),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, TempDir};

    fn write_log(dir: &TempDir, name: &str, content: &str) {
        let mut f = File::create(dir.path().join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    fn ctx() -> ParseContext {
        ParseContext::new(298.15, 1000.0, false)
    }

    const COMPLETED_LOG: &str = "\
 Copyright (c) 1988-2019, Gaussian, Inc.  All Rights Reserved.
 SCF Done:  E(RB3LYP) =  -76.12345000     A.U. after   10 cycles
 Zero-point correction=                           0.010000 (Hartree/Particle)
 Thermal correction to Gibbs Free Energy=         0.010000
 Sum of electronic and thermal Free Energies=          -76.110000
 nuclear repulsion energy         9.1571759344 Hartrees.
 Normal termination of Gaussian 16 at Mon Jan  6 12:00:00 2025.
";

    #[test]
    fn test_happy_extract() {
        let dir = tempdir().unwrap();
        write_log(&dir, "a.log", COMPLETED_LOG);

        let ctx = ctx();
        let record = extract(dir.path(), "a.log", &ctx).unwrap();

        assert_eq!(record.file_name, "a.log");
        assert_eq!(record.status, Status::Done);
        assert!(!record.phase_corrected);
        assert_eq!(record.gibbs_hartree, -76.11);
        assert_eq!(record.electronic_energy, -76.12345);
        assert_eq!(record.zpe, 0.01);
        assert_eq!(record.nuclear_repulsion, 9.1571759344);
        assert_eq!(record.round_count, 1);
        let ratio = record.gibbs_kj / record.gibbs_hartree;
        assert!((ratio - KJ_PER_HARTREE).abs() / KJ_PER_HARTREE < 1e-6);
    }

    #[test]
    fn test_governor_balances_after_extract() {
        let dir = tempdir().unwrap();
        write_log(&dir, "a.log", COMPLETED_LOG);
        let ctx = ctx();
        let _ = extract(dir.path(), "a.log", &ctx).unwrap();
        assert_eq!(ctx.memory.current_usage(), 0);
        assert!(ctx.memory.peak_usage() >= 100 * 1024);
        assert_eq!(ctx.handles.available(), ctx.handles.max());
    }

    #[test]
    fn test_false_completion_with_error_termination() {
        // Two banners, one intermediate Normal termination, then an error:
        // the error count alone forces ERROR.
        let dir = tempdir().unwrap();
        let content = "\
 Copyright (c) 1988-2019, Gaussian, Inc.  All Rights Reserved.
 SCF Done:  E(RB3LYP) =  -76.10000000     A.U. after   10 cycles
 Normal termination of Gaussian 16 at Mon Jan  6 10:00:00 2025.
 Copyright (c) 1988-2019, Gaussian, Inc.  All Rights Reserved.
 SCF Done:  E(RB3LYP) =  -76.20000000     A.U. after   10 cycles
 Error termination request processed by link 9999.
";
        write_log(&dir, "mid.log", content);
        let record = extract(dir.path(), "mid.log", &ctx()).unwrap();
        assert_eq!(record.status, Status::Error);
        assert_eq!(record.round_count, 2);
    }

    #[test]
    fn test_intermediate_normal_without_tail_is_undone() {
        // Counters line up but the phrase only occurs far from the end.
        let dir = tempdir().unwrap();
        let filler = " filler line\n".repeat(400);
        let content = format!(
            " Copyright (c) 1988-2019, Gaussian, Inc.\n Normal termination of Gaussian 16 at Mon Jan  6 10:00:00 2025.\n{}",
            filler
        );
        write_log(&dir, "s.log", &content);
        let record = extract(dir.path(), "s.log", &ctx()).unwrap();
        assert_eq!(record.status, Status::Undone);
    }

    #[test]
    fn test_no_banner_never_done() {
        let dir = tempdir().unwrap();
        write_log(
            &dir,
            "n.log",
            " Normal termination of Gaussian 16 at Mon Jan  6 10:00:00 2025.\n",
        );
        let record = extract(dir.path(), "n.log", &ctx()).unwrap();
        assert_eq!(record.status, Status::Undone);
    }

    #[test]
    fn test_imaginary_frequency_record() {
        let dir = tempdir().unwrap();
        let content = "\
 Copyright (c) 1988-2019, Gaussian, Inc.  All Rights Reserved.
 SCF Done:  E(RB3LYP) =  -76.12345000     A.U. after   10 cycles
 Frequencies --   -412.3000               120.5000               200.0000
 Normal termination of Gaussian 16 at Mon Jan  6 12:00:00 2025.
";
        write_log(&dir, "ts.log", content);
        let record = extract(dir.path(), "ts.log", &ctx()).unwrap();
        assert_eq!(record.status, Status::Done);
        assert_eq!(record.low_freq, -412.3);
    }

    #[test]
    fn test_phase_correction_applied_with_scrf() {
        let dir = tempdir().unwrap();
        let content = "\
 Copyright (c) 1988-2019, Gaussian, Inc.  All Rights Reserved.
 # opt freq b3lyp/6-31g(d) scrf=(smd,solvent=water)
 SCF Done:  E(RB3LYP) =  -76.12345000     A.U. after   10 cycles
 Sum of electronic and thermal Free Energies=          -76.110000
 Normal termination of Gaussian 16 at Mon Jan  6 12:00:00 2025.
";
        write_log(&dir, "w.log", content);
        let ctx = ctx();
        let record = extract(dir.path(), "w.log", &ctx).unwrap();
        assert!(record.phase_corrected);
        let expected = -76.11 + phase_correction_hartree(298.15, 1000.0);
        assert!((record.gibbs_hartree - expected).abs() < 1e-12);
    }

    #[test]
    fn test_per_file_temperature_overrides_base() {
        let dir = tempdir().unwrap();
        let content = "\
 Copyright (c) 1988-2019, Gaussian, Inc.  All Rights Reserved.
 # opt freq b3lyp/6-31g(d) scrf=(smd,solvent=water)
 Temperature   350.000 Kelvin.  Pressure   1.00000 Atm.
 Sum of electronic and thermal Free Energies=          -76.110000
 Normal termination of Gaussian 16 at Mon Jan  6 12:00:00 2025.
";
        write_log(&dir, "t.log", content);

        let per_file = extract(dir.path(), "t.log", &ctx()).unwrap();
        let expected = -76.11 + phase_correction_hartree(350.0, 1000.0);
        assert!((per_file.gibbs_hartree - expected).abs() < 1e-12);

        let fixed_ctx = ParseContext::new(298.15, 1000.0, true);
        let fixed = extract(dir.path(), "t.log", &fixed_ctx).unwrap();
        let expected = -76.11 + phase_correction_hartree(298.15, 1000.0);
        assert!((fixed.gibbs_hartree - expected).abs() < 1e-12);
    }

    #[test]
    fn test_long_name_keeps_tail_characters() {
        let dir = tempdir().unwrap();
        let name = format!("{}.log", "x".repeat(80));
        write_log(&dir, &name, COMPLETED_LOG);
        let record = extract(dir.path(), &name, &ctx()).unwrap();
        assert_eq!(record.file_name.chars().count(), 53);
        assert!(record.file_name.ends_with(".log"));
    }

    #[test]
    fn test_cancelled_context_rejects_work() {
        let dir = tempdir().unwrap();
        write_log(&dir, "a.log", COMPLETED_LOG);
        let ctx = ctx();
        ctx.cancel.cancel();
        assert!(matches!(
            extract(dir.path(), "a.log", &ctx),
            Err(FileError::Cancelled)
        ));
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            extract(dir.path(), "absent.log", &ctx()),
            Err(FileError::Open(_))
        ));
    }

    #[test]
    fn test_compare_records_columns() {
        let mut a = Record {
            file_name: "a.log".into(),
            gibbs_kj: -10.0,
            low_freq: 5.0,
            gibbs_hartree: -1.0,
            nuclear_repulsion: 9.0,
            electronic_energy: -76.0,
            zpe: 0.1,
            status: Status::Done,
            phase_corrected: false,
            round_count: 1,
        };
        let mut b = a.clone();
        b.file_name = "b.log".into();
        b.gibbs_kj = -20.0;
        b.round_count = 3;

        assert_eq!(compare_records(&a, &b, 1), Ordering::Less);
        assert_eq!(compare_records(&a, &b, 2), Ordering::Greater);
        assert_eq!(compare_records(&a, &b, 10), Ordering::Less);
        assert_eq!(compare_records(&a, &b, 99), Ordering::Equal);

        a.low_freq = -412.3;
        assert_eq!(compare_records(&a, &b, 3), Ordering::Less);
    }
}

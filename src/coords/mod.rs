//! Final-coordinate extraction
//!
//! Pulls the last Cartesian orientation block out of each output file and
//! writes it as an `.xyz` file, then relocates the `.xyz` by job status:
//! files whose tail reports normal termination land in
//! `<cwd-name>_final_coord/`, everything else in `<cwd-name>_running_coord/`.
//!
//! The orientation block usually sits near the end of the file, so the scan
//! reads a generous tail window first and only falls back to the whole file
//! when no orientation header is in it.

use crate::config::Config;
use crate::coordinator::{self, directory_name};
use crate::extract::ParseContext;
use crate::scheduler::{self, policy};
use crate::util::cancel::CancelFlag;
use crate::util::numeric::{parse_f64, parse_i64};
use crate::util::tail::{read_window, ReadMode};
use crate::Result;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Tail window scanned before falling back to a full read.
const ORIENTATION_WINDOW_LINES: usize = 1000;
const ORIENTATION_HEADER: &str = "Standard orientation:";
/// Rows begin this many lines below the orientation header.
const HEADER_BODY_OFFSET: usize = 5;

/// Element symbols indexed by atomic number; 0 is unused.
const ATOMIC_SYMBOLS: [&str; 119] = [
    "", "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S",
    "Cl", "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge",
    "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd",
    "In", "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd",
    "Tb", "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg",
    "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm",
    "Bk", "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg",
    "Cn", "Nh", "Fl", "Mc", "Lv", "Ts", "Og",
];

fn atomic_symbol(atomic_number: i64) -> &'static str {
    if atomic_number >= 1 && (atomic_number as usize) < ATOMIC_SYMBOLS.len() {
        ATOMIC_SYMBOLS[atomic_number as usize]
    } else {
        "X"
    }
}

/// Counters for one coordinate-extraction run.
#[derive(Debug, Default)]
pub struct ExtractSummary {
    pub total_files: usize,
    pub processed_files: usize,
    pub extracted_files: usize,
    pub failed_files: usize,
    pub moved_to_final: usize,
    pub moved_to_running: usize,
    pub errors: Vec<String>,
    pub execution_secs: f64,
}

pub struct CoordExtractor<'a> {
    ctx: &'a ParseContext,
    dir: PathBuf,
    quiet: bool,
}

impl<'a> CoordExtractor<'a> {
    pub fn new(ctx: &'a ParseContext, dir: &Path, quiet: bool) -> Self {
        Self {
            ctx,
            dir: dir.to_path_buf(),
            quiet,
        }
    }

    /// Extract coordinates from every file, then relocate by status.
    pub fn extract_all(&self, files: &[String], workers: usize) -> ExtractSummary {
        let mut summary = ExtractSummary {
            total_files: files.len(),
            ..ExtractSummary::default()
        };
        let start_time = Instant::now();

        let conflicting = conflicting_base_names(files);

        let extractions: Mutex<Vec<(String, bool)>> = Mutex::new(Vec::new());
        let errors: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let next_index = AtomicUsize::new(0);
        let processed = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if self.ctx.cancel.is_cancelled() {
                        break;
                    }
                    let index = next_index.fetch_add(1, Ordering::Relaxed);
                    if index >= files.len() {
                        break;
                    }
                    let file = &files[index];

                    let _permit = self.ctx.handles.acquire();
                    match self.extract_from_file(file, &conflicting) {
                        Ok(pair) => extractions
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .push(pair),
                        Err(message) => errors
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .push(format!("{}: {}", file, message)),
                    }
                    processed.fetch_add(1, Ordering::Relaxed);
                });
            }
        });

        summary.processed_files = processed.load(Ordering::Relaxed);
        summary.errors = errors
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        summary.failed_files = summary.errors.len();

        let extractions = extractions
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        summary.extracted_files = extractions.len();

        // Two source files can share a stem and thus an .xyz name; only the
        // first move wins.
        let mut moved: HashSet<String> = HashSet::new();
        for (xyz_file, completed) in extractions {
            if !moved.insert(xyz_file.clone()) {
                continue;
            }
            match self.move_xyz_file(&xyz_file, completed) {
                Ok(()) => {
                    if completed {
                        summary.moved_to_final += 1;
                    } else {
                        summary.moved_to_running += 1;
                    }
                }
                Err(message) => summary.errors.push(message),
            }
        }

        summary.execution_secs = start_time.elapsed().as_secs_f64();
        summary
    }

    /// Extract the last orientation block of `file` into an `.xyz` file.
    ///
    /// Returns the `.xyz` name and whether the job terminated normally.
    fn extract_from_file(
        &self,
        file: &str,
        conflicting: &HashSet<String>,
    ) -> std::result::Result<(String, bool), String> {
        let path = self.dir.join(file);
        let content = read_window(
            &path,
            ReadMode::Smart {
                lines: ORIENTATION_WINDOW_LINES,
                pattern: ORIENTATION_HEADER,
            },
        )
        .map_err(|e| format!("Failed to read file: {}", e))?;

        let lines: Vec<&str> = content.lines().collect();

        let start = lines
            .iter()
            .rposition(|line| {
                line.contains(ORIENTATION_HEADER) || line.contains("Input orientation:")
            })
            .ok_or("No orientation section found")?;

        let body_start = start + HEADER_BODY_OFFSET;
        let end = (body_start..lines.len())
            .find(|&i| lines[i].contains("----"))
            .ok_or("No end delimiter found for orientation section")?;

        if end <= body_start {
            return Err("Invalid number of atoms".to_string());
        }

        let mut xyz_body = String::new();
        for line in &lines[body_start..end] {
            let mut tokens = line.split_whitespace();
            let parsed = (|| {
                let _center = parse_i64(tokens.next()?)?;
                let atomic_number = parse_i64(tokens.next()?)?;
                let _atom_type = parse_i64(tokens.next()?)?;
                let x = parse_f64(tokens.next()?)?;
                let y = parse_f64(tokens.next()?)?;
                let z = parse_f64(tokens.next()?)?;
                Some((atomic_number, x, y, z))
            })();
            let Some((atomic_number, x, y, z)) = parsed else {
                return Err(format!("Failed to parse coordinate line: {}", line));
            };
            writeln!(
                xyz_body,
                "{:<10}{:>20.10}{:>20.10}{:>20.10}",
                atomic_symbol(atomic_number),
                x,
                y,
                z
            )
            .unwrap();
        }

        let stem = Path::new(file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file);
        let xyz_file = if conflicting.contains(stem) {
            format!("{}.xyz", file)
        } else {
            format!("{}.xyz", stem)
        };

        let atom_count = end - body_start;
        let xyz_content = format!("{}\n{}\n{}", atom_count, stem, xyz_body);
        std::fs::write(self.dir.join(&xyz_file), xyz_content)
            .map_err(|e| format!("Failed to write {}: {}", xyz_file, e))?;

        let tail = read_window(&path, ReadMode::Tail(10))
            .map_err(|e| format!("Failed to read file tail: {}", e))?;
        let completed = tail.contains("Normal termination of Gaussian");

        Ok((xyz_file, completed))
    }

    fn move_xyz_file(&self, xyz_file: &str, completed: bool) -> std::result::Result<(), String> {
        let suffix = if completed {
            "_final_coord"
        } else {
            "_running_coord"
        };
        let target_dir = self.dir.join(format!("{}{}", directory_name(&self.dir), suffix));

        if !target_dir.exists() {
            std::fs::create_dir_all(&target_dir).map_err(|e| {
                format!(
                    "Failed to create target directory {}: {}",
                    target_dir.display(),
                    e
                )
            })?;
        }

        std::fs::rename(self.dir.join(xyz_file), target_dir.join(xyz_file))
            .map_err(|e| format!("Failed to move {}: {}", xyz_file, e))
    }

    pub fn print_summary(&self, summary: &ExtractSummary) {
        if self.quiet {
            return;
        }
        println!("\nCoordinate extraction completed:");
        println!(
            "Files processed: {}/{}",
            summary.processed_files, summary.total_files
        );
        println!("Coordinates extracted: {}", summary.extracted_files);
        println!("Moved to final: {}", summary.moved_to_final);
        println!("Moved to running: {}", summary.moved_to_running);
        if summary.failed_files > 0 {
            println!("Failed: {}", summary.failed_files);
        }
        println!("Execution time: {:.3} seconds", summary.execution_secs);
        if !summary.errors.is_empty() {
            println!("\nErrors encountered:");
            for error in &summary.errors {
                println!("  {}", error);
            }
        }
    }
}

/// Stems shared by more than one source file keep their extension in the
/// generated `.xyz` name.
fn conflicting_base_names(files: &[String]) -> HashSet<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for file in files {
        if let Some(stem) = Path::new(file).file_stem().and_then(|s| s.to_str()) {
            *counts.entry(stem.to_string()).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(stem, _)| stem)
        .collect()
}

/// Run the `xyz` command against `dir`.
pub fn run_xyz(dir: &Path, config: &Config, cancel: &CancelFlag) -> Result<u8> {
    let alloc = scheduler::detect();
    coordinator::print_job_info(&alloc, config.quiet);

    let ctx = coordinator::build_context(config, cancel.clone());
    let files = coordinator::discover_files(dir, config, &ctx)?;
    if files.is_empty() {
        eprintln!(
            "No {} files found in the current directory.",
            config.extension
        );
        return Ok(0);
    }

    let workers = policy::safe_worker_count(config.requested_threads, files.len(), &alloc);
    if !config.quiet {
        println!("Found {} {} files", files.len(), config.extension);
        println!("Using {} threads", workers);
    }

    let extractor = CoordExtractor::new(&ctx, dir, config.quiet);
    let summary = extractor.extract_all(&files, workers);
    extractor.print_summary(&summary);

    Ok(
        if summary.extracted_files == 0 && !summary.errors.is_empty() {
            1
        } else {
            0
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    const OPT_LOG: &str = "\
 Copyright (c) 1988-2019, Gaussian, Inc.  All Rights Reserved.
 SCF Done:  E(RB3LYP) =  -76.40000000     A.U. after   10 cycles
                         Standard orientation:
 ---------------------------------------------------------------------
 Center     Atomic      Atomic             Coordinates (Angstroms)
 Number     Number       Type             X           Y           Z
 ---------------------------------------------------------------------
      1          8           0        0.000000    0.000000    0.119262
      2          1           0        0.000000    0.763239   -0.477047
      3          1           0        0.000000   -0.763239   -0.477047
 ---------------------------------------------------------------------
 Rotational constants (GHZ)
 Normal termination of Gaussian 16 at Mon Jan  6 12:00:00 2025.
";

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_atomic_symbols() {
        assert_eq!(atomic_symbol(1), "H");
        assert_eq!(atomic_symbol(8), "O");
        assert_eq!(atomic_symbol(118), "Og");
        assert_eq!(atomic_symbol(0), "X");
        assert_eq!(atomic_symbol(500), "X");
    }

    #[test]
    fn test_extracts_last_orientation_block() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "water.log", OPT_LOG);

        let ctx = ParseContext::new(298.15, 1000.0, false);
        let extractor = CoordExtractor::new(&ctx, dir.path(), true);
        let files = vec!["water.log".to_string()];
        let summary = extractor.extract_all(&files, 1);

        assert_eq!(summary.extracted_files, 1);
        assert_eq!(summary.moved_to_final, 1);
        assert_eq!(summary.moved_to_running, 0);

        let final_dir = dir
            .path()
            .join(format!("{}_final_coord", directory_name(dir.path())));
        let xyz = std::fs::read_to_string(final_dir.join("water.xyz")).unwrap();
        let mut lines = xyz.lines();
        assert_eq!(lines.next(), Some("3"));
        assert_eq!(lines.next(), Some("water"));
        let first_atom = lines.next().unwrap();
        assert!(first_atom.starts_with("O"));
        assert!(first_atom.contains("0.1192620000"));
    }

    #[test]
    fn test_unfinished_job_goes_to_running() {
        let dir = tempdir().unwrap();
        let content = OPT_LOG.replace(
            " Normal termination of Gaussian 16 at Mon Jan  6 12:00:00 2025.\n",
            " still optimizing\n",
        );
        write_file(dir.path(), "run.log", &content);

        let ctx = ParseContext::new(298.15, 1000.0, false);
        let extractor = CoordExtractor::new(&ctx, dir.path(), true);
        let summary = extractor.extract_all(&["run.log".to_string()], 1);

        assert_eq!(summary.moved_to_running, 1);
        let running_dir = dir
            .path()
            .join(format!("{}_running_coord", directory_name(dir.path())));
        assert!(running_dir.join("run.xyz").exists());
    }

    #[test]
    fn test_file_without_orientation_fails_cleanly() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "bare.log", " Copyright\n no coordinates here\n");

        let ctx = ParseContext::new(298.15, 1000.0, false);
        let extractor = CoordExtractor::new(&ctx, dir.path(), true);
        let summary = extractor.extract_all(&["bare.log".to_string()], 1);

        assert_eq!(summary.extracted_files, 0);
        assert_eq!(summary.failed_files, 1);
        assert!(summary.errors[0].contains("No orientation section"));
        assert!(!dir.path().join("bare.xyz").exists());
    }

    #[test]
    fn test_conflicting_stems_keep_extension() {
        let files = vec![
            "m1.log".to_string(),
            "m1.out".to_string(),
            "m2.log".to_string(),
        ];
        let conflicting = conflicting_base_names(&files);
        assert!(conflicting.contains("m1"));
        assert!(!conflicting.contains("m2"));
    }
}

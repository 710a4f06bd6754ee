//! Batch extraction coordinator
//!
//! Owns the whole extract pipeline: scheduler detection, file discovery,
//! resource-policy application, the worker pool, sorting, and report
//! writing. Workers are plain OS threads that pull file indices from a
//! shared atomic counter; records and diagnostics flow back through the
//! mutex-guarded buffers in the context.

use crate::config::Config;
use crate::discover;
use crate::extract::{self, compare_records, ParseContext, Record};
use crate::output::{self, OutputFormat, ReportMeta};
use crate::scheduler::{self, policy, JobAllocation};
use crate::util::cancel::CancelFlag;
use crate::util::format_memory_size;
use crate::Result;
use anyhow::Context as _;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Name of `dir` as used in report and relocation-directory names.
pub fn directory_name(dir: &Path) -> String {
    dir.canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Build the shared per-run context from the merged configuration.
pub fn build_context(config: &Config, cancel: CancelFlag) -> ParseContext {
    let mut ctx = ParseContext::new(
        config.temperature,
        config.concentration,
        config.fixed_temperature,
    );
    ctx.input_extensions = config.input_extensions.clone();
    ctx.max_file_size_mb = config.max_file_size_mb;
    ctx.cancel = cancel;
    ctx
}

/// Print the detected allocation, mirroring the report header fields.
pub fn print_job_info(alloc: &JobAllocation, quiet: bool) {
    if quiet || !alloc.in_job() {
        return;
    }
    println!("\n=== Job Scheduler Information ===");
    println!("Scheduler: {}", alloc.kind.name());
    println!("Job ID: {}", alloc.job_id);
    if let Some(cpus) = alloc.cpus {
        println!("Allocated CPUs: {}", cpus);
    }
    if let Some(mb) = alloc.memory_mb {
        println!("Allocated Memory: {}", format_memory_size(mb * 1024 * 1024));
    }
    if !alloc.partition.is_empty() {
        println!("Partition/Queue: {}", alloc.partition);
    }
    if !alloc.account.is_empty() {
        println!("Account: {}", alloc.account);
    }
    println!("=================================\n");
}

/// Discover the batch's input files under the configured extension set.
pub fn discover_files(dir: &Path, config: &Config, ctx: &ParseContext) -> Result<Vec<String>> {
    let extensions = discover::effective_extensions(&config.extension);
    if config.batch_size > 0 {
        discover::find_output_files_batched(
            dir,
            &extensions,
            config.max_file_size_mb,
            config.batch_size,
            &ctx.cancel,
            Some(&ctx.sink),
        )
    } else {
        discover::find_output_files(
            dir,
            &extensions,
            config.max_file_size_mb,
            &ctx.cancel,
            Some(&ctx.sink),
        )
    }
}

/// Run the extract command against `dir`. Returns the process exit code.
pub fn run_extract(dir: &Path, config: &Config, cancel: &CancelFlag) -> Result<u8> {
    let start_time = Instant::now();

    let alloc = scheduler::detect();
    print_job_info(&alloc, config.quiet);

    let ctx = build_context(config, cancel.clone());
    let files = discover_files(dir, config, &ctx)?;

    if files.is_empty() {
        if config.extension.eq_ignore_ascii_case(".log") {
            eprintln!("No .log or .out files found in the current directory.");
        } else {
            eprintln!(
                "No {} files found in the current directory.",
                config.extension
            );
        }
        return Ok(0);
    }

    if cancel.is_cancelled() {
        eprintln!("Shutdown requested during file discovery.");
        return Ok(0);
    }

    let workers = policy::safe_worker_count(config.requested_threads, files.len(), &alloc);
    let memory_cap = policy::safe_memory_limit_mb(config.memory_limit_mb, workers, &alloc);
    ctx.memory.set_cap_mb(memory_cap);

    if !config.quiet {
        println!("Found {} {} files", files.len(), config.extension);
        println!("System: {} cores detected", policy::hardware_cores());
        println!("Requested: {} threads", config.requested_threads);
        if alloc.in_job() {
            match alloc.cpus {
                Some(cpus) => println!(
                    "Job scheduler: {} (CPU limit: {})",
                    alloc.kind.name(),
                    cpus
                ),
                None => println!(
                    "Job scheduler: {} (no CPU limits detected - interactive session)",
                    alloc.kind.name()
                ),
            }
        } else {
            println!("Environment: Interactive/local execution");
        }
        if workers < config.requested_threads {
            println!("Using: {} threads (reduced for safety)", workers);
        } else {
            println!("Using: {} threads (as requested)", workers);
        }
        println!("Max file size limit: {} MB", config.max_file_size_mb);
        println!(
            "Memory limit: {}",
            format_memory_size(memory_cap * 1024 * 1024)
        );
        if config.memory_limit_mb > 0 && memory_cap < config.memory_limit_mb {
            println!(
                "Note: Memory limit reduced from {} MB to {} MB due to job allocation",
                config.memory_limit_mb, memory_cap
            );
        }
    }

    let records = run_pool(dir, &files, workers, &ctx, config.quiet);

    if cancel.is_cancelled() {
        eprintln!("Processing interrupted by shutdown signal.");
        eprintln!(
            "Processed {}/{} files before interruption.",
            records.len(),
            files.len()
        );
    }

    if records.is_empty() {
        eprintln!("No valid results were extracted.");
        let errors = ctx.sink.errors();
        if !errors.is_empty() {
            eprintln!("\nErrors encountered:");
            for error in &errors {
                eprintln!("  {}", error);
            }
            return Ok(1);
        }
        return Ok(0);
    }

    let mut records = records;
    records.sort_by(|a, b| compare_records(a, b, config.sort_column));

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

    let report = render_report(&meta, &records, config.format);
    let output_name = format!("{}{}", directory_name(dir), config.format.extension());
    let output_path = dir.join(&output_name);
    std::fs::write(&output_path, &report)
        .with_context(|| format!("Could not open output file: {}", output_name))?;

    if !config.quiet {
        print!("{}", report);
        println!("\nResults written to {}", output_name);
        println!(
            "Total execution time: {:.3} seconds",
            start_time.elapsed().as_secs_f64()
        );
        println!(
            "Memory usage: {} (peak: {}) / {}",
            format_memory_size(ctx.memory.current_usage() as u64),
            format_memory_size(ctx.memory.peak_usage() as u64),
            format_memory_size(ctx.memory.cap() as u64)
        );
    } else {
        println!(
            "Processed {}/{} files. Results written to {} (execution time: {:.1}s)",
            records.len(),
            files.len(),
            output_name,
            start_time.elapsed().as_secs_f64()
        );
    }

    Ok(0)
}

/// Fan the files out to `workers` threads and collect the records.
fn run_pool(
    dir: &Path,
    files: &[String],
    workers: usize,
    ctx: &ParseContext,
    quiet: bool,
) -> Vec<Record> {
    let records: Mutex<Vec<Record>> = Mutex::new(Vec::with_capacity(files.len()));
    let next_index = AtomicUsize::new(0);
    let completed = AtomicUsize::new(0);
    let progress_interval = (files.len() / 10).clamp(1, 100);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                let index = next_index.fetch_add(1, Ordering::Relaxed);
                if index >= files.len() {
                    break;
                }
                let file = &files[index];

                match extract::extract(dir, file, ctx) {
                    Ok(record) => {
                        records
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .push(record);
                    }
                    Err(e) => {
                        ctx.sink
                            .add_error(format!("Error processing file '{}': {}", file, e));
                    }
                }

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if !quiet && done % progress_interval == 0 {
                    println!(
                        "Processed {}/{} files ({}%)",
                        done,
                        files.len(),
                        done * 100 / files.len()
                    );
                }
            });
        }
    });

    records
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn render_report(meta: &ReportMeta, records: &[Record], format: OutputFormat) -> String {
    let mut report = meta.render();
    match format {
        OutputFormat::Text => report.push_str(&output::text::render_table(records)),
        OutputFormat::Csv => report.push_str(&output::csv::render_table(records)),
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Status;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn test_config() -> Config {
        Config {
            quiet: true,
            requested_threads: 2,
            extension: ".log".into(),
            max_file_size_mb: 100,
            batch_size: 0,
            memory_limit_mb: 0,
            temperature: 298.15,
            fixed_temperature: false,
            concentration: 1000.0,
            sort_column: 2,
            format: OutputFormat::Text,
            target_dir: None,
            dir_suffix: "done".into(),
            error_directory: "errorJobs".into(),
            pcm_directory: "PCMMkU".into(),
            show_details: false,
            input_extensions: vec![".com".into(), ".gjf".into(), ".gau".into()],
            startup_warnings: vec![],
        }
    }

    fn write_log(dir: &Path, name: &str, scf: f64) {
        let content = format!(
            "\
 Copyright (c) 1988-2019, Gaussian, Inc.  All Rights Reserved.
 SCF Done:  E(RB3LYP) =  {:.8}     A.U. after   10 cycles
 Zero-point correction=                           0.010000 (Hartree/Particle)
 Thermal correction to Gibbs Free Energy=         0.010000
 Sum of electronic and thermal Free Energies=          {:.6}
 Normal termination of Gaussian 16 at Mon Jan  6 12:00:00 2025.
",
            scf,
            scf + 0.013
        );
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_happy_extract_end_to_end() {
        let dir = tempdir().unwrap();
        write_log(dir.path(), "b.log", -76.2);
        write_log(dir.path(), "a.log", -76.1);
        write_log(dir.path(), "c.log", -76.3);

        let config = test_config();
        let cancel = CancelFlag::new();
        let code = run_extract(dir.path(), &config, &cancel).unwrap();
        assert_eq!(code, 0);

        let report_name = format!("{}.results", directory_name(dir.path()));
        let report = std::fs::read_to_string(dir.path().join(report_name)).unwrap();
        assert!(report.starts_with("QCHarvest v"));
        assert!(report.contains("Successfully processed 3/3 files."));
        assert!(report.contains("Output name"));
        assert_eq!(report.matches("DONE").count(), 3);

        // Sorted ascending by G kJ/mol: c < b < a
        let c_pos = report.find("c.log").unwrap();
        let b_pos = report.find("b.log").unwrap();
        let a_pos = report.find("a.log").unwrap();
        assert!(c_pos < b_pos && b_pos < a_pos);
    }

    #[test]
    fn test_csv_extract_end_to_end() {
        let dir = tempdir().unwrap();
        write_log(dir.path(), "a.log", -76.1);

        let mut config = test_config();
        config.format = OutputFormat::Csv;
        let code = run_extract(dir.path(), &config, &CancelFlag::new()).unwrap();
        assert_eq!(code, 0);

        let report_name = format!("{}.csv", directory_name(dir.path()));
        let report = std::fs::read_to_string(dir.path().join(report_name)).unwrap();
        assert!(report.contains("Output name,ETG kJ/mol"));
        assert!(report.contains("\"a.log\","));
    }

    #[test]
    fn test_empty_directory_exits_cleanly() {
        let dir = tempdir().unwrap();
        let code = run_extract(dir.path(), &test_config(), &CancelFlag::new()).unwrap();
        assert_eq!(code, 0);
        // No report file is produced
        let report_name = format!("{}.results", directory_name(dir.path()));
        assert!(!dir.path().join(report_name).exists());
    }

    #[test]
    fn test_oversized_only_directory_treated_as_empty() {
        let dir = tempdir().unwrap();
        let mut f = File::create(dir.path().join("huge.log")).unwrap();
        f.write_all(&vec![b'x'; 2 * 1024 * 1024]).unwrap();

        let mut config = test_config();
        config.max_file_size_mb = 1;
        let code = run_extract(dir.path(), &config, &CancelFlag::new()).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn test_unreadable_records_keep_batch_alive() {
        let dir = tempdir().unwrap();
        write_log(dir.path(), "good.log", -76.1);
        // A directory with a matching name is filtered out at discovery;
        // an unreadable file surfaces as a per-file error instead.
        File::create(dir.path().join("empty.log")).unwrap();

        let config = test_config();
        let code = run_extract(dir.path(), &config, &CancelFlag::new()).unwrap();
        assert_eq!(code, 0);

        let report_name = format!("{}.results", directory_name(dir.path()));
        let report = std::fs::read_to_string(dir.path().join(report_name)).unwrap();
        // The empty file parses to an UNDONE record with zero fields
        assert!(report.contains("empty.log"));
        assert!(report.contains("UNDONE"));
        assert!(report.contains("good.log"));
    }

    #[test]
    fn test_record_status_helper() {
        assert_eq!(Status::Done.as_str(), "DONE");
        assert_eq!(Status::Undone.as_str(), "UNDONE");
        assert_eq!(Status::Error.as_str(), "ERROR");
    }
}

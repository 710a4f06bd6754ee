//! Job classification and relocation
//!
//! Classifies each output file into at most one status bucket and moves the
//! file, together with its sibling artifacts (input deck, checkpoint), into
//! the bucket's directory. Classification priority is fixed:
//! completed > generic error > solvent-model nonconvergence > running.
//!
//! The generic-error rule carries an upstream quirk that must not be
//! simplified: informational messages beginning with "Error on" are not
//! failures, so a tail window whose only "Error" lines are "Error on" lines
//! classifies as running, not as an error.

use crate::extract::ParseContext;
use crate::scheduler::policy;
use crate::scheduler::JobAllocation;
use crate::util::tail::{read_window, ReadMode};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Lines inspected by the tail-window pre-classifier.
const TAIL_WINDOW_LINES: usize = 10;
/// Window for the solvent-model scan; the sentinel is usually near the end.
const PCM_WINDOW_LINES: usize = 100;
/// The solvent-model nonconvergence sentinel emitted by the package.
const PCM_FAILURE_SENTINEL: &str = "failed in PCMMkU";

/// Classification outcome for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    Error,
    PcmFailed,
    Running,
    Unknown,
}

/// One classified file with its diagnostic and sibling artifacts.
#[derive(Debug, Clone)]
pub struct JobCheckResult {
    pub file_name: String,
    pub status: JobStatus,
    pub diagnostic: Option<String>,
    pub related_files: Vec<String>,
}

impl JobCheckResult {
    fn new(file_name: &str, status: JobStatus) -> Self {
        Self {
            file_name: file_name.to_string(),
            status,
            diagnostic: None,
            related_files: Vec::new(),
        }
    }
}

/// Counters and diagnostics for one checker command.
#[derive(Debug, Default)]
pub struct CheckSummary {
    pub total_files: usize,
    pub processed_files: usize,
    pub matched_files: usize,
    pub moved_files: usize,
    pub failed_moves: usize,
    pub errors: Vec<String>,
    pub execution_secs: f64,
}

/// Classification + relocation engine over one working directory.
pub struct JobChecker<'a> {
    ctx: &'a ParseContext,
    dir: PathBuf,
    workers: usize,
    quiet: bool,
    show_details: bool,
}

impl<'a> JobChecker<'a> {
    pub fn new(ctx: &'a ParseContext, dir: &Path, alloc: &JobAllocation, requested: usize) -> Self {
        Self {
            ctx,
            dir: dir.to_path_buf(),
            // File count is applied per command, once the listing is known
            workers: policy::safe_worker_count(requested, usize::MAX, alloc),
            quiet: false,
            show_details: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn show_details(mut self, show: bool) -> Self {
        self.show_details = show;
        self
    }

    /// Move completed jobs into `<cwd-name>-<suffix>`.
    pub fn check_completed_jobs(&self, files: &[String], suffix: &str) -> CheckSummary {
        let target = format!("{}-{}", self.dir_name(), suffix);
        self.single_bucket_pass(files, &target, "completed", |checker, file| {
            let result = checker.check_job_status(file);
            (result.status == JobStatus::Completed).then_some(result)
        })
    }

    /// Move error-terminated jobs into `target` (default `errorJobs`).
    pub fn check_error_jobs(&self, files: &[String], target: &str) -> CheckSummary {
        self.single_bucket_pass(files, target, "error", |checker, file| {
            let result = checker.check_error_directly(file);
            (result.status == JobStatus::Error).then_some(result)
        })
    }

    /// Move solvent-model nonconvergence failures into `target`.
    pub fn check_pcm_failures(&self, files: &[String], target: &str) -> CheckSummary {
        self.single_bucket_pass(files, target, "PCM failed", |checker, file| {
            let result = checker.check_pcm_directly(file);
            (result.status == JobStatus::PcmFailed).then_some(result)
        })
    }

    /// Move jobs with imaginary frequencies into `<cwd-name>-<suffix>`.
    pub fn check_imaginary_frequencies(&self, files: &[String], suffix: &str) -> CheckSummary {
        let target = format!("{}-{}", self.dir_name(), suffix);
        self.single_bucket_pass(files, &target, "imaginary frequency", |checker, file| {
            match checker.has_imaginary_frequency(file) {
                Ok(true) => {
                    let mut result = JobCheckResult::new(file, JobStatus::Unknown);
                    result.related_files = checker.find_related_files(file);
                    Some(result)
                }
                Ok(false) => None,
                Err(e) => {
                    checker
                        .ctx
                        .sink
                        .add_error(format!("Error checking {}: {}", file, e));
                    None
                }
            }
        })
    }

    /// The fused single-pass classifier: one parallel classification, then
    /// every non-empty bucket is moved. Running and Unknown never move.
    pub fn check_all_job_types(
        &self,
        files: &[String],
        done_suffix: &str,
        error_dir: &str,
        pcm_dir: &str,
    ) -> CheckSummary {
        let mut summary = CheckSummary {
            total_files: files.len(),
            ..CheckSummary::default()
        };
        let start_time = Instant::now();

        if !self.quiet {
            println!("Running optimized all job checks...");
            println!("Found {} files", files.len());
        }

        let done_dir = format!("{}-{}", self.dir_name(), done_suffix);
        for target in [done_dir.as_str(), error_dir, pcm_dir] {
            if let Err(e) = self.create_target_directory(target) {
                summary
                    .errors
                    .push(format!("Failed to create target directory {}: {}", target, e));
                return summary;
            }
        }

        let workers = self.workers.min(files.len()).max(1);
        if !self.quiet {
            println!("Using {} threads for single-pass classification", workers);
        }

        let (classified, processed) =
            self.parallel_pass(files, workers, "classifying", |checker, file| {
                Some(checker.check_job_status(file))
            });
        summary.processed_files = processed;

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        let mut pcm_failed = Vec::new();
        for result in classified {
            match result.status {
                JobStatus::Completed => completed.push(result),
                JobStatus::Error => failed.push(result),
                JobStatus::PcmFailed => pcm_failed.push(result),
                JobStatus::Running | JobStatus::Unknown => {}
            }
        }
        summary.matched_files = completed.len() + failed.len() + pcm_failed.len();

        if !self.quiet {
            println!("\n=== Classification Results ===");
            println!("Completed jobs found: {}", completed.len());
            println!("Error jobs found: {}", failed.len());
            println!("PCM failed jobs found: {}", pcm_failed.len());
        }

        self.move_bucket(&completed, &done_dir, &mut summary);
        self.move_bucket(&failed, error_dir, &mut summary);
        self.move_bucket(&pcm_failed, pcm_dir, &mut summary);

        summary.execution_secs = start_time.elapsed().as_secs_f64();

        if !self.quiet {
            println!("\n=== Overall Summary ===");
            println!("Total files processed: {}", summary.processed_files);
            println!("Total files moved: {}", summary.moved_files);
            if summary.failed_moves > 0 {
                println!("Failed moves: {}", summary.failed_moves);
            }
            println!(
                "Total execution time: {:.3} seconds",
                summary.execution_secs
            );
        }

        summary
    }

    // === classification primitives ===

    /// Full-priority classification of one file.
    pub fn check_job_status(&self, file: &str) -> JobCheckResult {
        let path = self.dir.join(file);
        let tail = match read_window(&path, ReadMode::Tail(TAIL_WINDOW_LINES)) {
            Ok(tail) => tail,
            Err(e) => {
                let mut result = JobCheckResult::new(file, JobStatus::Unknown);
                result.diagnostic = Some(format!("Failed to read file: {}", e));
                return result;
            }
        };

        if tail.contains("Normal") {
            let mut result = JobCheckResult::new(file, JobStatus::Completed);
            result.related_files = self.find_related_files(file);
            return result;
        }

        if let Some(message) = error_termination(&tail) {
            let mut result = JobCheckResult::new(file, JobStatus::Error);
            result.diagnostic = Some(message);
            result.related_files = self.find_related_files(file);
            return result;
        }

        match read_window(
            &path,
            ReadMode::Smart {
                lines: PCM_WINDOW_LINES,
                pattern: PCM_FAILURE_SENTINEL,
            },
        ) {
            Ok(content) if content.contains(PCM_FAILURE_SENTINEL) => {
                let mut result = JobCheckResult::new(file, JobStatus::PcmFailed);
                result.diagnostic = Some(PCM_FAILURE_SENTINEL.to_string());
                result.related_files = self.find_related_files(file);
                result
            }
            Ok(_) => JobCheckResult::new(file, JobStatus::Running),
            Err(e) => {
                let mut result = JobCheckResult::new(file, JobStatus::Unknown);
                result.diagnostic = Some(format!("Failed to read file: {}", e));
                result
            }
        }
    }

    /// Error check independent of the other buckets; completed files are
    /// recognized so they are never misfiled, but they are not collected.
    fn check_error_directly(&self, file: &str) -> JobCheckResult {
        let path = self.dir.join(file);
        let tail = match read_window(&path, ReadMode::Tail(TAIL_WINDOW_LINES)) {
            Ok(tail) => tail,
            Err(e) => {
                let mut result = JobCheckResult::new(file, JobStatus::Unknown);
                result.diagnostic = Some(format!("Failed to read file: {}", e));
                return result;
            }
        };

        if tail.contains("Normal") {
            return JobCheckResult::new(file, JobStatus::Completed);
        }

        if let Some(message) = error_termination(&tail) {
            let mut result = JobCheckResult::new(file, JobStatus::Error);
            result.diagnostic = Some(message);
            result.related_files = self.find_related_files(file);
            if self.show_details && !self.quiet {
                eprintln!(
                    "DEBUG ERROR: {} -> {}",
                    file,
                    result.diagnostic.as_deref().unwrap_or("")
                );
            }
            return result;
        }

        JobCheckResult::new(file, JobStatus::Running)
    }

    /// Solvent-model check independent of the other buckets.
    fn check_pcm_directly(&self, file: &str) -> JobCheckResult {
        let path = self.dir.join(file);
        match read_window(
            &path,
            ReadMode::Smart {
                lines: PCM_WINDOW_LINES,
                pattern: PCM_FAILURE_SENTINEL,
            },
        ) {
            Ok(content) if content.contains(PCM_FAILURE_SENTINEL) => {
                let mut result = JobCheckResult::new(file, JobStatus::PcmFailed);
                result.diagnostic = Some(PCM_FAILURE_SENTINEL.to_string());
                result.related_files = self.find_related_files(file);
                result
            }
            Ok(_) => JobCheckResult::new(file, JobStatus::Unknown),
            Err(e) => {
                let mut result = JobCheckResult::new(file, JobStatus::Unknown);
                result.diagnostic = Some(format!("Failed to read file: {}", e));
                result
            }
        }
    }

    /// Whether any frequency line in the file carries a negative value.
    fn has_imaginary_frequency(&self, file: &str) -> std::io::Result<bool> {
        let content = read_window(&self.dir.join(file), ReadMode::Full)?;
        for line in content.lines() {
            if let Some(dashes) = line.find("Frequencies --") {
                for token in line[dashes + "Frequencies --".len()..].split_whitespace() {
                    match crate::util::numeric::parse_f64(token) {
                        Some(freq) if freq < 0.0 => return Ok(true),
                        Some(_) => {}
                        None => break,
                    }
                }
            }
        }
        Ok(false)
    }

    /// Sibling artifacts sharing the file's stem: the configured input
    /// extensions plus the checkpoint file, existing files only.
    pub fn find_related_files(&self, file: &str) -> Vec<String> {
        let path = Path::new(file);
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return Vec::new();
        };
        let own_ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut extensions = self.ctx.input_extensions.clone();
        extensions.push(".chk".to_string());

        let mut related = Vec::new();
        for ext in extensions {
            if ext == own_ext {
                continue;
            }
            let candidate = format!("{}{}", stem, ext);
            if self.dir.join(&candidate).exists() {
                related.push(candidate);
            }
        }
        related
    }

    /// Rename the classified file and its siblings into `target_dir`.
    ///
    /// A failed rename is recorded in the sink; later moves still run.
    pub fn move_job_files(&self, result: &JobCheckResult, target_dir: &str) -> bool {
        let target = self.dir.join(target_dir);

        let source = self.dir.join(&result.file_name);
        let dest = target.join(&result.file_name);
        if let Err(e) = std::fs::rename(&source, &dest) {
            self.ctx.sink.add_error(format!(
                "Failed to move files for {}: {}",
                result.file_name, e
            ));
            return false;
        }

        for related in &result.related_files {
            let source = self.dir.join(related);
            if source.exists() {
                if let Err(e) = std::fs::rename(&source, target.join(related)) {
                    self.ctx
                        .sink
                        .add_error(format!("Failed to move files for {}: {}", related, e));
                }
            }
        }

        true
    }

    pub fn create_target_directory(&self, target_dir: &str) -> std::io::Result<()> {
        let path = self.dir.join(target_dir);
        if !path.exists() {
            std::fs::create_dir_all(&path)?;
        }
        Ok(())
    }

    pub fn print_summary(&self, summary: &CheckSummary, operation: &str) {
        if self.quiet {
            return;
        }
        println!("\n{} completed:", operation);
        println!(
            "Files processed: {}/{}",
            summary.processed_files, summary.total_files
        );
        println!("Files matched: {}", summary.matched_files);
        println!("Files moved: {}", summary.moved_files);
        if summary.failed_moves > 0 {
            println!("Failed moves: {}", summary.failed_moves);
        }
        println!("Execution time: {:.3} seconds", summary.execution_secs);
        if !summary.errors.is_empty() {
            println!("\nErrors encountered:");
            for error in &summary.errors {
                println!("  {}", error);
            }
        }
    }

    // === internals ===

    fn dir_name(&self) -> String {
        crate::coordinator::directory_name(&self.dir)
    }

    /// One classify-then-move command over a single bucket.
    fn single_bucket_pass(
        &self,
        files: &[String],
        target_dir: &str,
        label: &str,
        classify: impl Fn(&Self, &str) -> Option<JobCheckResult> + Sync,
    ) -> CheckSummary {
        let mut summary = CheckSummary {
            total_files: files.len(),
            ..CheckSummary::default()
        };
        let start_time = Instant::now();

        if let Err(e) = self.create_target_directory(target_dir) {
            summary.errors.push(format!(
                "Failed to create target directory {}: {}",
                target_dir, e
            ));
            return summary;
        }

        if !self.quiet {
            println!("Found {} files", files.len());
            println!("Checking for {} jobs...", label);
        }

        let workers = self.workers.min(files.len()).max(1);
        if !self.quiet {
            println!("Using {} threads", workers);
        }

        let (matched, processed) = self.parallel_pass(files, workers, "checking", classify);
        summary.processed_files = processed;
        summary.matched_files = matched.len();

        if matched.is_empty() {
            if !self.quiet {
                println!("No {} jobs found", label);
            }
        } else {
            if !self.quiet {
                println!("Found {} {} jobs", matched.len(), label);
                println!("Moving files to {}/", target_dir);
            }
            self.move_bucket(&matched, target_dir, &mut summary);
        }

        summary.execution_secs = start_time.elapsed().as_secs_f64();
        summary
    }

    /// Shared fan-out: workers pull indices from the atomic counter and run
    /// `classify`; kept results and the processed count come back together
    /// after the join. Unreadable files classify as Unknown and never match.
    fn parallel_pass(
        &self,
        files: &[String],
        workers: usize,
        operation: &str,
        classify: impl Fn(&Self, &str) -> Option<JobCheckResult> + Sync,
    ) -> (Vec<JobCheckResult>, usize) {
        let matched: Mutex<Vec<JobCheckResult>> = Mutex::new(Vec::new());
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
                    if let Some(result) = classify(self, file) {
                        matched
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .push(result);
                    }

                    let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    if !self.quiet && done % 50 == 0 {
                        print!(
                            "\r{}: {}/{} files ({:.0}%)",
                            operation,
                            done,
                            files.len(),
                            done as f64 * 100.0 / files.len() as f64
                        );
                        std::io::stdout().flush().ok();
                    }
                });
            }
        });

        let processed = processed.load(Ordering::Relaxed);
        if !self.quiet && processed > 0 {
            println!(
                "\r{}: {}/{} files ({:.0}%)",
                operation,
                processed,
                files.len(),
                processed as f64 * 100.0 / files.len() as f64
            );
        }

        (
            matched
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            processed,
        )
    }

    fn move_bucket(&self, bucket: &[JobCheckResult], target_dir: &str, summary: &mut CheckSummary) {
        for job in bucket {
            if self.move_job_files(job, target_dir) {
                summary.moved_files += 1;
                if !self.quiet {
                    match (&job.diagnostic, job.status) {
                        (Some(message), JobStatus::Error) => {
                            println!("{}: {}", job.file_name, message)
                        }
                        (Some(message), JobStatus::PcmFailed) => {
                            println!("{} {}", job.file_name, message)
                        }
                        _ => println!("{} done", job.file_name),
                    }
                }
            } else {
                summary.failed_moves += 1;
            }
        }
    }
}

/// The generic-error rule over a tail window.
///
/// Returns the last "Error" line when the window contains at least one line
/// with "Error" and none of those lines contains "Error on".
fn error_termination(content: &str) -> Option<String> {
    let error_lines: Vec<&str> = content
        .lines()
        .filter(|line| line.contains("Error"))
        .collect();

    if error_lines.is_empty() {
        return None;
    }
    if error_lines.iter().any(|line| line.contains("Error on")) {
        return None;
    }
    error_lines.last().map(|line| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn checker_ctx() -> ParseContext {
        ParseContext::new(298.15, 1000.0, false)
    }

    fn checker<'a>(ctx: &'a ParseContext, dir: &Path) -> JobChecker<'a> {
        JobChecker::new(ctx, dir, &JobAllocation::default(), 2).quiet(true)
    }

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    const DONE_LOG: &str = "\
 Copyright (c) 1988-2019, Gaussian, Inc.
 SCF Done:  E(RB3LYP) =  -76.1     A.U. after 9 cycles
 Normal termination of Gaussian 16 at Mon Jan  6 12:00:00 2025.
";

    const ERROR_LOG: &str = "\
 Copyright (c) 1988-2019, Gaussian, Inc.
 SCF Done:  E(RB3LYP) =  -76.1     A.U. after 9 cycles
 Error termination request processed by link 9999.
";

    #[test]
    fn test_error_termination_rule() {
        assert!(error_termination("all good\nnothing here\n").is_none());
        assert_eq!(
            error_termination("ok\n Error termination via Lnk1e\n").as_deref(),
            Some(" Error termination via Lnk1e")
        );
        // The quirk: "Error on" lines suppress the whole classification
        assert!(error_termination(" Error on output file header\n").is_none());
        assert!(
            error_termination(" Error termination\n Error on output file header\n").is_none()
        );
    }

    #[test]
    fn test_classification_priority() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "done.log", DONE_LOG);
        write_file(dir.path(), "err.log", ERROR_LOG);
        write_file(
            dir.path(),
            "run.log",
            " Copyright (c) 1988\n SCF Done:  E(RB3LYP) =  -76.1     A.U.\n still going\n",
        );

        let ctx = checker_ctx();
        let checker = checker(&ctx, dir.path());
        assert_eq!(
            checker.check_job_status("done.log").status,
            JobStatus::Completed
        );
        assert_eq!(checker.check_job_status("err.log").status, JobStatus::Error);
        assert_eq!(
            checker.check_job_status("run.log").status,
            JobStatus::Running
        );
    }

    #[test]
    fn test_classifier_is_idempotent() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "done.log", DONE_LOG);
        let ctx = checker_ctx();
        let checker = checker(&ctx, dir.path());
        let first = checker.check_job_status("done.log");
        let second = checker.check_job_status("done.log");
        assert_eq!(first.status, second.status);
        assert_eq!(first.related_files, second.related_files);
    }

    #[test]
    fn test_pcm_wins_over_error_on_lines() {
        // Tail has "Error on" lines only, so no generic error; the sentinel
        // sits in the body and is found by the full-file fallback.
        let dir = tempdir().unwrap();
        let filler = " filler\n".repeat(200);
        let content = format!(
            " Copyright (c) 1988\n failed in PCMMkU\n{} Error on output file header\n Error on output file header\n",
            filler
        );
        write_file(dir.path(), "pcm.log", &content);
        write_file(dir.path(), "pcm.chk", "checkpoint");
        write_file(dir.path(), "pcm.gau", "deck");

        let ctx = ParseContext {
            input_extensions: vec![".com".into(), ".gjf".into(), ".gau".into()],
            ..checker_ctx()
        };
        let checker = checker(&ctx, dir.path());
        let result = checker.check_job_status("pcm.log");
        assert_eq!(result.status, JobStatus::PcmFailed);
        assert_eq!(result.diagnostic.as_deref(), Some("failed in PCMMkU"));
        assert!(result.related_files.contains(&"pcm.chk".to_string()));
        assert!(result.related_files.contains(&"pcm.gau".to_string()));

        // And the fused pass moves the trio into the PCM directory
        let files = vec!["pcm.log".to_string()];
        let summary = checker.check_all_job_types(&files, "done", "errorJobs", "PCMMkU");
        assert_eq!(summary.matched_files, 1);
        assert_eq!(summary.moved_files, 1);
        assert!(dir.path().join("PCMMkU/pcm.log").exists());
        assert!(dir.path().join("PCMMkU/pcm.chk").exists());
        assert!(dir.path().join("PCMMkU/pcm.gau").exists());
        assert!(!dir.path().join("pcm.log").exists());
    }

    #[test]
    fn test_fused_pass_buckets_and_counts() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "done.log", DONE_LOG);
        write_file(dir.path(), "err.log", ERROR_LOG);
        write_file(dir.path(), "run.log", " Copyright\n still going\n");

        let ctx = checker_ctx();
        let checker = checker(&ctx, dir.path());
        let files = vec![
            "done.log".to_string(),
            "err.log".to_string(),
            "run.log".to_string(),
        ];
        let summary = checker.check_all_job_types(&files, "done", "errorJobs", "PCMMkU");

        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.processed_files, 3);
        assert_eq!(summary.matched_files, 2);
        assert_eq!(summary.moved_files, 2);
        assert!(summary.moved_files <= summary.matched_files);
        assert!(summary.matched_files <= summary.processed_files);
        assert!(summary.processed_files <= summary.total_files);

        let done_dir = format!("{}-done", crate::coordinator::directory_name(dir.path()));
        assert!(dir.path().join(done_dir).join("done.log").exists());
        assert!(dir.path().join("errorJobs/err.log").exists());
        // Running jobs stay in place
        assert!(dir.path().join("run.log").exists());
    }

    #[test]
    fn test_verdict_survives_relocation() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "done.log", DONE_LOG);
        let ctx = checker_ctx();
        let c = checker(&ctx, dir.path());
        let files = vec!["done.log".to_string()];
        let summary = c.check_completed_jobs(&files, "done");
        assert_eq!(summary.moved_files, 1);

        // Re-classify in the new directory: same verdict
        let moved_dir = dir
            .path()
            .join(format!("{}-done", crate::coordinator::directory_name(dir.path())));
        let c2 = JobChecker::new(&ctx, &moved_dir, &JobAllocation::default(), 1).quiet(true);
        assert_eq!(
            c2.check_job_status("done.log").status,
            JobStatus::Completed
        );
    }

    #[test]
    fn test_error_command_skips_error_on_only_files(){
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "info.log",
            " Copyright\n Error on output file header\n",
        );
        let ctx = checker_ctx();
        let checker = checker(&ctx, dir.path());
        let files = vec!["info.log".to_string()];
        let summary = checker.check_error_jobs(&files, "errorJobs");
        assert_eq!(summary.matched_files, 0);
        assert!(dir.path().join("info.log").exists());
    }

    #[test]
    fn test_imaginary_frequency_command() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "ts.log",
            "\
 Copyright (c) 1988-2019, Gaussian, Inc.
 Frequencies --   -412.3000               120.5000               200.0000
 Normal termination of Gaussian 16 at Mon Jan  6 12:00:00 2025.
",
        );
        write_file(
            dir.path(),
            "min.log",
            "\
 Copyright (c) 1988-2019, Gaussian, Inc.
 Frequencies --    120.5000               200.0000               300.0000
 Normal termination of Gaussian 16 at Mon Jan  6 12:00:00 2025.
",
        );

        let ctx = checker_ctx();
        let checker = checker(&ctx, dir.path());
        let files = vec!["ts.log".to_string(), "min.log".to_string()];
        let summary = checker.check_imaginary_frequencies(&files, "imaginary_freqs");
        assert_eq!(summary.matched_files, 1);
        assert_eq!(summary.moved_files, 1);

        let target = format!(
            "{}-imaginary_freqs",
            crate::coordinator::directory_name(dir.path())
        );
        assert!(dir.path().join(target).join("ts.log").exists());
        assert!(dir.path().join("min.log").exists());
    }

    #[test]
    fn test_handle_pool_restored_after_command() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "done.log", DONE_LOG);
        let ctx = checker_ctx();
        let checker = checker(&ctx, dir.path());
        let files = vec!["done.log".to_string()];
        let _ = checker.check_all_job_types(&files, "done", "errorJobs", "PCMMkU");
        assert_eq!(ctx.handles.available(), ctx.handles.max());
    }
}

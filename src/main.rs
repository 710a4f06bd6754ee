//! QCHarvest CLI entry point

use anyhow::Result;
use qcharvest::checker::JobChecker;
use qcharvest::config::cli::{Cli, Verb};
use qcharvest::config::settings::Settings;
use qcharvest::config::Config;
use qcharvest::coordinator;
use qcharvest::coords;
use qcharvest::highlevel;
use qcharvest::scheduler;
use qcharvest::util::cancel::{install_signal_handler, CancelFlag};
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<u8> {
    let cli = Cli::parse_args();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load_default(),
    };
    let config = Config::from_cli(&cli, &settings)?;

    if !config.quiet {
        println!("QCHarvest v{}", env!("CARGO_PKG_VERSION"));
        println!("{}", env!("CARGO_PKG_DESCRIPTION"));
        println!();
    }

    let cancel = CancelFlag::new();
    install_signal_handler(&cancel);

    let dir = Path::new(".");
    match cli.verb() {
        Verb::Extract => coordinator::run_extract(dir, &config, &cancel),
        Verb::HighKj => highlevel::run_high_level(dir, &config, &cancel, false),
        Verb::HighAu => highlevel::run_high_level(dir, &config, &cancel, true),
        Verb::Xyz => coords::run_xyz(dir, &config, &cancel),
        verb => run_checker(verb, dir, &config, &cancel),
    }
}

/// The classification + relocation verbs share one driver.
fn run_checker(verb: Verb, dir: &Path, config: &Config, cancel: &CancelFlag) -> Result<u8> {
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

    let checker = JobChecker::new(&ctx, dir, &alloc, config.requested_threads)
        .quiet(config.quiet)
        .show_details(config.show_details);

    let (summary, operation) = match verb {
        Verb::Done => (
            checker.check_completed_jobs(&files, &config.dir_suffix),
            "Completed job check",
        ),
        Verb::Errors => (
            checker.check_error_jobs(
                &files,
                config
                    .target_dir
                    .as_deref()
                    .unwrap_or(&config.error_directory),
            ),
            "Error job check",
        ),
        Verb::Pcm => (
            checker.check_pcm_failures(
                &files,
                config
                    .target_dir
                    .as_deref()
                    .unwrap_or(&config.pcm_directory),
            ),
            "PCM failure check",
        ),
        Verb::Imode => (
            checker.check_imaginary_frequencies(&files, "imaginary_freqs"),
            "Imaginary frequency check",
        ),
        Verb::Check => (
            checker.check_all_job_types(
                &files,
                &config.dir_suffix,
                &config.error_directory,
                &config.pcm_directory,
            ),
            "All job checks",
        ),
        _ => unreachable!("non-checker verb dispatched to run_checker"),
    };

    checker.print_summary(&summary, operation);

    for error in ctx.sink.errors() {
        eprintln!("  {}", error);
    }

    Ok(
        if summary.processed_files == 0 && !summary.errors.is_empty() {
            1
        } else {
            0
        },
    )
}

//! Runtime configuration
//!
//! The effective configuration is the settings file's defaults overridden by
//! whatever the user passed on the command line. The merge happens once,
//! before any worker starts; the resulting [`Config`] is read-only for the
//! rest of the run.

pub mod cli;
pub mod settings;

use crate::output::OutputFormat;
use crate::Result;
use cli::{Cli, FormatArg};
use settings::Settings;

/// Merged, validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub quiet: bool,
    pub requested_threads: usize,
    pub extension: String,
    pub max_file_size_mb: u64,
    pub batch_size: usize,
    pub memory_limit_mb: u64,
    /// Base temperature in K.
    pub temperature: f64,
    /// True when the user pinned a temperature for every file.
    pub fixed_temperature: bool,
    /// Concentration in mol/m³.
    pub concentration: f64,
    pub sort_column: u32,
    pub format: OutputFormat,
    pub target_dir: Option<String>,
    pub dir_suffix: String,
    pub error_directory: String,
    pub pcm_directory: String,
    pub show_details: bool,
    pub input_extensions: Vec<String>,
    /// Warnings from the settings layer, reproduced in report headers.
    pub startup_warnings: Vec<String>,
}

impl Config {
    pub fn from_cli(cli: &Cli, settings: &Settings) -> Result<Self> {
        let requested_threads = resolve_thread_spec(&thread_spec(cli, settings))?;

        let format = match cli.format {
            Some(FormatArg::Text) => OutputFormat::Text,
            Some(FormatArg::Csv) => OutputFormat::Csv,
            None => OutputFormat::parse(&settings.get_string("default_output_format", "text"))?,
        };

        // Settings hold the concentration in M; the flag takes mol/m³.
        let concentration = cli
            .concentration
            .unwrap_or_else(|| settings.get_f64("default_concentration", 1.0) * 1000.0);

        Ok(Self {
            quiet: cli.quiet || settings.get_bool("quiet_mode", false),
            requested_threads,
            extension: if cli.extension == ".log" {
                settings.get_string("output_extension", ".log")
            } else {
                cli.extension.clone()
            },
            max_file_size_mb: if cli.max_file_size != 100 {
                cli.max_file_size
            } else {
                settings.get_u64("max_file_size_mb", 100)
            },
            batch_size: cli.batch_size,
            memory_limit_mb: if cli.memory_limit != 0 {
                cli.memory_limit
            } else {
                settings.get_u64("memory_limit_mb", 0)
            },
            temperature: cli
                .temperature
                .unwrap_or_else(|| settings.get_f64("default_temperature", 298.15)),
            fixed_temperature: cli.temperature.is_some(),
            concentration,
            sort_column: cli
                .sort_column
                .unwrap_or_else(|| settings.get_u32("default_sort_column", 2)),
            format,
            target_dir: cli.target_dir.clone(),
            dir_suffix: cli
                .dir_suffix
                .clone()
                .unwrap_or_else(|| settings.get_string("done_directory_suffix", "done")),
            error_directory: settings.get_string("error_directory_name", "errorJobs"),
            pcm_directory: settings.get_string("pcm_directory_name", "PCMMkU"),
            show_details: cli.show_details || settings.get_bool("show_error_details", false),
            input_extensions: settings
                .get_extensions("input_extensions", &[".com", ".gjf", ".gau"]),
            startup_warnings: settings.warnings.clone(),
        })
    }
}

fn thread_spec(cli: &Cli, settings: &Settings) -> String {
    if cli.threads != "half" {
        cli.threads.clone()
    } else {
        settings.get_string("default_threads", "half")
    }
}

/// Resolve a thread spec (`half`, `max`, or a count) against the hardware.
pub fn resolve_thread_spec(spec: &str) -> Result<usize> {
    resolve_thread_spec_on(spec, crate::scheduler::policy::hardware_cores())
}

pub fn resolve_thread_spec_on(spec: &str, cores: usize) -> Result<usize> {
    match spec {
        "half" => Ok((cores / 2).max(1)),
        "max" => Ok(cores.max(1)),
        n => {
            let count: usize = n
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid thread count: '{}'", n))?;
            if count == 0 {
                anyhow::bail!("Thread count must be at least 1");
            }
            Ok(count)
        }
    }
}

//! CLI argument parsing using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// QCHarvest - Parallel batch extractor for quantum-chemistry output files
#[derive(Parser, Debug)]
#[command(name = "qcharvest")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Command to run; extraction is the default
    #[command(subcommand)]
    pub command: Option<Verb>,

    // === Common Options ===
    /// Number of worker threads: a count, "half", or "max"
    #[arg(short = 'n', long, default_value = "half", global = true)]
    pub threads: String,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// File extension to process (".log" also searches ".out")
    #[arg(short = 'e', long = "ext", default_value = ".log", global = true)]
    pub extension: String,

    /// Maximum individual file size in MB
    #[arg(long, default_value = "100", global = true)]
    pub max_file_size: u64,

    /// Batch size for listing huge directories (0 = disabled)
    #[arg(long, default_value = "0", global = true)]
    pub batch_size: usize,

    /// Memory limit in MB (0 = derive from system and workers)
    #[arg(long, default_value = "0", global = true)]
    pub memory_limit: u64,

    /// Custom target directory name for relocation commands
    #[arg(long, global = true)]
    pub target_dir: Option<String>,

    /// Suffix for the completed-jobs directory
    #[arg(long, global = true)]
    pub dir_suffix: Option<String>,

    /// Show detailed error messages from classified files
    #[arg(long, global = true)]
    pub show_details: bool,

    /// Settings file to load instead of the default locations
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    // === Extraction Options ===
    /// Temperature in K, applied to every file (default: each file's own)
    #[arg(short = 't', long = "temp", global = true)]
    pub temperature: Option<f64>,

    /// Concentration in mol/m3 for the phase correction
    #[arg(short = 'c', long, global = true)]
    pub concentration: Option<f64>,

    /// Report sort column (1-7 or 10)
    #[arg(long, value_parser = parse_sort_column, global = true)]
    pub sort_column: Option<u32>,

    /// Report format
    #[arg(short = 'f', long, value_enum, global = true)]
    pub format: Option<FormatArg>,
}

/// Dispatch verbs
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Extract thermodynamic quantities into a report (default)
    Extract,
    /// Move completed jobs into the done directory
    Done,
    /// Move error-terminated jobs into errorJobs
    Errors,
    /// Move solvent-model nonconvergence failures into PCMMkU
    Pcm,
    /// Move jobs with imaginary frequencies
    Imode,
    /// Classify and relocate everything in one pass
    Check,
    /// Combine two-tier energies, compact kJ/mol output
    HighKj,
    /// Combine two-tier energies, detailed atomic-unit output
    HighAu,
    /// Extract final coordinates into .xyz files and relocate by status
    Xyz,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Text,
    Csv,
}

fn parse_sort_column(s: &str) -> Result<u32, String> {
    let column: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a column number", s))?;
    if (1..=7).contains(&column) || column == 10 {
        Ok(column)
    } else {
        Err(format!(
            "column {} is out of range (expected 1-7 or 10)",
            column
        ))
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn verb(&self) -> Verb {
        self.command.unwrap_or(Verb::Extract)
    }
}

//! Report generation
//!
//! Every output file starts with the same metadata banner: program version,
//! generation time, the thermodynamic parameters the run used, resource
//! figures, and the collected warnings and errors reproduced verbatim. The
//! table that follows is either fixed-width text or CSV.

pub mod csv;
pub mod text;

use crate::extract::phase_correction_hartree;
use crate::util::format_memory_size;
use std::fmt::Write as _;

/// Report table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Csv,
}

impl OutputFormat {
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "csv" => Ok(OutputFormat::Csv),
            other => anyhow::bail!(
                "Invalid format '{}'. Supported formats: 'text', 'csv'.",
                other
            ),
        }
    }

    /// Report file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Text => ".results",
            OutputFormat::Csv => ".csv",
        }
    }
}

/// Everything the metadata banner reports.
#[derive(Debug, Clone)]
pub struct ReportMeta {
    pub fixed_temperature: bool,
    pub base_temp: f64,
    /// mol/m³
    pub concentration: f64,
    pub threads: usize,
    pub processed: usize,
    pub total: usize,
    pub peak_memory_bytes: u64,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ReportMeta {
    pub fn render(&self) -> String {
        let mut out = String::new();

        writeln!(
            out,
            "QCHarvest v{} - {}",
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_DESCRIPTION")
        )
        .unwrap();
        writeln!(
            out,
            "Generated on: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )
        .unwrap();

        if self.fixed_temperature {
            writeln!(
                out,
                "Using specified temperature for all files: {:.3} K",
                self.base_temp
            )
            .unwrap();
        } else {
            writeln!(
                out,
                "Default temperature for files without specified temp: {:.3} K",
                self.base_temp
            )
            .unwrap();
        }

        writeln!(
            out,
            "The concentration for phase correction: {} M or {} mol/m3",
            self.concentration / 1000.0,
            self.concentration
        )
        .unwrap();

        let representative = phase_correction_hartree(self.base_temp, self.concentration);
        writeln!(
            out,
            "Representative Gibbs free correction for phase changing at {:.3} K: {:.6} au",
            self.base_temp, representative
        )
        .unwrap();

        writeln!(out, "Using {} threads for processing.", self.threads).unwrap();
        writeln!(
            out,
            "Successfully processed {}/{} files.",
            self.processed, self.total
        )
        .unwrap();
        writeln!(
            out,
            "Peak memory usage: {}",
            format_memory_size(self.peak_memory_bytes)
        )
        .unwrap();

        if !self.warnings.is_empty() || !self.errors.is_empty() {
            writeln!(
                out,
                "\n-------------------------------------------------------------"
            )
            .unwrap();
            if !self.warnings.is_empty() {
                writeln!(out, "Warnings:").unwrap();
                for warning in &self.warnings {
                    writeln!(out, "- {}", warning).unwrap();
                }
            }
            if !self.errors.is_empty() {
                writeln!(out, "Errors:").unwrap();
                for error in &self.errors {
                    writeln!(out, "- {}", error).unwrap();
                }
            }
            writeln!(
                out,
                "-------------------------------------------------------------"
            )
            .unwrap();
        }

        out
    }
}

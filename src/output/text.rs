//! Fixed-width text report
//!
//! Column layout: name 53 left; G kJ/mol 18; low frequency 10; G a.u. 18;
//! nuclear repulsion 18; electronic energy 18; ZPE 10; status 8; phase 6;
//! round 6. All numeric columns right-aligned, six decimals except the
//! frequency's two.

use crate::extract::Record;
use std::fmt::Write as _;

pub fn table_header() -> String {
    let mut out = String::new();
    writeln!(
        out,
        "{:<53}{:>18}{:>10}{:>18}{:>18}{:>18}{:>10}{:>8}{:>6}{:>6}",
        "Output name",
        "ETG kJ/mol",
        "Low FC",
        "ETG a.u",
        "Nuclear E au",
        "SCFE",
        "ZPE ",
        "Status",
        "PCorr",
        "Round"
    )
    .unwrap();
    writeln!(
        out,
        "{:<53}{:>18}{:>10}{:>18}{:>18}{:>18}{:>10}{:>8}{:>6}{:>6}",
        "-".repeat(53),
        "-".repeat(18),
        "-".repeat(10),
        "-".repeat(18),
        "-".repeat(18),
        "-".repeat(18),
        "-".repeat(10),
        "-".repeat(8),
        "-".repeat(6),
        "-".repeat(6)
    )
    .unwrap();
    out
}

pub fn format_row(record: &Record) -> String {
    format!(
        "{:<53}{:>18.6}{:>10.2}{:>18.6}{:>18.6}{:>18.6}{:>10.6}{:>8}{:>6}{:>6}\n",
        record.file_name,
        record.gibbs_kj,
        record.low_freq,
        record.gibbs_hartree,
        record.nuclear_repulsion,
        record.electronic_energy,
        record.zpe,
        record.status.as_str(),
        if record.phase_corrected { "YES" } else { "NO" },
        record.round_count
    )
}

/// Render the full table: header, separator, one row per record.
pub fn render_table(records: &[Record]) -> String {
    let mut out = table_header();
    for record in records {
        out.push_str(&format_row(record));
    }
    out
}

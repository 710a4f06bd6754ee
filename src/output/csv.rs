//! CSV report
//!
//! Same columns as the text table, comma-separated, with the file name
//! double-quoted so names containing commas survive a spreadsheet import.

use crate::extract::Record;

pub fn table_header() -> String {
    "Output name,ETG kJ/mol,Low FC,ETG a.u,Nuclear E au,SCFE,ZPE,Status,PCorr,Round\n".to_string()
}

pub fn format_row(record: &Record) -> String {
    format!(
        "\"{}\",{:.6},{:.2},{:.6},{:.6},{:.6},{:.6},{},{},{}\n",
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

pub fn render_table(records: &[Record]) -> String {
    let mut out = table_header();
    for record in records {
        out.push_str(&format_row(record));
    }
    out
}

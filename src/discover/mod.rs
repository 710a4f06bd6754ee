//! Output-file discovery
//!
//! Lists the regular files of the working directory whose extension matches
//! the requested set, skipping anything above the per-file size cap. The
//! default `.log` extension implies searching `.out` as well, because both
//! are in common use for the same outputs.
//!
//! The batched variant bounds the in-memory listing for directories with
//! millions of entries: names accumulate in fixed-size sorted chunks that
//! are merged at the end.

use crate::util::cancel::CancelFlag;
use crate::util::diag::DiagnosticSink;
use crate::Result;
use anyhow::Context;
use std::path::Path;

/// Expand the requested extension into the effective search set.
///
/// `.log` (any case) searches both `.log` and `.out`; anything else searches
/// exactly what was asked for.
pub fn effective_extensions(extension: &str) -> Vec<String> {
    if extension.eq_ignore_ascii_case(".log") {
        vec![".log".to_string(), ".out".to_string()]
    } else {
        vec![extension.to_string()]
    }
}

/// List matching files in `dir`, sorted and deduplicated.
pub fn find_output_files(
    dir: &Path,
    extensions: &[String],
    max_file_size_mb: u64,
    cancel: &CancelFlag,
    sink: Option<&DiagnosticSink>,
) -> Result<Vec<String>> {
    let mut files = Vec::new();
    collect(dir, extensions, max_file_size_mb, cancel, sink, &mut files)?;
    files.sort();
    files.dedup();
    Ok(files)
}

/// Batched listing for very large directories.
///
/// Functionally identical to [`find_output_files`]; names are staged in
/// `batch_size` chunks so the working set stays bounded while the directory
/// streams.
pub fn find_output_files_batched(
    dir: &Path,
    extensions: &[String],
    max_file_size_mb: u64,
    batch_size: usize,
    cancel: &CancelFlag,
    sink: Option<&DiagnosticSink>,
) -> Result<Vec<String>> {
    if batch_size == 0 {
        return find_output_files(dir, extensions, max_file_size_mb, cancel, sink);
    }

    let mut all_files: Vec<String> = Vec::new();
    let mut batch: Vec<String> = Vec::with_capacity(batch_size);

    let mut flush = |batch: &mut Vec<String>, all: &mut Vec<String>| {
        batch.sort();
        all.append(batch);
    };

    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Error accessing directory: {}", dir.display()))?;
    for entry in entries {
        if cancel.is_cancelled() {
            break;
        }
        let entry = entry?;
        if let Some(name) = matching_name(&entry, extensions, max_file_size_mb, sink)? {
            batch.push(name);
            if batch.len() >= batch_size {
                flush(&mut batch, &mut all_files);
            }
        }
    }
    if !batch.is_empty() {
        flush(&mut batch, &mut all_files);
    }

    all_files.sort();
    all_files.dedup();
    Ok(all_files)
}

fn collect(
    dir: &Path,
    extensions: &[String],
    max_file_size_mb: u64,
    cancel: &CancelFlag,
    sink: Option<&DiagnosticSink>,
    out: &mut Vec<String>,
) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Error accessing directory: {}", dir.display()))?;
    for entry in entries {
        if cancel.is_cancelled() {
            break;
        }
        let entry = entry?;
        if let Some(name) = matching_name(&entry, extensions, max_file_size_mb, sink)? {
            out.push(name);
        }
    }
    Ok(())
}

fn matching_name(
    entry: &std::fs::DirEntry,
    extensions: &[String],
    max_file_size_mb: u64,
    sink: Option<&DiagnosticSink>,
) -> Result<Option<String>> {
    let file_type = entry.file_type()?;
    if !file_type.is_file() {
        return Ok(None);
    }

    let path = entry.path();
    let Some(file_ext) = path.extension().and_then(|e| e.to_str()) else {
        return Ok(None);
    };
    let dotted = format!(".{}", file_ext);
    if !extensions.iter().any(|e| e.eq_ignore_ascii_case(&dotted)) {
        return Ok(None);
    }

    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };

    let size = entry.metadata()?.len();
    if size > max_file_size_mb * 1024 * 1024 {
        if let Some(sink) = sink {
            sink.add_warning(format!(
                "Skipping oversized file: {} (>{}MB)",
                name, max_file_size_mb
            ));
        }
        return Ok(None);
    }

    Ok(Some(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str, bytes: usize) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(&vec![b'x'; bytes]).unwrap();
    }

    #[test]
    fn test_effective_extensions_default_expands() {
        assert_eq!(effective_extensions(".log"), vec![".log", ".out"]);
        assert_eq!(effective_extensions(".LOG"), vec![".log", ".out"]);
        assert_eq!(effective_extensions(".dat"), vec![".dat"]);
    }

    #[test]
    fn test_discovery_filters_and_sorts() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "b.log", 10);
        touch(dir.path(), "a.out", 10);
        touch(dir.path(), "c.LOG", 10);
        touch(dir.path(), "skip.txt", 10);
        std::fs::create_dir(dir.path().join("sub.log")).unwrap();

        let cancel = CancelFlag::new();
        let exts = effective_extensions(".log");
        let files = find_output_files(dir.path(), &exts, 100, &cancel, None).unwrap();
        assert_eq!(files, vec!["a.out", "b.log", "c.LOG"]);
    }

    #[test]
    fn test_oversized_files_skipped_with_warning() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "small.log", 100);
        touch(dir.path(), "big.log", 2 * 1024 * 1024);

        let cancel = CancelFlag::new();
        let sink = DiagnosticSink::new();
        let files =
            find_output_files(dir.path(), &[".log".into()], 1, &cancel, Some(&sink)).unwrap();
        assert_eq!(files, vec!["small.log"]);
        assert_eq!(sink.warnings().len(), 1);
        assert!(sink.warnings()[0].contains("big.log"));
    }

    #[test]
    fn test_empty_directory_is_empty_listing() {
        let dir = tempdir().unwrap();
        let cancel = CancelFlag::new();
        let files = find_output_files(dir.path(), &[".log".into()], 100, &cancel, None).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_batched_matches_unbatched() {
        let dir = tempdir().unwrap();
        for i in 0..25 {
            touch(dir.path(), &format!("f{:02}.log", i), 10);
        }
        let cancel = CancelFlag::new();
        let plain = find_output_files(dir.path(), &[".log".into()], 100, &cancel, None).unwrap();
        let batched =
            find_output_files_batched(dir.path(), &[".log".into()], 100, 7, &cancel, None).unwrap();
        assert_eq!(plain, batched);
        assert_eq!(plain.len(), 25);
    }

    #[test]
    fn test_cancelled_discovery_stops_early() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a.log", 10);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let files = find_output_files(dir.path(), &[".log".into()], 100, &cancel, None).unwrap();
        assert!(files.is_empty());
    }
}

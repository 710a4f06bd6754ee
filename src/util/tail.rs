//! Tail-window file reading
//!
//! Classification rarely needs more than the last few lines of an output
//! file, so the reader seeks backward in fixed-size chunks instead of
//! scanning from the front. SMART mode is the escape hatch for patterns
//! that usually sit near the end but are not guaranteed to: it reads the
//! tail window first and falls back to the whole file when the pattern is
//! absent from that window.
//!
//! All modes operate on raw bytes; the only line handling is `\n` counting.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

const CHUNK_SIZE: u64 = 4096;

/// How much of the file to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode<'a> {
    /// The complete content.
    Full,
    /// The last N lines.
    Tail(usize),
    /// The last N lines, or the complete content when `pattern` is absent
    /// from that window.
    Smart { lines: usize, pattern: &'a str },
}

/// Read a file according to `mode`.
pub fn read_window(path: &Path, mode: ReadMode) -> io::Result<String> {
    match mode {
        ReadMode::Full => read_full(path),
        ReadMode::Tail(lines) => read_tail(path, lines),
        ReadMode::Smart { lines, pattern } => {
            let window = read_tail(path, lines)?;
            if window.contains(pattern) {
                Ok(window)
            } else {
                read_full(path)
            }
        }
    }
}

fn read_full(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_tail(path: &Path, tail_lines: usize) -> io::Result<String> {
    if tail_lines == 0 {
        return Ok(String::new());
    }

    let mut file = File::open(path)?;
    let file_size = file.seek(SeekFrom::End(0))?;
    if file_size == 0 {
        return Ok(String::new());
    }

    let mut accumulated: Vec<u8> = Vec::new();
    let mut lines_found = 0usize;
    let mut pos = file_size;

    // Read backward until the window holds tail_lines + 1 newlines; the
    // extra one absorbs the file's trailing newline.
    while pos > 0 && lines_found < tail_lines + 1 {
        let read_pos = pos.saturating_sub(CHUNK_SIZE);
        let chunk_len = (pos - read_pos) as usize;
        pos = read_pos;

        file.seek(SeekFrom::Start(read_pos))?;
        let mut chunk = vec![0u8; chunk_len];
        file.read_exact(&mut chunk)?;

        chunk.extend_from_slice(&accumulated);
        accumulated = chunk;

        lines_found = accumulated.iter().filter(|&&b| b == b'\n').count();
    }

    // Cut everything before the tail_lines-th newline from the end.
    let mut start_pos = accumulated.len();
    let mut newlines_to_find = tail_lines;
    while start_pos > 0 && newlines_to_find > 0 {
        start_pos -= 1;
        if accumulated[start_pos] == b'\n' {
            newlines_to_find -= 1;
        }
    }

    let window = if start_pos > 0 {
        &accumulated[start_pos + 1..]
    } else {
        &accumulated[..]
    };

    Ok(String::from_utf8_lossy(window).into_owned())
}

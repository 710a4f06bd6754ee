//! Thread-safe diagnostic sink
//!
//! Workers append free-form diagnostic strings into two bands: warnings for
//! recoverable per-file problems (the file still produced a record, possibly
//! with defaulted fields) and errors for files that produced nothing. The
//! coordinator bulk-reads both bands after the join and reproduces them in
//! the report header.

use std::sync::Mutex;

#[derive(Debug, Default)]
struct Bands {
    warnings: Vec<String>,
    errors: Vec<String>,
}

/// Append-only collector of per-file diagnostics, ordered by arrival.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    bands: Mutex<Bands>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&self, warning: impl Into<String>) {
        self.lock().warnings.push(warning.into());
    }

    pub fn add_error(&self, error: impl Into<String>) {
        self.lock().errors.push(error.into());
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lock().warnings.clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lock().errors.clone()
    }

    pub fn has_errors(&self) -> bool {
        !self.lock().errors.is_empty()
    }

    pub fn clear(&self) {
        let mut bands = self.lock();
        bands.warnings.clear();
        bands.errors.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bands> {
        self.bands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_bands_are_separate() {
        let sink = DiagnosticSink::new();
        sink.add_warning("soft");
        sink.add_error("hard");
        assert_eq!(sink.warnings(), vec!["soft"]);
        assert_eq!(sink.errors(), vec!["hard"]);
        assert!(sink.has_errors());
        sink.clear();
        assert!(!sink.has_errors());
        assert!(sink.warnings().is_empty());
    }

    #[test]
    fn test_concurrent_appends_all_arrive() {
        let sink = Arc::new(DiagnosticSink::new());
        let mut handles = Vec::new();
        for i in 0..4 {
            let sink = Arc::clone(&sink);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    sink.add_warning(format!("w{}-{}", i, j));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sink.warnings().len(), 400);
    }
}

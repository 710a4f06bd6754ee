//! Settings-file loading
//!
//! A plain key=value file with `#` comments, looked up first in the working
//! directory (`.qcharvest.conf`) and then in the home directory. Everything
//! is read into a string map; typed accessors fall back to their defaults on
//! missing or malformed values. Load problems never abort a run; they
//! surface as warnings that the report header later reproduces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File name probed in the working and home directories.
pub const SETTINGS_FILE_NAME: &str = ".qcharvest.conf";

/// Keys the program understands; anything else draws a warning.
const KNOWN_KEYS: &[&str] = &[
    "default_temperature",
    "default_concentration",
    "default_pressure",
    "default_sort_column",
    "default_output_format",
    "default_threads",
    "max_file_size_mb",
    "memory_limit_mb",
    "input_extensions",
    "output_extensions",
    "output_extension",
    "done_directory_suffix",
    "error_directory_name",
    "pcm_directory_name",
    "show_error_details",
    "quiet_mode",
    "decimal_precision",
];

#[derive(Debug, Default)]
pub struct Settings {
    values: HashMap<String, String>,
    pub warnings: Vec<String>,
}

impl Settings {
    /// Load from the default locations; the working directory wins.
    pub fn load_default() -> Self {
        for path in default_paths() {
            if path.is_file() {
                return Self::load_from(&path);
            }
        }
        Self::default()
    }

    pub fn load_from(path: &Path) -> Self {
        let mut settings = Self::default();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                settings.warnings.push(format!(
                    "Could not read settings file {}: {}. Using defaults.",
                    path.display(),
                    e
                ));
                return settings;
            }
        };

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                settings.warnings.push(format!(
                    "{}:{}: ignoring malformed line '{}'",
                    path.display(),
                    lineno + 1,
                    line
                ));
                continue;
            };
            let key = key.trim().to_string();
            let value = value.trim().to_string();
            if !KNOWN_KEYS.contains(&key.as_str()) {
                settings.warnings.push(format!(
                    "{}:{}: unknown settings key '{}'",
                    path.display(),
                    lineno + 1,
                    key
                ));
            }
            settings.values.insert(key, value);
        }

        settings
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get(key)
            .and_then(crate::util::numeric::parse_f64)
            .unwrap_or(default)
    }

    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn get_u32(&self, key: &str, default: u32) -> u32 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some("true") | Some("1") | Some("yes") => true,
            Some("false") | Some("0") | Some("no") => false,
            _ => default,
        }
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// Comma-separated extension list, e.g. `input_extensions`.
    pub fn get_extensions(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.get(key) {
            Some(list) => list
                .split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            None => default.iter().map(|e| e.to_string()).collect(),
        }
    }
}

fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SETTINGS_FILE_NAME)];
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(SETTINGS_FILE_NAME));
    }
    paths
}

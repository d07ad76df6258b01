//! File-based persistence of:
//! - Preferences (preferences.yaml) - auto lookup flags and system instructions
//! - Error logs (errors/error_N.txt) - one file per surfaced stream error
pub mod preferences;

pub use preferences::{PreferenceFile, PreferenceSource, Preferences};

use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

use crate::infra::constants::{ERRORS_DIR, STORE_DIR};

/// Default directory for error logs
pub fn errors_dir() -> PathBuf {
    PathBuf::from(STORE_DIR).join(ERRORS_DIR)
}

/// Record `details` as `error_N.txt` in `dir`, N one past the highest log already there.
pub fn log_error(dir: &Path, details: &str) -> PathBuf {
    if let Err(e) = fs::create_dir_all(dir) {
        tracing::warn!("could not create {}: {}", dir.display(), e);
    }
    let number = highest_log_number(dir) + 1;
    let path = dir.join(format!("error_{}.txt", number));
    let body = format!("answerline error #{}\nat {}\n\n{}\n", number, Local::now().to_rfc3339(), details.trim_end());

    if let Err(e) = fs::write(&path, body) {
        tracing::warn!("could not write error log {}: {}", path.display(), e);
    }
    path
}

fn highest_log_number(dir: &Path) -> usize {
    fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.strip_prefix("error_")?.strip_suffix(".txt")?.parse().ok())
        .max()
        .unwrap_or(0)
}
